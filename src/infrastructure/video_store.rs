use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

const VIDEO_FILE_NAME: &str = "explanation.webm";
const VIDEO_CONTENT_TYPE: &str = "video/webm";

/// Blob storage for recorded solution explanations.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn upload(
        &self,
        user_id: &str,
        problem_id: &str,
        video: Vec<u8>,
    ) -> Result<String, InfraError>;

    async fn get_url(&self, user_id: &str, problem_id: &str) -> Result<Option<String>, InfraError>;

    /// Deleting a missing video is not an error.
    async fn delete(&self, user_id: &str, problem_id: &str) -> Result<(), InfraError>;
}

pub fn video_path(user_id: &str, problem_id: &str) -> String {
    format!("videos/{user_id}/{problem_id}/{VIDEO_FILE_NAME}")
}

#[derive(Debug, Clone)]
pub struct ReqwestVideoStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ReqwestVideoStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid video base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(
                "video base url cannot be a base".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            token,
        })
    }

    fn object_endpoint(&self, user_id: &str, problem_id: &str) -> Result<Url, InfraError> {
        for (value, field) in [(user_id, "user id"), (problem_id, "problem id")] {
            if value.trim().is_empty() {
                return Err(InfraError::Remote(format!("{field} must not be empty")));
            }
        }
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Remote("video base url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("videos");
            segments.push(user_id);
            segments.push(problem_id);
            segments.push(VIDEO_FILE_NAME);
        }
        Ok(url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn http_error(context: &str, status: StatusCode) -> InfraError {
        InfraError::Remote(format!("{context}: http {}", status.as_u16()))
    }
}

#[async_trait]
impl VideoStore for ReqwestVideoStore {
    async fn upload(
        &self,
        user_id: &str,
        problem_id: &str,
        video: Vec<u8>,
    ) -> Result<String, InfraError> {
        let url = self.object_endpoint(user_id, problem_id)?;
        let response = self
            .authorized(self.client.put(url.clone()))
            .header(reqwest::header::CONTENT_TYPE, VIDEO_CONTENT_TYPE)
            .body(video)
            .send()
            .await
            .map_err(|error| InfraError::Remote(format!("network error while uploading video: {error}")))?;
        if !response.status().is_success() {
            return Err(Self::http_error("uploading video", response.status()));
        }
        Ok(url.to_string())
    }

    async fn get_url(&self, user_id: &str, problem_id: &str) -> Result<Option<String>, InfraError> {
        let url = self.object_endpoint(user_id, problem_id)?;
        let response = self
            .authorized(self.client.head(url.clone()))
            .send()
            .await
            .map_err(|error| InfraError::Remote(format!("network error while fetching video: {error}")))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(url.to_string())),
            status => Err(Self::http_error("fetching video", status)),
        }
    }

    async fn delete(&self, user_id: &str, problem_id: &str) -> Result<(), InfraError> {
        let url = self.object_endpoint(user_id, problem_id)?;
        let response = self
            .authorized(self.client.delete(url))
            .send()
            .await
            .map_err(|error| InfraError::Remote(format!("network error while deleting video: {error}")))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(Self::http_error("deleting video", status)),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVideoStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryVideoStore {
    fn url_for(path: &str) -> String {
        format!("memory://{path}")
    }
}

#[async_trait]
impl VideoStore for InMemoryVideoStore {
    async fn upload(
        &self,
        user_id: &str,
        problem_id: &str,
        video: Vec<u8>,
    ) -> Result<String, InfraError> {
        let path = video_path(user_id, problem_id);
        let mut objects = self
            .objects
            .lock()
            .map_err(|error| InfraError::poisoned("video store", error))?;
        objects.insert(path.clone(), video);
        Ok(Self::url_for(&path))
    }

    async fn get_url(&self, user_id: &str, problem_id: &str) -> Result<Option<String>, InfraError> {
        let path = video_path(user_id, problem_id);
        let objects = self
            .objects
            .lock()
            .map_err(|error| InfraError::poisoned("video store", error))?;
        Ok(objects.contains_key(&path).then(|| Self::url_for(&path)))
    }

    async fn delete(&self, user_id: &str, problem_id: &str) -> Result<(), InfraError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|error| InfraError::poisoned("video store", error))?;
        objects.remove(&video_path(user_id, problem_id));
        Ok(())
    }
}
