pub mod config;
pub mod credential_store;
pub mod error;
pub mod local_record_store;
pub mod logging;
pub mod notifier;
pub mod remote_record_store;
pub mod storage;
pub mod video_store;
