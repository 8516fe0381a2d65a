use std::io::Write;
use tracing::{info, warn};

/// Best-effort user alert. Implementations never fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Rings the terminal bell and logs the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct BellNotifier;

impl Notifier for BellNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "notification");
        let mut stderr = std::io::stderr();
        if let Err(error) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            warn!(%error, "failed to play notification sound");
        }
    }
}

/// Logs only; used when no terminal is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "notification");
    }
}
