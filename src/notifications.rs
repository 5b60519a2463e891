/// Best-effort desktop notification sink. Implementations must not fail the
/// caller; a notification that cannot be shown is dropped.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

pub const DOWNLOAD_COMPLETE_TITLE: &str = "Download Complete";
pub const DOWNLOAD_ERROR_TITLE: &str = "Download Error";

/// Writes notifications to the log.
pub struct LogNotifier {
    enabled: bool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        if self.enabled {
            log::info!("🔔 {}: {}", title, message);
        }
    }
}
