//! Notification signal emitted after a reset pass that changed something.
//!
//! Delivery and display belong to the host; the core only fires the signal.

/// Title of the reset notification
pub const RESET_NOTIFICATION_TITLE: &str = "Exercises Reset";

/// Body of the reset notification
pub const RESET_NOTIFICATION_BODY: &str =
    "Your daily exercises have been reset. Ready for a new day!";

/// Fire-and-forget user notification
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Notifier that only writes to the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!("{}: {}", title, body);
    }
}
