use chrono::Local;
use facegate_core::{Notification, NotificationLevel, Notifier};

/// Prints transient notifications to stderr. Nothing is persisted.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(level = ?notification.level, message = %notification.message, "notification");
        eprintln!("{}", format_notification(&notification));
    }
}

fn format_notification(notification: &Notification) -> String {
    let tag = match notification.level {
        NotificationLevel::Success => "ok",
        NotificationLevel::Error => "error",
        NotificationLevel::Info => "info",
    };
    format!(
        "[{}] {tag:>5}: {}",
        notification.at.with_timezone(&Local).format("%H:%M:%S"),
        notification.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_notification() {
        let line = format_notification(&Notification::error("Face not matched! Attempt #2"));
        assert!(line.ends_with("error: Face not matched! Attempt #2"), "{line}");

        let line = format_notification(&Notification::success("Face verified"));
        assert!(line.ends_with("   ok: Face verified"), "{line}");
        assert!(line.starts_with('['));
    }
}
