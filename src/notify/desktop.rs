//! Linux and macOS notifications via notify-rust

use super::{APP_NAME, Severity};
use notify_rust::Notification;

pub fn show(severity: Severity, title: &str, body: &str) -> Result<(), notify_rust::error::Error> {
    let mut notification = Notification::new();
    notification.appname(APP_NAME).summary(title).body(body);

    #[cfg(all(unix, not(target_os = "macos")))]
    if severity == Severity::Error {
        notification.urgency(notify_rust::Urgency::Critical);
    }
    #[cfg(target_os = "macos")]
    let _ = severity;

    notification.show().map(|_| ())
}
