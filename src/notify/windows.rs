//! Windows toast notifications

use super::{APP_NAME, Severity};
use tauri_winrt_notification::Toast;

pub fn show(severity: Severity, title: &str, body: &str) -> Result<(), String> {
    let heading = match severity {
        Severity::Info => title.to_string(),
        Severity::Error => format!("{} (error)", title),
    };

    Toast::new(Toast::POWERSHELL_APP_ID)
        .title(&heading)
        .text1(body)
        .text2(APP_NAME)
        .show()
        .map_err(|e| e.to_string())
}
