use anyhow::Result;
use tracing::{info, warn};

/// System Settings panes the app may need the user to visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsPane {
    Accessibility,
    InputMonitoring,
    Microphone,
}

impl SettingsPane {
    #[must_use]
    pub const fn url(self) -> &'static str {
        match self {
            Self::Accessibility => {
                "x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility"
            }
            Self::InputMonitoring => {
                "x-apple.systempreferences:com.apple.preference.security?Privacy_ListenEvent"
            }
            Self::Microphone => {
                "x-apple.systempreferences:com.apple.preference.security?Privacy_Microphone"
            }
        }
    }
}

/// Open the given System Settings pane.
pub fn open_settings_pane(pane: SettingsPane) {
    let result = std::process::Command::new("open").arg(pane.url()).output();
    if let Err(e) = result {
        warn!(error = %e, ?pane, "failed to open System Settings");
    }
}

/// Microphone access is prompted by macOS on first capture, so there is
/// nothing to probe ahead of time.
pub fn check_microphone_permission() {
    info!("microphone permission will be requested on first recording");
}

/// Probe accessibility access by creating a CGEventSource.
///
/// # Errors
/// Returns an error when the permission is denied.
#[allow(clippy::unnecessary_wraps)] // non-macOS builds always succeed
pub fn check_accessibility_permission() -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        if CGEventSource::new(CGEventSourceStateID::CombinedSessionState).is_err() {
            open_settings_pane(SettingsPane::Accessibility);
            anyhow::bail!(
                "accessibility permission denied - enable in System Settings > \
                 Privacy & Security > Accessibility"
            );
        }
        info!("accessibility permission granted");
    }
    Ok(())
}

/// Probe Input Monitoring access, which the keyboard event tap needs.
///
/// # Errors
/// Returns an error when the permission is denied.
#[allow(clippy::unnecessary_wraps)] // non-macOS builds always succeed
pub fn check_input_monitoring_permission() -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        if CGEventSource::new(CGEventSourceStateID::HIDSystemState).is_err() {
            open_settings_pane(SettingsPane::InputMonitoring);
            anyhow::bail!(
                "Input Monitoring permission denied - enable in System Settings > \
                 Privacy & Security > Input Monitoring, then restart"
            );
        }
        info!("input monitoring permission granted");
    }
    Ok(())
}

/// Run all startup permission probes.
///
/// # Errors
/// Returns the first denied permission.
pub fn request_all_permissions() -> Result<()> {
    check_microphone_permission();
    check_accessibility_permission()?;
    check_input_monitoring_permission()?;
    info!("all permission probes passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_urls_use_deep_link_scheme() {
        for pane in [
            SettingsPane::Accessibility,
            SettingsPane::InputMonitoring,
            SettingsPane::Microphone,
        ] {
            assert!(pane.url().starts_with("x-apple.systempreferences:"));
        }
        assert!(SettingsPane::InputMonitoring.url().contains("Privacy_ListenEvent"));
        assert!(SettingsPane::Microphone.url().contains("Privacy_Microphone"));
    }

    #[test]
    #[ignore = "requires Input Monitoring permission on macOS"]
    fn input_monitoring_probe() {
        assert!(check_input_monitoring_permission().is_ok());
    }

    #[test]
    #[ignore = "requires accessibility permission on macOS"]
    fn accessibility_probe() {
        assert!(check_accessibility_permission().is_ok());
    }
}
