use std::collections::HashMap;

use anyhow::{Context, Result};
use tray_icon::menu::{CheckMenuItem, Menu, MenuItem, PredefinedMenuItem, Submenu};
use tray_icon::{Icon, TrayIconBuilder};
use tracing::debug;

use crate::config::{Settings, DEFAULT_MODELS};
use crate::rewrite::RewriteMode;
use crate::transcription::ModelKind;

/// What the app is currently doing; drives the tray icon color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppPhase {
    Idle,
    Recording,
    Processing,
}

/// Menu selections forwarded to the main loop.
#[derive(Debug, Clone)]
pub enum TrayCommand {
    Rewrite(RewriteMode),
    ToggleSpeech,
    SetModel(String),
    SetWhisperModel(ModelKind),
    ToggleThinking,
    ToggleHotkeys,
    ToggleAutoStart,
    OpenConfigFile,
    // Quit is PredefinedMenuItem::quit(), which terminates natively and
    // never reaches the event channel.
}

const ICON_SIZE: u32 = 32;

/// Solid RGBA square for a phase. Generated instead of bundled so the
/// binary has no resource files to locate.
#[must_use]
pub fn icon_rgba(phase: AppPhase) -> Vec<u8> {
    let (r, g, b) = match phase {
        AppPhase::Idle => (90, 90, 95),
        AppPhase::Recording => (220, 60, 60),
        AppPhase::Processing => (230, 160, 40),
    };
    let mut rgba = Vec::with_capacity((ICON_SIZE * ICON_SIZE * 4) as usize);
    let center = (f64::from(ICON_SIZE) - 1.0) / 2.0;
    let radius = f64::from(ICON_SIZE) / 2.0 - 1.0;
    for y in 0..ICON_SIZE {
        for x in 0..ICON_SIZE {
            let dx = f64::from(x) - center;
            let dy = f64::from(y) - center;
            let inside = dx.hypot(dy) <= radius;
            rgba.extend_from_slice(&[r, g, b, if inside { 255 } else { 0 }]);
        }
    }
    rgba
}

pub struct TrayManager {
    tray: tray_icon::TrayIcon,
    current_phase: AppPhase,
    cached_icons: HashMap<AppPhase, Icon>,
}

impl TrayManager {
    /// Build the tray icon and its menu. Must run on the main thread.
    ///
    /// # Errors
    /// Returns error if the icon or menu cannot be constructed.
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut cached_icons = HashMap::new();
        for phase in [AppPhase::Idle, AppPhase::Recording, AppPhase::Processing] {
            let icon = Icon::from_rgba(icon_rgba(phase), ICON_SIZE, ICON_SIZE)
                .context("failed to create tray icon")?;
            cached_icons.insert(phase, icon);
        }

        let tray = Self::build_tray(settings, AppPhase::Idle, &cached_icons)?;
        Ok(Self {
            tray,
            current_phase: AppPhase::Idle,
            cached_icons,
        })
    }

    fn build_tray(
        settings: &Settings,
        phase: AppPhase,
        cached_icons: &HashMap<AppPhase, Icon>,
    ) -> Result<tray_icon::TrayIcon> {
        let icon = cached_icons
            .get(&phase)
            .with_context(|| format!("icon for phase {phase:?} not in cache"))?
            .clone();
        let menu = Self::build_menu(settings, phase)?;

        TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("Vox")
            .with_icon(icon)
            .build()
            .context("failed to build tray icon")
    }

    fn status_text(phase: AppPhase) -> &'static str {
        match phase {
            AppPhase::Idle => "Vox - Ready",
            AppPhase::Recording => "Vox - Recording...",
            AppPhase::Processing => "Vox - Working...",
        }
    }

    fn dictation_label(phase: AppPhase) -> &'static str {
        if phase == AppPhase::Recording {
            "Stop Dictation"
        } else {
            "Start Dictation"
        }
    }

    fn build_menu(settings: &Settings, phase: AppPhase) -> Result<Menu> {
        let menu = Menu::new();

        let status = MenuItem::new(Self::status_text(phase), false, None);
        menu.append(&status).context("failed to append status")?;
        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;

        // One direct action per rewrite mode.
        for mode in RewriteMode::ALL {
            let item = MenuItem::new(format!("Rewrite: {}", mode.display_name()), true, None);
            menu.append(&item).context("failed to append mode item")?;
        }

        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;
        let dictation = MenuItem::new(
            Self::dictation_label(phase),
            settings.speech.enabled,
            None,
        );
        menu.append(&dictation)
            .context("failed to append dictation item")?;

        // API model picker.
        let model_submenu = Submenu::new("Model", true);
        for name in DEFAULT_MODELS {
            let label = if settings.model == name {
                format!("\u{2713} {name}")
            } else {
                name.to_owned()
            };
            let item = MenuItem::new(label, true, None);
            model_submenu
                .append(&item)
                .context("failed to append model item")?;
        }
        menu.append(&model_submenu)
            .context("failed to append model submenu")?;

        // Whisper model picker.
        let whisper_submenu = Submenu::new("Whisper Model", true);
        for kind in ModelKind::ALL {
            let selected = settings.speech.model == kind.name();
            let label = if selected {
                format!("\u{2713} {} ({} MB)", kind.name(), kind.size_mb())
            } else {
                format!("{} ({} MB)", kind.name(), kind.size_mb())
            };
            let item = MenuItem::new(label, true, None);
            whisper_submenu
                .append(&item)
                .context("failed to append whisper item")?;
        }
        menu.append(&whisper_submenu)
            .context("failed to append whisper submenu")?;

        // Toggles.
        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;
        let thinking = CheckMenuItem::new("Thinking Mode", true, settings.thinking_mode, None);
        menu.append(&thinking)
            .context("failed to append thinking item")?;
        let hotkeys = CheckMenuItem::new("Enable Hotkeys", true, settings.hotkeys_enabled, None);
        menu.append(&hotkeys)
            .context("failed to append hotkeys item")?;
        let auto_start = CheckMenuItem::new("Start at Login", true, settings.auto_start, None);
        menu.append(&auto_start)
            .context("failed to append auto-start item")?;

        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;
        let open_config = MenuItem::new("Open Config File", true, None);
        menu.append(&open_config)
            .context("failed to append open config item")?;
        menu.append(&PredefinedMenuItem::quit(None))
            .context("failed to append quit item")?;

        Ok(menu)
    }

    /// Rebuild the tray when the phase changed. Rebuilding the whole tray
    /// works around set_icon() not refreshing reliably on macOS.
    ///
    /// # Errors
    /// Returns error if the rebuilt tray cannot be constructed.
    pub fn set_phase(&mut self, settings: &Settings, phase: AppPhase) -> Result<()> {
        if phase == self.current_phase {
            return Ok(());
        }
        debug!(from = ?self.current_phase, to = ?phase, "tray phase change");
        self.tray = Self::build_tray(settings, phase, &self.cached_icons)?;
        self.current_phase = phase;
        Ok(())
    }

    /// Rebuild the menu after a settings change.
    ///
    /// # Errors
    /// Returns error if the menu cannot be constructed.
    pub fn refresh_menu(&self, settings: &Settings) -> Result<()> {
        let menu = Self::build_menu(settings, self.current_phase)?;
        self.tray.set_menu(Some(Box::new(menu)));
        Ok(())
    }

    /// Drain one pending menu event, if any.
    pub fn poll_events() -> Option<TrayCommand> {
        use tray_icon::menu::MenuEvent;

        if let Ok(event) = MenuEvent::receiver().try_recv() {
            let id = event.id.0.as_str();
            debug!(id, "tray menu event");
            return parse_menu_event(id);
        }
        None
    }
}

/// Map a menu item label back to its command. Labels carry their own
/// identity; the selection checkmark prefix is stripped first.
fn parse_menu_event(id: &str) -> Option<TrayCommand> {
    let id = id.trim_start_matches("\u{2713} ");

    if let Some(mode_name) = id.strip_prefix("Rewrite: ") {
        let mode = RewriteMode::ALL
            .into_iter()
            .find(|m| m.display_name() == mode_name)?;
        return Some(TrayCommand::Rewrite(mode));
    }

    if id == "Start Dictation" || id == "Stop Dictation" {
        return Some(TrayCommand::ToggleSpeech);
    }

    if DEFAULT_MODELS.contains(&id) {
        return Some(TrayCommand::SetModel(id.to_owned()));
    }

    if let Some(kind) = ModelKind::ALL
        .into_iter()
        .find(|k| id == format!("{} ({} MB)", k.name(), k.size_mb()))
    {
        return Some(TrayCommand::SetWhisperModel(kind));
    }

    match id {
        "Thinking Mode" => Some(TrayCommand::ToggleThinking),
        "Enable Hotkeys" => Some(TrayCommand::ToggleHotkeys),
        "Start at Login" => Some(TrayCommand::ToggleAutoStart),
        "Open Config File" => Some(TrayCommand::OpenConfigFile),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rewrite_mode_items() {
        for mode in RewriteMode::ALL {
            let label = format!("Rewrite: {}", mode.display_name());
            let cmd = parse_menu_event(&label);
            assert!(matches!(cmd, Some(TrayCommand::Rewrite(m)) if m == mode));
        }
    }

    #[test]
    fn parse_dictation_toggle_both_labels() {
        assert!(matches!(
            parse_menu_event("Start Dictation"),
            Some(TrayCommand::ToggleSpeech)
        ));
        assert!(matches!(
            parse_menu_event("Stop Dictation"),
            Some(TrayCommand::ToggleSpeech)
        ));
    }

    #[test]
    fn parse_model_items() {
        let cmd = parse_menu_event("gpt-4o");
        assert!(matches!(cmd, Some(TrayCommand::SetModel(name)) if name == "gpt-4o"));

        let cmd = parse_menu_event("\u{2713} gpt-4o-mini");
        assert!(matches!(cmd, Some(TrayCommand::SetModel(name)) if name == "gpt-4o-mini"));
    }

    #[test]
    fn parse_whisper_model_items() {
        let cmd = parse_menu_event("base (74 MB)");
        assert!(matches!(
            cmd,
            Some(TrayCommand::SetWhisperModel(ModelKind::Base))
        ));

        let cmd = parse_menu_event("\u{2713} medium (769 MB)");
        assert!(matches!(
            cmd,
            Some(TrayCommand::SetWhisperModel(ModelKind::Medium))
        ));
    }

    #[test]
    fn parse_toggles_and_actions() {
        assert!(matches!(
            parse_menu_event("Thinking Mode"),
            Some(TrayCommand::ToggleThinking)
        ));
        assert!(matches!(
            parse_menu_event("Enable Hotkeys"),
            Some(TrayCommand::ToggleHotkeys)
        ));
        assert!(matches!(
            parse_menu_event("Start at Login"),
            Some(TrayCommand::ToggleAutoStart)
        ));
        assert!(matches!(
            parse_menu_event("Open Config File"),
            Some(TrayCommand::OpenConfigFile)
        ));
    }

    #[test]
    fn parse_unknown_is_none() {
        assert!(parse_menu_event("Unknown Item").is_none());
        assert!(parse_menu_event("").is_none());
        assert!(parse_menu_event("Rewrite: Bogus").is_none());
    }

    #[test]
    fn icons_are_full_rgba_buffers() {
        for phase in [AppPhase::Idle, AppPhase::Recording, AppPhase::Processing] {
            let rgba = icon_rgba(phase);
            assert_eq!(rgba.len(), (ICON_SIZE * ICON_SIZE * 4) as usize);
            // Corners transparent, center opaque.
            assert_eq!(rgba[3], 0);
            let center = ((ICON_SIZE / 2 * ICON_SIZE + ICON_SIZE / 2) * 4 + 3) as usize;
            assert_eq!(rgba[center], 255);
        }
    }

    #[test]
    fn phase_icons_differ() {
        assert_ne!(icon_rgba(AppPhase::Idle), icon_rgba(AppPhase::Recording));
        assert_ne!(
            icon_rgba(AppPhase::Recording),
            icon_rgba(AppPhase::Processing)
        );
    }

    #[test]
    fn status_text_per_phase() {
        assert_eq!(TrayManager::status_text(AppPhase::Idle), "Vox - Ready");
        assert_eq!(
            TrayManager::status_text(AppPhase::Recording),
            "Vox - Recording..."
        );
        assert_eq!(
            TrayManager::status_text(AppPhase::Processing),
            "Vox - Working..."
        );
    }

    #[test]
    fn dictation_label_tracks_phase() {
        assert_eq!(TrayManager::dictation_label(AppPhase::Idle), "Start Dictation");
        assert_eq!(
            TrayManager::dictation_label(AppPhase::Recording),
            "Stop Dictation"
        );
    }
}
