use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::rewrite::RewriteMode;

/// Models offered in the tray picker.
pub const DEFAULT_MODELS: [&str; 4] = ["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"];

/// Launch agent label, also the plist filename stem.
pub const LAUNCH_AGENT_LABEL: &str = "com.voxapp.rewrite";

/// A single hot key binding as stored in config.
///
/// Both fields may be empty, which means "unbound".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HotkeyBinding {
    #[serde(default)]
    pub modifiers: String,
    #[serde(default)]
    pub key: String,
}

impl HotkeyBinding {
    #[must_use]
    pub fn new(modifiers: &str, key: &str) -> Self {
        Self {
            modifiers: modifiers.to_owned(),
            key: key.to_owned(),
        }
    }
}

/// Where the toast notification appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToastPosition {
    #[default]
    Cursor,
    TopRight,
    TopCenter,
}

/// Speech-to-text sub-document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_speech_model")]
    pub model: String,
    #[serde(default = "default_speech_language")]
    pub language: String,
    #[serde(default = "default_speech_hotkey")]
    pub hotkey: HotkeyBinding,
}

fn default_speech_model() -> String {
    "base".to_owned()
}

fn default_speech_language() -> String {
    "auto".to_owned()
}

fn default_speech_hotkey() -> HotkeyBinding {
    HotkeyBinding::new("option", "v")
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_speech_model(),
            language: default_speech_language(),
            hotkey: default_speech_hotkey(),
        }
    }
}

/// The persisted configuration document.
///
/// Every field carries a serde default so a partial user file merges under
/// the defaults rather than failing or erasing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_model")]
    pub model: String,
    /// Plaintext API key in the config file. See DESIGN.md for the
    /// keychain-vs-file decision.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub toast_position: ToastPosition,
    #[serde(default)]
    pub thinking_mode: bool,
    #[serde(default = "default_true")]
    pub hotkeys_enabled: bool,
    #[serde(default)]
    pub hotkeys: BTreeMap<RewriteMode, HotkeyBinding>,
    #[serde(default)]
    pub speech: SpeechSettings,
    /// Append logs to `<config_dir>/vox.log` instead of stdout.
    #[serde(default)]
    pub log_to_file: bool,
}

fn default_model() -> String {
    "gpt-4o-mini".to_owned()
}

const fn default_true() -> bool {
    true
}

/// Default per-mode bindings. Copied entry-by-entry into loaded settings so
/// user documents never alias this table.
#[must_use]
pub fn default_hotkeys() -> BTreeMap<RewriteMode, HotkeyBinding> {
    let mut map = BTreeMap::new();
    map.insert(RewriteMode::FixGrammar, HotkeyBinding::new("cmd+shift", "g"));
    map.insert(RewriteMode::Professional, HotkeyBinding::new("cmd+shift", "p"));
    map.insert(RewriteMode::Concise, HotkeyBinding::new("cmd+shift", "k"));
    map.insert(RewriteMode::Friendly, HotkeyBinding::new("cmd+shift", "f"));
    map
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            auto_start: false,
            toast_position: ToastPosition::Cursor,
            thinking_mode: false,
            hotkeys_enabled: true,
            hotkeys: default_hotkeys(),
            speech: SpeechSettings::default(),
            log_to_file: false,
        }
    }
}

impl Settings {
    /// Fill in defaults for any mode missing from the hotkeys map, so a
    /// partial user override (e.g. only `professional` customized) keeps the
    /// defaults for the other modes.
    fn fill_missing_hotkeys(&mut self) {
        let defaults = default_hotkeys();
        for mode in RewriteMode::ALL {
            if !self.hotkeys.contains_key(&mode) {
                let binding = defaults.get(&mode).cloned().unwrap_or_default();
                self.hotkeys.insert(mode, binding);
            }
        }
    }
}

/// Migrate the deprecated flat single-hotkey schema in place.
///
/// Returns true if the document was changed and needs to be re-persisted.
/// With `hotkey_key` present and `hotkeys` absent, the recovered binding is
/// installed under `fix_grammar` and `hotkey_enabled` becomes the global
/// `hotkeys_enabled` flag. Leftover legacy keys are always stripped.
fn migrate_legacy_hotkey(doc: &mut Mapping) -> bool {
    let legacy_key = Value::from("hotkey_key");
    let legacy_modifiers = Value::from("hotkey_modifiers");
    let legacy_enabled = Value::from("hotkey_enabled");
    let hotkeys = Value::from("hotkeys");

    if doc.contains_key(&legacy_key) && !doc.contains_key(&hotkeys) {
        let key = doc
            .remove(&legacy_key)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let modifiers = doc
            .remove(&legacy_modifiers)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let enabled = doc
            .remove(&legacy_enabled)
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let mut binding = Mapping::new();
        binding.insert(Value::from("modifiers"), Value::from(modifiers));
        binding.insert(Value::from("key"), Value::from(key));

        let mut map = Mapping::new();
        map.insert(Value::from("fix_grammar"), Value::Mapping(binding));

        doc.insert(hotkeys, Value::Mapping(map));
        doc.insert(Value::from("hotkeys_enabled"), Value::from(enabled));

        info!("migrated legacy flat hotkey schema");
        return true;
    }

    // Forward-compatibility tolerance: drop stragglers without migrating.
    let mut changed = false;
    for stale in [legacy_key, legacy_modifiers, legacy_enabled] {
        if doc.remove(&stale).is_some() {
            changed = true;
        }
    }
    changed
}

/// Configuration store backed by `config.yml`.
///
/// Constructed once per process and owned by the main loop; every mutating
/// setter persists the whole document immediately. Write frequency is
/// human-driven, so there is no batching.
pub struct Config {
    config_dir: PathBuf,
    config_file: PathBuf,
    settings: Settings,
}

impl Config {
    /// Load from the per-user application-support directory.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or a migration
    /// cannot be persisted. A missing or unparsable file falls back to
    /// defaults with a warning.
    pub fn load() -> Result<Self> {
        let dir = dirs::config_dir()
            .context("no config directory available")?
            .join("Vox");
        Self::load_from(&dir)
    }

    /// Load from an explicit directory (tests use a temp dir).
    ///
    /// # Errors
    /// See [`Config::load`].
    pub fn load_from(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
        let config_file = dir.join("config.yml");

        let mut doc = Mapping::new();
        if config_file.exists() {
            let contents = fs::read_to_string(&config_file)
                .with_context(|| format!("failed to read {}", config_file.display()))?;
            match serde_yaml::from_str::<Mapping>(&contents) {
                Ok(parsed) => doc = parsed,
                Err(e) => warn!("could not parse config, using defaults: {e}"),
            }
        }

        let migrated = migrate_legacy_hotkey(&mut doc);

        let mut settings: Settings = match serde_yaml::from_value(Value::Mapping(doc)) {
            Ok(s) => s,
            Err(e) => {
                warn!("config schema mismatch, using defaults: {e}");
                Settings::default()
            }
        };
        settings.fill_missing_hotkeys();

        let config = Self {
            config_dir: dir.to_path_buf(),
            config_file,
            settings,
        };

        if migrated {
            config.save().context("failed to persist migrated config")?;
        }

        Ok(config)
    }

    fn save(&self) -> Result<()> {
        let yaml =
            serde_yaml::to_string(&self.settings).context("failed to serialize config")?;
        fs::write(&self.config_file, yaml)
            .with_context(|| format!("failed to write {}", self.config_file.display()))
    }

    #[must_use]
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Directory for downloaded whisper models.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.config_dir.join("models")
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // Mutating setters; each persists immediately.

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_model(&mut self, model: String) -> Result<()> {
        self.settings.model = model;
        self.save()
    }

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_api_key(&mut self, api_key: Option<String>) -> Result<()> {
        self.settings.api_key = api_key.filter(|k| !k.trim().is_empty());
        self.save()
    }

    /// Empty or whitespace-only values clear the override.
    ///
    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_base_url(&mut self, base_url: Option<String>) -> Result<()> {
        self.settings.base_url = base_url
            .map(|u| u.trim().to_owned())
            .filter(|u| !u.is_empty());
        self.save()
    }

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_toast_position(&mut self, position: ToastPosition) -> Result<()> {
        self.settings.toast_position = position;
        self.save()
    }

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_thinking_mode(&mut self, enabled: bool) -> Result<()> {
        self.settings.thinking_mode = enabled;
        self.save()
    }

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_hotkeys_enabled(&mut self, enabled: bool) -> Result<()> {
        self.settings.hotkeys_enabled = enabled;
        self.save()
    }

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_hotkey(&mut self, mode: RewriteMode, binding: HotkeyBinding) -> Result<()> {
        self.settings.hotkeys.insert(mode, binding);
        self.save()
    }

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_speech_enabled(&mut self, enabled: bool) -> Result<()> {
        self.settings.speech.enabled = enabled;
        self.save()
    }

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_speech_model(&mut self, model: String) -> Result<()> {
        self.settings.speech.model = model;
        self.save()
    }

    /// # Errors
    /// Returns error if the config file cannot be written.
    pub fn set_speech_language(&mut self, language: String) -> Result<()> {
        self.settings.speech.language = language;
        self.save()
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.settings.api_key.is_some()
    }

    // Auto-start launch agent. The plist file's existence is the source of
    // truth, independent of the config flag.

    #[must_use]
    pub fn launch_agent_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| {
            home.join("Library")
                .join("LaunchAgents")
                .join(format!("{LAUNCH_AGENT_LABEL}.plist"))
        })
    }

    #[must_use]
    pub fn is_auto_start_enabled() -> bool {
        Self::launch_agent_path().is_some_and(|p| p.exists())
    }

    /// Enable or disable launch-at-login.
    ///
    /// # Errors
    /// Returns error if the plist cannot be written/removed or the config
    /// cannot be saved.
    pub fn set_auto_start(&mut self, enabled: bool) -> Result<()> {
        let path = Self::launch_agent_path().context("no home directory")?;
        if enabled {
            let exe = std::env::current_exe().context("cannot resolve executable path")?;
            write_launch_agent(&path, &exe)?;
        } else if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        self.settings.auto_start = enabled;
        self.save()
    }
}

/// Render the launch agent plist for the given program path.
#[must_use]
pub fn launch_agent_plist(program: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LAUNCH_AGENT_LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
</dict>
</plist>
"#,
        program.display()
    )
}

/// Write the launch agent plist, creating the directory if needed.
///
/// # Errors
/// Returns error if the directory or file cannot be created.
pub fn write_launch_agent(path: &Path, program: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create LaunchAgents directory")?;
    }
    fs::write(path, launch_agent_plist(program))
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load(dir: &TempDir) -> Config {
        Config::load_from(dir.path()).unwrap()
    }

    #[test]
    fn defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = load(&dir);
        assert_eq!(config.settings().model, "gpt-4o-mini");
        assert_eq!(config.settings().base_url, None);
        assert!(!config.settings().auto_start);
        assert_eq!(config.settings().toast_position, ToastPosition::Cursor);
        assert!(!config.settings().thinking_mode);
        assert!(config.settings().hotkeys_enabled);
        assert!(!config.settings().speech.enabled);
        assert_eq!(config.settings().speech.model, "base");
        assert_eq!(config.settings().speech.language, "auto");
    }

    #[test]
    fn every_mode_has_hotkey_entry_after_load() {
        let dir = TempDir::new().unwrap();
        let config = load(&dir);
        for mode in RewriteMode::ALL {
            assert!(config.settings().hotkeys.contains_key(&mode));
        }
    }

    #[test]
    fn scalar_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = load(&dir);
        config.set_model("gpt-4o".to_owned()).unwrap();
        config.set_thinking_mode(true).unwrap();
        config
            .set_base_url(Some("https://custom.api/v1".to_owned()))
            .unwrap();
        config.set_toast_position(ToastPosition::TopRight).unwrap();

        let reloaded = load(&dir);
        assert_eq!(reloaded.settings().model, "gpt-4o");
        assert!(reloaded.settings().thinking_mode);
        assert_eq!(
            reloaded.settings().base_url.as_deref(),
            Some("https://custom.api/v1")
        );
        assert_eq!(reloaded.settings().toast_position, ToastPosition::TopRight);
    }

    #[test]
    fn base_url_trimmed_and_empty_cleared() {
        let dir = TempDir::new().unwrap();
        let mut config = load(&dir);

        config
            .set_base_url(Some("  https://a.example/v1  ".to_owned()))
            .unwrap();
        assert_eq!(
            config.settings().base_url.as_deref(),
            Some("https://a.example/v1")
        );

        config.set_base_url(Some("   ".to_owned())).unwrap();
        assert_eq!(config.settings().base_url, None);
    }

    #[test]
    fn api_key_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = load(&dir);
        assert!(!config.has_api_key());
        config.set_api_key(Some("sk-abc".to_owned())).unwrap();
        assert!(config.has_api_key());

        let reloaded = load(&dir);
        assert_eq!(reloaded.settings().api_key.as_deref(), Some("sk-abc"));
    }

    #[test]
    fn partial_hotkey_override_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.yml"),
            "hotkeys:\n  professional:\n    modifiers: cmd+option\n    key: r\n",
        )
        .unwrap();

        let config = load(&dir);
        let hotkeys = &config.settings().hotkeys;
        assert_eq!(
            hotkeys[&RewriteMode::Professional],
            HotkeyBinding::new("cmd+option", "r")
        );
        let defaults = default_hotkeys();
        assert_eq!(
            hotkeys[&RewriteMode::FixGrammar],
            defaults[&RewriteMode::FixGrammar]
        );
        assert_eq!(hotkeys[&RewriteMode::Concise], defaults[&RewriteMode::Concise]);
        assert_eq!(hotkeys[&RewriteMode::Friendly], defaults[&RewriteMode::Friendly]);
    }

    #[test]
    fn legacy_flat_schema_migrates_once() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.yml"),
            "hotkey_modifiers: cmd+shift\nhotkey_key: g\nhotkey_enabled: false\n",
        )
        .unwrap();

        let config = load(&dir);
        assert_eq!(
            config.settings().hotkeys[&RewriteMode::FixGrammar],
            HotkeyBinding::new("cmd+shift", "g")
        );
        assert!(!config.settings().hotkeys_enabled);

        // Legacy keys must be gone from disk after the load/save cycle.
        let on_disk = fs::read_to_string(dir.path().join("config.yml")).unwrap();
        assert!(!on_disk.contains("hotkey_key"));
        assert!(!on_disk.contains("hotkey_modifiers"));
        assert!(!on_disk.contains("hotkey_enabled:"));
        assert!(on_disk.contains("hotkeys:"));
    }

    #[test]
    fn stray_legacy_keys_are_stripped_when_hotkeys_present() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.yml"),
            "hotkey_key: z\nhotkeys:\n  concise:\n    modifiers: cmd\n    key: '9'\n",
        )
        .unwrap();

        let config = load(&dir);
        // The nested map wins; the stray legacy key does not overwrite it.
        assert_eq!(
            config.settings().hotkeys[&RewriteMode::Concise],
            HotkeyBinding::new("cmd", "9")
        );
        assert_eq!(
            config.settings().hotkeys[&RewriteMode::FixGrammar],
            default_hotkeys()[&RewriteMode::FixGrammar]
        );
        let on_disk = fs::read_to_string(dir.path().join("config.yml")).unwrap();
        assert!(!on_disk.contains("hotkey_key"));
    }

    #[test]
    fn invalid_yaml_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.yml"), "model: [unclosed").unwrap();
        let config = load(&dir);
        assert_eq!(config.settings().model, "gpt-4o-mini");
    }

    #[test]
    fn partial_speech_override_merges_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.yml"), "speech:\n  enabled: true\n").unwrap();
        let config = load(&dir);
        assert!(config.settings().speech.enabled);
        assert_eq!(config.settings().speech.model, "base");
        assert_eq!(config.settings().speech.language, "auto");
        assert_eq!(
            config.settings().speech.hotkey,
            HotkeyBinding::new("option", "v")
        );
    }

    #[test]
    fn launch_agent_plist_contains_label_and_program() {
        let plist = launch_agent_plist(Path::new("/Applications/Vox.app/Contents/MacOS/vox"));
        assert!(plist.contains(LAUNCH_AGENT_LABEL));
        assert!(plist.contains("/Applications/Vox.app/Contents/MacOS/vox"));
        assert!(plist.contains("RunAtLoad"));
    }

    #[test]
    fn write_launch_agent_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("LaunchAgents").join("test.plist");
        write_launch_agent(&path, Path::new("/usr/local/bin/vox")).unwrap();
        assert!(path.exists());
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("/usr/local/bin/vox"));
    }
}
