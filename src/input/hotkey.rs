use tracing::debug;

use crate::config::HotkeyBinding;
use crate::rewrite::RewriteMode;

// Modifier bits mirror the CGEventFlags device-independent mask values, so
// raw tap flags can be compared without translation.
pub const MASK_SHIFT: u64 = 1 << 17;
pub const MASK_CONTROL: u64 = 1 << 18;
pub const MASK_OPTION: u64 = 1 << 19;
pub const MASK_COMMAND: u64 = 1 << 20;

/// The four modifier bits the matcher tracks. Device-dependent bits in the
/// incoming flags are irrelevant and masked off before comparison.
pub const TRACKED_MODIFIERS: u64 = MASK_SHIFT | MASK_CONTROL | MASK_OPTION | MASK_COMMAND;

/// macOS virtual key codes for letters and digits.
const KEY_CODES: [(char, u16); 36] = [
    ('a', 0x00), ('b', 0x0B), ('c', 0x08), ('d', 0x02), ('e', 0x0E),
    ('f', 0x03), ('g', 0x05), ('h', 0x04), ('i', 0x22), ('j', 0x26),
    ('k', 0x28), ('l', 0x25), ('m', 0x2E), ('n', 0x2D), ('o', 0x1F),
    ('p', 0x23), ('q', 0x0C), ('r', 0x0F), ('s', 0x01), ('t', 0x11),
    ('u', 0x20), ('v', 0x09), ('w', 0x0D), ('x', 0x07), ('y', 0x10),
    ('z', 0x06),
    ('0', 0x1D), ('1', 0x12), ('2', 0x13), ('3', 0x14), ('4', 0x15),
    ('5', 0x17), ('6', 0x16), ('7', 0x1A), ('8', 0x1C), ('9', 0x19),
];

const DEFAULT_KEY_CODE: u16 = 0x09; // 'v'

/// Virtual key code for a key string: first character, case-insensitive,
/// unknown characters fall back to `v`.
#[must_use]
pub fn key_code(key: &str) -> u16 {
    let Some(first) = key.chars().next() else {
        return DEFAULT_KEY_CODE;
    };
    let lower = first.to_ascii_lowercase();
    KEY_CODES
        .iter()
        .find(|(c, _)| *c == lower)
        .map_or(DEFAULT_KEY_CODE, |(_, code)| *code)
}

/// Parse a modifier string ("cmd+shift", "ctrl option", ...) into a bitmask.
///
/// Case-insensitive; `+` and spaces both separate parts; unrecognized parts
/// are ignored.
#[must_use]
pub fn parse_modifiers(modifiers: &str) -> u64 {
    let mut mask = 0;
    for part in modifiers.to_lowercase().replace(' ', "+").split('+') {
        mask |= match part {
            "cmd" | "command" => MASK_COMMAND,
            "option" | "opt" | "alt" => MASK_OPTION,
            "control" | "ctrl" => MASK_CONTROL,
            "shift" => MASK_SHIFT,
            _ => 0,
        };
    }
    mask
}

/// What a matched hot key should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    Rewrite(RewriteMode),
    ToggleSpeech,
}

/// Kinds of keyboard events the matcher distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HotkeyTarget {
    key_code: u16,
    modifiers: u64,
    action: HotkeyAction,
}

/// Matches captured key events against registered bindings.
///
/// Rebuilt wholesale whenever settings change; no incremental update. The
/// target list is small (≤ 10 entries) so a linear scan per event is fine.
pub struct HotkeyMatcher {
    targets: Vec<HotkeyTarget>,
    enabled: bool,
}

impl HotkeyMatcher {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            targets: Vec::new(),
            enabled: true,
        }
    }

    /// Replace all registered bindings. Bindings with an empty key string
    /// are skipped. Duplicate (key, modifiers) pairs: the first registered
    /// target shadows later ones, since matching scans in insertion order.
    pub fn set_bindings(&mut self, bindings: &[(HotkeyBinding, HotkeyAction)]) {
        self.targets.clear();
        for (binding, action) in bindings {
            if binding.key.is_empty() {
                continue;
            }
            self.targets.push(HotkeyTarget {
                key_code: key_code(&binding.key),
                modifiers: parse_modifiers(&binding.modifiers),
                action: *action,
            });
        }
        debug!(targets = self.targets.len(), "hotkey bindings rebuilt");
    }

    /// Enable or disable action dispatch. Matching still runs while
    /// disabled so the event tap never needs reinstallation.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Decide whether a captured event matches a registered binding.
    ///
    /// Only fresh key-down edges match: key-up and autorepeat events never
    /// do. Incoming flags are masked to the four tracked modifier bits and
    /// compared for exact equality, so an extra held modifier means no
    /// match. First matching target in insertion order wins.
    #[must_use]
    pub fn match_event(
        &self,
        key_code: u16,
        flags: u64,
        autorepeat: bool,
        kind: KeyEventKind,
    ) -> Option<HotkeyAction> {
        if kind != KeyEventKind::KeyDown || autorepeat {
            return None;
        }

        let masked = flags & TRACKED_MODIFIERS;
        let matched = self
            .targets
            .iter()
            .find(|t| t.key_code == key_code && t.modifiers == masked)?;

        if !self.enabled {
            debug!(action = ?matched.action, "hotkey matched while disabled, ignoring");
            return None;
        }
        Some(matched.action)
    }
}

impl Default for HotkeyMatcher {
    fn default() -> Self {
        Self::new()
    }
}
