use serde::{Deserialize, Serialize};

/// Rewrite presets offered through the Services menu, hot keys, and the tray.
///
/// The set is closed and fixed at startup; each mode maps 1:1 to a display
/// name and a system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    FixGrammar,
    Professional,
    Concise,
    Friendly,
}

impl RewriteMode {
    /// All modes in declaration order. Registration order matters for the
    /// hotkey matcher (first match wins), so keep this stable.
    pub const ALL: [Self; 4] = [
        Self::FixGrammar,
        Self::Professional,
        Self::Concise,
        Self::Friendly,
    ];

    /// Human-readable name for menus and toasts.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::FixGrammar => "Fix Grammar",
            Self::Professional => "Professional",
            Self::Concise => "Concise",
            Self::Friendly => "Friendly",
        }
    }

    /// Stable identifier used as the config map key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::FixGrammar => "fix_grammar",
            Self::Professional => "professional",
            Self::Concise => "concise",
            Self::Friendly => "friendly",
        }
    }

    /// Base system prompt for this mode.
    #[must_use]
    pub const fn base_prompt(self) -> &'static str {
        match self {
            Self::FixGrammar => {
                "You are a grammar and spelling assistant. Correct any grammar, spelling, \
                 and punctuation errors in the given text while preserving the original \
                 meaning, tone, and language. Return only the corrected text without \
                 any explanations or additional content."
            }
            Self::Professional => {
                "You are a professional writing assistant. Rewrite the given text to be \
                 formal and business-appropriate while maintaining the original meaning \
                 and language. Use professional vocabulary and structure. Return only \
                 the rewritten text without any explanations or additional content."
            }
            Self::Concise => {
                "You are a concise writing assistant. Shorten the given text while \
                 preserving the key meaning and information. Remove unnecessary words \
                 and redundancy while keeping the original language. Return only the \
                 shortened text without any explanations or additional content."
            }
            Self::Friendly => {
                "You are a friendly writing assistant. Rewrite the given text to have \
                 a warm, casual, and approachable tone while maintaining the original \
                 meaning and language. Return only the rewritten text without any \
                 explanations or additional content."
            }
        }
    }
}

/// Fixed instruction block appended verbatim when thinking mode is enabled.
/// This is sent to the model, not generated by it.
pub const THINKING_GUIDANCE: &str = "Before providing your final answer, think through this step-by-step:\n\
1. Analyze the original text's structure, tone, and key points\n\
2. Identify areas that need improvement based on the rewrite goal\n\
3. Consider multiple ways to improve the text\n\
4. Select the best approach and apply it\n\
5. Return only the final rewritten text without explanations";

/// Assemble the system prompt for a request.
///
/// With thinking mode off the result is the base prompt exactly; with it on,
/// the base prompt plus a blank line plus [`THINKING_GUIDANCE`].
#[must_use]
pub fn system_prompt(mode: RewriteMode, thinking_mode: bool) -> String {
    if thinking_mode {
        format!("{}\n\n{}", mode.base_prompt(), THINKING_GUIDANCE)
    } else {
        mode.base_prompt().to_owned()
    }
}
