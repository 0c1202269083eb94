//! Supported notification languages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of languages reminders are written in.
///
/// Every locale maps onto exactly one variant; anything unrecognised falls
/// back to [`Language::English`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Czech,
    #[default]
    English,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Language; 2] = [Language::Czech, Language::English];

    /// Map a locale tag (`cs_CZ`, `en-US`, `cs`) onto a supported language.
    pub fn from_locale(locale: &str) -> Self {
        let base = locale
            .trim()
            .split(['_', '-'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match base.as_str() {
            "cs" => Self::Czech,
            _ => Self::English,
        }
    }

    /// Two-letter language code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Czech => "cs",
            Self::English => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
