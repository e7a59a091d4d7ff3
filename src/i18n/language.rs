//! Language type: validated language representation.
//!
//! Wire frames carry language codes as plain strings because remote peers may
//! send anything. `Language` is used wherever this process chooses a language
//! itself (configuration, the language picker), so only supported codes get in.

use std::fmt;

use thiserror::Error;

use crate::i18n::{LanguageConfig, LanguageRegistry};

/// Error returned when a code is not in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown language code: '{0}'")]
pub struct UnknownLanguage(pub String);

/// A validated language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Language {
    /// ISO 639-1 language code (e.g., "en", "hi")
    code: &'static str,
}

impl Language {
    pub const ENGLISH: Language = Language { code: "en" };

    pub const HINDI: Language = Language { code: "hi" };

    /// Create a Language from a language code string.
    ///
    /// Codes are matched after trimming and lowercasing, so `" HI "` is Hindi.
    ///
    /// # Example
    /// ```ignore
    /// let hindi = Language::from_code("hi")?;
    /// ```
    pub fn from_code(code: &str) -> Result<Language, UnknownLanguage> {
        let normalized = code.trim().to_ascii_lowercase();
        LanguageRegistry::get()
            .get_by_code(&normalized)
            .map(|config| Language { code: config.code })
            .ok_or_else(|| UnknownLanguage(code.to_string()))
    }

    /// The language assumed when none is declared.
    pub fn fallback() -> Language {
        Language {
            code: LanguageRegistry::get().default_language().code,
        }
    }

    /// Get the ISO 639-1 language code.
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the full language configuration from the registry.
    ///
    /// # Panics
    /// Panics if the language code is not found in the registry, which cannot
    /// happen for values built through `from_code` or the constants.
    pub fn config(&self) -> &'static LanguageConfig {
        LanguageRegistry::get()
            .get_by_code(self.code)
            .expect("Language code should always be valid")
    }

    /// English name of the language.
    pub fn name(&self) -> &'static str {
        self.config().name
    }

    /// Name of the language in its own script.
    pub fn native_name(&self) -> &'static str {
        self.config().native_name
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::fallback()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(Language::ENGLISH.code(), "en");
        assert_eq!(Language::ENGLISH.name(), "English");
        assert_eq!(Language::HINDI.code(), "hi");
        assert_eq!(Language::HINDI.name(), "Hindi");
    }

    #[test]
    fn test_from_code_valid() {
        let language = Language::from_code("ta").expect("Should succeed");
        assert_eq!(language.code(), "ta");
        assert_eq!(language.name(), "Tamil");
    }

    #[test]
    fn test_from_code_normalizes_case_and_whitespace() {
        assert_eq!(Language::from_code(" HI ").unwrap(), Language::HINDI);
    }

    #[test]
    fn test_from_code_invalid() {
        let result = Language::from_code("fr");
        assert_eq!(result, Err(UnknownLanguage("fr".to_string())));
        assert!(result.unwrap_err().to_string().contains("Unknown"));
    }

    #[test]
    fn test_from_code_empty() {
        assert!(Language::from_code("").is_err());
    }

    #[test]
    fn test_fallback_is_english() {
        assert_eq!(Language::fallback(), Language::ENGLISH);
        assert_eq!(Language::default(), Language::ENGLISH);
    }

    #[test]
    fn test_display_is_code() {
        assert_eq!(Language::HINDI.to_string(), "hi");
    }

    #[test]
    fn test_native_name() {
        assert_eq!(Language::ENGLISH.native_name(), "English");
        assert_eq!(Language::HINDI.native_name(), "हिन्दी");
    }
}
