//! Language registry: Single source of truth for all supported languages.
//!
//! This module provides a centralized registry of every language a chat
//! participant can pick as their preferred language. It uses a singleton
//! pattern with `OnceLock` to ensure thread-safe initialization and access.

use std::sync::OnceLock;

use serde::Serialize;

/// Configuration for a supported language.
#[derive(Debug, Clone, Serialize)]
pub struct LanguageConfig {
    /// ISO 639-1 language code (e.g., "en", "hi")
    pub code: &'static str,

    /// English name of the language (e.g., "English", "Hindi")
    pub name: &'static str,

    /// Native name of the language (e.g., "English", "हिन्दी")
    #[serde(rename = "nativeName")]
    pub native_name: &'static str,

    /// Whether this is the fallback language (only one should be true)
    #[serde(rename = "isDefault")]
    pub is_default: bool,
}

/// Global language registry singleton.
///
/// Initialized once on first access and immutable thereafter.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

/// Global registry instance (initialized lazily)
static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global language registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Get a language configuration by its code.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    /// Get all languages, in display order.
    pub fn list(&self) -> &[LanguageConfig] {
        &self.languages
    }

    /// The language assumed when a participant or message does not declare one.
    ///
    /// Falls back to the first entry if no language is flagged as default.
    pub fn default_language(&self) -> &LanguageConfig {
        self.languages
            .iter()
            .find(|lang| lang.is_default)
            .unwrap_or(&self.languages[0])
    }
}

fn language(
    code: &'static str,
    name: &'static str,
    native_name: &'static str,
    is_default: bool,
) -> LanguageConfig {
    LanguageConfig {
        code,
        name,
        native_name,
        is_default,
    }
}

/// English plus the Indian languages offered by the chat language picker.
fn default_languages() -> Vec<LanguageConfig> {
    vec![
        language("en", "English", "English", true),
        language("hi", "Hindi", "हिन्दी", false),
        language("as", "Assamese", "অসমীয়া", false),
        language("bn", "Bengali", "বাংলা", false),
        language("gu", "Gujarati", "ગુજરાતી", false),
        language("kn", "Kannada", "ಕನ್ನಡ", false),
        language("ml", "Malayalam", "മലയാളം", false),
        language("mr", "Marathi", "मराठी", false),
        language("ta", "Tamil", "தமிழ்", false),
        language("te", "Telugu", "తెలుగు", false),
        language("ur", "Urdu", "اردو", false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_get_returns_singleton() {
        let registry1 = LanguageRegistry::get();
        let registry2 = LanguageRegistry::get();

        assert!(std::ptr::eq(registry1, registry2));
    }

    #[test]
    fn test_get_by_code_english() {
        let config = LanguageRegistry::get()
            .get_by_code("en")
            .expect("English should be registered");

        assert_eq!(config.code, "en");
        assert_eq!(config.name, "English");
        assert!(config.is_default);
    }

    #[test]
    fn test_get_by_code_hindi() {
        let config = LanguageRegistry::get()
            .get_by_code("hi")
            .expect("Hindi should be registered");

        assert_eq!(config.name, "Hindi");
        assert_eq!(config.native_name, "हिन्दी");
        assert!(!config.is_default);
    }

    #[test]
    fn test_get_by_code_nonexistent() {
        assert!(LanguageRegistry::get().get_by_code("fr").is_none());
    }

    #[test]
    fn test_list_has_all_picker_languages_in_order() {
        let codes: Vec<&str> = LanguageRegistry::get().list().iter().map(|lang| lang.code).collect();

        assert_eq!(
            codes,
            ["en", "hi", "as", "bn", "gu", "kn", "ml", "mr", "ta", "te", "ur"]
        );
    }

    #[test]
    fn test_exactly_one_default() {
        let defaults = LanguageRegistry::get()
            .list()
            .iter()
            .filter(|lang| lang.is_default)
            .count();
        assert_eq!(defaults, 1);
        assert_eq!(LanguageRegistry::get().default_language().code, "en");
    }

    #[test]
    fn test_language_config_serializes_camel_case() {
        let json = serde_json::to_value(LanguageRegistry::get().default_language()).unwrap();
        assert_eq!(json["code"], "en");
        assert_eq!(json["nativeName"], "English");
        assert_eq!(json["isDefault"], true);
    }
}
