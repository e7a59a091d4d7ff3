//! Internationalization (i18n) support.
//!
//! - `registry`: every language a participant may choose, with display names
//! - `language`: validated `Language` type built from the registry
//! - `metrics`: translation cache observability
//!
//! # Example
//!
//! ```rust,ignore
//! use lingua_relay::i18n::{Language, LanguageRegistry};
//!
//! let hindi = Language::from_code("hi")?;
//! let languages = LanguageRegistry::get().list();
//! ```

mod language;
mod metrics;
mod registry;

pub use language::{Language, UnknownLanguage};
pub use metrics::{MetricsReport, TranslationMetrics};
pub use registry::{LanguageConfig, LanguageRegistry};
