//! Translation cache and the external translation lookup it wraps.
//!
//! `TranslationCache::translate` never fails: a lookup error, a malformed
//! response or an empty result all degrade to returning the input text, and
//! nothing is cached for that key so the next call retries the lookup.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::i18n::TranslationMetrics;

/// Public endpoint used by the original mobile client.
pub const DEFAULT_TRANSLATE_API_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Failure signal from the external lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("translation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("translation API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("malformed translation response: {0}")]
    Malformed(String),
    #[error("translation service returned an empty result")]
    Empty,
}

/// External translation collaborator.
///
/// Assumed rate-limited and unreliable; the cache keeps at most one call per
/// uncached key in flight and shares its result with overlapping callers.
#[async_trait]
pub trait TranslationLookup: Send + Sync {
    async fn lookup(&self, text: &str, source: &str, target: &str) -> Result<String, LookupError>;
}

/// Lookup against the Google `translate_a/single` endpoint (`client=gtx`).
pub struct GoogleTranslateLookup {
    client: reqwest::Client,
    api_url: String,
}

impl GoogleTranslateLookup {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl TranslationLookup for GoogleTranslateLookup {
    async fn lookup(&self, text: &str, source: &str, target: &str) -> Result<String, LookupError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(LookupError::Status { status, body });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LookupError::Malformed(e.to_string()))?;

        parse_gtx_response(&body)
    }
}

/// Join the translated segments of a `gtx` response: `[[["seg", "src", ..], ..], ..]`.
fn parse_gtx_response(body: &Value) -> Result<String, LookupError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| LookupError::Malformed("missing segment list".to_string()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    if translated.trim().is_empty() {
        return Err(LookupError::Empty);
    }
    Ok(translated)
}

/// Cache key: `(sourceLanguage, targetLanguage, normalizedText)`.
///
/// The lookup itself receives the caller's raw text, so whichever whitespace
/// variant of a phrase is translated first becomes the cached result for all
/// variants sharing its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: String,
    target: String,
    text: String,
}

impl CacheKey {
    pub fn new(source: &str, target: &str, text: &str) -> Self {
        Self {
            source: normalize_language(source),
            target: normalize_language(target),
            text: normalize_text(text),
        }
    }
}

fn normalize_language(code: &str) -> String {
    code.trim().to_ascii_lowercase()
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    whitespace.replace_all(text.trim(), " ").into_owned()
}

/// A lookup shared by every caller missing on the same key; `None` on failure.
type PendingLookup = Shared<BoxFuture<'static, Option<String>>>;

#[derive(Default)]
struct CacheStore {
    entries: HashMap<CacheKey, String>,
    insertion_order: VecDeque<CacheKey>,
    in_flight: HashMap<CacheKey, PendingLookup>,
}

/// Clears the in-flight slot when the caller that started a lookup finishes
/// or is dropped, so a failed key is looked up again on the next miss.
struct InFlight<'a> {
    store: &'a Mutex<CacheStore>,
    key: CacheKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.store.lock().in_flight.remove(&self.key);
    }
}

/// Memoizing wrapper around a `TranslationLookup`.
pub struct TranslationCache {
    lookup: Arc<dyn TranslationLookup>,
    store: Mutex<CacheStore>,
    capacity: Option<usize>,
    metrics: TranslationMetrics,
}

impl TranslationCache {
    /// Unbounded cache.
    pub fn new(lookup: Arc<dyn TranslationLookup>) -> Self {
        Self {
            lookup,
            store: Mutex::new(CacheStore::default()),
            capacity: None,
            metrics: TranslationMetrics::new(),
        }
    }

    /// Cache holding at most `capacity` entries; the oldest insertion is
    /// evicted first. A capacity of zero disables storage entirely.
    pub fn with_capacity(lookup: Arc<dyn TranslationLookup>, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(lookup)
        }
    }

    /// Translate `text`, consulting the cache first.
    ///
    /// Returns `text` unchanged, without touching the cache, when the
    /// languages match or the text is empty.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        if text.trim().is_empty() || normalize_language(source) == normalize_language(target) {
            return text.to_string();
        }

        let key = CacheKey::new(source, target, text);
        let (pending, started) = {
            let mut store = self.store.lock();
            if let Some(translated) = store.entries.get(&key).cloned() {
                self.metrics.record_cache_hit();
                return translated;
            }
            match store.in_flight.get(&key).cloned() {
                Some(pending) => (pending, false),
                None => {
                    let pending = self.start_lookup(text, source, target);
                    store.in_flight.insert(key.clone(), pending.clone());
                    (pending, true)
                }
            }
        };
        self.metrics.record_cache_miss();

        if !started {
            debug!("Joining in-flight translation {} -> {}", source, target);
            return pending.await.unwrap_or_else(|| text.to_string());
        }

        let _in_flight = InFlight {
            store: &self.store,
            key: key.clone(),
        };
        match pending.await {
            Some(translated) => {
                self.insert(key, translated.clone());
                translated
            }
            None => {
                self.metrics.record_lookup_failure();
                text.to_string()
            }
        }
    }

    fn start_lookup(&self, text: &str, source: &str, target: &str) -> PendingLookup {
        debug!("Translating {} -> {}: {:?}", source, target, text);
        self.metrics.record_lookup();

        let lookup = Arc::clone(&self.lookup);
        let (text, source, target) = (text.to_string(), source.to_string(), target.to_string());
        async move {
            match lookup.lookup(&text, &source, &target).await {
                Ok(translated) if !translated.trim().is_empty() => Some(translated),
                Ok(_) => {
                    warn!("Translation {} -> {} returned empty text, showing original", source, target);
                    None
                }
                Err(e) => {
                    warn!("Translation {} -> {} failed, showing original: {}", source, target, e);
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    fn insert(&self, key: CacheKey, translated: String) {
        if self.capacity == Some(0) {
            return;
        }

        let mut store = self.store.lock();
        if store.entries.contains_key(&key) {
            // Entries are immutable once stored.
            return;
        }
        if let Some(capacity) = self.capacity {
            while store.entries.len() >= capacity {
                match store.insertion_order.pop_front() {
                    Some(oldest) => {
                        store.entries.remove(&oldest);
                        self.metrics.record_eviction();
                    }
                    None => break,
                }
            }
        }
        store.insertion_order.push_back(key.clone());
        store.entries.insert(key, translated);
    }

    /// Number of cached translations.
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> &TranslationMetrics {
        &self.metrics
    }
}
