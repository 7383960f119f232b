//! Admin-configured keyword rules, fallback replies and reaction glyphs.
//!
//! Two records back this module:
//!
//! * `keyword_responses`: `[{"pattern": …, "response": …}]`, first match wins;
//! * `responses`: `{"question_replies": […], "reactions": […]}`.
//!
//! Both are rewritten whole on every update.  Compiled matchers are cached
//! against the raw rule list and only rebuilt when the stored list changes.

use std::sync::{Arc, Mutex};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::subsystems::memory::PersistentStore;

pub const RULES_KEY: &str = "keyword_responses";
pub const RESPONSES_KEY: &str = "responses";

const PATTERN_SIZE_LIMIT: usize = 1 << 20;

const DEFAULT_GLYPHS: &[&str] = &[
    "👍", "❤️", "🔥", "👏", "😁", "🤔", "😮", "😢", "😮‍💨", "💯",
];

pub fn default_glyphs() -> Vec<String> {
    DEFAULT_GLYPHS.iter().map(|g| g.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub pattern: String,
    pub response: String,
}

/// Fallback replies plus reaction glyphs, persisted as one record.
///
/// A missing `reactions` field means the default glyphs; an explicit empty
/// list means reactions are switched off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSet {
    #[serde(default)]
    pub question_replies: Vec<String>,
    #[serde(default = "default_glyphs")]
    pub reactions: Vec<String>,
}

impl Default for ResponseSet {
    fn default() -> Self {
        Self {
            question_replies: Vec::new(),
            reactions: default_glyphs(),
        }
    }
}

/// Build a case-insensitive matcher for an admin-supplied pattern.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
}

#[derive(Debug)]
pub struct CompiledRule {
    matcher: Regex,
    response: String,
}

/// Compile rules in order.  Patterns that do not compile are skipped.
pub fn compile(rules: &[KeywordRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| match compile_pattern(&rule.pattern) {
            Ok(matcher) => Some(CompiledRule {
                matcher,
                response: rule.response.clone(),
            }),
            Err(e) => {
                warn!(pattern = %rule.pattern, "skipping keyword rule: {e}");
                None
            }
        })
        .collect()
}

/// Snapshot of the rule state for one event.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Arc<Vec<CompiledRule>>,
    pub responses: ResponseSet,
}

impl RuleSet {
    pub fn new(rules: Arc<Vec<CompiledRule>>, responses: ResponseSet) -> Self {
        Self { rules, responses }
    }

    /// Response of the first rule whose pattern matches `text`.
    pub fn match_text(&self, text: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matcher.is_match(text))
            .map(|rule| rule.response.as_str())
    }
}

type CompiledCache = Option<(Vec<KeywordRule>, Arc<Vec<CompiledRule>>)>;

pub struct RuleRepository {
    store: PersistentStore,
    cache: Mutex<CompiledCache>,
    /// Serialises read-modify-write updates within this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl RuleRepository {
    pub fn new(store: PersistentStore) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn rules(&self) -> Vec<KeywordRule> {
        self.store.load_or_init(RULES_KEY, Vec::new).await
    }

    pub async fn responses(&self) -> ResponseSet {
        self.store.load_or_init(RESPONSES_KEY, ResponseSet::default).await
    }

    /// Reload both records and return a matcher snapshot.
    pub async fn load(&self) -> RuleSet {
        let raw = self.rules().await;
        let responses = self.responses().await;
        RuleSet::new(self.compiled(raw), responses)
    }

    fn compiled(&self, raw: Vec<KeywordRule>) -> Arc<Vec<CompiledRule>> {
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((cached_raw, compiled)) = cache.as_ref() {
            if *cached_raw == raw {
                return compiled.clone();
            }
        }
        let compiled = Arc::new(compile(&raw));
        debug!(rules = raw.len(), compiled = compiled.len(), "keyword rules compiled");
        *cache = Some((raw, compiled.clone()));
        compiled
    }

    /// Replace the full rule list.
    pub async fn replace_rules(&self, rules: Vec<KeywordRule>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.save(RULES_KEY, &rules).await
    }

    /// Replace the full response set.
    pub async fn replace_responses(&self, responses: ResponseSet) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.store.save(RESPONSES_KEY, &responses).await
    }

    /// Read-modify-write the rule list under the write lock.  A failed read
    /// aborts without writing.
    pub async fn update_rules<R>(
        &self,
        f: impl FnOnce(&mut Vec<KeywordRule>) -> R,
    ) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.store.load(RULES_KEY, Vec::new).await?;
        let out = f(&mut rules);
        self.store.save(RULES_KEY, &rules).await?;
        Ok(out)
    }

    /// Read-modify-write the response set under the write lock.
    pub async fn update_responses<R>(
        &self,
        f: impl FnOnce(&mut ResponseSet) -> R,
    ) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut responses = self.store.load(RESPONSES_KEY, ResponseSet::default).await?;
        let out = f(&mut responses);
        self.store.save(RESPONSES_KEY, &responses).await?;
        Ok(out)
    }
}
