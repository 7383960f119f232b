//! Learned question/answer memory.
//!
//! Pairs are captured when a group member replies to a message: the parent
//! text becomes the question, the reply the answer.  Lookup is a linear scan
//! with bidirectional substring containment; the first hit wins.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::subsystems::memory::PersistentStore;

pub const QA_KEY: &str = "qa_pairs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Lowercase and trim.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// First pair whose question contains `text` or is contained in it.
///
/// `text` must already be normalized.  Empty questions and empty text never
/// match.
pub fn find_match<'a>(pairs: &'a [QaPair], text: &str) -> Option<&'a QaPair> {
    if text.is_empty() {
        return None;
    }
    pairs.iter().find(|pair| {
        !pair.question.is_empty()
            && (text.contains(pair.question.as_str()) || pair.question.contains(text))
    })
}

pub struct QaMemory {
    store: PersistentStore,
    /// Maximum number of retained pairs; `0` keeps everything.
    cap: usize,
    write_lock: tokio::sync::Mutex<()>,
}

impl QaMemory {
    pub fn new(store: PersistentStore, cap: usize) -> Self {
        Self {
            store,
            cap,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn pairs(&self) -> Vec<QaPair> {
        self.store.load_or_init(QA_KEY, Vec::new).await
    }

    /// Append a pair and persist the whole collection.
    ///
    /// Timestamps never go backwards even if the wall clock does.  Once the
    /// cap is exceeded the oldest pairs are dropped.  A failed read aborts
    /// before anything is written.
    pub async fn store(&self, question: &str, answer: &str) -> Result<QaPair, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut pairs: Vec<QaPair> = self.store.load(QA_KEY, Vec::new).await?;

        let now = chrono::Utc::now().timestamp_millis();
        let last = pairs.last().map_or(i64::MIN, |p| p.timestamp);
        let pair = QaPair {
            question: normalize(question),
            answer: answer.to_string(),
            timestamp: now.max(last),
        };
        pairs.push(pair.clone());

        if self.cap > 0 && pairs.len() > self.cap {
            let excess = pairs.len() - self.cap;
            pairs.drain(..excess);
            debug!(dropped = excess, cap = self.cap, "qa memory trimmed");
        }

        self.store.save(QA_KEY, &pairs).await?;
        debug!(question = %pair.question, total = pairs.len(), "qa pair stored");
        Ok(pair)
    }

    /// Answer for `text`, if any stored question overlaps it.
    pub async fn lookup(&self, text: &str) -> Option<String> {
        let pairs = self.pairs().await;
        let needle = normalize(text);
        find_match(&pairs, &needle).map(|pair| pair.answer.clone())
    }

    /// Store, logging instead of propagating failures.
    pub async fn capture(&self, question: &str, answer: &str) -> bool {
        match self.store(question, answer).await {
            Ok(_) => true,
            Err(e) => {
                warn!("cannot store qa pair: {e}");
                false
            }
        }
    }
}
