//! Per-user deduplicated document store
//!
//! Holds the personal context documents the reasoning stage retrieves when
//! assembling its context window. Documents are deduplicated per user by a
//! SHA-256 content hash: re-submitting identical content bumps the usage
//! counter on the existing document instead of creating a second one, which
//! also resolves concurrent duplicate inserts without surfacing an error.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;
use tracing::debug;
use uuid::Uuid;

/// A user-owned context document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable document identifier
    pub id: String,

    /// SHA-256 of the content; dedup key within a user's document set
    pub content_hash: String,

    /// Display name
    pub name: String,

    /// Document body
    pub body: String,

    /// Type tag, e.g. "contact-list", "bank-notice"
    pub doc_type: String,

    /// Free-form tags used for retrieval ranking
    pub tags: Vec<String>,

    /// When the document was first stored
    pub created_at: SystemTime,

    /// When the document was last returned by a query
    pub last_used: SystemTime,

    /// How many times the document was submitted or retrieved
    pub usage_count: u64,
}

/// Aggregate statistics over a user's document set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Number of documents
    pub count: usize,

    /// Document count per tag
    pub by_tag: BTreeMap<String, usize>,

    /// Document count per type
    pub by_type: BTreeMap<String, usize>,
}

/// In-memory per-user document repository
///
/// All mutation happens inside a single write-lock scope, so every operation
/// is atomic with respect to concurrent callers.
pub struct ContextStore {
    users: RwLock<HashMap<String, HashMap<String, Document>>>,
}

impl ContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Idempotent insert keyed by (user, content hash)
    ///
    /// Identical content for the same user returns the existing document
    /// with its usage counter bumped; the document count increases by at
    /// most one no matter how many times the same content is submitted.
    pub fn put(
        &self,
        user_id: &str,
        name: impl Into<String>,
        content: impl Into<String>,
        doc_type: impl Into<String>,
        tags: Vec<String>,
    ) -> Document {
        let content = content.into();
        let hash = content_hash(&content);
        let now = SystemTime::now();

        let mut users = self.users.write();
        let docs = users.entry(user_id.to_string()).or_default();

        let doc = docs
            .entry(hash.clone())
            .and_modify(|existing| {
                existing.usage_count += 1;
                existing.last_used = now;
            })
            .or_insert_with(|| Document {
                id: Uuid::new_v4().to_string(),
                content_hash: hash,
                name: name.into(),
                body: content,
                doc_type: doc_type.into(),
                tags,
                created_at: now,
                last_used: now,
                usage_count: 1,
            });

        debug!(user = user_id, doc = %doc.id, usage = doc.usage_count, "document put");
        doc.clone()
    }

    /// Retrieve at most `k` documents ranked by relevance to `topic`
    ///
    /// Relevance weighs tag matches over name matches over body term
    /// overlap; ties break toward the most recently used document.
    /// Returned documents have their usage counters refreshed.
    pub fn query(&self, user_id: &str, topic: &str, k: usize) -> Vec<Document> {
        let terms: Vec<String> = topic
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut users = self.users.write();
        let Some(docs) = users.get_mut(user_id) else {
            return Vec::new();
        };

        let mut ranked: Vec<(u32, SystemTime, String)> = docs
            .values()
            .filter_map(|doc| {
                let score = relevance(doc, &terms);
                (score > 0).then(|| (score, doc.last_used, doc.content_hash.clone()))
            })
            .collect();

        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        ranked.truncate(k);

        let now = SystemTime::now();
        ranked
            .into_iter()
            .filter_map(|(_, _, hash)| {
                let doc = docs.get_mut(&hash)?;
                doc.last_used = now;
                doc.usage_count += 1;
                Some(doc.clone())
            })
            .collect()
    }

    /// Look up a document by id
    pub fn get(&self, user_id: &str, doc_id: &str) -> Option<Document> {
        let users = self.users.read();
        users
            .get(user_id)?
            .values()
            .find(|d| d.id == doc_id)
            .cloned()
    }

    /// List a user's documents, optionally filtered by tag and/or type
    pub fn list(
        &self,
        user_id: &str,
        tag: Option<&str>,
        doc_type: Option<&str>,
    ) -> Vec<Document> {
        let users = self.users.read();
        let Some(docs) = users.get(user_id) else {
            return Vec::new();
        };

        let mut out: Vec<Document> = docs
            .values()
            .filter(|d| tag.map_or(true, |t| d.tags.iter().any(|dt| dt == t)))
            .filter(|d| doc_type.map_or(true, |t| d.doc_type == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Delete a document by id; returns whether anything was removed
    pub fn delete(&self, user_id: &str, doc_id: &str) -> bool {
        let mut users = self.users.write();
        let Some(docs) = users.get_mut(user_id) else {
            return false;
        };
        let hash = docs
            .values()
            .find(|d| d.id == doc_id)
            .map(|d| d.content_hash.clone());
        match hash {
            Some(h) => docs.remove(&h).is_some(),
            None => false,
        }
    }

    /// Aggregate statistics for a user's document set
    pub fn stats(&self, user_id: &str) -> DocumentStats {
        let users = self.users.read();
        let mut stats = DocumentStats {
            count: 0,
            by_tag: BTreeMap::new(),
            by_type: BTreeMap::new(),
        };

        if let Some(docs) = users.get(user_id) {
            stats.count = docs.len();
            for doc in docs.values() {
                *stats.by_type.entry(doc.doc_type.clone()).or_insert(0) += 1;
                for tag in &doc.tags {
                    *stats.by_tag.entry(tag.clone()).or_insert(0) += 1;
                }
            }
        }

        stats
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 content hash as lowercase hex
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Tag matches outweigh name matches outweigh body term overlap
fn relevance(doc: &Document, terms: &[String]) -> u32 {
    let name = doc.name.to_lowercase();
    let body = doc.body.to_lowercase();

    let mut score = 0;
    for term in terms {
        if doc.tags.iter().any(|t| t.to_lowercase() == *term) {
            score += 4;
        } else if doc.tags.iter().any(|t| t.to_lowercase().contains(term)) {
            score += 2;
        }
        if name.contains(term) {
            score += 2;
        }
        if body.contains(term) {
            score += 1;
        }
    }
    score
}
