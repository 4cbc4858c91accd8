use serde::{Deserialize, Serialize};

pub mod memory;

/// Code saved by a caller for sharing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub language: String,
    pub code: String,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnippetId(pub String);

/// Keyed storage for shared snippets, safe to use from many requests at once.
#[mockall::automock]
pub trait SnippetStore: std::fmt::Debug + Send + Sync {
    fn save(&self, language: &str, code: &str) -> SnippetId;

    fn get(&self, id: &SnippetId) -> Option<Snippet>;
}
