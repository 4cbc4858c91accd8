use dashmap::DashMap;
use uuid::Uuid;

use crate::store::{Snippet, SnippetId, SnippetStore};

/// Process-wide snippet map. Lives as long as the server does.
#[derive(Debug, Default)]
pub struct InMemorySnippetStore {
    snippets: DashMap<SnippetId, Snippet>,
}

impl InMemorySnippetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }
}

impl SnippetStore for InMemorySnippetStore {
    #[tracing::instrument(skip(code))]
    fn save(&self, language: &str, code: &str) -> SnippetId {
        let id = SnippetId(Uuid::new_v4().simple().to_string());
        let snippet = Snippet {
            language: language.to_string(),
            code: code.to_string(),
            saved_at: chrono::Utc::now(),
        };

        self.snippets.insert(id.clone(), snippet);
        tracing::debug!(id = %id.0, total = self.len(), "snippet saved");
        id
    }

    fn get(&self, id: &SnippetId) -> Option<Snippet> {
        self.snippets.get(id).map(|entry| entry.value().clone())
    }
}
