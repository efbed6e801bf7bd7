//! Filesystem knowledge bases.
//!
//! Layout: `{root}/{knowledge_base}/*.txt|*.md`. Documents are ranked by how
//! many distinct query terms they contain, ties broken by file name, then
//! joined with blank lines and truncated to the character budget.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pipeloom_core::workflow::retriever::{ContextRetriever, RetrieverError};

const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md"];
const DOCUMENT_SEPARATOR: &str = "\n\n";
const MIN_TERM_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct FsContextRetriever {
    root: PathBuf,
    default_max_chars: usize,
}

struct Document {
    name: String,
    content: String,
}

impl FsContextRetriever {
    pub fn new(root: impl Into<PathBuf>, default_max_chars: usize) -> Self {
        Self {
            root: root.into(),
            default_max_chars,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{name}`, refusing names that would escape the root.
    fn knowledge_base_dir(&self, name: &str) -> Result<PathBuf, RetrieverError> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed.contains("..")
            || trimmed.contains('/')
            || trimmed.contains('\\')
        {
            return Err(RetrieverError::Other(format!(
                "invalid knowledge base name '{name}'"
            )));
        }
        Ok(self.root.join(trimmed))
    }

    async fn load_documents(&self, dir: &Path) -> Result<Vec<Document>, RetrieverError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut documents = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_document = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    DOCUMENT_EXTENSIONS
                        .iter()
                        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
                });
            if !is_document || !entry.file_type().await?.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => documents.push(Document { name, content }),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable document");
                }
            }
        }

        Ok(documents)
    }
}

/// Lowercase alphanumeric words of at least [`MIN_TERM_LEN`] characters.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}

fn rank(documents: &mut [Document], query: &str) {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        documents.sort_by(|a, b| a.name.cmp(&b.name));
        return;
    }

    documents.sort_by_cached_key(|doc| {
        let doc_terms = terms(&doc.content);
        let overlap = query_terms.intersection(&doc_terms).count();
        (std::cmp::Reverse(overlap), doc.name.clone())
    });
}

fn truncate_chars(text: &mut String, max_chars: usize) {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
}

impl ContextRetriever for FsContextRetriever {
    async fn retrieve(
        &self,
        knowledge_base: &str,
        query: &str,
        max_chars: Option<usize>,
    ) -> Result<String, RetrieverError> {
        let dir = self.knowledge_base_dir(knowledge_base)?;
        if !tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(RetrieverError::KnowledgeBaseNotFound(
                knowledge_base.to_string(),
            ));
        }

        let mut documents = self.load_documents(&dir).await?;
        rank(&mut documents, query);

        let mut context = documents
            .iter()
            .map(|doc| doc.content.trim())
            .filter(|content| !content.is_empty())
            .collect::<Vec<_>>()
            .join(DOCUMENT_SEPARATOR);
        truncate_chars(&mut context, max_chars.unwrap_or(self.default_max_chars));

        tracing::debug!(
            knowledge_base,
            documents = documents.len(),
            chars = context.chars().count(),
            "context retrieved"
        );
        Ok(context)
    }
}
