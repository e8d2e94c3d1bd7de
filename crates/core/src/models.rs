use serde::{Deserialize, Serialize};

/// Where a page's text landed inside the concatenated extraction output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageSpan {
    pub source_path: String,
    pub page: u32,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageRef {
    pub source_path: String,
    pub page: u32,
}

/// Text of every page of every input file, concatenated with no separator.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub text: String,
    pub spans: Vec<PageSpan>,
}

impl ExtractedText {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn push_page(&mut self, source_path: &str, page: u32, text: &str) {
        if text.is_empty() {
            return;
        }

        let start = self.text.len();
        self.text.push_str(text);
        self.spans.push(PageSpan {
            source_path: source_path.to_string(),
            page,
            start,
            end: self.text.len(),
        });
    }

    /// Pages overlapping the byte range `start..end`.
    pub fn pages_for(&self, start: usize, end: usize) -> Vec<PageRef> {
        self.spans
            .iter()
            .filter(|span| span.start < end && start < span.end)
            .map(|span| PageRef {
                source_path: span.source_path.clone(),
                page: span.page,
            })
            .collect()
    }
}

/// A chunk as it is stored inside a persisted index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    pub chunk_index: u64,
    pub text: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub pages: Vec<PageRef>,
}

impl IndexedChunk {
    pub fn from_page(&self, page: u32) -> bool {
        self.pages.iter().any(|origin| origin.page == page)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub score: f32,
    pub chunk: IndexedChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub hits: Vec<ScoredChunk>,
}

impl QueryResult {
    pub fn texts(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.chunk.text.as_str()).collect()
    }

    pub fn top(&self) -> Option<&ScoredChunk> {
        self.hits.first()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationConfig {
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { temperature: 0.3 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrganicResult {
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Ranked results of one web search, plus the untouched response body.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub query: String,
    pub organic: Vec<OrganicResult>,
    pub raw: serde_json::Value,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.organic.is_empty()
            && (self.raw.is_null() || self.raw.as_object().is_some_and(|body| body.is_empty()))
    }

    /// Text handed to the extraction prompt. Falls back to the raw body when
    /// the engine returned no organic results.
    pub fn to_prompt_context(&self) -> String {
        if self.organic.is_empty() {
            return self.raw.to_string();
        }

        self.organic
            .iter()
            .map(|result| format!("{}\n{}\n{}", result.title, result.link, result.snippet))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// One output line of an entity lookup, paired with its input entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRow {
    #[serde(rename = "Entity")]
    pub entity: String,
    #[serde(rename = "Information")]
    pub information: String,
}
