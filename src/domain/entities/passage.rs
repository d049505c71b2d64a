use serde::{Deserialize, Serialize};

/// Id is `"{source}#{index}"`, stable across indices and restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub source: Option<String>,
    pub chunk_index: usize,
}

impl Passage {
    pub fn new(source: impl Into<String>, text: impl Into<String>, chunk_index: usize) -> Self {
        let source = source.into();
        Self {
            id: format!("{source}#{chunk_index}"),
            text: text.into(),
            source: Some(source),
            chunk_index,
        }
    }

    pub fn citation(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub passage: Passage,
    pub score: f32,
}

impl SearchResult {
    pub fn new(passage: Passage, score: f32) -> Self {
        Self { passage, score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Vector,
    Keyword,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vector => f.write_str("vector"),
            Self::Keyword => f.write_str("keyword"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub results: Vec<SearchResult>,
    /// Set when one index failed and the ranking came from the other alone.
    pub degraded: Option<IndexKind>,
}

impl RetrievalResult {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            degraded: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn passage_ids(&self) -> Vec<String> {
        self.results.iter().map(|r| r.passage.id.clone()).collect()
    }
}

/// Joins paragraphs up to `chunk_size`; each new passage starts with the
/// last `overlap` characters of the previous one.
pub fn chunk_content(source: &str, content: &str, chunk_size: usize, overlap: usize) -> Vec<Passage> {
    let paragraphs: Vec<&str> = content
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut passages = Vec::new();
    let mut current = String::new();
    let mut chunk_index = 0;

    for paragraph in paragraphs {
        let would_exceed =
            !current.is_empty() && current.len() + paragraph.len() + 2 > chunk_size;

        if would_exceed {
            let carried = tail_chars(&current, overlap).to_string();
            passages.push(Passage::new(source, std::mem::take(&mut current), chunk_index));
            chunk_index += 1;
            current = carried;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        passages.push(Passage::new(source, current, chunk_index));
    }

    passages
}

fn tail_chars(text: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }
    let start = text
        .char_indices()
        .rev()
        .nth(count - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].trim_start()
}
