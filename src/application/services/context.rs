use crate::domain::RetrievalResult;

pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Renders ranked passages as one prompt block, each tagged with its source.
///
/// An empty result renders as an empty string.
pub fn format_context(result: &RetrievalResult) -> String {
    result
        .results
        .iter()
        .map(|r| format!("[Source: {}]\n{}", r.passage.citation(), r.passage.text.trim()))
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Passage, SearchResult};

    #[test]
    fn test_empty_result_formats_to_empty_string() {
        assert_eq!(format_context(&RetrievalResult::default()), "");
    }

    #[test]
    fn test_passages_keep_rank_order_and_sources() {
        let result = RetrievalResult::new(vec![
            SearchResult::new(Passage::new("myopia.md", "Myopia blurs distance vision.", 0), 0.9),
            SearchResult::new(Passage::new("lenses.md", " Concave lenses correct it. ", 2), 0.4),
        ]);

        let context = format_context(&result);

        assert_eq!(
            context,
            "[Source: myopia.md]\nMyopia blurs distance vision.\n\n---\n\n[Source: lenses.md]\nConcave lenses correct it."
        );
    }

    #[test]
    fn test_passage_without_source_is_cited_by_id() {
        let passage = Passage {
            id: "faq#3".into(),
            text: "Bring your glasses.".into(),
            source: None,
            chunk_index: 3,
        };
        let result = RetrievalResult::new(vec![SearchResult::new(passage, 1.0)]);

        assert!(format_context(&result).starts_with("[Source: faq#3]"));
    }
}
