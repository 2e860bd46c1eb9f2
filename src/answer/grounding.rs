//! Grounding citations attached to generated answers

use serde::Deserialize;

/// A citation backing part of an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundingSource {
    /// Public web page
    Web {
        uri: Option<String>,
        title: Option<String>,
    },
    /// Document retrieved from the rules datastore
    RetrievedContext {
        uri: Option<String>,
        title: Option<String>,
    },
}

impl GroundingSource {
    /// Source location
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Web { uri, .. } | Self::RetrievedContext { uri, .. } => uri.as_deref(),
        }
    }

    /// Source title
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Web { title, .. } | Self::RetrievedContext { title, .. } => title.as_deref(),
        }
    }

    /// Title if present, else the URI, else a generic label
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title()
            .filter(|t| !t.is_empty())
            .or_else(|| self.uri())
            .unwrap_or("untitled source")
    }

    /// Whether the source came from the rules datastore
    #[must_use]
    pub const fn is_retrieved(&self) -> bool {
        matches!(self, Self::RetrievedContext { .. })
    }
}

/// `groundingMetadata` block of a Gemini candidate
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    pub web_search_queries: Vec<String>,
}

/// One grounding chunk; at most one of the fields is set
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingChunk {
    pub web: Option<ChunkRef>,
    pub retrieved_context: Option<ChunkRef>,
}

/// URI/title pair inside a chunk
#[derive(Debug, Default, Deserialize)]
pub struct ChunkRef {
    pub uri: Option<String>,
    pub title: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

/// Convert grounding chunks to sources, preserving API order
///
/// Chunks without a URI are dropped. A datastore document without a title
/// is titled by its URI. No deduplication is performed.
#[must_use]
pub fn normalize(metadata: GroundingMetadata) -> Vec<GroundingSource> {
    if metadata.grounding_chunks.is_empty() && !metadata.web_search_queries.is_empty() {
        tracing::debug!(
            queries = ?metadata.web_search_queries,
            "grounding metadata contains only web search queries"
        );
    }

    metadata
        .grounding_chunks
        .into_iter()
        .filter_map(|chunk| {
            if let Some(web) = chunk.web {
                let uri = non_empty(web.uri)?;
                Some(GroundingSource::Web {
                    uri: Some(uri),
                    title: non_empty(web.title),
                })
            } else if let Some(ctx) = chunk.retrieved_context {
                let uri = non_empty(ctx.uri)?;
                let title = non_empty(ctx.title).unwrap_or_else(|| uri.clone());
                Some(GroundingSource::RetrievedContext {
                    uri: Some(uri),
                    title: Some(title),
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GroundingMetadata {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn preserves_order_and_kinds() {
        let sources = normalize(parse(
            r#"{"groundingChunks": [
                {"retrievedContext": {"uri": "gs://rules/4.A.pdf", "title": "Rule 4.A"}},
                {"web": {"uri": "https://usapickleball.org", "title": "USA Pickleball"}},
                {"retrievedContext": {"uri": "gs://rules/4.A.pdf", "title": "Rule 4.A"}}
            ]}"#,
        ));

        assert_eq!(sources.len(), 3);
        assert!(sources[0].is_retrieved());
        assert!(!sources[1].is_retrieved());
        assert_eq!(sources[0], sources[2]);
        assert_eq!(sources[1].display_title(), "USA Pickleball");
    }

    #[test]
    fn retrieved_title_defaults_to_uri() {
        let sources = normalize(parse(
            r#"{"groundingChunks": [{"retrievedContext": {"uri": "gs://rules/7.pdf"}}]}"#,
        ));
        assert_eq!(sources[0].title(), Some("gs://rules/7.pdf"));
    }

    #[test]
    fn drops_chunks_without_uri() {
        let sources = normalize(parse(
            r#"{"groundingChunks": [
                {"retrievedContext": {"title": "orphan"}},
                {"web": {"title": "no link"}},
                {}
            ]}"#,
        ));
        assert!(sources.is_empty());
    }

    #[test]
    fn untitled_web_source_falls_back_to_uri() {
        let sources = normalize(parse(
            r#"{"groundingChunks": [{"web": {"uri": "https://example.com/rules"}}]}"#,
        ));
        assert_eq!(sources[0].title(), None);
        assert_eq!(sources[0].display_title(), "https://example.com/rules");
    }
}
