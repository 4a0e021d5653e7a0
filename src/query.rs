//! Stock-filtered retrieval and answer generation.

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkId;
use crate::embedding::Embed;
use crate::error::Result;
use crate::generation::Generate;
use crate::indexing::ChunkIndex;
use crate::spinner::with_spinner;

pub const PROMPT_TEMPLATE: &str = "
請完全根據以下個股投資報告用繁體中文回答問題

{context}

---

請完全根據上述投資報告的資料用繁體中文回答此問題: {question}
";

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    /// Ids of the retrieved chunks, closest first.
    pub sources: Vec<ChunkId>,
}

pub fn build_context<'a>(contents: impl IntoIterator<Item = &'a str>) -> String {
    contents.into_iter().collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

/// Substitutes both placeholders in one pass so text inside `context` is never
/// treated as a placeholder.
pub fn render_prompt(context: &str, question: &str) -> String {
    let mut out = String::with_capacity(PROMPT_TEMPLATE.len() + context.len() + question.len());
    let mut rest = PROMPT_TEMPLATE;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        if let Some(value) = tail
            .strip_prefix("{context}")
            .map(|r| (context, r))
            .or_else(|| tail.strip_prefix("{question}").map(|r| (question, r)))
        {
            out.push_str(value.0);
            rest = value.1;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Answers questions against one stock's chunks.
pub struct QueryRouter<'a, E: Embed, G: Generate> {
    index: &'a ChunkIndex,
    embedder: &'a mut E,
    generator: &'a G,
    top_k: usize,
    spinner: bool,
}

impl<'a, E: Embed, G: Generate> QueryRouter<'a, E, G> {
    pub fn new(index: &'a ChunkIndex, embedder: &'a mut E, generator: &'a G) -> Self {
        Self {
            index,
            embedder,
            generator,
            top_k: DEFAULT_TOP_K,
            spinner: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_spinner(mut self, enabled: bool) -> Self {
        self.spinner = enabled;
        self
    }

    /// Retrieves the `top_k` closest chunks labelled `stock` and generates an answer.
    ///
    /// No match is not an error: the prompt is still rendered with an empty context.
    pub fn query(&mut self, question: &str, stock: &str) -> Result<QueryResponse> {
        self.index.check_model(self.embedder.model_name())?;
        let query_vector = self.embedder.embed_query(question)?;
        let hits = self.index.similarity_search(&query_vector, self.top_k, stock)?;
        log::info!("retrieved {} chunks for stock {}", hits.len(), stock);
        for hit in &hits {
            log::debug!("{} distance {:.4}", hit.entry.id, hit.distance);
        }

        let context = build_context(hits.iter().map(|h| h.entry.content.as_str()));
        let prompt = render_prompt(&context, question);

        let generator = self.generator;
        let response = with_spinner(self.spinner, "LLM 正在生成答案，請稍候...", || {
            generator.generate(&prompt)
        })?;

        Ok(QueryResponse {
            response,
            sources: hits.into_iter().map(|h| h.entry.id.clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_places_context_before_question() {
        let prompt = render_prompt("營收 100 億", "營收多少?");
        let ctx = prompt.find("營收 100 億").unwrap();
        let q = prompt.find("回答此問題: 營收多少?").unwrap();
        assert!(ctx < q);
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn braces_in_context_are_left_alone() {
        let prompt = render_prompt("{question} {x}", "Q");
        assert!(prompt.contains("{question} {x}"));
        assert!(prompt.ends_with("回答此問題: Q\n"));
    }

    #[test]
    fn context_joins_with_separator() {
        assert_eq!(build_context(["a", "b"]), "a\n\n---\n\nb");
        assert_eq!(build_context(std::iter::empty()), "");
    }
}
