//! Answer synthesis from retrieved context

use crate::errors::Result;
use crate::llm::LanguageModel;
use crate::retrieval::RetrievedNode;
use std::sync::Arc;

/// Response text when retrieval found nothing
pub const EMPTY_RESPONSE: &str = "Empty Response";

/// Generates an answer to a query from retrieved chunks with a single LLM call
#[derive(Clone)]
pub struct ResponseSynthesizer {
    llm: Arc<dyn LanguageModel>,
}

impl ResponseSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Synthesize an answer; returns [`EMPTY_RESPONSE`] without calling the LLM
    /// when `nodes` is empty
    pub async fn synthesize(&self, query: &str, nodes: &[RetrievedNode]) -> Result<String> {
        if nodes.is_empty() {
            return Ok(EMPTY_RESPONSE.to_string());
        }

        let prompt = build_prompt(query, nodes);
        let answer = self.llm.predict(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}

/// Build the compact question-answering prompt
pub(crate) fn build_prompt(query: &str, nodes: &[RetrievedNode]) -> String {
    let context = nodes
        .iter()
        .map(|n| n.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
        ---------------------\n\
        {}\n\
        ---------------------\n\
        Given the context information and not prior knowledge, answer the query.\n\
        Query: {}\n\
        Answer: ",
        context, query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(text: &str) -> RetrievedNode {
        RetrievedNode {
            id: text.to_string(),
            text: text.to_string(),
            metadata: Default::default(),
            score: 1.0,
        }
    }

    #[test]
    fn test_prompt_contains_context_in_rank_order() {
        let prompt = build_prompt(
            "How long is the term?",
            &[node("The term is five years."), node("Renewal is automatic.")],
        );

        let first = prompt.find("five years").unwrap();
        let second = prompt.find("Renewal").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Query: How long is the term?"));
        assert!(prompt.ends_with("Answer: "));
    }

    #[test]
    fn test_blank_chunks_are_skipped() {
        let prompt = build_prompt("q", &[node("  "), node("kept")]);
        assert!(prompt.contains("---------------------\nkept\n---------------------"));
    }
}
