//! Prompt templates for planning and decisions

/// Opening text of every decision prompt
pub const DECISION_PREAMBLE: &str = "Given the following information, return a final response that satisfies the original query, or return 'PLAN' if you need to continue planning.";

/// Marker in a decision reply that requests another planning round
pub const REPLAN_MARKER: &str = "PLAN";

pub fn planning_prompt(context: &str, query: &str) -> String {
    format!(
        "Think step by step. Given an initial query, as well as information about the indexes you can query, return a plan for a RAG system.\n\
        The plan should be a list of QueryPlanItem objects, where each object contains a query.\n\
        The result of executing an entire plan should provide a result that is a substantial answer to the initial query, \
        or enough information to form a new query plan.\n\
        Sources you can query: {}\n\
        Initial query: {}\n\
        Plan:",
        context, query
    )
}

pub fn decision_prompt(query: &str, results: &str) -> String {
    format!(
        "{}\nOriginal query: {}\nCurrent results: {}\n",
        DECISION_PREAMBLE, query, results
    )
}

/// Whether a decision reply asks for re-planning (substring match, case-sensitive)
pub fn requests_replan(decision: &str) -> bool {
    decision.contains(REPLAN_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_prompt_embeds_context_and_query() {
        let prompt = planning_prompt("1. workflows_tool: ", "What is the term?");
        assert!(prompt.contains("Sources you can query: 1. workflows_tool: \n"));
        assert!(prompt.contains("Initial query: What is the term?\n"));
        assert!(prompt.ends_with("Plan:"));
        assert!(!prompt.starts_with(DECISION_PREAMBLE));
    }

    #[test]
    fn test_decision_prompt_layout() {
        let prompt = decision_prompt("q", "1. a: b");
        assert!(prompt.starts_with(DECISION_PREAMBLE));
        assert!(prompt.ends_with("Original query: q\nCurrent results: 1. a: b\n"));
    }

    #[test]
    fn test_replan_detection() {
        assert!(requests_replan("PLAN"));
        assert!(requests_replan("PLAN, need more data"));
        assert!(requests_replan("I will EXPLAN further"));
        assert!(!requests_replan("The answer is 42."));
        assert!(!requests_replan("plan more"));
    }
}
