//! Plan records exchanged between the planning, execution, and aggregation stages

use crate::llm::{OutputSchema, StructuredOutput};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One query against one named tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryPlanItem {
    /// Tool to dispatch the query to
    pub name: String,

    /// Natural-language query for the tool
    pub query: String,
}

/// Queries to run in one round
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryPlan {
    pub items: Vec<QueryPlanItem>,
}

impl QueryPlan {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl StructuredOutput for QueryPlan {
    fn output_schema() -> OutputSchema {
        OutputSchema {
            name: "QueryPlan",
            schema: serde_json::json!({
                "type": "object",
                "description": "A plan for a RAG system. After running the plan, we should have either enough information to answer the user's original query, or enough information to form a new query plan.",
                "properties": {
                    "items": {
                        "type": "array",
                        "description": "A list of the QueryPlanItem objects in the plan.",
                        "items": {
                            "type": "object",
                            "description": "A single step in an execution plan for a RAG system.",
                            "properties": {
                                "name": {
                                    "type": "string",
                                    "description": "The name of the tool to use."
                                },
                                "query": {
                                    "type": "string",
                                    "description": "A natural language search query for a RAG system."
                                }
                            },
                            "required": ["name", "query"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["items"],
                "additionalProperties": false
            }),
        }
    }
}

/// Renders as `items=[QueryPlanItem(name='..', query='..'), ...]`
impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("items=[")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                "QueryPlanItem(name={}, query={})",
                quoted(&item.name),
                quoted(&item.query)
            )?;
        }
        f.write_str("]")
    }
}

/// Single-quoted literal; double quotes when the text has a `'` but no `"`
fn quoted(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Answer to one plan item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryPlanItemResult {
    pub query: String,
    pub result: String,
}

/// Aggregated text of one executed round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutedPlanEvent {
    pub result: String,
}

impl ExecutedPlanEvent {
    /// Join results in plan order as `"{n}. {query}: {result}"` blocks
    pub fn aggregate(results: &[QueryPlanItemResult]) -> Self {
        let result = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}: {}", i + 1, r.query, r.result))
            .collect::<Vec<_>>()
            .join("\n------\n");

        Self { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(query: &str, result: &str) -> QueryPlanItemResult {
        QueryPlanItemResult {
            query: query.to_string(),
            result: result.to_string(),
        }
    }

    #[test]
    fn test_aggregate_format() {
        let event = ExecutedPlanEvent::aggregate(&[
            result("What is the term?", "Five years."),
            result("Is there a renewal?", "Yes, automatic."),
        ]);
        assert_eq!(
            event.result,
            "1. What is the term?: Five years.\n------\n2. Is there a renewal?: Yes, automatic."
        );
    }

    #[test]
    fn test_aggregate_empty_round() {
        assert_eq!(ExecutedPlanEvent::aggregate(&[]).result, "");
    }

    #[test]
    fn test_plan_parses_structured_output() {
        let plan: QueryPlan = serde_json::from_value(serde_json::json!({
            "items": [{ "name": "workflows_tool", "query": "What is the term?" }]
        }))
        .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.items[0].name, "workflows_tool");
    }

    #[test]
    fn test_plan_display() {
        let plan = QueryPlan {
            items: vec![
                QueryPlanItem {
                    name: "workflows_tool".to_string(),
                    query: "term".to_string(),
                },
                QueryPlanItem {
                    name: "workflows_tool".to_string(),
                    query: "renewal".to_string(),
                },
            ],
        };
        assert_eq!(
            plan.to_string(),
            "items=[QueryPlanItem(name='workflows_tool', query='term'), \
             QueryPlanItem(name='workflows_tool', query='renewal')]"
        );
        assert_eq!(QueryPlan::default().to_string(), "items=[]");
    }

    #[test]
    fn test_plan_display_quotes_like_a_repr() {
        assert_eq!(quoted("term"), "'term'");
        assert_eq!(quoted("tenant's rights"), "\"tenant's rights\"");
        assert_eq!(quoted(r#"it's "odd""#), r#"'it\'s "odd"'"#);
        assert_eq!(quoted("a\nb\\c"), r"'a\nb\\c'");
    }

    #[test]
    fn test_schema_is_strict() {
        let schema = QueryPlan::output_schema().schema;
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["items"]["items"]["additionalProperties"], false);
        assert_eq!(schema["required"], serde_json::json!(["items"]));
    }
}
