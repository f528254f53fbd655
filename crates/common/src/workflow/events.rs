use super::QueryPlan;
use serde::Serialize;

/// Progress event written to the workflow's event stream
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A plan was produced for `round` (1-based)
    Planned { round: usize, plan: QueryPlan },

    /// A plan item is about to be sent to a tool
    ToolQueried { tool: String, query: String },

    /// A tool answered a plan item
    ToolReturned { tool: String, result: String },
}

impl WorkflowEvent {
    /// Human-readable status line
    pub fn msg(&self) -> String {
        match self {
            Self::Planned { round: 1, plan } => format!("Planning step: {}", plan),
            Self::Planned { plan, .. } => format!("Re-Planning step: {}", plan),
            Self::ToolQueried { tool, query } => {
                format!("Querying tool {} with query: {}", tool, query)
            }
            Self::ToolReturned { tool, result } => format!("Tool {} returned: {}", tool, result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::QueryPlanItem;

    #[test]
    fn test_messages() {
        let plan = QueryPlan {
            items: vec![QueryPlanItem {
                name: "workflows_tool".to_string(),
                query: "term".to_string(),
            }],
        };

        assert_eq!(
            WorkflowEvent::Planned { round: 1, plan: plan.clone() }.msg(),
            "Planning step: items=[QueryPlanItem(name='workflows_tool', query='term')]"
        );
        assert_eq!(
            WorkflowEvent::Planned { round: 2, plan }.msg(),
            "Re-Planning step: items=[QueryPlanItem(name='workflows_tool', query='term')]"
        );
        assert_eq!(
            WorkflowEvent::ToolQueried {
                tool: "workflows_tool".to_string(),
                query: "term".to_string()
            }
            .msg(),
            "Querying tool workflows_tool with query: term"
        );
        assert_eq!(
            WorkflowEvent::ToolReturned {
                tool: "workflows_tool".to_string(),
                result: "Five years.".to_string()
            }
            .msg(),
            "Tool workflows_tool returned: Five years."
        );
    }
}
