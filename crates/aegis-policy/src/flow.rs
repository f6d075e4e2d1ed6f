//! Decision-flow graph evaluator (`spec.md` §4.K/§4.P, §9): a
//! declarative `{nodes, edges}` graph a request traverses node by
//! node. `decision` nodes branch on `prevNode.success`/`prevNode.result.*`
//! in priority order, falling through to a mandatory `default` branch.
//!
//! Cyclic graphs and `decision` nodes without a `default` branch are
//! both rejected at load time (`spec.md` §9: "the source's implicit
//! `default_error` fallback" is deliberately not reproduced here — a
//! missing default is a configuration bug, not a runtime case).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    Login,
    Decision,
    Consent,
    Register,
    LinkAccount,
    Error,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    IsTrue,
    IsFalse,
    Eq,
    Neq,
    In,
    Gt,
    Lt,
}

/// One branch of a `decision` node: `field` is a dot-path evaluated
/// against the engine's result context (`prevNode.success` is
/// addressed as the literal field name `"success"`; everything else is
/// `result.<dot.path>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
    pub target_node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    pub node_type: NodeType,
    /// Priority-ordered branch predicates; only meaningful on `decision`
    /// nodes, empty otherwise.
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    /// Mandatory fallback target for `decision` nodes when no predicate
    /// matches.
    pub default_node_id: Option<String>,
    /// Plain (non-decision) outgoing edge, e.g. `start -> login`.
    pub next_node_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
}

impl FlowGraph {
    fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Validate the graph at load time: every referenced node id exists,
    /// every `decision` node declares a `default_node_id`, and the graph
    /// has no cycles.
    ///
    /// # Errors
    /// Returns [`PolicyError::InvalidFlowGraph`] describing the first
    /// violation found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();

        for node in &self.nodes {
            if node.node_type == NodeType::Decision && node.default_node_id.is_none() {
                return Err(PolicyError::InvalidFlowGraph(format!(
                    "decision node {:?} has no default branch",
                    node.id
                )));
            }
            for target in node.outgoing_targets() {
                if !ids.contains(target.as_str()) {
                    return Err(PolicyError::InvalidFlowGraph(format!(
                        "node {:?} references unknown node {target:?}",
                        node.id
                    )));
                }
            }
        }

        self.reject_cycles()
    }

    fn reject_cycles(&self) -> Result<(), PolicyError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            graph: &'a FlowGraph,
            id: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), PolicyError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(PolicyError::InvalidFlowGraph(format!("cycle detected through node {id:?}")));
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(node) = graph.node(id) {
                for target in node.outgoing_targets() {
                    visit(graph, target, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for node in &self.nodes {
            visit(self, &node.id, &mut marks)?;
        }
        Ok(())
    }

    /// Evaluate a single step from `current_node_id` given the prior
    /// node's outcome, returning the next node id to transition to.
    ///
    /// # Errors
    /// Returns [`PolicyError::NodeNotFound`] if `current_node_id` isn't
    /// in the graph, or [`PolicyError::InvalidFlowGraph`] if a
    /// `decision` node somehow lacks a default (unreachable once
    /// [`validate`](Self::validate) has run, but checked defensively
    /// since this method doesn't require it).
    pub fn step(&self, current_node_id: &str, context: &StepContext) -> Result<String, PolicyError> {
        let node = self
            .node(current_node_id)
            .ok_or_else(|| PolicyError::NodeNotFound(current_node_id.to_string()))?;

        if node.node_type != NodeType::Decision {
            return node
                .next_node_id
                .clone()
                .ok_or_else(|| PolicyError::InvalidFlowGraph(format!("node {current_node_id:?} has no outgoing edge")));
        }

        for predicate in &node.predicates {
            if evaluate_predicate(predicate, context) {
                return Ok(predicate.target_node_id.clone());
            }
        }

        node.default_node_id.clone().ok_or_else(|| {
            PolicyError::InvalidFlowGraph(format!("decision node {current_node_id:?} has no default branch"))
        })
    }
}

impl FlowNode {
    fn outgoing_targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self.predicates.iter().map(|p| p.target_node_id.as_str()).collect();
        if let Some(default) = &self.default_node_id {
            targets.push(default.as_str());
        }
        if let Some(next) = &self.next_node_id {
            targets.push(next.as_str());
        }
        targets
    }
}

/// The prior node's outcome, consulted by `decision` node predicates.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub success: bool,
    pub result: serde_json::Value,
}

fn evaluate_predicate(predicate: &Predicate, context: &StepContext) -> bool {
    let actual = if predicate.field == "success" {
        serde_json::Value::Bool(context.success)
    } else {
        let path = predicate.field.strip_prefix("result.").unwrap_or(&predicate.field);
        extract_dot_path(&context.result, path).unwrap_or(serde_json::Value::Null)
    };

    match predicate.operator {
        Operator::IsTrue => actual == serde_json::Value::Bool(true),
        Operator::IsFalse => actual == serde_json::Value::Bool(false),
        Operator::Eq => actual == predicate.value,
        Operator::Neq => actual != predicate.value,
        Operator::In => predicate.value.as_array().is_some_and(|arr| arr.contains(&actual)),
        Operator::Gt => compare_numbers(&actual, &predicate.value).is_some_and(|ord| ord.is_gt()),
        Operator::Lt => compare_numbers(&actual, &predicate.value).is_some_and(|ord| ord.is_lt()),
    }
}

fn compare_numbers(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

fn extract_dot_path(value: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    path.split('.').try_fold(value.clone(), |current, segment| match current {
        serde_json::Value::Object(map) => map.get(segment).cloned(),
        serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linear_graph() -> FlowGraph {
        FlowGraph {
            nodes: vec![
                FlowNode {
                    id: "start".to_string(),
                    node_type: NodeType::Start,
                    predicates: vec![],
                    default_node_id: None,
                    next_node_id: Some("login".to_string()),
                },
                FlowNode {
                    id: "login".to_string(),
                    node_type: NodeType::Login,
                    predicates: vec![],
                    default_node_id: None,
                    next_node_id: Some("decide".to_string()),
                },
                FlowNode {
                    id: "decide".to_string(),
                    node_type: NodeType::Decision,
                    predicates: vec![Predicate {
                        field: "success".to_string(),
                        operator: Operator::IsTrue,
                        value: json!(null),
                        target_node_id: "end".to_string(),
                    }],
                    default_node_id: Some("error".to_string()),
                    next_node_id: None,
                },
                FlowNode {
                    id: "error".to_string(),
                    node_type: NodeType::Error,
                    predicates: vec![],
                    default_node_id: None,
                    next_node_id: None,
                },
                FlowNode {
                    id: "end".to_string(),
                    node_type: NodeType::End,
                    predicates: vec![],
                    default_node_id: None,
                    next_node_id: None,
                },
            ],
        }
    }

    #[test]
    fn valid_linear_graph_passes_validation() {
        assert!(linear_graph().validate().is_ok());
    }

    #[test]
    fn decision_without_default_is_rejected() {
        let mut graph = linear_graph();
        graph.nodes[2].default_node_id = None;
        assert!(matches!(graph.validate(), Err(PolicyError::InvalidFlowGraph(_))));
    }

    #[test]
    fn reference_to_unknown_node_is_rejected() {
        let mut graph = linear_graph();
        graph.nodes[1].next_node_id = Some("nonexistent".to_string());
        assert!(graph.validate().is_err());
    }

    #[test]
    fn cycle_is_rejected() {
        let mut graph = linear_graph();
        graph.nodes[4].next_node_id = Some("start".to_string());
        assert!(graph.validate().is_err());
    }

    #[test]
    fn step_follows_matching_predicate() {
        let graph = linear_graph();
        let next = graph
            .step("decide", &StepContext { success: true, result: json!({}) })
            .unwrap();
        assert_eq!(next, "end");
    }

    #[test]
    fn step_falls_through_to_default() {
        let graph = linear_graph();
        let next = graph
            .step("decide", &StepContext { success: false, result: json!({}) })
            .unwrap();
        assert_eq!(next, "error");
    }

    #[test]
    fn dot_path_predicate_on_result() {
        let mut graph = linear_graph();
        graph.nodes[2].predicates = vec![Predicate {
            field: "result.risk.score".to_string(),
            operator: Operator::Gt,
            value: json!(80),
            target_node_id: "error".to_string(),
        }];
        let next = graph
            .step("decide", &StepContext { success: true, result: json!({"risk": {"score": 95}}) })
            .unwrap();
        assert_eq!(next, "error");
    }
}
