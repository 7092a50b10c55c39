use super::machine::{all_node_ids, flatten_steps, resolve_current};
use super::natural::natural_cmp;
use super::tree::PlanTree;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

const NEXT_IDS_LIMIT: usize = 5;

/// Compact "where are we" view for the phone UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub active_step: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub current: Option<String>,
    pub next_ids: Vec<String>,
    pub latest_approval: Option<String>,
}

impl PlanSummary {
    pub fn build(root: &Value, latest_approval: Option<String>) -> Self {
        let tree = PlanTree::build(root);
        let steps = flatten_steps(root);
        let current = resolve_current(&steps)
            .ok()
            .map(|idx| steps[idx].id.clone());
        let active_step = tree
            .active
            .clone()
            .filter(|id| all_node_ids(root).iter().any(|(node_id, _)| node_id == id));
        let (title, description) = match active_step.as_deref().and_then(|id| tree.find(id)) {
            Some(node) => (
                Some(node.title.clone()),
                Some(node.description.clone()).filter(|text| !text.is_empty()),
            ),
            None => (None, None),
        };

        let anchor = active_step.clone().or_else(|| current.clone());
        let mut ordered: Vec<&str> = steps.iter().map(|step| step.id.as_str()).collect();
        ordered.sort_by(|a, b| natural_cmp(a, b));
        let next_ids = match anchor.as_deref() {
            Some(anchor) => ordered
                .into_iter()
                .filter(|id| natural_cmp(id, anchor) == Ordering::Greater)
                .take(NEXT_IDS_LIMIT)
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };

        Self {
            active_step,
            title,
            description,
            current,
            next_ids,
            latest_approval,
        }
    }
}
