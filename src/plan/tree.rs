use super::natural::{major_segment, natural_cmp};
use super::status::{PlanStatus, StatusCounts};
use serde::Serialize;
use serde_json::{json, Map, Value};

const TITLE_KEYS: [&str; 3] = ["title", "name", "summary"];
const DESCRIPTION_KEYS: [&str; 3] = ["description", "desc", "details"];
const STATUS_KEYS: [&str; 2] = ["status", "state"];

/// Position of a node in the normalized hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Phase,
    Step,
    Item,
}

impl NodeKind {
    fn at_depth(depth: usize) -> Self {
        match depth {
            0 => NodeKind::Phase,
            1 => NodeKind::Step,
            _ => NodeKind::Item,
        }
    }
}

/// A normalized phase, step or item with its subtree rollup.
#[derive(Debug, Clone, Serialize)]
pub struct PlanNode {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: NodeKind,
    pub status: PlanStatus,
    /// Status text exactly as written, when the node has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_status: Option<String>,
    pub counts: StatusCounts,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Derived view of a plan document. Rebuilt on every read.
#[derive(Debug, Clone, Serialize)]
pub struct PlanTree {
    pub active: Option<String>,
    pub tree: Vec<PlanNode>,
    pub totals: StatusCounts,
}

impl PlanTree {
    /// Normalize an arbitrary nested document into phases, steps and items.
    ///
    /// Objects carrying `id` or `step_id` become nodes; everything else is
    /// looked through. Without an explicit `phases` list, roots are grouped
    /// by the major segment of their id.
    pub fn build(root: &Value) -> Self {
        let active = root
            .get("active_step")
            .and_then(scalar_text)
            .filter(|id| !id.is_empty());
        let raw_roots = match root.get("phases") {
            Some(Value::Array(phases)) => explicit_phases(phases),
            _ => group_by_major(collect_nodes(root, "")),
        };
        let tree = finish(raw_roots, 0);
        let mut totals = StatusCounts::default();
        for node in &tree {
            totals.merge(&node.counts);
        }
        Self {
            active,
            tree,
            totals,
        }
    }

    /// The read-endpoint shape used when the document cannot be parsed.
    pub fn empty_json() -> Value {
        json!({ "active": Value::Null, "tree": [], "totals": {} })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "active": self.active,
            "tree": self.tree,
            "totals": self.totals.to_json(),
        })
    }

    /// Depth-first search by id.
    pub fn find(&self, id: &str) -> Option<&PlanNode> {
        fn walk<'a>(nodes: &'a [PlanNode], id: &str) -> Option<&'a PlanNode> {
            nodes.iter().find_map(|node| {
                (node.id == id)
                    .then_some(node)
                    .or_else(|| walk(&node.children, id))
            })
        }
        walk(&self.tree, id)
    }
}

/// An id-bearing object found in the raw document, with its JSON pointer.
#[derive(Debug, Clone)]
pub(crate) struct RawNode {
    pub id: String,
    pub title: String,
    pub description: String,
    pub raw_status: Option<String>,
    pub pointer: String,
    pub children: Vec<RawNode>,
}

/// Id of a node object: `id`, else `step_id`; numbers are stringified.
pub(crate) fn node_id(map: &Map<String, Value>) -> Option<String> {
    ["id", "step_id"]
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(scalar_text)
        .filter(|id| !id.is_empty())
}

/// Status text of a node object: `status`, else `state`.
pub(crate) fn node_status(map: &Map<String, Value>) -> Option<String> {
    STATUS_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(scalar_text)
        .filter(|status| !status.is_empty())
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(scalar_text)
        .filter(|text| !text.is_empty())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Collect id-bearing objects under `value` in document order.
///
/// Objects without an id are transparent: their id-bearing descendants are
/// lifted to the current level.
pub(crate) fn collect_nodes(value: &Value, pointer: &str) -> Vec<RawNode> {
    let mut out = Vec::new();
    collect_into(value, pointer, &mut out);
    out
}

fn collect_into(value: &Value, pointer: &str, out: &mut Vec<RawNode>) {
    match value {
        Value::Object(map) => match node_id(map) {
            Some(id) => out.push(raw_node(id, map, pointer)),
            None => collect_children(map, pointer, out),
        },
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                collect_into(item, &format!("{pointer}/{idx}"), out);
            }
        }
        _ => {}
    }
}

fn collect_children(map: &Map<String, Value>, pointer: &str, out: &mut Vec<RawNode>) {
    for (key, child) in map {
        if child.is_object() || child.is_array() {
            collect_into(child, &format!("{pointer}/{}", escape_pointer(key)), out);
        }
    }
}

fn raw_node(id: String, map: &Map<String, Value>, pointer: &str) -> RawNode {
    let mut children = Vec::new();
    collect_children(map, pointer, &mut children);
    RawNode {
        title: first_text(map, &TITLE_KEYS).unwrap_or_else(|| id.clone()),
        description: first_text(map, &DESCRIPTION_KEYS).unwrap_or_default(),
        raw_status: node_status(map),
        pointer: pointer.to_string(),
        children,
        id,
    }
}

fn explicit_phases(phases: &[Value]) -> Vec<RawNode> {
    let mut out = Vec::new();
    for (idx, phase) in phases.iter().enumerate() {
        let Value::Object(map) = phase else {
            continue;
        };
        let pointer = format!("/phases/{idx}");
        match node_id(map) {
            Some(id) => out.push(raw_node(id, map, &pointer)),
            None => {
                let id = (idx + 1).to_string();
                let mut node = raw_node(id.clone(), map, &pointer);
                if first_text(map, &TITLE_KEYS).is_none() {
                    node.title = format!("Phase {id}");
                }
                out.push(node);
            }
        }
    }
    out
}

/// Wrap loose roots into one container per major id segment.
///
/// A root whose id is the major itself becomes that container.
fn group_by_major(roots: Vec<RawNode>) -> Vec<RawNode> {
    let mut groups: Vec<(String, Option<RawNode>, Vec<RawNode>)> = Vec::new();
    for node in roots {
        let major = major_segment(&node.id).to_string();
        let slot = match groups.iter().position(|(key, _, _)| *key == major) {
            Some(pos) => pos,
            None => {
                groups.push((major.clone(), None, Vec::new()));
                groups.len() - 1
            }
        };
        let (_, phase, members) = &mut groups[slot];
        if node.id == major && phase.is_none() {
            *phase = Some(node);
        } else {
            members.push(node);
        }
    }
    groups
        .into_iter()
        .map(|(major, phase, members)| match phase {
            Some(mut phase) => {
                phase.children.extend(members);
                phase
            }
            None => RawNode {
                title: format!("Phase {major}"),
                description: String::new(),
                raw_status: None,
                pointer: String::new(),
                children: members,
                id: major,
            },
        })
        .collect()
}

fn finish(mut nodes: Vec<RawNode>, depth: usize) -> Vec<PlanNode> {
    nodes.sort_by(|a, b| natural_cmp(&a.id, &b.id));
    nodes
        .into_iter()
        .map(|raw| {
            let children = finish(raw.children, depth + 1);
            let own = raw.raw_status.as_deref().map(PlanStatus::classify);
            let (status, counts) = if children.is_empty() {
                let status = own.unwrap_or(PlanStatus::Planned);
                (status, StatusCounts::leaf(status))
            } else {
                let mut counts = StatusCounts::default();
                for child in &children {
                    counts.merge(&child.counts);
                }
                (own.unwrap_or_else(|| counts.derived_status()), counts)
            };
            PlanNode {
                id: raw.id,
                title: raw.title,
                description: raw.description,
                kind: NodeKind::at_depth(depth),
                status,
                raw_status: raw.raw_status,
                counts,
                children,
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
