use super::document::PlanDocument;
use super::status::{is_next_marker, PlanStatus, NEXT_MARKER};
use super::tree::{collect_nodes, RawNode};
use crate::error::{PlanError, PlanResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A flattened, actionable step: an id-bearing node with no id-bearing children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRef {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_status: Option<String>,
    #[serde(skip)]
    pointer: String,
}

impl StepRef {
    pub fn status(&self) -> PlanStatus {
        self.raw_status
            .as_deref()
            .map(PlanStatus::classify)
            .unwrap_or(PlanStatus::Planned)
    }

    fn is_next(&self) -> bool {
        self.raw_status.as_deref().is_some_and(is_next_marker)
    }
}

/// Outcome of a transition: the step that was current and the one that is now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: String,
    pub to: Option<String>,
}

/// Leaves of the document in pre-order.
pub fn flatten_steps(root: &Value) -> Vec<StepRef> {
    fn walk(nodes: Vec<RawNode>, out: &mut Vec<StepRef>) {
        for node in nodes {
            if node.children.is_empty() {
                out.push(StepRef {
                    id: node.id,
                    title: node.title,
                    raw_status: node.raw_status,
                    pointer: node.pointer,
                });
            } else {
                walk(node.children, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(collect_nodes(root, ""), &mut out);
    out
}

/// Every id-bearing node, containers included, in pre-order.
pub fn all_node_ids(root: &Value) -> Vec<(String, String)> {
    fn walk(nodes: Vec<RawNode>, out: &mut Vec<(String, String)>) {
        for node in nodes {
            out.push((node.id, node.pointer));
            walk(node.children, out);
        }
    }
    let mut out = Vec::new();
    walk(collect_nodes(root, ""), &mut out);
    out
}

/// Index of the current step: first in-progress, else first `next`, else first.
pub fn resolve_current(steps: &[StepRef]) -> PlanResult<usize> {
    if steps.is_empty() {
        return Err(PlanError::NoCurrentStep);
    }
    Ok(steps
        .iter()
        .position(|step| step.status() == PlanStatus::InProgress)
        .or_else(|| steps.iter().position(StepRef::is_next))
        .unwrap_or(0))
}

/// Mark the current step done and promote its successor.
///
/// A plan whose steps are all done is terminal: nothing is rewritten and the
/// transition reports the last step with no successor.
pub fn apply_advance(root: &mut Value) -> PlanResult<Transition> {
    let steps = flatten_steps(root);
    if let Some(last) = finished_last_step(&steps) {
        return Ok(Transition {
            from: last.id.clone(),
            to: None,
        });
    }
    let current = resolve_current(&steps)?;
    write_status(root, &steps[current].pointer, PlanStatus::Done.as_str())?;
    let promoted = steps.get(current + 1).map(|_| current + 1);
    if let Some(next) = promoted {
        write_status(root, &steps[next].pointer, PlanStatus::InProgress.as_str())?;
    }
    demote_strays(root, &steps, &[Some(current), promoted])?;
    Ok(Transition {
        from: steps[current].id.clone(),
        to: promoted.map(|idx| steps[idx].id.clone()),
    })
}

/// Last step of a plan in which every step is done.
fn finished_last_step(steps: &[StepRef]) -> Option<&StepRef> {
    let all_done = steps.iter().all(|step| step.status() == PlanStatus::Done);
    if all_done {
        steps.last()
    } else {
        None
    }
}

/// Demote the current step and reopen its nearest non-blocked predecessor.
///
/// Blocked steps stay blocked. With nothing to reopen, the current step
/// itself becomes the `next` marker.
pub fn apply_rollback(root: &mut Value) -> PlanResult<Transition> {
    let steps = flatten_steps(root);
    let current = resolve_current(&steps)?;
    let previous = steps[..current]
        .iter()
        .rposition(|step| step.status() != PlanStatus::Blocked);
    let target = match previous {
        Some(previous) => {
            write_status(root, &steps[current].pointer, PlanStatus::Planned.as_str())?;
            write_status(root, &steps[previous].pointer, PlanStatus::InProgress.as_str())?;
            previous
        }
        None => {
            write_status(root, &steps[current].pointer, NEXT_MARKER)?;
            current
        }
    };
    demote_strays(root, &steps, &[Some(current), Some(target)])?;
    Ok(Transition {
        from: steps[current].id.clone(),
        to: Some(steps[target].id.clone()),
    })
}

/// Point `active_step` at `id` without touching any status.
pub fn apply_set_active_step(root: &mut Value, id: &str) -> PlanResult<()> {
    let id = id.trim();
    if !all_node_ids(root).iter().any(|(node_id, _)| node_id == id) {
        return Err(PlanError::StepNotFound(id.to_string()));
    }
    let map = root_object(root)?;
    map.insert("active_step".to_string(), Value::String(id.to_string()));
    Ok(())
}

/// Overwrite the raw status text of any node.
pub fn apply_set_status(root: &mut Value, id: &str, status: &str) -> PlanResult<()> {
    let id = id.trim();
    let pointer = all_node_ids(root)
        .into_iter()
        .find(|(node_id, _)| node_id == id)
        .map(|(_, pointer)| pointer)
        .ok_or_else(|| PlanError::StepNotFound(id.to_string()))?;
    write_status(root, &pointer, status.trim())
}

fn demote_strays(root: &mut Value, steps: &[StepRef], keep: &[Option<usize>]) -> PlanResult<()> {
    for (idx, step) in steps.iter().enumerate() {
        if keep.contains(&Some(idx)) {
            continue;
        }
        if step.status() == PlanStatus::InProgress || step.is_next() {
            tracing::debug!(step = %step.id, "demoting stray step to planned");
            write_status(root, &step.pointer, PlanStatus::Planned.as_str())?;
        }
    }
    Ok(())
}

fn root_object(root: &mut Value) -> PlanResult<&mut Map<String, Value>> {
    root.as_object_mut().ok_or_else(|| {
        PlanError::MalformedPlanDocument("plan root must be a mapping".to_string())
    })
}

/// Set `status` (or `state` when that is the field in use) on the node at `pointer`.
fn write_status(root: &mut Value, pointer: &str, status: &str) -> PlanResult<()> {
    let node = root
        .pointer_mut(pointer)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| PlanError::MalformedPlanDocument(format!("no node at {pointer}")))?;
    let key = if node.contains_key("status") || !node.contains_key("state") {
        "status"
    } else {
        "state"
    };
    node.insert(key.to_string(), Value::String(status.to_string()));
    Ok(())
}

/// Applies transitions to the plan file with backup and re-validation.
///
/// Nothing is cached: each call re-reads the document so hand edits made
/// between calls are respected.
#[derive(Debug, Clone)]
pub struct PlanStateMachine {
    path: PathBuf,
}

impl PlanStateMachine {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> PlanResult<PlanDocument> {
        PlanDocument::load(&self.path)
    }

    pub fn current_step(&self) -> PlanResult<StepRef> {
        let doc = self.load()?;
        let steps = flatten_steps(doc.root());
        let current = resolve_current(&steps)?;
        Ok(steps[current].clone())
    }

    pub fn advance(&self) -> PlanResult<Transition> {
        let transition = self.mutate(apply_advance)?;
        tracing::info!(from = %transition.from, to = ?transition.to, "advanced plan");
        Ok(transition)
    }

    pub fn rollback(&self) -> PlanResult<Transition> {
        let transition = self.mutate(apply_rollback)?;
        tracing::info!(from = %transition.from, to = ?transition.to, "rolled back plan");
        Ok(transition)
    }

    pub fn set_active_step(&self, id: &str) -> PlanResult<()> {
        self.mutate(|root| apply_set_active_step(root, id))?;
        tracing::info!(step = %id.trim(), "active step set");
        Ok(())
    }

    pub fn set_status(&self, id: &str, status: &str) -> PlanResult<()> {
        self.mutate(|root| apply_set_status(root, id, status))?;
        tracing::info!(step = %id.trim(), status = %status.trim(), "step status set");
        Ok(())
    }

    fn mutate<T, F>(&self, apply: F) -> PlanResult<T>
    where
        F: FnOnce(&mut Value) -> PlanResult<T>,
    {
        let mut doc = self.load()?;
        let before = doc.root().clone();
        let outcome = apply(doc.root_mut())?;
        if doc.root() == &before {
            tracing::debug!(path = %self.path.display(), "plan unchanged; skipping write");
        } else {
            doc.save_with_backup()?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
