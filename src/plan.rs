//! Plan normalization and progression.
//!
//! The plan lives in one loosely structured YAML (or JSON) file. Reads build a
//! fresh [`PlanTree`] every time; writes go through [`PlanStateMachine`], which
//! re-reads, backs up, writes and re-validates on each call.
//!
//! # Submodules
//!
//! - [`natural`]: dotted-id ordering
//! - [`status`]: status classification and rollup counts
//! - [`document`]: load/save with backups
//! - [`tree`]: Phase -> Step -> Item normalization
//! - [`machine`]: current-step resolution and transitions
//! - [`summary`]: compact active/current/next view
mod document;
mod machine;
mod natural;
mod status;
mod summary;
mod tree;

pub use document::PlanDocument;
pub use machine::PlanStateMachine;
pub use summary::PlanSummary;
pub use tree::{PlanNode, PlanTree};

use serde_json::Value;
use std::path::Path;

/// Indented text outline: `id [status] title (done/total)` per node.
pub fn render_text(tree: &PlanTree) -> String {
    fn walk(nodes: &[PlanNode], depth: usize, active: Option<&str>, out: &mut String) {
        for node in nodes {
            let marker = if Some(node.id.as_str()) == active { "*" } else { " " };
            out.push_str(&format!(
                "{}{marker}{} [{}] {}",
                "  ".repeat(depth),
                node.id,
                node.status.as_str(),
                node.title
            ));
            if !node.is_leaf() {
                out.push_str(&format!(" ({}/{})", node.counts.done, node.counts.total()));
            }
            out.push('\n');
            walk(&node.children, depth + 1, active, out);
        }
    }
    let mut out = String::new();
    walk(&tree.tree, 0, tree.active.as_deref(), &mut out);
    let totals = &tree.totals;
    out.push_str(&format!(
        "total: {} done, {} in progress, {} planned, {} blocked\n",
        totals.done, totals.in_progress, totals.planned, totals.blocked
    ));
    out
}

/// `/plan` view of the file at `path`; unreadable or malformed plans degrade
/// to an empty view.
pub fn plan_view(path: &Path) -> Value {
    match PlanDocument::load(path) {
        Ok(doc) => PlanTree::build(doc.root()).to_json(),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "plan unavailable; serving empty view"
            );
            PlanTree::empty_json()
        }
    }
}
