use super::{collect_nodes, NodeKind, PlanTree};
use crate::plan::status::{PlanStatus, StatusCounts};
use serde_json::{json, Value};

fn loose_doc() -> Value {
    json!({
        "active_step": "6.4.c",
        "steps": [
            {"id": "6.10", "title": "Ten", "status": "planned"},
            {"id": "6.4", "title": "Four", "items": [
                {"id": "6.4.c", "status": "in_progress"},
                {"id": "6.4.a", "status": "done"},
                {"note": "no id, skipped"},
            ]},
            {"id": "7.1", "status": "blocked"},
            {"id": 7.2, "state": "Completed"},
        ]
    })
}

fn ids(nodes: &[super::PlanNode]) -> Vec<&str> {
    nodes.iter().map(|node| node.id.as_str()).collect()
}

fn sum_leaves(nodes: &[super::PlanNode]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for node in nodes {
        if node.is_leaf() {
            counts.add(node.status);
        } else {
            counts.merge(&sum_leaves(&node.children));
        }
    }
    counts
}

#[test]
fn loose_documents_group_by_major_segment() {
    let plan = PlanTree::build(&loose_doc());
    assert_eq!(plan.active.as_deref(), Some("6.4.c"));
    assert_eq!(ids(&plan.tree), vec!["6", "7"]);

    let phase6 = &plan.tree[0];
    assert_eq!(phase6.kind, NodeKind::Phase);
    assert_eq!(phase6.title, "Phase 6");
    assert_eq!(ids(&phase6.children), vec!["6.4", "6.10"]);

    let step = &phase6.children[0];
    assert_eq!(step.kind, NodeKind::Step);
    assert_eq!(ids(&step.children), vec!["6.4.a", "6.4.c"]);
    assert_eq!(step.children[0].kind, NodeKind::Item);
    assert_eq!(step.status, PlanStatus::InProgress);

    let phase7 = &plan.tree[1];
    assert_eq!(ids(&phase7.children), vec!["7.1", "7.2"]);
    assert_eq!(phase7.children[1].status, PlanStatus::Done);
    assert_eq!(phase7.status, PlanStatus::Blocked);
}

#[test]
fn containers_count_leaves_only() {
    let plan = PlanTree::build(&loose_doc());
    assert_eq!(
        plan.totals,
        StatusCounts {
            planned: 1,
            in_progress: 1,
            done: 2,
            blocked: 1,
        }
    );
    assert_eq!(plan.totals, sum_leaves(&plan.tree));
    assert_eq!(plan.find("6.4").map(|node| node.counts.total()), Some(2));
}

#[test]
fn rollups_do_not_depend_on_sibling_order() {
    let forward = PlanTree::build(&loose_doc());
    let mut reversed = loose_doc();
    if let Some(Value::Array(steps)) = reversed.get_mut("steps") {
        steps.reverse();
        for step in steps.iter_mut() {
            if let Some(Value::Array(items)) = step.get_mut("items") {
                items.reverse();
            }
        }
    }
    let backward = PlanTree::build(&reversed);
    assert_eq!(forward.totals, backward.totals);
    assert_eq!(ids(&forward.tree), ids(&backward.tree));
    for (a, b) in forward.tree.iter().zip(backward.tree.iter()) {
        assert_eq!(a.counts, b.counts);
    }
}

#[test]
fn a_root_named_after_its_major_becomes_the_phase() {
    let doc = json!({
        "plan": [
            {"id": "2.1", "status": "done"},
            {"id": "2", "name": "Build", "status": "active"},
            {"id": "10", "name": "Ship"},
        ]
    });
    let plan = PlanTree::build(&doc);
    assert_eq!(ids(&plan.tree), vec!["2", "10"]);
    let build = &plan.tree[0];
    assert_eq!(build.title, "Build");
    assert_eq!(build.status, PlanStatus::InProgress);
    assert_eq!(ids(&build.children), vec!["2.1"]);
    assert!(plan.tree[1].is_leaf());
    assert_eq!(plan.totals.total(), 2);
}

#[test]
fn explicit_phases_are_kept_and_missing_ids_synthesized() {
    let doc = json!({
        "phases": [
            {"name": "Setup", "steps": [{"step_id": "1.1", "status": "done"}]},
            {"id": "P2", "steps": [{"id": "2.1"}, {"id": "2.2", "description": "second"}]},
        ]
    });
    let plan = PlanTree::build(&doc);
    assert_eq!(ids(&plan.tree), vec!["1", "P2"]);
    assert_eq!(plan.tree[0].title, "Setup");
    assert_eq!(plan.tree[0].status, PlanStatus::Done);
    assert_eq!(plan.find("2.2").map(|node| node.description.as_str()), Some("second"));
    assert!(plan.active.is_none());
}

#[test]
fn documents_without_ids_produce_an_empty_tree() {
    let plan = PlanTree::build(&json!({"notes": ["a", {"b": 1}]}));
    assert!(plan.tree.is_empty());
    assert_eq!(plan.totals.total(), 0);
    assert_eq!(PlanTree::empty_json()["tree"], json!([]));
}

#[test]
fn raw_nodes_carry_json_pointers() {
    let doc = loose_doc();
    let roots = collect_nodes(&doc, "");
    assert_eq!(roots[1].pointer, "/steps/1");
    assert_eq!(roots[1].children[0].pointer, "/steps/1/items/0");
    assert_eq!(
        doc.pointer(&roots[1].children[0].pointer)
            .and_then(|node| node.get("id")),
        Some(&json!("6.4.c"))
    );
}
