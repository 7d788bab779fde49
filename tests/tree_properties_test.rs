//! Randomized structural tests for the topic tree
//!
//! Seeded sequences of inserts, re-parents, removals and cursor moves; after
//! every step the tree must stay acyclic with consistent depths and a valid
//! cursor path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use interview_topic_tree::config::TreeLimits;
use interview_topic_tree::error::TreeIntegrityError;
use interview_topic_tree::tree::{TopicNode, TreeManager};
use interview_topic_tree::validation::{validate_path, validate_tree_integrity};

const SEEDS: u64 = 24;
const STEPS: usize = 150;

fn limits() -> TreeLimits {
    TreeLimits {
        max_depth: 12,
        max_nodes: 60,
        min_attach_confidence: 0.5,
    }
}

fn ids(mgr: &TreeManager) -> Vec<String> {
    let mut ids: Vec<String> = mgr.tree().nodes().map(|n| n.id.clone()).collect();
    ids.sort();
    ids
}

fn pick(rng: &mut StdRng, ids: &[String]) -> Option<String> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[rng.gen_range(0..ids.len())].clone())
    }
}

fn assert_invariants(mgr: &TreeManager, seed: u64, step: usize) {
    let tree = mgr.tree();
    assert!(
        validate_tree_integrity(tree).is_ok(),
        "integrity broken (seed {seed}, step {step})"
    );
    assert!(
        validate_path(tree, tree.current_path()).is_ok(),
        "cursor invalid (seed {seed}, step {step})"
    );
    for node in tree.nodes() {
        assert_eq!(
            Some(node.depth),
            mgr.depth_from_root(&node.id).ok(),
            "stale depth on {} (seed {seed}, step {step})",
            node.id
        );
        assert!(node.depth <= limits().max_depth);
    }
    assert!(tree.len() <= limits().max_nodes);
}

#[test]
fn test_random_mutations_preserve_invariants() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut mgr = TreeManager::new(format!("prop-{seed}"), limits());

        for step in 0..STEPS {
            let existing = ids(&mgr);
            match rng.gen_range(0..10) {
                0..=3 => {
                    let parent = if rng.gen_bool(0.2) { None } else { pick(&mut rng, &existing) };
                    let _ = mgr.add_node(TopicNode::new(format!("topic {step}")), parent.as_deref());
                }
                4..=6 => {
                    if let Some(id) = pick(&mut rng, &existing) {
                        let parent = if rng.gen_bool(0.15) { None } else { pick(&mut rng, &existing) };
                        let before = mgr.tree().clone();
                        if mgr.reparent_node(&id, parent.as_deref()).is_err() {
                            assert_eq!(mgr.tree(), &before, "failed re-parent mutated the tree");
                        }
                    }
                }
                7 => {
                    if let Some(id) = pick(&mut rng, &existing) {
                        if rng.gen_bool(0.3) {
                            let _ = mgr.remove_node(&id);
                        }
                    }
                }
                _ => {
                    if let Some(id) = pick(&mut rng, &existing) {
                        mgr.move_cursor_to(&id).unwrap();
                        mgr.mark_visited(&id).unwrap();
                    }
                }
            }
            assert_invariants(&mgr, seed, step);
        }
    }
}

#[test]
fn test_reparent_under_descendant_is_rejected() {
    let mut mgr = TreeManager::new("cycle", limits());
    let root = mgr.add_node(TopicNode::new("Systems"), None).unwrap();
    let mid = mgr.add_node(TopicNode::new("Linux"), Some(&root)).unwrap();
    let leaf = mgr.add_node(TopicNode::new("eBPF"), Some(&mid)).unwrap();
    let before = mgr.tree().clone();

    let err = mgr.reparent_node(&root, Some(&leaf)).unwrap_err();
    assert!(matches!(err, TreeIntegrityError::CycleDetected { .. }));
    let err = mgr.reparent_node(&mid, Some(&mid)).unwrap_err();
    assert!(matches!(err, TreeIntegrityError::SelfParent { .. }));
    assert_eq!(mgr.tree(), &before);
}

#[test]
fn test_reparent_cascades_depth_and_keeps_cursor() {
    let mut mgr = TreeManager::new("cascade", limits());
    let a = mgr.add_node(TopicNode::new("Backend"), None).unwrap();
    let b = mgr.add_node(TopicNode::new("Databases"), None).unwrap();
    let c = mgr.add_node(TopicNode::new("Postgres"), Some(&b)).unwrap();
    let d = mgr.add_node(TopicNode::new("Vacuum"), Some(&c)).unwrap();
    mgr.move_cursor_to(&d).unwrap();

    mgr.reparent_node(&b, Some(&a)).unwrap();

    assert_eq!(mgr.tree().node(&b).unwrap().depth, 2);
    assert_eq!(mgr.tree().node(&d).unwrap().depth, 4);
    assert_eq!(mgr.current_path(), &[a, b, c, d]);
    assert_invariants(&mgr, 0, 0);
}
