use super::*;

#[test]
fn string_node_reports_its_span() {
    let mut arena = TreeArena::new();
    let id = arena.push_string(0, 3);
    assert_eq!(arena.get(id).span(), (0, 3));
}

#[test]
fn sequence_children_are_an_o1_slice_into_the_index_array() {
    let mut arena = TreeArena::new();
    let a = arena.push_string(0, 1);
    let b = arena.push_string(1, 2);
    let seq = arena.push_sequence(0, 2, &[a, b]);

    match arena.get(seq) {
        TreeNode::Sequence { children, .. } => {
            assert_eq!(arena.children_of(*children), &[a, b]);
        }
        other => panic!("expected Sequence, got {other:?}"),
    }
}

#[test]
fn reset_truncates_nodes_and_children() {
    let mut arena = TreeArena::new();
    let a = arena.push_string(0, 1);
    arena.push_sequence(0, 1, &[a]);
    assert_eq!(arena.len(), 2);

    arena.reset();
    assert!(arena.is_empty());
}

#[test]
fn node_wraps_a_single_child_with_a_name() {
    let mut arena = TreeArena::new();
    let leaf = arena.push_string(0, 4);
    let node = arena.push_node(7, leaf, 0, 4);

    match arena.get(node) {
        TreeNode::Node { name, child, .. } => {
            assert_eq!(*name, 7);
            assert_eq!(*child, leaf);
        }
        other => panic!("expected Node, got {other:?}"),
    }
}

#[test]
fn error_node_may_have_no_child() {
    let mut arena = TreeArena::new();
    let id = arena.push_error(3, None, None, 0, 0);
    match arena.get(id) {
        TreeNode::Error { label, child, .. } => {
            assert_eq!(*label, 3);
            assert_eq!(*child, None);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}
