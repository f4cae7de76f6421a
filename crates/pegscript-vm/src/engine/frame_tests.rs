use super::*;
use crate::engine::tree::NodeId;

#[test]
fn push_pop_is_strict_lifo() {
    let mut stack = FrameStack::new();
    stack.push(Frame::Call {
        return_pc: 1,
        nodes_start: 0,
    });
    stack.push(Frame::Call {
        return_pc: 2,
        nodes_start: 0,
    });

    match stack.pop().unwrap() {
        Frame::Call { return_pc, .. } => assert_eq!(return_pc, 2),
        _ => panic!("expected Call frame"),
    }
    match stack.pop().unwrap() {
        Frame::Call { return_pc, .. } => assert_eq!(return_pc, 1),
        _ => panic!("expected Call frame"),
    }
    assert!(stack.is_empty());
}

#[test]
fn node_buffer_truncate_discards_speculative_entries() {
    let node = NodeId::from_raw;

    let mut buffer = NodeBuffer::new();
    buffer.push(node(0));
    buffer.push(node(1));
    let watermark = buffer.len();
    buffer.push(node(2));
    assert_eq!(buffer.len(), 3);

    buffer.truncate(watermark);
    assert_eq!(buffer.len(), 2);
}

#[test]
fn nodes_start_is_readable_from_every_frame_kind() {
    let frames = [
        Frame::Backtrack {
            cursor: 0,
            resume_pc: 0,
            predicate: false,
            nodes_start: 5,
        },
        Frame::Call {
            return_pc: 0,
            nodes_start: 6,
        },
        Frame::Capture {
            id: 0,
            start: 0,
            nodes_start: 7,
        },
    ];
    let starts: Vec<usize> = frames.iter().map(Frame::nodes_start).collect();
    assert_eq!(starts, vec![5, 6, 7]);
}
