//! Unit tests for the pure [`SequenceBuffer`] state machine.

use proptest::prelude::*;
use rstest::rstest;
use serde_json::{Value, json};

use super::{
    OverflowPolicy,
    buffer::{EnqueueOutcome, SequenceBuffer},
};

fn payload(n: u64) -> Value {
    json!({ "n": n })
}

/// Enqueue and unwrap the in-order delivery list, panicking on anything
/// else.
fn deliver(buffer: &mut SequenceBuffer, sequence: u64) -> Vec<u64> {
    match buffer.enqueue(sequence, payload(sequence), OverflowPolicy::DropIncoming) {
        EnqueueOutcome::Deliver(items) => items.into_iter().map(|(seq, _)| seq).collect(),
        other => panic!("expected delivery for {sequence}, got {other:?}"),
    }
}

fn buffered(buffer: &mut SequenceBuffer, sequence: u64) {
    match buffer.enqueue(sequence, payload(sequence), OverflowPolicy::DropIncoming) {
        EnqueueOutcome::Buffered => {}
        other => panic!("expected {sequence} to be buffered, got {other:?}"),
    }
}

#[test]
fn first_sequence_initialises_the_stream() {
    let mut buffer = SequenceBuffer::new(8, 65_535);
    assert_eq!(buffer.next_expected(), None);
    assert_eq!(deliver(&mut buffer, 5), vec![5]);
    assert_eq!(buffer.next_expected(), Some(6));
}

#[test]
fn out_of_order_frames_drain_once_the_gap_fills() {
    let mut buffer = SequenceBuffer::new(8, 65_535);

    assert_eq!(deliver(&mut buffer, 5), vec![5]);
    buffered(&mut buffer, 8);
    assert_eq!(deliver(&mut buffer, 6), vec![6]);
    assert_eq!(buffer.next_expected(), Some(7));
    assert_eq!(deliver(&mut buffer, 7), vec![7, 8]);
    assert_eq!(buffer.next_expected(), Some(9));
    assert!(buffer.is_empty());
}

#[test]
fn delivered_sequences_are_dropped_as_stale() {
    let mut buffer = SequenceBuffer::new(8, 65_535);
    assert_eq!(deliver(&mut buffer, 100), vec![100]);

    for stale in [100, 99, 42] {
        assert!(matches!(
            buffer.enqueue(stale, payload(stale), OverflowPolicy::DropIncoming),
            EnqueueOutcome::Stale
        ));
    }
    assert_eq!(buffer.next_expected(), Some(101));
}

#[test]
fn duplicate_of_a_buffered_frame_is_delivered_once() {
    let mut buffer = SequenceBuffer::new(8, 65_535);
    assert_eq!(deliver(&mut buffer, 1), vec![1]);
    buffered(&mut buffer, 3);
    buffered(&mut buffer, 3);
    assert_eq!(buffer.pending_len(), 1);
    assert_eq!(deliver(&mut buffer, 2), vec![2, 3]);
}

#[test]
fn wraparound_is_treated_as_consecutive() {
    let mut buffer = SequenceBuffer::new(8, 65_535);
    assert_eq!(deliver(&mut buffer, 65_535), vec![65_535]);
    assert_eq!(deliver(&mut buffer, 0), vec![0]);
    assert_eq!(buffer.next_expected(), Some(1));
}

#[test]
fn gaps_spanning_the_wraparound_drain_in_modular_order() {
    let mut buffer = SequenceBuffer::new(8, 65_535);
    assert_eq!(deliver(&mut buffer, 65_534), vec![65_534]);
    buffered(&mut buffer, 0);
    assert_eq!(deliver(&mut buffer, 65_535), vec![65_535, 0]);
    assert_eq!(buffer.next_expected(), Some(1));
}

#[rstest]
#[case::drop_incoming(OverflowPolicy::DropIncoming)]
#[case::reconnect(OverflowPolicy::RequestReconnect)]
#[case::fatal(OverflowPolicy::ThrowException)]
fn capacity_holds_after_overflow(#[case] policy: OverflowPolicy) {
    let mut buffer = SequenceBuffer::new(2, 65_535);
    assert_eq!(deliver(&mut buffer, 10), vec![10]);
    buffered(&mut buffer, 12);
    buffered(&mut buffer, 13);

    let outcome = buffer.enqueue(14, payload(14), policy);
    match policy {
        OverflowPolicy::DropIncoming => {
            assert!(matches!(outcome, EnqueueOutcome::OverflowDropped));
        }
        OverflowPolicy::RequestReconnect => {
            assert!(matches!(outcome, EnqueueOutcome::OverflowReconnect));
        }
        OverflowPolicy::ThrowException => {
            assert!(matches!(outcome, EnqueueOutcome::Exhausted));
        }
        OverflowPolicy::ShiftOne => unreachable!(),
    }
    assert_eq!(buffer.pending_len(), 2);
}

#[test]
fn shift_one_evicts_the_oldest_outstanding_frame() {
    let mut buffer = SequenceBuffer::new(2, 65_535);
    assert_eq!(deliver(&mut buffer, 10), vec![10]);
    buffered(&mut buffer, 13);
    buffered(&mut buffer, 14);

    match buffer.enqueue(15, payload(15), OverflowPolicy::ShiftOne) {
        EnqueueOutcome::OverflowShifted { evicted } => assert_eq!(evicted.0, 13),
        other => panic!("expected eviction, got {other:?}"),
    }
    assert_eq!(buffer.pending_len(), 2);
    // 13 left the buffer, so the gap at 11-12 still blocks 14 and 15.
    assert_eq!(buffer.next_expected(), Some(11));
}

#[test]
fn skip_missing_jumps_the_gap_and_drains() {
    let mut buffer = SequenceBuffer::new(3, 65_535);
    assert_eq!(deliver(&mut buffer, 5), vec![5]);
    buffered(&mut buffer, 7);
    buffered(&mut buffer, 8);

    let released: Vec<u64> = buffer.skip_missing().into_iter().map(|(s, _)| s).collect();
    assert_eq!(released, vec![7, 8]);
    assert_eq!(buffer.next_expected(), Some(9));
    assert!(buffer.is_empty());
}

#[test]
fn skip_missing_stops_at_the_next_gap() {
    let mut buffer = SequenceBuffer::new(4, 65_535);
    assert_eq!(deliver(&mut buffer, 5), vec![5]);
    buffered(&mut buffer, 7);
    buffered(&mut buffer, 9);

    let first: Vec<u64> = buffer.skip_missing().into_iter().map(|(s, _)| s).collect();
    assert_eq!(first, vec![7]);
    assert_eq!(buffer.next_expected(), Some(8));
    assert_eq!(buffer.pending_len(), 1);

    let second: Vec<u64> = buffer.skip_missing().into_iter().map(|(s, _)| s).collect();
    assert_eq!(second, vec![9]);
    assert!(buffer.is_empty());
}

#[test]
fn skip_missing_on_an_empty_buffer_is_a_no_op() {
    let mut buffer = SequenceBuffer::new(3, 65_535);
    assert!(buffer.skip_missing().is_empty());
    assert_eq!(deliver(&mut buffer, 5), vec![5]);
    assert!(buffer.skip_missing().is_empty());
    assert_eq!(buffer.next_expected(), Some(6));
}

#[test]
fn reset_returns_to_uninitialised() {
    let mut buffer = SequenceBuffer::new(3, 65_535);
    assert_eq!(deliver(&mut buffer, 5), vec![5]);
    buffered(&mut buffer, 7);

    buffer.reset();
    assert_eq!(buffer.next_expected(), None);
    assert!(buffer.is_empty());

    // A fresh session may start anywhere, including "behind" the old one.
    assert_eq!(deliver(&mut buffer, 2), vec![2]);
}

fn shuffled(len: u64) -> impl Strategy<Value = Vec<u64>> {
    Just((1..len).collect::<Vec<u64>>()).prop_shuffle()
}

proptest! {
    /// Any arrival order of a contiguous range is released in exactly
    /// ascending order with no gaps or duplicates.
    #[test]
    fn permutations_release_in_ascending_order(rest in shuffled(16)) {
        let mut buffer = SequenceBuffer::new(16, 65_535);
        let mut released = Vec::new();

        // The first frame of the session fixes the starting point.
        match buffer.enqueue(0, payload(0), OverflowPolicy::DropIncoming) {
            EnqueueOutcome::Deliver(items) => released.extend(items.into_iter().map(|(s, _)| s)),
            other => panic!("unexpected outcome {other:?}"),
        }
        for seq in rest {
            match buffer.enqueue(seq, payload(seq), OverflowPolicy::DropIncoming) {
                EnqueueOutcome::Deliver(items) => {
                    released.extend(items.into_iter().map(|(s, _)| s));
                }
                EnqueueOutcome::Buffered => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        prop_assert_eq!(released, (0..16).collect::<Vec<u64>>());
        prop_assert!(buffer.is_empty());
    }

    /// Replaying every frame twice still yields exactly one delivery each.
    #[test]
    fn duplicated_arrivals_deliver_once(rest in shuffled(8), dups in shuffled(8)) {
        let mut buffer = SequenceBuffer::new(16, 65_535);
        let mut released = Vec::new();
        let mut feed = |buffer: &mut SequenceBuffer, seq: u64, out: &mut Vec<u64>| {
            if let EnqueueOutcome::Deliver(items) =
                buffer.enqueue(seq, payload(seq), OverflowPolicy::DropIncoming)
            {
                out.extend(items.into_iter().map(|(s, _)| s));
            }
        };

        feed(&mut buffer, 0, &mut released);
        for seq in rest.iter().chain(dups.iter()) {
            feed(&mut buffer, *seq, &mut released);
        }

        prop_assert_eq!(released, (0..8).collect::<Vec<u64>>());
    }
}
