//! Property-based tests for the shadow stack, attribution and the classifier.

use proptest::prelude::*;
use sonde_infer::{Classifier, Entry, FunctionRecord, FunctionTable, ShadowStack, Tracker};
use sonde_types::{Access, Config, FuncId, Reg, FLOAT_SLOTS, INT_SLOTS};

// =============================================================================
// Generators
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Op {
    Call,
    Jump,
    Return,
    Access(Reg, Access),
}

fn arb_access() -> impl Strategy<Value = Access> {
    prop_oneof![
        Just(Access::Read),
        Just(Access::Write),
        Just(Access::ReadWrite),
        Just(Access::Clobber),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Call),
        1 => Just(Op::Jump),
        3 => Just(Op::Return),
        8 => (prop::sample::select(Reg::ALL.to_vec()), arb_access())
            .prop_map(|(reg, access)| Op::Access(reg, access)),
    ]
}

fn counters(record: &FunctionRecord) -> ([u64; INT_SLOTS], [u64; FLOAT_SLOTS], [u32; INT_SLOTS]) {
    (record.int_hits, record.float_hits, record.max_width)
}

// =============================================================================
// Shadow stack
// =============================================================================

proptest! {
    #[test]
    fn height_tracks_pushes_and_pops(cap in 1usize..6, ops in prop::collection::vec(any::<bool>(), 0..200)) {
        let mut stack = ShadowStack::with_capacity(cap).unwrap();
        let mut expected = 0u64;
        for push in ops {
            if push {
                let before = stack.height();
                stack.push(FuncId::from_usize(1), false);
                expected += 1;
                prop_assert!(stack.height() > before);
            } else {
                let popped = stack.pop();
                prop_assert_eq!(popped.is_some(), expected > 0);
                expected = expected.saturating_sub(1);
            }
            prop_assert_eq!(stack.height(), expected);
            prop_assert!(stack.live_len() <= cap);
        }
    }

    #[test]
    fn matched_pairs_restore_height(cap in 1usize..6, prefix in 0usize..20, depth in 0usize..40) {
        let mut stack = ShadowStack::with_capacity(cap).unwrap();
        for _ in 0..prefix {
            stack.push(FuncId::from_usize(1), false);
        }
        let base = stack.height();
        for i in 0..depth {
            stack.push(FuncId::from_usize(2), false);
            prop_assert_eq!(stack.height(), base + i as u64 + 1);
        }
        for _ in 0..depth {
            stack.pop();
        }
        prop_assert_eq!(stack.height(), base);
    }

    #[test]
    fn live_frames_are_the_newest(cap in 1usize..6, depth in 1u64..40) {
        let mut stack = ShadowStack::with_capacity(cap).unwrap();
        for i in 1..=depth {
            stack.push(FuncId::from_usize(i as usize), false);
        }
        for h in 1..=depth {
            let entry = stack.peek(h).unwrap();
            if h + (cap as u64) > depth {
                prop_assert_eq!(entry.live().map(|f| f.fid.index() as u64), Some(h));
            } else {
                prop_assert!(matches!(entry, Entry::Forgotten { is_jump: false }), "expected Entry::Forgotten {{ is_jump: false }}");
            }
        }
    }
}

// =============================================================================
// Attribution
// =============================================================================

proptest! {
    // every call gets a function of its own, so a forgotten frame is a forgotten function
    #[test]
    fn forgotten_frames_are_never_credited(
        depth in 1usize..5,
        ops in prop::collection::vec(arb_op(), 0..300),
    ) {
        let config = Config { warmup_calls: 0, max_depth: depth, ..Config::default() };
        let mut tracker = Tracker::new(&config).unwrap();
        let mut table = FunctionTable::new(1000).unwrap();
        // function at each logical height, forgotten or not
        let mut pushed: Vec<FuncId> = Vec::new();
        let mut next_addr = 0x1000u64;

        for op in ops {
            match op {
                Op::Call | Op::Jump => {
                    let fid = table.register(next_addr, "");
                    next_addr += 0x10;
                    tracker.on_call(&mut table, fid, matches!(op, Op::Jump));
                    pushed.push(fid);
                },
                Op::Return => {
                    tracker.on_return(&mut table);
                    pushed.truncate(tracker.stack().height() as usize);
                },
                Op::Access(reg, access) => {
                    let stack = tracker.stack();
                    let forgotten: Vec<FuncId> = (1..=stack.height())
                        .filter(|h| stack.is_forgotten(*h))
                        .map(|h| pushed[h as usize - 1])
                        .collect();
                    let before: Vec<_> = forgotten
                        .iter()
                        .map(|fid| counters(table.get(*fid).unwrap()))
                        .collect();

                    tracker.on_access(&mut table, reg, access);

                    for (fid, old) in forgotten.iter().zip(before) {
                        prop_assert_eq!(counters(table.get(*fid).unwrap()), old);
                    }
                },
            }
            prop_assert_eq!(pushed.len() as u64, tracker.stack().height());
        }
    }

    #[test]
    fn return_unwinds_whole_jump_chain(cap in 1usize..5, prefix in 0usize..6, jumps in 0usize..12) {
        let config = Config { warmup_calls: 0, max_depth: cap, ..Config::default() };
        let mut tracker = Tracker::new(&config).unwrap();
        let mut table = FunctionTable::new(100).unwrap();
        let f = table.register(0x1000, "f");
        let g = table.register(0x2000, "g");

        for _ in 0..prefix {
            tracker.on_call(&mut table, f, false);
        }
        let base = tracker.stack().height();
        tracker.on_call(&mut table, f, false);
        for _ in 0..jumps {
            tracker.on_call(&mut table, g, true);
        }
        tracker.on_return(&mut table);
        prop_assert_eq!(tracker.stack().height(), base);
    }

    #[test]
    fn one_credit_per_frame_per_write(
        below in 1usize..4,
        above in 1usize..8,
        reads in prop::collection::vec(prop::sample::select(vec![Reg::Rcx, Reg::Ecx, Reg::Cx, Reg::Cl, Reg::Ch]), 1..10),
    ) {
        let config = Config { warmup_calls: 0, ..Config::default() };
        let mut tracker = Tracker::new(&config).unwrap();
        let mut table = FunctionTable::new(100).unwrap();

        let mut fids = Vec::new();
        for i in 0..below + above {
            fids.push(table.register(0x1000 + i as u64, ""));
        }
        for fid in &fids[..below] {
            tracker.on_call(&mut table, *fid, false);
        }
        tracker.on_access(&mut table, Reg::Rcx, Access::Write);
        for fid in &fids[below..] {
            tracker.on_call(&mut table, *fid, false);
        }

        let mut views = reads.clone();
        for reg in &reads {
            tracker.on_access(&mut table, *reg, Access::Read);
        }
        views.sort();
        views.dedup();

        for fid in &fids[..below] {
            prop_assert_eq!(table.get(*fid).unwrap().int_hits[3], 0);
        }
        // each distinct view gives every frame above the write exactly one credit
        for fid in &fids[below..] {
            prop_assert_eq!(table.get(*fid).unwrap().int_hits[3], views.len() as u64);
        }
    }
}

// =============================================================================
// Classifier
// =============================================================================

proptest! {
    #[test]
    fn more_calls_never_raise_arity(
        int_hits in prop::collection::vec(0u64..1000, INT_SLOTS),
        float_hits in prop::collection::vec(0u64..1000, FLOAT_SLOTS),
        calls in 1u64..2000,
        extra in 0u64..2000,
    ) {
        let classifier = Classifier { min_calls: 1, slot_threshold: 0.10, return_threshold: 0.05 };
        let mut record = FunctionRecord::new(0x1000, "f");
        record.int_hits.copy_from_slice(&int_hits);
        record.float_hits.copy_from_slice(&float_hits);

        record.calls = calls;
        let fewer = classifier.classify_one(FuncId::from_usize(1), &record).unwrap();
        record.calls = calls + extra;
        let more = classifier.classify_one(FuncId::from_usize(1), &record).unwrap();

        prop_assert!(more.arity <= fewer.arity);
        prop_assert!(more.counted_arity <= fewer.counted_arity);
    }
}
