//! End-to-end runs over synthetic event streams, the way a host would deliver them.

use sonde_infer::{report, Session};
use sonde_types::{Access, Config, Reg};

const MAIN: u64 = 0x401000;
const F: u64 = 0x401200;

fn session(config: Config) -> Session {
    let mut session = Session::new(config).unwrap();
    session.register_routine(MAIN, "main");
    session.register_routine(F, "f");
    session
}

#[test]
fn two_args_no_return() {
    let mut s = session(Config::default());
    s.on_call(0, Some(MAIN), false).unwrap();

    for i in 0..1000 {
        s.on_access(0, Reg::Rdi, Access::Write);
        s.on_access(0, Reg::Rsi, Access::Write);
        s.on_call(0, Some(F), false).unwrap();
        // keep clear of the warm-up calls
        if i >= 50 {
            s.on_access(0, Reg::Rdi, Access::Read);
            s.on_access(0, Reg::Esi, Access::Read);
        }
        if i < 20 {
            s.on_access(0, Reg::Eax, Access::Write);
        }
        s.on_return(0);
    }
    s.on_return(0);

    let f = s.table().lookup(F).unwrap();
    let record = s.table().get(f).unwrap();
    assert_eq!(record.calls, 1000);
    assert_eq!(record.int_hits[0], 950);
    assert_eq!(record.int_hits[1], 950);
    assert_eq!(record.returns, 20);

    // main was called once, far below the floor
    let verdicts = s.classify();
    assert_eq!(verdicts.len(), 1);
    let v = &verdicts[0];
    assert_eq!(v.name, "f");
    assert_eq!(v.arity, 1);
    assert_eq!(v.int_slot, Some(1));
    assert_eq!(v.float_slot, None);
    assert!(!v.returns_value);
    assert_eq!(v.narrow_slots, vec![1]);

    assert_eq!(report::format_line(v), format!("{}:f:1:0:0:1", F));
}

#[test]
fn below_min_calls_is_not_reported() {
    let mut s = session(Config::default());
    s.on_call(0, Some(MAIN), false).unwrap();
    for _ in 0..499 {
        s.on_access(0, Reg::Rdi, Access::Write);
        s.on_call(0, Some(F), false).unwrap();
        s.on_access(0, Reg::Rdi, Access::Read);
        s.on_return(0);
    }
    assert!(s.classify().is_empty());

    let mut out = Vec::new();
    report::write_text(&mut out, &s.classify()).unwrap();
    assert!(out.is_empty());
}

fn nested(config: Config) -> (Session, Vec<u64>) {
    let mut s = Session::new(config).unwrap();
    let addrs: Vec<u64> = (1..=6).map(|i| 0x1000 * i).collect();
    for (i, addr) in addrs.iter().enumerate() {
        s.register_routine(*addr, &format!("level{}", i + 1));
    }
    (s, addrs)
}

fn rdi_hits(s: &Session, addr: u64) -> u64 {
    let fid = s.table().lookup(addr).unwrap();
    s.table().get(fid).unwrap().int_hits[0]
}

#[test]
fn value_propagates_to_nested_readers() {
    let config = Config {
        warmup_calls: 0,
        ..Config::default()
    };
    let (mut s, addrs) = nested(config);

    for addr in &addrs[..3] {
        s.on_call(0, Some(*addr), false).unwrap();
    }
    s.on_access(0, Reg::Rdi, Access::Write);
    for addr in &addrs[3..] {
        s.on_call(0, Some(*addr), false).unwrap();
        s.on_access(0, Reg::Rdi, Access::Read);
        s.on_access(0, Reg::Dil, Access::Read);
        s.on_access(0, Reg::Rdi, Access::Read);
    }

    assert_eq!(s.thread(0).unwrap().stack().height(), 6);
    assert_eq!(rdi_hits(&s, addrs[2]), 0);
    for addr in &addrs[3..] {
        // once through rdi and once through dil, which is a view of its own
        assert_eq!(rdi_hits(&s, *addr), 2);
    }
}

#[test]
fn one_deep_read_credits_the_whole_chain() {
    let config = Config {
        warmup_calls: 0,
        ..Config::default()
    };
    let (mut s, addrs) = nested(config);

    for addr in &addrs[..3] {
        s.on_call(0, Some(*addr), false).unwrap();
    }
    s.on_access(0, Reg::Rdi, Access::Write);
    for addr in &addrs[3..] {
        s.on_call(0, Some(*addr), false).unwrap();
    }
    s.on_access(0, Reg::Rdi, Access::Read);
    s.on_access(0, Reg::Rdi, Access::Read);

    assert_eq!(rdi_hits(&s, addrs[2]), 0);
    for addr in &addrs[3..] {
        assert_eq!(rdi_hits(&s, *addr), 1);
    }
}

#[test]
fn forgotten_frames_skipped_in_chain() {
    let config = Config {
        warmup_calls: 0,
        max_depth: 2,
        ..Config::default()
    };
    let (mut s, addrs) = nested(config);

    s.on_call(0, Some(addrs[0]), false).unwrap();
    s.on_access(0, Reg::Rdi, Access::Write);
    for addr in &addrs[1..4] {
        s.on_call(0, Some(*addr), false).unwrap();
    }
    // heights 1 and 2 are forgotten, 3 and 4 live
    s.on_access(0, Reg::Rdi, Access::Read);

    assert_eq!(rdi_hits(&s, addrs[1]), 0);
    assert_eq!(rdi_hits(&s, addrs[2]), 1);
    assert_eq!(rdi_hits(&s, addrs[3]), 1);
}
