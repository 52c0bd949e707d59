//! Recursion accounting across the call stack and hierarchical keys

use callprof::probe::ManualProbe;
use callprof::stack::CallStack;
use callprof::symbol::symbol_hash;
use callprof::timing::ManualClock;
use callprof::{Profiler, ProfilerConfig, ProfilingMode};

fn manual_profiler() -> (Profiler<ManualClock, ManualProbe>, ManualClock) {
    let clock = ManualClock::default();
    let profiler = Profiler::with_clock(clock.clone(), ManualProbe::new()).unwrap();
    (profiler, clock)
}

#[test]
fn test_direct_recursion_levels() {
    let mut stack = CallStack::new();
    let hash = symbol_hash("A");
    let mut levels = Vec::new();
    for _ in 0..3 {
        let id = stack.push("A", hash, |_, _| {});
        levels.push(stack.frame(id).recursion_level);
    }
    assert_eq!(levels, vec![0, 1, 2]);

    for _ in 0..3 {
        assert!(stack.pop(|_, _| {}));
    }
    assert_eq!(stack.live_with_hash(hash), 0);
}

#[test]
fn test_direct_recursion_keys() {
    let (mut profiler, clock) = manual_profiler();
    profiler
        .start(ProfilingMode::Hierarchical, &ProfilerConfig::default())
        .unwrap();

    let tracked: Vec<bool> = (0..3).map(|_| profiler.begin_call("A")).collect();
    assert_eq!(profiler.depth(), 4);
    clock.advance(9);
    for t in tracked.into_iter().rev() {
        profiler.end_call(t);
    }

    let snapshot = profiler.stop().unwrap();
    assert_eq!(snapshot.edge("main()==>A").unwrap().ct, 1);
    assert_eq!(snapshot.edge("A==>A@1").unwrap().ct, 1);
    assert_eq!(snapshot.edge("A@1==>A@2").unwrap().ct, 1);
    assert!(snapshot.edge("A==>A").is_none());
    assert_eq!(snapshot.edge("A@1==>A@2").unwrap().wt, 9);
}

#[test]
fn test_mutual_recursion_keys() {
    let (mut profiler, _) = manual_profiler();
    profiler
        .start(ProfilingMode::Hierarchical, &ProfilerConfig::default())
        .unwrap();

    // even -> odd -> even -> odd
    let calls = ["even", "odd", "even", "odd"];
    let tracked: Vec<bool> = calls.iter().map(|c| profiler.begin_call(c)).collect();
    for t in tracked.into_iter().rev() {
        profiler.end_call(t);
    }

    let snapshot = profiler.stop().unwrap();
    for key in [
        "main()==>even",
        "even==>odd",
        "odd==>even@1",
        "even@1==>odd@1",
    ] {
        assert!(snapshot.edge(key).is_some(), "missing {key}");
    }
}

#[test]
fn test_hash_collisions_never_inflate_levels() {
    // Find two distinct names sharing a hash bucket
    let base = "f0";
    let target = symbol_hash(base);
    let other = (1..10_000)
        .map(|i| format!("f{i}"))
        .find(|name| symbol_hash(name) == target)
        .expect("256 buckets must collide within 10k names");

    let mut stack = CallStack::new();
    stack.push(base, target, |_, _| {});
    let id = stack.push(&other, target, |_, _| {});
    assert_eq!(stack.frame(id).recursion_level, 0);
    assert_eq!(stack.live_with_hash(target), 2);
}

#[test]
fn test_levels_reset_between_sessions() {
    let (mut profiler, _) = manual_profiler();
    let config = ProfilerConfig::default();

    profiler.start(ProfilingMode::Hierarchical, &config).unwrap();
    profiler.begin_call("A");
    profiler.begin_call("A");
    profiler.stop();

    profiler.start(ProfilingMode::Hierarchical, &config).unwrap();
    let t = profiler.begin_call("A");
    profiler.end_call(t);
    let snapshot = profiler.stop().unwrap();
    assert!(snapshot.edge("main()==>A").is_some());
    assert!(snapshot.edge("A==>A@1").is_none());
}
