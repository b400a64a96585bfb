use cntryl_bench::bench_test;
use std::hint::black_box;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};

#[bench_test]
fn sum_small_range() {
    let mut acc = 0u64;
    for i in 0..100 {
        acc = acc.wrapping_add(black_box(i));
    }
    black_box(acc);
}

#[bench_test]
fn format_integer() {
    black_box(format!("{}", black_box(1_234_567u64)));
}

#[bench_test(name = "vec_push_1k")]
fn vec_push() {
    let mut v = Vec::with_capacity(1024);
    for i in 0..1024u32 {
        v.push(i);
    }
    black_box(v);
}

static DRAINED: AtomicU64 = AtomicU64::new(0);

/// Stops every 100th call, which pins the payload to a counted loop.
#[bench_test]
fn drain_until_empty() -> ControlFlow<()> {
    if DRAINED.fetch_add(1, Ordering::Relaxed) % 100 == 99 {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}

#[bench_test]
fn parse_number() -> Result<(), std::num::ParseIntError> {
    black_box("8675309").parse::<u64>().map(|n| {
        black_box(n);
    })
}

#[bench_test(ignore)]
fn sort_100k() {
    let mut v: Vec<u64> = (0..100_000u64).rev().collect();
    v.sort_unstable();
    black_box(v);
}

cntryl_bench::bench_main!();
