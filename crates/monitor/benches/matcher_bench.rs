//! 패턴 매칭 / 카운터 증가 벤치마크
//!
//! 라인당 매칭 비용과 카운터 경합 없는 증가 비용을 측정합니다.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use logtally_monitor::{CounterRegistry, PatternMatcher, match_patterns};

const SSH_LINES: &[&str] = &[
    "Oct 19 10:00:01 host sshd[812]: Failed password for root from 10.0.0.5 port 51422 ssh2",
    "Oct 19 10:00:02 host sshd[812]: Invalid user admin from 10.0.0.5 port 51424",
    "Oct 19 10:00:03 host sshd[901]: Accepted publickey for deploy from 10.0.0.9 port 40022 ssh2",
    "Oct 19 10:00:04 host CRON[1002]: pam_unix(cron:session): session opened for user root",
];

fn patterns(count: usize) -> Vec<String> {
    let mut patterns = vec!["Failed password".to_owned(), "Invalid user".to_owned()];
    patterns.extend((patterns.len()..count).map(|i| format!("no-such-token-{i}")));
    patterns
}

fn bench_match_patterns(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_patterns");
    group.throughput(Throughput::Elements(SSH_LINES.len() as u64));

    for count in [2usize, 8, 32] {
        let patterns = patterns(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &patterns, |b, patterns| {
            b.iter(|| {
                for line in SSH_LINES {
                    black_box(match_patterns(black_box(line), patterns));
                }
            });
        });
    }
    group.finish();
}

fn bench_matcher_iter(c: &mut Criterion) {
    let matcher = PatternMatcher::new(patterns(8));
    c.bench_function("pattern_matcher_iter", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for line in SSH_LINES {
                hits += matcher.matches(black_box(line)).count();
            }
            black_box(hits)
        });
    });
}

fn bench_counter_increment(c: &mut Criterion) {
    let registry = CounterRegistry::new();
    let counter = registry
        .register("bench_event", "benchmark counter")
        .expect("fresh registry");

    let mut group = c.benchmark_group("counter_increment");
    group.bench_function("existing_pattern", |b| {
        counter.increment("Failed password");
        b.iter(|| counter.increment(black_box("Failed password")));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_match_patterns,
    bench_matcher_iter,
    bench_counter_increment
);
criterion_main!(benches);
