// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the job table and retry engine hot paths.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ipp::model::StatusCode;
use mprint_core::types::JobParams;
use mprint_ipp::job_table::JobTable;
use mprint_ipp::retry::{AttemptOutcome, RetryConfig, should_retry};

/// Benchmark allocate→release cycling through a fixed-capacity job table,
/// the hot path every submitted job goes through.
fn bench_job_table_cycle(c: &mut Criterion) {
    c.bench_function("job_table allocate+release (64 slots)", |b| {
        let mut table = JobTable::new(64);
        b.iter(|| {
            let handle = table
                .allocate(JobParams::default(), "ipp://203.0.113.5:631/ipp/print".into())
                .expect("allocate");
            table
                .set_state(handle, mprint_core::types::JobState::Completed)
                .unwrap();
            table.release(black_box(handle)).unwrap();
        });
    });
}

/// Benchmark the retry decision + backoff computation for a transient
/// service-unavailable response, repeated across the retry budget.
fn bench_retry_decision(c: &mut Criterion) {
    let config = RetryConfig::default();

    c.bench_function("retry should_retry (service unavailable budget)", |b| {
        b.iter(|| {
            for attempt in 0..4 {
                let outcome = AttemptOutcome::Status(StatusCode::ServerErrorServiceUnavailable);
                black_box(should_retry(black_box(&outcome), attempt, &config));
            }
        });
    });
}

criterion_group!(benches, bench_job_table_cycle, bench_retry_decision);
criterion_main!(benches);
