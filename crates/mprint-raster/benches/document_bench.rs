// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the raster pipeline's hot paths: PackBits
// round-trip on a representative stripe, bilinear scaling in both
// directions, and PCLm xref serialization for a multi-page job.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use mprint_core::types::JobParams;
use mprint_raster::pclm::{PclmEncoder, packbits_decode, packbits_encode};
use mprint_raster::pipeline::RenderedStripe;
use mprint_raster::scaler::Scaler;

const STRIPE_WIDTH: u32 = 2550;
const STRIPE_HEIGHT: u32 = 32;

fn representative_stripe_rgba() -> Vec<u8> {
    let mut data = vec![0u8; (STRIPE_WIDTH * STRIPE_HEIGHT * 4) as usize];
    for (i, px) in data.chunks_mut(4).enumerate() {
        let shade = ((i / 37) % 256) as u8;
        px.copy_from_slice(&[shade, shade, shade, 255]);
    }
    data
}

/// PackBits round-trip on one 2550-wide stripe row, the unit both the
/// PCLm and PWG encoders compress at.
fn bench_packbits_round_trip(c: &mut Criterion) {
    let row = representative_stripe_rgba();
    c.bench_function("packbits round-trip (2550x32 stripe)", |b| {
        b.iter(|| {
            let encoded = packbits_encode(black_box(&row));
            let decoded = packbits_decode(&encoded).unwrap();
            black_box(decoded);
        });
    });
}

/// Bilinear scale up and back down, the pair of operations a borderless
/// auto-fit job runs on every stripe.
fn bench_scale_round_trip(c: &mut Criterion) {
    let src = representative_stripe_rgba();

    c.bench_function("bilinear scale up+down (2550x32 -> 3300x42 -> 2550x32)", |b| {
        b.iter(|| {
            let up = Scaler::new(STRIPE_WIDTH, STRIPE_HEIGHT, 3300, 42).unwrap();
            let up_query = up.query_rows(0, 42);
            let up_rows = up.scale_rows(black_box(&src), &up_query, 0, 42).unwrap();

            let down = Scaler::new(3300, 42, STRIPE_WIDTH, STRIPE_HEIGHT).unwrap();
            let down_query = down.query_rows(0, STRIPE_HEIGHT);
            let down_rows = down.scale_rows(&up_rows, &down_query, 0, STRIPE_HEIGHT).unwrap();
            black_box(down_rows);
        });
    });
}

/// PCLm xref serialization across a 10-page job, one stripe per page.
fn bench_pclm_ten_page_job(c: &mut Criterion) {
    let params = JobParams::default();
    let rgba = representative_stripe_rgba();

    c.bench_function("pclm xref serialization (10 pages)", |b| {
        b.iter(|| {
            let mut encoder = PclmEncoder::new(&params);
            for _ in 0..10 {
                let stripe = RenderedStripe {
                    row_offset: 0,
                    row_count: STRIPE_HEIGHT,
                    width: STRIPE_WIDTH,
                    rgba: rgba.clone(),
                };
                encoder.push_strip(&stripe, &stripe.rgba).unwrap();
                encoder.finish_page(STRIPE_WIDTH, STRIPE_HEIGHT);
            }
            black_box(encoder.finish().unwrap());
        });
    });
}

criterion_group!(benches, bench_packbits_round_trip, bench_scale_round_trip, bench_pclm_ten_page_job);
criterion_main!(benches);
