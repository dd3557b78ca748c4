// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use criterion::BatchSize;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use l4lb::api::IfIndex;
use l4lb::engine::PacketView;
use l4lb::engine::checksum::full_checksum;
use l4lb::engine::checksum::incremental_update;
use l4lb_bench::MeasurementInfo;
use l4lb_bench::alloc::*;
use l4lb_bench::cases;
use l4lb_bench::cases::Case;
use std::hint::black_box;

pub fn decide<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let engine = cases::engine();
    let mut c = c.benchmark_group(format!("decide/{}", M::label()));

    for case in Case::ALL {
        let frame = case.frame();
        c.bench_function(case.name(), |b| {
            // Each iteration gets a pristine copy, as a redirect
            // rewrites the frame in place.
            b.iter_batched_ref(
                || frame.clone(),
                |pkt| {
                    engine.decide(
                        black_box(&mut PacketView::new(pkt)),
                        IfIndex(1),
                    )
                },
                BatchSize::SmallInput,
            )
        });
    }
}

pub fn checksum<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let frame = Case::TcpSynRedirect.frame();
    let hdr = &frame[l4lb_test_utils::ETHER_HDR_LEN..][..20];
    let mut c = c.benchmark_group(format!("checksum/{}", M::label()));

    c.bench_function("full", |b| b.iter(|| full_checksum(black_box(hdr))));
    c.bench_function("incremental", |b| {
        b.iter(|| {
            incremental_update(black_box(0xB861), black_box(0x0A00), 0xC0A8)
        })
    });
}

criterion_group!(wall, decide, checksum);
criterion_group!(
    name = alloc_ct;
    config = new_crit(Allocs);
    targets = decide
);
criterion_group!(
    name = alloc_sz;
    config = new_crit(AllocBytes);
    targets = decide
);
criterion_main!(wall, alloc_ct, alloc_sz);
