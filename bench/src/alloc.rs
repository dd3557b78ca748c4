// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A counting allocator, exposed to `criterion` as a measurement of
//! allocations made per iteration.
//!
//! The decision path is expected to read zero for both measurements.
//! Criterion runs one benchmark at a time, so the counters are global
//! rather than per thread.

use super::MeasurementInfo;
use criterion::Criterion;
use criterion::Throughput;
use criterion::measurement::Measurement;
use criterion::measurement::ValueFormatter;
use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[global_allocator]
static BENCH_ALLOC: CountingAlloc = CountingAlloc {
    count: AtomicU64::new(0),
    bytes: AtomicU64::new(0),
};

struct CountingAlloc {
    count: AtomicU64,
    bytes: AtomicU64,
}

impl CountingAlloc {
    fn note(&self, size: usize) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size as u64, Ordering::Relaxed);
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.note(layout.size());
        unsafe { System.alloc(layout) }
    }

    unsafe fn realloc(
        &self,
        ptr: *mut u8,
        layout: Layout,
        new_size: usize,
    ) -> *mut u8 {
        self.note(new_size);
        unsafe { System.realloc(ptr, layout, new_size) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

/// The number of allocations.
pub struct Allocs;

/// The number of bytes allocated.
pub struct AllocBytes;

struct Unit(&'static str);

impl ValueFormatter for Unit {
    fn scale_values(&self, _typical: f64, _values: &mut [f64]) -> &'static str {
        self.0
    }

    fn scale_throughputs(
        &self,
        _typical: f64,
        _throughput: &Throughput,
        _values: &mut [f64],
    ) -> &'static str {
        self.0
    }

    fn scale_for_machines(&self, _values: &mut [f64]) -> &'static str {
        self.0
    }
}

static COUNT_UNIT: Unit = Unit("");
static BYTES_UNIT: Unit = Unit("B");

macro_rules! counter_measurement {
    ($ty:ty, $field:ident, $unit:expr, $label:literal) => {
        impl Measurement for $ty {
            type Intermediate = u64;
            type Value = u64;

            fn start(&self) -> u64 {
                BENCH_ALLOC.$field.load(Ordering::Relaxed)
            }

            fn end(&self, start: u64) -> u64 {
                BENCH_ALLOC.$field.load(Ordering::Relaxed) - start
            }

            fn add(&self, v1: &u64, v2: &u64) -> u64 {
                v1 + v2
            }

            fn zero(&self) -> u64 {
                0
            }

            fn to_f64(&self, value: &u64) -> f64 {
                *value as f64
            }

            fn formatter(&self) -> &dyn ValueFormatter {
                &$unit
            }
        }

        impl MeasurementInfo for $ty {
            fn label() -> &'static str {
                $label
            }
        }
    };
}

counter_measurement!(Allocs, count, COUNT_UNIT, "alloc_ct");
counter_measurement!(AllocBytes, bytes, BYTES_UNIT, "alloc_sz");

/// Create a [`Criterion`] instance which measures `m` instead of wall
/// time.
pub fn new_crit<M: Measurement>(m: M) -> Criterion<M> {
    Criterion::default()
        .with_measurement(m)
        .sample_size(10)
        .warm_up_time(Duration::from_nanos(1))
        .measurement_time(Duration::from_micros(10))
        .nresamples(1)
        .without_plots()
}
