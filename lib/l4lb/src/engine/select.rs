// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Backend selection.
//!
//! Which backend of a service a flow lands on is a policy decided
//! outside the decision engine. The engine hands the matched service
//! to a [`SelectBackend`] and rewrites toward whatever comes back.

use super::service::ServiceTable;
use crate::api::Backend;
use crate::api::BackendId;
use crate::api::IpAddr;
use crate::api::Protocol;
use crate::api::Selector;
use crate::api::ServiceFlags;
use crate::api::ServiceKey;
use crate::api::ServiceRecord;
use alloc::sync::Arc;
use crc32fast::Hasher;

/// The number of positions on a [`Ring`]. This is prime, and well
/// above the most backends a service may have, so that each backend
/// owns many positions.
pub const RING_SIZE: usize = 4099;

/// The addresses and ports identifying a flow, as seen on ingress.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FlowTuple {
    pub src: IpAddr,
    pub src_port: u16,
    pub dst: IpAddr,
    pub dst_port: u16,
    pub proto: Protocol,
}

/// A policy choosing one backend of a service.
///
/// `key` is the key which actually matched, so that its slots may be
/// resolved through `table`. Returning `None` means the service has no
/// usable backend for this flow.
pub trait SelectBackend: Send + Sync {
    fn select<'t>(
        &self,
        table: &'t ServiceTable,
        key: &ServiceKey,
        record: &ServiceRecord,
        flow: &FlowTuple,
    ) -> Option<&'t Backend>;
}

/// A consistent-hash ring for one service: [`RING_SIZE`] positions,
/// each owned by one of the service's backends.
///
/// Each position goes to the backend scoring highest for it, so
/// taking a backend away only reassigns the positions it owned, and
/// adding one only takes positions from the others.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ring(Arc<[BackendId]>);

// The score of `id` at `pos`: CRC32 with a murmur3 finalizer on top.
fn score(id: BackendId, pos: u32) -> u32 {
    let mut h = Hasher::new();
    h.update(&id.0.to_be_bytes());
    h.update(&pos.to_be_bytes());

    let mut x = h.finalize();
    x ^= x >> 16;
    x = x.wrapping_mul(0x85eb_ca6b);
    x ^= x >> 13;
    x = x.wrapping_mul(0xc2b2_ae35);
    x ^ (x >> 16)
}

impl Ring {
    /// Build the ring over `backends`, or `None` if there are none.
    pub fn build(backends: &[BackendId]) -> Option<Self> {
        if backends.is_empty() {
            return None;
        }

        // `RING_SIZE` fits in a u32.
        let positions = (0..RING_SIZE as u32)
            .map(|pos| {
                backends
                    .iter()
                    .copied()
                    .max_by_key(|id| (score(*id, pos), *id))
                    .unwrap_or(backends[0])
            })
            .collect();
        Some(Self(positions))
    }

    /// The backend owning the position `hash` lands on.
    pub fn get(&self, hash: u32) -> BackendId {
        self.0[hash as usize % self.0.len()]
    }

    /// The number of positions owned by `id`.
    pub fn share(&self, id: BackendId) -> usize {
        self.0.iter().filter(|b| **b == id).count()
    }
}

/// Pick a backend by hashing the flow tuple, as the matched service's
/// [`Selector`] says.
///
/// The same flow always maps to the same backend for as long as the
/// service keeps the same backends.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlowHash;

fn hash_addr(h: &mut Hasher, ip: &IpAddr) {
    match ip {
        IpAddr::Ip4(ip4) => h.update(&ip4.bytes()),
        IpAddr::Ip6(ip6) => h.update(&ip6.bytes()),
    }
}

impl FlowHash {
    pub fn hash(flow: &FlowTuple, flags: ServiceFlags) -> u32 {
        let src_port = if flags.contains(ServiceFlags::HASH_NO_SRC_PORT) {
            0
        } else {
            flow.src_port
        };

        let mut h = Hasher::new();
        hash_addr(&mut h, &flow.src);
        h.update(&src_port.to_be_bytes());
        hash_addr(&mut h, &flow.dst);
        h.update(&flow.dst_port.to_be_bytes());
        h.update(&[u8::from(flow.proto)]);
        h.finalize()
    }

    /// The slot, in `1..=backend_count`, a flow maps to under one of
    /// the slot-indexed selectors.
    pub fn slot(flow: &FlowTuple, record: &ServiceRecord) -> Option<u16> {
        let count = u32::from(record.backend_count);
        if count == 0 {
            return None;
        }

        let slot = match record.selector {
            Selector::Modulo => Self::hash(flow, record.flags) % count + 1,
            Selector::First => 1,
            // Ring positions name backends, not slots.
            Selector::Ring => return None,
        };

        // `count` came from a u16, so the slot fits.
        Some(slot as u16)
    }
}

impl SelectBackend for FlowHash {
    fn select<'t>(
        &self,
        table: &'t ServiceTable,
        key: &ServiceKey,
        record: &ServiceRecord,
        flow: &FlowTuple,
    ) -> Option<&'t Backend> {
        match record.selector {
            Selector::Ring => {
                let ring = table.ring(key)?;
                table.backend(ring.get(Self::hash(flow, record.flags)))
            }

            Selector::Modulo | Selector::First => {
                table.backend_at(key, Self::slot(flow, record)?)
            }
        }
    }
}
