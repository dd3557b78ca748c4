// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Counters bumped on the packet path.
//!
//! All counters are relaxed atomics: they are read out for display,
//! never used to make a decision.

use super::decision::Decision;
use super::service::ServiceTable;
use crate::api::Action;
use crate::api::ActionCounter;
use crate::api::EngineCounters;
use crate::api::PacketCounter;
use crate::api::Reason;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

/// Packets and bytes sent to one service.
#[derive(Debug, Default)]
pub struct ServiceStats {
    packets: AtomicU64,
    bytes: AtomicU64,
}

impl ServiceStats {
    pub fn hit(&self, pkt_len: usize) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(pkt_len as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PacketCounter {
        PacketCounter {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

const N_ACTIONS: usize = 4;

fn action_idx(action: &Action) -> usize {
    match action {
        Action::Pass => 0,
        Action::Drop => 1,
        Action::Redirect(_) => 2,
        Action::Recirculate => 3,
    }
}

/// Engine-wide counters, by action and by reason.
#[derive(Debug, Default)]
pub struct EngineStats {
    actions: [AtomicU64; N_ACTIONS],
    reasons: [AtomicU64; Reason::ALL.len()],
}

impl EngineStats {
    pub fn record(&self, decision: &Decision) {
        self.actions[action_idx(&decision.action)]
            .fetch_add(1, Ordering::Relaxed);

        if let Some(reason) = decision.reason {
            self.reasons[reason.index()].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn actions(&self) -> ActionCounter {
        let get = |a: Action| self.actions[action_idx(&a)].load(Ordering::Relaxed);
        ActionCounter {
            pass: get(Action::Pass),
            drop: get(Action::Drop),
            redirect: get(Action::Redirect(Default::default())),
            recirculate: get(Action::Recirculate),
        }
    }

    pub fn reason(&self, reason: Reason) -> u64 {
        self.reasons[reason.index()].load(Ordering::Relaxed)
    }

    /// Read out every counter, including the per-service counters
    /// held by `table`.
    pub fn snapshot(&self, table: &ServiceTable) -> EngineCounters {
        let reasons = Reason::ALL
            .iter()
            .map(|r| (*r, self.reason(*r)))
            .filter(|(_, n)| *n > 0)
            .collect();

        let services = table
            .stats()
            .map(|(idx, stats)| (*idx, stats.snapshot()))
            .collect();

        EngineCounters { actions: self.actions(), reasons, services }
    }
}
