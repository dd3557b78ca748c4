// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Point-in-time readouts of the engine's counters.

use super::Reason;
use alloc::collections::BTreeMap;
use serde::Deserialize;
use serde::Serialize;

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub struct PacketCounter {
    pub packets: u64,
    pub bytes: u64,
}

/// How many packets ended with each action.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub struct ActionCounter {
    pub pass: u64,
    pub drop: u64,
    pub redirect: u64,
    pub recirculate: u64,
}

impl ActionCounter {
    pub fn total(&self) -> u64 {
        self.pass + self.drop + self.redirect + self.recirculate
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EngineCounters {
    pub actions: ActionCounter,

    /// Only reasons seen at least once are present.
    pub reasons: BTreeMap<Reason, u64>,

    /// Per-service counters, keyed by reverse NAT index.
    pub services: BTreeMap<u16, PacketCounter>,
}
