// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The engine in L4LB.
//!
//! The raw header types (`ether`, `ip4`, `ip6`, `tcp`, `udp`, `icmp`)
//! are bound over a [`packet::PacketView`] by [`parse`], and the
//! rest of the engine works from the resulting metadata.
pub mod checksum;
pub mod decision;
pub mod dispatch;
pub mod ether;
pub mod icmp;
pub mod ip4;
pub mod ip6;
pub mod packet;
pub mod parse;
pub mod rewrite;
pub mod select;
pub mod service;
pub mod stat;
pub mod tcp;
pub mod udp;

pub use decision::Decision;
pub use decision::DecisionEngine;
pub use dispatch::DispatchChain;
pub use packet::PacketView;
pub use packet::Reject;
pub use service::ServiceTable;
