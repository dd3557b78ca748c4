// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The L4 load balancer packet-decision core.
//!
//! A packet arrives as a mutable byte buffer along with its ingress
//! interface. The [`engine`] parses it, looks its destination up in
//! the service table, picks a backend, rewrites the destination along
//! with every checksum that covers it, and hands back an
//! [`api::Action`]. Multi-stage processing is modelled by the
//! [`engine::dispatch::DispatchChain`].
//!
//! Nothing on the per-packet path allocates, blocks, or panics on
//! malformed input. The service table is replaced wholesale by the
//! control plane through [`dynamic::Dynamic`].

#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

extern crate alloc;

pub use l4lb_api as api;

pub mod dynamic;
pub mod engine;
pub mod print;
pub mod provider;
