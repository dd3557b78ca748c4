// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

pub mod action;
pub mod cfg;
pub mod ip;
pub mod mac;
pub mod stat;
pub mod svc;

pub use action::*;
pub use cfg::*;
pub use ip::*;
pub use mac::*;
pub use stat::*;
pub use svc::*;

/// The overall version of the API. Anytime a type in this crate which
/// crosses the control-plane boundary (configuration, service table
/// entries, stats) changes shape, this number should increment.
pub const API_VERSION: u64 = 1;

/// Major version of the L4LB package.
pub const MAJOR_VERSION: u64 = 0;
