// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The outcome of processing one packet.

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// An interface index, as handed to us by the host dispatcher.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct IfIndex(pub u32);

impl From<u32> for IfIndex {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl Display for IfIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The terminal decision for a packet.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum Action {
    /// Deliver the packet unmodified to the normal stack.
    Pass,

    /// Discard the packet.
    Drop,

    /// Deliver the (rewritten) packet out of the given interface.
    Redirect(IfIndex),

    /// Re-enter the dispatch chain at a later stage.
    Recirculate,
}

impl Action {
    /// A short, static name used for counters and output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Drop => "drop",
            Self::Redirect(_) => "redirect",
            Self::Recirculate => "recirculate",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Drop => write!(f, "DROP"),
            Self::Redirect(ifidx) => write!(f, "REDIRECT({ifidx})"),
            Self::Recirculate => write!(f, "RECIRCULATE"),
        }
    }
}

/// Why a packet received the action it did.
///
/// [`Reason::NoService`] accompanies an [`Action::Pass`], as does
/// [`Reason::UnsupportedProtocol`] when the engine is configured to
/// pass such traffic. Otherwise a reason accompanies an
/// [`Action::Drop`].
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    /// The buffer ended before a header did.
    Truncated,

    /// An EtherType, IP next header, or IP protocol value that we
    /// don't handle.
    UnsupportedProtocol,

    /// A header that is long enough but internally inconsistent.
    Malformed,

    /// IPv4 fragments are not load balanced.
    Fragmented,

    /// No service entry matched; the traffic is not ours.
    NoService,

    /// The service matched but has no usable backend.
    NoBackend,

    /// The rewrite would need a header that does not fit.
    RewriteOverflow,

    /// The TTL or hop limit would reach zero.
    TtlExceeded,
}

impl Reason {
    pub const ALL: [Reason; 8] = [
        Self::Truncated,
        Self::UnsupportedProtocol,
        Self::Malformed,
        Self::Fragmented,
        Self::NoService,
        Self::NoBackend,
        Self::RewriteOverflow,
        Self::TtlExceeded,
    ];

    /// A static diagnostic code for this reason.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Truncated => "truncated",
            Self::UnsupportedProtocol => "unsupported-protocol",
            Self::Malformed => "malformed",
            Self::Fragmented => "fragmented",
            Self::NoService => "no-service",
            Self::NoBackend => "no-backend",
            Self::RewriteOverflow => "rewrite-overflow",
            Self::TtlExceeded => "ttl-exceeded",
        }
    }

    /// The position of this reason in [`Reason::ALL`].
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

impl Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
