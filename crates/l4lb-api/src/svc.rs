// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Service and backend types.

use super::IfIndex;
use super::IpAddr;
use super::MacAddr;
use super::Protocol;
use bitflags::bitflags;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The largest number of backend slots a single service may hold.
pub const MAX_BACKENDS_PER_SERVICE: usize = 256;

/// Whether a service entry is reachable from outside the node or only
/// from within it.
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
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    #[default]
    External,
    Internal,
}

impl Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => write!(f, "external"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

bitflags! {
    /// Per-service behaviour flags.
    #[derive(
        Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq,
        Serialize,
    )]
    #[serde(transparent)]
    pub struct ServiceFlags: u8 {
        /// The service is a host port mapping.
        const HOSTPORT = 1 << 0;

        /// The service has distinct external and internal entries; an
        /// external lookup from an internal interface consults the
        /// internal one.
        const LOCAL_SCOPE = 1 << 1;

        /// The VIP is routable from outside the node.
        const ROUTABLE = 1 << 2;

        /// Leave the source port out of the flow hash, so that all
        /// connections from one client land on the same backend.
        const HASH_NO_SRC_PORT = 1 << 3;
    }
}

/// A single service flag, as named in configuration.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceFlag {
    Hostport,
    LocalScope,
    Routable,
    HashNoSrcPort,
}

impl From<ServiceFlag> for ServiceFlags {
    fn from(flag: ServiceFlag) -> Self {
        match flag {
            ServiceFlag::Hostport => Self::HOSTPORT,
            ServiceFlag::LocalScope => Self::LOCAL_SCOPE,
            ServiceFlag::Routable => Self::ROUTABLE,
            ServiceFlag::HashNoSrcPort => Self::HASH_NO_SRC_PORT,
        }
    }
}

impl FromIterator<ServiceFlag> for ServiceFlags {
    fn from_iter<I: IntoIterator<Item = ServiceFlag>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |acc, f| acc | f.into())
    }
}

/// How a service picks one of its backend slots.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Selector {
    /// Hash the flow tuple onto a fixed-size ring of backends built
    /// for the service. Changing the backend list only moves the flows
    /// of the backends which left or joined.
    #[default]
    Ring,

    /// Hash the flow tuple modulo the number of slots. Any change in
    /// the number of backends reshuffles most flows.
    Modulo,

    /// Always use the first slot. The remaining slots act as standby
    /// entries that take over when the slot list is rewritten.
    First,
}

/// The normalized key a service is looked up by.
///
/// The port is zero for ICMP, and for a wildcard entry that matches any
/// destination port on its address and protocol.
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
pub struct ServiceKey {
    pub address: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
    pub scope: Scope,
}

impl ServiceKey {
    pub fn new(
        address: IpAddr,
        port: u16,
        protocol: Protocol,
        scope: Scope,
    ) -> Self {
        Self { address, port, protocol, scope }
    }

    pub fn with_scope(self, scope: Scope) -> Self {
        Self { scope, ..self }
    }

    pub fn with_port(self, port: u16) -> Self {
        Self { port, ..self }
    }
}

impl Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::Ip4(ip) => write!(f, "{ip}:{}", self.port)?,
            IpAddr::Ip6(ip) => write!(f, "[{ip}]:{}", self.port)?,
        }
        write!(f, "/{} ({})", self.protocol, self.scope)
    }
}

/// The master entry of a service.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub struct ServiceRecord {
    /// The number of populated backend slots. Zero means drained.
    pub backend_count: u16,
    pub flags: ServiceFlags,
    pub selector: Selector,

    /// The index under which per-service statistics are kept.
    pub rev_nat_index: u16,
}

impl ServiceRecord {
    pub const fn is_drained(&self) -> bool {
        self.backend_count == 0
    }

    pub fn is_local_scope(&self) -> bool {
        self.flags.contains(ServiceFlags::LOCAL_SCOPE)
    }
}

/// Identifies an entry in the backends map.
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
pub struct BackendId(pub u32);

impl Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a backend is reached once selected.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Reach {
    /// Out of the backend's egress interface.
    #[default]
    Direct,

    /// Through a secondary stage of the dispatch chain.
    Recirculate,
}

/// A load-balancing target.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Backend {
    pub address: IpAddr,

    /// Zero keeps the destination port of the packet.
    pub port: u16,
    pub egress: IfIndex,
    pub mac: Option<MacAddr>,
    pub reach: Reach,
}
