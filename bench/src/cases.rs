// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The packets and the engine setup shared by the benchmarks.

use l4lb::api::Backend;
use l4lb::api::BackendId;
use l4lb::api::EngineCfg;
use l4lb::api::IfIndex;
use l4lb::api::Protocol;
use l4lb::api::Reach;
use l4lb::api::Scope;
use l4lb::api::ServiceKey;
use l4lb::api::ServiceRecord;
use l4lb::engine::DecisionEngine;
use l4lb::engine::ServiceTable;
use l4lb_test_utils::*;

/// One kind of packet to time the decision path with.
#[derive(Clone, Copy, Debug)]
pub enum Case {
    /// A TCP SYN to a service, redirected to one of its backends.
    TcpSynRedirect,

    /// A UDP datagram to a service, redirected with a port rewrite.
    UdpRedirect,

    /// An IPv6 TCP SYN to a service.
    Tcp6Redirect,

    /// Traffic to an address we don't serve.
    PassThrough,

    /// A frame cut off in the middle of its IP header.
    Truncated,
}

impl Case {
    pub const ALL: [Case; 5] = [
        Case::TcpSynRedirect,
        Case::UdpRedirect,
        Case::Tcp6Redirect,
        Case::PassThrough,
        Case::Truncated,
    ];

    pub fn name(&self) -> String {
        format!("{self:?}")
    }

    pub fn frame(&self) -> Vec<u8> {
        match self {
            Self::TcpSynRedirect => tcp4("172.16.0.9", 33000, "10.0.0.5", 80),
            Self::UdpRedirect => {
                udp4("172.16.0.9", 5353, "10.0.0.5", 53, &[0xAA; 64])
            }
            Self::Tcp6Redirect => tcp6("fd00::9", 33000, "fd00::5", 443),
            Self::PassThrough => tcp4("172.16.0.9", 33000, "10.0.0.99", 80),
            Self::Truncated => {
                let mut f = tcp4("172.16.0.9", 33000, "10.0.0.5", 80);
                f.truncate(ETHER_HDR_LEN + 12);
                f
            }
        }
    }
}

fn backend(addr: &str, port: u16) -> Backend {
    Backend {
        address: addr.parse().unwrap(),
        port,
        egress: IfIndex(2),
        mac: Some("02:00:00:00:00:01".parse().unwrap()),
        reach: Reach::Direct,
    }
}

/// An engine serving every redirected [`Case`], each service backed
/// by eight backends.
pub fn engine() -> DecisionEngine {
    let mut t = ServiceTable::new();
    let services = [
        ("10.0.0.5", 80, Protocol::TCP, "192.168.1", 0),
        ("10.0.0.5", 53, Protocol::UDP, "192.168.2", 5300),
        ("fd00::5", 443, Protocol::TCP, "fd00:1::", 8443),
    ];

    let mut next_id = 1;
    for (idx, (vip, port, proto, prefix, be_port)) in services.iter().enumerate() {
        let ids = (0..8)
            .map(|n| {
                let addr = if prefix.ends_with("::") {
                    format!("{prefix}{}", n + 1)
                } else {
                    format!("{prefix}.{}", n + 1)
                };
                let id = BackendId(next_id);
                next_id += 1;
                t.upsert_backend(id, backend(&addr, *be_port));
                id
            })
            .collect::<Vec<_>>();

        let key =
            ServiceKey::new(vip.parse().unwrap(), *port, *proto, Scope::External);
        let rec = ServiceRecord {
            rev_nat_index: idx as u16 + 1,
            ..Default::default()
        };
        t.upsert_service(key, rec, &ids).unwrap();
    }

    DecisionEngine::new(EngineCfg::default(), t)
}
