// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Property tests for the checksum engine, the parser's bounds
//! checking, and service table lookups.

use common::verify::ipv4_csum_ok;
use common::verify::l4_csum_ok;
use common::verify::summarize;
use common::*;
use l4lb::api::Action;
use l4lb::api::Backend;
use l4lb::api::BackendId;
use l4lb::api::EngineCfg;
use l4lb::api::IfIndex;
use l4lb::api::IpAddr;
use l4lb::api::Ipv4Addr;
use l4lb::api::Protocol;
use l4lb::api::Reach;
use l4lb::api::Reason;
use l4lb::api::Scope;
use l4lb::api::ServiceFlags;
use l4lb::api::ServiceKey;
use l4lb::api::ServiceRecord;
use l4lb::engine::Decision;
use l4lb::engine::DecisionEngine;
use l4lb::engine::PacketView;
use l4lb::engine::ServiceTable;
use l4lb::engine::checksum::full_checksum;
use l4lb::engine::checksum::incremental_update;
use l4lb::engine::dispatch::ChainBuilder;
use l4lb::engine::dispatch::EgressStage;
use l4lb::engine::dispatch::LbStage;
use l4lb::engine::ip4::IPV4_CSUM_OFFSET;
use l4lb::engine::service::Lookup;
use l4lb::provider::NullLog;
use l4lb_test_utils as common;
use proptest::prelude::*;
use std::sync::Arc;

fn v4(octets: [u8; 4]) -> IpAddr {
    Ipv4Addr::from(octets).into()
}

fn one_service_engine(
    vip: IpAddr,
    port: u16,
    proto: Protocol,
    backend: Backend,
) -> DecisionEngine {
    let mut t = ServiceTable::new();
    t.upsert_backend(BackendId(1), backend);
    let key = ServiceKey::new(vip, port, proto, Scope::External);
    t.upsert_service(key, ServiceRecord::default(), &[BackendId(1)])
        .unwrap();
    DecisionEngine::new(EngineCfg::default(), t)
}

fn any_frame() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        (any::<u16>(), any::<u16>())
            .prop_map(|(s, d)| tcp4("172.16.0.9", s, "10.0.0.5", d)),
        (any::<u16>(), prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(s, p)| udp4("172.16.0.9", s, "10.0.0.5", 53, &p)),
        any::<u16>().prop_map(|id| icmp4_echo("172.16.0.9", "10.0.0.5", id)),
        any::<u16>().prop_map(|s| tcp6("fd00::9", s, "fd00::5", 443)),
        any::<u16>().prop_map(|s| udp6("fd00::9", s, "fd00::5", 53, b"six")),
    ]
}

#[derive(Debug, Eq, PartialEq)]
enum Outcome {
    Absent,
    Drained,
    Found(ServiceKey, ServiceRecord),
}

impl From<Lookup<'_>> for Outcome {
    fn from(l: Lookup<'_>) -> Self {
        match l {
            Lookup::Absent => Self::Absent,
            Lookup::Drained => Self::Drained,
            Lookup::Found(svc) => Self::Found(svc.key, *svc.record),
        }
    }
}

proptest! {
    // Rewriting one 16-bit word of a header and updating its checksum
    // incrementally gives the same bytes as recomputing it.
    #[test]
    fn incremental_equals_full(
        mut hdr in any::<[u8; 20]>(),
        word in 0usize..10,
        new in any::<u16>(),
    ) {
        prop_assume!(word != IPV4_CSUM_OFFSET / 2);
        let csum_field = IPV4_CSUM_OFFSET..IPV4_CSUM_OFFSET + 2;

        hdr[csum_field.clone()].fill(0);
        let csum = full_checksum(&hdr);
        hdr[csum_field.clone()].copy_from_slice(&csum.to_be_bytes());

        let at = word * 2;
        let old = u16::from_be_bytes([hdr[at], hdr[at + 1]]);
        hdr[at..at + 2].copy_from_slice(&new.to_be_bytes());

        let inc = incremental_update(csum, old, new);
        hdr[csum_field].fill(0);
        prop_assert_eq!(inc, full_checksum(&hdr));
    }

    // Rewriting toward any backend leaves both checksums valid.
    #[test]
    fn rewrite_keeps_checksums_valid(
        src in any::<[u8; 4]>(),
        vip in any::<[u8; 4]>(),
        be in any::<[u8; 4]>(),
        sport in any::<u16>(),
        dport in any::<u16>(),
        be_port in any::<u16>(),
        use_udp in any::<bool>(),
        payload in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let (proto, l4) = if use_udp {
            (Protocol::UDP, L4Spec::Udp { src_port: sport, dst_port: dport, csum: true })
        } else {
            (Protocol::TCP, L4Spec::Tcp { src_port: sport, dst_port: dport, flags: TCP_SYN })
        };

        let backend = Backend {
            address: v4(be),
            port: be_port,
            egress: IfIndex(7),
            mac: None,
            reach: Reach::Direct,
        };
        let engine = one_service_engine(v4(vip), dport, proto, backend);

        let mut pkt = PktSpec::new(v4(src), v4(vip), l4).payload(&payload).build();
        let d = engine.decide(&mut PacketView::new(&mut pkt), IfIndex(1));
        prop_assert_eq!(d.action, Action::Redirect(IfIndex(7)));

        let s = summarize(&pkt).unwrap();
        prop_assert_eq!(s.dst, v4(be));
        let expected_port = if be_port == 0 { dport } else { be_port };
        prop_assert_eq!(s.dst_port, Some(expected_port));
        prop_assert!(ipv4_csum_ok(&pkt));
        prop_assert!(l4_csum_ok(&pkt));
    }

    // Every strict prefix of a valid frame is dropped as truncated.
    #[test]
    fn prefixes_are_dropped(frame in any_frame()) {
        let engine = one_service_engine(
            "10.0.0.5".parse().unwrap(),
            0,
            Protocol::TCP,
            Backend {
                address: "192.168.1.10".parse().unwrap(),
                port: 0,
                egress: IfIndex(2),
                mac: None,
                reach: Reach::Direct,
            },
        );

        for len in 0..frame.len() {
            let mut prefix = frame[..len].to_vec();
            let d = engine.decide(&mut PacketView::new(&mut prefix), IfIndex(1));
            prop_assert_eq!(d, Decision::dropped(Reason::Truncated));
        }
    }

    // Arbitrary bytes never bring the chain down.
    #[test]
    fn arbitrary_bytes(mut bytes in prop::collection::vec(any::<u8>(), 0..128)) {
        let engine = Arc::new(one_service_engine(
            "10.0.0.5".parse().unwrap(),
            80,
            Protocol::TCP,
            Backend {
                address: "192.168.1.10".parse().unwrap(),
                port: 0,
                egress: IfIndex(2),
                mac: None,
                reach: Reach::Recirculate,
            },
        ));
        let chain = ChainBuilder::new()
            .stage(LbStage::new(engine))
            .unwrap()
            .stage(EgressStage { egress: IfIndex(9) })
            .unwrap()
            .build(&NullLog);

        let len = bytes.len();
        let _ = chain.run(&mut PacketView::new(&mut bytes), IfIndex(1));
        prop_assert_eq!(bytes.len(), len);
    }

    // Lookups neither change the table nor depend on what was looked
    // up before.
    #[test]
    fn lookup_is_idempotent(
        ports in prop::collection::btree_set(any::<u16>(), 1..16),
        drained in any::<u16>(),
        local in any::<bool>(),
        probes in prop::collection::vec((any::<u16>(), any::<bool>()), 1..32),
    ) {
        let vip: IpAddr = "10.0.0.5".parse().unwrap();
        let mut t = ServiceTable::new();
        t.upsert_backend(BackendId(1), Backend {
            address: "192.168.1.10".parse().unwrap(),
            port: 0,
            egress: IfIndex(2),
            mac: None,
            reach: Reach::Direct,
        });

        let flags = if local { ServiceFlags::LOCAL_SCOPE } else { ServiceFlags::empty() };
        for port in &ports {
            let backends: &[BackendId] =
                if *port == drained { &[] } else { &[BackendId(1)] };
            let ext = ServiceKey::new(vip, *port, Protocol::TCP, Scope::External);
            let rec = ServiceRecord { flags, ..Default::default() };
            t.upsert_service(ext, rec, backends).unwrap();
            t.upsert_service(ext.with_scope(Scope::Internal), ServiceRecord::default(), backends)
                .unwrap();
        }

        let before = t.services().map(|(k, r)| (*k, *r)).collect::<Vec<_>>();
        let first = probes
            .iter()
            .map(|(port, fb)| {
                let key = ServiceKey::new(vip, *port, Protocol::TCP, Scope::External);
                Outcome::from(t.probe(&key, *fb))
            })
            .collect::<Vec<_>>();

        for ((port, fb), expected) in probes.iter().zip(&first).rev() {
            let key = ServiceKey::new(vip, *port, Protocol::TCP, Scope::External);
            prop_assert_eq!(&Outcome::from(t.probe(&key, *fb)), expected);
            prop_assert_eq!(
                t.lookup(&key, *fb).copied(),
                match expected {
                    Outcome::Found(_, rec) => Some(*rec),
                    _ => None,
                }
            );
            prop_assert_eq!(ports.contains(port), *expected != Outcome::Absent);
        }

        let after = t.services().map(|(k, r)| (*k, *r)).collect::<Vec<_>>();
        prop_assert_eq!(before, after);
    }
}
