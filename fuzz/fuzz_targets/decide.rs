// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

#![no_main]

use libfuzzer_sys::fuzz_target;
use l4lb::api::Action;
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
use l4lb::engine::DispatchChain;
use l4lb::engine::PacketView;
use l4lb::engine::ServiceTable;
use l4lb::engine::dispatch::ChainBuilder;
use l4lb::engine::dispatch::EgressStage;
use l4lb::engine::dispatch::LbStage;
use l4lb::provider::NullLog;
use std::sync::Arc;
use std::sync::LazyLock;

// Services on every protocol the parser knows, on both families, so
// that arbitrary input reaches the rewrite paths.
fn chain() -> DispatchChain {
    let mut t = ServiceTable::new();
    let backends = [
        ("192.168.1.10", 8080, Reach::Direct),
        ("192.168.1.11", 0, Reach::Recirculate),
        ("fd00:1::10", 8443, Reach::Direct),
    ];
    for (n, (addr, port, reach)) in (0..).zip(backends) {
        t.upsert_backend(BackendId(n), Backend {
            address: addr.parse().unwrap(),
            port,
            egress: IfIndex(n + 1),
            mac: None,
            reach,
        });
    }

    let vips = [("10.0.0.5", [0, 1]), ("fd00::5", [2, 2])];
    for (vip, ids) in vips {
        for proto in
            [Protocol::TCP, Protocol::UDP, Protocol::ICMP, Protocol::ICMPv6]
        {
            let key =
                ServiceKey::new(vip.parse().unwrap(), 0, proto, Scope::External);
            t.upsert_service(key, ServiceRecord::default(), &ids.map(BackendId))
                .unwrap();
        }
    }

    let cfg = EngineCfg {
        internal_ifindexes: vec![IfIndex(3)],
        pass_unsupported: false,
    };
    let engine = Arc::new(DecisionEngine::new(cfg, t));
    ChainBuilder::new()
        .stage(LbStage::new(engine))
        .unwrap()
        .stage(EgressStage { egress: IfIndex(9) })
        .unwrap()
        .build(&NullLog)
}

static CHAIN: LazyLock<DispatchChain> = LazyLock::new(chain);

fuzz_target!(|data: &[u8]| {
    let Some((&ingress, frame)) = data.split_first() else { return };
    let mut pkt = frame.to_vec();
    let ingress = IfIndex(u32::from(ingress & 3));
    let action = CHAIN.run(&mut PacketView::new(&mut pkt), ingress);
    assert_eq!(pkt.len(), frame.len());
    // A frame is only ever rewritten when it is sent on.
    if !matches!(action, Action::Redirect(_)) {
        assert_eq!(pkt, frame);
    }
});
