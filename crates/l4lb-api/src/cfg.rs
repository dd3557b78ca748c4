// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Load balancer configuration.
//!
//! This is the shape of the configuration file read by `l4lbadm`, and
//! the input from which a service table is compiled.

use super::Backend;
use super::BackendId;
use super::IfIndex;
use super::IpAddr;
use super::MacAddr;
use super::Protocol;
use super::Reach;
use super::Scope;
use super::Selector;
use super::ServiceFlag;
use super::ServiceFlags;
use super::ServiceKey;
use super::ServiceRecord;
use alloc::vec::Vec;
use serde::Deserialize;
use serde::Serialize;

/// The complete load balancer configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LbCfg {
    /// Interfaces whose traffic may use the internal scope of a
    /// `local-scope` service.
    #[serde(default)]
    pub internal_ifindexes: Vec<IfIndex>,

    /// Pass, rather than drop, packets whose protocol is not handled.
    #[serde(default)]
    pub pass_unsupported: bool,

    /// When set, a second stage forwards recirculated packets out of
    /// this interface.
    #[serde(default)]
    pub secondary_egress: Option<IfIndex>,

    #[serde(default)]
    pub backends: Vec<BackendCfg>,

    #[serde(default)]
    pub services: Vec<ServiceCfg>,
}

impl LbCfg {
    pub fn engine_cfg(&self) -> EngineCfg {
        EngineCfg {
            internal_ifindexes: self.internal_ifindexes.clone(),
            pass_unsupported: self.pass_unsupported,
        }
    }
}

/// The knobs of the decision engine itself.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EngineCfg {
    pub internal_ifindexes: Vec<IfIndex>,
    pub pass_unsupported: bool,
}

impl EngineCfg {
    /// Is traffic arriving on `ifidx` allowed to fall back to the
    /// internal scope?
    pub fn is_internal(&self, ifidx: IfIndex) -> bool {
        self.internal_ifindexes.contains(&ifidx)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendCfg {
    pub id: BackendId,
    pub address: IpAddr,
    #[serde(default)]
    pub port: u16,
    pub egress: IfIndex,
    #[serde(default)]
    pub mac: Option<MacAddr>,
    #[serde(default)]
    pub reach: Reach,
}

impl From<&BackendCfg> for Backend {
    fn from(cfg: &BackendCfg) -> Self {
        Backend {
            address: cfg.address,
            port: cfg.port,
            egress: cfg.egress,
            mac: cfg.mac,
            reach: cfg.reach,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceCfg {
    pub address: IpAddr,
    #[serde(default)]
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub flags: Vec<ServiceFlag>,
    #[serde(default)]
    pub selector: Selector,
    pub backends: Vec<BackendId>,
    #[serde(default)]
    pub rev_nat_index: u16,
}

impl ServiceCfg {
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.address, self.port, self.protocol, self.scope)
    }

    /// The master record for this service. The backend count is
    /// filled in from the slot list when the table is built.
    pub fn record(&self) -> ServiceRecord {
        ServiceRecord {
            backend_count: 0,
            flags: self.flags.iter().copied().collect::<ServiceFlags>(),
            selector: self.selector,
            rev_nat_index: self.rev_nat_index,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CFG: &str = r#"
internal_ifindexes = [3]
secondary_egress = 9

[[backends]]
id = 1
address = "192.168.1.10"
port = 8080
egress = 2
mac = "02:00:00:00:00:01"

[[backends]]
id = 2
address = "192.168.1.11"
egress = 2
reach = "recirculate"

[[services]]
address = "10.0.0.5"
port = 80
protocol = "tcp"
flags = ["local-scope", "hash-no-src-port"]
backends = [1, 2]
rev_nat_index = 1
"#;

    #[test]
    fn parse_toml() {
        let cfg: LbCfg = toml::from_str(CFG).unwrap();
        assert_eq!(cfg.internal_ifindexes, vec![IfIndex(3)]);
        assert!(!cfg.pass_unsupported);
        assert_eq!(cfg.secondary_egress, Some(IfIndex(9)));
        assert_eq!(cfg.backends.len(), 2);
        assert_eq!(cfg.backends[1].port, 0);
        assert_eq!(cfg.backends[1].reach, Reach::Recirculate);
        assert_eq!(cfg.backends[1].mac, None);

        let svc = &cfg.services[0];
        assert_eq!(svc.scope, Scope::External);
        assert_eq!(svc.protocol, Protocol::TCP);
        let rec = svc.record();
        assert_eq!(
            rec.flags,
            ServiceFlags::LOCAL_SCOPE | ServiceFlags::HASH_NO_SRC_PORT
        );
        assert_eq!(rec.rev_nat_index, 1);

        let ecfg = cfg.engine_cfg();
        assert!(ecfg.is_internal(IfIndex(3)));
        assert!(!ecfg.is_internal(IfIndex(2)));
    }

    #[test]
    fn reject_bad_values() {
        let bad_flag = CFG.replace("hash-no-src-port", "sticky");
        assert!(toml::from_str::<LbCfg>(&bad_flag).is_err());

        let bad_addr = CFG.replace("10.0.0.5", "10.0.0");
        assert!(toml::from_str::<LbCfg>(&bad_addr).is_err());

        let bad_field = CFG.replace("rev_nat_index", "revnat");
        assert!(toml::from_str::<LbCfg>(&bad_field).is_err());
    }

    #[test]
    fn json_round_trip_of_record() {
        let cfg: LbCfg = toml::from_str(CFG).unwrap();
        let rec = cfg.services[0].record();
        let s = serde_json::to_string(&rec).unwrap();
        let back: ServiceRecord = serde_json::from_str(&s).unwrap();
        assert_eq!(rec, back);
    }
}
