// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The decision engine.
//!
//! A packet moves through four phases: it is parsed, classified
//! against the service table, rewritten toward a backend, and finally
//! forwarded. Each phase either hands off to the next or ends with a
//! [`Decision`]. Nothing on this path allocates, blocks, or logs.

use super::packet::PacketView;
use super::packet::Reject;
use super::parse::Parsed;
use super::parse::parse;
use super::rewrite::rewrite;
use super::select::FlowHash;
use super::select::SelectBackend;
use super::service::Lookup;
use super::service::Service;
use super::service::ServiceTable;
use super::service::TableError;
use super::stat::EngineStats;
use crate::api::Action;
use crate::api::Backend;
use crate::api::EngineCfg;
use crate::api::EngineCounters;
use crate::api::IfIndex;
use crate::api::LbCfg;
use crate::api::Reach;
use crate::api::Reason;
use crate::dynamic::Dynamic;
use crate::dynamic::Snapshot;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use crate::provider::NullLog;
use alloc::boxed::Box;
use alloc::format;
use core::fmt;
use core::fmt::Display;

/// The verdict for one packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Decision {
    pub action: Action,

    /// Why the packet ended where it did. A redirect or recirculation
    /// of a rewritten packet carries no reason.
    pub reason: Option<Reason>,
}

impl Decision {
    pub const fn new(action: Action, reason: Option<Reason>) -> Self {
        Self { action, reason }
    }

    pub const fn dropped(reason: Reason) -> Self {
        Self::new(Action::Drop, Some(reason))
    }

    pub const fn passed(reason: Reason) -> Self {
        Self::new(Action::Pass, Some(reason))
    }

    const fn forward(backend: &Backend) -> Self {
        let action = match backend.reach {
            Reach::Direct => Action::Redirect(backend.egress),
            Reach::Recirculate => Action::Recirculate,
        };
        Self::new(action, None)
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.reason {
            Some(reason) => write!(f, "{} ({reason})", self.action),
            None => write!(f, "{}", self.action),
        }
    }
}

impl From<Reject> for Decision {
    fn from(reject: Reject) -> Self {
        Self::dropped(reject.into())
    }
}

pub struct DecisionEngine {
    cfg: EngineCfg,
    table: Dynamic<ServiceTable>,
    selector: Box<dyn SelectBackend>,
    stats: EngineStats,
    log: Box<dyn LogProvider>,
}

impl DecisionEngine {
    /// Create an engine over `table`, selecting backends by flow hash
    /// and discarding log messages.
    pub fn new(cfg: EngineCfg, table: ServiceTable) -> Self {
        Self {
            cfg,
            table: Dynamic::from(table),
            selector: Box::new(FlowHash),
            stats: EngineStats::default(),
            log: Box::new(NullLog),
        }
    }

    /// Build the table described by `cfg` and an engine over it.
    pub fn from_cfg(cfg: &LbCfg) -> Result<Self, TableError> {
        let table = ServiceTable::try_from(cfg)?;
        Ok(Self::new(cfg.engine_cfg(), table))
    }

    pub fn with_selector<S: SelectBackend + 'static>(
        mut self,
        selector: S,
    ) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn with_log<L: LogProvider + 'static>(mut self, log: L) -> Self {
        self.log = Box::new(log);
        self
    }

    pub fn cfg(&self) -> &EngineCfg {
        &self.cfg
    }

    pub fn log(&self) -> &dyn LogProvider {
        self.log.as_ref()
    }

    /// The table as of now. Later updates do not affect the snapshot.
    pub fn table(&self) -> Snapshot<ServiceTable> {
        self.table.load()
    }

    /// Replace the whole service table, returning the new epoch.
    pub fn set_table(&self, table: ServiceTable) -> u64 {
        let (services, backends) = (table.service_count(), table.backend_count());
        let epoch = self.table.store(table);
        self.log.log(
            LogLevel::Note,
            &format!(
                "service table replaced: {services} services, \
                 {backends} backends, epoch {epoch}"
            ),
        );
        epoch
    }

    /// Apply `f` to a copy of the service table and install the copy
    /// if `f` succeeds. Packets in flight keep using the table they
    /// started with.
    pub fn modify_table<F, R>(&self, f: F) -> Result<(R, u64), TableError>
    where
        F: FnOnce(&mut ServiceTable) -> Result<R, TableError>,
    {
        match self.table.modify(f) {
            Ok((res, epoch)) => {
                self.log.log(
                    LogLevel::Note,
                    &format!("service table updated, epoch {epoch}"),
                );
                Ok((res, epoch))
            }

            Err(e) => {
                self.log.log(
                    LogLevel::Warn,
                    &format!("service table update rejected: {e}"),
                );
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Read out the engine and per-service counters.
    pub fn counters(&self) -> EngineCounters {
        self.stats.snapshot(&self.table.load())
    }

    /// Decide the fate of the packet in `view`, which arrived on
    /// `ingress`.
    ///
    /// A packet which is redirected or recirculated has been rewritten
    /// in place. Any other packet is left as it came in.
    pub fn decide(&self, view: &mut PacketView<'_>, ingress: IfIndex) -> Decision {
        let table = self.table.load();
        let decision = self.decide_with(&table, view, ingress);
        self.stats.record(&decision);
        decision
    }

    fn decide_with(
        &self,
        table: &ServiceTable,
        view: &mut PacketView<'_>,
        ingress: IfIndex,
    ) -> Decision {
        let meta = match parse(view) {
            Ok(meta) => meta,

            Err(Reject::UnsupportedProtocol) if self.cfg.pass_unsupported => {
                return Decision::passed(Reason::UnsupportedProtocol);
            }

            Err(reject) => return reject.into(),
        };

        let svc = match self.classify(table, &meta, ingress) {
            Ok(svc) => svc,
            Err(decision) => return decision,
        };

        let flow = meta.flow();
        let Some(backend) =
            self.selector.select(table, &svc.key, svc.record, &flow)
        else {
            return Decision::dropped(Reason::NoBackend);
        };

        if let Err(reason) = rewrite(view, &meta, backend) {
            return Decision::dropped(reason);
        }

        // Only traffic actually sent on to a backend counts toward the
        // service.
        if let Some(stats) = table.service_stats(svc.record.rev_nat_index) {
            stats.hit(meta.ip_len());
        }

        Decision::forward(backend)
    }

    fn classify<'t>(
        &self,
        table: &'t ServiceTable,
        meta: &Parsed,
        ingress: IfIndex,
    ) -> Result<Service<'t>, Decision> {
        let fallback = self.cfg.is_internal(ingress);
        let key = meta.service_key();

        // A service on port 0 takes every port of its address.
        let lookup = match table.probe(&key, fallback) {
            Lookup::Absent if key.port != 0 => {
                table.probe(&key.with_port(0), fallback)
            }
            found => found,
        };

        match lookup {
            Lookup::Found(svc) => Ok(svc),
            Lookup::Drained => Err(Decision::dropped(Reason::NoBackend)),
            Lookup::Absent => Err(Decision::passed(Reason::NoService)),
        }
    }
}
