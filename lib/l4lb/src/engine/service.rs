// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The service table.
//!
//! The table is laid out the way a load balancer's service map
//! usually is: every service key owns a run of slots. Slot zero holds
//! the master [`ServiceRecord`], and slots `1..=backend_count` each
//! hold the [`BackendId`] of one backend. A second map resolves a
//! `BackendId` to the [`Backend`] itself. A service selecting by
//! [`Selector::Ring`] also owns a [`Ring`], rebuilt whenever its
//! backends change.
//!
//! The packet path only ever reads a table. The control plane builds
//! a modified copy and swaps it in whole (see [`crate::dynamic`]).

use super::select::Ring;
use super::stat::ServiceStats;
use crate::api::Backend;
use crate::api::BackendId;
use crate::api::LbCfg;
use crate::api::MAX_BACKENDS_PER_SERVICE;
use crate::api::Scope;
use crate::api::Selector;
use crate::api::ServiceKey;
use crate::api::ServiceRecord;
use alloc::collections::BTreeMap;
use alloc::collections::BTreeSet;
use alloc::sync::Arc;
use core::fmt;
use core::fmt::Display;

/// The slot of the master entry of a service.
pub const MASTER_SLOT: u16 = 0;

/// Errors from building or mutating a [`ServiceTable`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TableError {
    DuplicateService(ServiceKey),
    DuplicateBackend(BackendId),
    UnknownBackend { service: Option<ServiceKey>, backend: BackendId },
    TooManyBackends { service: ServiceKey, count: usize },
    FamilyMismatch { service: ServiceKey, backend: BackendId },
    BackendInUse(BackendId),
}

impl Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateService(key) => {
                write!(f, "duplicate service: {key}")
            }
            Self::DuplicateBackend(id) => {
                write!(f, "duplicate backend id: {id}")
            }
            Self::UnknownBackend { service: Some(key), backend } => {
                write!(f, "service {key} refers to unknown backend {backend}")
            }
            Self::UnknownBackend { service: None, backend } => {
                write!(f, "unknown backend: {backend}")
            }
            Self::TooManyBackends { service, count } => write!(
                f,
                "service {service} has {count} backends, the maximum is \
                 {MAX_BACKENDS_PER_SERVICE}"
            ),
            Self::FamilyMismatch { service, backend } => write!(
                f,
                "backend {backend} of service {service} is in a different \
                 address family"
            ),
            Self::BackendInUse(id) => {
                write!(f, "backend {id} is still referenced by a service")
            }
        }
    }
}

impl core::error::Error for TableError {}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct SlotKey {
    key: ServiceKey,
    slot: u16,
}

impl SlotKey {
    fn master(key: ServiceKey) -> Self {
        Self { key, slot: MASTER_SLOT }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Slot {
    Master(ServiceRecord),
    Backend(BackendId),
}

/// A service which matched a lookup: the key which actually matched
/// (after any scope or wildcard fallback) and its master record.
#[derive(Clone, Copy, Debug)]
pub struct Service<'a> {
    pub key: ServiceKey,
    pub record: &'a ServiceRecord,
}

/// The outcome of probing the table.
#[derive(Clone, Copy, Debug)]
pub enum Lookup<'a> {
    /// There is no entry for the key.
    Absent,

    /// An entry matched, but it has no backends to offer.
    Drained,

    Found(Service<'a>),
}

impl<'a> Lookup<'a> {
    fn from_master(key: ServiceKey, record: &'a ServiceRecord) -> Self {
        if record.is_drained() {
            Self::Drained
        } else {
            Self::Found(Service { key, record })
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ServiceTable {
    slots: BTreeMap<SlotKey, Slot>,
    backends: BTreeMap<BackendId, Backend>,
    rings: BTreeMap<ServiceKey, Ring>,
    stats: BTreeMap<u16, Arc<ServiceStats>>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn master(&self, key: ServiceKey) -> Option<&ServiceRecord> {
        match self.slots.get(&SlotKey::master(key)) {
            Some(Slot::Master(rec)) => Some(rec),
            _ => None,
        }
    }

    /// Probe for `key`, telling apart a missing entry from a drained
    /// one.
    ///
    /// The external scope is always probed first, whatever the scope
    /// of `key`. When the external record is `LOCAL_SCOPE` and
    /// `allow_scope_fallback` is set, the internal record decides the
    /// outcome instead.
    pub fn probe(
        &self,
        key: &ServiceKey,
        allow_scope_fallback: bool,
    ) -> Lookup<'_> {
        let ext = key.with_scope(Scope::External);
        let Some(rec) = self.master(ext) else {
            return Lookup::Absent;
        };

        if !allow_scope_fallback || !rec.is_local_scope() {
            return Lookup::from_master(ext, rec);
        }

        let int = key.with_scope(Scope::Internal);
        match self.master(int) {
            Some(rec) => Lookup::from_master(int, rec),
            // The external entry still matched; it just has nothing
            // for us in the scope we're allowed to use.
            None => Lookup::Drained,
        }
    }

    /// Look up the service record for `key`. A record without
    /// backends is never returned.
    pub fn lookup(
        &self,
        key: &ServiceKey,
        allow_scope_fallback: bool,
    ) -> Option<&ServiceRecord> {
        match self.probe(key, allow_scope_fallback) {
            Lookup::Found(svc) => Some(svc.record),
            Lookup::Absent | Lookup::Drained => None,
        }
    }

    /// Resolve backend slot `slot` of the service `key`.
    pub fn backend_at(&self, key: &ServiceKey, slot: u16) -> Option<&Backend> {
        if slot == MASTER_SLOT {
            return None;
        }

        match self.slots.get(&SlotKey { key: *key, slot })? {
            Slot::Backend(id) => self.backends.get(id),
            Slot::Master(_) => None,
        }
    }

    /// The ring of the service `key`, if it selects by ring and has
    /// backends.
    pub fn ring(&self, key: &ServiceKey) -> Option<&Ring> {
        self.rings.get(key)
    }

    pub fn backend(&self, id: BackendId) -> Option<&Backend> {
        self.backends.get(&id)
    }

    /// The statistics kept for `rev_nat_index`.
    pub fn service_stats(&self, rev_nat_index: u16) -> Option<&ServiceStats> {
        self.stats.get(&rev_nat_index).map(|s| s.as_ref())
    }

    /// Every service, in key order, along with its record.
    pub fn services(
        &self,
    ) -> impl Iterator<Item = (&ServiceKey, &ServiceRecord)> + '_ {
        self.slots.iter().filter_map(|(sk, slot)| match slot {
            Slot::Master(rec) => Some((&sk.key, rec)),
            Slot::Backend(_) => None,
        })
    }

    /// The backend ids in the slots of `key`, in slot order.
    pub fn slots(
        &self,
        key: &ServiceKey,
    ) -> impl Iterator<Item = BackendId> + '_ {
        let start = SlotKey { key: *key, slot: MASTER_SLOT + 1 };
        let end = SlotKey { key: *key, slot: u16::MAX };
        self.slots.range(start..=end).filter_map(|(_, slot)| match slot {
            Slot::Backend(id) => Some(*id),
            Slot::Master(_) => None,
        })
    }

    pub fn backends(&self) -> impl Iterator<Item = (&BackendId, &Backend)> {
        self.backends.iter()
    }

    pub fn stats(&self) -> impl Iterator<Item = (&u16, &Arc<ServiceStats>)> {
        self.stats.iter()
    }

    pub fn service_count(&self) -> usize {
        self.services().count()
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    fn remove_slots(&mut self, key: &ServiceKey) -> Option<ServiceRecord> {
        let rec = match self.slots.remove(&SlotKey::master(*key))? {
            Slot::Master(rec) => rec,
            Slot::Backend(_) => return None,
        };

        for slot in 1..=rec.backend_count {
            self.slots.remove(&SlotKey { key: *key, slot });
        }

        self.rings.remove(key);
        Some(rec)
    }

    /// Insert or replace the service `key`.
    ///
    /// The slots are rewritten to hold `backends` in order, and the
    /// record's `backend_count` is set to match.
    pub fn upsert_service(
        &mut self,
        key: ServiceKey,
        mut record: ServiceRecord,
        backends: &[BackendId],
    ) -> Result<(), TableError> {
        if backends.len() > MAX_BACKENDS_PER_SERVICE {
            return Err(TableError::TooManyBackends {
                service: key,
                count: backends.len(),
            });
        }

        if let Some(&missing) =
            backends.iter().find(|id| !self.backends.contains_key(id))
        {
            return Err(TableError::UnknownBackend {
                service: Some(key),
                backend: missing,
            });
        }

        self.remove_slots(&key);

        // Bounded by MAX_BACKENDS_PER_SERVICE above.
        record.backend_count = backends.len() as u16;
        self.slots.insert(SlotKey::master(key), Slot::Master(record));
        for (slot, id) in (1..).zip(backends) {
            self.slots.insert(SlotKey { key, slot }, Slot::Backend(*id));
        }

        if record.selector == Selector::Ring {
            if let Some(ring) = Ring::build(backends) {
                self.rings.insert(key, ring);
            }
        }

        self.stats.entry(record.rev_nat_index).or_default();
        self.prune_stats();
        Ok(())
    }

    /// Remove the service `key`, returning its record.
    pub fn remove_service(&mut self, key: &ServiceKey) -> Option<ServiceRecord> {
        let rec = self.remove_slots(key)?;
        self.prune_stats();
        Some(rec)
    }

    /// Insert or replace a backend, returning the previous one.
    pub fn upsert_backend(
        &mut self,
        id: BackendId,
        backend: Backend,
    ) -> Option<Backend> {
        self.backends.insert(id, backend)
    }

    /// Remove a backend no service refers to any longer.
    pub fn remove_backend(
        &mut self,
        id: BackendId,
    ) -> Result<Backend, TableError> {
        if self.slots.values().any(|s| *s == Slot::Backend(id)) {
            return Err(TableError::BackendInUse(id));
        }

        self.backends
            .remove(&id)
            .ok_or(TableError::UnknownBackend { service: None, backend: id })
    }

    // Drop counters whose reverse NAT index no service uses.
    fn prune_stats(&mut self) {
        let live: BTreeSet<u16> =
            self.services().map(|(_, rec)| rec.rev_nat_index).collect();
        self.stats.retain(|idx, _| live.contains(idx));
    }
}

impl TryFrom<&LbCfg> for ServiceTable {
    type Error = TableError;

    fn try_from(cfg: &LbCfg) -> Result<Self, Self::Error> {
        let mut table = Self::new();

        for b in &cfg.backends {
            if table.upsert_backend(b.id, Backend::from(b)).is_some() {
                return Err(TableError::DuplicateBackend(b.id));
            }
        }

        for svc in &cfg.services {
            let key = svc.key();
            if table.master(key).is_some() {
                return Err(TableError::DuplicateService(key));
            }

            for id in &svc.backends {
                let Some(backend) = table.backend(*id) else {
                    return Err(TableError::UnknownBackend {
                        service: Some(key),
                        backend: *id,
                    });
                };

                if !backend.address.same_family(&key.address) {
                    return Err(TableError::FamilyMismatch {
                        service: key,
                        backend: *id,
                    });
                }
            }

            table.upsert_service(key, svc.record(), &svc.backends)?;
        }

        Ok(table)
    }
}
