// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Print tables and counters in a human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both l4lbadm and integration tests.

use crate::api::ActionCounter;
use crate::api::EngineCounters;
use crate::api::ServiceFlags;
use crate::engine::service::ServiceTable;
use itertools::Itertools;
use std::io::Write;
use std::string::String;
use std::string::ToString;
use tabwriter::TabWriter;

/// Print the services and backends of a [`ServiceTable`].
pub fn print_table(table: &ServiceTable) -> std::io::Result<()> {
    print_table_into(&mut std::io::stdout(), table)
}

/// Print the services and backends of a [`ServiceTable`] into a given
/// writer.
pub fn print_table_into(
    writer: &mut impl Write,
    table: &ServiceTable,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Services")?;
    write_hrb(&mut t)?;
    writeln!(t, "ADDRESS\tPORT\tPROTO\tSCOPE\tFLAGS\tSELECTOR\tREV NAT\tBACKENDS")?;
    for (key, rec) in table.services() {
        let slots = table.slots(key).map(|id| id.to_string()).join(",");
        writeln!(
            t,
            "{}\t{}\t{}\t{}\t{}\t{:?}\t{}\t{}",
            key.address,
            key.port,
            key.protocol,
            key.scope,
            flags_str(rec.flags),
            rec.selector,
            rec.rev_nat_index,
            if slots.is_empty() { "-".to_string() } else { slots },
        )?;
    }
    t.flush()?;

    writeln!(t, "\nBackends")?;
    write_hrb(&mut t)?;
    writeln!(t, "ID\tADDRESS\tPORT\tEGRESS\tMAC\tREACH")?;
    for (id, be) in table.backends() {
        let mac = be.mac.map(|m| m.to_string());
        writeln!(
            t,
            "{id}\t{}\t{}\t{}\t{}\t{:?}",
            be.address,
            be.port,
            be.egress,
            mac.as_deref().unwrap_or("-"),
            be.reach,
        )?;
    }
    t.flush()
}

/// Print [`EngineCounters`].
pub fn print_counters(counters: &EngineCounters) -> std::io::Result<()> {
    print_counters_into(&mut std::io::stdout(), counters)
}

/// Print [`EngineCounters`] into a given writer.
pub fn print_counters_into(
    writer: &mut impl Write,
    counters: &EngineCounters,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Actions")?;
    write_hr(&mut t)?;
    print_actions(&mut t, &counters.actions)?;
    t.flush()?;

    writeln!(t, "\nReasons")?;
    write_hr(&mut t)?;
    writeln!(t, "REASON\tPACKETS")?;
    for (reason, n) in &counters.reasons {
        writeln!(t, "{reason}\t{n}")?;
    }
    t.flush()?;

    writeln!(t, "\nServices")?;
    write_hr(&mut t)?;
    writeln!(t, "REV NAT\tPACKETS\tBYTES")?;
    for (idx, c) in &counters.services {
        writeln!(t, "{idx}\t{}\t{}", c.packets, c.bytes)?;
    }
    t.flush()
}

fn print_actions(t: &mut impl Write, a: &ActionCounter) -> std::io::Result<()> {
    writeln!(t, "PASS\tDROP\tREDIRECT\tRECIRCULATE\tTOTAL")?;
    writeln!(
        t,
        "{}\t{}\t{}\t{}\t{}",
        a.pass,
        a.drop,
        a.redirect,
        a.recirculate,
        a.total()
    )
}

fn flags_str(flags: ServiceFlags) -> String {
    if flags.is_empty() {
        return "-".to_string();
    }
    flags.iter_names().map(|(name, _)| name.to_lowercase()).join(",")
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Backend;
    use crate::api::BackendId;
    use crate::api::IfIndex;
    use crate::api::Protocol;
    use crate::api::Reach;
    use crate::api::Scope;
    use crate::api::ServiceKey;
    use crate::api::ServiceRecord;

    #[test]
    fn table_output() {
        let mut t = ServiceTable::new();
        t.upsert_backend(BackendId(7), Backend {
            address: "192.168.1.10".parse().unwrap(),
            port: 8080,
            egress: IfIndex(2),
            mac: Some("02:00:00:00:00:01".parse().unwrap()),
            reach: Reach::Direct,
        });
        let key = ServiceKey::new(
            "10.0.0.5".parse().unwrap(),
            80,
            Protocol::TCP,
            Scope::External,
        );
        let rec = ServiceRecord {
            flags: ServiceFlags::LOCAL_SCOPE | ServiceFlags::ROUTABLE,
            rev_nat_index: 4,
            ..Default::default()
        };
        t.upsert_service(key, rec, &[BackendId(7)]).unwrap();

        let mut out = vec![];
        print_table_into(&mut out, &t).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("10.0.0.5"));
        assert!(out.contains("local_scope,routable"));
        assert!(out.contains("02:00:00:00:00:01"));
        assert!(out.contains("8080"));
    }

    #[test]
    fn counters_output() {
        let mut c = EngineCounters::default();
        c.actions.drop = 3;
        c.reasons.insert(crate::api::Reason::Truncated, 3);

        let mut out = vec![];
        print_counters_into(&mut out, &c).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("truncated"));
        assert!(out.lines().any(|l| l.starts_with('0') && l.contains('3')));
    }
}
