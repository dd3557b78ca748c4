// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use slog::info;
use tabwriter::TabWriter;

use l4lb::api::IfIndex;
use l4lb::engine::ServiceTable;
use l4lb::print::print_counters;
use l4lb::print::print_table;
use l4lbadm::API_VERSION;
use l4lbadm::Lb;
use l4lbadm::MAJOR_VERSION;

/// Administer the L4 load balancer.
#[derive(Debug, Parser)]
#[command(version = l4lbadm_version())]
enum Command {
    /// Validate a configuration file.
    CheckConfig { file: PathBuf },

    /// Print the service table a configuration file compiles to.
    DumpTable { file: PathBuf },

    /// Run every frame of a capture through the dispatch chain.
    Replay {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        pcap: PathBuf,

        /// The interface the frames are taken to arrive on.
        #[arg(long, default_value_t = 1)]
        ingress: u32,

        /// Write the rewritten, redirected frames to this capture.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Emit one JSON object per frame instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn l4lbadm_version() -> String {
    format!("{MAJOR_VERSION}.{API_VERSION}")
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();
    let log = l4lbadm::stderr_logger();

    match cmd {
        Command::CheckConfig { file } => {
            let cfg = l4lbadm::load_cfg(&file)?;
            let table = ServiceTable::try_from(&cfg)?;
            println!(
                "{}: {} services, {} backends",
                file.display(),
                table.service_count(),
                table.backend_count()
            );
        }

        Command::DumpTable { file } => {
            let cfg = l4lbadm::load_cfg(&file)?;
            print_table(&ServiceTable::try_from(&cfg)?)?;
        }

        Command::Replay { config, pcap, ingress, out, json } => {
            let cfg = l4lbadm::load_cfg(&config)?;
            let lb = Lb::new(&cfg, &log)?;
            info!(log, "replaying capture";
                "pcap" => %pcap.display(),
                "chain" => %lb.chain());

            let bytes = std::fs::read(&pcap)
                .with_context(|| format!("reading {}", pcap.display()))?;
            let frames = l4lbadm::read_pcap(&bytes)?;
            let replay = l4lbadm::replay(&lb, frames, IfIndex(ingress));

            if json {
                let mut w = std::io::stdout().lock();
                for rec in &replay.records {
                    serde_json::to_writer(&mut w, rec)?;
                    writeln!(w)?;
                }
            } else {
                let mut t = TabWriter::new(std::io::stdout());
                writeln!(t, "IDX\tLEN\tACTION\tREASON")?;
                for rec in &replay.records {
                    writeln!(t, "{rec}")?;
                }
                writeln!(t)?;
                t.flush()?;
                print_counters(&lb.engine().counters())?;
            }

            if let Some(out) = out {
                let f = File::create(&out)
                    .with_context(|| format!("creating {}", out.display()))?;
                l4lbadm::write_pcap(BufWriter::new(f), &replay.redirected)?;
                info!(log, "wrote redirected frames";
                    "out" => %out.display(),
                    "frames" => replay.redirected.len());
            }
        }
    }

    Ok(())
}
