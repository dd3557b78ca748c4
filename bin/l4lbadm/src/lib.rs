// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! L4LB administration library.
//!
//! This holds everything `l4lbadm` does short of argument parsing, so
//! that it may be driven from tests: loading configuration, standing
//! up an engine and its dispatch chain, and replaying captures through
//! it.

use l4lb::api::Action;
use l4lb::api::IfIndex;
use l4lb::api::LbCfg;
use l4lb::api::Reason;
use l4lb::engine::DecisionEngine;
use l4lb::engine::DispatchChain;
use l4lb::engine::PacketView;
use l4lb::engine::dispatch::ChainBuilder;
use l4lb::engine::dispatch::ChainFull;
use l4lb::engine::dispatch::EgressStage;
use l4lb::engine::dispatch::LbStage;
use l4lb::engine::dispatch::StageCtx;
use l4lb::engine::service::TableError;
use l4lb::provider::LogLevel;
use l4lb::provider::LogProvider;
use pcap_parser::Linktype;
use pcap_parser::ToVec;
use pcap_parser::pcap;
use pcap_parser::pcap::LegacyPcapBlock;
use pcap_parser::pcap::PcapHeader;
use serde::Serialize;
use slog::Drain;
use slog::Logger;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;
use std::fmt;
use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use l4lb::api::API_VERSION;
pub use l4lb::api::MAJOR_VERSION;

/// The largest frame written out to a capture.
pub const SNAPLEN: u32 = 65535;

/// Errors related to administering the load balancer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid service table: {0}")]
    Table(#[from] TableError),

    #[error("invalid dispatch chain: {0}")]
    Chain(#[from] ChainFull),

    #[error("malformed capture: {0}")]
    Pcap(String),

    #[error("failed to write capture: {0}")]
    PcapWrite(String),
}

impl Error {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

pub fn parse_cfg(s: &str) -> Result<LbCfg, Error> {
    Ok(toml::from_str(s)?)
}

/// Read and parse the configuration file at `path`.
pub fn load_cfg(path: &Path) -> Result<LbCfg, Error> {
    let s = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_cfg(&s)
}

/// A logger writing to stderr, filtered by `RUST_LOG`.
pub fn stderr_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain);
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("component" => "l4lbadm"))
}

/// Send engine log messages to a `slog` logger.
#[derive(Clone, Debug)]
pub struct SlogProvider {
    log: Logger,
}

impl SlogProvider {
    pub fn new(log: Logger) -> Self {
        Self { log }
    }
}

impl LogProvider for SlogProvider {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Note => info!(self.log, "{msg}"),
            LogLevel::Warn => warn!(self.log, "{msg}"),
            LogLevel::Error => error!(self.log, "{msg}"),
        }
    }
}

/// An engine along with the dispatch chain that drives it.
pub struct Lb {
    engine: Arc<DecisionEngine>,
    chain: DispatchChain,
}

impl Lb {
    /// Build the engine and chain described by `cfg`. When
    /// `secondary_egress` is set, recirculated packets leave through
    /// it.
    pub fn new(cfg: &LbCfg, log: &Logger) -> Result<Self, Error> {
        let provider = SlogProvider::new(log.new(o!("unit" => "engine")));
        let engine =
            Arc::new(DecisionEngine::from_cfg(cfg)?.with_log(provider));

        let mut builder =
            ChainBuilder::new().stage(LbStage::new(Arc::clone(&engine)))?;
        if let Some(egress) = cfg.secondary_egress {
            builder = builder.stage(EgressStage { egress })?;
        }
        let chain = builder.build(engine.log());

        Ok(Self { engine, chain })
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn chain(&self) -> &DispatchChain {
        &self.chain
    }

    /// Run one frame through the chain, rewriting it in place.
    pub fn process(&self, frame: &mut [u8], ingress: IfIndex) -> Outcome {
        let mut ctx = StageCtx::new(ingress);
        let action = self.chain.run_with(&mut PacketView::new(frame), &mut ctx);

        // A reason only applies if the engine's decision is the one
        // which ended the walk.
        let reason = ctx
            .decision
            .filter(|d| d.action == action)
            .and_then(|d| d.reason);

        Outcome { action, reason }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Outcome {
    pub action: Action,
    pub reason: Option<Reason>,
}

/// What happened to one frame of a replayed capture.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct ReplayRecord {
    pub index: usize,
    pub len: usize,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Display for ReplayRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = self.outcome.reason.map_or("-", |r| r.as_str());
        write!(
            f,
            "{}\t{}\t{}\t{reason}",
            self.index, self.len, self.outcome.action
        )
    }
}

/// The result of replaying a capture.
#[derive(Debug, Default)]
pub struct Replay {
    pub records: Vec<ReplayRecord>,

    /// The rewritten frames which were redirected, in capture order.
    pub redirected: Vec<Vec<u8>>,
}

/// Run every frame in `frames` through `lb` as if it arrived on
/// `ingress`.
pub fn replay(lb: &Lb, frames: Vec<Vec<u8>>, ingress: IfIndex) -> Replay {
    let mut out = Replay::default();

    for (index, mut frame) in frames.into_iter().enumerate() {
        let outcome = lb.process(&mut frame, ingress);
        out.records.push(ReplayRecord { index, len: frame.len(), outcome });
        if let Action::Redirect(_) = outcome.action {
            out.redirected.push(frame);
        }
    }

    out
}

/// Read every frame out of a legacy pcap capture.
pub fn read_pcap(mut bytes: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let (rest, hdr) = pcap::parse_pcap_header(bytes)
        .map_err(|e| Error::Pcap(format!("bad header: {e:?}")))?;
    if hdr.network != Linktype::ETHERNET {
        return Err(Error::Pcap(format!(
            "unsupported link type {}",
            hdr.network.0
        )));
    }
    bytes = rest;

    let mut frames = vec![];
    while !bytes.is_empty() {
        let (rest, block) = pcap::parse_pcap_frame(bytes).map_err(|e| {
            Error::Pcap(format!("bad frame {}: {e:?}", frames.len()))
        })?;
        frames.push(block.data.to_vec());
        bytes = rest;
    }

    Ok(frames)
}

/// Write `frames` out as a legacy pcap capture of Ethernet frames.
pub fn write_pcap<W: Write>(mut out: W, frames: &[Vec<u8>]) -> Result<(), Error> {
    let werr = |e: std::io::Error| Error::PcapWrite(e.to_string());

    let mut hdr = PcapHeader {
        magic_number: 0xa1b2c3d4,
        version_major: 2,
        version_minor: 4,
        thiszone: 0,
        sigfigs: 0,
        snaplen: SNAPLEN,
        network: Linktype::ETHERNET,
    };
    let bytes = hdr.to_vec().map_err(|e| Error::PcapWrite(format!("{e:?}")))?;
    out.write_all(&bytes).map_err(werr)?;

    for frame in frames {
        let len = u32::try_from(frame.len())
            .map_err(|_| Error::PcapWrite("frame too large".into()))?;
        let mut block = LegacyPcapBlock {
            ts_sec: 0,
            ts_usec: 0,
            caplen: len,
            origlen: len,
            data: frame,
        };
        let bytes =
            block.to_vec().map_err(|e| Error::PcapWrite(format!("{e:?}")))?;
        out.write_all(&bytes).map_err(werr)?;
    }

    out.flush().map_err(werr)
}
