// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The dispatch chain.
//!
//! A chain is a short, fixed sequence of [`Stage`]s which every packet
//! walks in order. A stage either ends the walk with an [`Action`] or
//! lets the packet continue to the next stage. Recirculation is
//! modelled this way: the load-balancing stage continues a packet it
//! wants recirculated, and a later stage picks it up.

use super::decision::Decision;
use super::decision::DecisionEngine;
use super::packet::PacketView;
use crate::api::Action;
use crate::api::IfIndex;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Display;
use dyn_clone::DynClone;
use itertools::Itertools;

/// The most stages a chain may hold.
pub const MAX_STAGES: usize = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Continue,
    Done(Action),
}

/// State carried from one stage to the next during a single walk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StageCtx {
    pub ingress: IfIndex,

    /// The last decision made by a load-balancing stage, if any.
    pub decision: Option<Decision>,

    /// Set once a stage has asked for the packet to be recirculated.
    pub recirculated: bool,
}

impl StageCtx {
    pub fn new(ingress: IfIndex) -> Self {
        Self { ingress, decision: None, recirculated: false }
    }
}

pub trait Stage: DynClone + Send + Sync {
    /// A short name, used when describing the chain.
    fn name(&self) -> &'static str;

    fn process(&self, view: &mut PacketView<'_>, ctx: &mut StageCtx) -> Verdict;
}

dyn_clone::clone_trait_object!(Stage);

type Stages = heapless::Vec<Box<dyn Stage>, MAX_STAGES>;

/// The chain already holds [`MAX_STAGES`] stages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainFull {
    pub rejected: &'static str,
}

impl Display for ChainFull {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "cannot add stage {}: chain is limited to {MAX_STAGES} stages",
            self.rejected
        )
    }
}

impl core::error::Error for ChainFull {}

#[derive(Clone, Default)]
pub struct ChainBuilder {
    stages: Stages,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `stage` to the end of the chain.
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Result<Self, ChainFull> {
        let rejected = stage.name();
        self.stages
            .push(Box::new(stage))
            .map_err(|_| ChainFull { rejected })?;
        Ok(self)
    }

    pub fn build(self, log: &dyn LogProvider) -> DispatchChain {
        let chain = DispatchChain { stages: self.stages };
        log.log(LogLevel::Note, &format!("dispatch chain: {chain}"));
        chain
    }
}

#[derive(Clone)]
pub struct DispatchChain {
    stages: Stages,
}

impl DispatchChain {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.name())
    }

    /// Walk the chain for the packet in `view`, which arrived on
    /// `ingress`. A packet which makes it past the last stage passes.
    pub fn run(&self, view: &mut PacketView<'_>, ingress: IfIndex) -> Action {
        let mut ctx = StageCtx::new(ingress);
        self.run_with(view, &mut ctx)
    }

    /// Walk the chain with a caller-supplied context, which is left
    /// holding whatever the stages recorded.
    pub fn run_with(
        &self,
        view: &mut PacketView<'_>,
        ctx: &mut StageCtx,
    ) -> Action {
        for stage in self.stages.iter() {
            if let Verdict::Done(action) = stage.process(view, ctx) {
                return action;
            }
        }

        Action::Pass
    }
}

impl Display for DispatchChain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        write!(f, "{}", self.names().join(" -> "))
    }
}

impl Debug for DispatchChain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Load balancing by way of a [`DecisionEngine`].
///
/// A recirculation decision continues the walk; every other decision
/// ends it.
#[derive(Clone)]
pub struct LbStage {
    engine: Arc<DecisionEngine>,
}

impl LbStage {
    pub fn new(engine: Arc<DecisionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }
}

impl Stage for LbStage {
    fn name(&self) -> &'static str {
        "lb"
    }

    fn process(&self, view: &mut PacketView<'_>, ctx: &mut StageCtx) -> Verdict {
        let decision = self.engine.decide(view, ctx.ingress);
        ctx.decision = Some(decision);

        match decision.action {
            Action::Recirculate => {
                ctx.recirculated = true;
                Verdict::Continue
            }

            action => Verdict::Done(action),
        }
    }
}

/// Send a recirculated packet out `egress`. Any other packet goes on
/// to the next stage.
#[derive(Clone, Copy, Debug)]
pub struct EgressStage {
    pub egress: IfIndex,
}

impl Stage for EgressStage {
    fn name(&self) -> &'static str {
        "egress"
    }

    fn process(&self, _view: &mut PacketView<'_>, ctx: &mut StageCtx) -> Verdict {
        if ctx.recirculated {
            Verdict::Done(Action::Redirect(self.egress))
        } else {
            Verdict::Continue
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Backend;
    use crate::api::BackendId;
    use crate::api::EngineCfg;
    use crate::api::Protocol;
    use crate::api::Reach;
    use crate::api::Reason;
    use crate::api::Scope;
    use crate::api::ServiceKey;
    use crate::api::ServiceRecord;
    use crate::engine::service::ServiceTable;
    use crate::provider::NullLog;
    use crate::provider::PrintlnLog;
    use core::sync::atomic::AtomicUsize;
    use core::sync::atomic::Ordering;
    use l4lb_test_utils::verify::summarize;
    use l4lb_test_utils::*;

    #[derive(Clone)]
    struct Probe {
        name: &'static str,
        verdict: Verdict,
        hits: Arc<AtomicUsize>,
    }

    impl Probe {
        fn new(name: &'static str, verdict: Verdict) -> Self {
            Self { name, verdict, hits: Arc::new(AtomicUsize::new(0)) }
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl Stage for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process(&self, _: &mut PacketView<'_>, _: &mut StageCtx) -> Verdict {
            self.hits.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    fn run(chain: &DispatchChain) -> Action {
        let mut pkt = tcp4("172.16.0.9", 33000, "10.0.0.5", 80);
        chain.run(&mut PacketView::new(&mut pkt), IfIndex(1))
    }

    #[test]
    fn done_ends_the_walk() {
        let s0 = Probe::new("s0", Verdict::Continue);
        let s1 = Probe::new("s1", Verdict::Done(Action::Drop));
        let s2 = Probe::new("s2", Verdict::Done(Action::Pass));
        let chain = ChainBuilder::new()
            .stage(s0.clone())
            .unwrap()
            .stage(s1.clone())
            .unwrap()
            .stage(s2.clone())
            .unwrap()
            .build(&PrintlnLog);

        assert_eq!(run(&chain), Action::Drop);
        assert_eq!((s0.hits(), s1.hits(), s2.hits()), (1, 1, 0));
    }

    #[test]
    fn exhausted_chain_passes() {
        let s0 = Probe::new("s0", Verdict::Continue);
        let chain = ChainBuilder::new().stage(s0.clone()).unwrap().build(&NullLog);
        assert_eq!(run(&chain), Action::Pass);
        assert_eq!(s0.hits(), 1);

        let empty = ChainBuilder::new().build(&NullLog);
        assert!(empty.is_empty());
        assert_eq!(run(&empty), Action::Pass);
    }

    #[test]
    fn capacity() {
        let mut b = ChainBuilder::new();
        for _ in 0..MAX_STAGES {
            b = b.stage(Probe::new("p", Verdict::Continue)).unwrap();
        }
        let err = b.stage(EgressStage { egress: IfIndex(9) }).err().unwrap();
        assert_eq!(err, ChainFull { rejected: "egress" });
    }

    fn recirc_engine() -> Arc<DecisionEngine> {
        let mut t = ServiceTable::new();
        t.upsert_backend(BackendId(1), Backend {
            address: "192.168.1.10".parse().unwrap(),
            port: 0,
            egress: IfIndex(2),
            mac: None,
            reach: Reach::Recirculate,
        });
        let key = ServiceKey::new(
            "10.0.0.5".parse().unwrap(),
            80,
            Protocol::TCP,
            Scope::External,
        );
        t.upsert_service(key, ServiceRecord::default(), &[BackendId(1)])
            .unwrap();
        Arc::new(DecisionEngine::new(EngineCfg::default(), t))
    }

    #[test]
    fn recirculate_to_egress() {
        let engine = recirc_engine();
        let chain = ChainBuilder::new()
            .stage(LbStage::new(Arc::clone(&engine)))
            .unwrap()
            .stage(EgressStage { egress: IfIndex(9) })
            .unwrap()
            .build(&NullLog);
        assert_eq!(chain.to_string(), "lb -> egress");

        let mut pkt = tcp4("172.16.0.9", 33000, "10.0.0.5", 80);
        let mut ctx = StageCtx::new(IfIndex(1));
        let action = chain.run_with(&mut PacketView::new(&mut pkt), &mut ctx);
        assert_eq!(action, Action::Redirect(IfIndex(9)));
        assert!(ctx.recirculated);
        assert_eq!(ctx.decision, Some(Decision::new(Action::Recirculate, None)));
        assert_eq!(
            summarize(&pkt).unwrap().dst,
            "192.168.1.10".parse().unwrap()
        );

        // Without a stage to pick it up, the packet falls off the end.
        let lb_only = ChainBuilder::new()
            .stage(LbStage::new(engine))
            .unwrap()
            .build(&NullLog);
        assert_eq!(run(&lb_only), Action::Pass);
    }

    #[test]
    fn egress_ignores_direct_traffic() {
        let chain = ChainBuilder::new()
            .stage(LbStage::new(recirc_engine()))
            .unwrap()
            .stage(EgressStage { egress: IfIndex(9) })
            .unwrap()
            .build(&NullLog);

        let mut pkt = tcp4("172.16.0.9", 33000, "10.0.0.5", 22);
        let mut ctx = StageCtx::new(IfIndex(1));
        let action = chain.run_with(&mut PacketView::new(&mut pkt), &mut ctx);
        assert_eq!(action, Action::Pass);
        assert_eq!(
            ctx.decision.and_then(|d| d.reason),
            Some(Reason::NoService)
        );
        assert!(!ctx.recirculated);
    }
}
