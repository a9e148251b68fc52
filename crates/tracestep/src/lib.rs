use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use tracestep_common::{Arch, CpuContext, ThreadId};
use tracestep_core::{StepCoordinator, StepEvent, StepMode, StepperConfig};

pub mod sim;

use sim::{MemoryContexts, RandomTrace, RecordingSink, SimEngine};

/// Thread id the demo steps.
pub const DEMO_TID: ThreadId = 1;

/// What the demo controller asks for once the thread first stops.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DemoMode {
    /// Stop at every instruction.
    Step,
    /// Step over calls.
    Call,
    /// Step over blocks.
    Block,
    /// Count instructions with a custom callback, no stops.
    Count,
}

impl FromStr for DemoMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "step" | "s" => Ok(DemoMode::Step),
            "call" | "c" => Ok(DemoMode::Call),
            "block" | "b" => Ok(DemoMode::Block),
            "count" => Ok(DemoMode::Count),
            other => bail!("Unknown mode '{}'. Supported: step, call, block, count", other),
        }
    }
}

/// Outcome of a demo run.
#[derive(Clone, Debug, Default)]
pub struct DemoReport {
    pub events: Vec<StepEvent>,
    pub counted: usize,
    pub blocks_executed: usize,
}

pub fn run_demo(arch: Arch, mode: DemoMode, seed: u64) -> Result<DemoReport> {
    let config = StepperConfig::default();
    let engine = Arc::new(SimEngine::new(arch));
    let sink = Arc::new(RecordingSink::default());
    let contexts = Arc::new(MemoryContexts::default());

    let trace = RandomTrace::builder()
        .arch(arch)
        .seed(seed)
        .config(config.clone())
        .build()
        .generate();
    let entry = trace
        .blocks
        .iter()
        .find(|block| block.run_at.is_some())
        .map(|block| block.start())
        .unwrap_or_default();
    contexts.insert(DEMO_TID, CpuContext::with_pc(entry));

    let coordinator = StepCoordinator::new(engine.clone(), sink.clone(), contexts, config);
    let session = coordinator.stalk(DEMO_TID)?;

    let counted = Arc::new(AtomicUsize::new(0));
    match mode {
        DemoMode::Step => {}
        DemoMode::Call | DemoMode::Block => {
            let next = if mode == DemoMode::Call {
                StepMode::Call
            } else {
                StepMode::Block
            };
            // Stop once normally, then resume with the boundary mode the way
            // a controller would.
            let session = session.clone();
            sink.on_step(move |_| session.set_mode(next.clone()));
        }
        DemoMode::Count => {
            let counted = counted.clone();
            session.set_mode(StepMode::custom(move |frame| {
                log::trace!("count: {}", frame.instruction);
                counted.fetch_add(1, Ordering::Relaxed);
            }));
        }
    }

    let blocks_executed = engine.run(DEMO_TID, &trace);
    for event in sink.events() {
        log::info!(
            "[{}] step at {:#x} (live pc {:#x})",
            event.tid,
            event.pc,
            event.context.pc
        );
    }

    let report = DemoReport {
        events: sink.events(),
        counted: counted.load(Ordering::Relaxed),
        blocks_executed,
    };
    log::info!(
        "{} blocks executed, {} stops, {} instructions counted",
        report.blocks_executed,
        report.events.len(),
        report.counted
    );

    coordinator.stop(DEMO_TID);
    Ok(report)
}

#[cfg(test)]
mod tests;
