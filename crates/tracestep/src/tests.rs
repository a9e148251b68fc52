use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracestep_common::{Arch, CpuContext, InsnGroups, ThreadId};
use tracestep_core::{StepCoordinator, StepError, StepMode, StepperConfig};

use super::*;
use crate::sim::isa::synth;
use crate::sim::trace::{dispatch_prologue, RELOCATION_BASE};
use crate::sim::{ThreadTrace, TraceBlock};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An instruction that receives a running callout once stepping is armed.
#[derive(Debug)]
struct Eligible {
    live: u64,
    size: u32,
    before_call: bool,
    before_jump: bool,
}

/// Callout-carrying instructions of `trace`, in execution order: the closing
/// callout of the entry block (if control falls out of it) and every
/// non-exit instruction after it.
fn eligible(trace: &ThreadTrace) -> Vec<Eligible> {
    let entry_index = trace
        .blocks
        .iter()
        .position(|block| block.run_at.is_some())
        .expect("trace has an entry block");

    let mut out = Vec::new();
    let entry = &trace.blocks[entry_index];
    if let Some(last) = entry.instructions.last().filter(|insn| !insn.ends_block()) {
        out.push(Eligible {
            live: entry.runtime_address(last),
            size: last.size,
            before_call: false,
            before_jump: false,
        });
    }

    for block in &trace.blocks[entry_index + 1..] {
        let exit = block
            .instructions
            .last()
            .filter(|insn| insn.is_transfer())
            .map(|insn| insn.groups);
        let last_plain = block
            .instructions
            .iter()
            .rev()
            .find(|insn| !insn.is_transfer())
            .map(|insn| insn.address);

        for insn in block.instructions.iter().filter(|insn| !insn.ends_block()) {
            let boundary = last_plain == Some(insn.address);
            out.push(Eligible {
                live: block.runtime_address(insn),
                size: insn.size,
                before_call: boundary && exit.is_some_and(|g| g.contains(InsnGroups::CALL)),
                before_jump: boundary && exit.is_some_and(|g| g.contains(InsnGroups::JUMP)),
            });
        }
    }
    out
}

fn demo_trace(arch: Arch, seed: u64) -> ThreadTrace {
    RandomTrace::builder()
        .arch(arch)
        .seed(seed)
        .config(StepperConfig::default())
        .build()
        .generate()
}

fn entry_of(trace: &ThreadTrace) -> &TraceBlock {
    trace
        .blocks
        .iter()
        .find(|block| block.run_at.is_some())
        .expect("trace has an entry block")
}

#[test]
fn single_step_hits_every_instruction_in_order() {
    init_logger();
    for arch in [Arch::X64, Arch::Arm64] {
        for seed in 0..16 {
            let trace = demo_trace(arch, seed);
            let expected = eligible(&trace);
            let report = run_demo(arch, DemoMode::Step, seed).unwrap();

            let live: Vec<_> = report.events.iter().map(|e| e.context.pc).collect();
            let want: Vec<_> = expected.iter().map(|e| e.live).collect();
            assert_eq!(live, want, "{} seed {}", arch, seed);
            assert_eq!(report.blocks_executed, trace.blocks.len());

            // Corrected addresses advance by instruction size until the
            // first jump out of the sequential stream; raw afterwards.
            let entry = entry_of(&trace);
            let mut expected_pc = entry.start() + entry.instructions[0].size as u64;
            let mut diverged = false;
            for (i, event) in report.events.iter().enumerate() {
                if i > 0 && !diverged {
                    let prev = &expected[i - 1];
                    let sequential =
                        event.context.pc >= prev.live && event.context.pc <= prev.live + prev.size as u64;
                    if sequential {
                        expected_pc += prev.size as u64;
                    } else {
                        diverged = true;
                    }
                }
                let want_pc = if diverged { event.context.pc } else { expected_pc };
                assert_eq!(event.pc, want_pc, "{} seed {} event {}", arch, seed, i);
            }
        }
    }
}

#[test]
fn step_over_call_stops_only_before_calls() {
    init_logger();
    for seed in 0..16 {
        let trace = demo_trace(Arch::X64, seed);
        let expected = eligible(&trace);
        let report = run_demo(Arch::X64, DemoMode::Call, seed).unwrap();

        let want: Vec<_> = expected
            .iter()
            .enumerate()
            .filter(|(i, e)| *i == 0 || e.before_call)
            .map(|(_, e)| e.live)
            .collect();
        let live: Vec<_> = report.events.iter().map(|e| e.context.pc).collect();
        assert_eq!(live, want, "seed {}", seed);
    }
}

#[test]
fn step_over_block_stops_only_before_jumps() {
    init_logger();
    for seed in 0..16 {
        let trace = demo_trace(Arch::Arm64, seed);
        let expected = eligible(&trace);
        let report = run_demo(Arch::Arm64, DemoMode::Block, seed).unwrap();

        let want: Vec<_> = expected
            .iter()
            .enumerate()
            .filter(|(i, e)| *i == 0 || e.before_jump)
            .map(|(_, e)| e.live)
            .collect();
        let live: Vec<_> = report.events.iter().map(|e| e.context.pc).collect();
        assert_eq!(live, want, "seed {}", seed);
    }
}

#[test]
fn counting_callback_sees_every_instruction_without_stops() {
    init_logger();
    let trace = demo_trace(Arch::X64, 11);
    let report = run_demo(Arch::X64, DemoMode::Count, 11).unwrap();
    assert!(report.events.is_empty());
    assert_eq!(report.counted, eligible(&trace).len());
}

#[test]
fn unsupported_arch_fails_demo() {
    init_logger();
    for arch in [Arch::Ia32, Arch::Arm, Arch::Unknown] {
        let err = run_demo(arch, DemoMode::Step, 0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<StepError>(),
            Some(&StepError::UnsupportedArch(arch))
        );
    }
}

#[test]
fn demo_modes_parse() {
    assert_eq!("step".parse::<DemoMode>().unwrap(), DemoMode::Step);
    assert_eq!("c".parse::<DemoMode>().unwrap(), DemoMode::Call);
    assert_eq!("block".parse::<DemoMode>().unwrap(), DemoMode::Block);
    assert_eq!("count".parse::<DemoMode>().unwrap(), DemoMode::Count);
    assert!("over".parse::<DemoMode>().is_err());
}

struct Rig {
    engine: Arc<SimEngine>,
    sink: Arc<RecordingSink>,
    contexts: Arc<MemoryContexts>,
    coordinator: StepCoordinator,
}

fn rig(arch: Arch) -> Rig {
    init_logger();
    let engine = Arc::new(SimEngine::new(arch));
    let sink = Arc::new(RecordingSink::default());
    let contexts = Arc::new(MemoryContexts::default());
    let coordinator = StepCoordinator::new(
        engine.clone(),
        sink.clone(),
        contexts.clone(),
        StepperConfig::default(),
    );
    Rig {
        engine,
        sink,
        contexts,
        coordinator,
    }
}

#[test]
fn refused_request_still_keeps_thread_awake() {
    let rig = rig(Arch::X64);
    let err = rig.coordinator.stalk(9).unwrap_err();
    assert_eq!(err, StepError::NoActiveContext(9));
    assert!(rig.contexts.is_sleep_prevented(9));
    assert_eq!(rig.engine.stats().follows, 0);
}

#[test]
fn thread_without_context_is_refused() {
    let rig = rig(Arch::Arm64);
    rig.contexts.insert(4, CpuContext::with_pc(0x1000));
    assert!(rig.contexts.remove(4).is_some());

    assert_eq!(
        rig.coordinator.stalk(4).unwrap_err(),
        StepError::NoActiveContext(4)
    );
    assert!(rig.coordinator.registry().is_empty());
    assert!(!rig.engine.is_following(4));
}

#[test]
fn stop_from_callback_detaches_after_two_invocations() {
    const TID: ThreadId = 5;
    let rig = rig(Arch::X64);
    rig.contexts.insert(TID, CpuContext::with_pc(0x1000));
    let session = rig.coordinator.stalk(TID).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        session.set_mode(StepMode::custom(move |frame| {
            if calls.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                frame.stop();
            }
        }));
    }

    let mut trace = ThreadTrace::default();
    trace
        .extend(dispatch_prologue(Arch::X64, &StepperConfig::default()))
        .push(TraceBlock::relocated(
            vec![synth(0x1000, 3, "mov"), synth(0x1003, 4, "add")],
            RELOCATION_BASE,
        ))
        .push(TraceBlock::new(vec![
            synth(0x1007, 4, "mov"),
            synth(0x100b, 4, "add"),
            synth(0x100f, 4, "sub"),
        ]))
        .push(TraceBlock::new(vec![synth(0x1013, 2, "push")]));

    let executed = rig.engine.run(TID, &trace);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(executed, trace.blocks.len() - 1);
    assert!(rig.sink.is_empty());
    assert!(rig.coordinator.active_threads().is_empty());
    assert!(!rig.engine.is_following(TID));

    let stats = rig.engine.stats();
    assert_eq!(stats.unfollows, 1);
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.collections, 1);
    // The detaching pass is transformed but never executed.
    assert_eq!(stats.blocks_executed, executed);
    assert_eq!(stats.blocks_transformed, executed + 1);
    // Entry block closer plus the three instructions of the next block.
    assert_eq!(stats.callouts_run, 4);
}

#[test]
fn relocated_entry_block_reports_original_address() {
    const TID: ThreadId = 3;
    let rig = rig(Arch::X64);
    rig.contexts.insert(TID, CpuContext::with_pc(0x1000));
    let session = rig.coordinator.stalk(TID).unwrap();

    let mut trace = ThreadTrace::default();
    trace
        .extend(dispatch_prologue(Arch::X64, &StepperConfig::default()))
        .push(TraceBlock::relocated(
            vec![synth(0x1000, 3, "mov"), synth(0x1003, 4, "add")],
            RELOCATION_BASE,
        ))
        .push(TraceBlock::new(vec![synth(0x1007, 4, "mov"), synth(0x100b, 1, "push")]));
    rig.engine.run(TID, &trace);

    assert_eq!(rig.sink.pcs(), vec![0x1003, 0x1007, 0x100b]);
    assert_eq!(
        rig.sink.live_pcs(),
        vec![RELOCATION_BASE + 3, 0x1007, 0x100b]
    );
    assert!(session.has_left_sequential_flow());
    assert_eq!(session.live_context().map(|c| c.pc), Some(0x100b));
}

#[test]
fn threads_step_independently() {
    let rig = rig(Arch::X64);
    let traces: Vec<(ThreadId, ThreadTrace)> = (1..=3)
        .map(|tid| {
            let mut trace = RandomTrace::builder()
                .arch(Arch::X64)
                .seed(100 + tid)
                .entry(tid * 0x100_0000)
                .build()
                .generate();
            // Each thread gets its own relocated copy.
            for block in trace.blocks.iter_mut().filter(|b| b.run_at.is_some()) {
                block.run_at = Some(RELOCATION_BASE + tid * 0x1000);
            }
            rig.contexts
                .insert(tid, CpuContext::with_pc(entry_of(&trace).start()));
            (tid, trace)
        })
        .collect();

    for (tid, _) in &traces {
        rig.coordinator.stalk(*tid).unwrap();
    }
    assert_eq!(rig.coordinator.active_threads(), vec![1, 2, 3]);

    std::thread::scope(|scope| {
        for (tid, trace) in &traces {
            let engine = &rig.engine;
            scope.spawn(move || engine.run(*tid, trace));
        }
    });

    let events = rig.sink.events();
    for (tid, trace) in &traces {
        let live: Vec<_> = events
            .iter()
            .filter(|event| event.tid == *tid)
            .map(|event| event.context.pc)
            .collect();
        let want: Vec<_> = eligible(trace).iter().map(|e| e.live).collect();
        assert_eq!(live, want, "thread {}", tid);
    }
}
