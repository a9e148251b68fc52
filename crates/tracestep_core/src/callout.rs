use std::sync::Arc;

use tracestep_common::{CpuContext, ThreadId};

use crate::engine::{Callout, Engine, StepEvent, StepSink, StopReason};
use crate::manager::SessionRegistry;
use crate::session::{StepFrame, StepMode};

/// Run-time half of a session: decides at every injected callout whether
/// the thread stops here.
pub(crate) struct StepCallout {
    tid: ThreadId,
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn Engine>,
    sink: Arc<dyn StepSink>,
}

impl StepCallout {
    pub fn new(
        tid: ThreadId,
        registry: Arc<SessionRegistry>,
        engine: Arc<dyn Engine>,
        sink: Arc<dyn StepSink>,
    ) -> Self {
        Self {
            tid,
            registry,
            engine,
            sink,
        }
    }

    pub fn into_callout(self) -> Callout {
        let this = Arc::new(self);
        Arc::new(move |context: &CpuContext| this.fire(context))
    }

    pub fn fire(&self, context: &CpuContext) {
        // A miss is the normal state right after teardown: the engine may
        // still run code instrumented for a session that is gone.
        let Some(session) = self.registry.get(self.tid) else {
            return;
        };
        if session.is_terminated() {
            return;
        }

        let Some(insn) = self.engine.parse_instruction(context.pc) else {
            log::warn!(
                "[{}] step callout: can't decode instruction at {:#x}",
                self.tid,
                context.pc
            );
            return;
        };

        log::trace!("[{}] step callout: running at {}", self.tid, insn);

        let pc = session.state.lock().resolve_pc(context.pc);

        let should_break = match session.mode() {
            StepMode::Instruction => true,
            StepMode::Custom(callback) => {
                let frame = StepFrame::new(context, &insn, session.terminated_flag());
                callback.invoke(&frame);
                false
            }
            mode @ (StepMode::Call | StepMode::Block) => mode
                .boundary()
                .is_some_and(|kind| session.state.lock().at_boundary(context.pc, kind)),
        };

        if should_break {
            session.state.lock().record_stop(context, insn.size);
            log::debug!("[{}] step callout: stopping at {:#x}", self.tid, pc);

            self.sink.notify_step(StepEvent {
                tid: self.tid,
                reason: StopReason::Step,
                pc,
                context: context.clone(),
            });

            log::trace!("[{}] step callout: resumed", self.tid);
        }

        session.state.lock().advance(insn.size);
    }
}
