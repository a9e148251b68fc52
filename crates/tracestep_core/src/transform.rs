use std::sync::Arc;

use crate::engine::{BlockIterator, Callout, Engine, Transformer};
use crate::manager::SessionRegistry;
use crate::session::Session;
use crate::warmup::Gate;

/// Transform routine the engine runs for every block of a stepped thread.
pub(crate) struct SessionTransformer {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn Engine>,
    callout: Callout,
}

impl SessionTransformer {
    pub fn new(
        session: Arc<Session>,
        registry: Arc<SessionRegistry>,
        engine: Arc<dyn Engine>,
        callout: Callout,
    ) -> Self {
        Self {
            session,
            registry,
            engine,
            callout,
        }
    }

    fn detach(&self) {
        let tid = self.session.tid();
        log::debug!("[{}] step transform: unfollowing thread", tid);

        self.engine.flush();
        self.engine.unfollow(tid);
        self.engine.garbage_collect();

        self.registry.remove(tid);
    }
}

impl Transformer for SessionTransformer {
    fn transform(&mut self, iterator: &mut dyn BlockIterator) {
        let tid = self.session.tid();
        log::trace!("[{}] step transform: begin", tid);

        {
            let mut state = self.session.state.lock();
            state.block.reset();

            while let Some(insn) = iterator.next_instruction() {
                iterator.keep();
                state.block.observe(&insn);

                match state.warmup.observe(&insn) {
                    Gate::Hold => {}
                    Gate::Entry => {
                        log::debug!("[{}] step transform: entry instruction {}", tid, insn);
                        state.initial_context_address = self
                            .session
                            .entry_address()
                            .wrapping_add(insn.size as u64);
                    }
                    Gate::Callout => {
                        log::trace!("[{}] step transform: instrumenting {}", tid, insn);
                        iterator.put_callout(self.callout.clone());
                    }
                }
            }

            if state.warmup.finish_block() {
                log::debug!("[{}] step transform: first block closed, stepping armed", tid);
                iterator.put_callout(self.callout.clone());
            }
        }

        log::trace!("[{}] step transform: done", tid);

        if self.session.is_terminated() {
            self.detach();
        }
    }
}
