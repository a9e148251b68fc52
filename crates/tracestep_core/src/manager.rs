use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracestep_common::ThreadId;

use crate::callout::StepCallout;
use crate::config::StepperConfig;
use crate::engine::{Engine, StepSink, ThreadContexts};
use crate::error::StepError;
use crate::session::Session;
use crate::transform::SessionTransformer;
use crate::warmup::WarmupFilter;

/// Thread id → session map shared by the coordinator, the transformers and
/// the callouts.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ThreadId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn get(&self, tid: ThreadId) -> Option<Arc<Session>> {
        self.sessions.lock().get(&tid).cloned()
    }

    pub fn remove(&self, tid: ThreadId) -> Option<Arc<Session>> {
        self.sessions.lock().remove(&tid)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        let mut ids: Vec<_> = self.sessions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Entry point for controllers: starts, looks up and stops stepping
/// sessions.
pub struct StepCoordinator {
    engine: Arc<dyn Engine>,
    sink: Arc<dyn StepSink>,
    contexts: Arc<dyn ThreadContexts>,
    config: StepperConfig,
    registry: Arc<SessionRegistry>,
}

impl StepCoordinator {
    pub fn new(
        engine: Arc<dyn Engine>,
        sink: Arc<dyn StepSink>,
        contexts: Arc<dyn ThreadContexts>,
        config: StepperConfig,
    ) -> Self {
        Self {
            engine,
            sink,
            contexts,
            config,
            registry: Arc::new(SessionRegistry::default()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Put `tid` under stepping control, or return its existing session.
    ///
    /// The new session starts in [`crate::StepMode::Instruction`]; change it
    /// with [`Session::set_mode`] before resuming the thread.
    ///
    /// A session that was stopped stays registered until the engine's next
    /// transform pass for the thread. Until then this returns that session,
    /// already terminated and silent; wait for [`Self::session`] to return
    /// `None` before asking again.
    pub fn stalk(&self, tid: ThreadId) -> Result<Arc<Session>, StepError> {
        self.contexts.prevent_sleep(tid);

        let arch = self.engine.arch();
        if !arch.is_stepping_supported() {
            log::warn!("stepping is not supported on current arch: {}", arch);
            return Err(StepError::UnsupportedArch(arch));
        }

        let context = self.contexts.context(tid);

        let session = {
            let mut sessions = self.registry.sessions.lock();
            if let Some(existing) = sessions.get(&tid) {
                if existing.is_terminated() {
                    log::debug!("[{}] stalk: session is stopping, teardown pending", tid);
                }
                return Ok(existing.clone());
            }

            let Some(context) = context else {
                log::warn!("[{}] can't start stepping outside a valid native context", tid);
                return Err(StepError::NoActiveContext(tid));
            };

            let warmup = WarmupFilter::new(&self.config, arch);
            let session = Arc::new(Session::new(tid, context.pc, warmup));
            sessions.insert(tid, session.clone());
            session
        };

        log::debug!("[{}] stalk: attaching engine at {:#x}", tid, session.entry_address());

        let callout = StepCallout::new(
            tid,
            self.registry.clone(),
            self.engine.clone(),
            self.sink.clone(),
        )
        .into_callout();
        let transformer = SessionTransformer::new(
            session.clone(),
            self.registry.clone(),
            self.engine.clone(),
            callout,
        );
        self.engine.follow(tid, Box::new(transformer));

        Ok(session)
    }

    pub fn session(&self, tid: ThreadId) -> Option<Arc<Session>> {
        self.registry.get(tid)
    }

    /// Request termination of `tid`'s session. Returns `false` when the
    /// thread is not being stepped.
    pub fn stop(&self, tid: ThreadId) -> bool {
        match self.registry.get(tid) {
            Some(session) => {
                log::debug!("[{}] stop requested", tid);
                session.stop();
                true
            }
            None => false,
        }
    }

    pub fn active_threads(&self) -> Vec<ThreadId> {
        self.registry.thread_ids()
    }
}
