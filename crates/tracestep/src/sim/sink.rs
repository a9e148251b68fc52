use std::sync::Arc;

use parking_lot::Mutex;
use tracestep_core::{StepEvent, StepSink};

type Hook = Arc<dyn Fn(&StepEvent) + Send + Sync>;

/// Breakpoint subsystem stand-in that records every step.
///
/// A hook registered with [`RecordingSink::on_step`] runs while the thread
/// is "paused", which is where a controller would change the step mode or
/// stop the session.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StepEvent>>,
    hook: Mutex<Option<Hook>>,
}

impl RecordingSink {
    pub fn on_step<F>(&self, hook: F)
    where
        F: Fn(&StepEvent) + Send + Sync + 'static,
    {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Reported program counters, in order.
    pub fn pcs(&self) -> Vec<u64> {
        self.events.lock().iter().map(|event| event.pc).collect()
    }

    /// Live program counters from the captured contexts, in order.
    pub fn live_pcs(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .map(|event| event.context.pc)
            .collect()
    }
}

impl StepSink for RecordingSink {
    fn notify_step(&self, event: StepEvent) {
        log::debug!("[{}] sim: step at {:#x}", event.tid, event.pc);
        self.events.lock().push(event.clone());

        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&event);
        }
    }
}
