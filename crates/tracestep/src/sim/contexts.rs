use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracestep_common::{CpuContext, ThreadId};
use tracestep_core::ThreadContexts;

/// Native contexts of stopped threads, kept in memory.
#[derive(Debug, Default)]
pub struct MemoryContexts {
    contexts: Mutex<HashMap<ThreadId, CpuContext>>,
    awake: Mutex<HashSet<ThreadId>>,
}

impl MemoryContexts {
    pub fn insert(&self, tid: ThreadId, context: CpuContext) {
        self.contexts.lock().insert(tid, context);
    }

    pub fn remove(&self, tid: ThreadId) -> Option<CpuContext> {
        self.contexts.lock().remove(&tid)
    }

    pub fn is_sleep_prevented(&self, tid: ThreadId) -> bool {
        self.awake.lock().contains(&tid)
    }
}

impl ThreadContexts for MemoryContexts {
    fn context(&self, tid: ThreadId) -> Option<CpuContext> {
        self.contexts.lock().get(&tid).cloned()
    }

    fn prevent_sleep(&self, tid: ThreadId) {
        self.awake.lock().insert(tid);
    }
}
