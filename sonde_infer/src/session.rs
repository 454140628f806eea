use std::collections::hash_map::{Entry, HashMap};
use std::sync::{Mutex, PoisonError};

use sonde_types::{Access, Config, FuncId, Reg, ThreadId};

use crate::classify::{Classifier, Verdict};
use crate::error::InferError;
use crate::infer::Tracker;
use crate::table::FunctionTable;

/// One analysis run: a tracker per target thread, all feeding one function table. Events for
/// a given thread must arrive in execution order.
#[derive(Debug)]
pub struct Session {
    config: Config,
    table: FunctionTable,
    threads: HashMap<ThreadId, Tracker>,
}

impl Session {
    pub fn new(config: Config) -> Result<Self, InferError> {
        config.validate()?;
        let table = FunctionTable::new(config.max_functions)?;
        Ok(Self {
            config,
            table,
            threads: HashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table(&self) -> &FunctionTable {
        &self.table
    }

    pub fn thread(&self, thread: ThreadId) -> Option<&Tracker> {
        self.threads.get(&thread)
    }

    /// Routine discovered by the symbol resolver, before or during the run.
    pub fn register_routine(&mut self, address: u64, name: &str) -> FuncId {
        self.table.register(address, name)
    }

    /// `target` is `None` for indirect transfers the host couldn't resolve.
    pub fn on_call(
        &mut self, thread: ThreadId, target: Option<u64>, is_jump: bool,
    ) -> Result<(), InferError> {
        let callee = match target {
            // branches into the middle of a function aren't calls, don't grow the table
            Some(address) if is_jump => self.table.lookup(address).unwrap_or_else(FuncId::unknown),
            Some(address) => self.table.resolve(address),
            None => FuncId::unknown(),
        };

        let tracker = match self.threads.entry(thread) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(Tracker::new(&self.config)?),
        };
        tracker.on_call(&mut self.table, callee, is_jump);
        Ok(())
    }

    pub fn on_return(&mut self, thread: ThreadId) {
        // a thread we never saw call anything has nothing to unwind
        if let Some(tracker) = self.threads.get_mut(&thread) {
            tracker.on_return(&mut self.table);
        }
    }

    pub fn on_access(&mut self, thread: ThreadId, reg: Reg, access: Access) {
        if let Some(tracker) = self.threads.get_mut(&thread) {
            tracker.on_access(&mut self.table, reg, access);
        }
    }

    pub fn classify(&self) -> Vec<Verdict> {
        Classifier::new(&self.config).classify(&self.table)
    }
}

/// Function table for hosts that deliver events from several OS threads at once. Each thread
/// keeps its own `Tracker` and takes the lock once per event.
#[derive(Debug)]
pub struct SharedTable {
    inner: Mutex<FunctionTable>,
}

impl SharedTable {
    pub fn new(table: FunctionTable) -> Self {
        Self {
            inner: Mutex::new(table),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FunctionTable) -> R) -> R {
        // counters stay consistent even if another thread panicked mid-event
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut table)
    }

    pub fn into_inner(self) -> FunctionTable {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
