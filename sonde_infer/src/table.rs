use std::collections::HashMap;

use index_vec::IndexVec;
use sonde_types::{FuncId, Slot, FLOAT_SLOTS, INT_SLOTS};
use tracing::debug;

use crate::error::InferError;

// first chunk reserved up front so a broken environment fails at startup, not mid-run
const INITIAL_FUNCTIONS: usize = 1024;

/// Everything accumulated about one function over the run.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecord {
    pub address: u64,
    pub name: String,
    pub calls: u64,
    pub int_hits: [u64; INT_SLOTS],
    pub float_hits: [u64; FLOAT_SLOTS],
    // widest read seen per int slot, in bits
    pub max_width: [u32; INT_SLOTS],
    pub returns: u64,
}

impl FunctionRecord {
    pub fn new(address: u64, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            calls: 0,
            int_hits: [0; INT_SLOTS],
            float_hits: [0; FLOAT_SLOTS],
            max_width: [0; INT_SLOTS],
            returns: 0,
        }
    }
}

/// Per-function counters, keyed by a dense `FuncId` with an address index on the side.
///
/// Index 0 is the unknown sentinel: indirect calls we can't resolve and anything registered
/// after the table is full land there and never accumulate anything.
#[derive(Debug)]
pub struct FunctionTable {
    funcs: IndexVec<FuncId, FunctionRecord>,
    by_addr: HashMap<u64, FuncId>,
    max_functions: usize,
    saturated: bool,
}

impl FunctionTable {
    pub fn new(max_functions: usize) -> Result<Self, InferError> {
        let initial = max_functions.min(INITIAL_FUNCTIONS) + 1;
        let mut funcs = Vec::new();
        funcs
            .try_reserve(initial)
            .map_err(|_| InferError::Alloc { what: "function table", count: initial })?;
        let mut by_addr = HashMap::new();
        by_addr
            .try_reserve(initial)
            .map_err(|_| InferError::Alloc { what: "function index", count: initial })?;

        funcs.push(FunctionRecord::new(0, ""));
        Ok(Self {
            funcs: IndexVec::from_vec(funcs),
            by_addr,
            max_functions,
            saturated: false,
        })
    }

    /// Number of tracked functions, sentinel excluded.
    pub fn len(&self) -> usize {
        self.funcs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Registers a function by entry address, or returns the id it already has. A known
    /// function with no name yet picks up `name`.
    pub fn register(&mut self, address: u64, name: &str) -> FuncId {
        if let Some(&fid) = self.by_addr.get(&address) {
            let record = &mut self.funcs[fid];
            if record.name.is_empty() && !name.is_empty() {
                record.name = name.to_owned();
            }
            return fid;
        }

        if self.len() >= self.max_functions {
            if !self.saturated {
                debug!(
                    limit = self.max_functions,
                    address, "function table full, further functions are untracked"
                );
                self.saturated = true;
            }
            return FuncId::unknown();
        }

        let fid = self.funcs.push(FunctionRecord::new(address, name));
        self.by_addr.insert(address, fid);
        fid
    }

    pub fn lookup(&self, address: u64) -> Option<FuncId> {
        self.by_addr.get(&address).copied()
    }

    /// Id for a call target, registering it without a name if it's new.
    pub fn resolve(&mut self, address: u64) -> FuncId {
        match self.lookup(address) {
            Some(fid) => fid,
            None => self.register(address, ""),
        }
    }

    pub fn get(&self, fid: FuncId) -> Option<&FunctionRecord> {
        self.funcs.get(fid)
    }

    pub fn calls(&self, fid: FuncId) -> u64 {
        self.get(fid).map_or(0, |record| record.calls)
    }

    fn tracked_mut(&mut self, fid: FuncId) -> Option<&mut FunctionRecord> {
        if fid.is_unknown() {
            return None;
        }
        self.funcs.get_mut(fid)
    }

    pub fn record_call(&mut self, fid: FuncId) {
        if let Some(record) = self.tracked_mut(fid) {
            record.calls += 1;
        }
    }

    pub fn credit_slot(&mut self, fid: FuncId, slot: Slot, width: u32) {
        let record = match self.tracked_mut(fid) {
            Some(record) => record,
            None => return,
        };
        // slots past the counter banks are dropped
        match slot {
            Slot::Int(i) => {
                if let (Some(hits), Some(max)) =
                    (record.int_hits.get_mut(i), record.max_width.get_mut(i))
                {
                    *hits += 1;
                    *max = (*max).max(width);
                }
            },
            Slot::Float(i) => {
                if let Some(hits) = record.float_hits.get_mut(i) {
                    *hits += 1;
                }
            },
        }
    }

    pub fn credit_return(&mut self, fid: FuncId) {
        if let Some(record) = self.tracked_mut(fid) {
            record.returns += 1;
        }
    }

    /// Tracked functions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (FuncId, &FunctionRecord)> + '_ {
        self.funcs
            .iter_enumerated()
            .filter(|(fid, _)| !fid.is_unknown())
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, fid: FuncId) -> &mut FunctionRecord {
        &mut self.funcs[fid]
    }
}
