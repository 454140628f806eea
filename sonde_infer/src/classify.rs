use serde::Serialize;
use sonde_types::{Config, FuncId};

use crate::table::{FunctionRecord, FunctionTable};

/// Final call-convention guess for one function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    #[serde(skip)]
    pub fid: FuncId,
    pub address: u64,
    pub name: String,
    pub calls: u64,
    pub returns: u64,
    // highest qualifying slot index per bank
    pub int_slot: Option<usize>,
    pub float_slot: Option<usize>,
    // sum of the highest qualifying indices. undercounts by one per bank that qualifies, which
    // is what downstream tooling has always consumed
    pub arity: usize,
    pub counted_arity: usize,
    pub returns_value: bool,
    // int slots only ever read through a view narrower than 64 bits
    pub narrow_slots: Vec<usize>,
}

impl Verdict {
    /// Whether int slot `slot` falls within the inferred parameters, i.e. whether a value
    /// capture pass should bother recording it.
    pub fn records_slot(&self, slot: usize) -> bool {
        self.int_slot.map_or(false, |highest| slot <= highest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    pub min_calls: u64,
    pub slot_threshold: f64,
    pub return_threshold: f64,
}

impl Classifier {
    pub fn new(config: &Config) -> Self {
        Self {
            min_calls: config.min_calls,
            slot_threshold: config.slot_threshold,
            return_threshold: config.return_threshold,
        }
    }

    pub fn classify(&self, table: &FunctionTable) -> Vec<Verdict> {
        table
            .iter()
            .filter_map(|(fid, record)| self.classify_one(fid, record))
            .collect()
    }

    pub fn classify_one(&self, fid: FuncId, record: &FunctionRecord) -> Option<Verdict> {
        if record.calls == 0 || record.calls < self.min_calls {
            return None;
        }

        let int_slot = highest_qualifying(&record.int_hits, record.calls, self.slot_threshold);
        let float_slot = highest_qualifying(&record.float_hits, record.calls, self.slot_threshold);
        let returns_value = record.returns as f64 > record.calls as f64 * self.return_threshold;

        let narrow_slots = record
            .max_width
            .iter()
            .enumerate()
            .filter(|(_, &width)| width > 0 && width < 64)
            .map(|(slot, _)| slot)
            .collect();

        Some(Verdict {
            fid,
            address: record.address,
            name: record.name.clone(),
            calls: record.calls,
            returns: record.returns,
            int_slot,
            float_slot,
            arity: int_slot.unwrap_or(0) + float_slot.unwrap_or(0),
            counted_arity: int_slot.map_or(0, |i| i + 1) + float_slot.map_or(0, |i| i + 1),
            returns_value,
            narrow_slots,
        })
    }
}

// scanning from the top, the first slot read in at least `threshold` of the calls
fn highest_qualifying(hits: &[u64], calls: u64, threshold: f64) -> Option<usize> {
    let floor = calls as f64 * threshold;
    hits.iter().rposition(|&count| count as f64 >= floor)
}
