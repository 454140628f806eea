use sonde_types::{Access, Config, FuncId, Height, Reg};
use tracing::trace;

use crate::error::InferError;
use crate::shadow::RegisterFile;
use crate::stack::{Entry, Frame, ShadowStack};
use crate::table::FunctionTable;

/// Attribution state for one thread of the target: its shadow stack and what's pending in
/// each watched register. Counters go to a `FunctionTable` passed in per event, so several
/// trackers can feed one table.
#[derive(Debug)]
pub struct Tracker {
    stack: ShadowStack,
    regs: RegisterFile,
    // no return has happened since the last call or write to the int return register
    ret_fresh: bool,
    // lowest frame already credited at return time for the pending int return value
    returned_through: Option<Height>,
    warmup_calls: u64,
}

impl Tracker {
    pub fn new(config: &Config) -> Result<Self, InferError> {
        Ok(Self {
            stack: ShadowStack::with_capacity(config.max_depth)?,
            regs: RegisterFile::new(),
            ret_fresh: false,
            returned_through: None,
            warmup_calls: config.warmup_calls,
        })
    }

    pub fn stack(&self) -> &ShadowStack {
        &self.stack
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn on_call(&mut self, table: &mut FunctionTable, callee: FuncId, is_jump: bool) {
        // a jump to something that isn't a known function is just a branch
        if is_jump && callee.is_unknown() {
            return;
        }

        self.ret_fresh = true;
        if let Some(evicted) = self.stack.push(callee, is_jump) {
            trace!(
                height = evicted.height,
                fid = evicted.fid.index(),
                "shadow stack full, forgetting frame"
            );
        }
        // whatever an earlier frame at this depth left in the return registers is dead now
        self.regs.expire_returns_from(self.stack.height());
        table.record_call(callee);
    }

    pub fn on_return(&mut self, table: &mut FunctionTable) {
        if self.stack.is_empty() {
            trace!("return with an empty shadow stack");
            return;
        }

        // frames entered by jumping unwind with the return that ends them, forgotten or not
        while let Some(entry) = self.stack.pop() {
            let is_jump = match entry {
                Entry::Live(frame) => {
                    self.credit_return(table, frame);
                    frame.is_jump
                },
                Entry::Forgotten { is_jump } => is_jump,
            };
            if !is_jump {
                break;
            }
        }

        self.regs.retire_after_return();
        self.ret_fresh = false;
    }

    pub fn on_access(&mut self, table: &mut FunctionTable, reg: Reg, access: Access) {
        if access.reads() {
            self.on_read(table, reg);
        }
        if access.writes() {
            self.on_write(reg);
        }
    }

    pub fn on_write(&mut self, reg: Reg) {
        if self.stack.is_empty() || self.stack.is_top_forgotten() {
            return;
        }

        self.regs.record_write(reg, self.stack.height());
        if reg.is_int_return() {
            self.ret_fresh = true;
            self.returned_through = None;
        }
    }

    pub fn on_read(&mut self, table: &mut FunctionTable, reg: Reg) {
        let top = match self.stack.top() {
            Some(Entry::Live(frame)) => frame,
            _ => return,
        };

        if reg.is_int_return() {
            self.read_return_value(table, reg);
            return;
        }
        if reg.is_float_return() {
            self.regs.mark_read_as_return(reg);
        }

        let slot = match reg.slot() {
            Some(slot) => slot,
            None => return,
        };
        // nothing is known about an untracked frame's arguments
        if top.fid.is_unknown() || table.calls(top.fid) < self.warmup_calls {
            return;
        }

        let shadow = *self.regs.get(reg);
        if shadow.read_as_value {
            return;
        }
        let height = self.stack.height();
        let range = shadow.uncredited(height);
        if range.is_empty() {
            return;
        }

        // every frame pushed since the write could see the value, credit each of them
        let from = (*range.start()).max(self.stack.first_live());
        for h in from..=height {
            if let Some(Entry::Live(frame)) = self.stack.peek(h) {
                table.credit_slot(frame.fid, slot, reg.width());
            }
        }
        self.regs.mark_credited(reg, height);
    }

    // the caller picking up a value some already-returned callee left in the return register
    fn read_return_value(&mut self, table: &mut FunctionTable, reg: Reg) {
        let shadow = *self.regs.get(reg);
        self.regs.mark_read_as_return(reg);
        if self.ret_fresh || shadow.read_as_return {
            return;
        }
        let written = match shadow.last_write {
            Some(h) => h,
            None => return,
        };

        let height = self.stack.height();
        let upper = match self.returned_through {
            Some(low) => low.saturating_sub(1).min(written),
            None => written,
        };
        for h in height + 1..=upper {
            if let Some(frame) = self.stack.retired(h) {
                table.credit_return(frame.fid);
            }
        }
    }

    fn credit_return(&mut self, table: &mut FunctionTable, frame: Frame) {
        if !self.ret_fresh {
            return;
        }

        let pending = |reg: Reg| {
            let shadow = self.regs.get(reg);
            shadow.last_write.map_or(false, |h| h >= frame.height) && !shadow.read_as_return
        };
        let int = pending(Reg::Rax);
        let float = pending(Reg::Xmm0);
        if !(int || float) {
            return;
        }

        table.credit_return(frame.fid);
        if int {
            self.returned_through = Some(frame.height);
        }
    }
}
