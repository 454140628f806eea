use sonde_types::reg::NUM_REGS;
use sonde_types::{Height, Reg};

/// What we know about the last write to one register view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegShadow {
    // None until the first write we see
    pub last_write: Option<Height>,
    // highest height already credited for this write
    pub credited_through: Height,
    // the write is spent as a parameter value, nothing more gets credited until the next write
    pub read_as_value: bool,
    pub read_as_return: bool,
}

impl RegShadow {
    /// Heights a read at `height` would newly credit, empty if none.
    pub fn uncredited(&self, height: Height) -> std::ops::RangeInclusive<Height> {
        let from = self.credited_through.max(self.last_write.unwrap_or(0)) + 1;
        from..=height
    }
}

#[derive(Debug, Clone)]
pub struct RegisterFile {
    regs: [RegShadow; NUM_REGS],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            regs: [RegShadow::default(); NUM_REGS],
        }
    }

    pub fn get(&self, reg: Reg) -> &RegShadow {
        &self.regs[reg.index()]
    }

    /// A write makes every overlapping view stale at once.
    pub fn record_write(&mut self, reg: Reg, height: Height) {
        for alias in reg.aliases() {
            self.regs[alias.index()] = RegShadow {
                last_write: Some(height),
                credited_through: height,
                read_as_value: false,
                read_as_return: false,
            };
        }
    }

    pub fn mark_credited(&mut self, reg: Reg, height: Height) {
        let shadow = &mut self.regs[reg.index()];
        shadow.credited_through = shadow.credited_through.max(height);
    }

    pub fn mark_read_as_return(&mut self, reg: Reg) {
        for alias in reg.aliases() {
            self.regs[alias.index()].read_as_return = true;
        }
    }

    /// Return values written at or above `height` belong to frames that already returned.
    pub fn expire_returns_from(&mut self, height: Height) {
        for reg in Reg::ALL.iter() {
            if !(reg.is_int_return() || reg.is_float_return()) {
                continue;
            }
            let shadow = &mut self.regs[reg.index()];
            if shadow.last_write.map_or(false, |h| h >= height) {
                shadow.read_as_return = true;
            }
        }
    }

    /// After a return nothing but the int return family can carry a value back to the
    /// caller, so every other pending write is spent.
    pub fn retire_after_return(&mut self) {
        for reg in Reg::ALL.iter().filter(|reg| !reg.is_int_return()) {
            self.regs[reg.index()].read_as_value = true;
        }
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
