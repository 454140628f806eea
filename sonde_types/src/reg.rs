use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// counters kept per function. the convention only ever reaches the first six int slots, the
// rest stay zero but keep the report shape stable
pub const INT_SLOTS: usize = 16;
pub const FLOAT_SLOTS: usize = 8;

pub const NUM_REGS: usize = 39;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reg {
    Rdi,
    Edi,
    Di,
    Dil,

    Rsi,
    Esi,
    Si,
    Sil,

    Rdx,
    Edx,
    Dx,
    Dh,
    Dl,

    Rcx,
    Ecx,
    Cx,
    Ch,
    Cl,

    R8,
    R8d,
    R8w,
    R8b,

    R9,
    R9d,
    R9w,
    R9b,

    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,

    Rax,
    Eax,
    Ax,
    Ah,
    Al,
}

/// Registers sharing one physical storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Rdi,
    Rsi,
    Rdx,
    Rcx,
    R8,
    R9,
    Xmm(u8),
    Rax,
}

/// Canonical positional argument index within one register bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Int(usize),
    Float(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    // read and written with distinct operands, or a move
    ReadWrite,
    // same register on both sides, e.g. `xor edi, edi`. never a real read
    Clobber,
}

impl Access {
    pub fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writes(self) -> bool {
        !matches!(self, Access::Read)
    }
}

impl Reg {
    pub const ALL: [Reg; NUM_REGS] = [
        Reg::Rdi,
        Reg::Edi,
        Reg::Di,
        Reg::Dil,
        Reg::Rsi,
        Reg::Esi,
        Reg::Si,
        Reg::Sil,
        Reg::Rdx,
        Reg::Edx,
        Reg::Dx,
        Reg::Dh,
        Reg::Dl,
        Reg::Rcx,
        Reg::Ecx,
        Reg::Cx,
        Reg::Ch,
        Reg::Cl,
        Reg::R8,
        Reg::R8d,
        Reg::R8w,
        Reg::R8b,
        Reg::R9,
        Reg::R9d,
        Reg::R9w,
        Reg::R9b,
        Reg::Xmm0,
        Reg::Xmm1,
        Reg::Xmm2,
        Reg::Xmm3,
        Reg::Xmm4,
        Reg::Xmm5,
        Reg::Xmm6,
        Reg::Xmm7,
        Reg::Rax,
        Reg::Eax,
        Reg::Ax,
        Reg::Ah,
        Reg::Al,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn family(self) -> Family {
        use Reg::*;
        match self {
            Rdi | Edi | Di | Dil => Family::Rdi,
            Rsi | Esi | Si | Sil => Family::Rsi,
            Rdx | Edx | Dx | Dh | Dl => Family::Rdx,
            Rcx | Ecx | Cx | Ch | Cl => Family::Rcx,
            R8 | R8d | R8w | R8b => Family::R8,
            R9 | R9d | R9w | R9b => Family::R9,
            Xmm0 => Family::Xmm(0),
            Xmm1 => Family::Xmm(1),
            Xmm2 => Family::Xmm(2),
            Xmm3 => Family::Xmm(3),
            Xmm4 => Family::Xmm(4),
            Xmm5 => Family::Xmm(5),
            Xmm6 => Family::Xmm(6),
            Xmm7 => Family::Xmm(7),
            Rax | Eax | Ax | Ah | Al => Family::Rax,
        }
    }

    /// Width of the view in bits.
    pub fn width(self) -> u32 {
        use Reg::*;
        match self {
            Rdi | Rsi | Rdx | Rcx | R8 | R9 | Rax => 64,
            Edi | Esi | Edx | Ecx | R8d | R9d | Eax => 32,
            Di | Si | Dx | Cx | R8w | R9w | Ax => 16,
            Dil | Sil | Dh | Dl | Ch | Cl | R8b | R9b | Ah | Al => 8,
            Xmm0 | Xmm1 | Xmm2 | Xmm3 | Xmm4 | Xmm5 | Xmm6 | Xmm7 => 128,
        }
    }

    pub fn slot(self) -> Option<Slot> {
        self.family().slot()
    }

    pub fn is_int_return(self) -> bool {
        self.family() == Family::Rax
    }

    pub fn is_float_return(self) -> bool {
        self == Reg::Xmm0
    }

    /// Every view overlapping this register's storage, itself included.
    pub fn aliases(self) -> &'static [Reg] {
        ALIASES.views(self.family())
    }

    pub fn name(self) -> &'static str {
        use Reg::*;
        match self {
            Rdi => "rdi",
            Edi => "edi",
            Di => "di",
            Dil => "dil",
            Rsi => "rsi",
            Esi => "esi",
            Si => "si",
            Sil => "sil",
            Rdx => "rdx",
            Edx => "edx",
            Dx => "dx",
            Dh => "dh",
            Dl => "dl",
            Rcx => "rcx",
            Ecx => "ecx",
            Cx => "cx",
            Ch => "ch",
            Cl => "cl",
            R8 => "r8",
            R8d => "r8d",
            R8w => "r8w",
            R8b => "r8b",
            R9 => "r9",
            R9d => "r9d",
            R9w => "r9w",
            R9b => "r9b",
            Xmm0 => "xmm0",
            Xmm1 => "xmm1",
            Xmm2 => "xmm2",
            Xmm3 => "xmm3",
            Xmm4 => "xmm4",
            Xmm5 => "xmm5",
            Xmm6 => "xmm6",
            Xmm7 => "xmm7",
            Rax => "rax",
            Eax => "eax",
            Ax => "ax",
            Ah => "ah",
            Al => "al",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Family {
    pub fn slot(self) -> Option<Slot> {
        match self {
            Family::Rdi => Some(Slot::Int(0)),
            Family::Rsi => Some(Slot::Int(1)),
            Family::Rdx => Some(Slot::Int(2)),
            Family::Rcx => Some(Slot::Int(3)),
            Family::R8 => Some(Slot::Int(4)),
            Family::R9 => Some(Slot::Int(5)),
            Family::Xmm(n) => Some(Slot::Float(n as usize)),
            Family::Rax => None,
        }
    }
}

#[derive(Debug)]
pub struct AliasTable {
    views: HashMap<Family, Vec<Reg>>,
}

impl AliasTable {
    fn build() -> Self {
        let mut views: HashMap<Family, Vec<Reg>> = HashMap::new();
        for reg in Reg::ALL.iter() {
            views.entry(reg.family()).or_default().push(*reg);
        }
        Self { views }
    }

    pub fn views(&self, family: Family) -> &[Reg] {
        self.views.get(&family).map(Vec::as_slice).unwrap_or(&[])
    }
}

static ALIASES: Lazy<AliasTable> = Lazy::new(AliasTable::build);
