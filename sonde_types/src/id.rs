use index_vec::define_index_type;

define_index_type! {pub struct FuncId = u32;}

pub type ThreadId = u32;

// logical call depth. 0 is "no frame", the first frame lives at 1
pub type Height = u64;

impl FuncId {
    // every table reserves index 0 for calls we can't attribute
    pub fn unknown() -> Self {
        Self::from_usize(0)
    }

    pub fn is_unknown(self) -> bool {
        self.index() == 0
    }
}
