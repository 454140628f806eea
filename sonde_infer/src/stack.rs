use sonde_types::{FuncId, Height};

use crate::error::InferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub fid: FuncId,
    pub height: Height,
    // entered through an indirect jump rather than a call, unwound together with its caller
    pub is_jump: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Live(Frame),
    // evicted, only its jump tag survives
    Forgotten { is_jump: bool },
}

impl Entry {
    pub fn live(self) -> Option<Frame> {
        match self {
            Entry::Live(frame) => Some(frame),
            Entry::Forgotten { .. } => None,
        }
    }
}

/// Bounded shadow of the target's call stack.
///
/// Frames live in a ring of `cap` slots indexed by absolute height. Pushing past `cap` live
/// frames overwrites the oldest one, which is then forgotten until the logical stack unwinds
/// below it. Popping doesn't clear a slot, so recently returned frames stay visible through
/// [`ShadowStack::retired`] until something is pushed over them.
///
/// An evicted frame keeps one bit, its jump tag, so a return can still unwind a jump chain
/// reaching down into the forgotten region.
#[derive(Debug)]
pub struct ShadowStack {
    slots: Vec<Option<Frame>>,
    height: Height,
    // every height in 1..=forgotten_through has been evicted
    forgotten_through: Height,
    // bit h - 1 is the jump tag of the frame evicted at height h
    forgotten_jumps: Vec<u64>,
}

impl ShadowStack {
    pub fn with_capacity(cap: usize) -> Result<Self, InferError> {
        if cap == 0 {
            return Err(InferError::ZeroDepth);
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(cap)
            .map_err(|_| InferError::Alloc { what: "shadow stack", count: cap })?;
        slots.resize(cap, None);
        Ok(Self {
            slots,
            height: 0,
            forgotten_through: 0,
            forgotten_jumps: Vec::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    /// Number of frames physically retained.
    pub fn live_len(&self) -> usize {
        (self.height - self.forgotten_through) as usize
    }

    fn slot_of(&self, height: Height) -> usize {
        (height % self.slots.len() as Height) as usize
    }

    /// Pushes a frame, returning the frame evicted to make room, if any.
    pub fn push(&mut self, fid: FuncId, is_jump: bool) -> Option<Frame> {
        self.height += 1;
        let slot = self.slot_of(self.height);

        let mut evicted = None;
        if self.live_len() > self.capacity() {
            // the slot we're about to reuse holds exactly the oldest live frame
            self.forgotten_through += 1;
            evicted = self.slots[slot];
            let is_jump = evicted.map_or(false, |frame| frame.is_jump);
            self.set_forgotten_jump(self.forgotten_through, is_jump);
        }

        self.slots[slot] = Some(Frame {
            fid,
            height: self.height,
            is_jump,
        });
        evicted
    }

    /// Pops the top frame. `None` if the stack is empty.
    pub fn pop(&mut self) -> Option<Entry> {
        let top = self.top()?;
        self.height -= 1;
        if self.forgotten_through > self.height {
            self.forgotten_through = self.height;
        }
        Some(top)
    }

    pub fn top(&self) -> Option<Entry> {
        self.peek(self.height)
    }

    /// Frame at an absolute height, `None` if nothing is pushed there.
    pub fn peek(&self, height: Height) -> Option<Entry> {
        if height == 0 || height > self.height {
            return None;
        }
        if self.is_forgotten(height) {
            return Some(Entry::Forgotten {
                is_jump: self.forgotten_jump(height),
            });
        }
        // live heights occupy distinct slots, so this can't have been overwritten
        self.slots[self.slot_of(height)].map(Entry::Live)
    }

    /// Lowest height that can still hold a live frame.
    pub fn first_live(&self) -> Height {
        self.forgotten_through + 1
    }

    pub fn is_forgotten(&self, height: Height) -> bool {
        height != 0 && height <= self.forgotten_through
    }

    pub fn is_top_forgotten(&self) -> bool {
        self.is_forgotten(self.height)
    }

    fn set_forgotten_jump(&mut self, height: Height, is_jump: bool) {
        let bit = (height - 1) as usize;
        let word = bit / 64;
        if word >= self.forgotten_jumps.len() {
            self.forgotten_jumps.resize(word + 1, 0);
        }
        let mask = 1u64 << (bit % 64);
        if is_jump {
            self.forgotten_jumps[word] |= mask;
        } else {
            self.forgotten_jumps[word] &= !mask;
        }
    }

    fn forgotten_jump(&self, height: Height) -> bool {
        let bit = (height - 1) as usize;
        self.forgotten_jumps
            .get(bit / 64)
            .map_or(false, |word| word & (1u64 << (bit % 64)) != 0)
    }

    /// A frame already popped from above the current height whose slot hasn't been reused.
    pub fn retired(&self, height: Height) -> Option<Frame> {
        if height <= self.height {
            return None;
        }
        self.slots[self.slot_of(height)].filter(|frame| frame.height == height)
    }
}
