//! Frame records and their recycling arena
//!
//! Every tracked call owns one `Frame` while it is on the stack. Frames live
//! in a slot-indexed arena; popped frames go onto an intrusive free list
//! (threaded through the same `prev` link the live stack uses) and are handed
//! out again on the next push without touching the allocator. The name
//! buffer is reused too, so steady-state pushes do not allocate.
//!
//! The free list never shrinks during a session; `drain()` releases the
//! memory at teardown.

/// Index of a frame slot in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u32);

impl FrameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One in-flight call
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Symbol name of the call
    pub name: String,
    /// Number of live frames below this one with the same name
    pub recursion_level: u32,
    /// Cycle counter at entry
    pub cycles_start: u64,
    /// Process CPU time at entry (microseconds)
    pub cpu_start_us: u64,
    /// Memory usage at entry (bytes)
    pub memory_start: i64,
    /// Peak memory usage at entry (bytes)
    pub peak_memory_start: i64,
    /// Structural hash of `name`
    pub hash: u8,
    /// Caller frame while live, next free slot while recycled
    pub(crate) prev: Option<FrameId>,
}

impl Frame {
    /// The caller's frame, if any
    pub fn prev(&self) -> Option<FrameId> {
        self.prev
    }
}

/// Slot arena with an intrusive free list
#[derive(Debug, Default)]
pub struct FrameArena {
    slots: Vec<Frame>,
    free_head: Option<FrameId>,
    free_len: usize,
}

impl FrameArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a frame from the free list, or grow the arena by one slot.
    ///
    /// The returned frame's fields are whatever the previous occupant left
    /// behind; callers overwrite what they need.
    pub fn acquire(&mut self) -> FrameId {
        match self.free_head {
            Some(id) => {
                self.free_head = self.slots[id.index()].prev.take();
                self.free_len -= 1;
                id
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .unwrap_or_else(|_| panic!("frame arena exhausted"));
                self.slots.push(Frame::default());
                FrameId(index)
            }
        }
    }

    /// Return a frame to the free list. Its contents are left in place.
    pub fn release(&mut self, id: FrameId) {
        self.slots[id.index()].prev = self.free_head;
        self.free_head = Some(id);
        self.free_len += 1;
    }

    /// Free all memory held by the arena.
    ///
    /// Only valid when no frame is live; returns the number of slots freed,
    /// or 0 if frames are still in use.
    pub fn drain(&mut self) -> usize {
        if self.live() != 0 {
            return 0;
        }
        let freed = self.slots.len();
        self.slots = Vec::new();
        self.free_head = None;
        self.free_len = 0;
        freed
    }

    /// Number of frames waiting on the free list
    pub fn free_len(&self) -> usize {
        self.free_len
    }

    /// Total slots ever allocated (live + free)
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    /// Number of frames currently handed out
    pub fn live(&self) -> usize {
        self.slots.len() - self.free_len
    }

    pub fn get(&self, id: FrameId) -> &Frame {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.slots[id.index()]
    }
}
