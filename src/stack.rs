//! Call stack tracker
//!
//! The live stack is a singly linked list of arena frames, most recent
//! first. Push and pop run the mode hooks at fixed points: the begin hook
//! sees the new frame before it becomes the top, and the end hook runs
//! while the frame is still linked, so the hook's own bookkeeping falls
//! outside the measured interval.
//!
//! Recursion levels are computed by scanning ancestors for an exact name
//! match. A per-hash counter of live frames skips the scan entirely when no
//! live frame shares the new symbol's hash.

use crate::frame::{Frame, FrameArena, FrameId};
use crate::symbol::{push_entry_name, STACK_DELIMITER};

const HASH_BUCKETS: usize = 256;

/// Stack of in-flight calls
#[derive(Debug)]
pub struct CallStack {
    arena: FrameArena,
    top: Option<FrameId>,
    hash_counters: [u32; HASH_BUCKETS],
    depth: usize,
}

impl Default for CallStack {
    fn default() -> Self {
        CallStack {
            arena: FrameArena::new(),
            top: None,
            hash_counters: [0; HASH_BUCKETS],
            depth: 0,
        }
    }
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame for `symbol` and make it the new top.
    ///
    /// `on_begin` runs after the frame is linked under the current top and
    /// its recursion level is known, but before it becomes the top.
    pub fn push<F>(&mut self, symbol: &str, hash: u8, on_begin: F) -> FrameId
    where
        F: FnOnce(&mut CallStack, FrameId),
    {
        let recursion_level = if self.hash_counters[hash as usize] > 0 {
            self.ancestor_level(symbol, hash)
        } else {
            0
        };

        let id = self.arena.acquire();
        let prev = self.top;
        let frame = self.arena.get_mut(id);
        frame.name.clear();
        frame.name.push_str(symbol);
        frame.hash = hash;
        frame.recursion_level = recursion_level;
        frame.prev = prev;

        self.hash_counters[hash as usize] += 1;
        on_begin(self, id);

        self.top = Some(id);
        self.depth += 1;
        id
    }

    /// Pop the top frame, running `on_end` on it first.
    ///
    /// Returns false (and does nothing) when the stack is empty.
    pub fn pop<F>(&mut self, on_end: F) -> bool
    where
        F: FnOnce(&mut CallStack, FrameId),
    {
        let Some(id) = self.top else {
            return false;
        };
        on_end(self, id);

        let frame = self.arena.get(id);
        let hash = frame.hash as usize;
        self.top = frame.prev;
        self.hash_counters[hash] = self.hash_counters[hash].saturating_sub(1);
        self.depth -= 1;
        self.arena.release(id);
        true
    }

    /// Level for a new frame: one more than the nearest live frame with the
    /// same name, or 0 if there is none
    fn ancestor_level(&self, symbol: &str, hash: u8) -> u32 {
        let mut cursor = self.top;
        while let Some(id) = cursor {
            let frame = self.arena.get(id);
            if frame.hash == hash && frame.name == symbol {
                return frame.recursion_level + 1;
            }
            cursor = frame.prev;
        }
        0
    }

    /// Render the chain ending at `frame` as `A==>B==>C` (root first),
    /// covering at most `max_depth` frames, appended to `out`.
    ///
    /// A depth of 2 gives the caller==>callee edge key; `usize::MAX` gives
    /// the whole stack. When `max_len` is given the rendered text is cut to
    /// at most that many bytes.
    pub fn stack_to_string(
        &self,
        frame: FrameId,
        max_depth: usize,
        max_len: Option<usize>,
        out: &mut String,
    ) {
        let start = out.len();
        self.render(frame, max_depth.max(1), out);

        if let Some(limit) = max_len {
            let mut end = start + limit;
            if end < out.len() {
                while !out.is_char_boundary(end) {
                    end -= 1;
                }
                out.truncate(end);
            }
        }
    }

    fn render(&self, id: FrameId, max_depth: usize, out: &mut String) {
        // Edge keys need two frames; only deep samples spill to the heap
        const INLINE: usize = 8;
        let mut inline = [id; INLINE];
        let mut spill: Vec<FrameId> = Vec::new();
        let mut count = 0;

        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if count == max_depth {
                break;
            }
            if count < INLINE {
                inline[count] = current;
            } else {
                if spill.is_empty() {
                    spill.extend_from_slice(&inline);
                }
                spill.push(current);
            }
            count += 1;
            cursor = self.arena.get(current).prev;
        }

        let chain = if count <= INLINE {
            &inline[..count]
        } else {
            spill.as_slice()
        };
        for (i, &frame_id) in chain.iter().rev().enumerate() {
            if i > 0 {
                out.push_str(STACK_DELIMITER);
            }
            let frame = self.arena.get(frame_id);
            push_entry_name(out, &frame.name, frame.recursion_level);
        }
    }

    /// Owned rendering of `stack_to_string` without a length cap
    pub fn stack_string(&self, frame: FrameId, max_depth: usize) -> String {
        let mut out = String::new();
        self.stack_to_string(frame, max_depth, None, &mut out);
        out
    }

    pub fn top(&self) -> Option<FrameId> {
        self.top
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    pub fn frame(&self, id: FrameId) -> &Frame {
        self.arena.get(id)
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        self.arena.get_mut(id)
    }

    pub fn arena(&self) -> &FrameArena {
        &self.arena
    }

    /// Release all arena memory. Only frees anything once the stack is empty.
    pub fn drain(&mut self) -> usize {
        self.arena.drain()
    }

    /// Number of live frames whose symbol hashes to `hash`
    pub fn live_with_hash(&self, hash: u8) -> u32 {
        self.hash_counters[hash as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::symbol_hash;

    fn push(stack: &mut CallStack, symbol: &str) -> FrameId {
        stack.push(symbol, symbol_hash(symbol), |_, _| {})
    }

    fn pop(stack: &mut CallStack) -> bool {
        stack.pop(|_, _| {})
    }

    #[test]
    fn test_recursion_levels() {
        let mut stack = CallStack::new();
        let ids: Vec<_> = (0..3).map(|_| push(&mut stack, "A")).collect();
        let levels: Vec<_> = ids
            .iter()
            .map(|&id| stack.frame(id).recursion_level)
            .collect();
        assert_eq!(levels, vec![0, 1, 2]);
        assert_eq!(stack.live_with_hash(symbol_hash("A")), 3);
    }

    #[test]
    fn test_indirect_recursion_level() {
        let mut stack = CallStack::new();
        push(&mut stack, "A");
        push(&mut stack, "B");
        let again = push(&mut stack, "A");
        assert_eq!(stack.frame(again).recursion_level, 1);
        assert_eq!(stack.stack_string(again, usize::MAX), "A==>B==>A@1");
    }

    #[test]
    fn test_level_resets_after_unwind() {
        let mut stack = CallStack::new();
        push(&mut stack, "A");
        pop(&mut stack);
        let id = push(&mut stack, "A");
        assert_eq!(stack.frame(id).recursion_level, 0);
        assert_eq!(stack.live_with_hash(symbol_hash("A")), 1);
    }

    #[test]
    fn test_stack_to_string_depths() {
        let mut stack = CallStack::new();
        push(&mut stack, "main()");
        push(&mut stack, "A");
        let top = push(&mut stack, "B");

        assert_eq!(stack.stack_string(top, 1), "B");
        assert_eq!(stack.stack_string(top, 2), "A==>B");
        assert_eq!(stack.stack_string(top, usize::MAX), "main()==>A==>B");
        // Depth 0 still names the frame itself
        assert_eq!(stack.stack_string(top, 0), "B");
    }

    #[test]
    fn test_stack_to_string_length_cap() {
        let mut stack = CallStack::new();
        push(&mut stack, "alpha");
        let top = push(&mut stack, "beta");

        let mut out = String::from("key=");
        stack.stack_to_string(top, usize::MAX, Some(8), &mut out);
        assert_eq!(out, "key=alpha==>");

        let mut out = String::new();
        stack.stack_to_string(top, usize::MAX, Some(100), &mut out);
        assert_eq!(out, "alpha==>beta");
    }

    #[test]
    fn test_hooks_run_at_the_right_time() {
        let mut stack = CallStack::new();
        let root = push(&mut stack, "main()");

        let child = stack.push("A", symbol_hash("A"), |s, id| {
            // New frame is linked but not yet the top
            assert_eq!(s.top(), Some(root));
            assert_eq!(s.frame(id).prev(), Some(root));
            s.frame_mut(id).cycles_start = 42;
        });
        assert_eq!(stack.top(), Some(child));
        assert_eq!(stack.frame(child).cycles_start, 42);

        let popped = stack.pop(|s, id| {
            // Frame is still the top while its end hook runs
            assert_eq!(s.top(), Some(id));
            assert_eq!(s.stack_string(id, 2), "main()==>A");
        });
        assert!(popped);
        assert_eq!(stack.top(), Some(root));
    }

    #[test]
    fn test_stack_to_string_deep_chain() {
        let mut stack = CallStack::new();
        let mut top = push(&mut stack, "main()");
        for i in 0..200_000 {
            top = push(&mut stack, if i % 2 == 0 { "a" } else { "b" });
        }

        let full = stack.stack_string(top, usize::MAX);
        assert!(full.starts_with("main()==>a==>b==>a@1==>b@1==>"));
        assert!(full.ends_with("==>a@99998==>b@99998==>a@99999==>b@99999"));
        assert_eq!(full.matches(STACK_DELIMITER).count(), 200_000);

        // Past the inline buffer but well short of the root
        assert_eq!(
            stack.stack_string(top, 10),
            "a@99995==>b@99995==>a@99996==>b@99996==>a@99997==>b@99997\
             ==>a@99998==>b@99998==>a@99999==>b@99999"
        );
    }

    #[test]
    fn test_pop_on_empty_stack() {
        let mut stack = CallStack::new();
        let mut ran = false;
        assert!(!stack.pop(|_, _| ran = true));
        assert!(!ran);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_unwind_returns_frames_to_free_list() {
        let mut stack = CallStack::new();
        for name in ["a", "b", "c", "d"] {
            push(&mut stack, name);
        }
        assert_eq!(stack.depth(), 4);
        while pop(&mut stack) {}
        assert!(stack.is_empty());
        assert_eq!(stack.arena().free_len(), 4);

        for name in ["w", "x", "y", "z"] {
            push(&mut stack, name);
        }
        assert_eq!(stack.arena().allocated(), 4);
    }
}
