use std::{
    alloc::{self, Layout},
    cell::{Cell, RefCell},
    ptr::NonNull,
};

/// Alignment of every allocation handed out by the arena.
/// Large enough for any scalar or nalgebra type used by the renderer.
pub const ARENA_ALIGNMENT: usize = 16;

pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Bump allocator for short lived per-task data.
///
/// Memory is handed out from large blocks by advancing a cursor. Nothing is freed
/// individually: `reset` makes all of the memory reusable at once, blocks are only
/// returned to the system when the arena is dropped.
///
/// The arena is not `Sync`, every concurrent task is expected to own its own.
/// Values placed in the arena never have their destructors run.
pub struct MemoryArena {
    block_size: usize,
    state: RefCell<ArenaState>,
    block_allocations: Cell<usize>,
}

#[derive(Default)]
struct ArenaState {
    current: Option<Block>,
    current_pos: usize,
    /// Exhausted blocks, retired since the last reset
    used: Vec<Block>,
    /// Blocks that can be reused
    available: Vec<Block>,
}

struct Block {
    ptr: NonNull<u8>,
    size: usize,
}

// The block exclusively owns its memory.
unsafe impl Send for Block {}

impl Block {
    fn new(size: usize) -> Block {
        let layout = Self::layout(size);
        // SAFETY: The layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            alloc::handle_alloc_error(layout);
        };
        Block { ptr, size }
    }

    fn layout(size: usize) -> Layout {
        match Layout::from_size_align(size, ARENA_ALIGNMENT) {
            Ok(layout) => layout,
            Err(_) => panic!("Arena block size {size} is too large"),
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: The pointer was allocated in `Block::new` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout(self.size)) }
    }
}

impl MemoryArena {
    pub fn new(block_size: usize) -> MemoryArena {
        MemoryArena {
            block_size: block_size.max(ARENA_ALIGNMENT),
            state: RefCell::new(ArenaState::default()),
            block_allocations: Cell::new(0),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Allocate uninitialized memory for the layout.
    /// The pointer stays valid until the next `reset` or until the arena is dropped.
    /// Panics if the layout requires alignment stricter than `ARENA_ALIGNMENT`.
    pub fn alloc_layout(&self, layout: Layout) -> NonNull<u8> {
        assert!(
            layout.align() <= ARENA_ALIGNMENT,
            "Arena can't provide alignment {}",
            layout.align()
        );

        let size = layout.size().next_multiple_of(ARENA_ALIGNMENT);

        let mut state = self.state.borrow_mut();
        let state = &mut *state;

        let fits = state
            .current
            .as_ref()
            .is_some_and(|block| state.current_pos + size <= block.size);

        if !fits {
            if let Some(exhausted) = state.current.take() {
                state.used.push(exhausted);
            }

            let reusable = state
                .available
                .iter()
                .position(|block| block.size >= size);
            let block = match reusable {
                Some(index) => state.available.swap_remove(index),
                None => {
                    self.block_allocations.set(self.block_allocations.get() + 1);
                    Block::new(size.max(self.block_size))
                }
            };

            state.current = Some(block);
            state.current_pos = 0;
        }

        let Some(block) = state.current.as_ref() else {
            unreachable!("The arena always has a current block here")
        };

        // SAFETY: current_pos + size is within the block
        let ptr = unsafe { block.ptr.add(state.current_pos) };
        state.current_pos += size;
        ptr
    }

    /// Move the value into the arena.
    pub fn alloc<T>(&self, value: T) -> &mut T {
        let ptr = self.alloc_layout(Layout::new::<T>()).cast::<T>();
        // SAFETY: The memory is freshly allocated, properly aligned and not aliased.
        // The reference can't outlive the arena and `reset` requires exclusive access.
        unsafe {
            ptr.write(value);
            &mut *ptr.as_ptr()
        }
    }

    /// Allocate a slice of `len` items, each initialized by calling `f` with its index.
    pub fn alloc_slice_fill_with<T>(&self, len: usize, mut f: impl FnMut(usize) -> T) -> &mut [T] {
        let Ok(layout) = Layout::array::<T>(len) else {
            panic!("Arena allocation of {len} items is too large");
        };
        let ptr = self.alloc_layout(layout).cast::<T>();
        for i in 0..len {
            // SAFETY: Writing within the freshly allocated array.
            unsafe { ptr.add(i).write(f(i)) };
        }
        // SAFETY: All `len` items were initialized above.
        unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) }
    }

    /// Make all memory allocated so far reusable.
    /// Blocks are kept for the following allocations, not returned to the system.
    pub fn reset(&mut self) {
        let state = self.state.get_mut();
        state.current_pos = 0;
        let ArenaState {
            used, available, ..
        } = state;
        available.append(used);
    }

    /// Total size of all blocks owned by the arena, in bytes.
    pub fn total_allocated(&self) -> usize {
        let state = self.state.borrow();
        state.current.iter().map(|block| block.size).sum::<usize>()
            + state.used.iter().map(|block| block.size).sum::<usize>()
            + state.available.iter().map(|block| block.size).sum::<usize>()
    }

    /// Number of blocks requested from the system allocator since the arena was created.
    pub fn block_allocations(&self) -> usize {
        self.block_allocations.get()
    }
}

impl Default for MemoryArena {
    fn default() -> Self {
        MemoryArena::new(DEFAULT_BLOCK_SIZE)
    }
}

impl std::fmt::Debug for MemoryArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryArena")
            .field("block_size", &self.block_size)
            .field("total_allocated", &self.total_allocated())
            .field("block_allocations", &self.block_allocations())
            .finish()
    }
}
