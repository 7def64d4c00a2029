//! Tag trees, described in Section B.10.2.
//!
//! Tag trees are quad trees where each leaf stores an integer value and
//! each intermediate node stores the smallest value of its children. They
//! are never stored in full, instead the packet headers reveal them bit by
//! bit. Both trees therefore only remember the node path that was walked by
//! the last `reset`, and continue from there.

use crate::error::{DecodingError, Result};

#[derive(Debug, Clone)]
struct Level<T> {
    width: u32,
    items: Vec<T>,
    /// The node of this level on the current path.
    index: usize,
}

fn build_levels<T: Clone>(mut width: u32, mut height: u32, default: T) -> Vec<Level<T>> {
    let num_levels = ceil_log2(width.max(height)) + 1;
    let mut levels = Vec::with_capacity(num_levels as usize);

    for _ in 0..num_levels {
        levels.push(Level {
            width,
            items: vec![default.clone(); width as usize * height as usize],
            index: 0,
        });

        width = width.div_ceil(2);
        height = height.div_ceil(2);
    }

    levels
}

/// `ceil(log2(value))`, with 0 for values below 2.
pub(crate) fn ceil_log2(value: u32) -> u32 {
    if value <= 1 {
        0
    } else {
        32 - (value - 1).leading_zeros()
    }
}

/// The tag tree storing the number of missing most significant bit-planes of
/// code-blocks.
#[derive(Debug, Clone)]
pub(crate) struct TagTree {
    levels: Vec<Level<Option<u32>>>,
    current_level: usize,
    value: Option<u32>,
}

impl TagTree {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            levels: build_levels(width, height, None),
            current_level: 0,
            value: None,
        }
    }

    /// Start walking from the leaf at the given position towards the root,
    /// stopping at the first node whose value is already known.
    pub(crate) fn reset(&mut self, mut i: u32, mut j: u32) -> Result<()> {
        let mut value = 0;
        let mut level_idx = 0;

        while level_idx < self.levels.len() {
            let level = &mut self.levels[level_idx];
            let index = (i + j * level.width) as usize;

            if let Some(known) = level.items.get(index).copied().flatten() {
                value = known;
                break;
            }

            level.index = index;
            i >>= 1;
            j >>= 1;
            level_idx += 1;
        }

        // The leaf itself was already decoded.
        let Some(level_idx) = level_idx.checked_sub(1) else {
            return Err(DecodingError::InvalidTagTree.into());
        };

        self.set_current(level_idx, value)?;
        self.value = None;

        Ok(())
    }

    pub(crate) fn increment_value(&mut self) -> Result<()> {
        let value = self.current()?;
        self.set_current(self.current_level, value + 1)
    }

    /// Move one level down on the current path, propagating the value of the
    /// current node. Returns `false` once the leaf value is final.
    pub(crate) fn next_level(&mut self) -> Result<bool> {
        let value = self.current()?;

        let Some(level_idx) = self.current_level.checked_sub(1) else {
            self.value = Some(value);

            return Ok(false);
        };

        self.set_current(level_idx, value)?;

        Ok(true)
    }

    /// The value of the leaf after `next_level` returned `false`.
    pub(crate) fn value(&self) -> Option<u32> {
        self.value
    }

    fn current(&self) -> Result<u32> {
        let level = &self.levels[self.current_level];

        level
            .items
            .get(level.index)
            .copied()
            .flatten()
            .ok_or(DecodingError::InvalidTagTree.into())
    }

    fn set_current(&mut self, level_idx: usize, value: u32) -> Result<()> {
        let level = &mut self.levels[level_idx];
        *level
            .items
            .get_mut(level.index)
            .ok_or(DecodingError::InvalidTagTree)? = Some(value);
        self.current_level = level_idx;

        Ok(())
    }
}

/// Marks a node whose value is final.
const DONE: u32 = u32::MAX;

/// The tag tree storing the layer in which code-blocks are first included.
#[derive(Debug, Clone)]
pub(crate) struct InclusionTree {
    levels: Vec<Level<u32>>,
    current_level: usize,
}

impl InclusionTree {
    pub(crate) fn new(width: u32, height: u32, default_value: u32) -> Self {
        Self {
            levels: build_levels(width, height, default_value),
            current_level: 0,
        }
    }

    /// Walk from the leaf at the given position towards the root. Returns
    /// `false` if a node already shows that the code-block isn't included
    /// up to layer `stop_value`, and `true` if more bits have to be read.
    pub(crate) fn reset(&mut self, mut i: u32, mut j: u32, stop_value: u32) -> Result<bool> {
        let mut level_idx = 0;

        while level_idx < self.levels.len() {
            let level = &mut self.levels[level_idx];
            let index = (i + j * level.width) as usize;
            level.index = index;

            let value = *level
                .items
                .get(index)
                .ok_or(DecodingError::InvalidTagTree)?;

            if value == DONE {
                break;
            }

            if value > stop_value {
                self.current_level = level_idx;
                self.propagate_values();

                return Ok(false);
            }

            i >>= 1;
            j >>= 1;
            level_idx += 1;
        }

        self.current_level = level_idx
            .checked_sub(1)
            .ok_or(DecodingError::InvalidTagTree)?;

        Ok(true)
    }

    /// Record that the current node is larger than `stop_value`.
    pub(crate) fn increment_value(&mut self, stop_value: u32) {
        let level = &mut self.levels[self.current_level];
        level.items[level.index] = stop_value + 1;
        self.propagate_values();
    }

    fn propagate_values(&mut self) {
        let current = &self.levels[self.current_level];
        let value = current.items[current.index];

        for level in &mut self.levels[..self.current_level] {
            level.items[level.index] = value;
        }
    }

    /// Move one level down on the current path. Returns `false` if the
    /// current node was the leaf, i.e. the code-block is included.
    pub(crate) fn next_level(&mut self) -> bool {
        let level = &mut self.levels[self.current_level];
        let value = level.items[level.index];
        level.items[level.index] = DONE;

        let Some(level_idx) = self.current_level.checked_sub(1) else {
            return false;
        };

        self.current_level = level_idx;
        let level = &mut self.levels[level_idx];
        level.items[level.index] = value;

        true
    }
}
