use std::iter::FusedIterator;
use std::num::NonZeroU32;

use crate::{
    geometry::{ScreenBlock, ScreenPoint, ScreenSize},
    parallel::{GridPoint, GridSize},
};

pub trait ScreenBlockExt {
    fn from_size(size: ScreenSize) -> Self;
    fn is_empty_or_negative(&self) -> bool;
    fn area(&self) -> u32;
    fn internal_points(&self) -> InternalPoints;
    fn tile_grid_size(&self, tile_size: NonZeroU32) -> GridSize;
    fn tile(&self, grid_point: GridPoint, tile_size: NonZeroU32) -> ScreenBlock;
}

impl ScreenBlockExt for ScreenBlock {
    /// Block starting at the origin.
    fn from_size(size: ScreenSize) -> Self {
        ScreenBlock::with_size(ScreenPoint::origin(), &size)
    }

    fn is_empty_or_negative(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    fn area(&self) -> u32 {
        if self.is_empty_or_negative() {
            0
        } else {
            self.width() * self.height()
        }
    }

    /// Create an iterator over coordinates (x, y) pairs inside the block,
    /// in C order (x changes first, then y)
    fn internal_points(&self) -> InternalPoints {
        if self.is_empty_or_negative() {
            InternalPoints::empty()
        } else {
            InternalPoints {
                min_x: self.min.x,
                max: self.max,

                cursor: self.min,
            }
        }
    }

    /// Number of tiles in each direction needed to cover the block.
    /// Tiles on the right and bottom edge may be clipped.
    fn tile_grid_size(&self, tile_size: NonZeroU32) -> GridSize {
        if self.is_empty_or_negative() {
            return GridSize::zeros();
        }
        GridSize::new(
            self.width().div_ceil(tile_size.get()) as usize,
            self.height().div_ceil(tile_size.get()) as usize,
        )
    }

    /// Tile at the given position of the tile grid, clipped to the block.
    fn tile(&self, grid_point: GridPoint, tile_size: NonZeroU32) -> ScreenBlock {
        let tile_size = tile_size.get();
        let min = ScreenPoint::new(
            self.min.x + grid_point.x as u32 * tile_size,
            self.min.y + grid_point.y as u32 * tile_size,
        );
        let max = ScreenPoint::new(
            (min.x + tile_size).min(self.max.x),
            (min.y + tile_size).min(self.max.y),
        );
        let ret = ScreenBlock::new(min, max);
        debug_assert!(!ret.is_empty_or_negative(), "Tile {grid_point} is outside of the block");
        ret
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InternalPoints {
    min_x: u32,
    max: ScreenPoint,

    cursor: ScreenPoint,
}

impl InternalPoints {
    // Construct an iterator over internal points that returns no points
    fn empty() -> Self {
        InternalPoints {
            min_x: 1,
            max: ScreenPoint::origin(),

            cursor: ScreenPoint::origin(),
        }
    }
}

impl Iterator for InternalPoints {
    type Item = ScreenPoint;

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.y >= self.max.y {
            return None;
        }

        let ret = self.cursor;

        debug_assert!(self.cursor.x < self.max.x);
        self.cursor.x += 1;
        if self.cursor.x >= self.max.x {
            self.cursor.x = self.min_x;
            self.cursor.y += 1;
        }

        Some(ret)
    }
}

impl ExactSizeIterator for InternalPoints {
    fn len(&self) -> usize {
        if self.cursor.y >= self.max.y {
            0
        } else {
            let whole_rows = (self.max.y - self.cursor.y - 1) * (self.max.x - self.min_x);
            let current_row = self.max.x - self.cursor.x;
            (whole_rows + current_row) as usize
        }
    }
}

impl FusedIterator for InternalPoints {}
