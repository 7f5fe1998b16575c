//! Array source abstraction behind lazy variables
//!
//! A source exposes the shape of a stored array and reads hyper-rectangular
//! regions of it on demand. Zarr arrays (local or remote) and in-memory arrays
//! implement the same interface so selections never care where data lives.

use crate::errors::{ObsPrepError, Result};
use async_trait::async_trait;
use ndarray::{ArrayD, Axis, Slice};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Basic interface for reading regions of a stored array
#[async_trait]
pub trait ArraySource: Send + Sync + fmt::Debug {
    /// Shape of the stored array in source axis order
    fn shape(&self) -> &[usize];

    /// Read the region `ranges` (one half-open range per axis) as `f32`,
    /// with missing values already mapped to NaN.
    async fn read_region(&self, ranges: &[Range<usize>]) -> Result<ArrayD<f32>>;
}

/// Check that `ranges` addresses a region inside `shape`.
pub fn validate_region(shape: &[usize], ranges: &[Range<usize>]) -> Result<()> {
    if ranges.len() != shape.len() {
        return Err(ObsPrepError::InvalidSelection {
            message: format!(
                "region has {} axes but the array has {}",
                ranges.len(),
                shape.len()
            ),
        });
    }
    for (axis, (range, &len)) in ranges.iter().zip(shape).enumerate() {
        if range.start > range.end || range.end > len {
            return Err(ObsPrepError::InvalidSelection {
                message: format!(
                    "range {}..{} out of bounds for axis {} of length {}",
                    range.start, range.end, axis, len
                ),
            });
        }
    }
    Ok(())
}

/// Array source backed by data already in memory
pub struct InMemorySource {
    data: ArrayD<f32>,
    reads: AtomicUsize,
}

impl InMemorySource {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self {
            data,
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of region reads served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for InMemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySource")
            .field("shape", &self.data.shape())
            .field("reads", &self.read_count())
            .finish()
    }
}

#[async_trait]
impl ArraySource for InMemorySource {
    fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    async fn read_region(&self, ranges: &[Range<usize>]) -> Result<ArrayD<f32>> {
        validate_region(self.data.shape(), ranges)?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let mut view = self.data.view();
        for (axis, range) in ranges.iter().enumerate() {
            view.slice_axis_inplace(Axis(axis), Slice::from(range.clone()));
        }
        Ok(view.to_owned())
    }
}
