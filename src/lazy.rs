//! Lazy arrays
//!
//! A [`LazyArray`] records which source indices each output position reads
//! and in which order the axes come out, without touching the data. Selection,
//! sorting, transposition and grouping only rewrite those index maps. Data is
//! pulled block by block through [`LazyArray::blocks`] when it is finally needed.

use crate::data_source::{ArraySource, InMemorySource};
use crate::errors::{ObsPrepError, Result};
use futures::{Stream, TryStreamExt};
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on elements fetched for one block
const MAX_BLOCK_ELEMENTS: usize = 1 << 24;

/// A materialized block of a lazy array, starting at `offset` along axis 0
#[derive(Debug, Clone)]
pub struct Block {
    pub offset: usize,
    pub data: ArrayD<f32>,
}

pub type BlockStream = Pin<Box<dyn Stream<Item = Result<Block>> + Send + 'static>>;

/// Deferred view of an [`ArraySource`]
#[derive(Debug, Clone)]
pub struct LazyArray {
    source: Arc<dyn ArraySource>,
    /// Per source axis, the candidate source indices of every selected position.
    /// The first candidate wins; later ones only fill NaN cells.
    selection: Vec<Vec<Vec<usize>>>,
    /// Output axis `i` reads source axis `order[i]`.
    order: Vec<usize>,
}

impl LazyArray {
    pub fn new(source: Arc<dyn ArraySource>) -> Self {
        let selection = source
            .shape()
            .iter()
            .map(|&len| (0..len).map(|i| vec![i]).collect())
            .collect();
        let order = (0..source.shape().len()).collect();
        Self {
            source,
            selection,
            order,
        }
    }

    /// Wrap data that is already in memory
    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self::new(Arc::new(InMemorySource::new(data)))
    }

    pub fn source(&self) -> &Arc<dyn ArraySource> {
        &self.source
    }

    pub fn ndim(&self) -> usize {
        self.order.len()
    }

    /// Shape in output axis order
    pub fn shape(&self) -> Vec<usize> {
        self.order.iter().map(|&s| self.selection[s].len()).collect()
    }

    fn check_axis(&self, axis: usize) -> Result<usize> {
        self.order
            .get(axis)
            .copied()
            .ok_or_else(|| ObsPrepError::InvalidSelection {
                message: format!("axis {} out of range for {}-d array", axis, self.ndim()),
            })
    }

    /// Keep the given positions of output axis `axis`, in the given order.
    pub fn select(&self, axis: usize, positions: &[usize]) -> Result<Self> {
        let groups: Vec<Vec<usize>> = positions.iter().map(|&p| vec![p]).collect();
        self.group(axis, &groups)
    }

    /// Merge positions of output axis `axis`: every entry of `groups` becomes
    /// one output position whose candidates are those of its members, in order.
    pub fn group(&self, axis: usize, groups: &[Vec<usize>]) -> Result<Self> {
        let source_axis = self.check_axis(axis)?;
        let current = &self.selection[source_axis];

        let mut merged = Vec::with_capacity(groups.len());
        for members in groups {
            if members.is_empty() {
                return Err(ObsPrepError::InvalidSelection {
                    message: "empty group".to_string(),
                });
            }
            let mut candidates = Vec::new();
            for &p in members {
                let existing = current.get(p).ok_or_else(|| ObsPrepError::InvalidSelection {
                    message: format!(
                        "position {} out of range for axis {} of length {}",
                        p,
                        axis,
                        current.len()
                    ),
                })?;
                candidates.extend_from_slice(existing);
            }
            merged.push(candidates);
        }

        let mut out = self.clone();
        out.selection[source_axis] = merged;
        Ok(out)
    }

    /// Reorder output axes: new axis `i` is current axis `axes[i]`.
    pub fn permute(&self, axes: &[usize]) -> Result<Self> {
        let mut seen = vec![false; self.ndim()];
        for &a in axes {
            if a >= self.ndim() || seen[a] {
                return Err(ObsPrepError::InvalidSelection {
                    message: format!("{:?} is not a permutation of {} axes", axes, self.ndim()),
                });
            }
            seen[a] = true;
        }
        if axes.len() != self.ndim() {
            return Err(ObsPrepError::InvalidSelection {
                message: format!("{:?} is not a permutation of {} axes", axes, self.ndim()),
            });
        }

        let mut out = self.clone();
        out.order = axes.iter().map(|&a| self.order[a]).collect();
        Ok(out)
    }

    /// Split axis 0 into runs whose first candidates are consecutive source
    /// indices, capped so a single fetch stays bounded.
    fn block_ranges(&self) -> Vec<Range<usize>> {
        if self.ndim() == 0 {
            return vec![0..0];
        }
        let shape = self.shape();
        let row_elements: usize = shape[1..].iter().product::<usize>().max(1);
        let max_rows = (MAX_BLOCK_ELEMENTS / row_elements).max(1);
        let groups = &self.selection[self.order[0]];

        let mut ranges = Vec::new();
        let mut start = 0;
        for p in 1..=groups.len() {
            let breaks = p == groups.len()
                || groups[p][0] != groups[p - 1][0] + 1
                || p - start >= max_rows;
            if breaks {
                ranges.push(start..p);
                start = p;
            }
        }
        ranges
    }

    /// Fetch the cells addressed by one index list per output axis.
    async fn fetch(&self, indices: &[Vec<usize>]) -> Result<ArrayD<f32>> {
        let out_shape: Vec<usize> = indices.iter().map(Vec::len).collect();
        if out_shape.iter().any(|&n| n == 0) {
            return Ok(ArrayD::zeros(IxDyn(&out_shape)));
        }

        let ndim = self.ndim();
        let mut source_indices = vec![Vec::new(); ndim];
        for (out_axis, &source_axis) in self.order.iter().enumerate() {
            source_indices[source_axis] = indices[out_axis].clone();
        }

        let ranges: Vec<Range<usize>> = source_indices
            .iter()
            .map(|idx| {
                let lo = idx.iter().copied().min().unwrap_or(0);
                let hi = idx.iter().copied().max().unwrap_or(0);
                lo..hi + 1
            })
            .collect();
        debug!("Reading region {:?} from {:?}", ranges, self.source);
        let mut region = self.source.read_region(&ranges).await?;

        for (axis, (idx, range)) in source_indices.iter().zip(&ranges).enumerate() {
            let is_identity = idx.len() == range.len()
                && idx.iter().enumerate().all(|(k, &i)| i == range.start + k);
            if !is_identity {
                let relative: Vec<usize> = idx.iter().map(|&i| i - range.start).collect();
                region = region.select(Axis(axis), &relative);
            }
        }

        Ok(region
            .permuted_axes(IxDyn(&self.order))
            .as_standard_layout()
            .into_owned())
    }

    /// Materialize output positions `rows` of axis 0 (everything for 0-d arrays).
    async fn materialize(&self, rows: Range<usize>) -> Result<ArrayD<f32>> {
        let groups: Vec<&[Vec<usize>]> = self
            .order
            .iter()
            .enumerate()
            .map(|(out_axis, &s)| {
                let all = self.selection[s].as_slice();
                if out_axis == 0 {
                    &all[rows.clone()]
                } else {
                    all
                }
            })
            .collect();

        let primary: Vec<Vec<usize>> = groups
            .iter()
            .map(|g| g.iter().map(|c| c[0]).collect())
            .collect();
        let mut data = self.fetch(&primary).await?;

        // Grouped positions fall back to later candidates for NaN cells.
        let Some(grouped_axis) = groups.iter().position(|g| g.iter().any(|c| c.len() > 1)) else {
            return Ok(data);
        };
        let depth = groups[grouped_axis].iter().map(Vec::len).max().unwrap_or(1);
        for rank in 1..depth {
            for (p, candidates) in groups[grouped_axis].iter().enumerate() {
                if candidates.len() <= rank {
                    continue;
                }
                let has_missing = data
                    .index_axis(Axis(grouped_axis), p)
                    .iter()
                    .any(|v| v.is_nan());
                if !has_missing {
                    continue;
                }

                let mut indices = primary.clone();
                indices[grouped_axis] = vec![candidates[rank]];
                let fallback = self.fetch(&indices).await?;
                let fallback = fallback.index_axis(Axis(grouped_axis), 0);
                let mut target = data.index_axis_mut(Axis(grouped_axis), p);
                for (cell, &value) in target.iter_mut().zip(fallback.iter()) {
                    if cell.is_nan() {
                        *cell = value;
                    }
                }
            }
        }
        Ok(data)
    }

    /// Pull-based stream of blocks along axis 0; nothing is read until polled.
    pub fn blocks(&self) -> BlockStream {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            for rows in this.block_ranges() {
                let offset = rows.start;
                match this.materialize(rows).await {
                    Ok(data) => yield Ok(Block { offset, data }),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        })
    }

    /// Materialize the whole array
    pub async fn load(&self) -> Result<ArrayD<f32>> {
        let mut out = ArrayD::<f32>::zeros(IxDyn(&self.shape()));
        let mut blocks = self.blocks();
        while let Some(block) = blocks.try_next().await? {
            if self.ndim() == 0 {
                out.assign(&block.data);
            } else {
                let rows = block.data.shape()[0];
                out.slice_axis_mut(Axis(0), Slice::from(block.offset..block.offset + rows))
                    .assign(&block.data);
            }
        }
        Ok(out)
    }
}
