//! Dimension coordinates and label-based index lookup

use crate::dataset::Attributes;
use crate::errors::{ObsPrepError, Result};
use crate::time::{Calendar, CfDateTime};
use chrono::NaiveDateTime;
use std::cmp::Ordering;

/// Values of a dimension coordinate
#[derive(Debug, Clone, PartialEq)]
pub enum CoordValues {
    Float(Vec<f64>),
    Float32(Vec<f32>),
    Int(Vec<i64>),
    /// Standard calendar timestamps
    Time(Vec<NaiveDateTime>),
    /// Dates in a calendar that ordinary timestamps cannot represent directly
    CfTime {
        values: Vec<CfDateTime>,
        calendar: Calendar,
    },
}

impl CoordValues {
    pub fn len(&self) -> usize {
        match self {
            CoordValues::Float(v) => v.len(),
            CoordValues::Float32(v) => v.len(),
            CoordValues::Int(v) => v.len(),
            CoordValues::Time(v) => v.len(),
            CoordValues::CfTime { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CoordValues::Float(_) => "float64",
            CoordValues::Float32(_) => "float32",
            CoordValues::Int(_) => "int64",
            CoordValues::Time(_) => "datetime",
            CoordValues::CfTime { .. } => "cftime",
        }
    }

    /// Numeric view of the values, `None` for time coordinates
    pub fn as_f64(&self) -> Option<Vec<f64>> {
        match self {
            CoordValues::Float(v) => Some(v.clone()),
            CoordValues::Float32(v) => Some(v.iter().map(|&x| x as f64).collect()),
            CoordValues::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            CoordValues::Time(_) | CoordValues::CfTime { .. } => None,
        }
    }

    pub fn as_times(&self) -> Option<&[NaiveDateTime]> {
        match self {
            CoordValues::Time(v) => Some(v),
            _ => None,
        }
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| v[i].clone()).collect()
        }
        match self {
            CoordValues::Float(v) => CoordValues::Float(pick(v, indices)),
            CoordValues::Float32(v) => CoordValues::Float32(pick(v, indices)),
            CoordValues::Int(v) => CoordValues::Int(pick(v, indices)),
            CoordValues::Time(v) => CoordValues::Time(pick(v, indices)),
            CoordValues::CfTime { values, calendar } => CoordValues::CfTime {
                values: pick(values, indices),
                calendar: *calendar,
            },
        }
    }

    /// Stable ascending sort order; NaN sorts last
    pub fn argsort(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        match self {
            CoordValues::Time(v) => order.sort_by_key(|&i| v[i]),
            CoordValues::CfTime { values, .. } => order.sort_by_key(|&i| values[i]),
            CoordValues::Int(v) => order.sort_by_key(|&i| v[i]),
            _ => {
                let v = self.as_f64().unwrap_or_default();
                order.sort_by(|&a, &b| nan_last(v[a], v[b]));
            }
        }
        order
    }
}

fn nan_last(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// A named dimension coordinate with its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub values: CoordValues,
    pub attrs: Attributes,
}

impl Coordinate {
    pub fn new(name: &str, values: CoordValues) -> Self {
        Self {
            name: name.to_string(),
            values,
            attrs: Attributes::new(),
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            values: self.values.select(indices),
            attrs: self.attrs.clone(),
        }
    }

    /// Positions selected by the inclusive label slice `start..=stop`.
    ///
    /// An ascending index keeps `start <= v <= stop`, a descending index keeps
    /// `start >= v >= stop`. Bounds outside the index simply select less.
    pub fn slice_indexer(&self, start: f64, stop: f64) -> Result<Vec<usize>> {
        let values = self.values.as_f64().ok_or_else(|| ObsPrepError::InvalidSelection {
            message: format!("coordinate '{}' is not numeric", self.name),
        })?;

        let ascending = values.windows(2).all(|w| w[0] <= w[1]);
        let descending = values.windows(2).all(|w| w[0] >= w[1]);
        let keep: Box<dyn Fn(f64) -> bool> = if ascending {
            Box::new(move |v| v >= start && v <= stop)
        } else if descending {
            Box::new(move |v| v <= start && v >= stop)
        } else {
            return Err(ObsPrepError::InvalidSelection {
                message: format!(
                    "coordinate '{}' is not monotonic, label slicing is undefined",
                    self.name
                ),
            });
        };

        Ok(values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| keep(v))
            .map(|(i, _)| i)
            .collect())
    }
}
