//! Labeled multi-dimensional dataset
//!
//! A [`Dataset`] holds ordered named dimensions, their coordinates, lazy data
//! variables and dataset-level attributes. Every transformation returns a new
//! dataset; variable data stays lazy and only its index maps change.

use crate::coords::{CoordValues, Coordinate};
use crate::errors::{ObsPrepError, Result};
use crate::lazy::LazyArray;

/// Attribute map, stored the same way Zarr `.zattrs` documents are
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A named lazy variable with ordered dimensions
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub dims: Vec<String>,
    pub attrs: Attributes,
    pub data: LazyArray,
}

impl Variable {
    pub fn new(name: &str, dims: &[&str], data: LazyArray) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(ObsPrepError::InvalidSelection {
                message: format!(
                    "variable '{}' has {} dimension names for {}-d data",
                    name,
                    dims.len(),
                    data.ndim()
                ),
            });
        }
        Ok(Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            attrs: Attributes::new(),
            data,
        })
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data.shape()
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// String attribute lookup
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }
}

/// One variable together with the coordinates of its dimensions
#[derive(Debug, Clone)]
pub struct DataArray {
    pub variable: Variable,
    pub coords: Vec<Coordinate>,
}

impl DataArray {
    pub fn name(&self) -> &str {
        &self.variable.name
    }

    pub fn dims(&self) -> &[String] {
        &self.variable.dims
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.variable.axis_of(dim).is_some()
    }

    pub fn coord(&self, dim: &str) -> Option<&Coordinate> {
        self.coords.iter().find(|c| c.name == dim)
    }
}

/// Collection of variables sharing named, coordinate-valued dimensions
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    dims: Vec<(String, usize)>,
    coords: Vec<Coordinate>,
    variables: Vec<Variable>,
    pub attrs: Attributes,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    fn register_dim(&mut self, name: &str, len: usize) -> Result<()> {
        match self.dims.iter().find(|(d, _)| d == name) {
            Some((_, existing)) if *existing != len => Err(ObsPrepError::InvalidSelection {
                message: format!(
                    "dimension '{}' has length {} but {} was given",
                    name, existing, len
                ),
            }),
            Some(_) => Ok(()),
            None => {
                self.dims.push((name.to_string(), len));
                Ok(())
            }
        }
    }

    /// Add (or replace) a dimension coordinate
    pub fn add_coord(&mut self, coord: Coordinate) -> Result<()> {
        self.register_dim(&coord.name, coord.len())?;
        match self.coords.iter_mut().find(|c| c.name == coord.name) {
            Some(existing) => *existing = coord,
            None => self.coords.push(coord),
        }
        Ok(())
    }

    /// Add (or replace) a data variable
    pub fn add_variable(&mut self, variable: Variable) -> Result<()> {
        for (dim, len) in variable.dims.iter().zip(variable.shape()) {
            self.register_dim(dim, len)?;
        }
        match self.variables.iter_mut().find(|v| v.name == variable.name) {
            Some(existing) => *existing = variable,
            None => self.variables.push(variable),
        }
        Ok(())
    }

    pub fn dims(&self) -> Vec<&str> {
        self.dims.iter().map(|(d, _)| d.as_str()).collect()
    }

    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dims.iter().find(|(d, _)| d == dim).map(|(_, n)| *n)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.dim_len(dim).is_some()
    }

    pub fn coords(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn coord(&self, name: &str) -> Option<&Coordinate> {
        self.coords.iter().find(|c| c.name == name)
    }

    fn require_coord(&self, name: &str) -> Result<&Coordinate> {
        self.coord(name).ok_or_else(|| ObsPrepError::DimensionNotFound {
            var: "dataset".to_string(),
            dim: name.to_string(),
        })
    }

    /// Replace the values of an existing coordinate, keeping its length and attributes
    pub fn set_coord_values(&mut self, name: &str, values: CoordValues) -> Result<()> {
        let coord = self
            .coords
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| ObsPrepError::DimensionNotFound {
                var: "dataset".to_string(),
                dim: name.to_string(),
            })?;
        if coord.len() != values.len() {
            return Err(ObsPrepError::InvalidSelection {
                message: format!(
                    "coordinate '{}' has {} values but {} were given",
                    name,
                    coord.len(),
                    values.len()
                ),
            });
        }
        coord.values = values;
        Ok(())
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| ObsPrepError::VariableNotFound {
                var: name.to_string(),
            })
    }

    /// Extract one variable with the coordinates of its dimensions
    pub fn data_array(&self, name: &str) -> Result<DataArray> {
        let variable = self.variable(name)?.clone();
        let coords = variable
            .dims
            .iter()
            .filter_map(|d| self.coord(d).cloned())
            .collect();
        Ok(DataArray { variable, coords })
    }

    /// Keep only the named variables
    pub fn select_variables(&self, names: &[&str]) -> Result<Self> {
        let mut out = Dataset {
            dims: Vec::new(),
            coords: Vec::new(),
            variables: Vec::new(),
            attrs: self.attrs.clone(),
        };
        for name in names {
            out.add_variable(self.variable(name)?.clone())?;
        }
        let kept: Vec<String> = out.dims.iter().map(|(d, _)| d.clone()).collect();
        for coord in self.coords.iter().filter(|c| kept.contains(&c.name)) {
            out.add_coord(coord.clone())?;
        }
        let order: Vec<&str> = self.dims().into_iter().filter(|d| out.has_dim(d)).collect();
        out.dims.sort_by_key(|(d, _)| order.iter().position(|o| *o == d.as_str()));
        Ok(out)
    }

    /// Rename dimensions, coordinates and variables. Every old name must exist.
    pub fn rename(&self, names: &[(&str, &str)]) -> Result<Self> {
        for (from, _) in names {
            let known = self.has_dim(from)
                || self.coord(from).is_some()
                || self.variables.iter().any(|v| v.name == *from);
            if !known {
                return Err(ObsPrepError::Generic(format!(
                    "cannot rename '{}' because it is not a variable or dimension in this dataset",
                    from
                )));
            }
        }
        let map = |name: &str| -> String {
            names
                .iter()
                .find(|(from, _)| *from == name)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| name.to_string())
        };

        let mut out = self.clone();
        for (dim, _) in out.dims.iter_mut() {
            *dim = map(dim);
        }
        for coord in out.coords.iter_mut() {
            coord.name = map(&coord.name);
        }
        for var in out.variables.iter_mut() {
            var.name = map(&var.name);
            for dim in var.dims.iter_mut() {
                *dim = map(dim);
            }
        }
        Ok(out)
    }

    /// Keep the given positions of `dim`, in the given order
    pub fn isel(&self, dim: &str, positions: &[usize]) -> Result<Self> {
        let groups: Vec<Vec<usize>> = positions.iter().map(|&p| vec![p]).collect();
        self.group_dim(dim, &groups)
    }

    /// Merge positions of `dim` into groups, as used by resampling. Coordinates
    /// of `dim` take the value of each group's first member.
    pub fn group_dim(&self, dim: &str, groups: &[Vec<usize>]) -> Result<Self> {
        let len = self.dim_len(dim).ok_or_else(|| ObsPrepError::DimensionNotFound {
            var: "dataset".to_string(),
            dim: dim.to_string(),
        })?;
        if let Some(bad) = groups.iter().flatten().find(|&&p| p >= len) {
            return Err(ObsPrepError::InvalidSelection {
                message: format!(
                    "position {} out of range for dimension '{}' of length {}",
                    bad, dim, len
                ),
            });
        }

        let mut out = self.clone();
        for (d, n) in out.dims.iter_mut() {
            if d == dim {
                *n = groups.len();
            }
        }
        for var in out.variables.iter_mut() {
            if let Some(axis) = var.axis_of(dim) {
                var.data = var.data.group(axis, groups)?;
            }
        }
        let firsts: Vec<usize> = groups.iter().filter_map(|g| g.first().copied()).collect();
        if let Some(coord) = self.coord(dim) {
            out.add_coord_unchecked(coord.select(&firsts));
        }
        Ok(out)
    }

    fn add_coord_unchecked(&mut self, coord: Coordinate) {
        match self.coords.iter_mut().find(|c| c.name == coord.name) {
            Some(existing) => *existing = coord,
            None => self.coords.push(coord),
        }
    }

    /// Sort ascending (stable) along each of the given dimensions by its coordinate
    pub fn sortby(&self, dims: &[&str]) -> Result<Self> {
        let mut out = self.clone();
        for dim in dims {
            let order = out.require_coord(dim)?.values.argsort();
            let is_sorted = order.iter().enumerate().all(|(k, &i)| k == i);
            if !is_sorted {
                out = out.isel(dim, &order)?;
            }
        }
        Ok(out)
    }

    /// Reorder dimensions: the given ones first, the rest after them in their
    /// existing order. Every variable is transposed consistently.
    pub fn transpose(&self, leading: &[&str]) -> Result<Self> {
        for dim in leading {
            if !self.has_dim(dim) {
                return Err(ObsPrepError::DimensionNotFound {
                    var: "dataset".to_string(),
                    dim: dim.to_string(),
                });
            }
        }
        let mut order: Vec<String> = leading.iter().map(|d| d.to_string()).collect();
        for dim in self.dims() {
            if !order.iter().any(|o| o == dim) {
                order.push(dim.to_string());
            }
        }

        let mut out = self.clone();
        out.dims.sort_by_key(|(d, _)| order.iter().position(|o| o == d));
        for var in out.variables.iter_mut() {
            let mut axes: Vec<usize> = (0..var.dims.len()).collect();
            axes.sort_by_key(|&a| order.iter().position(|o| *o == var.dims[a]));
            var.data = var.data.permute(&axes)?;
            var.dims = axes.iter().map(|&a| var.dims[a].clone()).collect();
        }
        Ok(out)
    }
}
