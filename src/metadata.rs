//! Dataset inspection
//!
//! Summaries of dimensions, coordinates and variables of a [`Dataset`], both as
//! structured values and as printed listings for the command line.

use crate::coords::{CoordValues, Coordinate};
use crate::dataset::{Attributes, Dataset};

/// Information about a dimension
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
}

/// Structured summary of a coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateInfo {
    pub name: String,
    pub kind: String,
    pub length: usize,
    /// First and last value, formatted
    pub range: Option<(String, String)>,
}

/// Structured metadata for a data variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableMetadata {
    pub name: String,
    pub dimensions: Vec<DimensionInfo>,
    pub attributes: Attributes,
    pub total_elements: usize,
    pub estimated_size_bytes: usize,
}

/// Structured summary of a whole dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub dimensions: Vec<DimensionInfo>,
    pub coordinates: Vec<CoordinateInfo>,
    pub variables: Vec<VariableMetadata>,
    pub attributes: Attributes,
}

fn value_range(coord: &Coordinate) -> Option<(String, String)> {
    fn ends<T: ToString>(values: &[T]) -> Option<(String, String)> {
        Some((values.first()?.to_string(), values.last()?.to_string()))
    }
    match &coord.values {
        CoordValues::Float(v) => ends(v),
        CoordValues::Float32(v) => ends(v),
        CoordValues::Int(v) => ends(v),
        CoordValues::Time(v) => ends(v),
        CoordValues::CfTime { values, .. } => ends(values),
    }
}

impl DatasetSummary {
    pub fn from_dataset(ds: &Dataset) -> Self {
        let dimensions = ds
            .dims()
            .into_iter()
            .map(|d| DimensionInfo {
                name: d.to_string(),
                length: ds.dim_len(d).unwrap_or(0),
            })
            .collect();

        let coordinates = ds
            .coords()
            .iter()
            .map(|c| CoordinateInfo {
                name: c.name.clone(),
                kind: c.values.kind().to_string(),
                length: c.len(),
                range: value_range(c),
            })
            .collect();

        let variables = ds
            .variables()
            .iter()
            .map(|v| {
                let dimensions: Vec<DimensionInfo> = v
                    .dims
                    .iter()
                    .zip(v.shape())
                    .map(|(name, length)| DimensionInfo {
                        name: name.clone(),
                        length,
                    })
                    .collect();
                let total_elements: usize = dimensions.iter().map(|d| d.length).product();
                VariableMetadata {
                    name: v.name.clone(),
                    dimensions,
                    attributes: v.attrs.clone(),
                    total_elements,
                    // f32 in memory and on disk
                    estimated_size_bytes: total_elements * 4,
                }
            })
            .collect();

        Self {
            dimensions,
            coordinates,
            variables,
            attributes: ds.attrs.clone(),
        }
    }
}

fn format_size(total_bytes: usize) -> String {
    if total_bytes < 1024 {
        format!("{} bytes", total_bytes)
    } else if total_bytes < 1024 * 1024 {
        format!("{:.2} KB", total_bytes as f64 / 1024.0)
    } else if total_bytes < 1024 * 1024 * 1024 {
        format!("{:.2} MB", total_bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", total_bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn print_attributes(attrs: &Attributes, indent: &str) {
    for (name, value) in attrs {
        match value {
            serde_json::Value::String(s) => println!("{}• {}: \"{}\"", indent, name, s),
            other => println!("{}• {}: {}", indent, name, other),
        }
    }
}

/// Print dimensions, coordinates, variables and global attributes of a dataset.
pub fn describe_dataset(ds: &Dataset) -> DatasetSummary {
    let summary = DatasetSummary::from_dataset(ds);

    println!("\n Dimensions");
    println!("==============");
    if summary.dimensions.is_empty() {
        println!("   (No dimensions found)");
    }
    for dim in &summary.dimensions {
        println!("    {} = {}", dim.name, dim.length);
    }

    println!("\n Coordinates");
    println!("===============");
    for coord in &summary.coordinates {
        match &coord.range {
            Some((first, last)) => println!(
                "    {} ({}): {} values, {} .. {}",
                coord.name, coord.kind, coord.length, first, last
            ),
            None => println!("    {} ({}): empty", coord.name, coord.kind),
        }
    }

    println!("\n Variables");
    println!("=============");
    if summary.variables.is_empty() {
        println!("   (No variables found)");
    }
    for var in &summary.variables {
        let dims: Vec<&str> = var.dimensions.iter().map(|d| d.name.as_str()).collect();
        let shape: Vec<String> = var.dimensions.iter().map(|d| d.length.to_string()).collect();
        if dims.is_empty() {
            println!("    {}: scalar", var.name);
        } else {
            println!("    {}: [{}] = ({})", var.name, dims.join(", "), shape.join(" × "));
        }
        println!("      size: {}", format_size(var.estimated_size_bytes));
        print_attributes(&var.attributes, "      ");
    }

    if !summary.attributes.is_empty() {
        println!("\n Global Attributes");
        println!("=====================");
        print_attributes(&summary.attributes, "   ");
    }

    summary
}
