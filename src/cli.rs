//! Defines command-line interface options using `clap` for the obs-prep application.

use crate::output::{OutputNames, Provenance};
use crate::pipeline::{DatasetKind, PrepRequest};
use clap::Parser;
use std::path::PathBuf;

/// Prepare standardized single-variable NetCDF files from ERA5 or IMERG
#[derive(Parser, Debug)]
#[command(
    version,
    name = "obs-prep",
    about = "Fetch, subset and resample ERA5/IMERG data into standardized NetCDF files"
)]
pub struct Args {
    /// Source dataset
    #[arg(long, value_enum)]
    pub dataset: DatasetKind,

    /// Variable to extract from the source dataset
    #[arg(long, required_unless_present = "describe")]
    pub variable: Option<String>,

    /// Comma-separated years to keep, e.g. 2020,2021
    #[arg(long, value_delimiter = ',', required_unless_present = "describe")]
    pub years: Vec<i32>,

    /// Comma-separated months to keep (1-12), defaults to all months
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u32).range(1..=12))]
    pub months: Vec<u32>,

    /// Latitude range, formatted as <start>:<stop>
    #[arg(long, value_parser = parse_range_arg, default_value = "-90:90", allow_hyphen_values = true)]
    pub lat: (f64, f64),

    /// Longitude range, formatted as <start>:<stop>
    #[arg(long, value_parser = parse_range_arg, default_value = "0:360", allow_hyphen_values = true)]
    pub lon: (f64, f64),

    /// Pressure level range in hPa, formatted as <start>:<stop>
    #[arg(long, value_parser = parse_range_arg, allow_hyphen_values = true)]
    pub lev: Option<(f64, f64)>,

    /// Resampling frequency such as 1D, 3h or 30min
    #[arg(long)]
    pub frequency: Option<String>,

    /// Output variable name (defaults to --variable)
    #[arg(long)]
    pub shortname: Option<String>,

    /// Output variable long name
    #[arg(long, default_value = "")]
    pub longname: String,

    /// Output variable units
    #[arg(long, default_value = "")]
    pub units: String,

    /// Value of the global `source` attribute (defaults to the dataset name)
    #[arg(long)]
    pub source: Option<String>,

    /// Author recorded in the history attribute
    #[arg(long, default_value = "unknown")]
    pub author: String,

    /// Author e-mail recorded in the history attribute
    #[arg(long, default_value = "unknown")]
    pub email: String,

    /// Directory the output file is written to
    #[arg(long, default_value = ".")]
    pub savedir: PathBuf,

    /// Only describe the source dataset, without writing anything
    #[arg(long)]
    pub describe: bool,

    /// Planetary Computer subscription key for IMERG token requests
    #[arg(long)]
    pub subscription_key: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Build the preparation request described by the arguments.
    /// `variable` is only absent together with `--describe`.
    pub fn to_request(&self) -> PrepRequest {
        let variable = self.variable.clone().unwrap_or_default();
        let months = if self.months.is_empty() {
            (1..=12).collect()
        } else {
            self.months.clone()
        };
        PrepRequest {
            dataset: self.dataset,
            variable: variable.clone(),
            years: self.years.clone(),
            months,
            latrange: self.lat,
            lonrange: self.lon,
            levrange: self.lev,
            frequency: self.frequency.clone(),
            names: OutputNames {
                shortname: self.shortname.clone().unwrap_or(variable),
                longname: self.longname.clone(),
                units: self.units.clone(),
            },
            provenance: Provenance {
                source: self.source.clone().unwrap_or_else(|| self.dataset.to_string()),
                author: self.author.clone(),
                email: self.email.clone(),
            },
            savedir: self.savedir.clone(),
        }
    }
}

pub fn parse_range_arg(s: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [start, stop] => {
            let start = start
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid range start '{}'", start))?;
            let stop = stop
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("Invalid range stop '{}'", stop))?;
            Ok((start, stop))
        }
        _ => Err("Invalid format: Expected '<start>:<stop>'.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_arg() {
        assert_eq!(parse_range_arg("-10:25.5"), Ok((-10.0, 25.5)));
        assert_eq!(parse_range_arg("90:-90"), Ok((90.0, -90.0)));
        assert!(parse_range_arg("10").is_err());
        assert!(parse_range_arg("a:b").is_err());
    }

    #[test]
    fn test_args_to_request_defaults() {
        let args = Args::parse_from([
            "obs-prep",
            "--dataset",
            "imerg",
            "--variable",
            "precipitationCal",
            "--years",
            "2020,2021",
            "--lat",
            "-10:10",
            "--frequency",
            "1D",
        ]);
        let request = args.to_request();
        assert_eq!(request.dataset, DatasetKind::Imerg);
        assert_eq!(request.years, vec![2020, 2021]);
        assert_eq!(request.months, (1..=12).collect::<Vec<u32>>());
        assert_eq!(request.latrange, (-10.0, 10.0));
        assert_eq!(request.lonrange, (0.0, 360.0));
        assert_eq!(request.levrange, None);
        assert_eq!(request.names.shortname, "precipitationCal");
        assert_eq!(request.provenance.source, "IMERG");
    }

    #[test]
    fn test_describe_needs_no_variable_or_years() {
        let args = Args::try_parse_from(["obs-prep", "--dataset", "era5", "--describe"]).unwrap();
        assert!(args.describe);
        assert_eq!(args.variable, None);
        assert!(args.years.is_empty());
    }

    #[test]
    fn test_variable_required_without_describe() {
        let result = Args::try_parse_from(["obs-prep", "--dataset", "era5", "--years", "2020"]);
        assert!(result.is_err());
    }
}
