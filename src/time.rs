//! CF time handling
//!
//! Decoding of `"<unit> since <date>"` offsets in the CF calendars, conversion
//! of non-standard calendar dates to ordinary timestamps, encoding of
//! timestamps for NetCDF output and flooring to fixed frequencies.

use crate::errors::{ObsPrepError, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

const CUMULATIVE_DAYS: [i64; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];
const CUMULATIVE_DAYS_LEAP: [i64; 13] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335, 366];

/// CF calendars understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    Standard,
    ProlepticGregorian,
    Julian,
    NoLeap,
    AllLeap,
    Day360,
}

impl Calendar {
    /// Parse a CF `calendar` attribute; a missing attribute means `standard`.
    pub fn parse(name: Option<&str>) -> Result<Self> {
        let name = name.map(|s| s.trim().to_ascii_lowercase());
        match name.as_deref() {
            None | Some("") | Some("standard") | Some("gregorian") => Ok(Calendar::Standard),
            Some("proleptic_gregorian") => Ok(Calendar::ProlepticGregorian),
            Some("julian") => Ok(Calendar::Julian),
            Some("noleap") | Some("365_day") => Ok(Calendar::NoLeap),
            Some("all_leap") | Some("366_day") => Ok(Calendar::AllLeap),
            Some("360_day") => Ok(Calendar::Day360),
            Some(other) => Err(ObsPrepError::TimeDecodeError(format!(
                "unsupported calendar '{}'",
                other
            ))),
        }
    }

    /// Whether dates in this calendar map directly onto ordinary timestamps
    pub fn is_standard(self) -> bool {
        matches!(self, Calendar::Standard | Calendar::ProlepticGregorian)
    }

    pub fn name(self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::Julian => "julian",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
        }
    }

    /// Day count of a date, counted from an arbitrary calendar-specific origin.
    fn day_number(self, year: i64, month: u32, day: u32) -> i64 {
        let m = month as i64;
        let d = day as i64;
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                let y = if m <= 2 { year - 1 } else { year };
                let era = y.div_euclid(400);
                let yoe = y - era * 400;
                let mp = (m + 9) % 12;
                let doy = (153 * mp + 2) / 5 + d - 1;
                let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
                era * 146_097 + doe - 719_468
            }
            Calendar::Julian => {
                let a = (14 - m) / 12;
                let y = year + 4800 - a;
                let mm = m + 12 * a - 3;
                d + (153 * mm + 2) / 5 + 365 * y + y.div_euclid(4) - 32_083
            }
            Calendar::NoLeap => year * 365 + CUMULATIVE_DAYS[(m - 1) as usize] + d - 1,
            Calendar::AllLeap => year * 366 + CUMULATIVE_DAYS_LEAP[(m - 1) as usize] + d - 1,
            Calendar::Day360 => year * 360 + (m - 1) * 30 + d - 1,
        }
    }

    /// Inverse of [`Calendar::day_number`]
    fn date_from_day_number(self, days: i64) -> (i64, u32, u32) {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                let z = days + 719_468;
                let era = z.div_euclid(146_097);
                let doe = z - era * 146_097;
                let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
                let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
                let mp = (5 * doy + 2) / 153;
                let d = doy - (153 * mp + 2) / 5 + 1;
                let m = if mp < 10 { mp + 3 } else { mp - 9 };
                let y = yoe + era * 400 + if m <= 2 { 1 } else { 0 };
                (y, m as u32, d as u32)
            }
            Calendar::Julian => {
                let c = days + 32_082;
                let d = (4 * c + 3).div_euclid(1461);
                let e = c - (1461 * d).div_euclid(4);
                let m = (5 * e + 2) / 153;
                let day = e - (153 * m + 2) / 5 + 1;
                let month = m + 3 - 12 * (m / 10);
                let year = d - 4800 + m / 10;
                (year, month as u32, day as u32)
            }
            Calendar::NoLeap => split_fixed_year(days, 365, &CUMULATIVE_DAYS),
            Calendar::AllLeap => split_fixed_year(days, 366, &CUMULATIVE_DAYS_LEAP),
            Calendar::Day360 => {
                let year = days.div_euclid(360);
                let doy = days.rem_euclid(360);
                (year, (doy / 30 + 1) as u32, (doy % 30 + 1) as u32)
            }
        }
    }
}

fn split_fixed_year(days: i64, year_length: i64, cumulative: &[i64; 13]) -> (i64, u32, u32) {
    let year = days.div_euclid(year_length);
    let doy = days.rem_euclid(year_length);
    let month = cumulative.iter().rposition(|&c| c <= doy).unwrap_or(0);
    (year, month as u32 + 1, (doy - cumulative[month] + 1) as u32)
}

/// A calendar date-time whose fields are only meaningful in its calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CfDateTime {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}

impl CfDateTime {
    pub fn new(year: i64, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            microsecond: 0,
        }
    }

    fn time_of_day_micros(&self) -> i64 {
        ((self.hour as i64 * 60 + self.minute as i64) * 60 + self.second as i64) * MICROS_PER_SECOND
            + self.microsecond as i64
    }

    fn from_total_micros(calendar: Calendar, total: i64) -> Self {
        let (year, month, day) = calendar.date_from_day_number(total.div_euclid(MICROS_PER_DAY));
        let tod = total.rem_euclid(MICROS_PER_DAY);
        let seconds = tod / MICROS_PER_SECOND;
        Self {
            year,
            month,
            day,
            hour: (seconds / 3600) as u32,
            minute: (seconds / 60 % 60) as u32,
            second: (seconds % 60) as u32,
            microsecond: (tod % MICROS_PER_SECOND) as u32,
        }
    }

    /// Reinterpret the same calendar fields as an ordinary timestamp.
    ///
    /// Fails for dates that do not exist in the proleptic Gregorian calendar
    /// (for example February 30 of a 360-day calendar).
    pub fn to_naive(&self) -> Result<NaiveDateTime> {
        i32::try_from(self.year)
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, self.month, self.day))
            .and_then(|d| d.and_hms_micro_opt(self.hour, self.minute, self.second, self.microsecond))
            .ok_or_else(|| {
                ObsPrepError::TimeDecodeError(format!(
                    "{} cannot be represented as a standard calendar timestamp",
                    self
                ))
            })
    }

    pub fn from_naive(t: &NaiveDateTime) -> Self {
        Self {
            year: t.year() as i64,
            month: t.month(),
            day: t.day(),
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
            microsecond: t.nanosecond() / 1000,
        }
    }
}

impl fmt::Display for CfDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Parsed `"<unit> since <reference>"` string
#[derive(Debug, Clone, PartialEq)]
pub struct CfUnits {
    pub unit_micros: i64,
    pub reference: CfDateTime,
}

impl CfUnits {
    pub fn parse(units: &str) -> Result<Self> {
        let bad = || ObsPrepError::TimeDecodeError(format!("invalid time units '{}'", units));
        let lower = units.to_ascii_lowercase();
        let idx = lower.find(" since ").ok_or_else(bad)?;
        let unit_micros = unit_to_micros(lower[..idx].trim()).ok_or_else(bad)?;
        let reference = parse_reference(&units[idx + " since ".len()..]).ok_or_else(bad)?;
        Ok(Self {
            unit_micros,
            reference,
        })
    }

    /// Whether a units string looks like CF time units
    pub fn is_time_units(units: &str) -> bool {
        Self::parse(units).is_ok()
    }
}

fn unit_to_micros(unit: &str) -> Option<i64> {
    match unit {
        "days" | "day" | "d" => Some(MICROS_PER_DAY),
        "hours" | "hour" | "hrs" | "hr" | "h" => Some(3600 * MICROS_PER_SECOND),
        "minutes" | "minute" | "mins" | "min" => Some(60 * MICROS_PER_SECOND),
        "seconds" | "second" | "secs" | "sec" | "s" => Some(MICROS_PER_SECOND),
        "milliseconds" | "millisecond" | "msec" | "ms" => Some(1000),
        "microseconds" | "microsecond" | "usec" | "us" => Some(1),
        _ => None,
    }
}

fn parse_reference(text: &str) -> Option<CfDateTime> {
    let cleaned = text.trim().replace('T', " ");
    let mut parts = cleaned.split_whitespace();
    let date = parts.next()?;
    let time = parts.next().map(|t| t.trim_end_matches('Z'));

    let (sign, date) = match date.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, date),
    };
    let mut fields = date.split('-');
    let year = sign * fields.next()?.parse::<i64>().ok()?;
    let month = fields.next().map_or(Some(1), |m| m.parse::<u32>().ok())?;
    let day = fields.next().map_or(Some(1), |d| d.parse::<u32>().ok())?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let mut reference = CfDateTime::new(year, month, day, 0, 0, 0);
    if let Some(time) = time.filter(|t| t.contains(':')) {
        let mut hms = time.split(':');
        reference.hour = hms.next()?.parse().ok()?;
        reference.minute = hms.next().map_or(Some(0), |m| m.parse().ok())?;
        let seconds: f64 = hms.next().map_or(Some(0.0), |s| s.parse().ok())?;
        let micros = (seconds * 1e6).round() as u64;
        reference.second = (micros / 1_000_000) as u32;
        reference.microsecond = (micros % 1_000_000) as u32;
    }
    Some(reference)
}

/// Decode numeric CF time offsets into calendar date-times.
pub fn decode_cf_times(values: &[f64], units: &str, calendar: Calendar) -> Result<Vec<CfDateTime>> {
    let units = CfUnits::parse(units)?;
    let reference = units.reference;
    let origin = calendar.day_number(reference.year, reference.month, reference.day) * MICROS_PER_DAY
        + reference.time_of_day_micros();

    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                return Err(ObsPrepError::TimeDecodeError(format!(
                    "non-finite time offset {}",
                    v
                )));
            }
            let offset = (v * units.unit_micros as f64).round() as i64;
            Ok(CfDateTime::from_total_micros(calendar, origin + offset))
        })
        .collect()
}

/// Convert calendar date-times to ordinary timestamps keeping their fields.
pub fn cf_to_datetimes(values: &[CfDateTime]) -> Result<Vec<NaiveDateTime>> {
    values.iter().map(CfDateTime::to_naive).collect()
}

/// Encode timestamps as integer offsets plus a CF units string.
///
/// The reference is the first timestamp and the unit is the coarsest one that
/// represents every offset exactly.
pub fn encode_times(times: &[NaiveDateTime]) -> Result<(Vec<i64>, String)> {
    let Some(first) = times.first() else {
        return Ok((Vec::new(), "days since 1970-01-01".to_string()));
    };
    let deltas = times
        .iter()
        .map(|t| {
            (*t - *first).num_microseconds().ok_or_else(|| {
                ObsPrepError::TimeDecodeError(format!(
                    "offset of {} from {} does not fit in microseconds",
                    t, first
                ))
            })
        })
        .collect::<Result<Vec<i64>>>()?;

    const UNITS: [(&str, i64); 6] = [
        ("days", MICROS_PER_DAY),
        ("hours", 3600 * MICROS_PER_SECOND),
        ("minutes", 60 * MICROS_PER_SECOND),
        ("seconds", MICROS_PER_SECOND),
        ("milliseconds", 1000),
        ("microseconds", 1),
    ];
    let (name, micros) = UNITS
        .iter()
        .copied()
        .find(|(_, micros)| deltas.iter().all(|d| d % micros == 0))
        .unwrap_or(("microseconds", 1));

    let reference = if first.time() == chrono::NaiveTime::MIN {
        first.format("%Y-%m-%d").to_string()
    } else {
        first.format("%Y-%m-%d %H:%M:%S").to_string()
    };
    Ok((
        deltas.into_iter().map(|d| d / micros).collect(),
        format!("{} since {}", name, reference),
    ))
}

/// A fixed resampling frequency such as `1D`, `3h` or `30min`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    micros: i64,
}

impl Frequency {
    /// Frequency of `micros` microseconds; must be positive.
    pub fn from_micros(micros: i64) -> Result<Self> {
        if micros <= 0 {
            return Err(ObsPrepError::InvalidFrequency {
                frequency: format!("{}us", micros),
            });
        }
        Ok(Self { micros })
    }

    pub fn micros(&self) -> i64 {
        self.micros
    }

    /// Round a timestamp down to the frequency boundary counted from the Unix epoch.
    pub fn floor(&self, t: &NaiveDateTime) -> Result<NaiveDateTime> {
        let micros = t.and_utc().timestamp_micros();
        let floored = micros.div_euclid(self.micros) * self.micros;
        let secs = floored.div_euclid(MICROS_PER_SECOND);
        let nanos = (floored.rem_euclid(MICROS_PER_SECOND) * 1000) as u32;
        DateTime::from_timestamp(secs, nanos)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| {
                ObsPrepError::TimeDecodeError(format!("timestamp {} out of range", t))
            })
    }
}

impl FromStr for Frequency {
    type Err = ObsPrepError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ObsPrepError::InvalidFrequency {
            frequency: s.to_string(),
        };
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let multiple: i64 = if split == 0 {
            1
        } else {
            trimmed[..split].parse().map_err(|_| invalid())?
        };
        let unit = match &trimmed[split..] {
            "D" | "d" => MICROS_PER_DAY,
            "h" | "H" => 3600 * MICROS_PER_SECOND,
            "min" | "T" => 60 * MICROS_PER_SECOND,
            "s" | "S" => MICROS_PER_SECOND,
            "ms" | "L" => 1000,
            "us" | "U" => 1,
            _ => return Err(invalid()),
        };
        if multiple <= 0 {
            return Err(invalid());
        }
        let micros = multiple.checked_mul(unit).ok_or_else(invalid)?;
        Frequency::from_micros(micros)
    }
}
