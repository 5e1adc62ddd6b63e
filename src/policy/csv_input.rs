//! Restrictions derived from mobility-reduction data.
//!
//! The input is a tab-separated file with a header row. The first column holds the date as
//! `yyyyMMdd`; the column `notAtHome` holds the percent change of time spent away from home
//! (district files use `notAtHomeExceptLeisureAndEdu`). A reported change `v` becomes the
//! remaining fraction `min(1, 1 - min(1, alpha * (1 - (1 + v / 100))))`.
//!
//! Daily values are averaged per week, anchored at the first date of the national series,
//! and continued beyond the data with [`extrapolate`].

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::extrapolation::{extrapolate, ExtrapolationMode, HORIZON, TRAILING_POINTS};
use super::PolicyBuilder;
use crate::container::ContainerTypes;
use crate::error::EpisimError;
use crate::numeric::clamp_unit;

/// Column of the national file.
pub const NATIONAL_COLUMN: &str = "notAtHome";

/// Column of the district files.
pub const DISTRICT_COLUMN: &str = "notAtHomeExceptLeisureAndEdu";

fn one() -> f64 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestrictionCsvParams {
    pub path: PathBuf,
    #[serde(default = "one")]
    pub alpha: f64,
    #[serde(default)]
    pub extrapolation: ExtrapolationMode,
    /// Per-district input files; used only if `district_level` is set.
    #[serde(default)]
    pub district_inputs: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub district_level: bool,
}

/// Converts a reported percent change into a remaining fraction.
#[must_use]
pub fn remaining_fraction(value: f64, alpha: f64) -> f64 {
    let remaining = 1.0 + value / 100.0;
    let reduction = (alpha * (1.0 - remaining)).min(1.0);
    clamp_unit((1.0 - reduction).min(1.0))
}

/// Reads one daily series from tab-separated data.
///
/// # Errors
///
/// Returns an error for a missing column, an unparsable row, or data without rows.
pub fn read_series<R: Read>(
    reader: R,
    column: &str,
    alpha: f64,
) -> Result<BTreeMap<NaiveDate, f64>, EpisimError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader);
    let index = reader
        .headers()?
        .iter()
        .position(|header| header == column)
        .ok_or_else(|| EpisimError::ConfigError(format!("missing column `{column}`")))?;

    let mut days = BTreeMap::new();
    for result in reader.records() {
        let record = result?;
        let (Some(date), Some(value)) = (record.get(0), record.get(index)) else {
            return Err(EpisimError::EpisimError(format!(
                "Incomplete row {:?}",
                record.position().map(csv::Position::line)
            )));
        };
        let date = NaiveDate::parse_from_str(date.trim(), "%Y%m%d")?;
        let value: i64 = value.trim().parse()?;
        #[allow(clippy::cast_precision_loss)]
        let value = value as f64;
        days.insert(date, remaining_fraction(value, alpha));
    }
    if days.is_empty() {
        return Err(EpisimError::EmptyInput(format!("column `{column}`")));
    }
    Ok(days)
}

fn read_series_file(
    path: &Path,
    column: &str,
    alpha: f64,
) -> Result<BTreeMap<NaiveDate, f64>, EpisimError> {
    let series = read_series(std::fs::File::open(path)?, column, alpha)?;
    debug!("read {} days from {}", series.len(), path.display());
    Ok(series)
}

/// One week of averaged values.
#[derive(Clone, Debug, PartialEq)]
pub struct Week {
    pub start: NaiveDate,
    pub national: f64,
    pub districts: BTreeMap<String, f64>,
}

/// Averages the series over seven-day buckets starting at `start`. Buckets without national
/// data are skipped; the last bucket may be partial.
#[must_use]
pub fn resample_weekly(
    days: &BTreeMap<NaiveDate, f64>,
    districts: &BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    start: NaiveDate,
) -> Vec<Week> {
    let Some(last) = days.keys().next_back().copied() else {
        return Vec::new();
    };
    let mean = |series: &BTreeMap<NaiveDate, f64>, from: NaiveDate, to: NaiveDate| {
        let values: Vec<f64> = series.range(from..to).map(|(_, v)| *v).collect();
        #[allow(clippy::cast_precision_loss)]
        let mean = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
        mean
    };

    let mut weeks = Vec::new();
    let mut from = start;
    while from <= last {
        let to = from + Days::new(7);
        if let Some(national) = mean(days, from, to) {
            weeks.push(Week {
                start: from,
                national,
                districts: districts
                    .iter()
                    .filter_map(|(name, series)| Some((name.clone(), mean(series, from, to)?)))
                    .collect(),
            });
        }
        from = to;
    }
    weeks
}

/// Builds the restriction schedule from the configured input files.
#[derive(Clone, Debug)]
pub struct RestrictionsFromCsv {
    params: RestrictionCsvParams,
}

impl RestrictionsFromCsv {
    #[must_use]
    pub fn new(params: RestrictionCsvParams) -> Self {
        RestrictionsFromCsv { params }
    }

    /// Container types the data applies to: all but education, public transport, transit
    /// and home-type containers, which are governed separately.
    #[must_use]
    pub fn affected_activities(types: &ContainerTypes) -> Vec<String> {
        types
            .iter()
            .map(|(_, params)| params.name.clone())
            .filter(|name| {
                !name.starts_with("edu")
                    && !name.starts_with("pt")
                    && !name.starts_with("tr")
                    && !name.contains("home")
            })
            .collect()
    }

    /// Reads the input files and adds the weekly and extrapolated restrictions to `builder`.
    ///
    /// # Errors
    ///
    /// Returns an error if an input file can't be read or parsed, or holds no data.
    pub fn apply(
        &self,
        builder: &mut PolicyBuilder,
        types: &ContainerTypes,
    ) -> Result<(), EpisimError> {
        let days = read_series_file(&self.params.path, NATIONAL_COLUMN, self.params.alpha)?;
        let mut districts = BTreeMap::new();
        if self.params.district_level {
            for (district, path) in &self.params.district_inputs {
                districts.insert(
                    district.clone(),
                    read_series_file(path, DISTRICT_COLUMN, self.params.alpha)?,
                );
            }
        }
        let activities = Self::affected_activities(types);
        let activities: Vec<&str> = activities.iter().map(String::as_str).collect();
        add_series(
            builder,
            &days,
            &districts,
            self.params.extrapolation,
            &activities,
        )
    }
}

/// Adds weekly averages of `days` (and of each district series) and their extrapolation for
/// `activities` to `builder`.
///
/// # Errors
///
/// Returns [`EpisimError::EmptyInput`] if `days` is empty.
pub fn add_series(
    builder: &mut PolicyBuilder,
    days: &BTreeMap<NaiveDate, f64>,
    districts: &BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    mode: ExtrapolationMode,
    activities: &[&str],
) -> Result<(), EpisimError> {
    let start = *days
        .keys()
        .next()
        .ok_or_else(|| EpisimError::EmptyInput("restriction series".to_string()))?;
    let weeks = resample_weekly(days, districts, start);

    let mut trend = Vec::with_capacity(weeks.len());
    let mut district_trends: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for week in &weeks {
        trend.push(week.national);
        for (district, value) in &week.districts {
            district_trends.entry(district.clone()).or_default().push(*value);
        }
        if districts.is_empty() {
            builder.restrict(week.start, week.national, activities);
        } else {
            builder.restrict_with_district(week.start, &week.districts, week.national, activities);
        }
    }

    let Some(last_week) = weeks.last().map(|week| week.start) else {
        return Ok(());
    };
    let recent = |values: &[f64]| values[values.len().saturating_sub(TRAILING_POINTS)..].to_vec();
    let national = extrapolate(&recent(&trend), HORIZON, mode);
    let by_district: BTreeMap<&String, Vec<f64>> = district_trends
        .iter()
        .map(|(district, values)| (district, extrapolate(&recent(values), HORIZON, mode)))
        .collect();

    let mut date = last_week;
    for (step, predicted) in national.iter().enumerate() {
        date = date + Days::new(7);
        if districts.is_empty() {
            builder.restrict(date, predicted.min(1.0), activities);
        } else {
            let predicted_by_district: BTreeMap<String, f64> = by_district
                .iter()
                .filter_map(|(district, values)| {
                    Some(((*district).clone(), values.get(step)?.min(1.0)))
                })
                .collect();
            builder.restrict_with_district(
                date,
                &predicted_by_district,
                predicted.min(1.0),
                activities,
            );
        }
    }
    info!(
        "restrictions from data: {} weeks, {} extrapolated ({mode:?})",
        weeks.len(),
        national.len()
    );
    Ok(())
}
