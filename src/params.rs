//! Run parameters, loaded from a JSON file.
//!
//! Every section has defaults, so a minimal file only names the start date and the container
//! types. Relative input paths in the file are resolved against the file's directory.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::container::{ContainerTypeParams, ContainerTypes};
use crate::error::EpisimError;
use crate::person::VaccinationType;
use crate::policy::csv_input::{RestrictionCsvParams, RestrictionsFromCsv};
use crate::policy::{PolicyBuilder, PolicyCurve};
use crate::progression::{ProgressionParams, TracingParams};
use crate::seeding::InitialInfectionParams;
use crate::strain::StrainParams;
use crate::vaccination::VaccinationParams;

fn default_calibration_parameter() -> f64 {
    1.07e-5
}

fn default_sample_size() -> f64 {
    1.0
}

fn non_negative(value: f64) -> bool {
    value >= 0.0 && value.is_finite()
}

fn default_strains() -> Vec<StrainParams> {
    vec![StrainParams::new("SARS_CoV_2")]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisimParams {
    pub start_date: NaiveDate,
    /// Simulated time in seconds at which iteration 0 starts.
    #[serde(default)]
    pub start_offset: f64,
    #[serde(default = "default_calibration_parameter")]
    pub calibration_parameter: f64,
    /// Share of the real population that is simulated.
    #[serde(default = "default_sample_size")]
    pub sample_size: f64,
    /// Write a snapshot every that many iterations; never if unset.
    #[serde(default)]
    pub snapshot_interval: Option<i64>,
    #[serde(default)]
    pub initial_infections: InitialInfectionParams,
    #[serde(default = "default_strains")]
    pub strains: Vec<StrainParams>,
    pub container_types: Vec<ContainerTypeParams>,
    #[serde(default)]
    pub progression: ProgressionParams,
    #[serde(default)]
    pub vaccination: VaccinationParams,
    #[serde(default)]
    pub tracing: TracingParams,
    #[serde(default)]
    pub restrictions_csv: Option<RestrictionCsvParams>,
}

impl EpisimParams {
    /// Parameters with defaults for everything but the start date and container types.
    #[must_use]
    pub fn new(start_date: NaiveDate, container_types: Vec<ContainerTypeParams>) -> Self {
        EpisimParams {
            start_date,
            start_offset: 0.0,
            calibration_parameter: default_calibration_parameter(),
            sample_size: default_sample_size(),
            snapshot_interval: None,
            initial_infections: InitialInfectionParams::default(),
            strains: default_strains(),
            container_types,
            progression: ProgressionParams::default(),
            vaccination: VaccinationParams::default(),
            tracing: TracingParams::default(),
            restrictions_csv: None,
        }
    }

    /// Reads and validates the parameters in `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed, or fails [`EpisimParams::validate`].
    pub fn load(path: &Path) -> Result<Self, EpisimError> {
        info!("loading parameters from {}", path.display());
        let file = File::open(path)?;
        let mut params: EpisimParams = serde_json::from_reader(BufReader::new(file))?;
        if let Some(dir) = path.parent() {
            params.resolve_paths(dir);
        }
        params.validate()?;
        Ok(params)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        let Some(csv) = self.restrictions_csv.as_mut() else {
            return;
        };
        if csv.path.is_relative() {
            csv.path = dir.join(&csv.path);
        }
        for path in csv.district_inputs.values_mut() {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }

    /// Checks the values the models can't check for themselves.
    ///
    /// # Errors
    ///
    /// Returns [`EpisimError::ConfigError`] naming the first inconsistent value.
    pub fn validate(&self) -> Result<(), EpisimError> {
        let fail = |message: String| Err(EpisimError::ConfigError(message));

        if self.strains.is_empty() {
            return fail("at least one strain is required".to_string());
        }
        if !non_negative(self.calibration_parameter) {
            return fail(format!(
                "calibration_parameter must be non-negative, got {}",
                self.calibration_parameter
            ));
        }
        if !(self.sample_size > 0.0 && self.sample_size <= 1.0) {
            return fail(format!(
                "sample_size must be in (0, 1], got {}",
                self.sample_size
            ));
        }
        if self.snapshot_interval.is_some_and(|interval| interval <= 0) {
            return fail("snapshot_interval must be positive".to_string());
        }
        if let (Some(lower), Some(upper)) = (
            self.initial_infections.lower_age_bound,
            self.initial_infections.upper_age_bound,
        ) {
            if lower > upper {
                return fail(format!(
                    "initial infection age range {lower}..={upper} is empty"
                ));
            }
        }
        for strain in &self.strains {
            let multipliers = [
                strain.infectiousness,
                strain.severity,
                strain.reinfection_susceptibility,
            ];
            if !multipliers.into_iter().all(non_negative) {
                return fail(format!("multipliers of {} must be non-negative", strain.name));
            }
        }
        for container_type in &self.container_types {
            if !non_negative(container_type.contact_intensity) {
                return fail(format!(
                    "contact intensity of {} must be non-negative",
                    container_type.name
                ));
            }
            if container_type
                .restrictions
                .values()
                .any(|fraction| !(0.0..=1.0).contains(fraction))
            {
                return fail(format!(
                    "restrictions of {} must be in [0, 1]",
                    container_type.name
                ));
            }
        }
        for table in self.vaccination.type_probabilities.values() {
            if let Some(vaccine) = table
                .keys()
                .find(|vaccine| {
                    **vaccine != VaccinationType::Generic
                        && !self.vaccination.vaccines.contains_key(*vaccine)
                })
            {
                return fail(format!("no parameters for vaccine type {vaccine}"));
            }
        }
        if let Some(csv) = &self.restrictions_csv {
            if !non_negative(csv.alpha) {
                return fail(format!("alpha must be non-negative, got {}", csv.alpha));
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error for duplicate container type names.
    pub fn container_types(&self) -> Result<ContainerTypes, EpisimError> {
        ContainerTypes::new(self.container_types.clone())
    }

    /// Builds the restriction curve from the fixed schedules and the configured input files.
    ///
    /// # Errors
    ///
    /// Returns an error if a restriction input can't be read.
    pub fn policy(&self, types: &ContainerTypes) -> Result<PolicyCurve, EpisimError> {
        let mut builder = PolicyBuilder::from_container_types(types);
        if let Some(csv) = &self.restrictions_csv {
            RestrictionsFromCsv::new(csv.clone()).apply(&mut builder, types)?;
        }
        Ok(builder.build())
    }
}
