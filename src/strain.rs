//! Virus strains. Strains are configured as an ordered list; a `StrainId` is the position
//! of a strain in that list.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrainId(pub usize);

impl Display for StrainId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Strain {}", self.0)
    }
}

fn one() -> f64 {
    1.0
}

/// Parameters of one circulating strain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrainParams {
    pub name: String,
    /// Relative infectiousness of a person carrying this strain.
    #[serde(default = "one")]
    pub infectiousness: f64,
    /// Multiplier on the probability of a critical course.
    #[serde(default = "one")]
    pub severity: f64,
    /// Susceptibility multiplier for persons who were infected before.
    #[serde(default = "one")]
    pub reinfection_susceptibility: f64,
    /// Number of persons to seed per day, as a step function over dates.
    #[serde(default)]
    pub infections_per_day: BTreeMap<NaiveDate, u32>,
}

impl StrainParams {
    #[must_use]
    pub fn new(name: &str) -> Self {
        StrainParams {
            name: name.to_string(),
            infectiousness: 1.0,
            severity: 1.0,
            reinfection_susceptibility: 1.0,
            infections_per_day: BTreeMap::new(),
        }
    }
}
