//! Containers are the places (facilities or vehicles) where persons meet. They belong to the
//! mobility model; the core only sees each day's occupancy, tagged with a configured
//! container type that selects contact intensity and restrictions.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EpisimError;
use crate::hashing::{hash_str, HashMap, HashMapExt};
use crate::person::PersonId;

fn one() -> f64 {
    1.0
}

/// Parameters of one container type (an activity such as `work`, or a vehicle class).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerTypeParams {
    pub name: String,
    /// Other activity names mapped to this type.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "one")]
    pub contact_intensity: f64,
    /// Fixed remaining fractions by date, applied on top of nothing else.
    #[serde(default)]
    pub restrictions: BTreeMap<NaiveDate, f64>,
}

impl ContainerTypeParams {
    #[must_use]
    pub fn new(name: &str, contact_intensity: f64) -> Self {
        ContainerTypeParams {
            name: name.to_string(),
            aliases: Vec::new(),
            contact_intensity,
            restrictions: BTreeMap::new(),
        }
    }

    /// Home-type containers stay open to persons in home quarantine.
    #[must_use]
    pub fn is_home(&self) -> bool {
        self.name.contains("home")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerTypeId(pub usize);

/// The configured container types with name resolution.
#[derive(Clone, Debug, Default)]
pub struct ContainerTypes {
    types: Vec<ContainerTypeParams>,
    by_name: HashMap<String, ContainerTypeId>,
}

impl ContainerTypes {
    /// # Errors
    ///
    /// Returns an error if a name or alias is used twice.
    pub fn new(types: Vec<ContainerTypeParams>) -> Result<Self, EpisimError> {
        let mut by_name = HashMap::with_capacity(types.len());
        for (index, params) in types.iter().enumerate() {
            for name in std::iter::once(&params.name).chain(params.aliases.iter()) {
                if by_name.insert(name.clone(), ContainerTypeId(index)).is_some() {
                    return Err(EpisimError::ConfigError(format!(
                        "container type name `{name}` is used more than once"
                    )));
                }
            }
        }
        Ok(ContainerTypes { types, by_name })
    }

    /// Resolves an activity name: an exact name or alias first, otherwise the longest
    /// configured name the activity starts with (`work_morning` resolves to `work`).
    ///
    /// # Errors
    ///
    /// Returns [`EpisimError::UnknownContainerType`] if nothing matches.
    pub fn resolve(&self, activity: &str) -> Result<ContainerTypeId, EpisimError> {
        if let Some(id) = self.by_name.get(activity) {
            return Ok(*id);
        }
        self.by_name
            .iter()
            .filter(|(name, _)| activity.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, id)| *id)
            .ok_or_else(|| EpisimError::UnknownContainerType(activity.to_string()))
    }

    #[must_use]
    pub fn get(&self, id: ContainerTypeId) -> Option<&ContainerTypeParams> {
        self.types.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContainerTypeId, &ContainerTypeParams)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, params)| (ContainerTypeId(index), params))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub u64);

impl ContainerId {
    /// Derives a stable id from the container's name in the mobility input.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        ContainerId(hash_str(name))
    }
}

/// One stay of a person in a container. Times are seconds since the start of the day.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Occupancy {
    pub person: PersonId,
    pub enter: f64,
    pub leave: f64,
}

impl Occupancy {
    /// Seconds both stays overlap.
    #[must_use]
    pub fn joint_time(&self, other: &Occupancy) -> f64 {
        (self.leave.min(other.leave) - self.enter.max(other.enter)).max(0.0)
    }
}

/// All stays in one container during one day.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerVisits {
    pub id: ContainerId,
    pub kind: ContainerTypeId,
    pub district: Option<String>,
    pub occupancy: Vec<Occupancy>,
}

impl ContainerVisits {
    #[must_use]
    pub fn new(id: ContainerId, kind: ContainerTypeId) -> Self {
        ContainerVisits {
            id,
            kind,
            district: None,
            occupancy: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_district(mut self, district: &str) -> Self {
        self.district = Some(district.to_string());
        self
    }

    /// Adds a stay from `enter` to `leave` seconds into the day.
    #[must_use]
    pub fn with_stay(mut self, person: PersonId, enter: f64, leave: f64) -> Self {
        self.occupancy.push(Occupancy {
            person,
            enter,
            leave,
        });
        self
    }
}
