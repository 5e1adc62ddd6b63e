//! Activity restrictions over time.
//!
//! A [`PolicyCurve`] maps each restricted activity (container type name) to a step function
//! over calendar dates. Every step holds a [`Restriction`]: the national remaining fraction of
//! contacts and optional per-district fractions. Curves are assembled with a
//! [`PolicyBuilder`] from fixed schedules in the configuration and from mobility-reduction
//! data (see [`csv_input`]) and are immutable once built.

pub mod csv_input;
pub mod extrapolation;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::container::{ContainerTypeId, ContainerTypes};
use crate::numeric::clamp_unit;

/// Remaining fraction of contacts in effect from some date on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    pub remaining_fraction: f64,
    /// Overrides the national fraction for containers in these districts.
    pub district_fractions: BTreeMap<String, f64>,
}

impl Restriction {
    #[must_use]
    pub fn none() -> Self {
        Restriction {
            remaining_fraction: 1.0,
            district_fractions: BTreeMap::new(),
        }
    }

    /// The fraction for a container, preferring its district's value.
    #[must_use]
    pub fn fraction(&self, district: Option<&str>) -> f64 {
        district
            .and_then(|district| self.district_fractions.get(district))
            .copied()
            .unwrap_or(self.remaining_fraction)
    }
}

#[derive(Clone, Debug, Default)]
pub struct PolicyBuilder {
    activities: BTreeMap<String, BTreeMap<NaiveDate, Restriction>>,
}

impl PolicyBuilder {
    #[must_use]
    pub fn new() -> Self {
        PolicyBuilder::default()
    }

    /// Starts from the fixed schedules of the container types.
    #[must_use]
    pub fn from_container_types(types: &ContainerTypes) -> Self {
        let mut builder = PolicyBuilder::new();
        for (_, params) in types.iter() {
            for (date, fraction) in &params.restrictions {
                builder.restrict(*date, *fraction, &[params.name.as_str()]);
            }
        }
        builder
    }

    /// Sets the national remaining fraction of `activities` from `date` on. District values
    /// already set for that date are kept.
    pub fn restrict(&mut self, date: NaiveDate, fraction: f64, activities: &[&str]) -> &mut Self {
        for activity in activities {
            trace!("{activity}: {fraction:.3} from {date}");
            self.activities
                .entry((*activity).to_string())
                .or_default()
                .entry(date)
                .or_insert_with(Restriction::none)
                .remaining_fraction = clamp_unit(fraction);
        }
        self
    }

    /// Sets national and per-district remaining fractions of `activities` from `date` on.
    pub fn restrict_with_district(
        &mut self,
        date: NaiveDate,
        district_fractions: &BTreeMap<String, f64>,
        fraction: f64,
        activities: &[&str],
    ) -> &mut Self {
        let restriction = Restriction {
            remaining_fraction: clamp_unit(fraction),
            district_fractions: district_fractions
                .iter()
                .map(|(district, value)| (district.clone(), clamp_unit(*value)))
                .collect(),
        };
        for activity in activities {
            self.activities
                .entry((*activity).to_string())
                .or_default()
                .insert(date, restriction.clone());
        }
        self
    }

    #[must_use]
    pub fn build(self) -> PolicyCurve {
        PolicyCurve {
            activities: self.activities,
        }
    }
}

/// An immutable restriction schedule per activity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyCurve {
    activities: BTreeMap<String, BTreeMap<NaiveDate, Restriction>>,
}

impl PolicyCurve {
    /// A curve that restricts nothing.
    #[must_use]
    pub fn unrestricted() -> Self {
        PolicyCurve::default()
    }

    /// The restriction of `activity` in effect on `date`, if any.
    #[must_use]
    pub fn restriction(&self, activity: &str, date: NaiveDate) -> Option<&Restriction> {
        self.activities
            .get(activity)?
            .range(..=date)
            .next_back()
            .map(|(_, restriction)| restriction)
    }

    /// The remaining fraction of `activity` on `date`; 1 where nothing is restricted.
    #[must_use]
    pub fn remaining_fraction(
        &self,
        activity: &str,
        date: NaiveDate,
        district: Option<&str>,
    ) -> f64 {
        self.restriction(activity, date)
            .map_or(1.0, |restriction| restriction.fraction(district))
    }

    /// Every date at which some restriction of `activity` changes.
    pub fn dates(&self, activity: &str) -> impl Iterator<Item = (&NaiveDate, &Restriction)> {
        self.activities.get(activity).into_iter().flatten()
    }

    pub fn activities(&self) -> impl Iterator<Item = &str> {
        self.activities.keys().map(String::as_str)
    }

    /// Resolves the restrictions in effect on `date` for every container type.
    #[must_use]
    pub fn for_day(&self, date: NaiveDate, types: &ContainerTypes) -> DayRestrictions {
        DayRestrictions {
            per_type: types
                .iter()
                .map(|(_, params)| self.restriction(&params.name, date).cloned())
                .collect(),
        }
    }
}

/// The restrictions of one day, indexed by container type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DayRestrictions {
    per_type: Vec<Option<Restriction>>,
}

impl DayRestrictions {
    #[must_use]
    pub fn factor(&self, kind: ContainerTypeId, district: Option<&str>) -> f64 {
        self.per_type
            .get(kind.0)
            .and_then(Option::as_ref)
            .map_or(1.0, |restriction| restriction.fraction(district))
    }
}
