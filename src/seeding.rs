//! Initial infections.
//!
//! Every iteration, each strain seeds the number of infections its `infections_per_day`
//! schedule gives for the date, drawing susceptible persons at random from an optional
//! district and age range. All strains share one global budget; seeding stops for good once
//! it is used up.

use chrono::NaiveDate;
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::define_rng;
use crate::error::EpisimError;
use crate::person::{DiseaseStatus, Person, PersonId};
use crate::population::Population;
use crate::random::RandomSource;
use crate::strain::{StrainId, StrainParams};
use crate::time::{corrected_time, find_valid_entry};

define_rng!(SeedingRng);

fn default_budget() -> u64 {
    10
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialInfectionParams {
    /// Total number of infections seeded over the whole run.
    #[serde(default = "default_budget")]
    pub budget: u64,
    #[serde(default)]
    pub district: Option<String>,
    /// Inclusive lower age bound.
    #[serde(default)]
    pub lower_age_bound: Option<u8>,
    /// Inclusive upper age bound.
    #[serde(default)]
    pub upper_age_bound: Option<u8>,
}

impl Default for InitialInfectionParams {
    fn default() -> Self {
        InitialInfectionParams {
            budget: default_budget(),
            district: None,
            lower_age_bound: None,
            upper_age_bound: None,
        }
    }
}

/// Persons seeded in one iteration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedingOutcome {
    /// Seeded persons per strain, indexed by `StrainId`.
    pub per_strain: Vec<usize>,
    pub persons: Vec<PersonId>,
}

#[derive(Clone, Debug)]
pub struct SeedingModel {
    params: InitialInfectionParams,
    infections_left: u64,
}

impl SeedingModel {
    #[must_use]
    pub fn new(params: &InitialInfectionParams) -> Self {
        SeedingModel {
            params: params.clone(),
            infections_left: params.budget,
        }
    }

    #[must_use]
    pub fn infections_left(&self) -> u64 {
        self.infections_left
    }

    pub fn set_infections_left(&mut self, infections_left: u64) {
        self.infections_left = infections_left;
    }

    fn matches(&self, person: &Person) -> bool {
        let params = &self.params;
        params
            .district
            .as_deref()
            .is_none_or(|district| person.district() == Some(district))
            && params.lower_age_bound.is_none_or(|bound| person.age() >= bound)
            && params.upper_age_bound.is_none_or(|bound| person.age() <= bound)
            && person.disease_status() == DiseaseStatus::Susceptible
    }

    /// Seeds the infections of `date` at the start of `iteration`.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`Person::infect`].
    pub fn handle_infections(
        &mut self,
        population: &mut Population,
        strains: &[StrainParams],
        date: NaiveDate,
        iteration: i64,
        start_offset: f64,
        random: &RandomSource,
    ) -> Result<SeedingOutcome, EpisimError> {
        let mut outcome = SeedingOutcome {
            per_strain: vec![0; strains.len()],
            persons: Vec::new(),
        };
        if self.infections_left == 0 {
            return Ok(outcome);
        }
        let now = corrected_time(start_offset, 0.0, iteration);

        for (index, strain) in strains.iter().enumerate() {
            let default = u32::from(index == 0);
            let mut wanted = find_valid_entry(&strain.infections_per_day, default, date) as usize;
            if wanted == 0 {
                continue;
            }

            let mut candidates: Vec<PersonId> = population
                .iter()
                .filter(|person| self.matches(person))
                .map(Person::id)
                .collect();
            if candidates.len() < wanted {
                warn!(
                    "Not enough persons match the initial infection requirement for {}, using whole population",
                    strain.name
                );
                candidates = population.iter().map(Person::id).collect();
            }

            let mut rng = random.rng(SeedingRng, iteration, index as u64);
            while wanted > 0 && self.infections_left > 0 && !candidates.is_empty() {
                let id = candidates.swap_remove(rng.random_range(0..candidates.len()));
                let Some(person) = population.get_mut(id) else {
                    continue;
                };
                if person.disease_status() != DiseaseStatus::Susceptible {
                    continue;
                }
                person.infect(now, StrainId(index), None)?;
                debug!("{id:?} has initial infection with {}", strain.name);
                self.infections_left -= 1;
                wanted -= 1;
                outcome.per_strain[index] += 1;
                outcome.persons.push(id);
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 2, 20).unwrap()
    }

    fn population() -> Population {
        let mut population = Population::new();
        for i in 0..100u8 {
            let district = if i % 2 == 0 { "Berlin" } else { "Hamburg" };
            population
                .add_person(&i.to_string(), i, Some(district.to_string()), true)
                .unwrap();
        }
        population
    }

    fn strain(name: &str, per_day: u32) -> StrainParams {
        let mut strain = StrainParams::new(name);
        strain.infections_per_day = BTreeMap::from([(date(), per_day)]);
        strain
    }

    fn infected(population: &Population) -> Vec<&Person> {
        population
            .iter()
            .filter(|p| p.disease_status() == DiseaseStatus::InfectedButNotContagious)
            .collect()
    }

    #[test]
    fn first_strain_defaults_to_one() {
        let mut model = SeedingModel::new(&InitialInfectionParams::default());
        let mut population = population();
        let strains = vec![StrainParams::new("wild"), StrainParams::new("alpha")];
        let outcome = model
            .handle_infections(
                &mut population,
                &strains,
                date(),
                1,
                0.0,
                &RandomSource::new(1),
            )
            .unwrap();
        assert_eq!(outcome.per_strain, vec![1, 0]);
        assert_eq!(model.infections_left(), 9);
    }

    #[test]
    fn filters_by_district_and_age() {
        let params = InitialInfectionParams {
            district: Some("Berlin".to_string()),
            lower_age_bound: Some(20),
            upper_age_bound: Some(29),
            ..InitialInfectionParams::default()
        };
        let mut model = SeedingModel::new(&params);
        let mut population = population();
        let strains = vec![strain("wild", 5)];
        let outcome = model
            .handle_infections(
                &mut population,
                &strains,
                date(),
                1,
                0.0,
                &RandomSource::new(2),
            )
            .unwrap();
        assert_eq!(outcome.per_strain, vec![5]);
        for person in infected(&population) {
            assert_eq!(person.district(), Some("Berlin"));
            assert!((20..=29).contains(&person.age()));
            assert_eq!(
                person.status_change_time(DiseaseStatus::InfectedButNotContagious),
                Some(corrected_time(0.0, 0.0, 1))
            );
        }
    }

    #[test]
    fn widens_pool_when_too_few_candidates() {
        let params = InitialInfectionParams {
            lower_age_bound: Some(98),
            ..InitialInfectionParams::default()
        };
        let mut model = SeedingModel::new(&params);
        let mut population = population();
        let outcome = model
            .handle_infections(
                &mut population,
                &[strain("wild", 4)],
                date(),
                1,
                0.0,
                &RandomSource::new(3),
            )
            .unwrap();
        assert_eq!(outcome.per_strain, vec![4]);
    }

    #[test]
    fn never_exceeds_budget() {
        let params = InitialInfectionParams {
            budget: 6,
            ..InitialInfectionParams::default()
        };
        let mut model = SeedingModel::new(&params);
        let mut population = population();
        let strains = vec![strain("wild", 4), strain("alpha", 4)];
        let outcome = model
            .handle_infections(&mut population, &strains, date(), 1, 0.0, &RandomSource::new(4))
            .unwrap();
        assert_eq!(outcome.per_strain, vec![4, 2]);
        assert_eq!(model.infections_left(), 0);
        assert_eq!(infected(&population).len(), 6);

        let next = model
            .handle_infections(&mut population, &strains, date(), 2, 0.0, &RandomSource::new(4))
            .unwrap();
        assert_eq!(next.per_strain, vec![0, 0]);
    }

    #[test]
    fn never_reinfects() {
        let params = InitialInfectionParams {
            budget: 1000,
            ..InitialInfectionParams::default()
        };
        let mut model = SeedingModel::new(&params);
        let mut population = population();
        let strains = vec![strain("wild", 80)];
        let random = RandomSource::new(5);
        model
            .handle_infections(&mut population, &strains, date(), 1, 0.0, &random)
            .unwrap();
        // only 20 susceptible persons are left; the pool is widened but the infected are skipped
        let outcome = model
            .handle_infections(&mut population, &strains, date(), 2, 0.0, &random)
            .unwrap();
        assert_eq!(outcome.per_strain, vec![20]);
        assert_eq!(infected(&population).len(), 100);
        assert!(infected(&population)
            .iter()
            .all(|person| person.infections().len() == 1));
    }
}
