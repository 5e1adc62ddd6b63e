//! Vaccination allocation.
//!
//! Each day a limited number of first doses and booster doses is handed out. The daily
//! capacities and the mix of vaccine types are step functions over dates taken from the
//! configuration; capacities are scaled by the sample size of the simulated population.
//! Boosters are always mRNA.
//!
//! Vaccine parameters also determine how much a dose protects a person
//! ([`VaccinationModel::susceptibility_factor`]) and how much less a vaccinated person sheds
//! once infected ([`VaccinationModel::shedding_factor`]).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand_distr::weighted::WeightedIndex;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

use crate::define_rng;
use crate::error::EpisimError;
use crate::person::{DiseaseStatus, Person, VaccinationStatus, VaccinationType};
use crate::population::Population;
use crate::random::RandomSource;
use crate::strain::StrainParams;
use crate::time::{corrected_time, find_valid_entry, iteration_of};

define_rng!(VaccinationRng);
define_rng!(VaccineTypeRng);

/// Vaccine type given as booster.
pub const BOOSTER_TYPE: VaccinationType = VaccinationType::MRna;

/// Persons who recovered within this many days are not vaccinated.
pub const RECOVERED_WINDOW_DAYS: i64 = 180;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VaccinationStrategy {
    /// Doses go to randomly chosen candidates.
    #[default]
    Random,
    /// Doses go to the oldest candidates first.
    ByAge,
}

fn default_effectiveness() -> f64 {
    0.7
}

fn default_days_to_full_effect() -> u32 {
    21
}

fn default_boost_effectiveness() -> f64 {
    0.9
}

fn default_boost_wait_period() -> i64 {
    90
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaccineParams {
    /// Protection against infection once fully effective.
    #[serde(default = "default_effectiveness")]
    pub effectiveness: f64,
    /// Per-strain protection, keyed by strain name.
    #[serde(default)]
    pub strain_effectiveness: BTreeMap<String, f64>,
    /// Protection builds up linearly over this many days after the dose.
    #[serde(default = "default_days_to_full_effect")]
    pub days_to_full_effect: u32,
    #[serde(default = "default_boost_effectiveness")]
    pub boost_effectiveness: f64,
    /// Days between first dose and booster.
    #[serde(default = "default_boost_wait_period")]
    pub boost_wait_period: i64,
    /// Reduction of infectiousness of an infected vaccinated person.
    #[serde(default)]
    pub shedding_reduction: f64,
}

impl Default for VaccineParams {
    fn default() -> Self {
        VaccineParams {
            effectiveness: default_effectiveness(),
            strain_effectiveness: BTreeMap::new(),
            days_to_full_effect: default_days_to_full_effect(),
            boost_effectiveness: default_boost_effectiveness(),
            boost_wait_period: default_boost_wait_period(),
            shedding_reduction: 0.0,
        }
    }
}

impl VaccineParams {
    fn effectiveness_against(&self, strain: &str) -> f64 {
        self.strain_effectiveness
            .get(strain)
            .copied()
            .unwrap_or(self.effectiveness)
    }

    /// Share of full effect reached `days` after a dose.
    fn ramp(&self, days: i64) -> f64 {
        if self.days_to_full_effect == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ramp = days as f64 / f64::from(self.days_to_full_effect);
        ramp.clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VaccinationParams {
    #[serde(default)]
    pub strategy: VaccinationStrategy,
    /// First doses per day, from each date on.
    #[serde(default)]
    pub capacity: BTreeMap<NaiveDate, u64>,
    /// Booster doses per day, from each date on.
    #[serde(default)]
    pub booster_capacity: BTreeMap<NaiveDate, u64>,
    /// Mix of vaccine types for first doses, from each date on.
    #[serde(default)]
    pub type_probabilities: BTreeMap<NaiveDate, BTreeMap<VaccinationType, f64>>,
    #[serde(default)]
    pub vaccines: BTreeMap<VaccinationType, VaccineParams>,
}

/// Doses handed out by one campaign.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Doses {
    pub total: usize,
    pub by_type: BTreeMap<VaccinationType, usize>,
}

impl Doses {
    fn add(&mut self, vaccine: VaccinationType) {
        self.total += 1;
        *self.by_type.entry(vaccine).or_default() += 1;
    }
}

#[derive(Clone, Debug)]
pub struct VaccinationModel {
    params: VaccinationParams,
    default_vaccine: VaccineParams,
    sample_size: f64,
}

impl VaccinationModel {
    /// # Errors
    ///
    /// Returns [`EpisimError::ConfigError`] for a type probability table that is empty,
    /// negative or sums to zero, or vaccine parameters outside `[0, 1]`.
    pub fn new(params: &VaccinationParams, sample_size: f64) -> Result<Self, EpisimError> {
        for (date, table) in &params.type_probabilities {
            let valid = !table.is_empty()
                && table.values().all(|p| *p >= 0.0 && p.is_finite())
                && table.values().sum::<f64>() > 0.0;
            if !valid {
                return Err(EpisimError::ConfigError(format!(
                    "vaccine type probabilities of {date} must be non-negative and not all zero"
                )));
            }
        }
        for (vaccine, vaccine_params) in &params.vaccines {
            let shares = [
                vaccine_params.effectiveness,
                vaccine_params.boost_effectiveness,
                vaccine_params.shedding_reduction,
            ];
            let in_range = shares
                .iter()
                .chain(vaccine_params.strain_effectiveness.values())
                .all(|share| (0.0..=1.0).contains(share));
            if !in_range || vaccine_params.boost_wait_period < 0 {
                return Err(EpisimError::ConfigError(format!(
                    "invalid parameters for vaccine {vaccine}"
                )));
            }
        }
        Ok(VaccinationModel {
            params: params.clone(),
            default_vaccine: VaccineParams::default(),
            sample_size,
        })
    }

    fn vaccine(&self, vaccine: VaccinationType) -> &VaccineParams {
        self.params
            .vaccines
            .get(&vaccine)
            .unwrap_or(&self.default_vaccine)
    }

    /// Doses available on `date`, scaled to the sample size.
    #[must_use]
    pub fn capacity(&self, date: NaiveDate, booster: bool) -> usize {
        let schedule = if booster {
            &self.params.booster_capacity
        } else {
            &self.params.capacity
        };
        self.scaled(find_valid_entry(schedule, 0, date))
    }

    fn scaled(&self, doses: u64) -> usize {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let scaled = (doses as f64 * self.sample_size).floor() as usize;
        scaled
    }

    fn is_candidate(
        &self,
        person: &Person,
        booster: bool,
        iteration: i64,
        start_offset: f64,
    ) -> bool {
        if !person.is_vaccinable()
            || person.disease_status() != DiseaseStatus::Susceptible
            || person.is_recently_recovered(iteration, RECOVERED_WINDOW_DAYS, start_offset)
        {
            return false;
        }
        if !booster {
            return person.vaccination_status() == VaccinationStatus::Unvaccinated;
        }
        let Some(first_dose) = person.vaccination().first_dose else {
            return false;
        };
        person.vaccination_status() == VaccinationStatus::Vaccinated
            && person
                .days_since_vaccination(VaccinationStatus::Vaccinated, iteration, start_offset)
                .is_some_and(|days| days >= self.vaccine(first_dose.vaccine).boost_wait_period)
    }

    /// Vaccinates up to `available` eligible persons on `date` / `iteration` and returns the
    /// doses used. A campaign without candidates uses no doses.
    ///
    /// # Errors
    ///
    /// Returns an error if the type probabilities of `date` can't be sampled.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_vaccination(
        &self,
        population: &mut Population,
        booster: bool,
        available: usize,
        date: NaiveDate,
        iteration: i64,
        start_offset: f64,
        random: &RandomSource,
    ) -> Result<Doses, EpisimError> {
        let mut doses = Doses::default();
        if available == 0 {
            return Ok(doses);
        }

        let mut candidates: Vec<_> = population
            .iter()
            .filter(|person| self.is_candidate(person, booster, iteration, start_offset))
            .map(|person| (person.id(), person.age()))
            .collect();
        if candidates.is_empty() {
            warn!(
                "Not enough people to vaccinate left ({available} {} doses on {date})",
                if booster { "booster" } else { "first" }
            );
            return Ok(doses);
        }

        random.sample(VaccinationRng, iteration, u64::from(booster), |rng| {
            candidates.shuffle(rng);
        });
        if self.params.strategy == VaccinationStrategy::ByAge {
            // stable, so equal ages keep their shuffled order
            candidates.sort_by(|a, b| b.1.cmp(&a.1));
        }

        let types = self.type_sampler(date)?;
        let now = corrected_time(start_offset, 0.0, iteration);
        for (id, _) in candidates.into_iter().take(available) {
            let vaccine = if booster {
                BOOSTER_TYPE
            } else {
                let index = random.sample(VaccineTypeRng, iteration, id.index() as u64, |rng| {
                    types.1.sample(rng)
                });
                types.0[index]
            };
            if let Some(person) = population.get_mut(id) {
                person.vaccinate(now, vaccine)?;
                doses.add(vaccine);
            }
        }
        debug!(
            "{date}: {} of {available} {} doses used",
            doses.total,
            if booster { "booster" } else { "first" }
        );
        Ok(doses)
    }

    fn type_sampler(
        &self,
        date: NaiveDate,
    ) -> Result<(Vec<VaccinationType>, WeightedIndex<f64>), EpisimError> {
        let table = self
            .params
            .type_probabilities
            .range(..=date)
            .next_back()
            .map(|(_, table)| table.clone())
            .unwrap_or_else(|| BTreeMap::from([(VaccinationType::Generic, 1.0)]));
        let (types, weights): (Vec<_>, Vec<_>) = table.into_iter().unzip();
        let index = WeightedIndex::new(&weights).map_err(|e| {
            EpisimError::ConfigError(format!("vaccine type probabilities of {date}: {e}"))
        })?;
        Ok((types, index))
    }

    /// Catch-up vaccination for capacity dates before `start_date`, in date order; first doses
    /// before boosters on the same date. Returns the first doses and boosters given.
    ///
    /// # Errors
    ///
    /// See [`VaccinationModel::handle_vaccination`].
    pub fn init(
        &self,
        population: &mut Population,
        start_date: NaiveDate,
        start_offset: f64,
        random: &RandomSource,
    ) -> Result<(usize, usize), EpisimError> {
        let mut dates: Vec<(NaiveDate, bool, u64)> = self
            .params
            .capacity
            .range(..start_date)
            .map(|(date, doses)| (*date, false, *doses))
            .chain(
                self.params
                    .booster_capacity
                    .range(..start_date)
                    .map(|(date, doses)| (*date, true, *doses)),
            )
            .collect();
        dates.sort_by_key(|(date, booster, _)| (*date, *booster));

        let (mut first, mut boosters) = (0, 0);
        for (date, booster, doses) in dates {
            let iteration = iteration_of(start_date, date);
            let used = self.handle_vaccination(
                population,
                booster,
                self.scaled(doses),
                date,
                iteration,
                start_offset,
                random,
            )?;
            if booster {
                boosters += used.total;
            } else {
                first += used.total;
            }
        }
        info!("Initial vaccination = {first} and initial booster vaccination = {boosters}");
        Ok((first, boosters))
    }

    /// Multiplier on the chance that `person` is infected with `strain`.
    #[must_use]
    pub fn susceptibility_factor(
        &self,
        person: &Person,
        strain: &StrainParams,
        iteration: i64,
        start_offset: f64,
    ) -> f64 {
        let record = person.vaccination();
        let Some(first_dose) = record.first_dose else {
            return 1.0;
        };
        let first = self.vaccine(first_dose.vaccine);
        let days = person
            .days_since_vaccination(VaccinationStatus::Vaccinated, iteration, start_offset)
            .unwrap_or(0);
        let mut effectiveness = first.effectiveness_against(&strain.name) * first.ramp(days);

        if let Some(booster) = record.booster {
            let params = self.vaccine(booster.vaccine);
            let days = person
                .days_since_vaccination(VaccinationStatus::Boosted, iteration, start_offset)
                .unwrap_or(0);
            effectiveness = effectiveness.max(params.boost_effectiveness * params.ramp(days));
        }
        (1.0 - effectiveness).clamp(0.0, 1.0)
    }

    /// Multiplier on the infectiousness of an infected `person`.
    #[must_use]
    pub fn shedding_factor(&self, person: &Person, iteration: i64, start_offset: f64) -> f64 {
        let Some(first_dose) = person.vaccination().first_dose else {
            return 1.0;
        };
        let params = self.vaccine(first_dose.vaccine);
        let days = person
            .days_since_vaccination(VaccinationStatus::Vaccinated, iteration, start_offset)
            .unwrap_or(0);
        (1.0 - params.shedding_reduction * params.ramp(days)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::PersonId;
    use crate::strain::StrainId;
    use crate::time::date_of;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
    }

    fn population(ages: &[u8]) -> Population {
        let mut population = Population::new();
        for (i, age) in ages.iter().enumerate() {
            population.add_person(&i.to_string(), *age, None, true).unwrap();
        }
        population
    }

    fn vaccinated(population: &Population) -> usize {
        population
            .iter()
            .filter(|p| p.vaccination_status() != VaccinationStatus::Unvaccinated)
            .count()
    }

    #[test]
    fn never_exceeds_available_doses() {
        let model = VaccinationModel::new(&VaccinationParams::default(), 1.0).unwrap();
        let random = RandomSource::new(1);
        let mut population = population(&[30; 100]);
        let doses = model
            .handle_vaccination(&mut population, false, 10, start(), 1, 0.0, &random)
            .unwrap();
        assert_eq!(doses.total, 10);
        assert_eq!(doses.by_type[&VaccinationType::Generic], 10);
        assert_eq!(vaccinated(&population), 10);

        let doses = model
            .handle_vaccination(&mut population, false, 500, start(), 2, 0.0, &random)
            .unwrap();
        assert_eq!(doses.total, 90);
        let none_left = model
            .handle_vaccination(&mut population, false, 5, start(), 3, 0.0, &random)
            .unwrap();
        assert_eq!(none_left.total, 0);
    }

    #[test]
    fn respects_eligibility() {
        let model = VaccinationModel::new(&VaccinationParams::default(), 1.0).unwrap();
        let random = RandomSource::new(1);
        let mut population = Population::new();
        population.add_person("not vaccinable", 50, None, false).unwrap();
        let infected = population.add_person("infected", 50, None, true).unwrap();
        let recovered = population.add_person("recovered", 50, None, true).unwrap();
        let eligible = population.add_person("eligible", 50, None, true).unwrap();

        population
            .get_mut(infected)
            .unwrap()
            .infect(0.0, StrainId(0), None)
            .unwrap();
        let person = population.get_mut(recovered).unwrap();
        person.infect(0.0, StrainId(0), None).unwrap();
        person
            .set_disease_status(corrected_time(0.0, 0.0, 5), DiseaseStatus::Recovered, None)
            .unwrap();
        person
            .set_disease_status(corrected_time(0.0, 0.0, 30), DiseaseStatus::Susceptible, None)
            .unwrap();

        let doses = model
            .handle_vaccination(&mut population, false, 10, start(), 40, 0.0, &random)
            .unwrap();
        assert_eq!(doses.total, 1);
        assert_eq!(
            population.get(eligible).unwrap().vaccination_status(),
            VaccinationStatus::Vaccinated
        );
    }

    #[test]
    fn boosters_wait_for_the_wait_period() {
        let mut params = VaccinationParams::default();
        params.vaccines.insert(
            VaccinationType::Vector,
            VaccineParams {
                boost_wait_period: 30,
                ..VaccineParams::default()
            },
        );
        params
            .type_probabilities
            .insert(start(), BTreeMap::from([(VaccinationType::Vector, 1.0)]));
        let model = VaccinationModel::new(&params, 1.0).unwrap();
        let random = RandomSource::new(2);
        let mut population = population(&[40; 5]);

        model
            .handle_vaccination(&mut population, false, 5, start(), 1, 0.0, &random)
            .unwrap();
        let too_early = model
            .handle_vaccination(&mut population, true, 5, date_of(start(), 30), 30, 0.0, &random)
            .unwrap();
        assert_eq!(too_early.total, 0);

        let boosters = model
            .handle_vaccination(&mut population, true, 3, date_of(start(), 31), 31, 0.0, &random)
            .unwrap();
        assert_eq!(boosters.total, 3);
        assert_eq!(boosters.by_type[&BOOSTER_TYPE], 3);
        let boosted = population
            .iter()
            .filter(|p| p.vaccination_status() == VaccinationStatus::Boosted)
            .count();
        assert_eq!(boosted, 3);
    }

    #[test]
    fn by_age_vaccinates_oldest_first() {
        let params = VaccinationParams {
            strategy: VaccinationStrategy::ByAge,
            ..VaccinationParams::default()
        };
        let model = VaccinationModel::new(&params, 1.0).unwrap();
        let random = RandomSource::new(3);
        let mut population = population(&[20, 90, 45, 80, 10, 85]);
        model
            .handle_vaccination(&mut population, false, 3, start(), 1, 0.0, &random)
            .unwrap();
        let mut ages: Vec<u8> = population
            .iter()
            .filter(|p| p.vaccination_status() == VaccinationStatus::Vaccinated)
            .map(Person::age)
            .collect();
        ages.sort_unstable();
        assert_eq!(ages, vec![80, 85, 90]);
    }

    #[test]
    fn reproducible_selection() {
        let model = VaccinationModel::new(&VaccinationParams::default(), 1.0).unwrap();
        let pick = |seed| {
            let mut population = population(&[30; 50]);
            model
                .handle_vaccination(
                    &mut population,
                    false,
                    5,
                    start(),
                    1,
                    0.0,
                    &RandomSource::new(seed),
                )
                .unwrap();
            population
                .iter()
                .filter(|p| p.vaccination_status() == VaccinationStatus::Vaccinated)
                .map(Person::id)
                .collect::<Vec<PersonId>>()
        };
        assert_eq!(pick(4), pick(4));
    }

    #[test]
    fn catch_up_before_start() {
        let params = VaccinationParams {
            capacity: BTreeMap::from([
                (NaiveDate::from_ymd_opt(2020, 12, 1).unwrap(), 10),
                (NaiveDate::from_ymd_opt(2020, 12, 15).unwrap(), 20),
                (start(), 1000),
            ]),
            booster_capacity: BTreeMap::from([(
                NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
                100,
            )]),
            ..VaccinationParams::default()
        };
        let model = VaccinationModel::new(&params, 0.5).unwrap();
        let mut population = population(&[60; 100]);
        let (first, boosters) = model
            .init(&mut population, start(), 0.0, &RandomSource::new(5))
            .unwrap();
        assert_eq!(first, 15);
        // the earliest first dose is 30 days before the booster date, short of the wait period
        assert_eq!(boosters, 0);
        assert_eq!(model.capacity(start(), false), 500);
        assert_eq!(model.capacity(start(), true), 50);
    }

    #[test]
    fn effectiveness_ramps_up() {
        let mut params = VaccinationParams::default();
        params.vaccines.insert(
            VaccinationType::Generic,
            VaccineParams {
                effectiveness: 0.8,
                strain_effectiveness: BTreeMap::from([("delta".to_string(), 0.4)]),
                days_to_full_effect: 10,
                shedding_reduction: 0.5,
                ..VaccineParams::default()
            },
        );
        let model = VaccinationModel::new(&params, 1.0).unwrap();
        let mut person = Person::new(PersonId::new(0), 50, None, true);
        let wild = StrainParams::new("wild");
        let delta = StrainParams::new("delta");
        assert_eq!(model.susceptibility_factor(&person, &wild, 1, 0.0), 1.0);

        person.vaccinate(corrected_time(0.0, 0.0, 1), VaccinationType::Generic).unwrap();
        assert_eq!(model.susceptibility_factor(&person, &wild, 1, 0.0), 1.0);
        assert!((model.susceptibility_factor(&person, &wild, 6, 0.0) - 0.6).abs() < 1e-12);
        assert!((model.susceptibility_factor(&person, &wild, 30, 0.0) - 0.2).abs() < 1e-12);
        assert!((model.susceptibility_factor(&person, &delta, 30, 0.0) - 0.6).abs() < 1e-12);
        assert!((model.shedding_factor(&person, 30, 0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn invalid_type_probabilities() {
        let mut params = VaccinationParams::default();
        params
            .type_probabilities
            .insert(start(), BTreeMap::from([(VaccinationType::MRna, 0.0)]));
        assert!(matches!(
            VaccinationModel::new(&params, 1.0),
            Err(EpisimError::ConfigError(_))
        ));
    }
}
