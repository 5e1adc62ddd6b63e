//! Disease progression, contact tracing and quarantine.
//!
//! When a person enters a disease status, the next status and the day it is reached are drawn
//! once and stored on the person as a [`ScheduledTransition`]. At the start of each iteration
//! [`ProgressionModel::advance`] applies every transition that is due and draws the following
//! one:
//!
//! ```text
//! infectedButNotContagious -> contagious
//! contagious               -> showingSymptoms (p_symptoms)  | recovered
//! showingSymptoms          -> critical (p_critical * severity) | recovered
//! critical                 -> deceased (p_death)            | recovered
//! recovered                -> susceptible (only with immunity_days)
//! ```
//!
//! Probabilities and sojourn times come from an age bucket or from a single constant set,
//! depending on the configured strategy. A person who starts showing symptoms is quarantined
//! and, once tracing has started, so are their traced contacts.

use log::{debug, trace};
use rand::Rng;
use rand_distr::weighted::WeightedIndex;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

use crate::define_rng;
use crate::error::EpisimError;
use crate::person::{DiseaseStatus, Person, PersonId, QuarantineStatus, ScheduledTransition};
use crate::population::Population;
use crate::random::RandomSource;
use crate::strain::StrainParams;
use crate::time::{corrected_time, day_of};

define_rng!(ProgressionRng);
define_rng!(TracingRng);

/// A sojourn time distribution in days.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Sojourn {
    Fixed { days: u32 },
    LogNormal { mean: f64, sd: f64 },
    Empirical { days: Vec<u32>, weights: Vec<f64> },
}

/// Sojourn time of every transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SojournTimes {
    pub infected_to_contagious: Sojourn,
    pub contagious_to_symptoms: Sojourn,
    pub contagious_to_recovered: Sojourn,
    pub symptoms_to_critical: Sojourn,
    pub symptoms_to_recovered: Sojourn,
    pub critical_to_deceased: Sojourn,
    pub critical_to_recovered: Sojourn,
}

impl Default for SojournTimes {
    fn default() -> Self {
        let fixed = |days| Sojourn::Fixed { days };
        SojournTimes {
            infected_to_contagious: fixed(4),
            contagious_to_symptoms: fixed(2),
            contagious_to_recovered: fixed(12),
            symptoms_to_critical: fixed(5),
            symptoms_to_recovered: fixed(10),
            critical_to_deceased: fixed(10),
            critical_to_recovered: fixed(14),
        }
    }
}

/// Transition probabilities for persons of at least `min_age` years.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgeGroup {
    pub min_age: u8,
    /// Probability that a contagious person develops symptoms.
    pub p_symptoms: f64,
    /// Probability that a symptomatic person becomes critical.
    pub p_critical: f64,
    /// Probability that a critical person dies.
    pub p_death: f64,
    /// Replaces the shared sojourn times for this group.
    #[serde(default)]
    pub sojourn: Option<SojournTimes>,
}

impl AgeGroup {
    fn new(min_age: u8, p_symptoms: f64, p_critical: f64, p_death: f64) -> Self {
        AgeGroup {
            min_age,
            p_symptoms,
            p_critical,
            p_death,
            sojourn: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum ProgressionStrategy {
    AgeDependent {
        age_groups: Vec<AgeGroup>,
    },
    Constant {
        p_symptoms: f64,
        p_critical: f64,
        p_death: f64,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressionParams {
    #[serde(flatten)]
    pub strategy: ProgressionStrategy,
    #[serde(default)]
    pub sojourn: SojournTimes,
    /// Days after recovery until a person is susceptible again. Immunity is permanent if
    /// unset.
    #[serde(default)]
    pub immunity_days: Option<u32>,
}

impl Default for ProgressionParams {
    fn default() -> Self {
        let age_groups = vec![
            AgeGroup::new(0, 0.8, 0.0005, 0.1),
            AgeGroup::new(10, 0.8, 0.0005, 0.1),
            AgeGroup::new(20, 0.8, 0.001, 0.1),
            AgeGroup::new(30, 0.8, 0.002, 0.15),
            AgeGroup::new(40, 0.8, 0.005, 0.2),
            AgeGroup::new(50, 0.8, 0.01, 0.25),
            AgeGroup::new(60, 0.8, 0.025, 0.3),
            AgeGroup::new(70, 0.8, 0.05, 0.4),
            AgeGroup::new(80, 0.8, 0.08, 0.5),
            AgeGroup::new(90, 0.8, 0.1, 0.6),
        ];
        ProgressionParams {
            strategy: ProgressionStrategy::AgeDependent { age_groups },
            sojourn: SojournTimes::default(),
            immunity_days: None,
        }
    }
}

fn one() -> f64 {
    1.0
}

fn default_tracing_days_distance() -> i64 {
    4
}

fn default_quarantine_days() -> i64 {
    14
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracingParams {
    /// Share of persons whose contacts can be traced.
    #[serde(default)]
    pub equipment_rate: f64,
    /// Minimum joint time for a contact to be recorded.
    #[serde(default)]
    pub min_contact_duration_sec: f64,
    /// First iteration at which contacts are traced; never if unset.
    #[serde(default)]
    pub tracing_start_iteration: Option<i64>,
    /// How many days back contacts are traced.
    #[serde(default = "default_tracing_days_distance")]
    pub tracing_days_distance: i64,
    #[serde(default = "one")]
    pub tracing_probability: f64,
    #[serde(default = "default_quarantine_days")]
    pub quarantine_days: i64,
    /// Quarantine applied to symptomatic persons and traced contacts.
    #[serde(default = "default_quarantine_status")]
    pub quarantine_status: QuarantineStatus,
}

fn default_quarantine_status() -> QuarantineStatus {
    QuarantineStatus::AtHome
}

impl Default for TracingParams {
    fn default() -> Self {
        TracingParams {
            equipment_rate: 0.0,
            min_contact_duration_sec: 0.0,
            tracing_start_iteration: None,
            tracing_days_distance: default_tracing_days_distance(),
            tracing_probability: 1.0,
            quarantine_days: default_quarantine_days(),
            quarantine_status: default_quarantine_status(),
        }
    }
}

#[derive(Clone, Debug)]
enum SojournSampler {
    Fixed(i64),
    LogNormal(LogNormal<f64>),
    Empirical(Vec<u32>, WeightedIndex<f64>),
}

impl SojournSampler {
    fn new(sojourn: &Sojourn) -> Result<Self, EpisimError> {
        match sojourn {
            Sojourn::Fixed { days } => Ok(SojournSampler::Fixed(i64::from(*days))),
            Sojourn::LogNormal { mean, sd } => {
                if *mean <= 0.0 || *sd < 0.0 {
                    return Err(EpisimError::ConfigError(format!(
                        "log-normal sojourn needs mean > 0 and sd >= 0, got {mean} and {sd}"
                    )));
                }
                LogNormal::from_mean_cv(*mean, sd / mean)
                    .map(SojournSampler::LogNormal)
                    .map_err(|e| EpisimError::ConfigError(format!("invalid sojourn: {e}")))
            }
            Sojourn::Empirical { days, weights } => {
                if days.len() != weights.len() {
                    return Err(EpisimError::ConfigError(
                        "empirical sojourn needs one weight per day count".to_string(),
                    ));
                }
                WeightedIndex::new(weights)
                    .map(|index| SojournSampler::Empirical(days.clone(), index))
                    .map_err(|e| EpisimError::ConfigError(format!("invalid sojourn: {e}")))
            }
        }
    }

    /// Draws a whole number of days, at least one.
    fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        let days = match self {
            SojournSampler::Fixed(days) => *days,
            #[allow(clippy::cast_possible_truncation)]
            SojournSampler::LogNormal(distribution) => distribution.sample(rng).round() as i64,
            SojournSampler::Empirical(days, index) => i64::from(days[index.sample(rng)]),
        };
        days.max(1)
    }
}

#[derive(Clone, Debug)]
struct SojournSamplers {
    infected_to_contagious: SojournSampler,
    contagious_to_symptoms: SojournSampler,
    contagious_to_recovered: SojournSampler,
    symptoms_to_critical: SojournSampler,
    symptoms_to_recovered: SojournSampler,
    critical_to_deceased: SojournSampler,
    critical_to_recovered: SojournSampler,
}

impl SojournSamplers {
    fn new(times: &SojournTimes) -> Result<Self, EpisimError> {
        Ok(SojournSamplers {
            infected_to_contagious: SojournSampler::new(&times.infected_to_contagious)?,
            contagious_to_symptoms: SojournSampler::new(&times.contagious_to_symptoms)?,
            contagious_to_recovered: SojournSampler::new(&times.contagious_to_recovered)?,
            symptoms_to_critical: SojournSampler::new(&times.symptoms_to_critical)?,
            symptoms_to_recovered: SojournSampler::new(&times.symptoms_to_recovered)?,
            critical_to_deceased: SojournSampler::new(&times.critical_to_deceased)?,
            critical_to_recovered: SojournSampler::new(&times.critical_to_recovered)?,
        })
    }
}

#[derive(Clone, Debug)]
struct Bucket {
    min_age: u8,
    p_symptoms: f64,
    p_critical: f64,
    p_death: f64,
    sojourn: SojournSamplers,
}

fn check_probability(name: &str, value: f64) -> Result<(), EpisimError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EpisimError::ConfigError(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}

impl Bucket {
    fn new(
        min_age: u8,
        probabilities: (f64, f64, f64),
        sojourn: &SojournTimes,
    ) -> Result<Self, EpisimError> {
        let (p_symptoms, p_critical, p_death) = probabilities;
        check_probability("p_symptoms", p_symptoms)?;
        check_probability("p_critical", p_critical)?;
        check_probability("p_death", p_death)?;
        Ok(Bucket {
            min_age,
            p_symptoms,
            p_critical,
            p_death,
            sojourn: SojournSamplers::new(sojourn)?,
        })
    }
}

/// What one call to [`ProgressionModel::advance`] did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressionOutcome {
    pub transitions: usize,
    pub quarantined: usize,
    pub released: usize,
}

#[derive(Clone, Debug)]
pub struct ProgressionModel {
    /// Sorted by `min_age`; a single bucket for the constant strategy.
    buckets: Vec<Bucket>,
    immunity_days: Option<i64>,
    tracing: TracingParams,
}

impl ProgressionModel {
    /// # Errors
    ///
    /// Returns [`EpisimError::ConfigError`] for an empty age table, a probability outside
    /// `[0, 1]` or an invalid sojourn distribution.
    pub fn new(params: &ProgressionParams, tracing: &TracingParams) -> Result<Self, EpisimError> {
        let mut buckets = match &params.strategy {
            ProgressionStrategy::AgeDependent { age_groups } => {
                if age_groups.is_empty() {
                    return Err(EpisimError::ConfigError(
                        "the age-dependent progression needs at least one age group".to_string(),
                    ));
                }
                age_groups
                    .iter()
                    .map(|group| {
                        Bucket::new(
                            group.min_age,
                            (group.p_symptoms, group.p_critical, group.p_death),
                            group.sojourn.as_ref().unwrap_or(&params.sojourn),
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            ProgressionStrategy::Constant {
                p_symptoms,
                p_critical,
                p_death,
            } => vec![Bucket::new(
                0,
                (*p_symptoms, *p_critical, *p_death),
                &params.sojourn,
            )?],
        };
        buckets.sort_by_key(|bucket| bucket.min_age);
        check_probability("equipment_rate", tracing.equipment_rate)?;
        check_probability("tracing_probability", tracing.tracing_probability)?;

        Ok(ProgressionModel {
            buckets,
            immunity_days: params.immunity_days.map(i64::from),
            tracing: tracing.clone(),
        })
    }

    #[must_use]
    pub fn tracing(&self) -> &TracingParams {
        &self.tracing
    }

    /// The bucket for `age`: the last one starting at or below it, or the youngest one.
    fn bucket(&self, age: u8) -> &Bucket {
        self.buckets
            .iter()
            .rev()
            .find(|bucket| bucket.min_age <= age)
            .unwrap_or(&self.buckets[0])
    }

    /// Draws the transition out of the person's current status, entered on `day`.
    pub fn schedule_next(
        &self,
        person: &mut Person,
        day: i64,
        strains: &[StrainParams],
        random: &RandomSource,
    ) {
        let bucket = self.bucket(person.age());
        let severity = person
            .current_strain()
            .and_then(|strain| strains.get(strain.0))
            .map_or(1.0, |strain| strain.severity);
        let mut rng = random.rng(ProgressionRng, day, person.id().index() as u64);
        let sojourn = &bucket.sojourn;

        let next = match person.disease_status() {
            DiseaseStatus::InfectedButNotContagious => Some((
                DiseaseStatus::Contagious,
                sojourn.infected_to_contagious.sample(&mut rng),
            )),
            DiseaseStatus::Contagious => Some(if rng.random_bool(bucket.p_symptoms) {
                (
                    DiseaseStatus::ShowingSymptoms,
                    sojourn.contagious_to_symptoms.sample(&mut rng),
                )
            } else {
                (
                    DiseaseStatus::Recovered,
                    sojourn.contagious_to_recovered.sample(&mut rng),
                )
            }),
            DiseaseStatus::ShowingSymptoms => {
                let p_critical = (bucket.p_critical * severity).clamp(0.0, 1.0);
                Some(if rng.random_bool(p_critical) {
                    (
                        DiseaseStatus::Critical,
                        sojourn.symptoms_to_critical.sample(&mut rng),
                    )
                } else {
                    (
                        DiseaseStatus::Recovered,
                        sojourn.symptoms_to_recovered.sample(&mut rng),
                    )
                })
            }
            DiseaseStatus::Critical => Some(if rng.random_bool(bucket.p_death) {
                (
                    DiseaseStatus::Deceased,
                    sojourn.critical_to_deceased.sample(&mut rng),
                )
            } else {
                (
                    DiseaseStatus::Recovered,
                    sojourn.critical_to_recovered.sample(&mut rng),
                )
            }),
            DiseaseStatus::Recovered => self
                .immunity_days
                .map(|days| (DiseaseStatus::Susceptible, days.max(1))),
            DiseaseStatus::Susceptible | DiseaseStatus::Deceased => None,
        };

        person.set_next_transition(next.map(|(status, days)| ScheduledTransition {
            day: day + days,
            status,
        }));
    }

    /// Applies all transitions due on `iteration`, traces the contacts of persons who start
    /// showing symptoms and releases persons whose quarantine is over.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`Person::set_disease_status`].
    pub fn advance(
        &self,
        population: &mut Population,
        iteration: i64,
        start_offset: f64,
        strains: &[StrainParams],
        random: &RandomSource,
    ) -> Result<ProgressionOutcome, EpisimError> {
        let now = corrected_time(start_offset, 0.0, iteration);
        let mut outcome = ProgressionOutcome::default();
        let mut symptomatic = Vec::new();

        for person in population.iter_mut() {
            let Some(transition) = person.next_transition() else {
                continue;
            };
            if transition.day > iteration {
                continue;
            }
            trace!(
                "{:?}: {} -> {} on iteration {iteration}",
                person.id(),
                person.disease_status(),
                transition.status
            );
            person.set_disease_status(now, transition.status, None)?;
            self.schedule_next(person, iteration, strains, random);
            outcome.transitions += 1;
            if transition.status == DiseaseStatus::ShowingSymptoms {
                symptomatic.push(person.id());
            }
        }

        for id in symptomatic {
            outcome.quarantined +=
                self.quarantine_with_contacts(population, id, iteration, now, random);
        }
        outcome.released = self.release_quarantine(population, iteration, start_offset);

        if outcome.transitions > 0 {
            debug!(
                "iteration {iteration}: {} transitions, {} quarantined, {} released",
                outcome.transitions, outcome.quarantined, outcome.released
            );
        }
        Ok(outcome)
    }

    fn quarantine_with_contacts(
        &self,
        population: &mut Population,
        id: PersonId,
        iteration: i64,
        now: f64,
        random: &RandomSource,
    ) -> usize {
        let status = self.tracing.quarantine_status;
        let mut quarantined = 0;
        let contacts = match population.get_mut(id) {
            Some(person) => {
                if person.quarantine_status() == QuarantineStatus::No {
                    person.set_quarantine_status(status, now);
                    quarantined += 1;
                }
                person
                    .traceable_contacts()
                    .since(iteration - self.tracing.tracing_days_distance)
            }
            None => return 0,
        };

        let tracing_active = self
            .tracing
            .tracing_start_iteration
            .is_some_and(|start| iteration >= start);
        if !tracing_active {
            return quarantined;
        }

        for contact in contacts {
            let key = ((id.index() as u64) << 32) ^ contact.index() as u64;
            if !random.sample_bool(TracingRng, iteration, key, self.tracing.tracing_probability) {
                continue;
            }
            if let Some(person) = population.get_mut(contact) {
                if person.quarantine_status() == QuarantineStatus::No
                    && person.disease_status().is_mobile()
                {
                    trace!("{contact:?} quarantined as contact of {id:?}");
                    person.set_quarantine_status(status, now);
                    quarantined += 1;
                }
            }
        }
        quarantined
    }

    fn release_quarantine(
        &self,
        population: &mut Population,
        iteration: i64,
        start_offset: f64,
    ) -> usize {
        let mut released = 0;
        for person in population.iter_mut() {
            let Some(since) = person.quarantine_since() else {
                continue;
            };
            let over = iteration - day_of(start_offset, since) >= self.tracing.quarantine_days;
            let sick = matches!(
                person.disease_status(),
                DiseaseStatus::ShowingSymptoms | DiseaseStatus::Critical
            );
            if over && !sick {
                person.set_quarantine_status(QuarantineStatus::No, 0.0);
                released += 1;
            }
        }
        released
    }
}
