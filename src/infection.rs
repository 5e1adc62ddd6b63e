//! Transmission inside containers.
//!
//! For one day, every container is evaluated on its own against a read-only view of the
//! population. Within a container, each susceptible participant collects a hazard from every
//! infectious co-occupant it shared time with:
//!
//! ```text
//! λ_i = calibration · intensity · joint_time_i · infectiousness(strain_i) · shedding_i · susceptibility
//! ```
//!
//! and is infected with probability `r · (1 − exp(−Σλ_i))`, `r` being the remaining fraction of
//! the container type on that day. A single draw decides the infection; the infector (and with
//! it the strain) is picked with probability `λ_i / Σλ`. Every susceptible participant draws
//! from its own generator keyed by `(iteration, container id, person)`, so whether a person is
//! infected only depends on their own hazards, and the containers can be evaluated in parallel
//! in any order. The collected outcomes are applied to
//! the population afterwards, in container order.

use log::{debug, trace};
use rand::Rng;
use rayon::prelude::*;

use crate::container::{ContainerId, ContainerTypes, ContainerVisits, Occupancy};
use crate::define_rng;
use crate::error::EpisimError;
use crate::hashing::hash_key;
use crate::numeric::clamp_unit;
use crate::person::{DiseaseStatus, Person, PersonId};
use crate::policy::DayRestrictions;
use crate::population::Population;
use crate::random::RandomSource;
use crate::strain::{StrainId, StrainParams};
use crate::time::corrected_time;
use crate::vaccination::VaccinationModel;

define_rng!(InfectionRng);

// Generator key of one person's draws in one container.
fn draw_key(container: ContainerId, person: PersonId) -> u64 {
    #[allow(clippy::cast_possible_wrap)]
    let person = person.index() as i64;
    hash_key(person, container.0)
}

/// A new infection found while evaluating a container.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Infection {
    pub person: PersonId,
    pub infector: PersonId,
    pub strain: StrainId,
    pub time: f64,
}

/// The outcome of one container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerOutcome {
    pub infections: Vec<Infection>,
    /// Traceable pairs that were together long enough.
    pub contacts: Vec<(PersonId, PersonId)>,
}

/// Read-only inputs shared by all containers of one day.
#[derive(Clone, Copy)]
pub struct Exposure<'a> {
    pub iteration: i64,
    pub types: &'a ContainerTypes,
    pub restrictions: &'a DayRestrictions,
    pub strains: &'a [StrainParams],
    pub vaccination: &'a VaccinationModel,
    pub random: &'a RandomSource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InfectionModel {
    calibration_parameter: f64,
    start_offset: f64,
    min_contact_duration: f64,
}

struct Infectious {
    stay: Occupancy,
    strain: StrainId,
    /// Everything in `λ_i` but the joint time and the susceptibility.
    weight: f64,
}

impl InfectionModel {
    #[must_use]
    pub fn new(calibration_parameter: f64, start_offset: f64, min_contact_duration: f64) -> Self {
        InfectionModel {
            calibration_parameter,
            start_offset,
            min_contact_duration,
        }
    }

    /// Evaluates one container without touching the population.
    #[must_use]
    pub fn evaluate(
        &self,
        container: &ContainerVisits,
        population: &Population,
        exposure: &Exposure,
    ) -> ContainerOutcome {
        let mut outcome = ContainerOutcome::default();
        let Some(kind) = exposure.types.get(container.kind) else {
            return outcome;
        };
        let home = kind.is_home();
        let participants: Vec<(Occupancy, &Person)> = container
            .occupancy
            .iter()
            .filter_map(|stay| Some((*stay, population.get(stay.person)?)))
            .filter(|(_, person)| person.participates(home))
            .collect();

        for (i, (a_stay, a)) in participants.iter().enumerate() {
            if !a.is_traceable() {
                continue;
            }
            for (b_stay, b) in &participants[i + 1..] {
                let joint = a_stay.joint_time(b_stay);
                if b.is_traceable()
                    && a.id() != b.id()
                    && joint > 0.0
                    && joint >= self.min_contact_duration
                {
                    outcome.contacts.push((a.id(), b.id()));
                }
            }
        }

        let remaining = exposure
            .restrictions
            .factor(container.kind, container.district.as_deref());
        if remaining <= 0.0 || kind.contact_intensity <= 0.0 {
            return outcome;
        }

        let infectious: Vec<Infectious> = participants
            .iter()
            .filter(|(_, person)| person.disease_status().is_infectious())
            .filter_map(|(stay, person)| {
                let strain = person.current_strain()?;
                let params = exposure.strains.get(strain.0)?;
                let shedding = clamp_unit(exposure.vaccination.shedding_factor(
                    person,
                    exposure.iteration,
                    self.start_offset,
                ));
                Some(Infectious {
                    stay: *stay,
                    strain,
                    weight: self.calibration_parameter
                        * kind.contact_intensity
                        * params.infectiousness
                        * shedding,
                })
            })
            .collect();
        if infectious.is_empty() {
            return outcome;
        }

        let mut hazards = Vec::with_capacity(infectious.len());

        for (stay, person) in &participants {
            if person.disease_status() != DiseaseStatus::Susceptible {
                continue;
            }
            hazards.clear();
            for source in &infectious {
                if source.stay.person == person.id() {
                    continue;
                }
                let joint = stay.joint_time(&source.stay);
                if joint <= 0.0 {
                    continue;
                }
                let strain = &exposure.strains[source.strain.0];
                let mut susceptibility = exposure.vaccination.susceptibility_factor(
                    person,
                    strain,
                    exposure.iteration,
                    self.start_offset,
                );
                if !person.infections().is_empty() {
                    susceptibility *= strain.reinfection_susceptibility;
                }
                hazards.push(source.weight * joint * clamp_unit(susceptibility));
            }
            let total: f64 = hazards.iter().sum();
            if total <= 0.0 {
                continue;
            }

            let probability = clamp_unit(remaining * (1.0 - (-total).exp()));
            let mut rng = exposure.random.rng(
                InfectionRng,
                exposure.iteration,
                draw_key(container.id, person.id()),
            );
            if rng.random::<f64>() >= probability {
                continue;
            }

            let mut pick = rng.random::<f64>() * total;
            let mut chosen = None;
            let candidates = infectious.iter().filter(|source| {
                source.stay.person != person.id() && stay.joint_time(&source.stay) > 0.0
            });
            for (source, hazard) in candidates.zip(&hazards) {
                chosen = Some(source);
                if pick < *hazard {
                    break;
                }
                pick -= hazard;
            }
            let Some(source) = chosen else {
                continue;
            };

            let met = stay.enter.max(source.stay.enter);
            let infection = Infection {
                person: person.id(),
                infector: source.stay.person,
                strain: source.strain,
                time: corrected_time(self.start_offset, met, exposure.iteration),
            };
            trace!(
                "{:?} infected by {:?} with {} in container {}",
                infection.person,
                infection.infector,
                infection.strain,
                container.id.0
            );
            outcome.infections.push(infection);
        }
        outcome
    }

    /// Evaluates all containers of a day in parallel.
    #[must_use]
    pub fn evaluate_all(
        &self,
        containers: &[ContainerVisits],
        population: &Population,
        exposure: &Exposure,
    ) -> Vec<ContainerOutcome> {
        containers
            .par_iter()
            .map(|container| self.evaluate(container, population, exposure))
            .collect()
    }

    /// Writes contacts (keyed by `iteration`) and infections to the population. A person
    /// infected in an earlier container of the same day is not infected again. Returns the
    /// infections that took effect.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`Person::infect`].
    pub fn apply(
        &self,
        outcomes: Vec<ContainerOutcome>,
        population: &mut Population,
        iteration: i64,
    ) -> Result<Vec<Infection>, EpisimError> {
        let mut applied = Vec::new();
        for outcome in outcomes {
            for (a, b) in outcome.contacts {
                population.add_traceable_contact(a, b, iteration);
            }
            for infection in outcome.infections {
                let Some(person) = population.get_mut(infection.person) else {
                    continue;
                };
                if person.disease_status() != DiseaseStatus::Susceptible {
                    continue;
                }
                person.infect(infection.time, infection.strain, Some(infection.infector))?;
                applied.push(infection);
            }
        }
        debug!("{} new infections", applied.len());
        Ok(applied)
    }
}
