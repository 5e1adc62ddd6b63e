//! Persons and their epidemiological state machine.
//!
//! A [`Person`] carries static attributes supplied by the population registry (age, home
//! district, whether they may be vaccinated) and the state mutated by the models: disease
//! status with per-status entry times, infection and vaccination records, quarantine and the
//! traceable-contact ledger.
//!
//! Disease status only moves forward in time. [`Person::set_disease_status`] rejects a change
//! dated before the last transition, and rejects transitions the progression never makes
//! (leaving `Deceased`, or a second infection while one is active).

mod contacts;

use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter, IntoStaticStr};

pub use contacts::{TraceableContacts, RETENTION_DAYS};

use crate::error::EpisimError;
use crate::strain::StrainId;
use crate::time::day_of;

/// Represents a unique person.
//  the id is that person's index in the `Population`
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub(crate) usize);

impl PersonId {
    #[must_use]
    pub fn new(index: usize) -> Self {
        PersonId(index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for PersonId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for PersonId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Person {}", self.0)
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumCount,
    EnumIter,
    IntoStaticStr,
    strum::Display,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum DiseaseStatus {
    Susceptible,
    InfectedButNotContagious,
    Contagious,
    ShowingSymptoms,
    Critical,
    Recovered,
    Deceased,
}

impl DiseaseStatus {
    fn index(self) -> usize {
        self as usize
    }

    /// Whether a person in this status can infect others.
    #[must_use]
    pub fn is_infectious(self) -> bool {
        matches!(self, DiseaseStatus::Contagious | DiseaseStatus::ShowingSymptoms)
    }

    /// Whether a person in this status still takes part in activities. Critical persons are
    /// hospitalized.
    #[must_use]
    pub fn is_mobile(self) -> bool {
        !matches!(self, DiseaseStatus::Critical | DiseaseStatus::Deceased)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum VaccinationStatus {
    #[default]
    Unvaccinated,
    Vaccinated,
    Boosted,
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    IntoStaticStr,
    strum::Display,
)]
pub enum VaccinationType {
    #[serde(rename = "generic")]
    #[strum(serialize = "generic")]
    Generic,
    #[serde(rename = "mRNA")]
    #[strum(serialize = "mRNA")]
    MRna,
    #[serde(rename = "vector")]
    #[strum(serialize = "vector")]
    Vector,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuarantineStatus {
    #[default]
    No,
    /// Only home-type activities take place.
    AtHome,
    /// No activities take place.
    Full,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfectionRecord {
    pub strain: StrainId,
    pub time: f64,
    pub infector: Option<PersonId>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dose {
    pub time: f64,
    pub vaccine: VaccinationType,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VaccinationRecord {
    pub status: VaccinationStatus,
    pub first_dose: Option<Dose>,
    pub booster: Option<Dose>,
}

/// A disease status change drawn when the person entered its current status.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTransition {
    pub day: i64,
    pub status: DiseaseStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    id: PersonId,
    age: u8,
    district: Option<String>,
    vaccinable: bool,

    status: DiseaseStatus,
    last_transition: Option<f64>,
    status_changes: [Option<f64>; DiseaseStatus::COUNT],
    time_in_status: [f64; DiseaseStatus::COUNT],
    next_transition: Option<ScheduledTransition>,
    infections: Vec<InfectionRecord>,

    vaccination: VaccinationRecord,

    quarantine: QuarantineStatus,
    quarantine_since: Option<f64>,

    traceable: bool,
    contacts: TraceableContacts,
}

impl Person {
    #[must_use]
    pub fn new(id: PersonId, age: u8, district: Option<String>, vaccinable: bool) -> Self {
        Person {
            id,
            age,
            district,
            vaccinable,
            status: DiseaseStatus::Susceptible,
            last_transition: None,
            status_changes: [None; DiseaseStatus::COUNT],
            time_in_status: [0.0; DiseaseStatus::COUNT],
            next_transition: None,
            infections: Vec::new(),
            vaccination: VaccinationRecord::default(),
            quarantine: QuarantineStatus::No,
            quarantine_since: None,
            traceable: false,
            contacts: TraceableContacts::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PersonId {
        self.id
    }

    #[must_use]
    pub fn age(&self) -> u8 {
        self.age
    }

    #[must_use]
    pub fn district(&self) -> Option<&str> {
        self.district.as_deref()
    }

    #[must_use]
    pub fn is_vaccinable(&self) -> bool {
        self.vaccinable
    }

    #[must_use]
    pub fn disease_status(&self) -> DiseaseStatus {
        self.status
    }

    /// Changes the disease status at simulated `time`. A new infection
    /// (`InfectedButNotContagious`) needs the infecting `strain`.
    ///
    /// # Errors
    ///
    /// Returns [`EpisimError::TemporalConsistency`] if `time` precedes the last transition and
    /// [`EpisimError::InvalidTransition`] for a change the disease never makes.
    pub fn set_disease_status(
        &mut self,
        time: f64,
        status: DiseaseStatus,
        strain: Option<StrainId>,
    ) -> Result<(), EpisimError> {
        if let Some(last_transition) = self.last_transition {
            if time < last_transition {
                return Err(EpisimError::TemporalConsistency {
                    person: self.id,
                    last_transition,
                    requested: time,
                });
            }
        }
        let invalid = self.status == DiseaseStatus::Deceased
            || (status == DiseaseStatus::InfectedButNotContagious
                && (self.status != DiseaseStatus::Susceptible || strain.is_none()));
        if invalid {
            return Err(EpisimError::InvalidTransition {
                person: self.id,
                from: self.status,
                to: status,
            });
        }

        if let Some(last_transition) = self.last_transition {
            self.time_in_status[self.status.index()] += time - last_transition;
        }
        if status == DiseaseStatus::InfectedButNotContagious {
            if let Some(strain) = strain {
                self.infections.push(InfectionRecord {
                    strain,
                    time,
                    infector: None,
                });
            }
        }
        self.status = status;
        self.last_transition = Some(time);
        self.status_changes[status.index()] = Some(time);
        self.next_transition = None;
        Ok(())
    }

    /// Infects a susceptible person with `strain`, recording who passed it on.
    ///
    /// # Errors
    ///
    /// See [`Person::set_disease_status`].
    pub fn infect(
        &mut self,
        time: f64,
        strain: StrainId,
        infector: Option<PersonId>,
    ) -> Result<(), EpisimError> {
        self.set_disease_status(time, DiseaseStatus::InfectedButNotContagious, Some(strain))?;
        if let Some(record) = self.infections.last_mut() {
            record.infector = infector;
        }
        Ok(())
    }

    /// Time of the last disease status change, if there was one.
    #[must_use]
    pub fn last_transition(&self) -> Option<f64> {
        self.last_transition
    }

    /// Time of the most recent transition into `status`.
    #[must_use]
    pub fn status_change_time(&self, status: DiseaseStatus) -> Option<f64> {
        self.status_changes[status.index()]
    }

    #[must_use]
    pub fn had_disease_status(&self, status: DiseaseStatus) -> bool {
        self.status_changes[status.index()].is_some()
    }

    /// Whole days between the most recent transition into `status` and `iteration`, or `None`
    /// if the person never had `status`.
    #[must_use]
    pub fn days_since(
        &self,
        status: DiseaseStatus,
        iteration: i64,
        start_offset: f64,
    ) -> Option<i64> {
        self.status_change_time(status)
            .map(|time| (iteration - day_of(start_offset, time)).max(0))
    }

    /// Total seconds spent in `status`, excluding the current stay.
    #[must_use]
    pub fn time_in_status(&self, status: DiseaseStatus) -> f64 {
        self.time_in_status[status.index()]
    }

    /// Whether the person recovered no more than `window_days` days before `iteration`.
    #[must_use]
    pub fn is_recently_recovered(
        &self,
        iteration: i64,
        window_days: i64,
        start_offset: f64,
    ) -> bool {
        self.days_since(DiseaseStatus::Recovered, iteration, start_offset)
            .is_some_and(|days| days <= window_days)
    }

    #[must_use]
    pub fn next_transition(&self) -> Option<ScheduledTransition> {
        self.next_transition
    }

    pub fn set_next_transition(&mut self, transition: Option<ScheduledTransition>) {
        self.next_transition = transition;
    }

    #[must_use]
    pub fn infections(&self) -> &[InfectionRecord] {
        &self.infections
    }

    /// Strain of the current (most recent) infection.
    #[must_use]
    pub fn current_strain(&self) -> Option<StrainId> {
        self.infections.last().map(|record| record.strain)
    }

    #[must_use]
    pub fn vaccination(&self) -> &VaccinationRecord {
        &self.vaccination
    }

    #[must_use]
    pub fn vaccination_status(&self) -> VaccinationStatus {
        self.vaccination.status
    }

    /// Administers the next dose: the first dose to an unvaccinated person, a booster to a
    /// vaccinated one.
    ///
    /// # Errors
    ///
    /// Returns an error if the person is already boosted.
    pub fn vaccinate(&mut self, time: f64, vaccine: VaccinationType) -> Result<(), EpisimError> {
        let dose = Some(Dose { time, vaccine });
        match self.vaccination.status {
            VaccinationStatus::Unvaccinated => {
                self.vaccination.status = VaccinationStatus::Vaccinated;
                self.vaccination.first_dose = dose;
            }
            VaccinationStatus::Vaccinated => {
                self.vaccination.status = VaccinationStatus::Boosted;
                self.vaccination.booster = dose;
            }
            VaccinationStatus::Boosted => {
                return Err(EpisimError::EpisimError(format!(
                    "{:?} has already received a booster",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Whole days since the dose that gave the person `status`.
    #[must_use]
    pub fn days_since_vaccination(
        &self,
        status: VaccinationStatus,
        iteration: i64,
        start_offset: f64,
    ) -> Option<i64> {
        let dose = match status {
            VaccinationStatus::Unvaccinated => None,
            VaccinationStatus::Vaccinated => self.vaccination.first_dose,
            VaccinationStatus::Boosted => self.vaccination.booster,
        };
        dose.map(|dose| (iteration - day_of(start_offset, dose.time)).max(0))
    }

    #[must_use]
    pub fn quarantine_status(&self) -> QuarantineStatus {
        self.quarantine
    }

    #[must_use]
    pub fn quarantine_since(&self) -> Option<f64> {
        self.quarantine_since
    }

    pub fn set_quarantine_status(&mut self, status: QuarantineStatus, time: f64) {
        self.quarantine = status;
        self.quarantine_since = match status {
            QuarantineStatus::No => None,
            _ => Some(time),
        };
    }

    /// Whether the person takes part in a container of the given kind. Home quarantine keeps
    /// the household as a place of transmission; only full quarantine removes a person from
    /// home-type containers too.
    #[must_use]
    pub fn participates(&self, home: bool) -> bool {
        self.status.is_mobile()
            && match self.quarantine {
                QuarantineStatus::No => true,
                QuarantineStatus::AtHome => home,
                QuarantineStatus::Full => false,
            }
    }

    #[must_use]
    pub fn is_traceable(&self) -> bool {
        self.traceable
    }

    pub fn set_traceable(&mut self, traceable: bool) {
        self.traceable = traceable;
    }

    #[must_use]
    pub fn traceable_contacts(&self) -> &TraceableContacts {
        &self.contacts
    }

    pub(crate) fn contacts_mut(&mut self) -> &mut TraceableContacts {
        &mut self.contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::corrected_time;

    fn person() -> Person {
        Person::new(PersonId(0), 40, None, true)
    }

    #[test]
    fn days_since() {
        let mut p = person();
        let now = corrected_time(0.0, 0.0, 5);
        p.set_disease_status(now, DiseaseStatus::InfectedButNotContagious, Some(StrainId(0)))
            .unwrap();
        assert_eq!(p.days_since(DiseaseStatus::InfectedButNotContagious, 5, 0.0), Some(0));
        assert_eq!(p.days_since(DiseaseStatus::InfectedButNotContagious, 10, 0.0), Some(5));

        // change during the sixth day
        let now = corrected_time(0.0, 3600.0, 6);
        p.set_disease_status(now, DiseaseStatus::Contagious, None).unwrap();
        assert_eq!(p.days_since(DiseaseStatus::Contagious, 7, 0.0), Some(1));

        let now = corrected_time(0.0, 24.0 * 60.0 * 60.0 - 1.0, 7);
        p.set_disease_status(now, DiseaseStatus::Recovered, None).unwrap();
        assert_eq!(p.days_since(DiseaseStatus::Recovered, 7, 0.0), Some(0));
        assert_eq!(p.days_since(DiseaseStatus::Critical, 7, 0.0), None);
    }

    #[test]
    fn rejects_time_going_backwards() {
        let mut p = person();
        p.set_disease_status(200.0, DiseaseStatus::InfectedButNotContagious, Some(StrainId(0)))
            .unwrap();
        let result = p.set_disease_status(100.0, DiseaseStatus::Contagious, None);
        assert!(matches!(
            result,
            Err(EpisimError::TemporalConsistency { requested, .. }) if requested == 100.0
        ));
        assert_eq!(p.disease_status(), DiseaseStatus::InfectedButNotContagious);
    }

    #[test]
    fn rejects_impossible_transitions() {
        let mut p = person();
        assert!(matches!(
            p.set_disease_status(0.0, DiseaseStatus::InfectedButNotContagious, None),
            Err(EpisimError::InvalidTransition { .. })
        ));
        p.infect(10.0, StrainId(1), Some(PersonId(7))).unwrap();
        assert!(p.infect(20.0, StrainId(0), None).is_err());

        p.set_disease_status(30.0, DiseaseStatus::Deceased, None).unwrap();
        assert!(matches!(
            p.set_disease_status(40.0, DiseaseStatus::Recovered, None),
            Err(EpisimError::InvalidTransition {
                from: DiseaseStatus::Deceased,
                ..
            })
        ));
    }

    #[test]
    fn records_infection_and_durations() {
        let mut p = person();
        p.infect(100.0, StrainId(1), Some(PersonId(7))).unwrap();
        p.set_disease_status(400.0, DiseaseStatus::Contagious, None).unwrap();
        p.set_disease_status(1000.0, DiseaseStatus::Recovered, None).unwrap();

        assert_eq!(
            p.infections(),
            &[InfectionRecord {
                strain: StrainId(1),
                time: 100.0,
                infector: Some(PersonId(7)),
            }]
        );
        assert_eq!(p.current_strain(), Some(StrainId(1)));
        assert_eq!(p.time_in_status(DiseaseStatus::InfectedButNotContagious), 300.0);
        assert_eq!(p.time_in_status(DiseaseStatus::Contagious), 600.0);
        assert_eq!(p.last_transition(), Some(1000.0));
    }

    #[test]
    fn recently_recovered() {
        let mut p = person();
        assert!(!p.is_recently_recovered(10, 180, 0.0));
        p.infect(0.0, StrainId(0), None).unwrap();
        p.set_disease_status(corrected_time(0.0, 0.0, 10), DiseaseStatus::Recovered, None)
            .unwrap();
        assert!(p.is_recently_recovered(100, 180, 0.0));
        assert!(p.is_recently_recovered(190, 180, 0.0));
        assert!(!p.is_recently_recovered(191, 180, 0.0));
    }

    #[test]
    fn vaccination_record() {
        let mut p = person();
        p.vaccinate(corrected_time(0.0, 0.0, 2), VaccinationType::Vector).unwrap();
        assert_eq!(p.vaccination_status(), VaccinationStatus::Vaccinated);
        assert_eq!(p.days_since_vaccination(VaccinationStatus::Vaccinated, 12, 0.0), Some(10));
        assert_eq!(p.days_since_vaccination(VaccinationStatus::Boosted, 12, 0.0), None);

        p.vaccinate(corrected_time(0.0, 0.0, 12), VaccinationType::MRna).unwrap();
        assert_eq!(p.vaccination_status(), VaccinationStatus::Boosted);
        assert_eq!(p.vaccination().booster.map(|d| d.vaccine), Some(VaccinationType::MRna));
        assert!(p.vaccinate(corrected_time(0.0, 0.0, 13), VaccinationType::MRna).is_err());
    }

    #[test]
    fn quarantine_limits_participation() {
        let mut p = person();
        assert!(p.participates(false));
        p.set_quarantine_status(QuarantineStatus::AtHome, 5.0);
        assert!(p.participates(true));
        assert!(!p.participates(false));
        assert_eq!(p.quarantine_since(), Some(5.0));
        p.set_quarantine_status(QuarantineStatus::Full, 6.0);
        assert!(!p.participates(true));
        p.set_quarantine_status(QuarantineStatus::No, 7.0);
        assert_eq!(p.quarantine_since(), None);
        assert!(p.participates(false));
    }

    #[test]
    fn status_names() {
        assert_eq!(DiseaseStatus::InfectedButNotContagious.to_string(), "infectedButNotContagious");
        assert_eq!(VaccinationType::MRna.to_string(), "mRNA");
        let parsed: VaccinationType = serde_json::from_str("\"vector\"").unwrap();
        assert_eq!(parsed, VaccinationType::Vector);
    }
}
