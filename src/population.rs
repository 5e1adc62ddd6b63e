//! The population of a run: every [`Person`], indexed by [`PersonId`].
//!
//! Persons are created once, either from code or from a CSV file with the columns
//! `id, age, district, vaccinable`, and live for the whole run. External ids from the
//! population file are kept so mobility input can refer to persons by them.

use std::io::Read;
use std::path::Path;

use log::{debug, trace};
use serde::Deserialize;
use strum::EnumCount;

use crate::error::EpisimError;
use crate::hashing::{HashMap, HashMapExt};
use crate::person::{DiseaseStatus, Person, PersonId};

#[derive(Deserialize, Debug)]
struct PersonRecord {
    id: String,
    age: u8,
    district: Option<String>,
    vaccinable: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct Population {
    persons: Vec<Person>,
    external_ids: Vec<String>,
    index: HashMap<String, PersonId>,
}

impl Population {
    #[must_use]
    pub fn new() -> Self {
        Population {
            persons: Vec::new(),
            external_ids: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Loads the population from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read, a row is malformed, an id is repeated, or
    /// the file holds no persons.
    pub fn from_csv(path: &Path) -> Result<Self, EpisimError> {
        let file = std::fs::File::open(path)?;
        let population = Self::from_reader(file)?;
        debug!(
            "loaded {} persons from {}",
            population.len(),
            path.display()
        );
        Ok(population)
    }

    /// Reads the population from CSV data.
    ///
    /// # Errors
    ///
    /// See [`Population::from_csv`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, EpisimError> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut population = Population::new();
        for result in reader.deserialize() {
            let record: PersonRecord = result?;
            let district = record.district.filter(|district| !district.is_empty());
            population.add_person(
                &record.id,
                record.age,
                district,
                record.vaccinable.unwrap_or(true),
            )?;
        }
        if population.is_empty() {
            return Err(EpisimError::EmptyInput("population".to_string()));
        }
        Ok(population)
    }

    /// Adds a person known to the outside world as `external_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if a person with `external_id` already exists.
    pub fn add_person(
        &mut self,
        external_id: &str,
        age: u8,
        district: Option<String>,
        vaccinable: bool,
    ) -> Result<PersonId, EpisimError> {
        if self.index.contains_key(external_id) {
            return Err(EpisimError::EpisimError(format!(
                "Duplicate person id `{external_id}`"
            )));
        }
        let id = PersonId::new(self.persons.len());
        trace!("adding {id:?} ({external_id}), age {age}");
        self.persons.push(Person::new(id, age, district, vaccinable));
        self.external_ids.push(external_id.to_string());
        self.index.insert(external_id.to_string(), id);
        Ok(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.persons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: PersonId) -> Option<&Person> {
        self.persons.get(id.index())
    }

    pub fn get_mut(&mut self, id: PersonId) -> Option<&mut Person> {
        self.persons.get_mut(id.index())
    }

    /// Looks a person up by the id used in the population file.
    #[must_use]
    pub fn lookup(&self, external_id: &str) -> Option<PersonId> {
        self.index.get(external_id).copied()
    }

    /// The id used for `id` in the population file.
    #[must_use]
    pub fn external_id(&self, id: PersonId) -> Option<&str> {
        self.external_ids.get(id.index()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.persons.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Person> {
        self.persons.iter_mut()
    }

    #[must_use]
    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    /// Replaces the state of every person, e.g. when resuming from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if `persons` does not match this population.
    pub(crate) fn restore(&mut self, persons: Vec<Person>) -> Result<(), EpisimError> {
        if persons.len() != self.persons.len() {
            return Err(EpisimError::EpisimError(format!(
                "Snapshot holds {} persons, population has {}",
                persons.len(),
                self.persons.len()
            )));
        }
        if let Some(person) = persons
            .iter()
            .enumerate()
            .find(|(index, person)| person.id().index() != *index)
        {
            return Err(EpisimError::UnknownPerson(format!("{:?}", person.1.id())));
        }
        self.persons = persons;
        Ok(())
    }

    /// Records that `a` and `b` met on `day`, on both sides, if both are traceable.
    pub fn add_traceable_contact(&mut self, a: PersonId, b: PersonId, day: i64) {
        if a == b {
            return;
        }
        let both_traceable = matches!(
            (self.get(a), self.get(b)),
            (Some(pa), Some(pb)) if pa.is_traceable() && pb.is_traceable()
        );
        if !both_traceable {
            return;
        }
        self.persons[a.index()].contacts_mut().add(b, day);
        self.persons[b.index()].contacts_mut().add(a, day);
    }

    /// Drops ledger entries recorded before `before_day`.
    pub fn purge_contacts(&mut self, before_day: i64) {
        for person in &mut self.persons {
            person.contacts_mut().purge(before_day);
        }
    }

    /// Number of persons per disease status, indexed like `DiseaseStatus::iter()`.
    #[must_use]
    pub fn status_counts(&self) -> [usize; DiseaseStatus::COUNT] {
        let mut counts = [0; DiseaseStatus::COUNT];
        for person in &self.persons {
            counts[person.disease_status() as usize] += 1;
        }
        counts
    }
}
