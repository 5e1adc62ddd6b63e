//! The mobility feed. The activity simulation hands the core one batch of container visits
//! per iteration through a [`MobilitySource`].

use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate, Weekday};
use log::{debug, trace};
use serde::Deserialize;

use crate::container::{ContainerId, ContainerTypeId, ContainerTypes, ContainerVisits, Occupancy};
use crate::error::EpisimError;
use crate::hashing::{HashMap, HashMapExt};
use crate::population::Population;

/// Supplies the container visits of a simulated day.
pub trait MobilitySource {
    /// The visits of `iteration`, whose calendar date is `date`.
    ///
    /// # Errors
    ///
    /// Implementations return an error if the day's input can't be produced.
    fn visits(&mut self, iteration: i64, date: NaiveDate)
        -> Result<Vec<ContainerVisits>, EpisimError>;
}

#[derive(Deserialize, Debug)]
struct VisitRecord {
    person: String,
    container: String,
    #[serde(rename = "type")]
    kind: String,
    enter: f64,
    leave: f64,
    district: Option<String>,
    weekday: Option<String>,
}

/// Replays the same typical day (or one typical day per weekday) on every iteration.
#[derive(Clone, Debug, Default)]
pub struct ReplayMobility {
    every_day: Vec<ContainerVisits>,
    by_weekday: HashMap<Weekday, Vec<ContainerVisits>>,
}

impl ReplayMobility {
    /// Replays `visits` on every day.
    #[must_use]
    pub fn new(visits: Vec<ContainerVisits>) -> Self {
        ReplayMobility {
            every_day: visits,
            by_weekday: HashMap::new(),
        }
    }

    /// Loads visits from a CSV file with the columns
    /// `person, container, type, enter, leave, district, weekday`. Rows without a weekday
    /// are replayed on days with no weekday-specific rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read, a row is malformed or refers to an
    /// unknown person or container type, or the file has no rows.
    pub fn from_csv(
        path: &Path,
        population: &Population,
        types: &ContainerTypes,
    ) -> Result<Self, EpisimError> {
        let file = std::fs::File::open(path)?;
        let mobility = Self::from_reader(file, population, types)?;
        debug!(
            "loaded {} containers from {}",
            mobility.every_day.len()
                + mobility.by_weekday.values().map(Vec::len).sum::<usize>(),
            path.display()
        );
        Ok(mobility)
    }

    /// Reads visits from CSV data. See [`ReplayMobility::from_csv`].
    ///
    /// # Errors
    ///
    /// See [`ReplayMobility::from_csv`].
    pub fn from_reader<R: Read>(
        reader: R,
        population: &Population,
        types: &ContainerTypes,
    ) -> Result<Self, EpisimError> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut every_day = DayBuilder::default();
        let mut by_weekday: HashMap<Weekday, DayBuilder> = HashMap::new();
        let mut rows = 0;

        for result in reader.deserialize() {
            let record: VisitRecord = result?;
            rows += 1;
            let person = population
                .lookup(&record.person)
                .ok_or_else(|| EpisimError::UnknownPerson(record.person.clone()))?;
            let kind = types.resolve(&record.kind)?;
            let occupancy = Occupancy {
                person,
                enter: record.enter,
                leave: record.leave,
            };
            let day = match record.weekday.as_deref().filter(|w| !w.is_empty()) {
                Some(weekday) => {
                    let weekday: Weekday = weekday.parse().map_err(|_| {
                        EpisimError::EpisimError(format!("Invalid weekday `{weekday}`"))
                    })?;
                    by_weekday.entry(weekday).or_default()
                }
                None => &mut every_day,
            };
            let district = record.district.filter(|d| !d.is_empty());
            day.push(&record.container, kind, district, occupancy);
        }
        if rows == 0 {
            return Err(EpisimError::EmptyInput("visits".to_string()));
        }

        Ok(by_weekday.into_iter().fold(
            ReplayMobility::new(every_day.containers),
            |mobility, (weekday, day)| mobility.with_weekday(weekday, day.containers),
        ))
    }

    /// Replays `visits` on `weekday` instead of the default day.
    #[must_use]
    pub fn with_weekday(mut self, weekday: Weekday, visits: Vec<ContainerVisits>) -> Self {
        self.by_weekday.insert(weekday, visits);
        self
    }
}

impl MobilitySource for ReplayMobility {
    fn visits(
        &mut self,
        iteration: i64,
        date: NaiveDate,
    ) -> Result<Vec<ContainerVisits>, EpisimError> {
        let visits = self
            .by_weekday
            .get(&date.weekday())
            .unwrap_or(&self.every_day);
        trace!("iteration {iteration}: replaying {} containers", visits.len());
        Ok(visits.clone())
    }
}

/// Groups rows into containers, keeping the order in which containers first appear.
#[derive(Default)]
struct DayBuilder {
    containers: Vec<ContainerVisits>,
    index: HashMap<String, usize>,
}

impl DayBuilder {
    fn push(
        &mut self,
        container: &str,
        kind: ContainerTypeId,
        district: Option<String>,
        occupancy: Occupancy,
    ) {
        let index = match self.index.get(container) {
            Some(index) => *index,
            None => {
                self.containers.push(ContainerVisits {
                    id: ContainerId::from_name(container),
                    kind,
                    district,
                    occupancy: Vec::new(),
                });
                self.index
                    .insert(container.to_string(), self.containers.len() - 1);
                self.containers.len() - 1
            }
        };
        self.containers[index].occupancy.push(occupancy);
    }
}
