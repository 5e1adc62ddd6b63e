//! The central object of a run.
//!
//! A [`Context`] owns the population, the parameters, the random source, the restriction
//! curve and the configured models. Each call to [`Context::execute_iteration`] simulates one
//! day in a fixed order:
//!
//! 1. contact ledger entries older than the retention window are dropped,
//! 2. due disease transitions are applied, contacts of new symptomatic persons are traced and
//!    finished quarantines are released,
//! 3. initial infections are seeded,
//! 4. first doses and then boosters are handed out,
//! 5. the day's container visits are evaluated for transmission,
//! 6. reports are written and a snapshot is taken if one is due.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{info, trace};

use crate::container::ContainerTypes;
use crate::define_rng;
use crate::error::EpisimError;
use crate::infection::{Exposure, Infection, InfectionModel};
use crate::mobility::MobilitySource;
use crate::params::EpisimParams;
use crate::person::{DiseaseStatus, QuarantineStatus, VaccinationStatus, RETENTION_DAYS};
use crate::policy::PolicyCurve;
use crate::population::Population;
use crate::progression::{ProgressionModel, ProgressionOutcome};
use crate::random::RandomSource;
use crate::report::{
    DiseaseStatusReport, ReportOptions, Reports, StrainInfectionsReport, VaccinationReport,
};
use crate::seeding::SeedingModel;
use crate::snapshot::Snapshot;
use crate::time::{date_of, day_of};
use crate::vaccination::{Doses, VaccinationModel};

define_rng!(EquipmentRng);

/// What happened during one iteration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IterationSummary {
    pub iteration: i64,
    pub progression: ProgressionOutcome,
    /// Seeded infections per strain.
    pub seeded: Vec<usize>,
    /// Infections in containers per strain.
    pub infections: Vec<usize>,
    pub first_doses: Doses,
    pub boosters: Doses,
}

pub struct Context {
    params: EpisimParams,
    population: Population,
    types: ContainerTypes,
    policy: PolicyCurve,
    random: RandomSource,
    progression: ProgressionModel,
    vaccination: VaccinationModel,
    seeding: SeedingModel,
    infection: InfectionModel,
    reports: Option<Reports>,
    snapshot_directory: Option<PathBuf>,
    iteration: i64,
}

impl Context {
    fn build(
        params: EpisimParams,
        population: Population,
        policy: PolicyCurve,
        base_seed: u64,
    ) -> Result<Self, EpisimError> {
        params.validate()?;
        let types = params.container_types()?;
        let progression = ProgressionModel::new(&params.progression, &params.tracing)?;
        let vaccination = VaccinationModel::new(&params.vaccination, params.sample_size)?;
        let seeding = SeedingModel::new(&params.initial_infections);
        let infection = InfectionModel::new(
            params.calibration_parameter,
            params.start_offset,
            params.tracing.min_contact_duration_sec,
        );
        Ok(Context {
            params,
            population,
            types,
            policy,
            random: RandomSource::new(base_seed),
            progression,
            vaccination,
            seeding,
            infection,
            reports: None,
            snapshot_directory: None,
            iteration: 0,
        })
    }

    /// Sets up a run before its first iteration: vaccinates for the capacity dates before the
    /// start date and equips persons for contact tracing.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are inconsistent.
    pub fn new(
        params: EpisimParams,
        population: Population,
        policy: PolicyCurve,
        base_seed: u64,
    ) -> Result<Self, EpisimError> {
        let mut context = Self::build(params, population, policy, base_seed)?;
        context.vaccination.init(
            &mut context.population,
            context.params.start_date,
            context.params.start_offset,
            &context.random,
        )?;

        let rate = context.progression.tracing().equipment_rate;
        let random = context.random;
        let mut traceable = 0;
        for person in context.population.iter_mut() {
            let equipped = random.sample_bool(EquipmentRng, 0, person.id().index() as u64, rate);
            person.set_traceable(equipped);
            traceable += usize::from(equipped);
        }
        info!(
            "{traceable} of {} persons are traceable",
            context.population.len()
        );
        Ok(context)
    }

    /// Sets up a run from its parameters, building the restriction curve they describe.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are inconsistent or a restriction input can't be
    /// read.
    pub fn from_params(
        params: EpisimParams,
        population: Population,
        base_seed: u64,
    ) -> Result<Self, EpisimError> {
        let policy = params.policy(&params.container_types()?)?;
        Self::new(params, population, policy, base_seed)
    }

    /// Resumes a run after the iteration `snapshot` was taken at.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are inconsistent or the snapshot does not match
    /// `population`.
    pub fn from_snapshot(
        params: EpisimParams,
        mut population: Population,
        policy: PolicyCurve,
        snapshot: Snapshot,
    ) -> Result<Self, EpisimError> {
        population.restore(snapshot.persons)?;
        let mut context = Self::build(params, population, policy, snapshot.base_seed)?;
        context.seeding.set_infections_left(snapshot.infections_left);
        context.iteration = snapshot.iteration;
        info!("resuming after iteration {}", snapshot.iteration);
        Ok(context)
    }

    /// Opens the report files of the run.
    ///
    /// # Errors
    ///
    /// Returns an error if a report file can't be created.
    pub fn add_reports(&mut self, options: ReportOptions) -> Result<(), EpisimError> {
        let mut reports = Reports::new(options);
        reports.add_report::<DiseaseStatusReport>()?;
        reports.add_report::<StrainInfectionsReport>()?;
        reports.add_report::<VaccinationReport>()?;
        self.reports = Some(reports);
        Ok(())
    }

    /// Writes snapshots into `directory` every `snapshot_interval` iterations.
    pub fn set_snapshot_directory(&mut self, directory: &Path) {
        self.snapshot_directory = Some(directory.to_path_buf());
    }

    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    #[must_use]
    pub fn params(&self) -> &EpisimParams {
        &self.params
    }

    #[must_use]
    pub fn container_types(&self) -> &ContainerTypes {
        &self.types
    }

    /// The last completed iteration; 0 before the first one.
    #[must_use]
    pub fn iteration(&self) -> i64 {
        self.iteration
    }

    #[must_use]
    pub fn date_of(&self, iteration: i64) -> NaiveDate {
        date_of(self.params.start_date, iteration)
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            iteration: self.iteration,
            base_seed: self.random.base_seed(),
            infections_left: self.seeding.infections_left(),
            persons: self.population.persons().to_vec(),
        }
    }

    /// Runs `iterations` consecutive iterations.
    ///
    /// # Errors
    ///
    /// See [`Context::execute_iteration`].
    pub fn execute(
        &mut self,
        iterations: i64,
        mobility: &mut dyn MobilitySource,
    ) -> Result<Vec<IterationSummary>, EpisimError> {
        (0..iterations)
            .map(|_| self.execute_iteration(mobility))
            .collect()
    }

    /// Runs the next iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if the mobility feed fails, a report or snapshot can't be written, or
    /// a person's state would move back in time.
    pub fn execute_iteration(
        &mut self,
        mobility: &mut dyn MobilitySource,
    ) -> Result<IterationSummary, EpisimError> {
        let iteration = self.iteration + 1;
        let date = self.date_of(iteration);
        let offset = self.params.start_offset;
        let strains = &self.params.strains;
        let random = &self.random;
        let mut summary = IterationSummary {
            iteration,
            infections: vec![0; strains.len()],
            ..IterationSummary::default()
        };

        self.population
            .purge_contacts(iteration - (RETENTION_DAYS as i64 - 1));

        summary.progression =
            self.progression
                .advance(&mut self.population, iteration, offset, strains, random)?;

        let seeded = self.seeding.handle_infections(
            &mut self.population,
            strains,
            date,
            iteration,
            offset,
            random,
        )?;
        for id in &seeded.persons {
            if let Some(person) = self.population.get_mut(*id) {
                self.progression.schedule_next(person, iteration, strains, random);
            }
        }
        summary.seeded = seeded.per_strain;

        for booster in [false, true] {
            let available = self.vaccination.capacity(date, booster);
            let doses = self.vaccination.handle_vaccination(
                &mut self.population,
                booster,
                available,
                date,
                iteration,
                offset,
                random,
            )?;
            if booster {
                summary.boosters = doses;
            } else {
                summary.first_doses = doses;
            }
        }

        let visits = mobility.visits(iteration, date)?;
        let restrictions = self.policy.for_day(date, &self.types);
        let exposure = Exposure {
            iteration,
            types: &self.types,
            restrictions: &restrictions,
            strains,
            vaccination: &self.vaccination,
            random,
        };
        let outcomes = self
            .infection
            .evaluate_all(&visits, &self.population, &exposure);
        let infections = self
            .infection
            .apply(outcomes, &mut self.population, iteration)?;
        for Infection {
            person, strain, time, ..
        } in &infections
        {
            if let Some(count) = summary.infections.get_mut(strain.0) {
                *count += 1;
            }
            if let Some(person) = self.population.get_mut(*person) {
                let day = day_of(offset, *time);
                trace!("scheduling progression of {:?} from day {day}", person.id());
                self.progression.schedule_next(person, day, strains, random);
            }
        }

        self.iteration = iteration;
        info!(
            "iteration {iteration} ({date}): {} seeded, {} infected, {} + {} doses",
            summary.seeded.iter().sum::<usize>(),
            infections.len(),
            summary.first_doses.total,
            summary.boosters.total
        );

        self.write_reports(&summary, date)?;
        if let (Some(directory), Some(interval)) =
            (&self.snapshot_directory, self.params.snapshot_interval)
        {
            if iteration % interval == 0 {
                self.snapshot().write(directory)?;
            }
        }
        Ok(summary)
    }

    fn write_reports(
        &mut self,
        summary: &IterationSummary,
        date: NaiveDate,
    ) -> Result<(), EpisimError> {
        let Some(reports) = self.reports.as_mut() else {
            return Ok(());
        };
        let iteration = summary.iteration;
        let date = date.to_string();

        let counts = self.population.status_counts();
        let count = |status: DiseaseStatus| counts[status as usize];
        let (mut quarantined, mut vaccinated, mut boosted) = (0, 0, 0);
        for person in self.population.iter() {
            quarantined += usize::from(person.quarantine_status() != QuarantineStatus::No);
            match person.vaccination_status() {
                VaccinationStatus::Vaccinated => vaccinated += 1,
                VaccinationStatus::Boosted => boosted += 1,
                VaccinationStatus::Unvaccinated => {}
            }
        }
        reports.send_report(&DiseaseStatusReport {
            iteration,
            date: date.clone(),
            susceptible: count(DiseaseStatus::Susceptible),
            infected_but_not_contagious: count(DiseaseStatus::InfectedButNotContagious),
            contagious: count(DiseaseStatus::Contagious),
            showing_symptoms: count(DiseaseStatus::ShowingSymptoms),
            critical: count(DiseaseStatus::Critical),
            recovered: count(DiseaseStatus::Recovered),
            deceased: count(DiseaseStatus::Deceased),
            quarantined,
            vaccinated,
            boosted,
        })?;

        for (index, strain) in self.params.strains.iter().enumerate() {
            reports.send_report(&StrainInfectionsReport {
                iteration,
                date: date.clone(),
                strain: strain.name.clone(),
                seeded: summary.seeded.get(index).copied().unwrap_or(0),
                infections: summary.infections[index],
            })?;
        }

        for (campaign, doses) in [("first", &summary.first_doses), ("booster", &summary.boosters)] {
            for (vaccine, count) in &doses.by_type {
                reports.send_report(&VaccinationReport {
                    iteration,
                    date: date.clone(),
                    campaign: campaign.to_string(),
                    vaccine: vaccine.to_string(),
                    doses: *count,
                })?;
            }
        }
        Ok(())
    }
}
