//! An agent-based epidemic simulation driven by an external mobility model.
//!
//! The central object of an episim run is the [`Context`]. It owns the population and
//! advances it one simulated day (iteration) at a time. The modules of a run are:
//! * a population of persons with their disease state, vaccination record and a ledger of
//!   traceable contacts ([`person`], [`population`]),
//! * a transmission model that evaluates the containers (facilities and vehicles) persons
//!   visited during the day ([`infection`]),
//! * an age-dependent disease progression model that also handles quarantine and contact
//!   tracing ([`progression`]),
//! * a vaccination model that hands out a limited daily supply of first doses and boosters
//!   ([`vaccination`]),
//! * initial infection seeding ([`seeding`]),
//! * restriction schedules, fixed or derived from mobility-reduction data ([`policy`]).
//!
//! The container visits of each day come from a [`mobility::MobilitySource`]. All random
//! draws are derived from one explicit [`random::RandomSource`], so runs are reproducible
//! regardless of how the containers are spread over threads.
pub mod container;
pub mod context;
pub mod error;
pub mod hashing;
pub mod infection;
pub mod log;
pub mod mobility;
pub mod numeric;
pub mod params;
pub mod person;
pub mod policy;
pub mod population;
pub mod prelude;
pub mod progression;
pub mod random;
pub mod report;
pub mod runner;
pub mod seeding;
pub mod snapshot;
pub mod strain;
pub mod time;
pub mod vaccination;

pub use crate::context::Context;
pub use crate::error::EpisimError;

// Re-exports for the macros
pub use paste;
pub use rand;
