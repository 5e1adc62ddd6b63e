pub use crate::container::{
    ContainerId, ContainerTypeId, ContainerTypeParams, ContainerTypes, ContainerVisits,
};
pub use crate::context::{Context, IterationSummary};
pub use crate::error::EpisimError;
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::mobility::{MobilitySource, ReplayMobility};
pub use crate::params::EpisimParams;
pub use crate::person::{
    DiseaseStatus, Person, PersonId, QuarantineStatus, VaccinationStatus, VaccinationType,
};
pub use crate::policy::{PolicyBuilder, PolicyCurve};
pub use crate::population::Population;
pub use crate::random::RandomSource;
pub use crate::report::ReportOptions;
pub use crate::runner::{run, run_with_args, BaseArgs};
pub use crate::snapshot::Snapshot;
pub use crate::strain::{StrainId, StrainParams};
pub use crate::{define_report, define_rng};
pub use strum::IntoEnumIterator;
