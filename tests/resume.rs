use std::path::Path;

use episim::prelude::*;
use tempfile::tempdir;

fn load() -> (EpisimParams, Population, ReplayMobility) {
    let params = EpisimParams::load(Path::new("tests/data/config.json")).unwrap();
    let population = Population::from_csv(Path::new("tests/data/population.csv")).unwrap();
    let types = params.container_types().unwrap();
    let mobility =
        ReplayMobility::from_csv(Path::new("tests/data/visits.csv"), &population, &types).unwrap();
    (params, population, mobility)
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    let dir = tempdir().unwrap();
    let (params, population, mut mobility) = load();
    let mut full = Context::from_params(params, population, 17).unwrap();
    full.set_snapshot_directory(dir.path());
    let full_summaries = full.execute(6, &mut mobility).unwrap();
    assert!(dir.path().join(Snapshot::file_name(2)).exists());
    assert!(dir.path().join(Snapshot::file_name(4)).exists());
    assert!(dir.path().join(Snapshot::file_name(6)).exists());

    let (params, population, mut mobility) = load();
    let policy = params.policy(&params.container_types().unwrap()).unwrap();
    let snapshot = Snapshot::read(&dir.path().join(Snapshot::file_name(2))).unwrap();
    let mut resumed = Context::from_snapshot(params, population, policy, snapshot).unwrap();
    assert_eq!(resumed.iteration(), 2);
    let resumed_summaries = resumed.execute(4, &mut mobility).unwrap();

    assert_eq!(resumed.iteration(), 6);
    assert_eq!(resumed_summaries, full_summaries[2..]);
    assert_eq!(resumed.snapshot(), full.snapshot());
}

#[test]
fn same_seed_same_run() {
    let run = |seed| {
        let (params, population, mut mobility) = load();
        let mut context = Context::from_params(params, population, seed).unwrap();
        context.execute(5, &mut mobility).unwrap();
        context.snapshot()
    };
    assert_eq!(run(3), run(3));
}

#[test]
fn snapshot_of_other_population_is_rejected() {
    let (params, population, mut mobility) = load();
    let mut context = Context::from_params(params, population, 1).unwrap();
    context.execute(1, &mut mobility).unwrap();
    let mut snapshot = context.snapshot();
    snapshot.persons.pop();

    let (params, population, _) = load();
    let policy = params.policy(&params.container_types().unwrap()).unwrap();
    assert!(Context::from_snapshot(params, population, policy, snapshot).is_err());
}
