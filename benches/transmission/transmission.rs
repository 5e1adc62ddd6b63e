use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use episim::infection::{Exposure, InfectionModel};
use episim::prelude::*;
use episim::vaccination::{VaccinationModel, VaccinationParams};

static POPULATION: usize = 10_000;
static HOUSEHOLD_SIZE: usize = 4;
static WORKPLACE_SIZE: usize = 20;
static CONTAGIOUS_EVERY: usize = 50;
static SEED: u64 = 123;

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 2, 16).unwrap()
}

fn container_types() -> Vec<ContainerTypeParams> {
    vec![
        ContainerTypeParams::new("home", 1.0),
        ContainerTypeParams::new("work", 1.47),
    ]
}

fn population() -> Population {
    let mut population = Population::new();
    for i in 0..POPULATION {
        let id = population
            .add_person(&format!("p{i}"), u8::try_from(i % 90).unwrap(), None, true)
            .unwrap();
        if i % CONTAGIOUS_EVERY == 0 {
            let person = population.get_mut(id).unwrap();
            person.infect(0.0, StrainId(0), None).unwrap();
            person
                .set_disease_status(1.0, DiseaseStatus::Contagious, None)
                .unwrap();
        }
    }
    population
}

fn visits(types: &ContainerTypes) -> Vec<ContainerVisits> {
    let home = types.resolve("home").unwrap();
    let work = types.resolve("work").unwrap();
    let mut visits = Vec::new();
    for (index, start) in (0..POPULATION).step_by(HOUSEHOLD_SIZE).enumerate() {
        let mut household =
            ContainerVisits::new(ContainerId::from_name(&format!("home{index}")), home);
        for person in start..(start + HOUSEHOLD_SIZE).min(POPULATION) {
            household = household
                .with_stay(PersonId::new(person), 0.0, 28_800.0)
                .with_stay(PersonId::new(person), 64_800.0, 86_400.0);
        }
        visits.push(household);
    }
    for (index, start) in (0..POPULATION).step_by(WORKPLACE_SIZE).enumerate() {
        let mut workplace =
            ContainerVisits::new(ContainerId::from_name(&format!("work{index}")), work);
        for person in start..(start + WORKPLACE_SIZE).min(POPULATION) {
            workplace = workplace.with_stay(PersonId::new(person), 30_600.0, 59_400.0);
        }
        visits.push(workplace);
    }
    visits
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let types = ContainerTypes::new(container_types()).unwrap();
    let population = population();
    let visits = visits(&types);
    let strains = vec![StrainParams::new("SARS_CoV_2")];
    let vaccination = VaccinationModel::new(&VaccinationParams::default(), 1.0).unwrap();
    let random = RandomSource::new(SEED);
    let restrictions = PolicyCurve::unrestricted().for_day(start_date(), &types);
    let model = InfectionModel::new(1.07e-5, 0.0, 0.0);

    c.bench_function("evaluate containers", |bencher| {
        let mut iteration = 0;
        bencher.iter(|| {
            iteration += 1;
            let exposure = Exposure {
                iteration,
                types: &types,
                restrictions: &restrictions,
                strains: &strains,
                vaccination: &vaccination,
                random: &random,
            };
            model.evaluate_all(&visits, &population, &exposure)
        });
    });

    c.bench_function("simulate 30 days", |bencher| {
        bencher.iter_batched(
            || {
                let params = EpisimParams::new(start_date(), container_types());
                let mobility = ReplayMobility::new(visits.clone());
                let context = Context::from_params(params, population.clone(), SEED).unwrap();
                (context, mobility)
            },
            |(mut context, mut mobility)| {
                context.execute(30, &mut mobility).unwrap();
                context
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(transmission_benches, criterion_benchmark);
criterion_main!(transmission_benches);
