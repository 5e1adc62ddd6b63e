use episim::prelude::*;

fn main() -> anyhow::Result<()> {
    let context = run_with_args().map_err(|error| anyhow::anyhow!(error))?;

    let counts = context.population().status_counts();
    println!(
        "Finished {} iterations with {} persons",
        context.iteration(),
        context.population().len()
    );
    for (status, count) in DiseaseStatus::iter().zip(counts) {
        println!("{status}: {count}");
    }
    Ok(())
}
