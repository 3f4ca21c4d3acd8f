use slp_sim::core::main::run_sim;

fn main() -> anyhow::Result<()> {
    let outcome = run_sim(std::env::args_os().collect())?;
    if let Some(capture) = outcome.captured {
        println!(
            "Source {} captured by adversary {}",
            capture.source, capture.adversary
        );
    }
    Ok(())
}
