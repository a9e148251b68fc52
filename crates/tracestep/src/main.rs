use tracestep::DemoMode;
use tracestep_common::Arch;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let arch_name = args.next().unwrap_or_else(|| "x64".to_string());
    let mode: DemoMode = args.next().as_deref().unwrap_or("step").parse()?;
    let seed = match args.next() {
        Some(seed) => seed.parse()?,
        None => 0,
    };

    let arch = Arch::from_name(&arch_name);
    log::info!("Stepping a simulated {} thread, mode {:?}, seed {}", arch, mode, seed);

    let report = tracestep::run_demo(arch, mode, seed)?;
    println!(
        "{} stops, {} instructions counted, {} blocks executed",
        report.events.len(),
        report.counted,
        report.blocks_executed
    );
    Ok(())
}
