use anyhow::Result;
use tapwire_cli::{print_interfaces, run, Cli};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.list_interfaces {
        return print_interfaces();
    }

    let stats = run(&cli)?;
    eprintln!("\n=== Capture Statistics ===");
    eprintln!("{}", stats.format());
    if stats.has_significant_drops(1.0) {
        eprintln!("Warning: {:.2}% of packets were lost", stats.drop_rate());
    }

    Ok(())
}
