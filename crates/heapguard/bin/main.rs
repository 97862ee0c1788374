mod cmd;
use clap::{Parser, Subcommand};
use cmd::demo::DemoArgs;
use eyre::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Subcommand, Debug)]
pub enum HGSubcommand {
    #[command(about = "Run a built-in scenario against a fresh debugging heap")]
    Demo(DemoArgs),
}

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "heapguard CLI: see what the debugging heap reports for leaks, heavy hitters and invalid frees

Set RUST_LOG=heapguard=trace to log every allocation and free."
)]
pub struct HGArgs {
    #[command(subcommand)]
    pub cmd: HGSubcommand,
}

fn main() -> Result<()> {
    init_logging();
    let root_args = HGArgs::parse();

    match root_args.cmd {
        HGSubcommand::Demo(args) => {
            args.run()?;
        }
    }

    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}
