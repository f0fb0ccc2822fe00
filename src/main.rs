// Command-line front end for the ZTP engine
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::io::stderr;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

mod cmd;
mod settings;

use cmd::bitmap::BitmapArgs;
use cmd::run::RunArgs;
use cmd::vlan::VlanArgs;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Zero-touch provisioning for access switches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Settings file
    #[arg(
        short,
        long,
        env = "ZTP_CONFIG",
        default_value = "/etc/ztp/ztp.yaml",
        global = true
    )]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision the switch of one stored record and follow the run
    Run(RunArgs),
    /// Show a switch's VLAN table or one port's VLANs
    Vlan(VlanArgs),
    /// Encode or decode VLAN port bitmaps
    Bitmap(BitmapArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose picks the level for our crates
    let level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "ztp={level},ztp_workflow={level},ztp_vlan={level},ztp_gateway={level},ztp_transfer={level},ztp_notify={level},reqwest=warn,hyper=warn,rustls=warn"
    );
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry()
        .with(filter)
        .with(fmt::layer().with_writer(stderr))
        .init();

    match cli.command {
        Commands::Bitmap(args) => cmd::bitmap::run_bitmap(args),
        Commands::Vlan(args) => {
            debug!(config = %cli.config.display(), "Loading settings");
            let settings = Settings::load(&cli.config)?;
            cmd::vlan::run_vlan(args, &settings).await
        }
        Commands::Run(args) => {
            debug!(config = %cli.config.display(), "Loading settings");
            let settings = Settings::load(&cli.config)?;
            cmd::run::run_record(args, &settings).await
        }
    }
}
