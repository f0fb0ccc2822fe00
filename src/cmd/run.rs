use clap::Args;
use color_eyre::eyre::{bail, Result};
use std::sync::Arc;
use tracing::{info, warn};
use ztp_workflow::{RunEvent, RunOutcome, StartOptions, TaskDispatcher};

use crate::settings::Settings;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Id of the WAITING record to provision
    pub record: i64,

    /// Management VLAN for automatic VLAN change, overriding the settings file
    #[arg(long)]
    pub management_vlan: Option<u16>,

    /// Push a full config after the device has rebooted
    #[arg(long, default_value_t = false)]
    pub push_full_config: bool,

    /// Command file in the transfer server's full-config directory
    #[arg(long, requires = "push_full_config")]
    pub full_config_file: Option<String>,

    /// Extra command to push, may be repeated
    #[arg(long = "command", requires = "push_full_config")]
    pub commands: Vec<String>,
}

/// Start a record and follow it until it ends; Ctrl+C stops it
pub async fn run_record(args: RunArgs, settings: &Settings) -> Result<()> {
    let engine = Arc::new(settings.engine()?);
    let mut events = engine.subscribe();
    let dispatcher = TaskDispatcher::new(engine);

    let options = StartOptions {
        management_vlan: args.management_vlan,
        push_full_config: args.push_full_config,
        full_config_commands: args.commands,
        full_config_filename: args.full_config_file,
    };
    let run = dispatcher.start_record(args.record, options).await?;
    println!("Record {} started, run {}", args.record, run);

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let RunEvent::StepStarted { step, .. } = event {
                info!(step = %step, "Step");
            }
        }
    });

    // the wait future owns the run's join handle, so it is kept across the select
    let wait = dispatcher.wait(&run);
    tokio::pin!(wait);
    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!(record = args.record, "Ctrl+C received, stopping run");
            dispatcher.stop_record(args.record).await?;
            wait.await
        }
    };

    match outcome {
        Some(RunOutcome::Completed) => {
            println!("Record {} provisioned", args.record);
            Ok(())
        }
        Some(RunOutcome::Cancelled) => {
            println!("Record {} stopped and returned to WAITING", args.record);
            Ok(())
        }
        Some(RunOutcome::Failed(reason)) => bail!("run {run} failed: {reason}"),
        None => bail!("run {run} is no longer tracked"),
    }
}
