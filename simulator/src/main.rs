use anyhow::Context;
use clap::Parser;
use generator::profile::{build_session, SessionProfile};
use std::path::PathBuf;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Shake-table cross-spectral calibration driver")]
struct Args {
    /// Calibration configuration (YAML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Abort the whole run on the first failing channel
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Write per-channel PSD and transfer-function arrays as JSON into this directory
    #[arg(long)]
    dump_spectra: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// Write a synthetic calibration session into this directory and exit
    #[arg(long)]
    synthesize: Option<PathBuf>,
    /// Session profile (YAML) for --synthesize
    #[arg(long, requires = "synthesize")]
    profile: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter = if args.debug { "debug" } else { "warn,shakecal=info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if let Some(root) = args.synthesize {
        let profile = match &args.profile {
            Some(path) => SessionProfile::load(path)?,
            None => SessionProfile::default(),
        };
        let layout = build_session(&root, &profile)
            .with_context(|| format!("synthesizing session under {}", root.display()))?;
        for line in layout.exports() {
            println!("{}", line);
        }
        println!("shakecal --config {}", layout.config_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .context("either --config or --synthesize is required")?;
    let workflow = WorkflowConfig::from_args(config_path, args.strict, args.dump_spectra);
    let run = Runner::new(workflow).execute()?;

    for outcome in &run.outcomes {
        match &outcome.result {
            Ok(analysis) => {
                let stats = &analysis.statistics;
                println!(
                    "{} vs {} -> gain {:.6} +/- {:.6}, phase {:.4} +/- {:.4} deg ({} bins)",
                    outcome.channel,
                    outcome.reference_channel,
                    stats.gain_mean,
                    stats.gain_std,
                    stats.phase_mean,
                    stats.phase_std,
                    stats.bins
                );
            }
            Err(reason) => println!(
                "{} vs {} -> FAILED: {}",
                outcome.channel, outcome.reference_channel, reason
            ),
        }
    }
    println!("report: {}", run.report_path.display());

    if run.metrics.failed() > 0 {
        anyhow::bail!(
            "{} of {} channel(s) failed",
            run.metrics.failed(),
            run.metrics.channels()
        );
    }
    Ok(())
}
