use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use seamloop_core::{
    AppConfig, CrossfadeCurve, DirectorySink, ExportProgress,
    diagnostics::init_tracing_from_config,
    fixtures::demo_recording,
    report::{build_loop_report, write_loop_report},
    samples::{load_wav, write_wav},
};

#[derive(Debug, Parser)]
#[command(name = "seamloop-cli")]
#[command(about = "Find seamless loops in a recording and export them as WAV files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Analyze {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        duration: f64,

        #[arg(long)]
        tolerance: Option<f64>,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    Export {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        start: f64,

        #[arg(long)]
        duration: f64,

        #[arg(long)]
        crossfade_ms: Option<f64>,

        #[arg(long, value_enum)]
        curve: Option<CurveArg>,

        #[arg(long, conflicts_with = "no_click_reduction")]
        click_reduction: bool,

        #[arg(long)]
        no_click_reduction: bool,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    Demo {
        #[arg(long, default_value = "data/demo")]
        output_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CurveArg {
    Linear,
    Cosine,
    Logarithmic,
    Exponential,
}

impl From<CurveArg> for CrossfadeCurve {
    fn from(value: CurveArg) -> Self {
        match value {
            CurveArg::Linear => Self::Linear,
            CurveArg::Cosine => Self::Cosine,
            CurveArg::Logarithmic => Self::Logarithmic,
            CurveArg::Exponential => Self::Exponential,
        }
    }
}

const DEMO_LOOP_SECONDS: f64 = 2.0;

fn log_progress(progress: ExportProgress) {
    tracing::debug!(percent = progress.percent(), ?progress, "export progress");
}

fn click_reduction_override(enable: bool, disable: bool) -> Option<bool> {
    match (enable, disable) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    let _telemetry = init_tracing_from_config(&config.diagnostics, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Analyze {
            input,
            duration,
            tolerance,
            output,
        } => {
            let tolerance = tolerance.unwrap_or(config.finder.default_tolerance_seconds);
            let coordinator = config.coordinator();
            let recording = Arc::new(load_wav(&input)?);
            coordinator.set_recording(Arc::clone(&recording));

            let tempo = coordinator.tempo().unwrap_or_default();
            let candidates = coordinator.find_loops(duration, tolerance);
            let report = build_loop_report(&recording, &tempo, duration, tolerance, candidates);
            match output {
                Some(path) => {
                    write_loop_report(&path, &report)?;
                    tracing::info!(
                        path = %path.display(),
                        candidates = report.candidates.len(),
                        "loop report written"
                    );
                }
                None => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Commands::Export {
            input,
            start,
            duration,
            crossfade_ms,
            curve,
            click_reduction,
            no_click_reduction,
            output_dir,
        } => {
            let coordinator = config.coordinator();
            coordinator.set_recording(Arc::new(load_wav(&input)?));

            let mut request = config.export_request(start, duration);
            if let Some(crossfade_ms) = crossfade_ms {
                request.crossfade_ms = crossfade_ms;
            }
            if let Some(curve) = curve {
                request.crossfade_curve = curve.into();
            }
            if let Some(enabled) = click_reduction_override(click_reduction, no_click_reduction) {
                request.click_reduction_enabled = enabled;
            }

            let output_dir = output_dir.unwrap_or_else(|| config.export.output_dir.clone());
            let sink = DirectorySink::new(output_dir);
            match coordinator.run(&request, &sink, log_progress) {
                Ok(receipt) => println!("{}", sink.directory().join(&receipt.filename).display()),
                Err(error) if error.is_cancelled() => {
                    tracing::info!("export cancelled");
                }
                Err(error) => return Err(error).context("loop export failed"),
            }
        }
        Commands::Demo { output_dir } => {
            let recording = Arc::new(demo_recording()?);
            write_wav(&output_dir.join("demo.wav"), &recording)?;

            let coordinator = config.coordinator();
            coordinator.set_recording(Arc::clone(&recording));
            let tolerance = config.finder.default_tolerance_seconds;
            let candidates = coordinator.find_loops(DEMO_LOOP_SECONDS, tolerance);
            let tempo = coordinator.tempo().unwrap_or_default();
            let report = build_loop_report(
                &recording,
                &tempo,
                DEMO_LOOP_SECONDS,
                tolerance,
                candidates.clone(),
            );
            write_loop_report(&output_dir.join("loops.json"), &report)?;

            let Some(best) = candidates.first() else {
                tracing::warn!("demo recording produced no loop candidates");
                return Ok(());
            };
            let request = config.export_request(best.start_time, best.duration);
            let sink = DirectorySink::new(output_dir.join("loops"));
            let receipt = coordinator
                .run(&request, &sink, log_progress)
                .context("demo export failed")?;
            tracing::info!(
                filename = %receipt.filename,
                score = best.quality_score,
                band = %best.band,
                "demo loop exported"
            );
        }
    }

    Ok(())
}
