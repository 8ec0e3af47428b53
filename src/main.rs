//! CLI Entry Point for smu-daq
//!
//! Provides command-line interface for:
//! - One-shot measurements at a fixed source value
//! - Timed sweeps with an optional CSV export
//! - An interactive session driving the acquisition actor from stdin
//!
//! # Usage
//!
//! ```bash
//! smu-daq measure --source V --value 5
//! smu-daq sweep --start 0 --stop 20 --step 0.5 --dwell-ms 50 --csv iv.csv
//! smu-daq interactive
//! smu-daq init-config --path config/smu.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use smu_daq::acquisition::{
    AcquisitionActor, AcquisitionController, AcquisitionEvent, AcquisitionHandle, AcquisitionOutput, Mode,
    PlotData, SweepSpec,
};
use smu_daq::config::{Settings, DEFAULT_CONFIG_PATH};
use smu_daq::hardware::{SourceKind, Smu};
use smu_daq::logging::{self, OutputFormat, TracingConfig};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "smu-daq")]
#[command(about = "Source-measure unit acquisition: single shots, sweeps and IV curves", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Source one value and print the measured complement
    Measure {
        /// Sourced quantity (V or I)
        #[arg(long, default_value = "V")]
        source: String,

        /// Source value
        #[arg(long, allow_hyphen_values = true)]
        value: f64,
    },

    /// Run a complete sweep and print the sorted IV points
    Sweep {
        #[arg(long, allow_hyphen_values = true)]
        start: f64,

        #[arg(long, allow_hyphen_values = true)]
        stop: f64,

        #[arg(long, allow_hyphen_values = true)]
        step: f64,

        /// Time between sweep points in milliseconds
        #[arg(long, default_value = "500")]
        dwell_ms: u64,

        /// Sourced quantity (V or I)
        #[arg(long, default_value = "V")]
        source: String,

        /// Write the sample log to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Drive the controller from stdin commands
    Interactive,

    /// Write the effective configuration as TOML
    InitConfig {
        /// Destination file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    settings.validate()?;

    let format: OutputFormat = cli.log_format.parse()?;
    logging::init(TracingConfig::from_settings(&settings)?.with_format(format))?;
    info!("{} starting", settings.application.name);

    match cli.command {
        Commands::Measure { source, value } => measure_once(settings, &source, value).await,
        Commands::Sweep {
            start,
            stop,
            step,
            dwell_ms,
            source,
            csv,
        } => {
            let spec = SweepSpec::new(start, stop, step, dwell_ms)?;
            run_sweep(settings, &source, spec, csv).await
        }
        Commands::Interactive => run_interactive(settings).await,
        Commands::InitConfig { path, force } => write_config(&settings, &path, force),
    }
}

async fn measure_once(settings: Settings, source: &str, value: f64) -> Result<()> {
    let kind: SourceKind = source.parse()?;
    let mut acquisition = settings.acquisition.clone();
    acquisition.mode = Mode::Single;
    acquisition.source_kind = kind;

    let smu = Smu::from_settings(&settings.instrument, kind).await?;
    let mut controller = AcquisitionController::from_settings(smu, &acquisition)?;
    controller.set_knob(value)?;

    let result = controller.handle(AcquisitionEvent::Trigger(1)).await;
    controller.instrument().shutdown().await?;
    let output = result?;

    let measured = kind.complement();
    println!(
        "{} = {} {}  ->  {} = {} {}",
        kind.label(),
        output.source_display,
        kind.unit(),
        measured.label(),
        output.measured_display,
        measured.unit()
    );
    Ok(())
}

async fn run_sweep(settings: Settings, source: &str, spec: SweepSpec, csv: Option<PathBuf>) -> Result<()> {
    let kind: SourceKind = source.parse()?;
    let mut acquisition = settings.acquisition.clone();
    acquisition.mode = Mode::Sweep;
    acquisition.source_kind = kind;
    acquisition.sweep = spec;

    let smu = Smu::from_settings(&settings.instrument, kind).await?;
    let controller = AcquisitionController::from_settings(smu, &acquisition)?;
    let (handle, task) = AcquisitionActor::spawn(controller, &acquisition);
    let mut outputs = handle.subscribe();

    info!("Sweeping {} points", spec.point_count());
    handle.press().await?;

    loop {
        match outputs.recv().await {
            Ok(output) if output.graph_dirty => print_output(&output),
            Ok(output) if !output.sweep_active => break,
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => warn!("Skipped {} sweep updates", n),
            Err(RecvError::Closed) => bail!("acquisition actor stopped during sweep"),
        }
    }

    let plot = handle.plot_data().await?;
    handle.shutdown().await?;
    let controller = task.await?;
    controller.instrument().shutdown().await?;

    print_plot(&plot);
    if let Some(path) = csv {
        export_csv(&controller, &path)?;
    }
    Ok(())
}

#[cfg(feature = "storage_csv")]
fn export_csv(controller: &AcquisitionController, path: &Path) -> Result<()> {
    controller.sample_log().export_csv(path)?;
    println!("Wrote {} samples to {}", controller.sample_log().len(), path.display());
    Ok(())
}

#[cfg(not(feature = "storage_csv"))]
fn export_csv(_controller: &AcquisitionController, _path: &Path) -> Result<()> {
    bail!("CSV export requires the 'storage_csv' feature")
}

const INTERACTIVE_HELP: &str = "\
commands:
  trigger                         press the trigger
  tick                            run one timer step now
  mode single|sweep               select acquisition mode
  source V|I                      select sourced quantity
  knob VALUE                      set the manual source value
  sweep START STOP STEP DWELL_MS  set sweep parameters
  clear                           clear the sample log
  plot                            print sorted points
  status                          print controller state
  quit";

async fn run_interactive(settings: Settings) -> Result<()> {
    let acquisition = settings.acquisition.clone();
    let smu = Smu::from_settings(&settings.instrument, acquisition.source_kind).await?;
    let controller = AcquisitionController::from_settings(smu, &acquisition)?;
    let (handle, task) = AcquisitionActor::spawn(controller, &acquisition);

    // Print samples produced by the sweep timer as they arrive.
    let mut outputs = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match outputs.recv().await {
                Ok(output) if output.graph_dirty => print_output(&output),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{INTERACTIVE_HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() == Some(&"quit") {
            break;
        }
        if let Err(e) = run_interactive_command(&handle, &words).await {
            println!("error: {e:#}");
        }
    }

    handle.shutdown().await?;
    let controller = task.await?;
    printer.abort();
    controller.instrument().shutdown().await?;
    Ok(())
}

async fn run_interactive_command(handle: &AcquisitionHandle, words: &[&str]) -> Result<()> {
    match words {
        [] => {}
        ["trigger"] => {
            let output = handle.press().await?;
            if !output.graph_dirty {
                println!("sweep active: {}", output.sweep_active);
            }
        }
        ["tick"] => {
            handle.tick().await?;
        }
        ["mode", mode] => handle.set_mode(mode.parse()?).await?,
        ["source", kind] => handle.set_source_kind(kind.parse()?).await?,
        ["knob", value] => handle.set_knob(value.parse()?).await?,
        ["sweep", start, stop, step, dwell] => {
            let spec = SweepSpec::new(start.parse()?, stop.parse()?, step.parse()?, dwell.parse()?)?;
            handle.set_sweep(spec).await?;
        }
        ["clear"] => handle.clear_log().await?,
        ["plot"] => print_plot(&handle.plot_data().await?),
        ["status"] => println!("{}", serde_json::to_string_pretty(&handle.snapshot().await?)?),
        ["help"] => println!("{INTERACTIVE_HELP}"),
        other => bail!("unknown command '{}' (try 'help')", other.join(" ")),
    }
    Ok(())
}

fn write_config(settings: &Settings, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, settings.to_toml()?)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn print_output(output: &AcquisitionOutput) {
    println!("source {:>12}  measured {:>12}", output.source_display, output.measured_display);
}

fn print_plot(plot: &PlotData) {
    println!("{:>14}  {:>14}", plot.x_label, plot.y_label);
    for [x, y] in &plot.points {
        println!("{x:>14.4}  {y:>14.6}");
    }
}
