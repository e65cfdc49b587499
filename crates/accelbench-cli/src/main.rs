//! accelbench command-line interface
//!
//! Measures steady-state inference latency of a model on a compute
//! accelerator, synchronising every iteration on a device fence.

use std::io;
use std::path::PathBuf;

use accelbench_backend::reference::ReferenceBackend;
use accelbench_core::reference_engine::ReferenceEngine;
use accelbench_core::{
    run_benchmark, BenchConfig, CapabilityReport, ConfigError, DeviceTarget, EnvironmentOptions,
    LogFormat, RuntimeEnvironment,
};
use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use console::style;
use tracing::{error, info};

mod exit;
mod output;

use exit::{exit_code, EXIT_CONFIG, EXIT_SUCCESS};
use output::OutputFormat;

/// accelbench - accelerator inference latency benchmark
#[derive(Parser, Debug)]
#[command(name = "accelbench")]
#[command(about = "Accelerator inference latency micro-benchmark")]
#[command(long_about = r#"
Selects a compute accelerator (compute-only NPU preferred), binds a model's
first input and output to accelerator memory, runs one warmup inference and
then times ITERATIONS fence-synchronised inferences, reporting the mean.

Run without MODEL to print the discovered capabilities.

Examples:
  # 100 iterations on the preferred NPU
  accelbench model.json

  # 500 iterations on the first compute-capable adapter
  accelbench model.json 500 gpu

  # Bound every fence wait and emit JSON
  accelbench --timeout-ms 2000 --format json model.json
"#)]
#[command(version)]
struct Cli {
    /// Model file to benchmark
    #[arg(value_name = "MODEL")]
    model: Option<PathBuf>,

    /// Timed iterations after warmup [default: 100]
    #[arg(value_name = "ITERATIONS")]
    iterations: Option<u32>,

    /// Accelerator class: npu (prefer compute-only), gpu or any
    #[arg(value_name = "DEVICE")]
    device: Option<DeviceTarget>,

    /// Configuration file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Report format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Fail a fence wait after this many milliseconds instead of waiting forever
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Reference adapter topology, e.g. "gpu0=graphics+compute,npu0=compute"
    #[arg(long, value_name = "SPEC", env = "ACCELBENCH_FAKE_ADAPTERS")]
    adapters: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {e:#}", style("error:").red().bold());
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(e) = setup_logging(&config) {
        eprintln!("{} {e:#}", style("warning:").yellow().bold());
    }

    let code = match run(&cli, &config) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("Command failed: {}", e);
            for cause in e.chain().skip(1) {
                error!("  Caused by: {}", cause);
            }
            eprintln!("{} {e:#}", style("error:").red().bold());
            exit_code(&e)
        }
    };
    std::process::exit(code);
}

/// File, then `ACCELBENCH_*` environment, then command line.
fn load_configuration(cli: &Cli) -> Result<BenchConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            let mut config = BenchConfig::default();
            config.apply_env_overrides()?;
            config
        }
    };

    if let Some(iterations) = cli.iterations {
        config.iterations = iterations;
    }
    if let Some(device) = cli.device {
        config.device = device;
    }
    if let Some(ms) = cli.timeout_ms {
        config.wait_timeout_ms = Some(ms);
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    config.validate()?;
    Ok(config)
}

/// Logs go to stderr so stdout carries only the report.
fn setup_logging(config: &BenchConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    let installed = match config.logging.format {
        LogFormat::Json => subscriber
            .json()
            .with_timer(tracing_subscriber::fmt::time::uptime())
            .try_init(),
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Pretty => subscriber.pretty().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn build_environment(cli: &Cli) -> Result<RuntimeEnvironment> {
    let backend = match &cli.adapters {
        Some(spec) => ReferenceBackend::from_spec(spec),
        None => Ok(ReferenceBackend::default_topology()),
    }
    .map_err(|reason| {
        anyhow::Error::new(ConfigError::Validation(format!("adapter topology: {reason}")))
    })?;

    let options = EnvironmentOptions::default();
    Ok(RuntimeEnvironment::new(Box::new(backend), Box::new(ReferenceEngine::new()), options))
}

fn run(cli: &Cli, config: &BenchConfig) -> Result<()> {
    let env = build_environment(cli)?;
    let mut stdout = io::stdout().lock();

    let Some(model) = &cli.model else {
        Cli::command().print_help()?;
        println!();
        let report = CapabilityReport::collect(&env);
        output::write_capabilities(&mut stdout, &report, cli.format)?;
        return Ok(());
    };

    info!(
        model = %model.display(),
        iterations = config.iterations,
        device = %config.device,
        "starting benchmark"
    );
    let outcome = run_benchmark(&env, config, model)?;
    output::write_outcome(&mut stdout, &outcome, cli.format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn positional_arguments_parse() {
        let cli = Cli::try_parse_from(["accelbench", "model.json", "250", "gpu"]).unwrap();
        assert_eq!(cli.model.as_deref(), Some(std::path::Path::new("model.json")));
        assert_eq!(cli.iterations, Some(250));
        assert_eq!(cli.device, Some(DeviceTarget::Gpu));
    }

    #[test]
    fn unknown_device_is_rejected() {
        assert!(Cli::try_parse_from(["accelbench", "model.json", "10", "tpu"]).is_err());
    }
}
