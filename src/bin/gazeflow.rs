//! Gazeflow CLI - Command-line interface for the Gazeflow engine
//!
//! Commands:
//! - run: Stream gaze samples through the live adaptation loop
//! - analyze: Run one pipeline pass over a recorded sample file
//! - export: Convert a sample file into a session export (JSON or CSV)
//! - check-config: Validate an engine configuration file
//! - doctor: Diagnose environment and configuration health

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use gazeflow::config::ConfigError;
use gazeflow::export::ExportError;
use gazeflow::metrics::MetricsAggregator;
use gazeflow::{
    analyze_samples, Acquisition, AdaptationLoop, EngineConfig, GazeSample, JsonLinesSink,
    RawGazeSample, SessionExport, ENGINE_VERSION, PRODUCER_NAME,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Gazeflow - Real-time gaze-driven difficulty adaptation
#[derive(Parser)]
#[command(name = "gazeflow")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Turn gaze samples into flow-state and difficulty signals", long_about = None)]
struct Cli {
    /// Log filter (tracing EnvFilter syntax); logs go to stderr
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream samples through the adaptation loop (NDJSON messages on stdout)
    Run {
        /// Engine configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Sample input, one JSON sample per line (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Pace ingestion by the sample timestamps
        #[arg(long)]
        realtime: bool,

        /// Keep ticking this long after the input ends
        #[arg(long, default_value = "0")]
        linger_ms: u64,

        /// Write the buffered session as JSON on exit
        #[arg(long)]
        export_json: Option<PathBuf>,

        /// Write the buffered session as CSV on exit
        #[arg(long)]
        export_csv: Option<PathBuf>,
    },

    /// Run one pipeline pass over a sample file
    Analyze {
        /// Engine configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Sample file: JSON array or one JSON sample per line (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Export a sample file with per-sample velocities and metrics
    Export {
        /// Sample file: JSON array or one JSON sample per line (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Validate an engine configuration file
    CheckConfig {
        /// Engine configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Output report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose environment and configuration health
    Doctor {
        /// Configuration file to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum ExportFormat {
    /// JSON document with eye_data and physiological_data arrays
    Json,
    /// Flat timestamp,x,y,velocity table
    Csv,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(true).with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

fn run(cli: Cli) -> Result<(), GazeflowCliError> {
    match cli.command {
        Commands::Run {
            config,
            input,
            realtime,
            linger_ms,
            export_json,
            export_csv,
        } => cmd_run(
            &config,
            input,
            realtime,
            Duration::from_millis(linger_ms),
            export_json.as_deref(),
            export_csv.as_deref(),
        ),
        Commands::Analyze { config, input } => cmd_analyze(&config, &input),
        Commands::Export {
            input,
            format,
            output,
        } => cmd_export(&input, format, &output),
        Commands::CheckConfig { config, json } => cmd_check_config(&config, json),
        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn cmd_run(
    config_path: &Path,
    input: PathBuf,
    realtime: bool,
    linger: Duration,
    export_json: Option<&Path>,
    export_csv: Option<&Path>,
) -> Result<(), GazeflowCliError> {
    let config = EngineConfig::from_file(config_path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let sink = JsonLinesSink::new(io::stdout(), true);
        let (adaptation, acquisition) = AdaptationLoop::with_acquisition(&config, Box::new(sink));
        let session_id = adaptation.session_id();
        let handle = adaptation.spawn();

        let reader = acquisition.clone();
        let stats = tokio::task::spawn_blocking(move || feed_samples(&input, &reader, realtime))
            .await
            .map_err(|e| GazeflowCliError::Task(e.to_string()))??;
        info!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            "Input exhausted"
        );

        if !linger.is_zero() {
            tokio::time::sleep(linger).await;
        }

        let summary = handle
            .shutdown()
            .await
            .map_err(|e| GazeflowCliError::Task(e.to_string()))?;

        if export_json.is_some() || export_csv.is_some() {
            let export = SessionExport::from_samples(
                &acquisition.buffer().snapshot(),
                summary.final_state.metrics,
            )
            .with_session_id(session_id);
            if let Some(path) = export_json {
                export.save_json(path)?;
            }
            if let Some(path) = export_csv {
                export.save_csv(path)?;
            }
        }

        Ok::<(), GazeflowCliError>(())
    })
}

#[derive(Debug, Default, serde::Serialize)]
struct IngestStats {
    accepted: usize,
    rejected: usize,
}

/// Push every line of `input` through the acquisition path
fn feed_samples(
    input: &Path,
    acquisition: &Acquisition,
    realtime: bool,
) -> Result<IngestStats, GazeflowCliError> {
    let reader: Box<dyn BufRead> = if is_stdio(input) {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(input)?))
    };

    let mut stats = IngestStats::default();
    let mut last_timestamp: Option<f64> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let raw: RawGazeSample = match serde_json::from_str(trimmed) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Skipping unparseable sample");
                stats.rejected += 1;
                continue;
            }
        };

        if realtime {
            if let (Some(previous), Some(current)) = (last_timestamp, raw.timestamp) {
                let gap = current - previous;
                if gap.is_finite() && gap > 0.0 {
                    std::thread::sleep(Duration::from_secs_f64(gap));
                }
            }
            last_timestamp = raw.timestamp.or(last_timestamp);
        }

        match acquisition.ingest_raw(raw) {
            Ok(_) => stats.accepted += 1,
            Err(_) => stats.rejected += 1,
        }
    }

    Ok(stats)
}

fn read_input(input: &Path) -> Result<String, GazeflowCliError> {
    if is_stdio(input) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

/// Parse a JSON array or NDJSON sample file, keeping only valid samples
fn load_samples(input: &Path) -> Result<(Vec<GazeSample>, usize), GazeflowCliError> {
    let data = read_input(input)?;
    let raw: Vec<RawGazeSample> = if data.trim_start().starts_with('[') {
        serde_json::from_str(&data)?
    } else {
        data.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    };

    let total = raw.len();
    let mut samples = Vec::with_capacity(total);
    for (index, record) in raw.into_iter().enumerate() {
        match GazeSample::try_from(record) {
            Ok(sample) => samples.push(sample),
            Err(e) => warn!(index, error = %e, "Skipping invalid sample"),
        }
    }

    if samples.is_empty() {
        return Err(GazeflowCliError::NoSamples);
    }
    let rejected = total - samples.len();
    Ok((samples, rejected))
}

fn cmd_analyze(config_path: &Path, input: &Path) -> Result<(), GazeflowCliError> {
    let config = EngineConfig::from_file(config_path)?;
    let (samples, rejected) = load_samples(input)?;

    let report = AnalyzeReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        rejected_samples: rejected,
        pass: analyze_samples(&samples, &config),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_export(input: &Path, format: ExportFormat, output: &Path) -> Result<(), GazeflowCliError> {
    let (samples, _) = load_samples(input)?;
    let export = SessionExport::from_samples(&samples, MetricsAggregator::aggregate(&samples));

    match (format, is_stdio(output)) {
        (ExportFormat::Json, true) => println!("{}", export.to_json_pretty()?),
        (ExportFormat::Json, false) => export.save_json(output)?,
        (ExportFormat::Csv, true) => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            export.write_csv(&mut lock)?;
            lock.flush()?;
        }
        (ExportFormat::Csv, false) => export.save_csv(output)?,
    }
    Ok(())
}

fn cmd_check_config(config_path: &Path, json: bool) -> Result<(), GazeflowCliError> {
    let result = EngineConfig::from_file(config_path);
    let report = ConfigReport {
        path: config_path.display().to_string(),
        valid: result.is_ok(),
        error: result.as_ref().err().map(|e| e.to_string()),
        config: result.as_ref().ok().cloned(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Config Report");
        println!("=============");
        println!("Path:  {}", report.path);
        println!("Valid: {}", report.valid);
        if let Some(config) = &report.config {
            println!("\nEffective configuration:");
            println!("{}", config.to_json_pretty()?);
        }
        if let Some(error) = &report.error {
            println!("\nError: {}", error);
        }
    }

    match result {
        Ok(_) => Ok(()),
        Err(e) => Err(GazeflowCliError::Config(e)),
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), GazeflowCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Gazeflow version {}", ENGINE_VERSION),
    });

    if let Some(config_path) = config {
        let check = if !config_path.exists() {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            }
        } else {
            match EngineConfig::from_file(config_path) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (buffer {} samples, tick {} ms)",
                        config.buffer_capacity, config.tick_interval_ms
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid config: {}", e),
                },
            }
        };
        checks.push(check);
    }

    checks.push(match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(_) => DoctorCheck {
            name: "runtime".to_string(),
            status: CheckStatus::Ok,
            message: "Async runtime available".to_string(),
        },
        Err(e) => DoctorCheck {
            name: "runtime".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot start async runtime: {}", e),
        },
    });

    // Streaming mode reads samples from stdin
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Gazeflow Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(GazeflowCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum GazeflowCliError {
    Io(io::Error),
    Config(ConfigError),
    Json(serde_json::Error),
    Export(ExportError),
    Task(String),
    NoSamples,
    DoctorFailed,
}

impl From<io::Error> for GazeflowCliError {
    fn from(e: io::Error) -> Self {
        GazeflowCliError::Io(e)
    }
}

impl From<ConfigError> for GazeflowCliError {
    fn from(e: ConfigError) -> Self {
        GazeflowCliError::Config(e)
    }
}

impl From<serde_json::Error> for GazeflowCliError {
    fn from(e: serde_json::Error) -> Self {
        GazeflowCliError::Json(e)
    }
}

impl From<ExportError> for GazeflowCliError {
    fn from(e: ExportError) -> Self {
        GazeflowCliError::Export(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GazeflowCliError> for CliError {
    fn from(e: GazeflowCliError) -> Self {
        match e {
            GazeflowCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GazeflowCliError::Config(ConfigError::MissingField(field)) => CliError {
                code: "CONFIG_MISSING_FIELD".to_string(),
                message: format!("Missing required configuration key `{}`", field),
                hint: Some("Run 'gazeflow check-config' for details".to_string()),
            },
            GazeflowCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'gazeflow check-config' for details".to_string()),
            },
            GazeflowCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GazeflowCliError::Export(e) => CliError {
                code: "EXPORT_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the output path".to_string()),
            },
            GazeflowCliError::Task(msg) => CliError {
                code: "TASK_ERROR".to_string(),
                message: msg,
                hint: None,
            },
            GazeflowCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No valid gaze samples found in input".to_string(),
                hint: Some("Each sample needs finite timestamp, x and y fields".to_string()),
            },
            GazeflowCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct AnalyzeReport {
    producer: String,
    version: String,
    rejected_samples: usize,
    pass: gazeflow::PassReport,
}

#[derive(serde::Serialize)]
struct ConfigReport {
    path: String,
    valid: bool,
    error: Option<String>,
    config: Option<EngineConfig>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
