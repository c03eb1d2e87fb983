//! calmtrace CLI
//!
//! Commands:
//! - replay: Feed a recorded event stream through a session and print analyses
//! - score: Score a single normalized feature vector
//! - history: Summarize a persisted history store
//! - config: Print or validate a configuration file
//! - doctor: Diagnose configuration, model and store health

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use calmtrace::history::{FileStore, HistoryRing, KeyValueStore, HISTORY_KEY};
use calmtrace::pipeline::{parse_events, ReplayAnalysis, ReplayProcessor};
use calmtrace::scorer::{DenseModel, StressScorer};
use calmtrace::{StressConfig, StressError, CALMTRACE_VERSION, PRODUCER_NAME};

/// calmtrace - On-device stress scoring from interaction signals
#[derive(Parser)]
#[command(name = "calmtrace")]
#[command(version = CALMTRACE_VERSION)]
#[command(about = "Score stress from typing, touch and motion signals", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded event stream and print the analyses
    Replay {
        /// Input file path (use - for stdin); JSON array or NDJSON
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Model artifact (JSON); falls back to the heuristic if unusable
        #[arg(long)]
        model: Option<PathBuf>,

        /// History store directory; loaded before and saved after the replay
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Score one normalized vector: typing_speed backspace_ratio touch_pressure session_length
    Score {
        #[arg(required = true, num_args = 4, allow_hyphen_values = true)]
        values: Vec<f64>,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Model artifact (JSON)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize persisted stress history
    ///
    /// Loads strictly: an unreadable store is reported as an error and left
    /// untouched, whereas `replay --store` would reset it to empty.
    History {
        /// History store directory
        #[arg(long)]
        store: PathBuf,

        /// Configuration file (JSON); supplies history capacity and trend delta
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration, or validate a configuration file
    Config {
        /// Configuration file to validate
        #[arg(long)]
        validate: Option<PathBuf>,
    },

    /// Diagnose configuration, model and store health
    Doctor {
        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a model artifact
        #[arg(long)]
        model: Option<PathBuf>,

        /// Check a history store directory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one analysis per line)
    Ndjson,
    /// JSON array of analyses
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> Result<(), CalmCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            output_format,
            config,
            model,
            store,
        } => cmd_replay(
            &input,
            &output,
            output_format,
            config.as_deref(),
            model.as_deref(),
            store.as_deref(),
        ),

        Commands::Score {
            values,
            config,
            model,
            json,
        } => cmd_score(&values, config.as_deref(), model.as_deref(), json),

        Commands::History {
            store,
            config,
            json,
        } => cmd_history(&store, config.as_deref(), json),

        Commands::Config { validate } => cmd_config(validate.as_deref()),

        Commands::Doctor {
            config,
            model,
            store,
            json,
        } => cmd_doctor(config.as_deref(), model.as_deref(), store.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<StressConfig, CalmCliError> {
    match path {
        Some(path) => Ok(StressConfig::from_file(path)?),
        None => Ok(StressConfig::default()),
    }
}

fn build_scorer(config: &StressConfig, model: Option<&Path>) -> StressScorer {
    match model {
        Some(path) => StressScorer::with_model_file(config, path),
        None => StressScorer::heuristic_only(config),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    config_path: Option<&Path>,
    model: Option<&Path>,
    store_dir: Option<&Path>,
) -> Result<(), CalmCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let events = parse_events(&input_data)?;
    if events.is_empty() {
        return Err(CalmCliError::NoEvents);
    }

    let config = load_config(config_path)?;
    let scorer = build_scorer(&config, model);
    let mut processor = ReplayProcessor::new(config.clone(), scorer);

    let mut store = match store_dir {
        Some(dir) => {
            let store = FileStore::open(dir)?;
            processor = processor.with_history(HistoryRing::load(&store, config.history.clone()));
            Some(store)
        }
        None => None,
    };

    let mut analyses = processor.process_all(&events)?;
    if analyses.is_empty() {
        if let Some(last) = events.last() {
            log::info!("stream has no analyze events; scoring final state");
            analyses.extend(processor.analyze_at(last.timestamp_ms()));
        }
    }

    if let (Some(store), Some(session)) = (store.as_mut(), processor.session()) {
        session.save_history(store)?;
        log::info!("saved {} readings to history store", session.history().len());
    }

    let output_data = format_output(&analyses, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn cmd_score(
    values: &[f64],
    config_path: Option<&Path>,
    model: Option<&Path>,
    json: bool,
) -> Result<(), CalmCliError> {
    let config = load_config(config_path)?;
    let scorer = build_scorer(&config, model);
    let vector = calmtrace::FeatureVector::from_slice(values)?;
    let analysis = scorer.analyze(&vector);

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        println!("Probability: {:.4}", analysis.probability);
        println!("Score:       {}", analysis.score);
        println!("Level:       {}", analysis.level.as_str());
        println!("Source:      {:?}", analysis.source);
    }
    Ok(())
}

/// Strict history load for inspection
fn load_history_strict(store_dir: &Path, config: &StressConfig) -> Result<HistoryRing, CalmCliError> {
    if !store_dir.is_dir() {
        return Err(CalmCliError::MissingStore(store_dir.to_path_buf()));
    }
    let store = FileStore::open(store_dir)?;
    let ring = match store.get(HISTORY_KEY)? {
        Some(json) => HistoryRing::try_from_json(&json, config.history.clone())?,
        None => HistoryRing::new(config.history.clone()),
    };
    Ok(ring)
}

fn cmd_history(store_dir: &Path, config_path: Option<&Path>, json: bool) -> Result<(), CalmCliError> {
    let config = load_config(config_path)?;
    let ring = load_history_strict(store_dir, &config)?;
    let summary = ring.summary_at(&Local::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Stress History");
    println!("==============");
    println!("Readings:      {}", summary.reading_count);
    if let Some(latest) = &summary.latest {
        println!("Latest score:  {} ({})", latest.score, latest.level.as_str());
    }
    println!("Today average: {}", summary.today_average_score);
    println!("Trend:         {:?}", summary.trend);
    if !summary.hourly_averages.is_empty() {
        println!("\nHourly averages:");
        for (hour, average) in &summary.hourly_averages {
            println!("  {:02}:00  {:5.1}", hour, average);
        }
    }
    Ok(())
}

fn cmd_config(validate: Option<&Path>) -> Result<(), CalmCliError> {
    match validate {
        Some(path) => {
            StressConfig::from_file(path)?;
            println!("{}: valid", path.display());
        }
        None => println!("{}", StressConfig::default().to_json_pretty()?),
    }
    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    model: Option<&Path>,
    store: Option<&Path>,
    json: bool,
) -> Result<(), CalmCliError> {
    let mut checks = vec![DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("calmtrace v{}", CALMTRACE_VERSION),
    }];

    if let Some(path) = config {
        checks.push(match StressConfig::from_file(path) {
            Ok(_) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} is valid", path.display()),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {}", e),
            },
        });
    }

    checks.push(match model {
        Some(path) => match DenseModel::from_file(path) {
            Ok(model) => DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Ok,
                message: format!("'{}' loaded ({} layers)", model.name, model.layers.len()),
            },
            Err(e) => DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Warning,
                message: format!("Model unusable, heuristic fallback will be used: {}", e),
            },
        },
        None => DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Ok,
            message: "No model configured (heuristic scoring)".to_string(),
        },
    });

    if let Some(dir) = store {
        checks.push(check_store(dir));
    }

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
            message: "stdin is a pipe (replay with -i - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: CALMTRACE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("calmtrace Doctor Report");
        println!("=======================");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CalmCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_store(dir: &Path) -> DoctorCheck {
    if !dir.is_dir() {
        return DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Warning,
            message: "Store directory does not exist".to_string(),
        };
    }
    let store = match FileStore::open(dir) {
        Ok(store) => store,
        Err(e) => {
            return DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot open store: {}", e),
            }
        }
    };
    match store.get(HISTORY_KEY) {
        Ok(None) => DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Ok,
            message: "No history persisted yet".to_string(),
        },
        Ok(Some(json)) => match HistoryRing::try_from_json(&json, Default::default()) {
            Ok(ring) => DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} readings, trend {:?}", ring.len(), ring.trend()),
            },
            Err(e) => DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Error,
                message: format!("Unreadable history (would load as empty): {}", e),
            },
        },
        Err(e) => DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read history: {}", e),
        },
    }
}

fn format_output(analyses: &[ReplayAnalysis], format: &OutputFormat) -> Result<String, CalmCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for analysis in analyses {
                lines.push(serde_json::to_string(analysis)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(analyses)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(analyses)?),
    }
}

// Error types
#[derive(Debug)]
enum CalmCliError {
    Io(io::Error),
    Stress(StressError),
    Json(serde_json::Error),
    NoEvents,
    MissingStore(PathBuf),
    DoctorFailed,
}

impl From<io::Error> for CalmCliError {
    fn from(e: io::Error) -> Self {
        CalmCliError::Io(e)
    }
}

impl From<StressError> for CalmCliError {
    fn from(e: StressError) -> Self {
        CalmCliError::Stress(e)
    }
}

impl From<serde_json::Error> for CalmCliError {
    fn from(e: serde_json::Error) -> Self {
        CalmCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CalmCliError> for CliError {
    fn from(e: CalmCliError) -> Self {
        match e {
            CalmCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CalmCliError::Stress(StressError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run `calmtrace config` to see the default configuration".to_string()),
            },
            CalmCliError::Stress(e @ StressError::InvalidVector { .. }) => CliError {
                code: "VECTOR_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Pass exactly four normalized values".to_string()),
            },
            CalmCliError::Stress(StressError::Io(e)) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CalmCliError::Stress(e @ StressError::StoreError(_)) => CliError {
                code: "STORE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the store directory; `calmtrace doctor --store <dir>` inspects it".to_string()),
            },
            CalmCliError::Stress(e @ StressError::ModelError(_)) => CliError {
                code: "MODEL_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run `calmtrace doctor --model <file>` to check the artifact".to_string()),
            },
            CalmCliError::Stress(StressError::JsonError(e)) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CalmCliError::Stress(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Events must be tagged JSON objects, as an array or one per line".to_string()),
            },
            CalmCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CalmCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input contains at least one event".to_string()),
            },
            CalmCliError::MissingStore(path) => CliError {
                code: "STORE_NOT_FOUND".to_string(),
                message: format!("{} is not a directory", path.display()),
                hint: Some("Create the store with `calmtrace replay --store <dir>`".to_string()),
            },
            CalmCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the check results above".to_string()),
            },
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use calmtrace::history::MemoryStore;
    use calmtrace::MonitoringSession;
    use pretty_assertions::assert_eq;

    fn code_of(e: CalmCliError) -> String {
        CliError::from(e).code
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let err = load_config(Some(Path::new("/nonexistent/calmtrace.json"))).unwrap_err();
        assert_eq!(code_of(err), "IO_ERROR");
    }

    #[test]
    fn test_error_codes_by_kind() {
        assert_eq!(code_of(StressError::StoreError("bad key".into()).into()), "STORE_ERROR");
        assert_eq!(code_of(StressError::ModelError("no layers".into()).into()), "MODEL_ERROR");
        assert_eq!(code_of(StressError::InvalidEvent("out of order".into()).into()), "PARSE_ERROR");
        assert_eq!(code_of(StressError::InvalidConfig("zero".into()).into()), "CONFIG_ERROR");
    }

    #[test]
    fn test_history_load_uses_configured_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        let session = MonitoringSession::with_defaults(0);
        for i in 0..10 {
            session.log_mood(50, i * 1_000);
        }
        session.save_history(&mut store).unwrap();

        let mut config = StressConfig::default();
        config.history.capacity = 4;
        let ring = load_history_strict(dir.path(), &config).unwrap();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.capacity(), 4);
    }

    #[test]
    fn test_history_load_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        store.put(HISTORY_KEY, "{corrupt".to_string()).unwrap();

        let err = load_history_strict(dir.path(), &StressConfig::default()).unwrap_err();
        assert_eq!(code_of(err), "JSON_ERROR");
        // the corrupt data is left in place
        assert_eq!(store.get(HISTORY_KEY).unwrap().as_deref(), Some("{corrupt"));

        // the lenient path used by replay resets it
        let mut memory = MemoryStore::new();
        memory.put(HISTORY_KEY, "{corrupt".to_string()).unwrap();
        assert!(HistoryRing::load(&memory, Default::default()).is_empty());
    }

    #[test]
    fn test_missing_store_dir() {
        let err = load_history_strict(Path::new("/nonexistent/store"), &StressConfig::default()).unwrap_err();
        assert_eq!(code_of(err), "STORE_NOT_FOUND");
    }
}
