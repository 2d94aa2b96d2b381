//! DriveSense CLI - Command-line interface for the DriveSense engine
//!
//! Commands:
//! - replay: Run a recorded drive through a session and print the trip record
//! - validate: Check a replay file without running it
//! - config: Print the default engine configuration
//! - doctor: Diagnose configuration and environment

use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use drivesense::effects::RecordingSink;
use drivesense::road::RoadInfo;
use drivesense::session::DriveSession;
use drivesense::types::{PositionSample, SourceAvailability, SpeedUnit};
use drivesense::{EngineConfig, TelemetryError, PRODUCER_NAME, VERSION};

/// DriveSense - On-device driving telemetry engine
#[derive(Parser)]
#[command(name = "drivesense")]
#[command(version = VERSION)]
#[command(about = "Replay recorded drives through the DriveSense engine", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an NDJSON drive log and print the trip record
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path for the trip record (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Engine configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write every audio effect as NDJSON to this file
        #[arg(long)]
        effects: Option<PathBuf>,

        /// Spoken unit
        #[arg(long, value_enum)]
        unit: Option<UnitArg>,

        /// Speak the current speed periodically
        #[arg(long)]
        hands_free: bool,

        /// Evaluate time-of-day fatigue factors in UTC instead of local time
        #[arg(long)]
        utc: bool,
    },

    /// Validate an NDJSON drive log
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default engine configuration as JSON
    Config,

    /// Diagnose configuration and environment
    Doctor {
        /// Check an engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    /// Kilometres per hour
    Kmh,
    /// Miles per hour
    Mph,
}

impl From<UnitArg> for SpeedUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Kmh => SpeedUnit::Kmh,
            UnitArg::Mph => SpeedUnit::Mph,
        }
    }
}

/// One line of a replay file
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayLine {
    /// A position fix
    Position(PositionSample),
    /// Road metadata that became available at `timestamp`
    Road {
        timestamp: i64,
        #[serde(flatten)]
        info: RoadInfo,
    },
    /// Advance the clock without a fix
    Clock { timestamp: i64 },
}

impl ReplayLine {
    fn timestamp(&self) -> i64 {
        match self {
            ReplayLine::Position(sample) => sample.timestamp,
            ReplayLine::Road { timestamp, .. } | ReplayLine::Clock { timestamp } => *timestamp,
        }
    }
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

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn run(cli: Cli) -> Result<(), DriveCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            config,
            effects,
            unit,
            hands_free,
            utc,
        } => cmd_replay(
            &input,
            &output,
            config.as_deref(),
            effects.as_deref(),
            unit,
            hands_free,
            utc,
        ),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Config => cmd_config(),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn read_input(input: &Path) -> Result<Box<dyn BufRead>, DriveCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(Box::new(io::Cursor::new(buffer)))
    } else {
        Ok(Box::new(BufReader::new(fs::File::open(input)?)))
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, DriveCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<ReplayLine, DriveCliError> {
    serde_json::from_str(line)
        .map_err(|e| DriveCliError::ParseError(format!("line {}: {}", line_no, e)))
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    effects: Option<&Path>,
    unit: Option<UnitArg>,
    hands_free: bool,
    utc: bool,
) -> Result<(), DriveCliError> {
    let mut config = load_config(config)?;
    if let Some(unit) = unit {
        config.unit = unit.into();
    }
    config.hands_free |= hands_free;

    let mut session = DriveSession::try_new(config)?;
    let mut sink = RecordingSink::new();
    let mut effect_log = effects.map(fs::File::create).transpose()?;
    let mut last_ts: Option<i64> = None;

    for (index, line) in read_input(input)?.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry = parse_line(trimmed, index + 1)?;
        let now_ms = entry.timestamp();
        if last_ts.is_none() {
            session.start(SourceAvailability::Available, now_ms)?;
        }
        last_ts = Some(now_ms);

        match entry {
            ReplayLine::Position(sample) => {
                session.push_sample(&sample, &mut sink)?;
            }
            ReplayLine::Road { info, .. } => session.apply_road_info(info, now_ms, &mut sink),
            ReplayLine::Clock { .. } => session.advance(now_ms, &mut sink),
        }

        if let Some(log) = effect_log.as_mut() {
            for effect in sink.drain() {
                writeln!(log, "{}", serde_json::to_string(&EffectLogEntry { at_ms: now_ms, effect })?)?;
            }
        } else {
            sink.clear();
        }
    }

    let Some(end_ms) = last_ts else {
        return Err(DriveCliError::NoSamples);
    };
    let record = if utc {
        let now = Utc.timestamp_millis_opt(end_ms).single().unwrap_or_default();
        session.stop_at(end_ms, &now)
    } else {
        session.stop(end_ms)
    };
    let record = record.ok_or(DriveCliError::NoSamples)?;

    let output_data = record.to_json_pretty()?;
    if output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), DriveCliError> {
    let mut total_lines = 0;
    let mut errors = Vec::new();
    let mut last_ts: Option<i64> = None;

    for (index, line) in read_input(input)?.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        total_lines += 1;
        let line_no = index + 1;

        let entry = match parse_line(trimmed, line_no) {
            Ok(entry) => entry,
            Err(e) => {
                errors.push(ValidationErrorDetail {
                    line: line_no,
                    error: e.to_string(),
                });
                continue;
            }
        };

        if let Err(e) = check_entry(&entry, last_ts) {
            errors.push(ValidationErrorDetail {
                line: line_no,
                error: e.to_string(),
            });
        }
        last_ts = Some(entry.timestamp());
    }

    let report = ValidationReport {
        total_lines,
        valid_lines: total_lines - errors.len(),
        invalid_lines: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total lines:   {}", report.total_lines);
        println!("Valid lines:   {}", report.valid_lines);
        println!("Invalid lines: {}", report.invalid_lines);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Line {}: {}", err.line, err.error);
            }
        }
    }

    if report.invalid_lines > 0 {
        Err(DriveCliError::ValidationFailed(report.invalid_lines))
    } else {
        Ok(())
    }
}

/// Checks that the engine tolerates but a clean recording should not contain
fn check_entry(entry: &ReplayLine, last_ts: Option<i64>) -> Result<(), TelemetryError> {
    if let Some(last) = last_ts {
        if entry.timestamp() < last {
            return Err(TelemetryError::InvalidSample(format!(
                "timestamp {} goes back in time (previous {})",
                entry.timestamp(),
                last
            )));
        }
    }

    match entry {
        ReplayLine::Position(sample) => {
            if !sample.has_valid_fix() {
                return Err(TelemetryError::InvalidSample(format!(
                    "coordinates ({}, {}) out of range",
                    sample.latitude, sample.longitude
                )));
            }
            if let Some(speed) = sample.speed {
                if !speed.is_finite() || speed < 0.0 {
                    return Err(TelemetryError::InvalidSample(format!("speed {} m/s", speed)));
                }
            }
            Ok(())
        }
        ReplayLine::Road { info, .. } => match info.speed_limit {
            Some(limit) if !limit.is_finite() || limit < 0.0 => Err(TelemetryError::InvalidSample(
                format!("speed limit {} km/h", limit),
            )),
            _ => Ok(()),
        },
        ReplayLine::Clock { .. } => Ok(()),
    }
}

fn cmd_config() -> Result<(), DriveCliError> {
    println!("{}", EngineConfig::default().to_json()?);
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), DriveCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("DriveSense version {}", VERSION),
    });

    // Check config file if provided
    if let Some(config_path) = config {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match EngineConfig::from_json(&content) {
                    Ok(config) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid (unit {:?}, announcements {})",
                            config.unit,
                            if config.announcements_enabled { "on" } else { "off" }
                        ),
                    }),
                    Err(e) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    }),
                },
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist, defaults will be used".to_string(),
            });
        }
    }

    // Check stdin is available (for replay from a pipe)
    let stdin_message = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (replay with --input - ready)"
    };
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: stdin_message.to_string(),
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("DriveSense Doctor Report");
        println!("========================");
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
        Err(DriveCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum DriveCliError {
    Io(io::Error),
    Telemetry(TelemetryError),
    Json(serde_json::Error),
    NoSamples,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl std::fmt::Display for DriveCliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveCliError::Io(e) => write!(f, "{}", e),
            DriveCliError::Telemetry(e) => write!(f, "{}", e),
            DriveCliError::Json(e) => write!(f, "{}", e),
            DriveCliError::NoSamples => write!(f, "No replay lines found in input"),
            DriveCliError::ValidationFailed(count) => write!(f, "{} lines failed validation", count),
            DriveCliError::DoctorFailed => write!(f, "One or more health checks failed"),
            DriveCliError::ParseError(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<io::Error> for DriveCliError {
    fn from(e: io::Error) -> Self {
        DriveCliError::Io(e)
    }
}

impl From<TelemetryError> for DriveCliError {
    fn from(e: TelemetryError) -> Self {
        DriveCliError::Telemetry(e)
    }
}

impl From<serde_json::Error> for DriveCliError {
    fn from(e: serde_json::Error) -> Self {
        DriveCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DriveCliError> for CliError {
    fn from(e: DriveCliError) -> Self {
        let message = e.to_string();
        let (code, hint) = match e {
            DriveCliError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
            DriveCliError::Telemetry(TelemetryError::InvalidConfig(_)) => {
                ("CONFIG_ERROR", "Run 'drivesense config' for a valid starting point")
            }
            DriveCliError::Telemetry(_) => ("TELEMETRY_ERROR", "Run 'drivesense validate' for details"),
            DriveCliError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
            DriveCliError::NoSamples => ("NO_SAMPLES", "Ensure input file is not empty"),
            DriveCliError::ValidationFailed(_) => ("VALIDATION_FAILED", "Fix validation errors and retry"),
            DriveCliError::DoctorFailed => ("DOCTOR_FAILED", "Review the doctor report for details"),
            DriveCliError::ParseError(_) => (
                "PARSE_ERROR",
                "Each line needs a \"type\" of position, road or clock",
            ),
        };
        CliError {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

// Report types

#[derive(Serialize)]
struct EffectLogEntry {
    at_ms: i64,
    #[serde(flatten)]
    effect: drivesense::effects::Effect,
}

#[derive(Serialize)]
struct ValidationReport {
    total_lines: usize,
    valid_lines: usize,
    invalid_lines: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    line: usize,
    error: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
