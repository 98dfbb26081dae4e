//! ledgerwatch - offline tools for ledger history reconciliation
//!
//! # Commands
//!
//! - **diagnose**: compare a built ledger against a validated ledger and
//!   print the mismatch diagnosis
//! - **decode-header**: parse a 6-byte peer message header
//! - **frame**: frame a payload as a peer message, compressed when eligible
//! - **info**: print the occupancy of an empty history under the loaded
//!   configuration
//! - **sample-config**: print the default configuration
//!
//! # Configuration
//!
//! Configuration is read from a TOML file (`--config <FILE>`) and may be
//! overridden by `LEDGERWATCH_*` environment variables. See
//! `ledgerwatch sample-config` for every setting.

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ledgerwatch_common::config::LogFormat;
use ledgerwatch_common::{Config, Hash256};
use ledgerwatch_ledger::{Ledger, LedgerHistory, MemoryLedgerStore, NullLedgerLoader};
use ledgerwatch_overlay::{Message, MessageHeader, MessageType, HEADER_SIZE};

use logging::LogConfig;

/// Ledger history and consensus reconciliation tools
#[derive(Parser)]
#[command(name = "ledgerwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Log output format (defaults to the configured format)
    #[arg(long, global = true)]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Commands,
}

/// Log output format for CLI
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum CliLogFormat {
    #[default]
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Diagnose a built ledger against the validated ledger for the same sequence
    Diagnose {
        /// Ledger this node built (JSON)
        built: PathBuf,

        /// Ledger the network validated (JSON)
        valid: PathBuf,

        /// Consensus transaction set hash behind the built ledger (hex).
        /// Defaults to the built ledger's transaction set hash.
        #[arg(long, value_name = "HEX")]
        built_consensus: Option<String>,

        /// Consensus transaction set hash behind the validated ledger (hex)
        #[arg(long, value_name = "HEX")]
        valid_consensus: Option<String>,

        /// Directory of additional stored ledgers (parents etc.)
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,

        /// Reject ledgers whose hash does not match their contents
        #[arg(long)]
        verify: bool,
    },

    /// Decode a peer message header
    DecodeHeader {
        /// Header bytes as hex (at least 6 bytes)
        hex: String,
    },

    /// Frame a payload as a peer message
    Frame {
        /// Message type code
        #[arg(long = "type", value_name = "CODE")]
        message_type: u16,

        /// Payload as hex
        payload: String,

        /// Emit the uncompressed frame even when a compressed one exists
        #[arg(long)]
        plain: bool,
    },

    /// Print history occupancy and limits
    Info,

    /// Print the default configuration
    SampleConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(&cli, &config)?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Diagnose {
            built,
            valid,
            built_consensus,
            valid_consensus,
            store,
            verify,
        } => cmd_diagnose(
            &config,
            DiagnoseArgs {
                built,
                valid,
                built_consensus,
                valid_consensus,
                store,
                verify,
            },
        ),
        Commands::DecodeHeader { hex } => cmd_decode_header(&hex),
        Commands::Frame {
            message_type,
            payload,
            plain,
        } => cmd_frame(&config, message_type, &payload, plain),
        Commands::Info => cmd_info(&config),
        Commands::SampleConfig => cmd_sample_config(),
    }
}

/// Initialize logging. CLI flags win over the configured level and format.
fn init_logging(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let mut log = LogConfig::from_config(&config.logging);
    if cli.trace {
        log = log.with_level("trace");
    } else if cli.verbose {
        log = log.with_level("debug");
    }
    log = match cli.log_format {
        Some(CliLogFormat::Json) => log.json(),
        Some(CliLogFormat::Text) => LogConfig {
            format: CliLogFormat::Text.into(),
            ..log
        },
        None => log,
    };

    logging::init(&log)?;

    tracing::debug!("Logging initialized");
    Ok(())
}

/// Load configuration from file or use defaults, then apply env overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

struct DiagnoseArgs {
    built: PathBuf,
    valid: PathBuf,
    built_consensus: Option<String>,
    valid_consensus: Option<String>,
    store: Option<PathBuf>,
    verify: bool,
}

fn read_ledger(path: &Path, verify: bool) -> anyhow::Result<Ledger> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let ledger = Ledger::from_json_slice(&bytes)
        .with_context(|| format!("failed to parse ledger {}", path.display()))?;
    if verify {
        ledger
            .check_hash()
            .with_context(|| format!("ledger {} fails verification", path.display()))?;
    }
    anyhow::ensure!(
        !ledger.hash().is_zero(),
        "ledger {} has a zero hash",
        path.display()
    );
    Ok(ledger)
}

fn parse_hash(hex: Option<&str>) -> anyhow::Result<Option<Hash256>> {
    hex.map(|h| Hash256::from_hex(h).with_context(|| format!("invalid hash: {}", h)))
        .transpose()
}

/// Diagnose command handler.
///
/// The validated ledger is stored as canonical for its sequence; the built
/// ledger is reachable by hash only.
fn cmd_diagnose(config: &Config, args: DiagnoseArgs) -> anyhow::Result<()> {
    let built = read_ledger(&args.built, args.verify)?;
    let valid = read_ledger(&args.valid, args.verify)?;
    anyhow::ensure!(
        built.seq() == valid.seq(),
        "built ledger is sequence {}, validated ledger is sequence {}",
        built.seq(),
        valid.seq()
    );

    let built_consensus =
        parse_hash(args.built_consensus.as_deref())?.unwrap_or(built.info().tx_hash);
    let valid_consensus = parse_hash(args.valid_consensus.as_deref())?;

    let store = Arc::new(MemoryLedgerStore::new());
    if let Some(ref dir) = args.store {
        let count = store
            .load_dir(dir)
            .with_context(|| format!("failed to load ledgers from {}", dir.display()))?;
        tracing::info!(count, dir = ?dir, "Loaded stored ledgers");
    }
    store.insert_by_hash(built.clone());
    store.insert(valid.clone());

    let history = LedgerHistory::new(config, store);
    history.built_ledger(&built, built_consensus, built.to_json());
    let outcome = history.validated_ledger(&valid, valid_consensus);

    let report = serde_json::json!({
        "seq": built.seq(),
        "built": built.hash(),
        "valid": valid.hash(),
        "result": outcome,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Decode-header command handler.
fn cmd_decode_header(hex_str: &str) -> anyhow::Result<()> {
    let bytes = hex::decode(hex_str.trim()).context("header is not valid hex")?;
    let header = MessageHeader::parse(&bytes)?.with_context(|| {
        format!(
            "header needs {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )
    })?;

    let report = serde_json::json!({
        "compressed": header.compressed,
        "algorithm": format!("{:?}", header.algorithm),
        "payload_wire_size": header.payload_wire_size,
        "message_type": header.message_type.to_string(),
        "message_type_code": header.message_type.code(),
        "total_wire_size": header.total_wire_size(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Frame command handler. Prints the frame as hex.
fn cmd_frame(config: &Config, code: u16, payload_hex: &str, plain: bool) -> anyhow::Result<()> {
    let payload = hex::decode(payload_hex.trim()).context("payload is not valid hex")?;
    let message_type = MessageType::from(code);
    let message = Message::with_config(message_type, &payload, &config.overlay)?;
    tracing::debug!(
        message_type = %message_type,
        size = payload.len(),
        compressed = message.has_compressed(),
        "Framed message"
    );
    println!("{}", hex::encode(message.buffer(!plain)));
    Ok(())
}

/// Info command handler.
fn cmd_info(config: &Config) -> anyhow::Result<()> {
    let history = LedgerHistory::new(config, Arc::new(NullLedgerLoader));
    println!("{}", serde_json::to_string_pretty(&history.info())?);
    Ok(())
}

/// Sample config command handler.
fn cmd_sample_config() -> anyhow::Result<()> {
    print!("{}", Config::default().to_toml_string()?);
    Ok(())
}
