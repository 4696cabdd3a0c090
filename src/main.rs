// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use textwai::app_config::{self, Config};
use textwai::app_controller::Controller;
use textwai::processing::progress::CancellationFlag;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the configured pipeline over text files (default command)
    #[command(alias = "run")]
    Process(ProcessArgs),

    /// List the models available on the inference service
    Models {
        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: String,
    },

    /// Generate shell completions for textwai
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug, Clone)]
struct ProcessArgs {
    /// Input text files or directories to process
    #[arg(value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Directory for all outputs (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Model used by every enabled operation
    #[arg(short, long)]
    model: Option<String>,

    /// Chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Overlap between chunks in characters
    #[arg(long)]
    overlap: Option<usize>,

    /// Index of the chunking preset to use
    #[arg(long)]
    preset: Option<usize>,

    /// Send each file as a single chunk
    #[arg(long)]
    whole_file: bool,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Echo every chunk back instead of calling the inference service
    #[arg(long)]
    dry_run: bool,
}

/// textwai - chunked text processing with local LLMs
///
/// Translates, paraphrases and prepares texts for audiobooks by splitting
/// them into overlapping chunks and running each chunk through Ollama.
#[derive(Parser, Debug)]
#[command(name = "textwai")]
#[command(version = "0.1.0")]
#[command(about = "Chunked text processing with local LLMs")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "textwai splits long texts into overlapping chunks, runs a pipeline of LLM operations over them and merges the results.

EXAMPLES:
    textwai book.txt                            # Run the configured pipeline
    textwai -f book.txt                         # Force overwrite existing outputs
    textwai -m llama3:8b --preset 0 notes/      # Process a directory with another model
    textwai --dry-run book.txt                  # Check chunking and merging without a model
    textwai models                              # List available models
    textwai completions bash > textwai.bash     # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

OUTPUTS:
    <name>_processed_step_01_translated.txt     # After each step
    <name>_processed.txt                        # Final result")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    process: ProcessArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji and ANSI color for log level
    fn decoration(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌ ", "1;31"),
            Level::Warn => ("🚧 ", "1;33"),
            Level::Info => (" ", "1;32"),
            Level::Debug => ("🔍 ", "1;36"),
            Level::Trace => ("📋 ", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (emoji, color) = Self::decoration(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, emoji, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Everything is let through here; the effective level is applied with
    // set_max_level once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "textwai", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Models { config_path }) => run_models(&config_path).await,
        Some(Commands::Process(args)) => run_process(args).await,
        None => {
            if cli.process.inputs.is_empty() {
                return Err(anyhow!("INPUT is required when no subcommand is specified"));
            }
            run_process(cli.process).await
        }
    }
}

/// Load the config file, writing a default one when it does not exist
fn load_or_create_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        Config::from_file(config_path)
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        config.save(config_path)?;
        Ok(config)
    }
}

fn apply_overrides(config: &mut Config, options: &ProcessArgs) {
    if let Some(model) = &options.model {
        config.override_model(model);
    }
    if let Some(preset) = options.preset {
        config.chunking.default_preset = preset;
        config.chunking.chunk_size = None;
        config.chunking.overlap = None;
    }
    if let Some(chunk_size) = options.chunk_size {
        config.chunking.chunk_size = Some(chunk_size);
    }
    if let Some(overlap) = options.overlap {
        config.chunking.overlap = Some(overlap);
    }
    if options.whole_file {
        config.chunking.process_entire_file = true;
    }
    if let Some(dir) = &options.output_dir {
        config.output.directory = Some(dir.clone());
    }
    if let Some(log_level) = options.log_level {
        config.log_level = log_level.into();
    }
}

async fn run_process(options: ProcessArgs) -> Result<()> {
    if let Some(cmd_log_level) = options.log_level {
        let level: app_config::LogLevel = cmd_log_level.into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = load_or_create_config(&options.config_path)?;
    apply_overrides(&mut config, &options);

    config.validate().context("Configuration validation failed")?;
    log::set_max_level(config.log_level.to_level_filter());

    let controller = if options.dry_run {
        info!("Dry run: chunks are echoed back, no inference service is used");
        Controller::dry_run(config)
    } else {
        Controller::with_config(config)?
    };

    let cancel = CancellationFlag::new();
    let ctrl_c_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested, stopping at the next safe point");
            ctrl_c_flag.cancel();
        }
    });

    let summary = controller.run(&options.inputs, options.force_overwrite, &cancel).await?;

    if summary.failed > 0 {
        error!("{} file(s) failed", summary.failed);
        return Err(anyhow!("{} of {} file(s) failed", summary.failed, summary.total()));
    }

    Ok(())
}

async fn run_models(config_path: &str) -> Result<()> {
    let config = load_or_create_config(config_path)?;
    let controller = Controller::with_config(config)?;
    let models = controller.list_models().await?;

    if models.is_empty() {
        warn!("The inference service reports no models");
    }
    for model in models {
        println!("{}", model);
    }
    Ok(())
}
