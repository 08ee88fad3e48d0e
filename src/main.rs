/*!
 * lumisplit CLI - Command Line Interface
 */

use clap::{Parser, Subcommand, ValueEnum};
use lumisplit::{
    config::{LogLevel, SplitterConfig},
    error::{Result, EXIT_SUCCESS},
    logging, JobGroup, JobSplitter, Subscription,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lumisplit")]
#[command(version, about = "Split run/lumi organized filesets into jobs", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Path to config file
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one splitting pass and write the job groups as JSON
    Split {
        /// Fileset snapshot (JSON)
        #[arg(short, long, value_name = "FILE")]
        fileset: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the compact run/lumi list of a fileset
    Lumis {
        /// Fileset snapshot (JSON)
        #[arg(short, long, value_name = "FILE")]
        fileset: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.category(), e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => SplitterConfig::from_file(path)?,
        None => SplitterConfig::default(),
    };

    // CLI flags override the config file
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Split { fileset, output } => handle_split(&config, &fileset, output.as_deref()),
        Commands::Lumis { fileset } => handle_lumis(&fileset),
    }
}

fn read_subscription(path: &Path) -> Result<Subscription> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn handle_split(config: &SplitterConfig, fileset: &Path, output: Option<&Path>) -> Result<()> {
    let subscription = read_subscription(fileset)?;
    let splitter = JobSplitter::from_config(config)?;
    let groups: Vec<JobGroup> = splitter.split(&subscription)?;

    let json = serde_json::to_string_pretty(&groups)?;
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(())
}

fn handle_lumis(fileset: &Path) -> Result<()> {
    let subscription = read_subscription(fileset)?;
    println!("{}", subscription.lumi_list()?.to_json()?);
    Ok(())
}
