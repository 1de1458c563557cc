//! CLI argument definitions for `cms-etl`.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, ColorChoice, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use cms_cli::logging::{LogConfig, LogFormat};
use colorchoice_clap::Color;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(
    name = "cms-etl",
    version,
    about = "Load CMS RIF claim tables into i2b2 observation facts",
    long_about = "Load CMS Research Identifiable File tables into i2b2 observation facts.\n\n\
                  Each run loads one source table restricted to an inclusive bene_id range\n\
                  into its own observation_fact_<upload_id> table and records the job\n\
                  in the upload status table."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Logging settings implied by the global flags.
    ///
    /// An explicit `--log-level` or `-v/-q` disables the `RUST_LOG` override.
    pub fn log_config(&self) -> LogConfig {
        let level_filter = self
            .log_level
            .map_or_else(|| self.verbosity.tracing_level_filter(), LevelFilter::from);
        let with_ansi = match self.color.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.log_file.is_none() && io::stderr().is_terminal(),
        };
        LogConfig {
            level_filter,
            use_env_filter: self.log_level.is_none() && !self.verbosity.is_present(),
            with_ansi,
            format: self.log_format.into(),
            log_file: self.log_file.clone(),
            ..LogConfig::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one upload job for a table and bene_id range.
    Run(RunArgs),

    /// Show how each column of a source table is classified.
    Columns(ColumnsArgs),
}

#[derive(Args)]
pub struct TableArgs {
    /// Project configuration file (TOML).
    #[arg(long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// Source table, as named in the configuration.
    #[arg(long = "table", value_name = "TABLE")]
    pub table: String,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// First bene_id of the range (inclusive).
    #[arg(long = "bene-first", value_name = "N")]
    pub bene_first: i64,

    /// Last bene_id of the range (inclusive).
    #[arg(long = "bene-last", value_name = "M")]
    pub bene_last: i64,

    /// Expected distinct bene_ids in the range, for progress percentages.
    #[arg(long = "bene-qty", value_name = "Q")]
    pub bene_qty: Option<u64>,

    /// This job's position within its group of jobs.
    #[arg(long = "group-num", value_name = "G")]
    pub group_num: Option<u32>,

    /// Number of jobs in the group.
    #[arg(long = "group-qty", value_name = "K")]
    pub group_qty: Option<u32>,

    /// User id recorded on the upload.
    #[arg(long = "user", value_name = "USER", default_value = "etl")]
    pub user: String,

    /// Print the outcome as JSON instead of a table.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Args)]
pub struct ColumnsArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// Print the report as JSON instead of a table.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => Self::ERROR,
            LogLevelArg::Warn => Self::WARN,
            LogLevelArg::Info => Self::INFO,
            LogLevelArg::Debug => Self::DEBUG,
            LogLevelArg::Trace => Self::TRACE,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Compact => Self::Compact,
            LogFormatArg::Json => Self::Json,
        }
    }
}
