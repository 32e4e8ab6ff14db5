//! Command-line surface for snapkeep.
//!
//! Global flags are collected once into `AppContext` and threaded
//! through every subcommand handler rather than re-parsed per command.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::model::BackupMode;

/// Shared application context for global flags.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,
    pub no_color: bool,
    pub dry_run: bool,
}

#[derive(Parser)]
#[command(name = "snapkeep")]
#[command(about = "A local file-backup engine with full/incremental/differential strategies")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a backup of a source directory
    Backup(BackupArgs),

    /// Restore a prior snapshot into a destination directory
    Restore(RestoreArgs),

    /// List completed backup sessions for a source
    History(HistoryArgs),

    /// Manage declarative backup schedules
    Schedule(ScheduleArgs),

    /// Compress and/or encrypt a backup folder (external post-processing)
    Archive(ArchiveArgs),

    /// Decrypt and/or decompress an archived backup back into a folder
    Unarchive(UnarchiveArgs),

    /// Write an initial preferences file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Full,
    Incremental,
    Differential,
}

impl From<ModeArg> for BackupMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => BackupMode::Full,
            ModeArg::Incremental => BackupMode::Incremental,
            ModeArg::Differential => BackupMode::Differential,
        }
    }
}

#[derive(Parser, Debug)]
pub struct BackupArgs {
    /// Directory tree to back up
    pub source: PathBuf,

    /// Root directory to hold backup folders
    pub destination: PathBuf,

    /// Backup strategy
    #[arg(long, value_enum, default_value = "full")]
    pub mode: ModeArg,

    /// Emit JSON result instead of human text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Backup folder to restore (an absolute or relative path under some destination root)
    pub backup_folder: PathBuf,

    /// Directory to restore files into
    pub destination: PathBuf,

    /// Emit JSON result instead of human text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Source path to list sessions for
    pub source: PathBuf,

    /// Only show sessions started before this RFC3339 timestamp
    #[arg(long)]
    pub before: Option<String>,

    /// Limit result count
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Emit JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    pub command: ScheduleSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ScheduleSubcommand {
    /// Add a new schedule
    Add(ScheduleAddArgs),
    /// List all schedules
    List(ScheduleListArgs),
    /// Remove a schedule by id
    Remove(ScheduleIdArgs),
    /// Enable a disabled schedule
    Enable(ScheduleIdArgs),
    /// Disable an enabled schedule
    Disable(ScheduleIdArgs),
    /// Fire a schedule immediately without touching its next-fire time
    RunNow(ScheduleIdArgs),
    /// Run the background worker that fires due schedules until interrupted
    Daemon,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FrequencyArg {
    Once,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Custom,
}

#[derive(Parser, Debug)]
pub struct ScheduleAddArgs {
    /// Human-readable schedule name
    pub name: String,

    /// Directory tree to back up
    pub source: PathBuf,

    /// Root directory to hold backup folders
    pub destination: PathBuf,

    #[arg(long, value_enum, default_value = "full")]
    pub mode: ModeArg,

    #[arg(long, value_enum, default_value = "daily")]
    pub frequency: FrequencyArg,

    /// Hour of day (0-23) to fire at
    #[arg(long, default_value_t = 2)]
    pub hour: u32,

    /// Minute of hour (0-59) to fire at
    #[arg(long, default_value_t = 0)]
    pub minute: u32,

    /// For hourly: fire every N hours
    #[arg(long, default_value_t = 1)]
    pub hour_interval: u32,

    /// For weekly/custom: weekday numbers, Monday = 0
    #[arg(long, value_delimiter = ',')]
    pub days_of_week: Vec<u32>,

    /// For monthly: day of month (clamped to 28)
    #[arg(long, default_value_t = 1)]
    pub day_of_month: u32,

    /// Compress the backup folder after it completes
    #[arg(long)]
    pub compress: bool,

    /// Encrypt the compressed archive (implies --compress)
    #[arg(long)]
    pub encrypt: bool,

    /// Password for --encrypt
    #[arg(long, default_value = "")]
    pub password: String,
}

#[derive(Parser, Debug)]
pub struct ScheduleListArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ScheduleIdArgs {
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct ArchiveArgs {
    /// Backup folder to archive
    pub folder: PathBuf,

    /// Encrypt the resulting zip with this password
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Parser, Debug)]
pub struct UnarchiveArgs {
    /// Archive file (.zip or .zip.enc) to restore from
    pub archive: PathBuf,

    /// Destination directory for the unpacked folder
    pub destination: PathBuf,

    /// Password, if the archive is encrypted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize the preferences file in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing preferences file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints to stdout
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
