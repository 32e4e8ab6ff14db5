//! Core data model: sessions, manifest entries, schedules, and the
//! backup-folder naming scheme shared by the executor, restore resolver,
//! and scheduler.

use chrono::{DateTime, Datelike, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three backup strategies a session can be created under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    Full,
    Incremental,
    Differential,
}

impl BackupMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupMode::Full => "full",
            BackupMode::Incremental => "incremental",
            BackupMode::Differential => "differential",
        }
    }

    // Spanish labels used in the generated folder name, matching the
    // naming scheme the catalog's folder-lookup queries expect.
    fn folder_label(self) -> &'static str {
        match self {
            BackupMode::Full => "Completo",
            BackupMode::Incremental => "Incremental",
            BackupMode::Differential => "Diferencial",
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackupMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(BackupMode::Full),
            "incremental" => Ok(BackupMode::Incremental),
            "differential" => Ok(BackupMode::Differential),
            other => Err(ModelError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown backup mode: {0}")]
    UnknownMode(String),
    #[error("unknown session status: {0}")]
    UnknownStatus(String),
}

/// Lifecycle state of a backup session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "error" => Ok(SessionStatus::Error),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// A row of `backup_sessions`: one backup run against one source path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub source_path: String,
    pub dest_path: String,
    pub mode: BackupMode,
    pub started_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
    pub status: SessionStatus,
    pub files_total: i64,
    pub files_copied: i64,
    pub files_skipped: i64,
    pub bytes_copied: i64,
    pub error_message: Option<String>,
    pub backup_folder: Option<String>,
}

/// A row of `file_hashes`: one file's content digest within a session's manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub file_hash: String,
    pub file_size: i64,
    pub modified_at: DateTime<Local>,
}

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleFrequency {
    Once,
    Hourly,
    Daily,
    Custom,
    Weekly,
    Monthly,
}

/// A declared, recurring (or one-shot) backup schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub source: String,
    pub destination: String,
    pub mode: BackupMode,
    pub frequency: ScheduleFrequency,
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,

    #[serde(default = "default_days_of_week")]
    pub days_of_week: Vec<u32>,
    #[serde(default = "default_day_of_month")]
    pub day_of_month: u32,

    #[serde(default = "default_hour_interval")]
    pub hour_interval: u32,

    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub encryption_password: String,

    pub next_run: Option<DateTime<Local>>,
    pub last_run: Option<DateTime<Local>>,
    pub last_result: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_days_of_week() -> Vec<u32> {
    vec![0]
}
fn default_day_of_month() -> u32 {
    1
}
fn default_hour_interval() -> u32 {
    1
}

const DAYS_ES: [&str; 7] = [
    "Lunes", "Martes", "Miercoles", "Jueves", "Viernes", "Sabado", "Domingo",
];
const MONTHS_ES: [&str; 13] = [
    "", "Enero", "Febrero", "Marzo", "Abril", "Mayo", "Junio", "Julio", "Agosto", "Septiembre",
    "Octubre", "Noviembre", "Diciembre",
];

/// Generate a backup folder name: `<Mode>_<DayName>_<Day>_<Month>_<HHMM>`.
///
/// Named for the *effective* mode (after any fallback-to-full promotion),
/// never the mode the caller originally requested, so a folder never
/// claims to be an incremental backup when it is actually a full one.
pub fn generate_backup_folder_name(mode: BackupMode, now: DateTime<Local>) -> String {
    // chrono's weekday() is Monday-first like Python's datetime.weekday().
    let day_name = DAYS_ES[now.weekday().num_days_from_monday() as usize];
    let month_name = MONTHS_ES[now.month() as usize];
    format!(
        "{}_{}_{}_{}_{}",
        mode.folder_label(),
        day_name,
        now.day(),
        month_name,
        now.format("%H%M")
    )
}
