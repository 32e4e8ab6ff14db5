//! **snapkeep** - a local file-backup engine with full/incremental/
//! differential strategies and catalog-driven chained restore.
//!
//! The core (hasher, catalog, change detector, executor, restore
//! resolver, scheduler, progress channel) has no dependency on the CLI;
//! `cli`/`commands`/`completion` are the composition root that wires it
//! to a terminal.

/// Command-line interface with clap integration
pub mod cli;

/// CLI command handlers - translate parsed args into core engine calls
pub mod commands;

/// Shell completion generation
pub mod completion;

/// Core backup engine
pub mod core {
    /// Backup-folder naming, session/manifest/schedule data model
    pub mod model;
    pub use model::{BackupMode, ManifestEntry, Schedule, ScheduleFrequency, Session, SessionStatus};

    /// Content hashing and the cheap metadata fingerprint
    pub mod hasher;
    pub use hasher::{hash_file, FileDigest, QuickFingerprint};

    /// Durable catalog of backup sessions and their manifests
    pub mod catalog;
    pub use catalog::Catalog;

    /// Decides whether a source file needs to be copied into a backup
    pub mod change_detector;

    /// Filesystem helpers shared by the executor and restore resolver
    pub mod fs_util;

    /// Walks the source tree and writes a new backup session
    pub mod executor;
    pub use executor::{run_backup, BackupOutcome, CancellationToken};

    /// Reconstructs a logical snapshot from the chain of prior backups
    pub mod restore;
    pub use restore::{run_restore, RestoreOutcome};

    /// Declarative schedules: next-fire computation and the fire loop
    pub mod scheduler;

    /// Progress channel between executor/resolver and their caller
    pub mod progress;
    pub use progress::ProgressEvent;

    /// Archive post-processing (compress/encrypt) as an external collaborator
    pub mod postprocess;
    pub use postprocess::{ArchivePostProcessor, ZipAesPostProcessor};
}

/// Infrastructure: per-user configuration and catalog directory resolution
pub mod infra {
    pub mod config;
    pub use config::{load_preferences, load_schedules, save_preferences, save_schedules, Preferences};
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use core::{BackupMode, Catalog, ManifestEntry, Schedule, Session, SessionStatus};
