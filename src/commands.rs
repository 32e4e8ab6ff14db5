//! CLI command handlers: translate parsed args into calls against the
//! core engine, printing human-readable or JSON output as requested.
//! This is the composition root wiring the CLI surface to the core.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tabled::{Table, Tabled};
use tracing::{error, info};

use crate::cli::{
    ArchiveArgs, BackupArgs, CompletionsArgs, HistoryArgs, InitArgs, RestoreArgs, ScheduleAddArgs,
    ScheduleArgs, ScheduleIdArgs, ScheduleListArgs, ScheduleSubcommand, UnarchiveArgs,
};
use crate::core::catalog::Catalog;
use crate::core::executor::{run_backup, CancellationToken};
use crate::core::model::{BackupMode, Schedule, ScheduleFrequency};
use crate::core::postprocess::{ArchivePostProcessor, ZipAesPostProcessor};
use crate::core::progress::ProgressEvent;
use crate::core::restore::run_restore;
use crate::core::scheduler;
use crate::infra::config;
use crate::AppContext;

fn open_catalog() -> Result<Catalog> {
    let path = config::catalog_db_path()?;
    Catalog::open(&path).context("failed to open backup catalog")
}

/// Expand a leading `~` and `$VAR`/`${VAR}` references in a user-supplied
/// path before it reaches the filesystem layer.
fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::full(&raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.into_owned()))
}

fn drain_progress(rx: crossbeam_channel::Receiver<ProgressEvent>, quiet: bool) {
    std::thread::spawn(move || {
        let bar = if quiet {
            None
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            Some(bar)
        };

        for event in rx.iter() {
            let Some(bar) = bar.as_ref() else { continue };
            match event {
                ProgressEvent::FileStarted { relative_path } => {
                    bar.set_message(relative_path);
                }
                ProgressEvent::Counts {
                    files_total,
                    files_processed,
                    ..
                } => {
                    bar.set_length(files_total);
                    bar.set_position(files_processed);
                }
                ProgressEvent::Done { success, error } => {
                    if success {
                        bar.finish_with_message("done".green().to_string());
                    } else {
                        let reason = error.unwrap_or_else(|| "unknown error".to_string());
                        bar.abandon_with_message(format!("{} {reason}", "failed".red()));
                    }
                }
            }
        }
    });
}

pub fn backup_run(args: BackupArgs, ctx: &AppContext) -> Result<()> {
    let mode: BackupMode = args.mode.into();
    let source = expand_path(&args.source);
    let destination = expand_path(&args.destination);
    if ctx.dry_run {
        println!(
            "would run a {} backup of {} into {}",
            mode,
            source.display(),
            destination.display()
        );
        return Ok(());
    }

    let mut catalog = open_catalog()?;
    let (tx, rx) = crate::core::progress::channel();
    drain_progress(rx, ctx.quiet);

    let outcome = run_backup(
        &mut catalog,
        &source,
        &destination,
        mode,
        &tx,
        &CancellationToken::new(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "session_id": outcome.session_id,
            "effective_mode": outcome.effective_mode.as_str(),
            "backup_folder": outcome.backup_folder,
            "status": outcome.status.as_str(),
            "files_total": outcome.files_total,
            "files_copied": outcome.files_copied,
            "files_skipped": outcome.files_skipped,
            "bytes_copied": outcome.bytes_copied,
        }))?);
    } else if !ctx.quiet {
        println!(
            "{} session {} ({}): {} copied, {} skipped, {} bytes -> {}",
            "backup complete".green().bold(),
            outcome.session_id,
            outcome.effective_mode,
            outcome.files_copied,
            outcome.files_skipped,
            outcome.bytes_copied,
            outcome.backup_folder
        );
    }
    Ok(())
}

pub fn restore_run(args: RestoreArgs, ctx: &AppContext) -> Result<()> {
    let backup_folder = expand_path(&args.backup_folder);
    let destination = expand_path(&args.destination);
    if ctx.dry_run {
        println!(
            "would restore {} into {}",
            backup_folder.display(),
            destination.display()
        );
        return Ok(());
    }

    let catalog = open_catalog()?;
    let (tx, rx) = crate::core::progress::channel();
    drain_progress(rx, ctx.quiet);

    let outcome = run_restore(
        &catalog,
        &backup_folder,
        &destination,
        &tx,
        &CancellationToken::new(),
    )?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "files_restored": outcome.files_restored,
                "files_unresolved": outcome.files_unresolved,
                "unresolved_paths": outcome.unresolved_paths,
                "legacy": outcome.legacy,
            }))?
        );
    } else if !ctx.quiet {
        println!(
            "{} {} files restored, {} unresolved{}",
            "restore complete".green().bold(),
            outcome.files_restored,
            outcome.files_unresolved,
            if outcome.legacy { " (legacy verbatim copy)" } else { "" }
        );
        for path in &outcome.unresolved_paths {
            println!("  {} {}", "unresolved:".yellow(), path);
        }
    }
    Ok(())
}

#[derive(Tabled)]
struct SessionRow {
    id: i64,
    mode: String,
    status: String,
    started_at: String,
    files_copied: i64,
    files_skipped: i64,
    backup_folder: String,
}

pub fn history_run(args: HistoryArgs, ctx: &AppContext) -> Result<()> {
    let catalog = open_catalog()?;
    let source = expand_path(&args.source).to_string_lossy().to_string();
    let before = args
        .before
        .as_deref()
        .map(chrono::DateTime::parse_from_rfc3339)
        .transpose()
        .context("--before must be an RFC3339 timestamp")?
        .map(|dt| dt.with_timezone(&chrono::Local));

    let mut sessions = catalog.get_sessions_history(&source, before)?;
    sessions.truncate(args.limit);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if ctx.quiet {
        return Ok(());
    }

    let rows: Vec<SessionRow> = sessions
        .iter()
        .map(|s| SessionRow {
            id: s.id,
            mode: s.mode.as_str().to_string(),
            status: s.status.as_str().to_string(),
            started_at: s.started_at.to_rfc3339(),
            files_copied: s.files_copied,
            files_skipped: s.files_skipped,
            backup_folder: s.backup_folder.clone().unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

pub fn schedule_run(args: ScheduleArgs, ctx: &AppContext) -> Result<()> {
    match args.command {
        ScheduleSubcommand::Add(add) => schedule_add(add, ctx),
        ScheduleSubcommand::List(list) => schedule_list(list, ctx),
        ScheduleSubcommand::Remove(id) => schedule_remove(id, ctx),
        ScheduleSubcommand::Enable(id) => schedule_set_enabled(id, true, ctx),
        ScheduleSubcommand::Disable(id) => schedule_set_enabled(id, false, ctx),
        ScheduleSubcommand::RunNow(id) => schedule_run_now(id, ctx),
        ScheduleSubcommand::Daemon => schedule_daemon(ctx),
    }
}

fn schedule_add(args: ScheduleAddArgs, ctx: &AppContext) -> Result<()> {
    let frequency = match args.frequency {
        crate::cli::FrequencyArg::Once => ScheduleFrequency::Once,
        crate::cli::FrequencyArg::Hourly => ScheduleFrequency::Hourly,
        crate::cli::FrequencyArg::Daily => ScheduleFrequency::Daily,
        crate::cli::FrequencyArg::Weekly => ScheduleFrequency::Weekly,
        crate::cli::FrequencyArg::Monthly => ScheduleFrequency::Monthly,
        crate::cli::FrequencyArg::Custom => ScheduleFrequency::Custom,
    };
    let mode: BackupMode = args.mode.into();

    let mut schedule = Schedule {
        id: format!("sch-{:x}", rand::random::<u32>()),
        name: args.name,
        source: expand_path(&args.source).to_string_lossy().to_string(),
        destination: expand_path(&args.destination).to_string_lossy().to_string(),
        mode,
        frequency,
        enabled: true,
        hour: args.hour,
        minute: args.minute,
        days_of_week: if args.days_of_week.is_empty() { vec![0] } else { args.days_of_week },
        day_of_month: args.day_of_month,
        hour_interval: args.hour_interval.max(1),
        compress: args.compress || args.encrypt,
        encrypt: args.encrypt,
        encryption_password: args.password,
        next_run: None,
        last_run: None,
        last_result: None,
    };
    schedule.next_run = scheduler::next_fire_after(&schedule, chrono::Local::now());

    let mut schedules = config::load_schedules()?;
    schedules.push(schedule.clone());
    config::save_schedules(&schedules)?;

    if !ctx.quiet {
        println!(
            "{} {} ({}), next fire {}",
            "schedule added:".green(),
            schedule.id,
            schedule.name,
            schedule
                .next_run
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unscheduled".to_string())
        );
    }
    Ok(())
}

#[derive(Tabled)]
struct ScheduleRow {
    id: String,
    name: String,
    frequency: String,
    enabled: bool,
    next_run: String,
    last_result: String,
}

fn schedule_list(args: ScheduleListArgs, ctx: &AppContext) -> Result<()> {
    let schedules = config::load_schedules()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&schedules)?);
        return Ok(());
    }
    if ctx.quiet {
        return Ok(());
    }
    let rows: Vec<ScheduleRow> = schedules
        .iter()
        .map(|s| ScheduleRow {
            id: s.id.clone(),
            name: s.name.clone(),
            frequency: format!("{:?}", s.frequency),
            enabled: s.enabled,
            next_run: s.next_run.map(|t| t.to_rfc3339()).unwrap_or_default(),
            last_result: s.last_result.clone().unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn schedule_remove(args: ScheduleIdArgs, ctx: &AppContext) -> Result<()> {
    let mut schedules = config::load_schedules()?;
    let before = schedules.len();
    schedules.retain(|s| s.id != args.id);
    if schedules.len() == before {
        anyhow::bail!("no schedule with id {}", args.id);
    }
    config::save_schedules(&schedules)?;
    if !ctx.quiet {
        println!("{} {}", "removed schedule".green(), args.id);
    }
    Ok(())
}

fn schedule_set_enabled(args: ScheduleIdArgs, enabled: bool, ctx: &AppContext) -> Result<()> {
    let mut schedules = config::load_schedules()?;
    let schedule = schedules
        .iter_mut()
        .find(|s| s.id == args.id)
        .with_context(|| format!("no schedule with id {}", args.id))?;
    schedule.enabled = enabled;
    if enabled {
        schedule.next_run = scheduler::next_fire_after(schedule, chrono::Local::now());
    }
    config::save_schedules(&schedules)?;
    if !ctx.quiet {
        println!("{} {}", if enabled { "enabled".green().to_string() } else { "disabled".yellow().to_string() }, args.id);
    }
    Ok(())
}

/// `run-now`: invoke the backup executor for this schedule's parameters
/// immediately, without touching its `next_run` — a manual fire is a
/// one-off side channel, not a reschedule.
fn schedule_run_now(args: ScheduleIdArgs, ctx: &AppContext) -> Result<()> {
    let schedules = config::load_schedules()?;
    let schedule = schedules
        .iter()
        .find(|s| s.id == args.id)
        .with_context(|| format!("no schedule with id {}", args.id))?;

    let mut catalog = open_catalog()?;
    let (tx, rx) = crate::core::progress::channel();
    drain_progress(rx, ctx.quiet);

    let outcome = run_backup(
        &mut catalog,
        Path::new(&schedule.source),
        Path::new(&schedule.destination),
        schedule.mode,
        &tx,
        &CancellationToken::new(),
    )?;

    if !ctx.quiet {
        println!(
            "{} session {} ({}): {} copied, {} skipped",
            "run-now complete".green().bold(),
            outcome.session_id,
            outcome.effective_mode,
            outcome.files_copied,
            outcome.files_skipped
        );
    }
    Ok(())
}

fn schedule_daemon(ctx: &AppContext) -> Result<()> {
    let schedules = std::sync::Arc::new(std::sync::Mutex::new(config::load_schedules()?));
    let (tx, rx) = crate::core::progress::channel();
    drain_progress(rx, ctx.quiet);

    let schedules_for_save = std::sync::Arc::clone(&schedules);
    let handle = scheduler::spawn(
        schedules,
        |_schedule| config::catalog_db_path().unwrap_or_else(|_| std::path::PathBuf::from("catalog.sqlite3")),
        tx,
        move |fire| {
            let guard = schedules_for_save.lock().unwrap();
            if let Err(err) = config::save_schedules(&guard) {
                error!(error = %err, "failed to persist schedules after fire");
            }
            match fire.outcome {
                Ok(outcome) => info!(
                    schedule_id = fire.schedule_id,
                    session_id = outcome.session_id,
                    status = %format!("{:?}", outcome.status),
                    "scheduled backup finished"
                ),
                Err(err) => error!(schedule_id = fire.schedule_id, error = %err, "scheduled backup failed"),
            }
        },
    );

    if !ctx.quiet {
        println!("{}", "scheduler running, press Ctrl-C to stop".cyan());
    }
    ctrlc_wait();
    handle.stop();
    Ok(())
}

fn ctrlc_wait() {
    let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let r = std::sync::Arc::clone(&running);
    let _ = ctrlc::set_handler(move || r.store(false, std::sync::atomic::Ordering::SeqCst));
    while running.load(std::sync::atomic::Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
}

pub fn archive_run(args: ArchiveArgs, ctx: &AppContext) -> Result<()> {
    let folder = expand_path(&args.folder);
    let processor = ZipAesPostProcessor;
    let zip_path = processor.compress(&folder)?;
    let final_path = if let Some(password) = &args.password {
        let enc_path = processor.encrypt(&zip_path, password)?;
        std::fs::remove_file(&zip_path).ok();
        enc_path
    } else {
        zip_path
    };
    if !ctx.quiet {
        println!("{} {}", "archived to".green(), final_path.display());
    }
    Ok(())
}

pub fn unarchive_run(args: UnarchiveArgs, ctx: &AppContext) -> Result<()> {
    let archive = expand_path(&args.archive);
    let destination = expand_path(&args.destination);
    let processor = ZipAesPostProcessor;
    let zip_path = if let Some(password) = &args.password {
        processor.decrypt(&archive, password)?
    } else {
        archive.clone()
    };
    processor.decompress(&zip_path, &destination)?;
    if args.password.is_some() && zip_path != archive {
        std::fs::remove_file(&zip_path).ok();
    }
    if !ctx.quiet {
        println!("{} {}", "unarchived to".green(), destination.display());
    }
    Ok(())
}

pub fn init_run(args: InitArgs, ctx: &AppContext) -> Result<()> {
    let path = config::init(&expand_path(&args.path), args.force)?;
    if !ctx.quiet {
        println!("{} {}", "wrote preferences to".green(), path.display());
    }
    Ok(())
}

pub fn completions_run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    crate::completion::run(args, ctx)
}
