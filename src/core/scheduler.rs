//! Declarative backup schedules: next-fire computation and the
//! background worker that fires them.
//!
//! A single worker thread polls every ~30 seconds; missed runs fire once
//! on the next scan (no catch-up for multiple skipped intervals), and
//! `run_now` invokes the executor without touching `next_fire`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveTime, TimeZone, Timelike};
use crossbeam_channel::Sender;
use tracing::info;

use crate::core::catalog::Catalog;
use crate::core::executor::{run_backup, CancellationToken};
use crate::core::model::{Schedule, ScheduleFrequency};
use crate::core::progress::ProgressEvent;

/// How often the background worker wakes to check for due schedules.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Compute the next fire time for `schedule`, given the current instant
/// `now`. Returns `None` only for `Once` schedules whose instant has
/// already passed and therefore should be disabled rather than rescheduled
/// forward (the caller disables instead of calling this again).
pub fn next_fire_after(schedule: &Schedule, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let time = NaiveTime::from_hms_opt(schedule.hour, schedule.minute, 0)?;

    match schedule.frequency {
        ScheduleFrequency::Once => {
            let today = at_time(now, time);
            if today > now {
                Some(today)
            } else {
                Some(at_time(now + ChronoDuration::days(1), time))
            }
        }
        ScheduleFrequency::Hourly => {
            let interval = schedule.hour_interval.max(1);
            // Scan forward hour-by-hour (bounded to 48h, comfortably more
            // than one full wrap) for the next hour that is both a
            // multiple of the interval from midnight and strictly after
            // `now`.
            let start = now
                .date_naive()
                .and_hms_opt(0, schedule.minute, 0)?
                .and_local_timezone(Local)
                .single()?;
            (0..48)
                .map(|h| start + ChronoDuration::hours(h))
                .find(|candidate| candidate.hour() % interval == 0 && *candidate > now)
        }
        ScheduleFrequency::Daily => {
            let today = at_time(now, time);
            if today > now {
                Some(today)
            } else {
                Some(at_time(now + ChronoDuration::days(1), time))
            }
        }
        ScheduleFrequency::Weekly => {
            let target_weekday = schedule.days_of_week.first().copied().unwrap_or(0);
            for offset in 0..8 {
                let day = now + ChronoDuration::days(offset);
                if day.weekday().num_days_from_monday() == target_weekday {
                    let candidate = at_time(day, time);
                    if candidate > now {
                        return Some(candidate);
                    }
                }
            }
            None
        }
        ScheduleFrequency::Custom => {
            for offset in 0..8 {
                let day = now + ChronoDuration::days(offset);
                let weekday = day.weekday().num_days_from_monday();
                if schedule.days_of_week.contains(&weekday) {
                    let candidate = at_time(day, time);
                    if candidate > now {
                        return Some(candidate);
                    }
                }
            }
            None
        }
        ScheduleFrequency::Monthly => {
            let day_of_month = schedule.day_of_month.clamp(1, 28);
            let this_month = now
                .with_day(day_of_month)
                .and_then(|d| d.with_hour(time.hour()))
                .and_then(|d| d.with_minute(time.minute()))
                .and_then(|d| d.with_second(0));
            if let Some(candidate) = this_month {
                if candidate > now {
                    return Some(candidate);
                }
            }
            let (next_year, next_month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            Local
                .with_ymd_and_hms(next_year, next_month, day_of_month, time.hour(), time.minute(), 0)
                .single()
        }
    }
}

fn at_time(day: DateTime<Local>, time: NaiveTime) -> DateTime<Local> {
    day.with_hour(time.hour())
        .and_then(|d| d.with_minute(time.minute()))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(day)
}

/// Advance `schedule` in place after it fires: recompute `next_run` (or
/// disable it, for `Once`), and stamp `last_run`/`last_result`.
pub fn advance_after_fire(schedule: &mut Schedule, now: DateTime<Local>, result: &str) {
    schedule.last_run = Some(now);
    schedule.last_result = Some(result.to_string());
    if schedule.frequency == ScheduleFrequency::Once {
        schedule.enabled = false;
        schedule.next_run = None;
    } else {
        schedule.next_run = next_fire_after(schedule, now);
    }
}

/// Holds the live set of schedules and drives the background fire loop.
/// Persistence of the schedule list itself is the caller's responsibility
/// (see `infra::config`); the scheduler only computes timing and invokes
/// the executor.
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// A single due-schedule invocation, handed back to the caller so it can
/// persist the updated schedule and run any post-processing.
pub struct FireResult {
    pub schedule_id: String,
    pub outcome: Result<crate::core::executor::BackupOutcome, crate::core::executor::BackupError>,
}

/// Spawn the background worker thread. `schedules` is shared with the
/// caller (e.g. the CLI's `schedule` subcommands add/remove/enable
/// entries while the worker is running); `on_fire` is invoked for each
/// due schedule with the result of running it, under no lock, so the
/// caller can persist state and forward progress without blocking the
/// scan loop.
pub fn spawn<F>(
    schedules: Arc<Mutex<Vec<Schedule>>>,
    catalog_path_for: impl Fn(&Schedule) -> std::path::PathBuf + Send + 'static,
    progress: Sender<ProgressEvent>,
    on_fire: F,
) -> SchedulerHandle
where
    F: Fn(FireResult) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    std::thread::spawn(move || {
        info!("scheduler worker started");
        loop {
            if stop_flag.load(Ordering::SeqCst) {
                break;
            }

            let due: Vec<Schedule> = {
                let guard = schedules.lock().unwrap();
                let now = Local::now();
                guard
                    .iter()
                    .filter(|s| s.enabled && s.next_run.map(|t| t <= now).unwrap_or(false))
                    .cloned()
                    .collect()
            };

            for schedule in due {
                let db_path = catalog_path_for(&schedule);
                let outcome = run_due_schedule(&db_path, &schedule, &progress);
                let result_label = match &outcome {
                    Ok(o) => format!("{:?}", o.status),
                    Err(e) => format!("error: {e}"),
                };

                {
                    let mut guard = schedules.lock().unwrap();
                    if let Some(entry) = guard.iter_mut().find(|s| s.id == schedule.id) {
                        advance_after_fire(entry, Local::now(), &result_label);
                    }
                }

                on_fire(FireResult {
                    schedule_id: schedule.id.clone(),
                    outcome,
                });
            }

            std::thread::sleep(Duration::from_secs(1));
            if stop_flag.load(Ordering::SeqCst) {
                break;
            }
            // Coarse ~30s poll granularity, but sleep in 1s ticks so
            // shutdown is noticed promptly.
            static_sleep_remaining(&stop_flag, POLL_INTERVAL.saturating_sub(Duration::from_secs(1)));
        }
        info!("scheduler worker stopped");
    });

    SchedulerHandle { stop }
}

fn static_sleep_remaining(stop_flag: &Arc<AtomicBool>, remaining: Duration) {
    let mut slept = Duration::ZERO;
    while slept < remaining {
        if stop_flag.load(Ordering::SeqCst) {
            return;
        }
        let tick = Duration::from_secs(1).min(remaining - slept);
        std::thread::sleep(tick);
        slept += tick;
    }
}

fn run_due_schedule(
    db_path: &std::path::Path,
    schedule: &Schedule,
    progress: &Sender<ProgressEvent>,
) -> Result<crate::core::executor::BackupOutcome, crate::core::executor::BackupError> {
    let mut catalog = Catalog::open(db_path)?;
    let source = std::path::Path::new(&schedule.source);
    let destination = std::path::Path::new(&schedule.destination);
    run_backup(
        &mut catalog,
        source,
        destination,
        schedule.mode,
        progress,
        &CancellationToken::new(),
    )
}
