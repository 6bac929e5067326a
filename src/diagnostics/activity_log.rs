//! diagnostics/activity_log.rs
//! Activity Logger collaborator contract (SPEC_FULL §6). Two implementations
//! ship with the core: a plain `log`-crate logger for development, and a
//! lock-free-queue-backed CSV exporter for durable records — the latter is
//! the same non-blocking-producer/background-consumer shape as the
//! teacher's `SyncManager` LockFree mode, just specialized to activity rows
//! instead of raw diagnostic samples.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use csv::Writer;
use log::{error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

const QUEUE_CAPACITY: usize = 4096;
const CONSUMER_POLL_MS: u64 = 10;
const FLUSH_BATCHES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityTag {
    Start,
    Finish,
}

/// FINISH activities contain one of these keywords; everything else is a
/// START, matching the original system's `_infer_tag`.
pub fn infer_tag(activity: &str) -> ActivityTag {
    const FINISH_KEYWORDS: [&str; 4] = ["EXIT", "COMPLETE", "END", "FINISH"];
    let upper = activity.to_uppercase();
    if FINISH_KEYWORDS.iter().any(|k| upper.contains(k)) {
        ActivityTag::Finish
    } else {
        ActivityTag::Start
    }
}

/// Outbound collaborator contract for recording a structured activity
/// entry (part entered/processed/exited a station or corner, or an error
/// condition such as an orphaned barrier or jammed corner).
pub trait ActivityLogger: Send + Sync {
    fn log_activity(&self, part_id: &str, station_id: &str, activity: &str, tag: Option<ActivityTag>);
}

/// Development-mode logger: routes through the `log` facade only, no
/// durable record.
pub struct LoggingActivityLogger;

impl ActivityLogger for LoggingActivityLogger {
    fn log_activity(&self, part_id: &str, station_id: &str, activity: &str, tag: Option<ActivityTag>) {
        let tag = tag.unwrap_or_else(|| infer_tag(activity));
        if activity.starts_with("ERROR_") {
            warn!("{station_id} | {part_id} | {activity} | {tag:?}");
        } else if activity.contains("JAM") {
            error!("{station_id} | {part_id} | {activity} | {tag:?}");
        } else {
            info!("{station_id} | {part_id} | {activity} | {tag:?}");
        }
    }
}

#[derive(Debug, Clone)]
struct ActivityRecord {
    timestamp_epoch_us: u64,
    station_id: String,
    part_id: String,
    activity: String,
    tag: ActivityTag,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    timestamp_epoch_us: u64,
    station_id: &'a str,
    part_id: &'a str,
    activity: &'a str,
    tag: &'a str,
}

fn now_epoch_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Durable activity logger: non-blocking push into a bounded lock-free
/// queue, background thread batches rows out to CSV. Never blocks the FSM
/// dispatch loop on disk I/O.
pub struct QueueingActivityLogger {
    queue: Arc<ArrayQueue<ActivityRecord>>,
    dropped: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    console: LoggingActivityLogger,
}

impl QueueingActivityLogger {
    pub fn start(output_csv: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let output_csv = output_csv.into();
        let queue = Arc::new(ArrayQueue::new(QUEUE_CAPACITY));
        let dropped = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let queue_thread = queue.clone();
        let running_thread = running.clone();
        let dropped_thread = dropped.clone();

        let file = File::create(&output_csv)?;
        let handle = thread::spawn(move || {
            let buf = BufWriter::new(file);
            let mut writer = Writer::from_writer(buf);
            let mut flush_counter = 0usize;

            while running_thread.load(Ordering::SeqCst) {
                let mut drained_any = false;
                for _ in 0..256 {
                    match queue_thread.pop() {
                        Some(record) => {
                            drained_any = true;
                            write_row(&mut writer, &record);
                        }
                        None => break,
                    }
                }
                if drained_any {
                    flush_counter += 1;
                    if flush_counter >= FLUSH_BATCHES {
                        writer.flush().ok();
                        flush_counter = 0;
                    }
                } else {
                    thread::sleep(Duration::from_millis(CONSUMER_POLL_MS));
                }
            }

            while let Some(record) = queue_thread.pop() {
                write_row(&mut writer, &record);
            }
            writer.flush().ok();
            let final_drops = dropped_thread.load(Ordering::Relaxed);
            if final_drops > 0 {
                warn!("activity log consumer exiting, dropped_records={final_drops}");
            }
        });

        Ok(QueueingActivityLogger {
            queue,
            dropped,
            running,
            handle: Mutex::new(Some(handle)),
            console: LoggingActivityLogger,
        })
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn write_row(writer: &mut Writer<BufWriter<File>>, record: &ActivityRecord) {
    let tag_str = match record.tag {
        ActivityTag::Start => "START",
        ActivityTag::Finish => "FINISH",
    };
    let row = CsvRow {
        timestamp_epoch_us: record.timestamp_epoch_us,
        station_id: &record.station_id,
        part_id: &record.part_id,
        activity: &record.activity,
        tag: tag_str,
    };
    writer.serialize(row).ok();
}

impl ActivityLogger for QueueingActivityLogger {
    fn log_activity(&self, part_id: &str, station_id: &str, activity: &str, tag: Option<ActivityTag>) {
        let tag = tag.unwrap_or_else(|| infer_tag(activity));
        self.console.log_activity(part_id, station_id, activity, Some(tag));

        let record = ActivityRecord {
            timestamp_epoch_us: now_epoch_us(),
            station_id: station_id.to_string(),
            part_id: part_id.to_string(),
            activity: activity.to_string(),
            tag,
        };
        if self.queue.push(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for QueueingActivityLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_finish_tag_from_keyword() {
        assert_eq!(infer_tag("EXIT"), ActivityTag::Finish);
        assert_eq!(infer_tag("PROCESS_END"), ActivityTag::Finish);
        assert_eq!(infer_tag("ERROR_NO_PART_ID"), ActivityTag::Start);
        assert_eq!(infer_tag("ENTER"), ActivityTag::Start);
        assert_eq!(infer_tag("PUSH_START"), ActivityTag::Start);
    }
}
