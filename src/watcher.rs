use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use tracing::{info, warn};

use crate::clipboard::{ClipboardSource, SystemClipboard};
use crate::config::{AppPaths, POLL_INTERVAL};
use crate::errors::{ClipError, Result};
use crate::history::History;
use crate::storage::models::{ClipboardEntry, SearchQuery};

// ── Subscribers ────────────────────────────────────────────────────

/// Live listeners for newly captured entries.
#[derive(Default)]
pub struct Subscribers {
    senders: Vec<Sender<ClipboardEntry>>,
}

impl Subscribers {
    pub fn subscribe(&mut self) -> Receiver<ClipboardEntry> {
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Sends to every live receiver and drops the ones that hung up.
    pub fn broadcast(&mut self, entry: &ClipboardEntry) {
        self.senders.retain(|tx| tx.send(entry.clone()).is_ok());
    }
}

// ── Watcher ────────────────────────────────────────────────────────

/// Turns clipboard snapshots into history entries. Only a non-empty HTML
/// flavor that differs from the last one seen counts as a change; a
/// plain-text-only change is ignored.
pub struct Watcher {
    last_html: String,
    last_timestamp: i64,
    subscribers: Subscribers,
}

impl Watcher {
    /// Seeds the last-seen HTML from the newest stored entry so a restart
    /// does not record the current clipboard again.
    pub fn new(history: &mut History) -> Result<Self> {
        let recent = history.most_recent(&SearchQuery::default())?;
        let mut watcher = Self::with_last_html(recent.html);
        watcher.last_timestamp = recent.timestamp;
        Ok(watcher)
    }

    pub fn with_last_html(last_html: String) -> Self {
        Self {
            last_html,
            last_timestamp: 0,
            subscribers: Subscribers::default(),
        }
    }

    /// Wall-clock millis, bumped past the previous capture so two changes in
    /// the same millisecond still get distinct, increasing ids.
    fn next_timestamp(&mut self) -> i64 {
        let ts = Utc::now().timestamp_millis().max(self.last_timestamp + 1);
        self.last_timestamp = ts;
        ts
    }

    pub fn last_html(&self) -> &str {
        &self.last_html
    }

    pub fn subscribe(&mut self) -> Receiver<ClipboardEntry> {
        self.subscribers.subscribe()
    }

    pub fn poll_once(
        &mut self,
        source: &mut dyn ClipboardSource,
        history: &mut History,
    ) -> Result<Option<ClipboardEntry>> {
        let snapshot = source.snapshot()?;
        if snapshot.html.is_empty() || snapshot.html == self.last_html {
            return Ok(None);
        }

        self.last_html = snapshot.html.clone();
        let timestamp = self.next_timestamp();
        let entry = ClipboardEntry::new(snapshot.text, snapshot.html, timestamp);
        history.create(&entry)?;
        self.subscribers.broadcast(&entry);
        Ok(Some(entry))
    }
}

// ── Daemon bookkeeping ─────────────────────────────────────────────

pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    fs::write(path, pid.to_string()).map_err(|e| ClipError::Daemon(e.to_string()))
}

/// Only a positive pid that fits `pid_t` is a single process; 0 and
/// negatives address process groups in `kill(2)`.
fn signal_target(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|&pid| pid > 0)
}

/// `None` for a missing file or one that does not hold a usable pid.
pub fn read_pid_file(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(contents) => match contents.trim().parse::<u32>() {
            Ok(pid) if signal_target(pid).is_some() => Ok(Some(pid)),
            Ok(pid) => {
                warn!(pid, "ignoring invalid pid in pid file");
                Ok(None)
            }
            Err(_) => Ok(None),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ClipError::Daemon(e.to_string())),
    }
}

pub fn remove_pid_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ClipError::Daemon(e.to_string())),
    }
}

pub fn is_process_running(pid: u32) -> bool {
    match signal_target(pid) {
        Some(pid) => unsafe { libc::kill(pid, 0) == 0 },
        None => false,
    }
}

pub fn stop_daemon(paths: &AppPaths) -> Result<bool> {
    match read_pid_file(&paths.pid_file)? {
        Some(pid) if is_process_running(pid) => {
            if let Some(target) = signal_target(pid) {
                unsafe {
                    libc::kill(target, libc::SIGTERM);
                }
            }
            remove_pid_file(&paths.pid_file)?;
            Ok(true)
        }
        Some(_) => {
            remove_pid_file(&paths.pid_file)?;
            Ok(false)
        }
        None => Ok(false),
    }
}

pub fn daemon_status(paths: &AppPaths) -> Result<Option<u32>> {
    match read_pid_file(&paths.pid_file)? {
        Some(pid) if is_process_running(pid) => Ok(Some(pid)),
        Some(_) => {
            remove_pid_file(&paths.pid_file)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Spawns `clipcache daemon run` detached, stderr going to the log file.
pub fn start_daemon(paths: &AppPaths) -> Result<u32> {
    let exe = std::env::current_exe().map_err(|e| ClipError::Daemon(e.to_string()))?;
    fs::create_dir_all(&paths.base_dir).map_err(|e| ClipError::Daemon(e.to_string()))?;
    let log_file =
        fs::File::create(&paths.log_file).map_err(|e| ClipError::Daemon(e.to_string()))?;

    let child = std::process::Command::new(exe)
        .args(["daemon", "run"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::from(log_file))
        .spawn()
        .map_err(|e| ClipError::Daemon(e.to_string()))?;

    Ok(child.id())
}

fn ctrlc_handler(running: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        running.store(false, Ordering::Relaxed);
    });
}

/// Polls until interrupted. `on_entry` runs for every captured entry.
pub fn watch<F>(history: &mut History, mut on_entry: F) -> Result<()>
where
    F: FnMut(&ClipboardEntry),
{
    let mut source = SystemClipboard::new()?;
    let mut watcher = Watcher::new(history)?;
    let updates = watcher.subscribe();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    info!(pid = std::process::id(), "watching clipboard");

    while running.load(Ordering::Relaxed) {
        match watcher.poll_once(&mut source, history) {
            Ok(Some(entry)) => info!(id = entry.timestamp, "captured clipboard change"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "poll failed"),
        }
        for entry in updates.try_iter() {
            on_entry(&entry);
        }
        thread::sleep(POLL_INTERVAL);
    }

    info!("shutting down");
    Ok(())
}

/// Daemon entry point: PID file bookkeeping around [`watch`].
pub fn run_watcher(paths: &AppPaths) -> Result<()> {
    fs::create_dir_all(&paths.base_dir).map_err(|e| ClipError::Daemon(e.to_string()))?;
    let mut history = History::open(paths)?;
    history.initialize()?;

    write_pid_file(&paths.pid_file)?;

    let result = watch(&mut history, |_| {});
    remove_pid_file(&paths.pid_file)?;
    result
}
