//! The scan engine.
//!
//! A [`DirectoryMonitor`] owns one background worker that discovers the
//! directories to watch, then repeatedly snapshots each of them, runs every
//! registered recognizer against the previous and current snapshot, and hands
//! the resulting events to the dispatcher. All mutable monitor state sits
//! behind a single mutex; one condition variable serves every place the worker
//! blocks (inter-tick delay, suspension, per-directory pause, throttle
//! cooldown) as well as worker exit.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::discovery::DirectoryDiscovery;
use super::dispatcher::{EventDispatcher, MonitorListener};
use super::events::{StatusEvent, StatusKind};
use super::lifecycle::{ServiceState, StateMachine, Transition};
use super::recognizer::Recognizer;
use super::snapshot::Snapshot;
use super::throttle::Throttler;
use crate::config::{MonitorConfig, ThrottleConfig};
use crate::error::{MonitorError, Result};

const WORKER_NAME: &str = "pollwatch-scan";

/// Smallest inter-scan delay; matches the `delay_ms >= 1` config rule.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

fn clamp_delay(delay: Duration) -> Duration {
    if delay < MIN_DELAY {
        tracing::warn!("Scan delay {:?} is below the minimum; using {:?}", delay, MIN_DELAY);
        MIN_DELAY
    } else {
        delay
    }
}

pub struct DirectoryMonitor {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    root: PathBuf,
    recursive: bool,
    directory_pause: Duration,
    stop_timeout: Duration,
    throttle: ThrottleConfig,
    state: Mutex<MonitorState>,
    signal: Condvar,
    dispatcher: EventDispatcher,
}

struct MonitorState {
    lifecycle: StateMachine,
    delay: Duration,
    /// Insertion ordered, no duplicates.
    directories: Vec<PathBuf>,
    snapshots: HashMap<PathBuf, Arc<Snapshot>>,
    recognizers: Vec<Arc<dyn Recognizer>>,
    wake_requested: bool,
    /// Bumped by every start; a worker with an older generation is cancelled.
    generation: u64,
    live_worker: Option<u64>,
}

impl MonitorState {
    fn cancelled(&self, generation: u64) -> bool {
        self.generation != generation || !self.lifecycle.is_active()
    }

    fn is_monitored(&self, directory: &Path) -> bool {
        self.directories.iter().any(|d| d == directory)
    }
}

impl DirectoryMonitor {
    /// Monitor `root` with no recognizers registered yet. A zero `delay` is
    /// raised to [`MIN_DELAY`].
    pub fn new<P: AsRef<Path>>(root: P, recursive: bool, delay: Duration) -> Self {
        let mut config = MonitorConfig::default();
        config.scan.recursive = recursive;

        let monitor = Self::build(root.as_ref(), &config);
        monitor.shared.lock().delay = clamp_delay(delay);
        monitor
    }

    /// Monitor `root` using `config`, registering the recognizers it enables.
    pub fn with_config<P: AsRef<Path>>(root: P, config: &MonitorConfig) -> Self {
        let monitor = Self::build(root.as_ref(), config);
        monitor.shared.lock().recognizers = config.recognizers.build();
        monitor
    }

    fn build(root: &Path, config: &MonitorConfig) -> Self {
        let state = MonitorState {
            lifecycle: StateMachine::new(),
            delay: clamp_delay(config.scan.delay()),
            directories: Vec::new(),
            snapshots: HashMap::new(),
            recognizers: Vec::new(),
            wake_requested: false,
            generation: 0,
            live_worker: None,
        };

        Self {
            shared: Arc::new(Shared {
                root: root.to_path_buf(),
                recursive: config.scan.recursive,
                directory_pause: config.scan.directory_pause(),
                stop_timeout: config.scan.stop_timeout(),
                throttle: config.throttle.clone(),
                state: Mutex::new(state),
                signal: Condvar::new(),
                dispatcher: EventDispatcher::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn is_recursive(&self) -> bool {
        self.shared.recursive
    }

    /// Begin scanning on a fresh worker thread.
    ///
    /// Fails if the monitor is already running or suspended, or if the root
    /// directory is missing. Both checks happen before the worker is spawned.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.control();

        self.shared.lock().lifecycle.check(Transition::Start)?;

        let root = &self.shared.root;
        if !root.exists() {
            return Err(MonitorError::RootNotFound(root.clone()));
        }
        if !root.is_dir() {
            return Err(MonitorError::NotADirectory(root.clone()));
        }

        if let Some(previous) = worker.take() {
            if previous.is_finished() {
                let _ = previous.join();
            }
        }

        let (generation, rollback) = {
            let mut state = self.shared.lock();
            let rollback = state.lifecycle.clone();
            state.lifecycle.apply(Transition::Start)?;
            state.generation += 1;
            state.live_worker = Some(state.generation);
            state.wake_requested = false;
            (state.generation, rollback)
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || shared.run(generation));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                tracing::info!("Monitoring {} (recursive: {})", root.display(), self.shared.recursive);
                Ok(())
            }
            Err(err) => {
                let mut state = self.shared.lock();
                state.lifecycle = rollback;
                state.live_worker = None;
                Err(MonitorError::Spawn(err))
            }
        }
    }

    /// Stop scanning and wait a bounded time for the worker to exit.
    pub fn stop(&self) -> Result<()> {
        let mut worker = self.control();
        self.stop_worker(&mut worker, &[])
    }

    /// Pause scanning. Monitored directories and stored snapshots are kept.
    pub fn suspend(&self) -> Result<()> {
        let _worker = self.control();
        self.shared.transition(Transition::Suspend)?;
        tracing::info!("Monitor suspended");
        Ok(())
    }

    /// Continue scanning. A worker waiting out its delay starts the next tick
    /// immediately.
    pub fn resume(&self) -> Result<()> {
        let _worker = self.control();
        self.shared.transition(Transition::Resume)?;
        tracing::info!("Monitor resumed");
        Ok(())
    }

    /// Stop if needed, then release listeners, recognizers and all scan state.
    ///
    /// Destroying twice is harmless and only logged.
    pub fn destroy(&self) -> Result<()> {
        let mut worker = self.control();
        let plan = self.shared.lock().lifecycle.destroy_plan()?;

        if plan.is_empty() {
            tracing::warn!("Monitor for {} is already destroyed", self.shared.root.display());
            return Ok(());
        }

        // Transitions leading up to a stop are applied together with it, so
        // a suspended worker is never woken into one more tick.
        let mut leading = Vec::new();
        for transition in plan {
            match transition {
                Transition::Stop => {
                    self.stop_worker(&mut worker, &leading)?;
                    leading.clear();
                }
                Transition::Destroy => {
                    let recognizers = {
                        let mut state = self.shared.lock();
                        for pending in leading.drain(..) {
                            state.lifecycle.apply(pending)?;
                        }
                        state.lifecycle.apply(Transition::Destroy)?;
                        state.directories.clear();
                        state.snapshots.clear();
                        state.wake_requested = false;
                        std::mem::take(&mut state.recognizers)
                    };
                    drop(recognizers);
                    self.shared.dispatcher.clear();
                }
                other => leading.push(other),
            }
        }

        tracing::info!("Monitor for {} destroyed", self.shared.root.display());
        Ok(())
    }

    pub fn state(&self) -> ServiceState {
        self.shared.lock().lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().lifecycle.is_running()
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.lock().lifecycle.is_suspended()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.lock().lifecycle.is_destroyed()
    }

    /// Watch another directory. Returns `false` if it was already watched.
    pub fn add_directory<P: AsRef<Path>>(&self, directory: P) -> Result<bool> {
        let directory = directory.as_ref();
        let mut state = self.shared.mutable_state()?;
        if state.is_monitored(directory) {
            return Ok(false);
        }
        state.directories.push(directory.to_path_buf());
        tracing::debug!("Added {} to monitored directories", directory.display());
        Ok(true)
    }

    /// Stop watching a directory. Its stored snapshot and any recognizer
    /// history for it are dropped immediately.
    pub fn remove_directory<P: AsRef<Path>>(&self, directory: P) -> Result<bool> {
        let directory = directory.as_ref();
        let recognizers = {
            let mut state = self.shared.mutable_state()?;
            let Some(index) = state.directories.iter().position(|d| d == directory) else {
                return Ok(false);
            };
            state.directories.remove(index);
            state.snapshots.remove(directory);
            state.recognizers.clone()
        };

        for recognizer in &recognizers {
            recognizer.forget(directory);
        }
        tracing::debug!("Removed {} from monitored directories", directory.display());
        Ok(true)
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        self.shared.lock().directories.clone()
    }

    pub fn add_recognizer(&self, recognizer: Arc<dyn Recognizer>) -> Result<()> {
        self.shared.mutable_state()?.recognizers.push(recognizer);
        Ok(())
    }

    /// Remove a recognizer by identity. Returns whether it was registered.
    pub fn remove_recognizer(&self, recognizer: &Arc<dyn Recognizer>) -> bool {
        let mut state = self.shared.lock();
        let before = state.recognizers.len();
        state.recognizers.retain(|registered| !Arc::ptr_eq(registered, recognizer));
        state.recognizers.len() != before
    }

    pub fn recognizer_count(&self) -> usize {
        self.shared.lock().recognizers.len()
    }

    /// Change the inter-scan delay. A worker already waiting uses the new
    /// delay for its current wait. A zero delay is raised to [`MIN_DELAY`].
    pub fn set_delay(&self, delay: Duration) {
        self.shared.lock().delay = clamp_delay(delay);
        self.shared.signal.notify_all();
    }

    pub fn delay(&self) -> Duration {
        self.shared.lock().delay
    }

    pub fn add_listener(&self, listener: Arc<dyn MonitorListener>) -> Result<()> {
        drop(self.shared.mutable_state()?);
        self.shared.dispatcher.add_listener(listener);
        Ok(())
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MonitorListener>) -> bool {
        self.shared.dispatcher.remove_listener(listener)
    }

    /// Cut the current inter-scan wait short.
    pub fn wake(&self) {
        self.shared.lock().wake_requested = true;
        self.shared.signal.notify_all();
    }

    fn control(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `leading` then Stop under one lock, and wait for the worker.
    fn stop_worker(&self, worker: &mut Option<JoinHandle<()>>, leading: &[Transition]) -> Result<()> {
        let generation = {
            let mut state = self.shared.lock();
            let rollback = state.lifecycle.clone();
            for transition in leading.iter().copied().chain([Transition::Stop]) {
                if let Err(err) = state.lifecycle.apply(transition) {
                    state.lifecycle = rollback;
                    return Err(err);
                }
            }
            state.generation
        };
        self.shared.signal.notify_all();

        if let Some(handle) = worker.take() {
            if handle.thread().id() == thread::current().id() {
                // Called from a listener on the worker itself; it exits once
                // the callback returns.
                tracing::debug!("Stop requested from the scan worker");
            } else if self.shared.wait_for_exit(generation, self.shared.stop_timeout) {
                if handle.join().is_err() {
                    tracing::warn!("Scan worker panicked during shutdown");
                }
            } else {
                tracing::warn!(
                    "Scan worker did not exit within {:?}; detaching it",
                    self.shared.stop_timeout
                );
            }
        }

        self.shared.lock().snapshots.clear();
        tracing::info!("Monitor for {} stopped", self.shared.root.display());
        Ok(())
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        if self.shared.lock().lifecycle.is_active() {
            if let Err(err) = self.stop() {
                tracing::warn!("Failed to stop monitor on drop: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for DirectoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryMonitor")
            .field("root", &self.shared.root)
            .field("recursive", &self.shared.recursive)
            .field("state", &self.state())
            .finish()
    }
}

/// Marks the worker as gone however it leaves `run`.
struct WorkerExit<'a> {
    shared: &'a Shared,
    generation: u64,
}

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.live_worker == Some(self.generation) {
            state.live_worker = None;
        }
        drop(state);
        self.shared.signal.notify_all();
        tracing::debug!("Scan worker {} exited", self.generation);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mutable_state(&self) -> Result<MutexGuard<'_, MonitorState>> {
        let state = self.lock();
        if state.lifecycle.is_destroyed() {
            return Err(MonitorError::Destroyed);
        }
        Ok(state)
    }

    fn wait<'a>(&self, state: MutexGuard<'a, MonitorState>) -> MutexGuard<'a, MonitorState> {
        self.signal.wait(state).unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait_timeout<'a>(
        &self,
        state: MutexGuard<'a, MonitorState>,
        timeout: Duration,
    ) -> MutexGuard<'a, MonitorState> {
        match self.signal.wait_timeout(state, timeout) {
            Ok((state, _)) => state,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    /// Whether results for `directory` may still be published by this worker.
    fn accepts(&self, generation: u64, directory: &Path) -> bool {
        let state = self.lock();
        !state.cancelled(generation) && state.is_monitored(directory)
    }

    fn transition(&self, transition: Transition) -> Result<ServiceState> {
        let target = self.lock().lifecycle.apply(transition)?;
        self.signal.notify_all();
        Ok(target)
    }

    fn status<S: Into<String>>(&self, kind: StatusKind, message: S) {
        self.dispatcher.status_changed(&StatusEvent::new(kind, message));
    }

    fn wait_for_exit(&self, generation: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.live_worker == Some(generation) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self.wait_timeout(state, deadline - now);
        }
        true
    }

    fn run(&self, generation: u64) {
        let _exit = WorkerExit {
            shared: self,
            generation,
        };
        tracing::debug!("Scan worker {} started", generation);

        self.discover(generation);

        let mut throttler = Throttler::from_config(&self.throttle);
        while self.await_tick(generation) {
            if let Err(err) = self.tick(generation) {
                tracing::error!("Scan tick failed: {}", err);

                if let Some(cooldown) = throttler.poke() {
                    tracing::error!("Too many scan failures; cooling down for {:?}", cooldown);
                    self.status(
                        StatusKind::Throttled,
                        format!("Too many failures, pausing for {}s", cooldown.as_secs()),
                    );
                    if !self.pause(generation, cooldown) {
                        break;
                    }
                    continue;
                }
            }

            if !self.wait_for_next_tick(generation) {
                break;
            }
        }
    }

    fn discover(&self, generation: u64) {
        self.status(
            StatusKind::DiscoveryStarted,
            format!("Discovering directories under {}", self.root.display()),
        );

        let found = DirectoryDiscovery::new(&self.root, self.recursive).discover();

        let count = {
            let mut state = self.lock();
            if state.cancelled(generation) {
                return;
            }
            for directory in found {
                if !state.is_monitored(&directory) {
                    state.directories.push(directory);
                }
            }
            state.directories.len()
        };

        self.status(
            StatusKind::DiscoveryEnded,
            format!("Monitoring {} directories", count),
        );
    }

    /// Block while suspended. Returns `false` once the worker is cancelled.
    fn await_tick(&self, generation: u64) -> bool {
        let mut state = self.lock();
        loop {
            if state.cancelled(generation) {
                return false;
            }
            if !state.lifecycle.is_suspended() {
                return true;
            }
            state = self.wait(state);
        }
    }

    /// Wait out the inter-scan delay, an early wake-up, or a suspension.
    /// Returns `false` once the worker is cancelled.
    fn wait_for_next_tick(&self, generation: u64) -> bool {
        let started = Instant::now();
        let mut resumed = false;
        let mut state = self.lock();

        loop {
            if state.cancelled(generation) {
                return false;
            }
            if state.lifecycle.is_suspended() {
                state = self.wait(state);
                resumed = true;
                continue;
            }
            if resumed || state.wake_requested {
                state.wake_requested = false;
                return true;
            }

            let deadline = started + state.delay;
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            state = self.wait_timeout(state, deadline - now);
        }
    }

    /// Sleep for `duration` unless cancelled first.
    fn pause(&self, generation: u64, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.lock();

        loop {
            if state.cancelled(generation) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            state = self.wait_timeout(state, deadline - now);
        }
    }

    fn tick(&self, generation: u64) -> Result<()> {
        let directories = self.lock().directories.clone();
        self.status(
            StatusKind::ScanStarted,
            format!("Scanning {} directories", directories.len()),
        );

        let mut first_failure = None;
        let mut scanned = 0;

        for (index, directory) in directories.iter().enumerate() {
            if index > 0 && !self.directory_pause.is_zero() && !self.pause(generation, self.directory_pause) {
                break;
            }
            {
                let state = self.lock();
                if state.cancelled(generation) || state.lifecycle.is_suspended() {
                    break;
                }
            }

            if let Err(err) = self.scan_directory(generation, directory) {
                tracing::warn!("{}", err);
                first_failure.get_or_insert(err);
            }
            scanned += 1;
        }

        if self.lock().cancelled(generation) {
            return Ok(());
        }
        self.status(
            StatusKind::ScanEnded,
            format!("Scanned {} of {} directories", scanned, directories.len()),
        );

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn scan_directory(&self, generation: u64, directory: &Path) -> Result<()> {
        let mut failure = None;
        let current = match Snapshot::capture(directory) {
            Ok(snapshot) => snapshot,
            Err(source) => {
                failure = Some(MonitorError::Scan {
                    directory: directory.to_path_buf(),
                    source,
                });
                Snapshot::empty(directory)
            }
        };
        let current = Arc::new(current);

        let (previous, recognizers) = {
            let state = self.lock();
            if !state.is_monitored(directory) {
                return Ok(());
            }
            (state.snapshots.get(directory).cloned(), state.recognizers.clone())
        };

        match previous {
            Some(previous) => {
                for recognizer in &recognizers {
                    if !self.accepts(generation, directory) {
                        break;
                    }
                    let recognized = panic::catch_unwind(AssertUnwindSafe(|| {
                        recognizer.recognize(&previous, &current)
                    }));

                    match recognized {
                        Ok(events) => {
                            for event in &events {
                                if !self.accepts(generation, directory) {
                                    break;
                                }
                                self.dispatcher.directory_activity(event);
                            }
                        }
                        Err(_) => {
                            failure.get_or_insert(MonitorError::RecognizerPanicked {
                                recognizer: recognizer.name().to_string(),
                            });
                        }
                    }
                }
            }
            None => {
                tracing::debug!(
                    "First snapshot of {} ({} files)",
                    directory.display(),
                    current.len()
                );
            }
        }

        let removed = {
            let mut state = self.lock();
            let monitored = state.is_monitored(directory);
            if monitored && !state.cancelled(generation) {
                state.snapshots.insert(directory.to_path_buf(), current);
            }
            !monitored
        };

        // Removed while the recognizers ran; drop any history they put back.
        if removed {
            for recognizer in &recognizers {
                recognizer.forget(directory);
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::ChannelListener;
    use crate::core::events::{FileEvent, FileEventKind, MonitorEvent};
    use crate::core::recognizer::{CreatedRecognizer, DeletedRecognizer};
    use std::fs;
    use std::sync::mpsc::{self, Receiver, Sender};
    use tempfile::TempDir;

    fn monitor_for(temp_dir: &TempDir) -> DirectoryMonitor {
        DirectoryMonitor::new(temp_dir.path(), false, Duration::from_millis(20))
    }

    #[test]
    fn test_start_fails_for_missing_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = DirectoryMonitor::new(temp_dir.path().join("missing"), false, Duration::from_millis(20));

        assert!(matches!(monitor.start(), Err(MonitorError::RootNotFound(_))));
        assert_eq!(monitor.state(), ServiceState::Idle);
    }

    #[test]
    fn test_start_fails_for_file_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, "x").expect("Failed to write file");
        let monitor = DirectoryMonitor::new(&file, false, Duration::from_millis(20));

        assert!(matches!(monitor.start(), Err(MonitorError::NotADirectory(_))));
        assert_eq!(monitor.state(), ServiceState::Idle);
    }

    #[test]
    fn test_lifecycle_misuse_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);

        assert!(monitor.stop().is_err());
        assert!(monitor.resume().is_err());

        monitor.start().expect("Failed to start monitor");
        assert!(matches!(
            monitor.start(),
            Err(MonitorError::InvalidTransition { from: ServiceState::Running, transition: Transition::Start })
        ));
        assert!(monitor.resume().is_err());

        monitor.suspend().expect("Failed to suspend");
        assert!(monitor.is_suspended());
        assert!(monitor.suspend().is_err());

        monitor.resume().expect("Failed to resume");
        assert!(monitor.is_running());

        monitor.stop().expect("Failed to stop");
        assert_eq!(monitor.state(), ServiceState::Stopped);
        assert!(monitor.stop().is_err());
    }

    #[test]
    fn test_restart_after_stop() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);

        monitor.start().expect("Failed to start monitor");
        monitor.stop().expect("Failed to stop");
        monitor.start().expect("Failed to restart monitor");
        assert!(monitor.is_running());
        monitor.stop().expect("Failed to stop");
    }

    #[test]
    fn test_destroy_from_suspended_and_twice() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);
        monitor.add_recognizer(Arc::new(CreatedRecognizer)).expect("Failed to add recognizer");

        monitor.start().expect("Failed to start monitor");
        monitor.suspend().expect("Failed to suspend");
        monitor.destroy().expect("Failed to destroy");

        assert!(monitor.is_destroyed());
        assert_eq!(monitor.recognizer_count(), 0);
        assert!(monitor.directories().is_empty());

        monitor.destroy().expect("Second destroy should be a no-op");
        assert!(matches!(monitor.add_directory(temp_dir.path()), Err(MonitorError::Destroyed)));
        assert!(monitor.start().is_err());
    }

    #[test]
    fn test_destroy_before_start_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);

        assert!(monitor.destroy().is_err());
        assert_eq!(monitor.state(), ServiceState::Idle);
    }

    #[test]
    fn test_directory_set_is_ordered_and_unique() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");

        assert!(monitor.add_directory(&b).unwrap());
        assert!(monitor.add_directory(&a).unwrap());
        assert!(!monitor.add_directory(&b).unwrap());
        assert_eq!(monitor.directories(), vec![b.clone(), a.clone()]);

        assert!(monitor.remove_directory(&b).unwrap());
        assert!(!monitor.remove_directory(&b).unwrap());
        assert_eq!(monitor.directories(), vec![a]);
    }

    #[test]
    fn test_remove_recognizer_by_identity() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);
        let created: Arc<dyn Recognizer> = Arc::new(CreatedRecognizer);
        let deleted: Arc<dyn Recognizer> = Arc::new(DeletedRecognizer);

        monitor.add_recognizer(created.clone()).unwrap();
        monitor.add_recognizer(deleted.clone()).unwrap();
        assert!(monitor.remove_recognizer(&created));
        assert!(!monitor.remove_recognizer(&created));
        assert_eq!(monitor.recognizer_count(), 1);
    }

    #[test]
    fn test_with_config_registers_recognizers() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = MonitorConfig::default();
        config.scan.delay_ms = 250;
        config.recognizers.finished_writing = true;

        let monitor = DirectoryMonitor::with_config(temp_dir.path(), &config);

        assert_eq!(monitor.recognizer_count(), 4);
        assert_eq!(monitor.delay(), Duration::from_millis(250));
        assert!(!monitor.is_recursive());
    }

    #[test]
    fn test_set_delay() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);

        monitor.set_delay(Duration::from_secs(5));
        assert_eq!(monitor.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_delay_is_clamped() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = DirectoryMonitor::new(temp_dir.path(), false, Duration::ZERO);
        assert_eq!(monitor.delay(), MIN_DELAY);

        monitor.set_delay(Duration::from_millis(40));
        monitor.set_delay(Duration::ZERO);
        assert_eq!(monitor.delay(), MIN_DELAY);
    }

    fn listen(monitor: &DirectoryMonitor) -> Receiver<MonitorEvent> {
        let (tx, rx) = mpsc::channel();
        monitor
            .add_listener(Arc::new(ChannelListener::new(tx)))
            .expect("Failed to add listener");
        rx
    }

    fn wait_for_scan_end(rx: &Receiver<MonitorEvent>) {
        loop {
            match rx.recv_timeout(Duration::from_secs(5)) {
                Ok(MonitorEvent::Status(status)) if status.kind == StatusKind::ScanEnded => return,
                Ok(_) => continue,
                Err(e) => panic!("Timeout waiting for scan to end: {:?}", e),
            }
        }
    }

    #[test]
    fn test_destroy_from_suspended_runs_no_further_tick() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);
        let rx = listen(&monitor);

        monitor.start().expect("Failed to start monitor");
        wait_for_scan_end(&rx);
        monitor.suspend().expect("Failed to suspend");

        // Let a tick that was already under way finish.
        thread::sleep(Duration::from_millis(100));
        while rx.try_recv().is_ok() {}

        monitor.destroy().expect("Failed to destroy");
        let late: Vec<_> = rx.try_iter().collect();
        assert!(
            !late.iter().any(|e| matches!(e, MonitorEvent::Status(s) if s.kind == StatusKind::ScanStarted)),
            "Scan started during destroy: {:?}",
            late
        );
    }

    /// Blocks inside `recognize` until released, then reports one file.
    struct GatedRecognizer {
        entered: Mutex<Sender<()>>,
        release: Mutex<Receiver<()>>,
        forgotten: Mutex<Vec<PathBuf>>,
    }

    impl Recognizer for GatedRecognizer {
        fn name(&self) -> &str {
            "gated"
        }

        fn recognize(&self, _before: &Snapshot, after: &Snapshot) -> Vec<FileEvent> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv_timeout(Duration::from_secs(5));
            vec![FileEvent::new(
                FileEventKind::Created,
                after.directory().join("late.txt"),
                after.directory(),
            )]
        }

        fn forget(&self, directory: &Path) {
            self.forgotten.lock().unwrap().push(directory.to_path_buf());
        }
    }

    #[test]
    fn test_directory_removed_mid_recognize_publishes_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let monitor = monitor_for(&temp_dir);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gated = Arc::new(GatedRecognizer {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            forgotten: Mutex::new(Vec::new()),
        });
        monitor.add_recognizer(gated.clone()).expect("Failed to add recognizer");
        let rx = listen(&monitor);
        monitor.start().expect("Failed to start monitor");

        // The first tick only records the baseline; the second runs recognizers.
        wait_for_scan_end(&rx);
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("Recognizer was never called");
        assert!(monitor.remove_directory(temp_dir.path()).unwrap());
        release_tx.send(()).unwrap();

        wait_for_scan_end(&rx);
        let activity: Vec<_> = rx
            .try_iter()
            .filter(|e| matches!(e, MonitorEvent::Activity(_)))
            .collect();
        assert!(activity.is_empty(), "Events for a removed directory: {:?}", activity);

        // Once from remove_directory, once more from the worker after recognize returned.
        assert_eq!(gated.forgotten.lock().unwrap().len(), 2);
        monitor.stop().expect("Failed to stop");
    }
}
