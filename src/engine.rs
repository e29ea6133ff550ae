//! Download engine
//!
//! A mirror session walks a fixed sequence of steps on its own thread:
//!
//! ```text
//! Waiting -> Enumerate -> Publish -> Measure -> Prepare -> Transfer* -> Finished
//! ```
//!
//! `Transfer` repeats once per discovered file. Every step publishes its
//! status on the [`EventBus`]; the first error ends the session.

use crate::client::{TransferListener, TransferProgress};
use crate::error::{MirrorError, Result};
use crate::events::{display_size, EventBus, FileView, MirrorEvent, ProgressSnapshot};
use crate::local;
use crate::logger::{Logger, NoopLogger};
use crate::remote::{RemoteDirectory, RemoteFile, RemoteObject};
use crate::signal::{Pacing, Signals};
use crate::site::RemoteSite;
use crate::size::format_size;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime};

pub const STATUS_WAITING: &str = "Waiting...";
pub const STATUS_SEARCHING: &str = "Searching files...";
pub const STATUS_PENDING: &str = "Pending files...";
pub const STATUS_MEASURING: &str = "Calculating size...";
pub const STATUS_PREPARING: &str = "Prepare to download...";
pub const STATUS_FINISHED: &str = "Finished";

pub fn download_status(name: &str) -> String {
    format!("Download: {name}")
}

pub fn site_title(host: &str) -> String {
    format!("Site: {host}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Waiting,
    Enumerate,
    Publish,
    Measure,
    Prepare,
    Transfer,
    Finished,
}

/// What to mirror and where
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: String,
    pub local_root: PathBuf,
    pub sub_dir: Option<String>,
    pub auto_close: bool,
}

/// State of one mirror run, owned by the engine thread
#[derive(Debug)]
pub struct MirrorSession {
    pub options: SessionOptions,
    pub total_bytes: u64,
    pub files: Vec<RemoteFile>,
    pub directories: Vec<RemoteDirectory>,
    pub step: Step,
    /// Index of the next file to transfer
    pub current: usize,
}

impl MirrorSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            total_bytes: 0,
            files: Vec::new(),
            directories: Vec::new(),
            step: Step::Waiting,
            current: 0,
        }
    }
}

/// Running byte count for the progress display.
///
/// Completed files count at their listed size. The file in flight counts at
/// its highest reported size, capped at its listed size, so the total never
/// goes backwards and never passes the maximum.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProgressTally {
    confirmed: u64,
    in_flight: u64,
    in_flight_cap: u64,
    maximum: u64,
}

impl ProgressTally {
    pub fn new(maximum: u64) -> Self {
        Self {
            maximum,
            ..Self::default()
        }
    }

    pub fn begin_file(&mut self, listed_size: u64) {
        self.in_flight = 0;
        self.in_flight_cap = listed_size;
    }

    pub fn observe(&mut self, progress: &TransferProgress) {
        let reported = if progress.finished {
            self.in_flight_cap
        } else {
            progress.current_size.min(self.in_flight_cap)
        };
        self.in_flight = self.in_flight.max(reported);
    }

    pub fn complete_file(&mut self) {
        self.confirmed += self.in_flight_cap;
        self.in_flight = 0;
        self.in_flight_cap = 0;
    }

    pub fn current(&self) -> u64 {
        (self.confirmed + self.in_flight).min(self.maximum)
    }

    pub fn maximum(&self) -> u64 {
        self.maximum
    }

    pub fn percent(&self) -> f64 {
        if self.maximum == 0 {
            return 0.0;
        }
        (self.current() as f64 / self.maximum as f64).min(1.0) * 100.0
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            percent: self.percent(),
            current_size: display_size(self.current()),
            maximum_size: display_size(self.maximum),
        }
    }
}

/// Folds chunk events into the tally and republishes progress
struct TallyListener {
    tally: Arc<Mutex<ProgressTally>>,
    bus: Arc<EventBus>,
}

impl TransferListener for TallyListener {
    fn on_progress(&self, progress: &TransferProgress) {
        let snapshot = {
            let mut tally = self.tally.lock();
            tally.observe(progress);
            tally.snapshot()
        };
        self.bus.publish(MirrorEvent::Progress(snapshot));
    }
}

pub struct MirrorEngine<S: RemoteSite> {
    site: S,
    session: MirrorSession,
    bus: Arc<EventBus>,
    signals: Arc<Signals>,
    pacing: Pacing,
    logger: Arc<dyn Logger>,
    tally: Arc<Mutex<ProgressTally>>,
    /// Local directories and the remote times they carry
    directory_times: Vec<(PathBuf, SystemTime)>,
    started_at: Option<Instant>,
}

impl<S: RemoteSite> MirrorEngine<S> {
    pub fn new(site: S, options: SessionOptions) -> Self {
        Self {
            site,
            session: MirrorSession::new(options),
            bus: Arc::new(EventBus::new()),
            signals: Arc::new(Signals::new()),
            pacing: Pacing::default(),
            logger: Arc::new(NoopLogger),
            tally: Arc::new(Mutex::new(ProgressTally::default())),
            directory_times: Vec::new(),
            started_at: None,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn signals(&self) -> Arc<Signals> {
        self.signals.clone()
    }

    pub fn session(&self) -> &MirrorSession {
        &self.session
    }

    /// Drive the session to its end on the calling thread
    pub fn run(mut self) -> Result<MirrorSession> {
        let options = &self.session.options;
        self.bus.publish(MirrorEvent::Title(site_title(&options.host)));
        self.bus.publish(MirrorEvent::Status(STATUS_WAITING.to_string()));
        self.bus.publish(MirrorEvent::Progress(ProgressSnapshot::default()));

        loop {
            let outcome = if self.signals.is_cancelled() {
                Err(MirrorError::Cancelled)
            } else {
                self.advance()
            };
            match outcome {
                Ok(true) => return Ok(self.session),
                Ok(false) => {}
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn fail(&self, error: MirrorError) -> MirrorError {
        if matches!(error, MirrorError::Cancelled) {
            log::info!("mirror of {} cancelled", self.session.options.host);
            return error;
        }
        log::error!("{:?} step failed: {}", self.session.step, error);
        self.logger.error(&format!("{:?}", self.session.step), &error.to_string());
        self.bus.publish(MirrorEvent::Failed(error.to_string()));
        error
    }

    fn status(&self, status: impl Into<String>) {
        self.bus.publish(MirrorEvent::Status(status.into()));
    }

    fn enter(&mut self, step: Step, status: &str) {
        log::debug!("{:?} -> {:?}", self.session.step, step);
        self.session.step = step;
        self.status(status);
    }

    /// Run one step; `Ok(true)` once the session is over
    fn advance(&mut self) -> Result<bool> {
        match self.session.step {
            Step::Waiting => {
                self.signals.wait_for_start()?;
                self.started_at = Some(Instant::now());
                self.logger
                    .start(&self.session.options.host, &self.session.options.local_root);
                self.signals.pause(self.pacing.settle)?;
                self.enter(Step::Enumerate, STATUS_SEARCHING);
            }
            Step::Enumerate => {
                let sub_dir = self.session.options.sub_dir.as_deref();
                let (files, dirs) = self.site.list_all_objects(sub_dir)?;
                log::info!("found {} files in {} directories", files.len(), dirs.len());
                self.logger.listed(files.len(), dirs.len());
                self.session.files = files;
                self.session.directories = dirs;
                self.signals.pause(self.pacing.step)?;
                self.enter(Step::Publish, STATUS_PENDING);
            }
            Step::Publish => {
                let views = self.session.files.iter().map(file_view).collect();
                self.bus.publish(MirrorEvent::FilesAppended(views));
                self.signals.pause(self.pacing.step)?;
                self.enter(Step::Measure, STATUS_MEASURING);
            }
            Step::Measure => {
                let total: u64 = self.session.files.iter().map(RemoteFile::size).sum();
                // An empty tree has no unit and ends the session here
                format_size(total)?;
                self.session.total_bytes = total;
                *self.tally.lock() = ProgressTally::new(total);
                self.bus.publish(MirrorEvent::Progress(self.tally.lock().snapshot()));
                self.signals.pause(self.pacing.step)?;
                self.enter(Step::Prepare, STATUS_PREPARING);
            }
            Step::Prepare => {
                let root = &self.session.options.local_root;
                local::ensure_dir_exists(root)?;
                for dir in &self.session.directories {
                    let local_dir = local::local_directory(root, &dir.relative_path());
                    local::ensure_dir_exists(&local_dir)?;
                    let modified = self
                        .site
                        .modified_time(&RemoteObject::Directory(dir.clone()))?;
                    local::stamp(&local_dir, modified)?;
                    self.directory_times.push((local_dir, modified));
                }
                self.site.subscribe(Arc::new(TallyListener {
                    tally: self.tally.clone(),
                    bus: self.bus.clone(),
                }));
                self.signals.pause(self.pacing.step)?;
                self.session.step = Step::Transfer;
            }
            Step::Transfer => {
                let index = self.session.current;
                let Some(file) = self.session.files.get(index) else {
                    self.restamp_directories()?;
                    self.finish()?;
                    return Ok(true);
                };

                self.status(download_status(file.name()));
                self.tally.lock().begin_file(file.size());
                let local_dir =
                    local::local_directory(&self.session.options.local_root, &file.relative_directory);
                let target = self.site.download(file, &local_dir)?;
                self.logger.download_done(file.uri(), &target, file.size());

                let snapshot = {
                    let mut tally = self.tally.lock();
                    tally.complete_file();
                    tally.snapshot()
                };
                self.session.files[index].mark_finished();
                self.session.current += 1;
                self.bus.publish(MirrorEvent::FileFinished(index));
                self.bus.publish(MirrorEvent::Progress(snapshot));
                self.signals.pause(self.pacing.transfer)?;
            }
            Step::Finished => return Ok(true),
        }
        Ok(false)
    }

    /// Put the remote times back on every local directory, deepest first.
    /// Files written since `Prepare` moved them.
    fn restamp_directories(&mut self) -> Result<()> {
        self.directory_times
            .sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
        for (path, modified) in &self.directory_times {
            local::stamp(path, *modified)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.enter(Step::Finished, STATUS_FINISHED);
        let seconds = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or_default();
        log::info!(
            "mirrored {} files ({} bytes) in {:.1}s",
            self.session.files.len(),
            self.session.total_bytes,
            seconds
        );
        self.logger
            .done(self.session.files.len(), self.session.total_bytes, seconds);
        if self.session.options.auto_close {
            self.signals.pause(self.pacing.finish)?;
            self.bus.publish(MirrorEvent::Finished);
        }
        Ok(())
    }
}

fn file_view(file: &RemoteFile) -> FileView {
    FileView {
        name: file.name().to_string(),
        relative_path: file.relative_path(),
        size: file.size(),
        finished: file.is_finished(),
    }
}

/// A mirror engine running on its own thread.
///
/// The handle holds no reference to the event bus, so queued subscribers see
/// their channel close when the engine thread ends.
pub struct EngineHandle {
    signals: Arc<Signals>,
    thread: JoinHandle<Result<MirrorSession>>,
}

impl EngineHandle {
    pub fn spawn<S>(engine: MirrorEngine<S>) -> Result<Self>
    where
        S: RemoteSite + Send + 'static,
    {
        let signals = engine.signals();
        let thread = thread::Builder::new()
            .name("ftpmirror-engine".into())
            .spawn(move || engine.run())?;
        Ok(Self { signals, thread })
    }

    pub fn start(&self) {
        self.signals.start();
    }

    pub fn cancel(&self) {
        self.signals.cancel();
    }

    pub fn signals(&self) -> Arc<Signals> {
        self.signals.clone()
    }

    pub fn join(self) -> Result<MirrorSession> {
        self.thread
            .join()
            .map_err(|_| crate::error!(Transfer, "engine thread panicked"))?
    }
}
