//! Observer surface of a mirror session
//!
//! The engine is the only publisher. Subscribers are either called directly
//! on the engine thread or fed through a bounded queue that the observer
//! drains on its own thread. Queued subscribers that miss a roster update are
//! resynchronised with a full [`MirrorEvent::RosterReset`] on the next
//! delivery that fits.

use crate::size::format_size;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

/// Shown for sizes that have no unit yet
pub const EMPTY_SIZE: &str = "0 KB";

/// One row of the file roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileView {
    pub name: String,
    /// `/`-separated path below the mirrored directory
    pub relative_path: String,
    pub size: u64,
    pub finished: bool,
}

/// Progress bar state
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// 0.0 ..= 100.0
    pub percent: f64,
    pub current_size: String,
    pub maximum_size: String,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            percent: 0.0,
            current_size: EMPTY_SIZE.to_string(),
            maximum_size: EMPTY_SIZE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MirrorEvent {
    Title(String),
    Status(String),
    /// Files appended to the end of the roster
    FilesAppended(Vec<FileView>),
    /// Roster row `index` completed
    FileFinished(usize),
    Progress(ProgressSnapshot),
    /// Full roster, replacing whatever the subscriber holds
    RosterReset(Vec<FileView>),
    Finished,
    Failed(String),
}

impl MirrorEvent {
    fn is_roster_delta(&self) -> bool {
        matches!(self, MirrorEvent::FilesAppended(_) | MirrorEvent::FileFinished(_))
    }

    fn is_terminal(&self) -> bool {
        matches!(self, MirrorEvent::Finished | MirrorEvent::Failed(_))
    }
}

/// Called on the engine thread for every event
pub trait MirrorObserver: Send + Sync {
    fn on_event(&self, event: &MirrorEvent);
}

enum Subscriber {
    Direct(Arc<dyn MirrorObserver>),
    Queued { tx: SyncSender<MirrorEvent>, stale: bool },
}

enum Delivery {
    Kept,
    Gone,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<Subscriber>,
    roster: Vec<FileView>,
}

/// Fan-out of engine events
#[derive(Default)]
pub struct EventBus {
    state: Mutex<BusState>,
    finished: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn MirrorObserver>) {
        self.state.lock().subscribers.push(Subscriber::Direct(observer));
    }

    /// Subscribe through a bounded queue of `capacity` events
    pub fn subscribe_queued(&self, capacity: usize) -> Receiver<MirrorEvent> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let mut state = self.state.lock();
        // Late subscribers start from the current roster
        let stale = !state.roster.is_empty();
        state.subscribers.push(Subscriber::Queued { tx, stale });
        rx
    }

    pub fn roster(&self) -> Vec<FileView> {
        self.state.lock().roster.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn publish(&self, event: MirrorEvent) {
        if matches!(event, MirrorEvent::Finished) && self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut state = self.state.lock();
        match &event {
            MirrorEvent::FilesAppended(files) => state.roster.extend(files.iter().cloned()),
            MirrorEvent::FileFinished(index) => {
                if let Some(row) = state.roster.get_mut(*index) {
                    row.finished = true;
                }
            }
            MirrorEvent::RosterReset(files) => state.roster = files.clone(),
            _ => {}
        }

        let BusState { subscribers, roster } = &mut *state;
        subscribers.retain_mut(|subscriber| {
            matches!(deliver(subscriber, &event, roster), Delivery::Kept)
        });
    }
}

fn deliver(subscriber: &mut Subscriber, event: &MirrorEvent, roster: &[FileView]) -> Delivery {
    let (tx, stale) = match subscriber {
        Subscriber::Direct(observer) => {
            observer.on_event(event);
            return Delivery::Kept;
        }
        Subscriber::Queued { tx, stale } => (tx, stale),
    };

    let terminal = event.is_terminal();

    if *stale {
        let reset = MirrorEvent::RosterReset(roster.to_vec());
        let sent = if terminal {
            tx.send(reset).map_err(|_| TrySendError::Disconnected(()))
        } else {
            tx.try_send(reset).map_err(|e| match e {
                TrySendError::Full(_) => TrySendError::Full(()),
                TrySendError::Disconnected(_) => TrySendError::Disconnected(()),
            })
        };
        match sent {
            Ok(()) => *stale = false,
            Err(TrySendError::Full(())) => return Delivery::Kept,
            Err(TrySendError::Disconnected(())) => return Delivery::Gone,
        }
        // The snapshot already contains this delta
        if event.is_roster_delta() {
            return Delivery::Kept;
        }
    }

    if terminal {
        return match tx.send(event.clone()) {
            Ok(()) => Delivery::Kept,
            Err(_) => Delivery::Gone,
        };
    }

    match tx.try_send(event.clone()) {
        Ok(()) => Delivery::Kept,
        Err(TrySendError::Full(_)) => {
            if event.is_roster_delta() {
                log::debug!("observer queue full, roster marked stale");
                *stale = true;
            }
            Delivery::Kept
        }
        Err(TrySendError::Disconnected(_)) => Delivery::Gone,
    }
}

/// Everything an observer displays, rebuilt from events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dashboard {
    pub title: String,
    pub status: String,
    pub progress: ProgressSnapshot,
    pub roster: Vec<FileView>,
    pub finished: bool,
    pub failure: Option<String>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &MirrorEvent) {
        match event {
            MirrorEvent::Title(title) => self.title = title.clone(),
            MirrorEvent::Status(status) => self.status = status.clone(),
            MirrorEvent::FilesAppended(files) => self.roster.extend(files.iter().cloned()),
            MirrorEvent::FileFinished(index) => {
                if let Some(row) = self.roster.get_mut(*index) {
                    row.finished = true;
                }
            }
            MirrorEvent::Progress(snapshot) => self.progress = snapshot.clone(),
            MirrorEvent::RosterReset(files) => self.roster = files.clone(),
            MirrorEvent::Finished => self.finished = true,
            MirrorEvent::Failed(message) => self.failure = Some(message.clone()),
        }
    }

    pub fn finished_files(&self) -> usize {
        self.roster.iter().filter(|row| row.finished).count()
    }
}

/// Display form of a running byte count; zero has no unit and shows as
/// [`EMPTY_SIZE`]
pub fn display_size(bytes: u64) -> String {
    format_size(bytes).unwrap_or_else(|_| EMPTY_SIZE.to_string())
}
