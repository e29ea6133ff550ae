//! ftpmirror library
//!
//! Enumerates a directory tree on an FTP server and mirrors it into a local
//! directory, one file at a time, reporting progress to observers.

pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod listing;
pub mod local;
pub mod logger;
pub mod progress;
pub mod protocol;
pub mod remote;
pub mod signal;
pub mod site;
pub mod size;

pub use client::{FtpClient, FtpConfig, TransferListener, TransferProgress};
pub use engine::{EngineHandle, MirrorEngine, MirrorSession, SessionOptions, Step};
pub use error::{MirrorError, Result};
pub use events::{Dashboard, EventBus, MirrorEvent, MirrorObserver};
pub use site::RemoteSite;
