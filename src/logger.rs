use crate::error::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

/// Session log sink, chosen once at startup
pub trait Logger: Send + Sync {
    fn start(&self, _site: &str, _local_root: &Path) {}
    fn listed(&self, _files: usize, _dirs: usize) {}
    fn download_done(&self, _remote: &str, _local: &Path, _bytes: u64) {}
    fn error(&self, _context: &str, _msg: &str) {}
    fn done(&self, _files: usize, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
    session: Uuid,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
            session: Uuid::new_v4(),
        })
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {} {}", Utc::now().to_rfc3339(), self.session, s);
    }
}

impl Logger for TextLogger {
    fn start(&self, site: &str, local_root: &Path) {
        self.line(&format!("START site={} dst={}", site, local_root.display()));
    }
    fn listed(&self, files: usize, dirs: usize) {
        self.line(&format!("LIST files={files} dirs={dirs}"));
    }
    fn download_done(&self, remote: &str, local: &Path, bytes: u64) {
        self.line(&format!(
            "GET src={} dst={} bytes={}",
            remote,
            local.display(),
            bytes
        ));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
    fn done(&self, files: usize, bytes: u64, seconds: f64) {
        self.line(&format!("DONE files={files} bytes={bytes} seconds={seconds:.3}"));
    }
}
