//! Shared fixtures: an in-memory remote site, a small FTP server over
//! loopback, and an observer that records everything it sees.
#![allow(dead_code)]

use ftpmirror::client::{TransferListener, TransferProgress};
use ftpmirror::error::{MirrorError, Result};
use ftpmirror::events::{MirrorEvent, MirrorObserver, ProgressSnapshot};
use ftpmirror::listing::join_uri;
use ftpmirror::local;
use ftpmirror::remote::{RemoteFile, RemoteObject};
use ftpmirror::site::RemoteSite;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 2024-01-02T03:04:05Z, what both fixtures report as a modification time
pub fn remote_mtime() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_704_164_645)
}

pub fn write_file(path: &Path, size: usize) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(path, data)?;
    Ok(())
}

pub fn content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// A remote tree held in memory. Paths are `/`-separated without a leading
/// separator; the login directory is the empty path.
#[derive(Default)]
pub struct MemorySite {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    pub commands: Vec<String>,
    /// Bytes per progress event during downloads
    pub chunk: usize,
    /// Downloads of this path fail mid-stream
    pub broken: Option<String>,
    listeners: Vec<Arc<dyn TransferListener>>,
}

impl MemorySite {
    pub fn new() -> Self {
        Self {
            chunk: 64,
            ..Self::default()
        }
    }

    pub fn with_file(mut self, path: &str, size: usize) -> Self {
        if let Some((parent, _)) = path.rsplit_once('/') {
            self = self.with_dir(parent);
        }
        self.files.insert(path.to_string(), content(size));
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = join_uri(&current, part);
            self.dirs.insert(current.clone());
        }
        self
    }

    fn parent_of(path: &str) -> &str {
        path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
    }

    fn name_of(path: &str) -> &str {
        path.rsplit_once('/').map(|(_, n)| n).unwrap_or(path)
    }

    fn rejected(command: String, message: &str) -> MirrorError {
        MirrorError::Rejected {
            command,
            code: 550,
            message: message.to_string(),
        }
    }

    fn notify(&self, progress: TransferProgress) {
        for listener in &self.listeners {
            listener.on_progress(&progress);
        }
    }
}

impl RemoteSite for MemorySite {
    fn list_objects(&mut self, sub_dir: Option<&str>) -> Result<Vec<RemoteObject>> {
        let base = sub_dir.unwrap_or("").trim_end_matches('/').to_string();
        self.commands.push(format!("LIST {base}").trim_end().to_string());
        if !base.is_empty() && !self.dirs.contains(&base) {
            return Err(Self::rejected(format!("LIST {base}"), "No such directory"));
        }

        let mut lines = BTreeMap::new();
        for dir in self.dirs.iter().filter(|d| Self::parent_of(d) == base) {
            let name = Self::name_of(dir);
            lines.insert(name.to_string(), format!("drwxr-xr-x 2 ftp ftp 4096 Jan 02 2024 {name}"));
        }
        for (path, data) in self.files.iter().filter(|(p, _)| Self::parent_of(p) == base) {
            let name = Self::name_of(path);
            lines.insert(
                name.to_string(),
                format!("-rw-r--r-- 1 ftp ftp {} Jan 02 2024 {name}", data.len()),
            );
        }
        lines
            .values()
            .map(|line| RemoteObject::parse(line, sub_dir.unwrap_or("")))
            .collect()
    }

    fn download(&mut self, file: &RemoteFile, local_dir: &Path) -> Result<PathBuf> {
        self.commands.push(format!("RETR {}", file.uri()));
        let data = self
            .files
            .get(file.uri())
            .cloned()
            .ok_or_else(|| Self::rejected(format!("RETR {}", file.uri()), "No such file"))?;
        local::ensure_dir_exists(local_dir)?;
        let target = local_dir.join(file.name());
        let mut out = std::fs::File::create(&target)?;

        let mut sent = 0usize;
        for piece in data.chunks(self.chunk.max(1)) {
            if self.broken.as_deref() == Some(file.uri()) && sent > 0 {
                return Err(MirrorError::Transfer(format!(
                    "RETR {} interrupted after {} bytes",
                    file.uri(),
                    sent
                )));
            }
            out.write_all(piece)?;
            sent += piece.len();
            self.notify(TransferProgress {
                current_size: sent as u64,
                full_size: file.size(),
                finished: false,
            });
        }
        self.notify(TransferProgress {
            current_size: sent as u64,
            full_size: file.size(),
            finished: true,
        });
        drop(out);
        local::stamp(&target, remote_mtime())?;
        Ok(target)
    }

    fn upload_file(&mut self, local: &Path, sub_dir: Option<&str>) -> Result<()> {
        let name = local.file_name().unwrap().to_string_lossy().to_string();
        let path = join_uri(sub_dir.unwrap_or(""), &name);
        self.commands.push(format!("STOR {path}"));
        self.files.insert(path, std::fs::read(local)?);
        Ok(())
    }

    fn delete_file(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()> {
        let path = join_uri(sub_dir.unwrap_or(""), name);
        self.commands.push(format!("DELE {path}"));
        self.files
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| Self::rejected(format!("DELE {path}"), "No such file"))
    }

    fn make_directory(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()> {
        let path = join_uri(sub_dir.unwrap_or(""), name);
        self.commands.push(format!("MKD {path}"));
        if !self.dirs.insert(path.clone()) {
            return Err(Self::rejected(format!("MKD {path}"), "Directory exists"));
        }
        Ok(())
    }

    fn remove_directory(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()> {
        let path = join_uri(sub_dir.unwrap_or(""), name);
        self.commands.push(format!("RMD {path}"));
        if !self.dirs.remove(&path) {
            return Err(Self::rejected(format!("RMD {path}"), "No such directory"));
        }
        Ok(())
    }

    fn modified_time(&mut self, _object: &RemoteObject) -> Result<SystemTime> {
        Ok(remote_mtime())
    }

    fn subscribe(&mut self, listener: Arc<dyn TransferListener>) {
        self.listeners.push(listener);
    }
}

/// Remembers every event in publication order
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<MirrorEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<MirrorEvent> {
        self.events.lock().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MirrorEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<ProgressSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MirrorEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: fn(&MirrorEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| wanted(e)).count()
    }
}

impl MirrorObserver for RecordingObserver {
    fn on_event(&self, event: &MirrorEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Minimal FTP server over loopback serving a local directory.
///
/// Understands the commands the client sends; `MDTM` answers for files only,
/// so directories exercise the listing-time fallback.
pub struct FtpServer {
    pub port: u16,
    pub commands: Arc<Mutex<Vec<String>>>,
    truncated: Arc<Mutex<Option<String>>>,
}

pub const USER: &str = "mirror";
pub const PASSWORD: &str = "secret";

impl FtpServer {
    pub fn start(root: &Path) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let truncated = Arc::new(Mutex::new(None));
        let root = root.to_path_buf();
        let log = commands.clone();
        let cut = truncated.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let root = root.clone();
                let log = log.clone();
                let cut = cut.clone();
                thread::spawn(move || {
                    let _ = serve(stream, &root, &log, &cut);
                });
            }
        });
        Ok(Self {
            port,
            commands,
            truncated,
        })
    }

    /// Send only the first half of `path` on `RETR`, then abort with 426
    pub fn truncate(&self, path: &str) {
        *self.truncated.lock() = Some(path.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn verbs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| c.split_whitespace().next().unwrap_or("").to_string())
            .collect()
    }
}

fn listing_line(path: &Path) -> std::io::Result<String> {
    let meta = std::fs::metadata(path)?;
    let name = path.file_name().unwrap().to_string_lossy();
    Ok(if meta.is_dir() {
        format!("drwxr-xr-x 2 ftp ftp 4096 Jan 02 2024 {name}\r\n")
    } else {
        format!("-rw-r--r-- 1 ftp ftp {:>8} Jan 02 2024 {name}\r\n", meta.len())
    })
}

fn serve(
    stream: TcpStream,
    root: &Path,
    log: &Mutex<Vec<String>>,
    truncated: &Mutex<Option<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut out = stream;
    let mut passive: Option<TcpListener> = None;
    let mut authed = false;
    out.write_all(b"220-Test server\r\n220 ready\r\n")?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let command = line.trim_end().to_string();
        log.lock().push(command.clone());
        let (verb, arg) = match command.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (command.to_ascii_uppercase(), String::new()),
        };
        let path = root.join(arg.trim_start_matches('/'));

        let reply: String = match verb.as_str() {
            "USER" => "331 Password required".into(),
            "PASS" if arg == PASSWORD => {
                authed = true;
                "230 Logged in".into()
            }
            "PASS" => "530 Login incorrect".into(),
            "QUIT" => {
                out.write_all(b"221 Bye\r\n")?;
                return Ok(());
            }
            _ if !authed => "530 Not logged in".into(),
            "TYPE" => "200 Type set".into(),
            "PASV" => {
                let data = TcpListener::bind("127.0.0.1:0")?;
                let port = data.local_addr()?.port();
                passive = Some(data);
                format!("227 Entering Passive Mode (127,0,0,1,{},{})", port >> 8, port & 0xff)
            }
            "LIST" | "RETR" | "STOR" => {
                let Some(data) = passive.take() else {
                    out.write_all(b"425 Use PASV first\r\n")?;
                    continue;
                };
                let ok = match verb.as_str() {
                    "LIST" => path.is_dir(),
                    "RETR" => path.is_file(),
                    _ => path.parent().map(Path::is_dir).unwrap_or(false),
                };
                if !ok {
                    out.write_all(b"550 No such file or directory\r\n")?;
                    continue;
                }
                out.write_all(b"150 Opening data connection\r\n")?;
                let (mut conn, _) = data.accept()?;
                match verb.as_str() {
                    "LIST" => {
                        let mut entries: Vec<_> = std::fs::read_dir(&path)?
                            .filter_map(|e| e.ok().map(|e| e.path()))
                            .collect();
                        entries.sort();
                        conn.write_all(b"total 0\r\n")?;
                        for entry in entries {
                            conn.write_all(listing_line(&entry)?.as_bytes())?;
                        }
                    }
                    "RETR" if truncated.lock().as_deref() == Some(arg.as_str()) => {
                        let body = std::fs::read(&path)?;
                        conn.write_all(&body[..body.len() / 2])?;
                        drop(conn);
                        out.write_all(b"426 Connection closed; transfer aborted\r\n")?;
                        continue;
                    }
                    "RETR" => conn.write_all(&std::fs::read(&path)?)?,
                    _ => {
                        let mut body = Vec::new();
                        conn.read_to_end(&mut body)?;
                        std::fs::write(&path, body)?;
                    }
                }
                drop(conn);
                "226 Transfer complete".into()
            }
            "MDTM" if path.is_file() => "213 20240102030405".into(),
            "MDTM" => "550 Not a plain file".into(),
            "MKD" if path.exists() => "550 Directory exists".into(),
            "MKD" => {
                std::fs::create_dir(&path)?;
                format!("257 \"{arg}\" created")
            }
            "RMD" => match std::fs::remove_dir(&path) {
                Ok(()) => "250 Removed".into(),
                Err(_) => "550 Cannot remove".into(),
            },
            "DELE" => match std::fs::remove_file(&path) {
                Ok(()) => "250 Deleted".into(),
                Err(_) => "550 Cannot delete".into(),
            },
            _ => "502 Command not implemented".into(),
        };
        out.write_all(format!("{reply}\r\n").as_bytes())?;
    }
}
