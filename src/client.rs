//! Blocking FTP client
//!
//! One `suppaftp` control connection is opened on first use and kept for the
//! lifetime of the client. Every listing and file stream gets its own passive
//! data connection.

use crate::error::{MirrorError, Result};
use crate::listing;
use crate::local;
use crate::protocol::{self, ftp_error, timeouts};
use crate::remote::{RemoteFile, RemoteObject};
use crate::site::RemoteSite;
use chrono::{TimeZone, Utc};
use std::fs::File;
use std::io::{Read, Write};
use std::net::{IpAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

/// Byte counts for one file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes moved so far for this file
    pub current_size: u64,
    /// Listed size of the file
    pub full_size: u64,
    /// Set on the single closing event of a transfer
    pub finished: bool,
}

/// Receives per-chunk progress from a [`RemoteSite`]
pub trait TransferListener: Send + Sync {
    fn on_progress(&self, progress: &TransferProgress);
}

impl<F> TransferListener for F
where
    F: Fn(&TransferProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &TransferProgress) {
        self(progress)
    }
}

pub(crate) fn notify(listeners: &[Arc<dyn TransferListener>], progress: TransferProgress) {
    for listener in listeners {
        listener.on_progress(&progress);
    }
}

/// Where and how to log in
#[derive(Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl std::fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

impl FtpConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: protocol::DEFAULT_PORT,
            user: user.into(),
            password: password.into(),
            connect_timeout: Duration::from_millis(timeouts::CONNECT_MS),
            io_timeout: Duration::from_millis(timeouts::IO_MS),
        }
    }

    /// Build from a `host` or `host:port` site string
    pub fn from_site(site: &str, user: &str, password: &str) -> Result<Self> {
        let (host, port) = split_site(site)?;
        Ok(Self::new(host, user, password).with_port(port.unwrap_or(protocol::DEFAULT_PORT)))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }
}

/// Split `host[:port]`; a bare IPv6 literal is taken as a host
pub fn split_site(site: &str) -> Result<(String, Option<u16>)> {
    let site = site.trim();
    if site.is_empty() {
        crate::bail!(Configuration, "site must not be empty");
    }
    if site.parse::<IpAddr>().is_ok() {
        return Ok((site.to_string(), None));
    }
    if let Some(bracketed) = site.strip_prefix('[') {
        let (host, rest) = bracketed
            .split_once(']')
            .ok_or_else(|| crate::error!(Configuration, "invalid site '{}'", site))?;
        let port = match rest.strip_prefix(':') {
            Some(p) => Some(parse_port(p, site)?),
            None => None,
        };
        return Ok((host.to_string(), port));
    }
    match site.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Ok((host.to_string(), Some(parse_port(port, site)?))),
        Some(_) => crate::bail!(Configuration, "invalid site '{}'", site),
        None => Ok((site.to_string(), None)),
    }
}

fn parse_port(port: &str, site: &str) -> Result<u16> {
    port.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| crate::error!(Configuration, "invalid port in site '{}'", site))
}

pub struct FtpClient {
    config: FtpConfig,
    stream: Option<FtpStream>,
    buffer: Option<Box<[u8]>>,
    listeners: Vec<Arc<dyn TransferListener>>,
}

impl FtpClient {
    pub fn new(config: FtpConfig) -> Self {
        Self {
            config,
            stream: None,
            buffer: None,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &FtpConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn login(&self) -> Result<FtpStream> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let addr = target
            .to_socket_addrs()
            .map_err(|e| crate::error!(Connection, "resolve {}: {}", target, e))?
            .next()
            .ok_or_else(|| crate::error!(Connection, "no address for {}", target))?;

        log::debug!("connecting to {}", target);
        let connect = format!("connect {target}");
        let mut ftp = FtpStream::connect_timeout(addr, self.config.connect_timeout)
            .map_err(|e| ftp_error(&connect, e))?;
        let socket = ftp.get_ref();
        socket
            .set_read_timeout(Some(self.config.io_timeout))
            .and_then(|_| socket.set_write_timeout(Some(self.config.io_timeout)))
            .map_err(|e| crate::error!(Connection, "configure socket {}: {}", target, e))?;

        ftp.login(self.config.user.as_str(), self.config.password.as_str())
            .map_err(|e| ftp_error(&format!("login {}", self.config.user), e))?;
        ftp.transfer_type(FileType::Binary)
            .map_err(|e| ftp_error("TYPE I", e))?;
        log::debug!("logged in to {} as {}", target, self.config.user);
        Ok(ftp)
    }

    /// The control connection, logging in first if needed
    fn stream(&mut self) -> Result<&mut FtpStream> {
        if self.stream.is_none() {
            let ftp = self.login()?;
            self.stream = Some(ftp);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| crate::error!(Connection, "control connection unavailable"))
    }

    /// Drop the control connection; the next call logs in again
    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("dropping control connection to {}", self.config.host);
        }
    }

    /// Run one `suppaftp` call for `command`. A transport failure drops the
    /// connection since the reply stream can no longer be trusted.
    fn with_stream<T>(
        &mut self,
        command: &str,
        f: impl FnOnce(&mut FtpStream) -> std::result::Result<T, FtpError>,
    ) -> Result<T> {
        log::trace!(">>> {}", command);
        let result = f(self.stream()?).map_err(|e| ftp_error(command, e));
        if matches!(result, Err(MirrorError::Connection(_))) {
            self.disconnect();
        }
        result
    }

    /// Send `QUIT` and close the control connection
    pub fn quit(&mut self) -> Result<()> {
        if let Some(mut ftp) = self.stream.take() {
            ftp.quit().map_err(|e| ftp_error("QUIT", e))?;
        }
        Ok(())
    }
}

fn remote_path(name: &str, sub_dir: Option<&str>) -> String {
    listing::join_uri(sub_dir.unwrap_or(""), name)
}

/// Copy `data` into `out` chunk by chunk, reporting the running count
fn pump(
    data: &mut impl Read,
    out: &mut File,
    buffer: &mut [u8],
    listeners: &[Arc<dyn TransferListener>],
    full_size: u64,
    command: &str,
) -> Result<u64> {
    let mut received = 0u64;
    loop {
        let n = data.read(buffer).map_err(|e| {
            crate::error!(Transfer, "{} interrupted after {} bytes: {}", command, received, e)
        })?;
        if n == 0 {
            break;
        }
        out.write_all(&buffer[..n])?;
        received += n as u64;
        notify(
            listeners,
            TransferProgress {
                current_size: received,
                full_size,
                finished: false,
            },
        );
    }
    out.flush()?;
    Ok(received)
}

impl RemoteSite for FtpClient {
    fn list_objects(&mut self, sub_dir: Option<&str>) -> Result<Vec<RemoteObject>> {
        let dir = sub_dir.filter(|d| !d.is_empty());
        let command = match dir {
            Some(dir) => format!("LIST {dir}"),
            None => "LIST".to_string(),
        };
        let lines = self.with_stream(&command, |ftp| ftp.list(dir))?;
        let entries = listing::parse_listing(&lines.join("\n"), sub_dir.unwrap_or(""))?;
        log::debug!("{}: {} entries", command, entries.len());
        Ok(entries.into_iter().map(RemoteObject::from_entry).collect())
    }

    fn download(&mut self, file: &RemoteFile, local_dir: &Path) -> Result<PathBuf> {
        local::ensure_dir_exists(local_dir)?;
        let target = local_dir.join(file.name());
        // Opened before RETR so a local failure leaves no transfer pending
        let mut out = File::create(&target)?;
        let command = format!("RETR {}", file.uri());
        let mut data = self.with_stream(&command, |ftp| ftp.retr_as_stream(file.uri()))?;

        let full_size = file.size();
        let buffer = self
            .buffer
            .get_or_insert_with(|| vec![0u8; protocol::TRANSFER_CHUNK].into_boxed_slice());
        let received = match pump(&mut data, &mut out, buffer, &self.listeners, full_size, &command) {
            Ok(received) => received,
            Err(e) => {
                // The closing reply is still pending on the control connection
                drop(data);
                self.disconnect();
                return Err(e);
            }
        };
        drop(out);

        self.with_stream(&command, |ftp| ftp.finalize_retr_stream(data))
            .map_err(|e| match e {
                MirrorError::Connection(msg) => MirrorError::Transfer(msg),
                MirrorError::Rejected { command, code, message } => {
                    crate::error!(Transfer, "{} failed: {} {}", command, code, message)
                }
                other => other,
            })?;
        notify(
            &self.listeners,
            TransferProgress {
                current_size: received,
                full_size,
                finished: true,
            },
        );

        let modified = self.modified_time(&RemoteObject::File(file.clone()))?;
        local::stamp(&target, modified)?;
        log::debug!("{} -> {} ({} bytes)", file.uri(), target.display(), received);
        Ok(target)
    }

    fn upload_file(&mut self, local: &Path, sub_dir: Option<&str>) -> Result<()> {
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| crate::error!(Transfer, "cannot upload '{}'", local.display()))?;
        let remote = remote_path(name, sub_dir);
        let mut input = File::open(local)?;
        let sent = self.with_stream(&format!("STOR {remote}"), |ftp| {
            ftp.put_file(remote.as_str(), &mut input)
        })?;
        log::debug!("{} -> {} ({} bytes)", local.display(), remote, sent);
        Ok(())
    }

    fn delete_file(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()> {
        let path = remote_path(name, sub_dir);
        self.with_stream(&format!("DELE {path}"), |ftp| ftp.rm(path.as_str()))
    }

    fn make_directory(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()> {
        let path = remote_path(name, sub_dir);
        self.with_stream(&format!("MKD {path}"), |ftp| ftp.mkdir(path.as_str()))
    }

    fn remove_directory(&mut self, name: &str, sub_dir: Option<&str>) -> Result<()> {
        let path = remote_path(name, sub_dir);
        self.with_stream(&format!("RMD {path}"), |ftp| ftp.rmdir(path.as_str()))
    }

    fn modified_time(&mut self, object: &RemoteObject) -> Result<SystemTime> {
        let path = match object {
            RemoteObject::File(f) => f.uri(),
            RemoteObject::Directory(d) => d.path(),
        };
        let command = format!("MDTM {path}");
        match self.with_stream(&command, |ftp| ftp.mdtm(path)) {
            Ok(naive) => Ok(SystemTime::from(Utc.from_utc_datetime(&naive))),
            Err(MirrorError::Rejected { code, .. }) => {
                log::debug!("{} refused ({}), using listing time", command, code);
                object.listed_time()
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&mut self, listener: Arc<dyn TransferListener>) {
        self.listeners.push(listener);
    }
}

impl Drop for FtpClient {
    fn drop(&mut self) {
        let _ = self.quit();
    }
}
