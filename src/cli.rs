//! Startup arguments
//!
//! Flags are written `/name=value` with a case-insensitive name. They are
//! rewritten to `--name=value` and handed to clap, so the GNU form works too.

use crate::client::{split_site, FtpConfig};
use crate::config::FileConfig;
use crate::engine::SessionOptions;
use crate::error::{MirrorError, Result};
use crate::protocol;
use crate::signal::Pacing;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

const USAGE: &str = "ftpmirror /site=<host[:port]> /user=<name> /pwd=<password> /dir=<path> \
[/autoclose=true|false] [/subdir=<remote dir>] [/config=<file>] [/log=<file>]";

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ftpmirror",
    version,
    about = "Mirror a directory tree from an FTP server into a local directory",
    override_usage = USAGE
)]
pub struct Args {
    /// FTP host, optionally host:port
    #[arg(long)]
    pub site: String,

    /// Login user
    #[arg(long)]
    pub user: String,

    /// Login password
    #[arg(long)]
    pub pwd: String,

    /// Local directory to mirror into
    #[arg(long, value_parser = parse_dir)]
    pub dir: PathBuf,

    /// Close automatically once the mirror completes
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_parser = parse_bool)]
    pub autoclose: bool,

    /// Remote directory to mirror instead of the login directory
    #[arg(long)]
    pub subdir: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append a session log to this file
    #[arg(long)]
    pub log: Option<PathBuf>,
}

fn parse_dir(value: &str) -> std::result::Result<PathBuf, String> {
    let trimmed = value.trim().trim_matches('"').trim_matches('\'');
    if trimmed.is_empty() {
        return Err("directory must not be empty".to_string());
    }
    Ok(PathBuf::from(trimmed))
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected true or false, got '{other}'")),
    }
}

/// Rewrite `/name=value` tokens into `--name=value`; `/?` asks for help
pub fn normalize_args<I, T>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut iter = args.into_iter().map(Into::into);
    let mut out: Vec<String> = iter.next().into_iter().collect();
    for arg in iter {
        out.push(normalize_one(&arg));
    }
    out
}

fn normalize_one(arg: &str) -> String {
    if arg == "/?" || arg == "-?" {
        return "--help".to_string();
    }
    let body = if let Some(rest) = arg.strip_prefix("--") {
        rest
    } else if let Some(rest) = arg.strip_prefix('/') {
        rest
    } else {
        return arg.to_string();
    };
    match body.split_once('=') {
        Some((name, value)) => format!("--{}={}", name.to_ascii_lowercase(), value),
        None => format!("--{}", body.to_ascii_lowercase()),
    }
}

/// What the command line asks for
#[derive(Debug)]
pub enum Invocation {
    /// Print this text and exit without connecting
    Help(String),
    Mirror(Args),
}

/// Parse raw process arguments, program name first
pub fn parse_from<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    match Args::try_parse_from(normalize_args(args)) {
        Ok(args) => Ok(Invocation::Mirror(args)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            Ok(Invocation::Help(e.render().to_string()))
        }
        Err(e) => Err(MirrorError::Configuration(
            e.render().to_string().trim_end().to_string(),
        )),
    }
}

/// Everything a run needs, after merging the configuration file
#[derive(Debug, Clone)]
pub struct Settings {
    pub ftp: FtpConfig,
    pub session: SessionOptions,
    pub pacing: Pacing,
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn resolve(self) -> Result<Settings> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        self.resolve_with(file)
    }

    pub fn resolve_with(self, file: FileConfig) -> Result<Settings> {
        let (host, port) = split_site(&self.site)?;
        if self.user.trim().is_empty() {
            crate::bail!(Configuration, "user must not be empty");
        }
        let port = port.or(file.ftp.port).unwrap_or(protocol::DEFAULT_PORT);
        let ftp = FtpConfig::new(host.clone(), self.user, self.pwd)
            .with_port(port)
            .with_timeouts(
                Duration::from_millis(file.ftp.connect_timeout_ms),
                Duration::from_millis(file.ftp.io_timeout_ms),
            );
        let sub_dir = self
            .subdir
            .map(|d| d.trim().trim_end_matches('/').to_string())
            .filter(|d| !d.is_empty());

        Ok(Settings {
            ftp,
            session: SessionOptions {
                host,
                local_root: self.dir,
                sub_dir,
                auto_close: self.autoclose,
            },
            pacing: file.pacing(),
            log_file: self.log.or(file.log_file),
        })
    }
}
