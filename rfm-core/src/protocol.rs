use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RfmError};

static SSH_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9._-]+:").expect("ssh path pattern"));

static SSH_REMOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9._-]+$").expect("ssh remote pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProtocolPath", into = "RawProtocolPath")]
pub enum ProtocolPath {
    Local(PathBuf),
    Ssh { server: String, path: String },
    Xrootd { server: String, path: String },
}

// On-disk shape: the full qualified string plus its protocol id.
#[derive(Serialize, Deserialize)]
struct RawProtocolPath {
    path: String,
    pid: String,
}

impl ProtocolPath {
    pub fn parse(s: &str) -> Result<Self> {
        if SSH_PATH_RE.is_match(s) {
            let (server, path) = s.split_once(':').expect("matched ssh pattern contains a colon");
            if path.is_empty() {
                return Err(RfmError::Format(format!("ssh path \"{s}\" has no file path")));
            }
            return Ok(ProtocolPath::Ssh { server: server.to_string(), path: path.to_string() });
        }
        if let Some(rest) = s.strip_prefix("root://") {
            let sep = rest.find("//").ok_or_else(|| {
                RfmError::Format(format!("xrootd path \"{s}\" lacks the // separator after the host"))
            })?;
            let server = &rest[..sep];
            let path = &rest[sep + 1..];
            if server.is_empty() || path == "/" {
                return Err(RfmError::Format(format!("xrootd path \"{s}\" is incomplete")));
            }
            return Ok(ProtocolPath::Xrootd { server: server.to_string(), path: path.to_string() });
        }
        Ok(ProtocolPath::Local(PathBuf::from(s)))
    }

    /// Compose a bare filesystem path onto an optional remote prefix
    /// (`user@host` or `root://host`). Without a remote, and unless `bare`
    /// is set, the path must resolve locally.
    pub fn compose(path: &str, remote: Option<&str>, bare: bool) -> Result<Self> {
        let Some(remote) = remote else {
            let pp = ProtocolPath::Local(PathBuf::from(path));
            if !bare && pp.available_local_path().is_none() {
                return Err(RfmError::NonLocalPath(path.to_string()));
            }
            return Ok(pp);
        };

        let remote = remote.trim_end_matches('/');
        let abs = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };

        if let Some(server) = remote.strip_prefix("root://") {
            if server.is_empty() {
                return Err(RfmError::Format(format!("remote prefix \"{remote}\" has no host")));
            }
            Ok(ProtocolPath::Xrootd { server: server.to_string(), path: abs })
        } else if SSH_REMOTE_RE.is_match(remote) {
            Ok(ProtocolPath::Ssh { server: remote.to_string(), path: abs })
        } else {
            Err(RfmError::Format(format!(
                "remote prefix \"{remote}\" is neither user@host nor root://host"
            )))
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ProtocolPath::Local(_))
    }

    pub fn is_ssh(&self) -> bool {
        matches!(self, ProtocolPath::Ssh { .. })
    }

    pub fn is_xrootd(&self) -> bool {
        matches!(self, ProtocolPath::Xrootd { .. })
    }

    pub fn is_remote(&self) -> bool {
        !self.is_local()
    }

    pub fn pid(&self) -> &'static str {
        match self {
            ProtocolPath::Local(_) => "local",
            ProtocolPath::Ssh { .. } => "ssh",
            ProtocolPath::Xrootd { .. } => "xrootd",
        }
    }

    pub fn bare_path(&self) -> &Path {
        match self {
            ProtocolPath::Local(p) => p,
            ProtocolPath::Ssh { path, .. } => Path::new(path),
            ProtocolPath::Xrootd { path, .. } => Path::new(path),
        }
    }

    pub fn raw(&self) -> String {
        match self {
            ProtocolPath::Local(p) => p.display().to_string(),
            ProtocolPath::Ssh { server, path } => format!("{server}:{path}"),
            // The XRootD grammar requires an extra slash after the host;
            // `path` always starts with one.
            ProtocolPath::Xrootd { server, path } => format!("root://{server}/{path}"),
        }
    }

    /// A local path resolves when it exists; an SSH path when its host
    /// names this machine and the file exists; an XRootD path never.
    pub fn available_local_path(&self) -> Option<PathBuf> {
        match self {
            ProtocolPath::Local(p) => p.exists().then(|| p.clone()),
            ProtocolPath::Ssh { server, path } => {
                let (_, host) = server.split_once('@')?;
                if host_matches(host) && Path::new(path).exists() {
                    Some(PathBuf::from(path))
                } else {
                    None
                }
            }
            ProtocolPath::Xrootd { .. } => None,
        }
    }
}

impl fmt::Display for ProtocolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw())
    }
}

impl TryFrom<RawProtocolPath> for ProtocolPath {
    type Error = RfmError;

    fn try_from(raw: RawProtocolPath) -> Result<Self> {
        let pp = ProtocolPath::parse(&raw.path)?;
        if pp.pid() != raw.pid {
            return Err(RfmError::Format(format!(
                "path \"{}\" classifies as {} but is tagged {}",
                raw.path,
                pp.pid(),
                raw.pid
            )));
        }
        Ok(pp)
    }
}

impl From<ProtocolPath> for RawProtocolPath {
    fn from(pp: ProtocolPath) -> Self {
        RawProtocolPath { path: pp.raw(), pid: pp.pid().to_string() }
    }
}

// Full names first, then the short (first-label) forms.
fn host_matches(host: &str) -> bool {
    let Ok(local) = hostname::get() else { return false };
    let Some(local) = local.to_str() else { return false };
    if host == local {
        return true;
    }
    fn short(s: &str) -> &str {
        s.split('.').next().unwrap_or(s)
    }
    short(host) == short(local)
}
