use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RfmError};
use crate::hash;
use crate::protocol::ProtocolPath;

/// Sentinel fingerprint of an entry that has not been materialized yet.
pub const BARE_FID: &str = "none";
pub const BARE_TMSTP: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMarks {
    pub tmstp: f64,
    pub fid: String,
}

impl FileMarks {
    pub fn bare() -> Self {
        FileMarks { tmstp: BARE_TMSTP, fid: BARE_FID.to_string() }
    }

    pub fn is_bare(&self) -> bool {
        self.fid == BARE_FID
    }

    pub fn from_local_path(path: &Path) -> Result<Self> {
        let fid = hash::hash_file(path)?;
        let modified = std::fs::metadata(path)?.modified()?;
        let tmstp = modified.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
        Ok(FileMarks { tmstp, fid })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub protocol_path: ProtocolPath,
    pub marks: FileMarks,
}

impl FileInfo {
    /// Stamps real marks when the path resolves on this host, sentinel
    /// marks otherwise; unavailability is not an error.
    pub fn from_name_and_path(name: &str, protocol_path: ProtocolPath) -> Result<Self> {
        validate_name(name)?;
        let marks = match protocol_path.available_local_path() {
            Some(local) => FileMarks::from_local_path(&local)?,
            None => FileMarks::bare(),
        };
        Ok(FileInfo { name: name.to_string(), protocol_path, marks })
    }

    pub fn bare(name: &str, protocol_path: ProtocolPath) -> Result<Self> {
        validate_name(name)?;
        Ok(FileInfo { name: name.to_string(), protocol_path, marks: FileMarks::bare() })
    }

    pub fn from_fields(name: &str, protocol_path: ProtocolPath, marks: FileMarks) -> Result<Self> {
        validate_name(name)?;
        Ok(FileInfo { name: name.to_string(), protocol_path, marks })
    }

    pub fn refresh(&self) -> Result<Self> {
        match self.protocol_path.available_local_path() {
            Some(local) => Ok(FileInfo {
                name: self.name.clone(),
                protocol_path: self.protocol_path.clone(),
                marks: FileMarks::from_local_path(&local)?,
            }),
            None => Ok(self.clone()),
        }
    }

    pub fn local_path(&self) -> &Path {
        self.protocol_path.bare_path()
    }

    pub fn is_bare(&self) -> bool {
        self.marks.is_bare()
    }

    pub fn newer_than(&self, other: &FileInfo) -> bool {
        self.marks.fid != other.marks.fid && self.marks.tmstp > other.marks.tmstp
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(RfmError::Format(format!(
            "entry name \"{name}\" must be non-empty and free of whitespace"
        )));
    }
    Ok(())
}
