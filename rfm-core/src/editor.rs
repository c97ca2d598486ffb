use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::Result;
use crate::protocol::ProtocolPath;
use crate::transfer;

/// Run a table mutator against `location`: local tables are edited in
/// place, remote ones are fetched into a scoped temp dir and pushed back.
pub fn with_table<R>(location: &ProtocolPath, op: impl FnOnce(&Path) -> Result<R>) -> Result<R> {
    if let ProtocolPath::Local(path) = location {
        return op(path);
    }
    let tmp = TempDir::new()?;
    let work = working_path(location, &tmp);
    debug!(table = %location, "fetching remote table");
    transfer::copy(location, &ProtocolPath::Local(work.clone()))?;
    let out = op(&work)?;
    debug!(table = %location, "pushing table back");
    transfer::copy(&ProtocolPath::Local(work), location)?;
    Ok(out)
}

/// Create variant: the initial fetch is skipped.
pub fn with_new_table<R>(location: &ProtocolPath, op: impl FnOnce(&Path) -> Result<R>) -> Result<R> {
    if let ProtocolPath::Local(path) = location {
        return op(path);
    }
    let tmp = TempDir::new()?;
    let work = working_path(location, &tmp);
    let out = op(&work)?;
    debug!(table = %location, "uploading new table");
    transfer::copy(&ProtocolPath::Local(work), location)?;
    Ok(out)
}

/// Read-only variant: nothing is pushed back.
pub fn fetch_table<R>(location: &ProtocolPath, op: impl FnOnce(&Path) -> Result<R>) -> Result<R> {
    if let ProtocolPath::Local(path) = location {
        return op(path);
    }
    let tmp = TempDir::new()?;
    let work = working_path(location, &tmp);
    debug!(table = %location, "fetching remote table");
    transfer::copy(location, &ProtocolPath::Local(work.clone()))?;
    op(&work)
}

fn working_path(location: &ProtocolPath, tmp: &TempDir) -> PathBuf {
    let name = location
        .bare_path()
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "table.json".into());
    tmp.path().join(name)
}
