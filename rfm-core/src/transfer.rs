use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

use crate::error::{Result, RfmError};
use crate::protocol::ProtocolPath;

/// Copy `src` to `dst`, choosing the transfer tool from the protocol pair.
/// Parent directories of the destination are created first.
pub fn copy(src: &ProtocolPath, dst: &ProtocolPath) -> Result<()> {
    make_parent_dirs(dst)?;
    dispatch(src, dst)
}

fn dispatch(src: &ProtocolPath, dst: &ProtocolPath) -> Result<()> {
    info!(source = %src, target = %dst, "copying file");
    let ssh = src.is_ssh() || dst.is_ssh();
    let xrd = src.is_xrootd() || dst.is_xrootd();
    match (ssh, xrd) {
        (true, true) => staged_copy(src, dst),
        (true, false) => run_copy_tool("scp", &["-q"], src, dst),
        (false, true) => run_copy_tool("xrdcp", &["-f", "-s"], src, dst),
        (false, false) => local_copy(src.bare_path(), dst.bare_path()),
    }
}

// SSH and XRootD endpoints cannot talk to each other directly; stage the
// file locally, then push it out.
fn staged_copy(src: &ProtocolPath, dst: &ProtocolPath) -> Result<()> {
    let tmp = TempDir::new()?;
    let name = src.bare_path().file_name().map(|s| s.to_os_string()).unwrap_or_else(|| "staged".into());
    let stage = ProtocolPath::Local(tmp.path().join(name));
    dispatch(src, &stage)?;
    dispatch(&stage, dst)
}

fn run_copy_tool(tool: &str, flags: &[&str], src: &ProtocolPath, dst: &ProtocolPath) -> Result<()> {
    let out = Command::new(tool)
        .args(flags)
        .arg(src.raw())
        .arg(dst.raw())
        .output()
        .map_err(|e| transfer_error(src, dst, format!("failed to run {tool}: {e}")))?;
    check_status(tool, &out).map_err(|detail| transfer_error(src, dst, detail))
}

// Written to a sibling temp file and renamed into place, so the destination
// is either fully replaced or left as it was.
fn local_copy(src: &Path, dst: &Path) -> Result<()> {
    let parent = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut from = File::open(src)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    io::copy(&mut from, tmp.as_file_mut())?;
    tmp.persist(dst).map_err(|e| RfmError::Io(e.error))?;
    Ok(())
}

pub fn make_parent_dirs(target: &ProtocolPath) -> Result<()> {
    match target {
        ProtocolPath::Local(p) => {
            if let Some(parent) = p.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Ok(())
        }
        ProtocolPath::Ssh { server, path } => {
            let Some(dir) = parent_str(path) else { return Ok(()) };
            debug!(%server, dir, "creating remote directories");
            let out = Command::new("ssh")
                .args([server.as_str(), "mkdir", "-p", dir])
                .output()
                .map_err(|e| transfer_error(target, target, format!("failed to run ssh: {e}")))?;
            check_status("ssh", &out).map_err(|detail| transfer_error(target, target, detail))
        }
        ProtocolPath::Xrootd { server, path } => {
            let Some(dir) = parent_str(path) else { return Ok(()) };
            debug!(%server, dir, "creating remote directories");
            let out = Command::new("xrd")
                .args([server.as_str(), "mkdir", dir])
                .output()
                .map_err(|e| transfer_error(target, target, format!("failed to run xrd: {e}")))?;
            check_status("xrd", &out).map_err(|detail| transfer_error(target, target, detail))
        }
    }
}

fn parent_str(path: &str) -> Option<&str> {
    let dir = Path::new(path).parent()?.to_str()?;
    if dir.is_empty() || dir == "/" {
        None
    } else {
        Some(dir)
    }
}

fn check_status(tool: &str, out: &Output) -> std::result::Result<(), String> {
    if out.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(format!("{tool} exited with {}", out.status))
    } else {
        Err(format!("{tool}: {stderr}"))
    }
}

fn transfer_error(src: &ProtocolPath, dst: &ProtocolPath, detail: String) -> RfmError {
    RfmError::Transfer { from: src.raw(), to: dst.raw(), detail }
}
