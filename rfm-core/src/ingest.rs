use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::info;
use walkdir::WalkDir;

use crate::error::{Result, RfmError};
use crate::files::FileInfo;
use crate::pool::JobHandler;
use crate::protocol::ProtocolPath;
use crate::table::Table;

/// Add many files to a table, constructing the entries in parallel; each
/// entry is keyed by the file's stem.
pub fn add_massive(
    table: &mut Table,
    files: &[String],
    remote: Option<&str>,
    nproc: usize,
) -> Result<usize> {
    info!(files = files.len(), nproc, "ingesting files");
    let handler = JobHandler::new(nproc);
    for f in files {
        let name = stem_of(f)?;
        let pp = ProtocolPath::compose(f, remote, false)?;
        handler.submit(move || FileInfo::from_name_and_path(&name, pp));
    }
    let infos = handler.process()?;
    let count = infos.len();
    for info in infos {
        table.add_new(info)?;
    }
    Ok(count)
}

// Globs match the path relative to `dir`; an empty include list admits
// everything.
pub fn collect_dir_files(dir: &Path, includes: &[String], excludes: &[String]) -> Result<Vec<String>> {
    let (inc, exc) = build_globsets(includes, excludes)?;
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| RfmError::Format(format!("walking {}: {e}", dir.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let rel = rel.to_string_lossy().replace('\\', "/");
        if !inc.is_match(&rel) || exc.is_match(&rel) {
            continue;
        }
        out.push(entry.path().to_string_lossy().to_string());
    }
    out.sort();
    Ok(out)
}

/// Add a bare entry to `table` for every entry of `source`, composing each
/// path onto `remote`. Names already present are skipped so real marks are
/// never clobbered by a bare declaration.
pub fn replicate_into(table: &mut Table, source: &Table, remote: &str) -> Result<usize> {
    let mut added = 0;
    for entry in source.iter() {
        if table.contains(&entry.name) {
            continue;
        }
        let path = entry.local_path().to_str().ok_or_else(|| {
            RfmError::Format(format!("entry \"{}\" has a non-UTF-8 path", entry.name))
        })?;
        let pp = ProtocolPath::compose(path, Some(remote), true)?;
        table.add_new(FileInfo::bare(&entry.name, pp)?)?;
        added += 1;
    }
    Ok(added)
}

fn stem_of(path: &str) -> Result<String> {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| RfmError::Format(format!("cannot derive an entry name from \"{path}\"")))
}

fn build_globsets(includes: &[String], excludes: &[String]) -> Result<(GlobSet, GlobSet)> {
    let mut incb = GlobSetBuilder::new();
    let mut excb = GlobSetBuilder::new();
    if includes.is_empty() {
        incb.add(glob("**/*")?);
    }
    for g in includes {
        incb.add(glob(g)?);
    }
    for g in excludes {
        excb.add(glob(g)?);
    }
    let inc = incb.build().map_err(|e| RfmError::Format(e.to_string()))?;
    let exc = excb.build().map_err(|e| RfmError::Format(e.to_string()))?;
    Ok((inc, exc))
}

fn glob(pattern: &str) -> Result<Glob> {
    Glob::new(pattern).map_err(|e| RfmError::Format(format!("bad glob \"{pattern}\": {e}")))
}
