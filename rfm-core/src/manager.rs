use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{Result, RfmError};
use crate::files::FileInfo;
use crate::pool::JobHandler;
use crate::protocol::ProtocolPath;
use crate::table::Table;
use crate::transfer;

pub const DEFAULT_NPROC: usize = 4;

/// Reconciles a set of registered tables: for every logical name the newest
/// replica with a real fingerprint wins, and all disagreeing replicas are
/// brought into line with it.
pub struct Manager {
    tables: Vec<ProtocolPath>,
    nproc: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub scheduled: usize,
    pub completed: usize,
    pub failures: Vec<CopyFailure>,
    pub gaps: Vec<Gap>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyFailure {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub detail: String,
}

// A name some table does not declare; that host receives no copy.
#[derive(Debug, Clone, Serialize)]
pub struct Gap {
    pub name: String,
    pub table: String,
}

struct Replica {
    location: ProtocolPath,
    work: PathBuf,
    remote: bool,
    table: Table,
    dirty: bool,
}

struct CopyOutcome {
    table_idx: usize,
    name: String,
    source: String,
    destination: String,
    updated: Option<FileInfo>,
    error: Option<String>,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_NPROC)
    }

    pub fn with_workers(nproc: usize) -> Self {
        Manager { tables: Vec::new(), nproc: nproc.max(1) }
    }

    pub fn register(&mut self, location: ProtocolPath) -> Result<()> {
        if self.tables.iter().any(|t| t.raw() == location.raw()) {
            return Err(RfmError::Format(format!("table \"{location}\" is already registered")));
        }
        self.tables.push(location);
        Ok(())
    }

    pub fn tables(&self) -> &[ProtocolPath] {
        &self.tables
    }

    pub fn available_table(&self) -> Result<Table> {
        for loc in &self.tables {
            if let Some(p) = loc.available_local_path() {
                debug!(table = %loc, "using local table");
                return Table::read(&p);
            }
        }
        Err(RfmError::NoLocalReplica)
    }

    /// Reconcile all registered tables. Copy failures accumulate in the
    /// report; the call errors only when copies were scheduled and none
    /// succeeded.
    pub fn update(&self) -> Result<UpdateReport> {
        let tmp = TempDir::new()?;

        // 1) Gather every table into the working area (registration order).
        info!("fetching registered tables into a working area");
        let mut replicas: Vec<Replica> = Vec::with_capacity(self.tables.len());
        for (i, loc) in self.tables.iter().enumerate() {
            let (work, remote) = match loc.available_local_path() {
                Some(p) => (p, false),
                None => {
                    let work = tmp.path().join(format!("table_{i}.json"));
                    transfer::copy(loc, &ProtocolPath::Local(work.clone()))?;
                    (work, true)
                }
            };
            let table = Table::read(&work)?;
            replicas.push(Replica { location: loc.clone(), work, remote, table, dirty: false });
        }

        // 2) Union of entry names across all tables.
        let mut names: BTreeSet<String> = BTreeSet::new();
        for r in &replicas {
            names.extend(r.table.names().map(str::to_string));
        }

        // 3) Per-name reconciliation.
        info!("determining authoritative replicas");
        let mut gaps: Vec<Gap> = Vec::new();
        let mut jobs: Vec<(usize, FileInfo, FileInfo)> = Vec::new();
        for name in &names {
            let holders: Vec<usize> =
                (0..replicas.len()).filter(|&i| replicas[i].table.contains(name)).collect();
            if holders.len() < replicas.len() {
                for (i, r) in replicas.iter().enumerate() {
                    if !holders.contains(&i) {
                        debug!(%name, table = %r.location, "table does not declare this file");
                        gaps.push(Gap { name: name.clone(), table: r.location.raw() });
                    }
                }
            }
            if holders.len() < 2 {
                continue;
            }

            // Refresh the replicas this host can reach as a source; the
            // rest are observed through their persisted marks.
            for &i in &holders {
                let Some(entry) = replicas[i].table.get(name) else { continue };
                let refreshed = entry.refresh()?;
                if refreshed.marks != entry.marks {
                    replicas[i].table.add(refreshed);
                    replicas[i].dirty = true;
                }
            }

            let mut entries: Vec<(usize, FileInfo)> = Vec::new();
            for &i in &holders {
                if let Some(e) = replicas[i].table.get(name) {
                    entries.push((i, e.clone()));
                }
            }

            // All replicas advertising one fingerprint are in sync; this
            // also skips names where every replica is bare.
            let fids: BTreeSet<&str> =
                entries.iter().map(|(_, e)| e.marks.fid.as_str()).collect();
            if fids.len() == 1 {
                continue;
            }

            // Authoritative replica: largest timestamp among those with a
            // real fingerprint; strict comparison keeps the first
            // registered on ties.
            let mut auth: Option<&FileInfo> = None;
            for (_, e) in &entries {
                if e.marks.is_bare() {
                    continue;
                }
                match auth {
                    Some(a) if e.marks.tmstp > a.marks.tmstp => auth = Some(e),
                    None => auth = Some(e),
                    _ => {}
                }
            }
            let Some(auth) = auth else { continue };
            let auth = auth.clone();

            for (i, entry) in &entries {
                if entry.marks.fid != auth.marks.fid {
                    jobs.push((*i, auth.clone(), entry.clone()));
                }
            }
        }

        // 4) Run the scheduled copies in parallel.
        let scheduled = jobs.len();
        let mut failures: Vec<CopyFailure> = Vec::new();
        let mut completed = 0usize;
        if scheduled == 0 {
            info!("all files are up to date");
        } else {
            info!(scheduled, nproc = self.nproc, "starting to synchronize files");
            let handler = JobHandler::new(self.nproc);
            for (idx, auth, dst) in jobs {
                handler.submit(move || Ok(run_copy(idx, auth, dst)));
            }
            for o in handler.process()? {
                match o.updated {
                    Some(info) => {
                        replicas[o.table_idx].table.add(info);
                        replicas[o.table_idx].dirty = true;
                        completed += 1;
                    }
                    None => failures.push(CopyFailure {
                        name: o.name,
                        source: o.source,
                        destination: o.destination,
                        detail: o.error.unwrap_or_default(),
                    }),
                }
            }
            if completed == 0 {
                return Err(RfmError::Worker(
                    failures
                        .into_iter()
                        .map(|f| RfmError::Transfer {
                            from: f.source,
                            to: f.destination,
                            detail: f.detail,
                        })
                        .collect(),
                ));
            }
        }

        // 5) Write back every table whose in-memory state changed.
        for r in &replicas {
            if !r.dirty {
                continue;
            }
            r.table.write(&r.work)?;
            if r.remote {
                transfer::copy(&ProtocolPath::Local(r.work.clone()), &r.location)?;
            }
        }

        // 6) The working area is released when `tmp` drops.
        Ok(UpdateReport { scheduled, completed, failures, gaps })
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

// Copy the authoritative replica over the destination, stamp the entry with
// the authoritative marks, then recompute them from the local file when the
// destination is reachable from this host.
fn run_copy(table_idx: usize, auth: FileInfo, dst: FileInfo) -> CopyOutcome {
    let name = dst.name.clone();
    let source = auth.protocol_path.raw();
    let destination = dst.protocol_path.raw();
    let result = transfer::copy(&auth.protocol_path, &dst.protocol_path).and_then(|()| {
        FileInfo::from_fields(&dst.name, dst.protocol_path.clone(), auth.marks.clone())?.refresh()
    });
    match result {
        Ok(updated) => CopyOutcome {
            table_idx,
            name,
            source,
            destination,
            updated: Some(updated),
            error: None,
        },
        Err(e) => CopyOutcome {
            table_idx,
            name,
            source,
            destination,
            updated: None,
            error: Some(e.to_string()),
        },
    }
}
