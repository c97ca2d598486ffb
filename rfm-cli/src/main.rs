use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rfm_core::editor;
use rfm_core::files::FileInfo;
use rfm_core::ingest;
use rfm_core::manager::{Manager, DEFAULT_NPROC};
use rfm_core::protocol::ProtocolPath;
use rfm_core::table::Table;

#[derive(Parser)]
#[command(name = "rfm", version, about = "Manage tables of replicated files")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create an empty table
    Create {
        table: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Add a single file entry
    Add {
        table: String,
        name: String,
        path: String,
        /// Record sentinel marks instead of hashing the file
        #[arg(long, default_value_t = false)]
        bare: bool,
        /// Remote prefix (user@host or root://host) to compose the path onto
        #[arg(long)]
        remote: Option<String>,
    },
    /// Add many files in parallel, each keyed by its file stem
    #[command(alias = "add_massive")]
    AddMassive {
        table: String,
        #[arg(long, required = true, num_args = 1..)]
        files: Vec<String>,
        #[arg(long)]
        remote: Option<String>,
        #[arg(long, default_value_t = DEFAULT_NPROC)]
        nproc: usize,
    },
    /// Add every regular file under a directory
    #[command(alias = "add_from_dir")]
    AddFromDir {
        table: String,
        dir: PathBuf,
        #[arg(long)]
        remote: Option<String>,
        #[arg(long, default_value_t = DEFAULT_NPROC)]
        nproc: usize,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Remove entries by name (or by pattern with --regex)
    Remove {
        table: String,
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long, default_value_t = false)]
        regex: bool,
    },
    /// Print the table entries, sorted by name
    Display { table: String },
    /// Recompute marks for every entry reachable on this host
    Refresh { table: String },
    /// Declare another table's files on a remote host as bare entries
    Replicate {
        table: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        remote: String,
    },
    /// Reconcile a set of tables; the first wins timestamp ties
    Update {
        #[arg(required = true)]
        tables: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_NPROC)]
        nproc: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Create { table, description } => create(&table, &description),
        Cmd::Add { table, name, path, bare, remote } => {
            add(&table, &name, &path, bare, remote.as_deref())
        }
        Cmd::AddMassive { table, files, remote, nproc } => {
            add_massive(&table, &files, remote.as_deref(), nproc)
        }
        Cmd::AddFromDir { table, dir, remote, nproc, include, exclude } => {
            add_from_dir(&table, &dir, remote.as_deref(), nproc, &include, &exclude)
        }
        Cmd::Remove { table, names, regex } => remove(&table, &names, regex),
        Cmd::Display { table } => display(&table),
        Cmd::Refresh { table } => refresh(&table),
        Cmd::Replicate { table, source, remote } => replicate(&table, &source, &remote),
        Cmd::Update { tables, nproc } => update(&tables, nproc),
    }
}

fn edit<R>(location: &str, op: impl FnOnce(&mut Table) -> rfm_core::Result<R>) -> Result<R> {
    let loc = ProtocolPath::parse(location)?;
    let out = editor::with_table(&loc, |p| {
        let mut table = Table::read(p)?;
        let r = op(&mut table)?;
        table.write(p)?;
        Ok(r)
    })
    .with_context(|| format!("processing table \"{location}\""))?;
    Ok(out)
}

fn create(location: &str, description: &str) -> Result<()> {
    let loc = ProtocolPath::parse(location)?;
    editor::with_new_table(&loc, |p| Table::new(description).write(p))
        .with_context(|| format!("creating table \"{location}\""))?;
    Ok(())
}

fn add(location: &str, name: &str, path: &str, bare: bool, remote: Option<&str>) -> Result<()> {
    edit(location, |table| {
        let pp = ProtocolPath::compose(path, remote, bare)?;
        let info = if bare {
            FileInfo::bare(name, pp)?
        } else {
            FileInfo::from_name_and_path(name, pp)?
        };
        table.add(info);
        Ok(())
    })
}

fn add_massive(location: &str, files: &[String], remote: Option<&str>, nproc: usize) -> Result<()> {
    let added = edit(location, |table| ingest::add_massive(table, files, remote, nproc))?;
    println!("Added {added} file(s)");
    Ok(())
}

fn add_from_dir(
    location: &str,
    dir: &std::path::Path,
    remote: Option<&str>,
    nproc: usize,
    include: &[String],
    exclude: &[String],
) -> Result<()> {
    let files = ingest::collect_dir_files(dir, include, exclude)
        .with_context(|| format!("listing files under {}", dir.display()))?;
    let added = edit(location, |table| ingest::add_massive(table, &files, remote, nproc))?;
    println!("Added {added} file(s)");
    Ok(())
}

fn remove(location: &str, names: &[String], regex: bool) -> Result<()> {
    let removed = edit(location, |table| {
        if regex {
            let mut removed = 0;
            for pattern in names {
                let re = Regex::new(pattern)
                    .map_err(|e| rfm_core::RfmError::Format(format!("bad pattern \"{pattern}\": {e}")))?;
                removed += table.remove_matching(&re);
            }
            Ok(removed)
        } else {
            table.remove_names(names)?;
            Ok(names.len())
        }
    })?;
    println!("Removed {removed} entr{}", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

fn display(location: &str) -> Result<()> {
    let loc = ProtocolPath::parse(location)?;
    let table = editor::fetch_table(&loc, Table::read)
        .with_context(|| format!("reading table \"{location}\""))?;
    if !table.description.is_empty() {
        println!("{}", table.description);
    }
    for f in table.iter() {
        println!(
            "{:<24} {:<8} {:>18.6} {}  {}",
            f.name,
            f.protocol_path.pid(),
            f.marks.tmstp,
            f.marks.fid,
            f.protocol_path
        );
    }
    Ok(())
}

fn refresh(location: &str) -> Result<()> {
    edit(location, |table| {
        *table = table.updated()?;
        Ok(())
    })
}

fn replicate(location: &str, source: &str, remote: &str) -> Result<()> {
    let src_loc = ProtocolPath::parse(source)?;
    let src_table = editor::fetch_table(&src_loc, Table::read)
        .with_context(|| format!("reading source table \"{source}\""))?;
    let added = edit(location, |table| ingest::replicate_into(table, &src_table, remote))?;
    println!("Declared {added} entr{}", if added == 1 { "y" } else { "ies" });
    Ok(())
}

fn update(tables: &[String], nproc: usize) -> Result<()> {
    let mut mgr = Manager::with_workers(nproc);
    for t in tables {
        mgr.register(ProtocolPath::parse(t)?)?;
    }
    let report = mgr.update()?;
    if report.scheduled == 0 {
        println!("All files are up to date");
    } else {
        println!("Synchronized {}/{} file(s)", report.completed, report.scheduled);
    }
    if !report.failures.is_empty() {
        for f in &report.failures {
            eprintln!("failed: {} -> {}: {}", f.name, f.destination, f.detail);
        }
        bail!("{} transfer(s) failed", report.failures.len());
    }
    Ok(())
}
