use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, RfmError};
use crate::files::{FileInfo, BARE_FID};
use crate::hash::FINGERPRINT_LEN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableDoc", into = "TableDoc")]
pub struct Table {
    pub description: String,
    files: BTreeMap<String, FileInfo>,
}

// On-disk shape: `description` plus an unordered sequence of entries.
#[derive(Serialize, Deserialize)]
struct TableDoc {
    description: String,
    files: Vec<FileInfo>,
}

impl Table {
    pub fn new(description: impl Into<String>) -> Self {
        Table { description: description.into(), files: BTreeMap::new() }
    }

    pub fn from_files(
        files: impl IntoIterator<Item = FileInfo>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let mut table = Table::new(description);
        for f in files {
            table.add_new(f)?;
        }
        Ok(table)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let table: Table = serde_json::from_str(&text)?;
        Ok(table)
    }

    /// Whole-file replacement: written to a sibling temporary file and
    /// renamed over `path`, so a reader sees either the old or new table.
    pub fn write(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent)?;
        let doc = TableDoc::from(self.clone());
        tmp.write_all(serde_json::to_string_pretty(&doc)?.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| RfmError::Io(e.error))?;
        Ok(())
    }

    pub fn add(&mut self, info: FileInfo) {
        self.files.insert(info.name.clone(), info);
    }

    pub fn add_new(&mut self, info: FileInfo) -> Result<()> {
        if self.files.contains_key(&info.name) {
            return Err(RfmError::DuplicateName(info.name));
        }
        self.files.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn remove_names<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        for n in names {
            if !self.files.contains_key(n.as_ref()) {
                return Err(RfmError::Format(format!("no entry named \"{}\"", n.as_ref())));
            }
        }
        for n in names {
            self.files.remove(n.as_ref());
        }
        Ok(())
    }

    pub fn remove_matching(&mut self, pattern: &Regex) -> usize {
        let doomed: Vec<String> =
            self.files.keys().filter(|n| pattern.is_match(n)).cloned().collect();
        for n in &doomed {
            self.files.remove(n);
        }
        doomed.len()
    }

    /// A new table with every locally-reachable entry's marks recomputed.
    pub fn updated(&self) -> Result<Self> {
        let refreshed: Result<Vec<FileInfo>> =
            self.files.values().collect::<Vec<_>>().par_iter().map(|f| f.refresh()).collect();
        let mut files = BTreeMap::new();
        for f in refreshed? {
            files.insert(f.name.clone(), f);
        }
        Ok(Table { description: self.description.clone(), files })
    }

    pub fn get(&self, name: &str) -> Option<&FileInfo> {
        self.files.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl TryFrom<TableDoc> for Table {
    type Error = RfmError;

    fn try_from(doc: TableDoc) -> Result<Self> {
        let mut files = BTreeMap::new();
        for f in doc.files {
            if f.name.is_empty() || f.name.chars().any(char::is_whitespace) {
                return Err(RfmError::Format(format!("malformed entry name \"{}\"", f.name)));
            }
            let fid_ok = f.marks.fid == BARE_FID
                || (f.marks.fid.len() == FINGERPRINT_LEN
                    && f.marks.fid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            if f.marks.tmstp < 0.0 || !fid_ok {
                return Err(RfmError::Format(format!(
                    "malformed marks for entry \"{}\": tmstp {}, fid \"{}\"",
                    f.name, f.marks.tmstp, f.marks.fid
                )));
            }
            if files.contains_key(&f.name) {
                return Err(RfmError::Format(format!("duplicate entry name \"{}\"", f.name)));
            }
            files.insert(f.name.clone(), f);
        }
        Ok(Table { description: doc.description, files })
    }
}

impl From<Table> for TableDoc {
    fn from(table: Table) -> Self {
        TableDoc {
            description: table.description,
            files: table.files.into_values().collect(),
        }
    }
}
