//! Disk-backed subgoal storage.
//!
//! Each subgoal appends its answers and proofs as JSON lines to its own file
//! inside a scratch directory. In memory each table only keeps an index from
//! record digests to file offsets; a digest hit is confirmed against the
//! record on disk before a fact or proof counts as known. The scratch
//! directory is removed when the store is closed or dropped.

use crate::error::Result;
use crate::proof::Proof;
use crate::subgoal::{Signature, Subgoal, SubgoalStore};
use crate::term::Literal;
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One line of a subgoal file
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    fact: Literal,
    proof: Option<Proof>,
}

impl Record {
    fn digest(&self) -> u64 {
        match &self.proof {
            Some(proof) => digest(proof),
            None => digest(&self.fact),
        }
    }
}

/// Digest to byte offsets of the records sharing it
type Index = HashMap<u64, Vec<u64>>;

#[derive(Debug)]
struct SpilledTable {
    path: PathBuf,
    /// Bytes written so far
    len: u64,
    facts: Index,
    proofs: Index,
}

impl SpilledTable {
    fn read_at(&self, offset: u64) -> Result<Record> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(offset))?;
        let mut line = String::new();
        reader.read_line(&mut line)?;
        Ok(serde_json::from_str(&line)?)
    }

    fn holds(&self, record: &Record) -> Result<bool> {
        let index = if record.proof.is_some() {
            &self.proofs
        } else {
            &self.facts
        };
        for &offset in index.get(&record.digest()).into_iter().flatten() {
            let stored = self.read_at(offset)?;
            if stored.fact == record.fact && stored.proof == record.proof {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn count(index: &Index) -> usize {
        index.values().map(Vec::len).sum()
    }
}

fn digest(value: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Subgoal store keeping answers in a temporary directory
#[derive(Debug)]
pub struct DiskStore {
    dir: Option<TempDir>,
    tables: IndexMap<Signature, SpilledTable>,
}

impl DiskStore {
    /// Store spilling to a fresh directory under the system temporary
    /// directory
    ///
    /// # Errors
    ///
    /// The scratch directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("probalog-subgoals-")
            .tempdir()?;
        Ok(Self::with_dir(dir))
    }

    /// Store spilling to a fresh directory inside `parent`
    ///
    /// # Errors
    ///
    /// The scratch directory cannot be created.
    pub fn in_dir(parent: impl AsRef<Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("probalog-subgoals-")
            .tempdir_in(parent)?;
        Ok(Self::with_dir(dir))
    }

    fn with_dir(dir: TempDir) -> Self {
        debug!("spilling subgoals to {}", dir.path().display());
        Self {
            dir: Some(dir),
            tables: IndexMap::new(),
        }
    }

    /// The scratch directory, until the store is closed
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    fn table(&mut self, signature: &Signature) -> Result<&mut SpilledTable> {
        if !self.tables.contains_key(signature) {
            let Some(dir) = &self.dir else {
                return Err(closed());
            };
            let path = dir.path().join(format!("subgoal-{}.jsonl", self.tables.len()));
            File::create(&path)?;
            trace!("subgoal {signature} -> {}", path.display());
            self.tables.insert(
                signature.clone(),
                SpilledTable {
                    path,
                    len: 0,
                    facts: Index::new(),
                    proofs: Index::new(),
                },
            );
        }
        self.tables.get_mut(signature).ok_or_else(closed)
    }

    fn records(&self, signature: &Signature) -> Result<Vec<Record>> {
        let Some(table) = self.tables.get(signature) else {
            return Ok(Vec::new());
        };
        let reader = BufReader::new(File::open(&table.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }
}

fn closed() -> crate::error::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, "subgoal store is closed").into()
}

impl SubgoalStore for DiskStore {
    fn get(&mut self, signature: &Signature) -> Result<Subgoal> {
        let table = self.table(signature)?;
        let answers = SpilledTable::count(&table.facts);
        let proofs = SpilledTable::count(&table.proofs);
        let id = self.tables.get_index_of(signature).unwrap_or_default();
        Ok(Subgoal {
            signature: signature.clone(),
            id,
            answers,
            proofs,
        })
    }

    fn contains(&self, signature: &Signature) -> bool {
        self.tables.contains_key(signature)
    }

    fn put(&mut self, signature: &Signature, fact: &Literal, proofs: &[Proof]) -> Result<bool> {
        let table = self.table(signature)?;
        let candidates = std::iter::once(None)
            .chain(proofs.iter().map(Some))
            .map(|proof| Record {
                fact: fact.clone(),
                proof: proof.cloned(),
            });
        let mut pending: Vec<Record> = Vec::new();
        for record in candidates {
            let duplicate = pending
                .iter()
                .any(|p| p.proof == record.proof && p.fact == record.fact);
            if !duplicate && !table.holds(&record)? {
                pending.push(record);
            }
        }
        if pending.is_empty() {
            return Ok(false);
        }

        let file = OpenOptions::new().append(true).open(&table.path)?;
        let mut writer = BufWriter::new(file);
        let mut offsets = Vec::with_capacity(pending.len());
        let mut end = table.len;
        for record in &pending {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            writer.write_all(&line)?;
            offsets.push(end);
            end += line.len() as u64;
        }
        writer.flush()?;

        for (record, offset) in pending.iter().zip(offsets) {
            let index = if record.proof.is_some() {
                &mut table.proofs
            } else {
                &mut table.facts
            };
            index.entry(record.digest()).or_default().push(offset);
        }
        table.len = end;
        Ok(true)
    }

    fn iterate(&self, signature: &Signature) -> Result<Vec<Literal>> {
        let facts: IndexSet<Literal> = self
            .records(signature)?
            .into_iter()
            .map(|record| record.fact)
            .collect();
        Ok(facts.into_iter().collect())
    }

    fn proofs(&self, signature: &Signature, fact: &Literal) -> Result<Vec<Proof>> {
        Ok(self
            .records(signature)?
            .into_iter()
            .filter(|record| &record.fact == fact)
            .filter_map(|record| record.proof)
            .collect())
    }

    fn recorded(&self, signature: &Signature) -> Result<Vec<Proof>> {
        Ok(self
            .records(signature)?
            .into_iter()
            .filter_map(|record| record.proof)
            .collect())
    }

    fn signatures(&self) -> Vec<Signature> {
        self.tables.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.tables.len()
    }

    fn close(&mut self) -> Result<()> {
        self.tables.clear();
        if let Some(dir) = self.dir.take() {
            debug!("removing {}", dir.path().display());
            dir.close()?;
        }
        Ok(())
    }
}
