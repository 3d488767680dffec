// Manifest describing a persisted partition set
use anyhow::{anyhow, Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use rvd_core::{RangePartitioner, RowSchema};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

/// Data file name for partition `index`.
pub fn partition_file_name(index: usize) -> String {
    format!("part-{:05}", index)
}

/// One data file of the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub file: String,
    pub rows: usize,
    /// Hex SHA-256 of the whole data file.
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub schema: RowSchema,
    /// Key field names, in key order.
    pub key: Vec<String>,
    pub partitioner: RangePartitioner,
    /// Data files in partition index order.
    pub partitions: Vec<PartitionEntry>,
}

impl Manifest {
    pub fn new(schema: RowSchema, partitioner: RangePartitioner, partitions: Vec<PartitionEntry>) -> Self {
        let key = schema.key_names().into_iter().map(String::from).collect();
        Self {
            format_version: FORMAT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            schema,
            key,
            partitioner,
            partitions,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.partitions.iter().map(|p| p.rows).sum()
    }

    /// Writes `manifest.json` into `dir`, replacing any previous one atomically.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        AtomicFile::new(dir.join(MANIFEST_FILE), OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(&json))
            .map_err(|e| anyhow!("Failed to write manifest in {:?}: {}", dir, e))?;
        Ok(())
    }

    /// Reads and checks the manifest in `dir`.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let data = fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let manifest: Manifest = serde_json::from_slice(&data)
            .with_context(|| format!("Malformed manifest {:?}", path))?;
        manifest.check()?;
        Ok(manifest)
    }

    fn check(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(anyhow!(
                "Unsupported format version {} (expected {})",
                self.format_version,
                FORMAT_VERSION
            ));
        }
        let names = self.schema.key_names();
        if names.len() != self.key.len() || names.iter().zip(&self.key).any(|(a, b)| *a != b.as_str()) {
            return Err(anyhow!(
                "Key fields {:?} do not match schema {}",
                self.key,
                self.schema
            ));
        }
        if self.partitions.len() != self.partitioner.num_partitions() {
            return Err(anyhow!(
                "{} data files for {} partition bounds",
                self.partitions.len(),
                self.partitioner.num_partitions()
            ));
        }
        for (i, entry) in self.partitions.iter().enumerate() {
            if entry.file != partition_file_name(i) {
                return Err(anyhow!("Partition {} stored as unexpected file '{}'", i, entry.file));
            }
        }
        Ok(())
    }
}
