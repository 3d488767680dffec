// Reads persisted partition sets back, opening data files on demand
use crate::manifest::Manifest;
use anyhow::{anyhow, Context, Result};
use rvd_core::{RangePartitioner, Row, RowCodec, RowCollection, RowSchema, Rvd, RvdContext};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub struct PartitionSetReader {
    dir: PathBuf,
    manifest: Manifest,
    schema: Arc<RowSchema>,
    partitioner: RangePartitioner,
    codec: RowCodec,
}

impl PartitionSetReader {
    /// Reads the manifest of the set in `dir`. No data file is opened.
    pub fn open<P: AsRef<Path>>(dir: P) -> rvd_core::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let manifest = Manifest::read(&dir).map_err(crate::storage_error)?;
        // Rebuilt through the checked constructor.
        let partitioner = RangePartitioner::with_overlap(
            manifest.partitioner.key_type().clone(),
            manifest.partitioner.range_bounds().to_vec(),
            manifest.partitioner.allowed_overlap(),
        )?;
        let schema = Arc::new(manifest.schema.clone());
        partitioner.check_compatible(&schema.key_type())?;
        let codec = RowCodec::new(Arc::clone(&schema));
        Ok(Self {
            dir,
            manifest,
            schema,
            partitioner,
            codec,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn partitioner(&self) -> &RangePartitioner {
        &self.partitioner
    }

    pub fn num_partitions(&self) -> usize {
        self.manifest.partitions.len()
    }

    fn path(&self, index: usize) -> PathBuf {
        self.dir.join(&self.manifest.partitions[index].file)
    }

    /// Decodes partition `index` row by row without loading the whole file.
    /// The checksum is not verified on this path.
    pub fn partition(&self, index: usize) -> rvd_core::Result<PartitionIter> {
        if index >= self.num_partitions() {
            return Err(rvd_core::Error::InvalidArgument(format!(
                "partition {} of {}",
                index,
                self.num_partitions()
            )));
        }
        let path = self.path(index);
        let file = File::open(&path)
            .with_context(|| format!("Failed to open {:?}", path))
            .map_err(crate::storage_error)?;
        Ok(PartitionIter {
            reader: BufReader::new(file),
            codec: self.codec.clone(),
            remaining: self.manifest.partitions[index].rows,
            buf: Vec::new(),
        })
    }

    /// Reads partition `index` fully, checking its checksum and row count.
    pub fn read_partition(&self, index: usize) -> rvd_core::Result<Vec<Row>> {
        self.load(index).map_err(crate::storage_error)
    }

    fn load(&self, index: usize) -> Result<Vec<Row>> {
        let entry = &self.manifest.partitions[index];
        let path = self.path(index);
        let data = fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let actual = format!("{:x}", Sha256::digest(&data));
        if actual != entry.sha256 {
            return Err(anyhow!(
                "Checksum mismatch in {:?}: expected {}, got {}",
                path,
                entry.sha256,
                actual
            ));
        }

        let mut rows = Vec::with_capacity(entry.rows);
        let mut pos = 0;
        while pos < data.len() {
            let header: [u8; 4] = data
                .get(pos..pos + 4)
                .and_then(|h| h.try_into().ok())
                .ok_or_else(|| anyhow!("Truncated frame header in {:?}", path))?;
            let len = u32::from_le_bytes(header) as usize;
            let body = data
                .get(pos + 4..pos + 4 + len)
                .ok_or_else(|| anyhow!("Truncated row in {:?}", path))?;
            rows.push(self.codec.decode(body)?);
            pos += 4 + len;
        }
        if rows.len() != entry.rows {
            return Err(anyhow!(
                "{:?} holds {} rows, manifest records {}",
                path,
                rows.len(),
                entry.rows
            ));
        }
        Ok(rows)
    }

    /// Verifies every data file against its recorded checksum.
    pub fn verify_checksums(&self, ctx: &RvdContext) -> rvd_core::Result<()> {
        let indices: Vec<usize> = (0..self.num_partitions()).collect();
        ctx.runner().run(indices, |_, i| {
            let path = self.path(i);
            let data = fs::read(&path)?;
            let actual = format!("{:x}", Sha256::digest(&data));
            if actual != self.manifest.partitions[i].sha256 {
                return Err(rvd_core::Error::Storage(format!(
                    "Checksum mismatch in {:?}",
                    path
                )));
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Loads every partition in parallel and assembles the RVD. Checksums
    /// and row counts are always checked; row order and bounds when
    /// validation is on.
    pub fn read_rvd(&self, ctx: &RvdContext) -> rvd_core::Result<Rvd> {
        let indices: Vec<usize> = (0..self.num_partitions()).collect();
        let partitions = ctx.runner().run(indices, |_, i| self.read_partition(i))?;
        info!(
            "Read {} rows in {} partitions from {:?}",
            self.manifest.total_rows(),
            partitions.len(),
            self.dir
        );
        Rvd::new(
            ctx,
            Arc::clone(&self.schema),
            self.partitioner.clone(),
            RowCollection::new(partitions),
        )
    }
}

/// Lazily decoded rows of one partition file.
pub struct PartitionIter {
    reader: BufReader<File>,
    codec: RowCodec,
    remaining: usize,
    buf: Vec<u8>,
}

impl PartitionIter {
    fn read_row(&mut self) -> Result<Row> {
        let mut header = [0u8; 4];
        self.reader.read_exact(&mut header).context("Truncated frame header")?;
        let len = u32::from_le_bytes(header) as usize;
        self.buf.resize(len, 0);
        self.reader.read_exact(&mut self.buf).context("Truncated row")?;
        Ok(self.codec.decode(&self.buf)?)
    }
}

impl Iterator for PartitionIter {
    type Item = rvd_core::Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.read_row().map_err(crate::storage_error))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
