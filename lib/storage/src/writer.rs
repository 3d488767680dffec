// Writes an RVD as one data file per partition plus a manifest
use crate::manifest::{partition_file_name, Manifest, PartitionEntry};
use anyhow::{Context, Result};
use rvd_core::{Region, Row, RowCodec, Rvd, RvdContext};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Writes every partition of `rvd` into `dir` (created if missing), then the
/// manifest. Partitions are written by parallel tasks.
///
/// A data file is a sequence of frames, each a little-endian `u32` length
/// followed by one encoded row.
pub fn write_rvd(ctx: &RvdContext, rvd: &Rvd, dir: &Path) -> rvd_core::Result<Manifest> {
    fs::create_dir_all(dir)?;
    let codec = RowCodec::new(Arc::clone(rvd.schema()));
    let entries = rvd.rows().run_partitions(ctx.runner(), |task, rows| {
        let file = partition_file_name(task.partition_index());
        write_partition(dir, file, &codec, rows, task.region()).map_err(crate::storage_error)
    })?;

    let manifest = Manifest::new((**rvd.schema()).clone(), rvd.partitioner().clone(), entries);
    manifest.write(dir).map_err(crate::storage_error)?;
    info!(
        "Wrote {} rows in {} partitions to {:?}",
        manifest.total_rows(),
        manifest.partitions.len(),
        dir
    );
    Ok(manifest)
}

fn write_partition(
    dir: &Path,
    file: String,
    codec: &RowCodec,
    rows: &[Row],
    region: &mut Region,
) -> Result<PartitionEntry> {
    let path = dir.join(&file);
    let out = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(out);
    let mut hasher = Sha256::new();

    for row in rows {
        region.reset();
        let buf = region.scratch();
        codec.encode_into(row, buf)?;
        let len = u32::try_from(buf.len()).context("Encoded row exceeds 4 GiB")?;
        let header = len.to_le_bytes();
        hasher.update(header);
        hasher.update(&buf[..]);
        writer.write_all(&header)?;
        writer.write_all(buf)?;
    }
    writer.flush()?;
    writer.get_ref().sync_data()?;

    Ok(PartitionEntry {
        file,
        rows: rows.len(),
        sha256: format!("{:x}", hasher.finalize()),
    })
}
