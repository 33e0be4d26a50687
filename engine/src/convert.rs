//! Table maintenance: sorting and layout conversion.
//!
//! Conversion never touches chains, only their packaging. Compressing
//! restores chain order first so that row positions equal chain indices
//! once the startpoints are dropped; decompressing re-adds row prefixes
//! and endpoint-sorts the copy for binary-search lookups.

use std::cmp::Ordering;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use rayon::prelude::*;

use crate::error::{EngineError, EngineResult};
use crate::header::{TableHeader, TableType, HEADER_SIZE, ROW_INDEX_SIZE};
use crate::mapping::TableMap;
use crate::Engine;

impl Engine {
    /// Sorts the rows by their endpoint bytes, enabling indexed lookups.
    /// Compressed tables have no meaningful sort order and are rejected.
    pub fn sort_table(&mut self) -> EngineResult<()> {
        self.unmap();
        let mut map = TableMap::open_mut(&self.path)?;
        if map.header().table_type == TableType::Compressed {
            return Err(EngineError::Unsupported(
                "compressed tables cannot be sorted",
            ));
        }

        let width = map.chain_width();
        sort_rows_by(map.rows_mut(), width, |a, b| {
            a[ROW_INDEX_SIZE..].cmp(&b[ROW_INDEX_SIZE..])
        });
        map.flush()?;
        Ok(())
    }

    /// Sorts the rows by their startpoint index, restoring chain order.
    pub fn sort_startpoints(&mut self) -> EngineResult<()> {
        self.unmap();
        let mut map = TableMap::open_mut(&self.path)?;
        if map.header().table_type == TableType::Compressed {
            return Err(EngineError::Unsupported(
                "compressed tables store no startpoints to sort by",
            ));
        }

        let width = map.chain_width();
        sort_rows_by(map.rows_mut(), width, |a, b| {
            let left = u64::from_le_bytes(a[..ROW_INDEX_SIZE].try_into().unwrap());
            let right = u64::from_le_bytes(b[..ROW_INDEX_SIZE].try_into().unwrap());
            left.cmp(&right)
        });
        map.flush()?;
        Ok(())
    }

    /// Rewrites the table in place to the compressed layout: flips the
    /// header type, compacts the endpoints forward and truncates the file.
    pub fn remove_startpoints(&mut self) -> EngineResult<()> {
        self.unmap();
        let (count, max) = {
            let mut map = TableMap::open_mut(&self.path)?;
            if map.header().table_type == TableType::Compressed {
                return Err(EngineError::Unsupported(
                    "the table is already compressed",
                ));
            }

            let count = map.count();
            let max = map.header().max as usize;
            let width = ROW_INDEX_SIZE + max;
            map.set_type(TableType::Compressed);

            let rows = map.rows_mut();
            for row in 0..count {
                let endpoint = row * width + ROW_INDEX_SIZE;
                rows.copy_within(endpoint..endpoint + max, row * max);
            }
            map.flush()?;
            (count, max)
        };

        // the mapping is gone, the file can shrink now
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len((HEADER_SIZE + count * max) as u64)?;
        Ok(())
    }

    /// Copies the table to `destination` with the `target` layout.
    pub fn change_type(&mut self, destination: &Path, target: TableType) -> EngineResult<()> {
        self.unmap();
        let header = TableHeader::load(&self.path)?;
        if header.table_type == target {
            return Err(EngineError::Config(
                "the table already has the requested type".into(),
            ));
        }

        info!(
            "exporting {} chains from a {} table",
            self.count()?,
            header.table_type
        );

        match target {
            // compressing needs a full copy first: the copy is re-sorted by
            // startpoint, then stripped of them
            TableType::Compressed => {
                fs::copy(&self.path, destination)?;
                let mut destination = Engine::open(destination)?;
                destination.sort_startpoints()?;
                destination.remove_startpoints()?;
            }

            // decompressing streams every row out with its position as the
            // startpoint index, then endpoint-sorts the new table
            TableType::Uncompressed => {
                let map = TableMap::open(&self.path)?;
                let mut header = map.header().clone();
                header.table_type = TableType::Uncompressed;

                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(destination)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(&header.encode())?;
                for row in 0..map.count() {
                    writer.write_all(&(row as u64).to_le_bytes())?;
                    writer.write_all(map.endpoint_at(row))?;
                }
                writer.flush()?;
                drop(map);

                info!("sorting {} chains", self.count()?);
                let mut destination = Engine::open(destination)?;
                destination.sort_table()?;
            }
        }
        Ok(())
    }
}

/// Sorts fixed-width rows of a mapped region: computes the sorted
/// permutation over an immutable view, then materialises it in one pass.
fn sort_rows_by<F>(rows: &mut [u8], width: usize, compare: F)
where
    F: Fn(&[u8], &[u8]) -> Ordering + Sync,
{
    let count = rows.len() / width;
    let mut order: Vec<usize> = (0..count).collect();
    {
        let view = &*rows;
        let row = |index: usize| &view[index * width..(index + 1) * width];
        order.par_sort_unstable_by(|&a, &b| compare(row(a), row(b)));
    }

    let mut sorted = vec![0u8; rows.len()];
    for (slot, &source) in order.iter().enumerate() {
        sorted[slot * width..(slot + 1) * width]
            .copy_from_slice(&rows[source * width..(source + 1) * width]);
    }
    rows.copy_from_slice(&sorted);
}

#[cfg(test)]
mod tests {
    use super::sort_rows_by;

    #[test]
    fn test_sort_rows_by() {
        let mut rows = *b"ccddaabb";
        sort_rows_by(&mut rows, 2, |a, b| a.cmp(b));
        assert_eq!(b"aabbccdd", &rows);
    }
}
