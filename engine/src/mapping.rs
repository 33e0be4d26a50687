//! Owned memory mappings of table files.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{Advice, Mmap, MmapMut};

use crate::error::{EngineError, EngineResult};
use crate::header::{TableHeader, TableType, HEADER_SIZE, ROW_INDEX_SIZE};

enum Map {
    Read(Mmap),
    Write(MmapMut),
}

/// A table file mapped into memory.
///
/// The mapping is owned: dropping a `TableMap` unmaps it, and anything
/// derived from it (row slices, the endpoint index) must not outlive it.
pub struct TableMap {
    map: Map,
    header: TableHeader,
    chain_width: usize,
    count: usize,
}

impl TableMap {
    /// Maps the table at `path` read-only, advising the kernel of the
    /// random access pattern of endpoint lookups.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is never written through and the file is not
        // truncated while mapped.
        let map = unsafe { Mmap::map(&file)? };
        map.advise(Advice::Random)?;
        map.advise(Advice::WillNeed)?;
        Self::with_map(Map::Read(map))
    }

    /// Maps the table at `path` writable, for sorting and rewriting.
    pub fn open_mut(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // SAFETY: the engine holds at most one mapping of a table at a time.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Self::with_map(Map::Write(map))
    }

    fn with_map(map: Map) -> EngineResult<Self> {
        let bytes = match &map {
            Map::Read(map) => &map[..],
            Map::Write(map) => &map[..],
        };
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::Corrupt("truncated header"));
        }

        let header = TableHeader::decode(&bytes[..HEADER_SIZE])?;
        let chain_width = header.chain_width();
        let data = bytes.len() - HEADER_SIZE;
        if data % chain_width != 0 {
            return Err(EngineError::Corrupt(
                "data size is not a multiple of the chain width",
            ));
        }

        Ok(Self {
            count: data / chain_width,
            header,
            chain_width,
            map,
        })
    }

    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    /// Number of chains stored in the table.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn chain_width(&self) -> usize {
        self.chain_width
    }

    fn bytes(&self) -> &[u8] {
        match &self.map {
            Map::Read(map) => map,
            Map::Write(map) => map,
        }
    }

    /// The row payload, header excluded.
    pub fn rows(&self) -> &[u8] {
        &self.bytes()[HEADER_SIZE..]
    }

    /// Mutable row payload. Only available on writable mappings.
    pub fn rows_mut(&mut self) -> &mut [u8] {
        match &mut self.map {
            Map::Read(_) => unreachable!("mapping is read-only"),
            Map::Write(map) => &mut map[HEADER_SIZE..],
        }
    }

    /// The full record of row `index`.
    pub fn record_at(&self, index: usize) -> &[u8] {
        &self.rows()[index * self.chain_width..(index + 1) * self.chain_width]
    }

    /// The `max` endpoint bytes of row `index`, skipping the startpoint
    /// index of uncompressed rows.
    pub fn endpoint_at(&self, index: usize) -> &[u8] {
        let record = self.record_at(index);
        match self.header.table_type {
            TableType::Uncompressed => &record[ROW_INDEX_SIZE..],
            TableType::Compressed => record,
        }
    }

    /// The chain index of row `index`: the stored startpoint prefix for
    /// uncompressed tables, the row position itself for compressed ones.
    pub fn start_index_at(&self, index: usize) -> u64 {
        match self.header.table_type {
            TableType::Uncompressed => {
                let record = self.record_at(index);
                u64::from_le_bytes(record[..ROW_INDEX_SIZE].try_into().unwrap())
            }
            TableType::Compressed => index as u64,
        }
    }

    /// Rewrites the table type bits of the mapped header.
    pub fn set_type(&mut self, table_type: TableType) {
        let byte = self.header.table_type as u8 | (self.header.algorithm as u8) << 2;
        debug_assert_eq!(byte, self.bytes()[4]);

        self.header.table_type = table_type;
        let packed = table_type as u8 | (self.header.algorithm as u8) << 2;
        match &mut self.map {
            Map::Read(_) => unreachable!("mapping is read-only"),
            Map::Write(map) => map[4] = packed,
        }
    }

    /// Flushes a writable mapping back to disk.
    pub fn flush(&self) -> EngineResult<()> {
        if let Map::Write(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }
}
