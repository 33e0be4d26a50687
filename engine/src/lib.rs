//! Rainbow table construction, lookup and maintenance.
//!
//! A table is a flat file of hash/reduce chain endpoints described by a
//! [`TableHeader`]. The [`Engine`] owns one table file at a time: it builds
//! it block by block, maps it for cracking, and rewrites it between the
//! compressed and uncompressed layouts.

mod build;
mod chain;
mod convert;
mod crack;
mod error;
mod event;
mod header;
mod index;
mod mapping;
mod simd;

pub use build::BuildOpts;
pub use chain::{compute_chain, get_chain, Chain};
pub use crack::CrackReport;
pub use error::{EngineError, EngineResult};
pub use event::{EngineHandle, Event};
pub use header::{
    chain_width, is_table, TableHeader, TableType, HEADER_SIZE, ROW_INDEX_SIZE, TABLE_MAGIC,
};
pub use index::EndpointIndex;
pub use mapping::TableMap;
pub use simd::{simd_hash, SimdHashBuffer, MAX_HASH_SIZE, SIMD_LANES};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::info;

use rtcrack_commons::{
    word_length_index, HashAlgorithm, Reducer, WordIndex, ASCII, MAX_CHARSET_LENGTH_ALLOWED,
    MAX_PASSWORD_LENGTH_ALLOWED,
};

/// Everything the chain pipeline needs to know about a table.
///
/// A context is immutable once built; for an existing table it is pinned by
/// the on-disk header.
#[derive(Clone, Debug)]
pub struct TableCtx {
    pub algorithm: HashAlgorithm,
    pub min: usize,
    pub max: usize,
    pub chain_length: u64,
    pub charset: Vec<u8>,
    pub table_type: TableType,
}

impl TableCtx {
    pub fn builder() -> TableCtxBuilder {
        TableCtxBuilder::default()
    }

    pub(crate) fn from_header(header: &TableHeader) -> EngineResult<Self> {
        TableCtx::builder()
            .algorithm(header.algorithm)
            .min(header.min as usize)
            .max(header.max as usize)
            .chain_length(header.chain_length)
            .charset(&header.charset)
            .table_type(header.table_type)
            .build()
    }

    pub(crate) fn to_header(&self) -> TableHeader {
        TableHeader {
            table_type: self.table_type,
            algorithm: self.algorithm,
            min: self.min as u8,
            max: self.max as u8,
            chain_length: self.chain_length,
            charset: self.charset.clone(),
        }
    }

    /// Index of the first word of the keyspace, `S(min)`.
    pub fn lower_bound(&self) -> WordIndex {
        word_length_index(self.min, &self.charset).expect("keyspace validated at build time")
    }

    /// Index one past the last word of the keyspace, `S(max + 1)`.
    pub fn upper_bound(&self) -> WordIndex {
        word_length_index(self.max + 1, &self.charset).expect("keyspace validated at build time")
    }

    /// Number of passwords the table can cover.
    pub fn keyspace(&self) -> WordIndex {
        self.upper_bound() - self.lower_bound()
    }

    /// Digest width of the table's hash algorithm, in bytes.
    pub fn hash_width(&self) -> usize {
        self.algorithm.digest_size()
    }

    /// The reduction function of this keyspace.
    pub fn reducer(&self) -> Reducer {
        Reducer::new(self.min, self.max, self.hash_width(), &self.charset)
    }
}

/// A builder for a table context.
#[derive(Clone)]
pub struct TableCtxBuilder {
    algorithm: Option<HashAlgorithm>,
    min: usize,
    max: usize,
    chain_length: u64,
    charset: Vec<u8>,
    table_type: TableType,
}

impl Default for TableCtxBuilder {
    fn default() -> Self {
        Self {
            algorithm: None,
            min: 0,
            max: 0,
            chain_length: 0,
            charset: ASCII.to_vec(),
            table_type: TableType::Compressed,
        }
    }
}

impl TableCtxBuilder {
    /// Sets the hash algorithm of the table.
    pub fn algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Sets the minimum password length.
    pub fn min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    /// Sets the maximum password length.
    pub fn max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Sets the chain length. Longer chains shrink the table on disk but
    /// slow down cracking.
    pub fn chain_length(mut self, chain_length: u64) -> Self {
        self.chain_length = chain_length;
        self
    }

    /// Sets the charset. Defaults to printable ASCII.
    pub fn charset(mut self, charset: &[u8]) -> Self {
        self.charset = charset.to_vec();
        self
    }

    /// Sets the on-disk layout of the table.
    pub fn table_type(mut self, table_type: TableType) -> Self {
        self.table_type = table_type;
        self
    }

    /// Validates the parameters and builds a [`TableCtx`].
    pub fn build(self) -> EngineResult<TableCtx> {
        let config = |message: &str| EngineError::Config(message.into());

        let algorithm = self.algorithm.ok_or_else(|| config("no algorithm specified"))?;
        if self.max == 0 {
            return Err(config("no maximum password length specified"));
        }
        if self.max > MAX_PASSWORD_LENGTH_ALLOWED {
            return Err(config("maximum password length is too large"));
        }
        if self.min > self.max {
            return Err(config("minimum password length exceeds the maximum"));
        }
        if self.chain_length == 0 {
            return Err(config("no chain length specified"));
        }
        if self.charset.is_empty() {
            return Err(config("no or invalid charset specified"));
        }
        if self.charset.len() > MAX_CHARSET_LENGTH_ALLOWED {
            return Err(config("charset is too large"));
        }
        let mut seen = [false; 256];
        for &c in &self.charset {
            if std::mem::replace(&mut seen[c as usize], true) {
                return Err(config("charset contains duplicate characters"));
            }
        }

        // the whole keyspace must be addressable by a WordIndex
        if word_length_index(self.max + 1, &self.charset).is_none() {
            let bits = (self.max as f64 * (self.charset.len() as f64).log2()).ceil() as u32 + 1;
            return Err(EngineError::Space(bits));
        }

        Ok(TableCtx {
            algorithm,
            min: self.min,
            max: self.max,
            chain_length: self.chain_length,
            charset: self.charset,
            table_type: self.table_type,
        })
    }
}

/// Owns a table file: builds it, maps it, cracks against it, rewrites it.
pub struct Engine {
    path: PathBuf,
    ctx: TableCtx,
    map: Option<TableMap>,
    index: Option<EndpointIndex>,
    false_positives: AtomicU64,
}

impl Engine {
    /// Creates an engine for the table at `path`. If a valid table already
    /// exists there its header pins the context and `builder` is ignored;
    /// otherwise the builder must describe a complete configuration.
    pub fn create(path: impl Into<PathBuf>, builder: TableCtxBuilder) -> EngineResult<Self> {
        let path = path.into();
        let ctx = if path.exists() && is_table(&path) {
            let header = TableHeader::load(&path)?;
            info!(
                "loaded existing {} table at {}",
                header.algorithm,
                path.display()
            );
            TableCtx::from_header(&header)?
        } else {
            builder.build()?
        };

        Ok(Self {
            path,
            ctx,
            map: None,
            index: None,
            false_positives: AtomicU64::new(0),
        })
    }

    /// Opens an engine over an existing table.
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let header = TableHeader::load(&path)?;

        Ok(Self {
            ctx: TableCtx::from_header(&header)?,
            path,
            map: None,
            index: None,
            false_positives: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ctx(&self) -> &TableCtx {
        &self.ctx
    }

    /// Number of chains currently stored in the table file.
    pub fn count(&self) -> EngineResult<u64> {
        let header = TableHeader::load(&self.path)?;
        let size = fs::metadata(&self.path)?.len();
        Ok((size - HEADER_SIZE as u64) / header.chain_width() as u64)
    }

    /// Percentage of the keyspace covered by the stored chains, assuming no
    /// merges.
    pub fn coverage(&self) -> EngineResult<f64> {
        let covered = self.count()? as f64 * self.ctx.chain_length as f64;
        Ok(covered / self.ctx.keyspace() as f64 * 100.0)
    }

    /// Endpoint matches rejected by chain validation so far.
    pub fn false_positives(&self) -> u64 {
        self.false_positives.load(Ordering::Relaxed)
    }

    pub(crate) fn unmap(&mut self) {
        // the index borrows row positions from the mapping, drop it first
        self.index = None;
        self.map = None;
    }
}
