//! Chain inspection helpers.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use rtcrack_commons::{generate_word, Password, WordIndex, MAX_PASSWORD_LENGTH_ALLOWED};

use crate::error::{EngineError, EngineResult};
use crate::header::{TableHeader, TableType, HEADER_SIZE, ROW_INDEX_SIZE};
use crate::TableCtx;

/// A single hash/reduce chain: `start` walked through `length` rounds ends
/// at `end`. Only the two ends are ever materialised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    /// Chain index relative to the table lower bound.
    pub index: u64,
    pub start: Password,
    pub end: Password,
    pub length: u64,
}

/// Recomputes chain `index` of the keyspace described by `ctx` from
/// scratch.
pub fn compute_chain(index: u64, ctx: &TableCtx) -> Chain {
    let reducer = ctx.reducer();
    let start = generate_word(ctx.lower_bound() + WordIndex::from(index), &ctx.charset);

    let mut word = [0u8; MAX_PASSWORD_LENGTH_ALLOWED];
    let mut length = start.len();
    word[..length].copy_from_slice(&start);

    for column in 0..ctx.chain_length {
        let digest = ctx.algorithm.hash(&word[..length]);
        length = reducer.reduce(&mut word[..ctx.max], &digest, column as usize);
    }

    Chain {
        index,
        start,
        end: Password::new(&word[..length]),
        length: ctx.chain_length,
    }
}

/// Reads chain `index` from the table file at `path`.
///
/// The startpoint is regenerated from the stored row prefix, or from the
/// row position itself for compressed tables.
pub fn get_chain(path: &Path, index: u64) -> EngineResult<Chain> {
    let header = TableHeader::load(path)?;
    let width = header.chain_width() as u64;
    let size = std::fs::metadata(path)?.len();
    if (index + 1) * width > size - HEADER_SIZE as u64 {
        return Err(EngineError::Config(format!("no chain {index} in the table")));
    }

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(HEADER_SIZE as u64 + index * width))?;

    let start_index = match header.table_type {
        TableType::Uncompressed => {
            let mut prefix = [0u8; ROW_INDEX_SIZE];
            file.read_exact(&mut prefix)?;
            u64::from_le_bytes(prefix)
        }
        TableType::Compressed => index,
    };

    let mut endpoint = vec![0u8; header.max as usize];
    file.read_exact(&mut endpoint)?;
    let end = endpoint
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(endpoint.len());

    let lower = rtcrack_commons::word_length_index(header.min as usize, &header.charset)
        .ok_or(EngineError::Corrupt("keyspace does not fit a word index"))?;

    Ok(Chain {
        index: start_index,
        start: generate_word(lower + WordIndex::from(start_index), &header.charset),
        end: Password::new(&endpoint[..end]),
        length: header.chain_length,
    })
}
