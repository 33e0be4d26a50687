//! Parallel table generation.
//!
//! Chains are generated in blocks of `blocksize`. Worker `t` owns blocks
//! `t, t + threads, t + 2·threads, ...`, so no scheduling queue is needed;
//! completed blocks flow to the owning thread over a channel, where a
//! single ordered writer appends them to the file strictly by block id.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{unbounded, Sender};
use log::{debug, info};

use rtcrack_commons::{generate_word_into, Password, Reducer, WordIndex};

use crate::error::{EngineError, EngineResult};
use crate::event::{EngineHandle, Event};
use crate::header::{is_table, TableHeader, TableType, ROW_INDEX_SIZE};
use crate::simd::{simd_hash, SimdHashBuffer, MAX_HASH_SIZE, SIMD_LANES};
use crate::{Engine, TableCtx};

/// Options of a single build run. The table shape itself lives in the
/// [`TableCtx`].
#[derive(Clone, Debug)]
pub struct BuildOpts {
    /// Chains generated per work block; must be a multiple of
    /// [`SIMD_LANES`].
    pub blocksize: usize,
    /// Target number of chains in the table.
    pub count: u64,
    /// Worker threads; 0 uses every available core.
    pub threads: usize,
}

enum BuildMsg {
    BlockDone {
        thread_id: usize,
        block_id: u64,
        endpoints: Vec<Password>,
        elapsed_ms: u64,
    },
    ThreadCompleted,
}

impl Engine {
    /// Builds the table, resuming an existing one.
    ///
    /// If the file already holds a valid table, its header pins the
    /// configuration and generation appends the missing chains. Progress is
    /// streamed through `events`.
    pub fn build(&mut self, opts: &BuildOpts, events: Option<&Sender<Event>>) -> EngineResult<()> {
        let threads = resolve_threads(opts.threads);

        if opts.count == 0 {
            return Err(EngineError::Config("no chain count specified".into()));
        }
        if opts.blocksize == 0 || opts.blocksize % SIMD_LANES != 0 {
            return Err(EngineError::Config(format!(
                "block size must be a non-zero multiple of the SIMD width ({SIMD_LANES})"
            )));
        }

        let starting_chains = if self.path.exists() {
            if !is_table(&self.path) {
                return Err(EngineError::Corrupt(
                    "the existing file is not a rainbow table",
                ));
            }
            let header = TableHeader::load(&self.path)?;
            self.ctx = TableCtx::from_header(&header)?;
            let starting = self.count()?;
            info!("resuming {} at chain {starting}", self.path.display());
            starting
        } else {
            self.ctx.to_header().store(&self.path)?;
            0
        };

        if starting_chains >= opts.count {
            info!("table already holds {starting_chains} chains, nothing to build");
            return Ok(());
        }

        // the last block still emits full, so the rounded-up row count must
        // stay within the keyspace
        let blocks = (opts.count - starting_chains).div_ceil(opts.blocksize as u64);
        let rounded = starting_chains + blocks * opts.blocksize as u64;
        if WordIndex::from(rounded) > self.ctx.keyspace() {
            return Err(EngineError::Config(
                "chain count (rounded up to the block size) exceeds the keyspace".into(),
            ));
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;

        let ctx = self.ctx.clone();
        let reducer = ctx.reducer();
        let stop = AtomicBool::new(false);
        let (tx, rx) = unbounded();

        let chains_written = thread::scope(|scope| -> EngineResult<u64> {
            for thread_id in 0..threads {
                let tx = tx.clone();
                let (ctx, reducer, stop) = (&ctx, &reducer, &stop);
                let (blocksize, count) = (opts.blocksize, opts.count);

                thread::Builder::new()
                    .name(format!("pool-{thread_id}"))
                    .spawn_scoped(scope, move || {
                        let mut block_id = thread_id as u64;
                        loop {
                            let block_start = starting_chains + block_id * blocksize as u64;
                            if block_start >= count || stop.load(Ordering::Relaxed) {
                                let _ = tx.send(BuildMsg::ThreadCompleted);
                                break;
                            }

                            let started = Instant::now();
                            let endpoints = generate_block(ctx, reducer, block_start, blocksize);
                            let elapsed_ms = started.elapsed().as_millis() as u64;

                            let done = BuildMsg::BlockDone {
                                thread_id,
                                block_id,
                                endpoints,
                                elapsed_ms,
                            };
                            if tx.send(done).is_err() {
                                break;
                            }
                            block_id += threads as u64;
                        }
                    })
                    .expect("failed to spawn a worker thread");
            }
            drop(tx);

            // ordered writer: blocks reach the disk strictly by block id
            let mut next_write_block = 0u64;
            let mut pending: BTreeMap<u64, Vec<Password>> = BTreeMap::new();
            let mut timers = vec![0u64; threads];
            let mut written = 0u64;
            let mut completed = 0usize;

            for message in &rx {
                match message {
                    BuildMsg::BlockDone {
                        thread_id,
                        block_id,
                        endpoints,
                        elapsed_ms,
                    } => {
                        timers[thread_id] = elapsed_ms;

                        let mut flush = |block_id: u64, endpoints: &[Password]| {
                            let result = write_block(
                                &mut file,
                                &ctx,
                                starting_chains + block_id * opts.blocksize as u64,
                                endpoints,
                            );
                            written += endpoints.len() as u64;
                            result
                        };

                        if block_id == next_write_block {
                            let mut last = endpoints[endpoints.len() - 1];
                            flush(block_id, &endpoints).inspect_err(|_| stop.store(true, Ordering::Relaxed))?;
                            next_write_block += 1;
                            while let Some(endpoints) = pending.remove(&next_write_block) {
                                last = endpoints[endpoints.len() - 1];
                                flush(next_write_block, &endpoints)
                                    .inspect_err(|_| stop.store(true, Ordering::Relaxed))?;
                                next_write_block += 1;
                            }
                            report_progress(
                                events,
                                &timers,
                                opts,
                                &ctx,
                                starting_chains + written,
                                last,
                            );
                        } else {
                            debug!("holding out-of-order block {block_id}");
                            pending.insert(block_id, endpoints);
                        }
                    }

                    BuildMsg::ThreadCompleted => {
                        completed += 1;
                        if completed == threads {
                            break;
                        }
                    }
                }
            }

            Ok(written)
        })?;

        file.flush()?;
        info!("table creation completed, {chains_written} chains written");
        Ok(())
    }

    /// Runs [`Engine::build`] on a background thread, streaming progress
    /// events through the returned handle.
    pub fn build_in_background(mut self, opts: BuildOpts) -> EngineHandle<Engine> {
        let (sender, receiver) = unbounded();
        let handle = thread::spawn(move || {
            self.build(&opts, Some(&sender))?;
            Ok(self)
        });

        EngineHandle { handle, receiver }
    }
}

pub(crate) fn resolve_threads(threads: usize) -> usize {
    if threads != 0 {
        return threads;
    }
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Generates one block of chains: seed every lane from consecutive
/// startpoint indices, then run the batched hash/reduce cycle over all
/// chain columns.
fn generate_block(
    ctx: &TableCtx,
    reducer: &Reducer,
    block_start: u64,
    blocksize: usize,
) -> Vec<Password> {
    let hash_width = ctx.hash_width();
    let mut words = SimdHashBuffer::new(ctx.max, SIMD_LANES);
    let mut hashes = [0u8; MAX_HASH_SIZE * SIMD_LANES];
    let mut endpoints = Vec::with_capacity(blocksize);
    let mut counter = ctx.lower_bound() + WordIndex::from(block_start);

    for _ in 0..blocksize / SIMD_LANES {
        for lane in 0..SIMD_LANES {
            let length = generate_word_into(words.lane_mut(lane), counter, &ctx.charset)
                .expect("startpoint index within the validated keyspace");
            words.set_length(lane, length);
            counter += 1;
        }

        for column in 0..ctx.chain_length {
            simd_hash(ctx.algorithm, &words, &mut hashes);
            for lane in 0..SIMD_LANES {
                let digest = &hashes[lane * hash_width..(lane + 1) * hash_width];
                let length = reducer.reduce(words.lane_mut(lane), digest, column as usize);
                words.set_length(lane, length);
            }
        }

        for lane in 0..SIMD_LANES {
            endpoints.push(Password::new(words.word(lane)));
        }
    }

    endpoints
}

/// Marshals a block into one contiguous buffer and appends it in a single
/// write. Uncompressed rows are prefixed with their global chain index.
fn write_block(
    file: &mut File,
    ctx: &TableCtx,
    first_row_index: u64,
    endpoints: &[Password],
) -> EngineResult<()> {
    let width = ctx.to_header().chain_width();
    let mut buffer = vec![0u8; endpoints.len() * width];
    let mut row_index = first_row_index;

    for (record, endpoint) in buffer.chunks_exact_mut(width).zip(endpoints) {
        let offset = match ctx.table_type {
            TableType::Uncompressed => {
                record[..ROW_INDEX_SIZE].copy_from_slice(&row_index.to_le_bytes());
                ROW_INDEX_SIZE
            }
            TableType::Compressed => 0,
        };
        // the endpoint stays NUL padded up to max
        record[offset..offset + endpoint.len()].copy_from_slice(endpoint);
        row_index += 1;
    }

    file.write_all(&buffer)?;
    file.flush()?;
    Ok(())
}

fn report_progress(
    events: Option<&Sender<Event>>,
    timers: &[u64],
    opts: &BuildOpts,
    ctx: &TableCtx,
    chains_written: u64,
    last_endpoint: Password,
) {
    let Some(events) = events else { return };

    // sum of the per-worker rates from each worker's last block time
    let chains_per_sec: f64 = timers
        .iter()
        .filter(|&&ms| ms > 0)
        .map(|&ms| 1000.0 * opts.blocksize as f64 / ms as f64)
        .sum();

    let _ = events.send(Event::Progress {
        chains_written,
        total_chains: opts.count,
        chains_per_sec,
        hashes_per_sec: chains_per_sec * ctx.chain_length as f64,
        last_endpoint,
    });
}
