//! Digest inversion against a built table.
//!
//! A target digest is walked backwards through every chain column: if it
//! was produced at column `i` of some chain, reducing and hashing it
//! through the remaining columns reproduces that chain's endpoint. Every
//! endpoint hit is then validated by replaying the candidate chain, which
//! weeds out collisions between unrelated chains.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use log::{debug, info, warn};

use rtcrack_commons::{
    generate_word, Digest, Password, Reducer, WordIndex, MAX_PASSWORD_LENGTH_ALLOWED,
};

use crate::build::resolve_threads;
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineHandle, Event};
use crate::header::TableType;
use crate::index::EndpointIndex;
use crate::mapping::TableMap;
use crate::simd::{simd_hash, SimdHashBuffer, MAX_HASH_SIZE, SIMD_LANES};
use crate::{Engine, TableCtx};

/// Outcome of a crack run.
#[derive(Clone, Debug, Default)]
pub struct CrackReport {
    /// `(digest, plaintext)` pairs recovered.
    pub found: Vec<(String, String)>,
    /// Endpoint matches whose chain replay did not contain the target.
    pub false_positives: u64,
}

enum CrackMsg {
    Found { digest: String, plaintext: String },
    ThreadCompleted,
}

/// A target digest paired with its original hex spelling.
type Target = (String, Vec<u8>);

impl Engine {
    /// Cracks `target`, either a single hex digest or the path of a
    /// newline-delimited file of digests. Recoveries are streamed through
    /// `events` and collected in the report.
    pub fn crack(
        &mut self,
        target: &str,
        threads: usize,
        events: Option<&Sender<Event>>,
    ) -> EngineResult<CrackReport> {
        self.map_for_crack()?;

        let mut found = Vec::new();
        if let Some(bytes) = parse_target(target, self.ctx.hash_width()) {
            if let Some(plaintext) = self.crack_one(&bytes) {
                let plaintext = plaintext.to_string();
                if let Some(events) = events {
                    let _ = events.send(Event::Found {
                        digest: target.to_string(),
                        plaintext: plaintext.clone(),
                    });
                }
                found.push((target.to_string(), plaintext));
            }
        } else if Path::new(target).exists() {
            found = self.crack_file(Path::new(target), resolve_threads(threads), events)?;
        } else {
            return Err(EngineError::InvalidTarget(target.to_string()));
        }

        Ok(CrackReport {
            found,
            false_positives: self.false_positives(),
        })
    }

    /// Runs [`Engine::crack`] on a background thread, streaming results
    /// through the returned handle.
    pub fn crack_in_background(
        mut self,
        target: String,
        threads: usize,
    ) -> EngineHandle<CrackReport> {
        let (sender, receiver) = unbounded();
        let handle = thread::spawn(move || self.crack(&target, threads, Some(&sender)));

        EngineHandle { handle, receiver }
    }

    /// Maps the table read-only and prepares the endpoint index.
    ///
    /// Freshly built uncompressed tables are in chain order; only
    /// endpoint-sorted ones get the bucketed index, the rest fall back to
    /// the linear scan also used for compressed tables.
    fn map_for_crack(&mut self) -> EngineResult<()> {
        self.unmap();
        let map = TableMap::open(&self.path)?;
        self.ctx = TableCtx::from_header(map.header())?;
        if map.count() == 0 {
            return Err(EngineError::Corrupt("the table holds no chains"));
        }

        if map.header().table_type == TableType::Uncompressed {
            if self.ctx.max >= 2 && is_endpoint_sorted(&map) {
                info!("indexing {} endpoints..", map.count());
                self.index = Some(EndpointIndex::build(&map));
            } else {
                debug!("table is not endpoint-sorted, lookups fall back to linear scans");
            }
        }
        self.map = Some(map);
        Ok(())
    }

    /// Single-target crack: walk the digest backwards from every column.
    fn crack_one(&self, target: &[u8]) -> Option<Password> {
        let reducer = self.ctx.reducer();
        let columns = self.ctx.chain_length as usize;
        let mut word = [0u8; MAX_PASSWORD_LENGTH_ALLOWED];
        let word = &mut word[..self.ctx.max];

        for start_column in (0..columns).rev() {
            let mut digest: Digest = target.try_into().unwrap();

            for column in start_column..columns - 1 {
                let length = reducer.reduce(word, &digest, column);
                digest = self.ctx.algorithm.hash(&word[..length]);
            }
            let length = reducer.reduce(word, &digest, columns - 1);

            if let Some(chain_index) = self.find_endpoint(&word[..length]) {
                match self.validate_chain(chain_index, target, &reducer) {
                    Some(plaintext) => return Some(plaintext),
                    None => {
                        self.false_positives.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
        None
    }

    /// Batched crack of up to [`SIMD_LANES`] targets walking all lanes
    /// through one hash kernel. Cracked lanes are skipped; the walk stops
    /// early once every lane is done.
    fn crack_simd(&self, targets: &[Target], reducer: &Reducer, results: &Sender<CrackMsg>) {
        let lanes = targets.len();
        let hash_width = self.ctx.hash_width();
        let columns = self.ctx.chain_length as usize;

        let mut words = SimdHashBuffer::new(self.ctx.max, SIMD_LANES);
        let mut hashes = [0u8; MAX_HASH_SIZE * SIMD_LANES];
        let mut cracked = [false; SIMD_LANES];
        let mut remaining = lanes;

        for start_column in (0..columns).rev() {
            // every outer iteration restarts the surviving lanes from their
            // target digests
            for (lane, (_, target)) in targets.iter().enumerate() {
                hashes[lane * hash_width..(lane + 1) * hash_width].copy_from_slice(target);
            }

            for column in start_column..columns - 1 {
                for lane in 0..lanes {
                    if cracked[lane] {
                        continue;
                    }
                    let digest = &hashes[lane * hash_width..(lane + 1) * hash_width];
                    let length = reducer.reduce(words.lane_mut(lane), digest, column);
                    words.set_length(lane, length);
                }
                simd_hash(self.ctx.algorithm, &words, &mut hashes);
            }

            for lane in 0..lanes {
                if cracked[lane] {
                    continue;
                }
                let digest = &hashes[lane * hash_width..(lane + 1) * hash_width];
                let length = reducer.reduce(words.lane_mut(lane), digest, columns - 1);
                words.set_length(lane, length);

                let Some(chain_index) = self.find_endpoint(words.word(lane)) else {
                    continue;
                };
                match self.validate_chain(chain_index, &targets[lane].1, reducer) {
                    Some(plaintext) => {
                        let _ = results.send(CrackMsg::Found {
                            digest: targets[lane].0.clone(),
                            plaintext: plaintext.to_string(),
                        });
                        cracked[lane] = true;
                        remaining -= 1;
                        if remaining == 0 {
                            return;
                        }
                    }
                    None => {
                        self.false_positives.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    /// Cracks a file of digests with `threads` workers sharing the input
    /// stream under a lock, [`SIMD_LANES`] lines at a time.
    fn crack_file(
        &self,
        path: &Path,
        threads: usize,
        events: Option<&Sender<Event>>,
    ) -> EngineResult<Vec<(String, String)>> {
        let stream = Mutex::new(BufReader::new(File::open(path)?).lines());
        let hash_width = self.ctx.hash_width();
        let (tx, rx) = unbounded();

        Ok(thread::scope(|scope| {
            for thread_id in 0..threads {
                let tx = tx.clone();
                let (engine, stream) = (&*self, &stream);

                thread::Builder::new()
                    .name(format!("pool-{thread_id}"))
                    .spawn_scoped(scope, move || {
                        let reducer = engine.ctx.reducer();
                        loop {
                            let (targets, exhausted) = next_batch(stream, hash_width);
                            if !targets.is_empty() {
                                engine.crack_simd(&targets, &reducer, &tx);
                            }
                            if exhausted {
                                break;
                            }
                        }
                        let _ = tx.send(CrackMsg::ThreadCompleted);
                    })
                    .expect("failed to spawn a worker thread");
            }
            drop(tx);

            // results are observed serially here, on the owning thread
            let mut found = Vec::new();
            let mut completed = 0;
            for message in &rx {
                match message {
                    CrackMsg::Found { digest, plaintext } => {
                        if let Some(events) = events {
                            let _ = events.send(Event::Found {
                                digest: digest.clone(),
                                plaintext: plaintext.clone(),
                            });
                        }
                        found.push((digest, plaintext));
                    }
                    CrackMsg::ThreadCompleted => {
                        completed += 1;
                        if completed == threads {
                            break;
                        }
                    }
                }
            }
            found
        }))
    }

    /// Finds the chain whose stored endpoint matches `word`, NUL padded to
    /// the table width. Returns its chain index.
    fn find_endpoint(&self, word: &[u8]) -> Option<u64> {
        let map = self.map.as_ref().expect("table mapped for crack");
        let mut padded = [0u8; MAX_PASSWORD_LENGTH_ALLOWED];
        padded[..word.len()].copy_from_slice(word);
        let endpoint = &padded[..self.ctx.max];

        if let Some(index) = &self.index {
            let prefix = u16::from_le_bytes([endpoint[0], endpoint[1]]);
            let (first, length) = index.lookup(prefix)?;

            let (mut low, mut high) = (0, length);
            while low < high {
                let mid = (low + high) / 2;
                match map.endpoint_at(first + mid).cmp(endpoint) {
                    std::cmp::Ordering::Equal => return Some(map.start_index_at(first + mid)),
                    std::cmp::Ordering::Less => low = mid + 1,
                    std::cmp::Ordering::Greater => high = mid,
                }
            }
            return None;
        }

        // compressed or unsorted tables: flat scan of the endpoint column
        (0..map.count())
            .find(|&row| map.endpoint_at(row) == endpoint)
            .map(|row| map.start_index_at(row))
    }

    /// Replays the chain at `chain_index` looking for a word hashing to
    /// `target`. `None` means the endpoint hit was a false positive.
    fn validate_chain(
        &self,
        chain_index: u64,
        target: &[u8],
        reducer: &Reducer,
    ) -> Option<Password> {
        let start = generate_word(
            self.ctx.lower_bound() + WordIndex::from(chain_index),
            &self.ctx.charset,
        );
        let mut word = [0u8; MAX_PASSWORD_LENGTH_ALLOWED];
        let mut length = start.len();
        word[..length].copy_from_slice(&start);

        for column in 0..self.ctx.chain_length {
            let digest = self.ctx.algorithm.hash(&word[..length]);
            if digest.as_slice() == target {
                return Some(Password::new(&word[..length]));
            }
            length = reducer.reduce(&mut word[..self.ctx.max], &digest, column as usize);
        }
        None
    }
}

/// Decodes `target` when it spells a digest of the right width.
fn parse_target(target: &str, hash_width: usize) -> Option<Vec<u8>> {
    if target.len() != hash_width * 2 {
        return None;
    }
    hex::decode(target).ok()
}

/// Pulls up to [`SIMD_LANES`] parsable digests off the shared stream.
/// The second value reports stream exhaustion.
fn next_batch(
    stream: &Mutex<Lines<BufReader<File>>>,
    hash_width: usize,
) -> (Vec<Target>, bool) {
    let mut targets = Vec::with_capacity(SIMD_LANES);
    let mut lines = stream.lock().expect("hash stream lock poisoned");

    while targets.len() < SIMD_LANES {
        match lines.next() {
            Some(Ok(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_target(line, hash_width) {
                    Some(bytes) => targets.push((line.to_string(), bytes)),
                    None => warn!("skipping target that is not a valid digest: {line:?}"),
                }
            }
            Some(Err(_)) | None => return (targets, true),
        }
    }
    (targets, false)
}

/// One pass over the endpoint column checking the sort invariant.
fn is_endpoint_sorted(map: &TableMap) -> bool {
    (1..map.count()).all(|row| map.endpoint_at(row - 1) <= map.endpoint_at(row))
}
