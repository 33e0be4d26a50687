//! Two-byte prefix index over the sorted endpoint column.
//!
//! Endpoint lookups bucket rows by the little-endian `u16` made of the
//! first two endpoint bytes. The index stores, per bucket, the first row
//! carrying that prefix and the number of rows in the bucket, turning a
//! lookup into one array read plus a binary search of a single bucket.

use crate::mapping::TableMap;

/// One bucket per possible two-byte prefix.
const BUCKETS: usize = u16::MAX as usize + 1;

/// Sampling stride of the construction scan.
const READAHEAD: usize = 64;

const EMPTY: usize = usize::MAX;

/// Bucketed lookup structure over an endpoint-sorted uncompressed table.
///
/// Holds row positions into the mapping it was built from; rebuild it
/// whenever the table is remapped.
pub struct EndpointIndex {
    starts: Vec<usize>,
    lengths: Vec<usize>,
}

impl EndpointIndex {
    /// Builds the index by scanning the endpoint column.
    ///
    /// The table must be endpoint-sorted, hold at least one row and have
    /// endpoints of at least two bytes. The scan samples every
    /// [`READAHEAD`]th row and walks each gap in which the sampled prefix
    /// changed, so buckets shorter than the stride are still recorded.
    pub fn build(map: &TableMap) -> Self {
        let count = map.count();
        debug_assert!(count > 0 && map.header().max >= 2);

        let key_at = |row: usize| {
            let endpoint = map.endpoint_at(row);
            u16::from_le_bytes([endpoint[0], endpoint[1]]) as usize
        };

        let mut starts = vec![EMPTY; BUCKETS];
        let mut lengths = vec![0usize; BUCKETS];

        let mut last_sample = 0;
        let mut last_key = key_at(0);
        starts[last_key] = 0;

        let samples = (0..count)
            .step_by(READAHEAD)
            .chain(core::iter::once(count - 1));
        for sample in samples {
            let key = key_at(sample);
            if key != last_key {
                // the prefix changed inside this gap: record the first row
                // of every bucket starting in (last_sample, sample]
                let mut previous = last_key;
                for row in last_sample + 1..=sample {
                    let key = key_at(row);
                    if key != previous {
                        starts[key] = row;
                        previous = key;
                    }
                }
            }
            last_sample = sample;
            last_key = key;
        }

        // bucket lengths are the distances between consecutive non-empty
        // bucket starts, in row order
        let mut occupied: Vec<usize> = (0..BUCKETS).filter(|&key| starts[key] != EMPTY).collect();
        occupied.sort_unstable_by_key(|&key| starts[key]);
        for pair in occupied.windows(2) {
            lengths[pair[0]] = starts[pair[1]] - starts[pair[0]];
        }
        if let Some(&last) = occupied.last() {
            lengths[last] = count - starts[last];
        }

        Self { starts, lengths }
    }

    /// Returns the `(first_row, row_count)` of the endpoints carrying
    /// `prefix`, or `None` if the table holds none.
    pub fn lookup(&self, prefix: u16) -> Option<(usize, usize)> {
        let start = self.starts[prefix as usize];
        (start != EMPTY).then(|| (start, self.lengths[prefix as usize]))
    }
}
