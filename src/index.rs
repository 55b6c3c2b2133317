//! Bucketed range index over IPv4 keys.
//!
//! Records partition the 32-bit key space into contiguous ranges, each
//! identified by its inclusive upper bound. A 256-slot table keyed by the
//! first octet narrows every lookup to the records that can contain the key;
//! within that candidate range a bisection runs until the span is small,
//! followed by a linear scan.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::DEFAULT_MIN_BINARY_SEARCH_RANGE;
use crate::database::{Checksum, DecodedDatabase};
use crate::error_handling::{LookupError, MalformedDatabase};
use crate::resolver::Resolution;

/// One range of the key space, ending at `upper_bound` inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRecord {
    pub upper_bound: u32,
    pub resolution: Resolution,
}

/// Index construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Bisection stops once the candidate span is at most this wide
    pub min_binary_search_range: usize,
    /// Generation number stamped on the index
    pub generation: u64,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            min_binary_search_range: DEFAULT_MIN_BINARY_SEARCH_RANGE,
            generation: 0,
        }
    }
}

/// Immutable, searchable snapshot of one database.
pub struct RangeIndex {
    records: Vec<RangeRecord>,
    /// `buckets[b]` = number of records whose upper bound has first octet <= b
    buckets: Box<[usize; 256]>,
    checksum: Checksum,
    catalog: Arc<Catalog>,
    generation: u64,
    min_binary_search_range: usize,
}

impl RangeIndex {
    /// Validates `records` and builds the bucket table.
    ///
    /// Records must be non-empty, strictly ascending by upper bound, and the
    /// last one must end at `0xFFFFFFFF` so every key is covered.
    pub fn build(
        records: Vec<RangeRecord>,
        checksum: Checksum,
        catalog: Arc<Catalog>,
        options: IndexOptions,
    ) -> Result<Self, MalformedDatabase> {
        let last = records.last().ok_or(MalformedDatabase::NoRanges)?.upper_bound;

        for (position, pair) in records.windows(2).enumerate() {
            if pair[1].upper_bound <= pair[0].upper_bound {
                return Err(MalformedDatabase::UnorderedRanges {
                    position: position + 1,
                    previous: pair[0].upper_bound,
                    current: pair[1].upper_bound,
                });
            }
        }

        if last != u32::MAX {
            return Err(MalformedDatabase::IncompleteCoverage { last });
        }

        let mut buckets = Box::new([0usize; 256]);
        let mut next = 0;
        for (octet, bucket) in buckets.iter_mut().enumerate() {
            let bucket_end = ((octet as u32) << 24) | 0x00FF_FFFF;
            while next < records.len() && records[next].upper_bound <= bucket_end {
                next += 1;
            }
            *bucket = next;
        }

        log::debug!(
            "Built index generation {} with {} ranges (checksum {})",
            options.generation,
            records.len(),
            checksum
        );

        Ok(RangeIndex {
            records,
            buckets,
            checksum,
            catalog,
            generation: options.generation,
            min_binary_search_range: options.min_binary_search_range,
        })
    }

    /// Builds from decoder output.
    pub fn from_decoded(
        decoded: DecodedDatabase,
        catalog: Arc<Catalog>,
        options: IndexOptions,
    ) -> Result<Self, MalformedDatabase> {
        RangeIndex::build(decoded.records, decoded.checksum, catalog, options)
    }

    /// Position of the record covering `key`: the first with `upper_bound >= key`.
    ///
    /// Keys in `0.0.0.0/8` are rejected.
    pub fn position(&self, key: u32) -> Result<usize, LookupError> {
        let octet = (key >> 24) as usize;
        if octet == 0 {
            return Err(LookupError::InvalidKey(IpAddr::V4(Ipv4Addr::from(key))));
        }

        let last = self.records.len() - 1;
        let mut lower = self.buckets[octet - 1];
        let mut upper = self.buckets[octet].min(last);
        let threshold = self.min_binary_search_range.max(1);

        while upper - lower > threshold {
            let mid = lower + (upper - lower) / 2;
            if key <= self.records[mid - 1].upper_bound {
                upper = mid - 1;
            } else if key > self.records[mid].upper_bound {
                lower = mid + 1;
            } else {
                return Ok(mid);
            }
        }

        Ok(self.records[lower..=upper]
            .iter()
            .position(|record| key <= record.upper_bound)
            .map_or(upper, |offset| lower + offset))
    }

    /// The record covering `key`.
    pub fn lookup(&self, key: u32) -> Result<&RangeRecord, LookupError> {
        let position = self.position(key)?;
        Ok(&self.records[position])
    }

    pub fn records(&self) -> &[RangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for a built index.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for RangeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeIndex")
            .field("ranges", &self.records.len())
            .field("checksum", &self.checksum)
            .field("generation", &self.generation)
            .field("min_binary_search_range", &self.min_binary_search_range)
            .finish()
    }
}
