//! Lookup result handle.

use std::fmt;
use std::sync::Arc;

use crate::catalog::{City, Country, Isp, Location, Subdivision};
use crate::database::Checksum;
use crate::index::RangeIndex;
use crate::resolver::Resolution;

/// The record covering a looked-up address.
///
/// Holds its index generation alive, so accessors stay valid after a newer
/// generation is published.
#[derive(Clone)]
pub struct GeoIspResult {
    index: Arc<RangeIndex>,
    position: usize,
}

impl GeoIspResult {
    pub(crate) fn new(index: Arc<RangeIndex>, position: usize) -> Self {
        GeoIspResult { index, position }
    }

    pub fn resolution(&self) -> &Resolution {
        &self.index.records()[self.position].resolution
    }

    pub fn location(&self) -> Option<Location> {
        self.resolution().location
    }

    pub fn country(&self) -> Option<&Country> {
        self.resolution().country(self.index.catalog())
    }

    pub fn subdivision(&self) -> Option<&Subdivision> {
        self.resolution().subdivision(self.index.catalog())
    }

    pub fn city(&self) -> Option<&City> {
        self.resolution().city(self.index.catalog())
    }

    /// ISPs in record order; empty when none resolved.
    pub fn isps(&self) -> &[Arc<Isp>] {
        self.resolution().isps()
    }

    /// Inclusive upper bound of the matched range.
    pub fn upper_bound(&self) -> u32 {
        self.index.records()[self.position].upper_bound
    }

    /// Generation the result was served from.
    pub fn generation(&self) -> u64 {
        self.index.generation()
    }

    pub fn checksum(&self) -> &Checksum {
        self.index.checksum()
    }
}

impl PartialEq for GeoIspResult {
    fn eq(&self, other: &Self) -> bool {
        self.resolution() == other.resolution()
    }
}

impl PartialEq<Resolution> for GeoIspResult {
    fn eq(&self, other: &Resolution) -> bool {
        self.resolution() == other
    }
}

impl fmt::Debug for GeoIspResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoIspResult")
            .field("upper_bound", &format_args!("{:#010x}", self.upper_bound()))
            .field("resolution", self.resolution())
            .field("generation", &self.generation())
            .finish()
    }
}

/// `country / subdivision / city / isp,isp`, with `-` for absent parts.
impl fmt::Display for GeoIspResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |n: Option<&str>| n.unwrap_or("-").to_string();
        let isps = if self.isps().is_empty() {
            "-".to_string()
        } else {
            self.isps()
                .iter()
                .map(|isp| isp.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "{} / {} / {} / {}",
            name(self.country().map(|c| c.name.as_str())),
            name(self.subdivision().map(|s| s.name.as_str())),
            name(self.city().map(|c| c.name.as_str())),
            isps
        )
    }
}
