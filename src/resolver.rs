//! Text record resolution.
//!
//! Turns one tab-separated database record (`country\tsubdivision\tcity\t...\tisps`)
//! into a [`Resolution`] by looking names up in the reference catalog.
//! Names the catalog does not know are reported to the configured
//! [`UnknownObserver`] so the world file can be curated offline; they never
//! fail a decode.

use std::fmt;
use std::sync::Arc;

use crate::catalog::{Catalog, City, Country, Isp, Location, Subdivision};
use crate::config::UnknownObserver;

/// Separator between ISP candidates in the ISP field.
const ISP_SEPARATOR: char = '/';

/// Catalog level a name failed to resolve at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnknownLevel {
    Country,
    Subdivision,
    City,
    Isp,
}

impl UnknownLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownLevel::Country => "country",
            UnknownLevel::Subdivision => "subdivision",
            UnknownLevel::City => "city",
            UnknownLevel::Isp => "isp",
        }
    }
}

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location and ISPs resolved from one text record.
///
/// An empty ISP list is represented as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub location: Option<Location>,
    pub isps: Option<Vec<Arc<Isp>>>,
}

impl Resolution {
    pub fn country<'c>(&self, catalog: &'c Catalog) -> Option<&'c Country> {
        self.location?.country(catalog)
    }

    pub fn subdivision<'c>(&self, catalog: &'c Catalog) -> Option<&'c Subdivision> {
        self.location?.subdivision(catalog)
    }

    pub fn city<'c>(&self, catalog: &'c Catalog) -> Option<&'c City> {
        self.location?.city(catalog)
    }

    /// ISPs in record order; empty when the record carried none.
    pub fn isps(&self) -> &[Arc<Isp>] {
        self.isps.as_deref().unwrap_or(&[])
    }
}

/// Resolves text records against a catalog.
///
/// Synthetic unknown ISPs come from the catalog's memo, so every record naming
/// the same unknown provider shares one `Arc`.
pub struct RecordResolver {
    catalog: Arc<Catalog>,
    retain_unknown_isps: bool,
    observer: Option<UnknownObserver>,
}

impl RecordResolver {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        RecordResolver {
            catalog,
            retain_unknown_isps: false,
            observer: None,
        }
    }

    /// Keep unresolvable ISP names as synthetic ISPs with ID 0 instead of dropping them.
    pub fn retain_unknown_isps(mut self, retain: bool) -> Self {
        self.retain_unknown_isps = retain;
        self
    }

    pub fn with_observer(mut self, observer: Option<UnknownObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn resolve(&self, text: &str) -> Resolution {
        let fields: Vec<&str> = text.split('\t').collect();
        let location = self.resolve_location(&fields);
        // The ISP field is always last; a lone field is only a country
        let isps = if fields.len() > 1 {
            fields.last().and_then(|field| self.resolve_isps(field))
        } else {
            None
        };
        Resolution { location, isps }
    }

    fn resolve_location(&self, fields: &[&str]) -> Option<Location> {
        let field = |i: usize| fields.get(i).copied().unwrap_or("");
        let (country_name, subdivision_name, city_name) = (field(0), field(1), field(2));

        let Some(country) = self.catalog.find_country(country_name) else {
            if !country_name.is_empty() {
                self.report(UnknownLevel::Country, &[country_name]);
            }
            return None;
        };

        let Some(subdivision) = self.catalog.find_subdivision(country, subdivision_name) else {
            // A subdivision repeating the country name marks a country-level record
            if !subdivision_name.is_empty() && subdivision_name != country_name {
                self.report(UnknownLevel::Subdivision, &[country_name, subdivision_name]);
            }
            return Some(Location::Country(country));
        };

        match self.catalog.find_city(subdivision, city_name) {
            Some(city) => Some(Location::City(city)),
            None => {
                if !city_name.is_empty() {
                    self.report(
                        UnknownLevel::City,
                        &[country_name, subdivision_name, city_name],
                    );
                }
                Some(Location::Subdivision(subdivision))
            }
        }
    }

    fn resolve_isps(&self, field: &str) -> Option<Vec<Arc<Isp>>> {
        let mut isps = Vec::new();
        for name in field.split(ISP_SEPARATOR).filter(|name| !name.is_empty()) {
            if let Some(isp) = self.catalog.find_isp(name) {
                isps.push(Arc::clone(isp));
                continue;
            }
            self.report(UnknownLevel::Isp, &[name]);
            if self.retain_unknown_isps {
                isps.push(self.catalog.unknown_isp(name));
            }
        }
        if isps.is_empty() {
            None
        } else {
            Some(isps)
        }
    }

    fn report(&self, level: UnknownLevel, fields: &[&str]) {
        log::trace!("Unknown {}: {}", level, fields.join("/"));
        if let Some(observer) = &self.observer {
            observer.notify(level, fields);
        }
    }
}

impl fmt::Debug for RecordResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordResolver")
            .field("retain_unknown_isps", &self.retain_unknown_isps)
            .field("observer", &self.observer)
            .field("unknown_isps", &self.catalog.unknown_isp_count())
            .finish()
    }
}
