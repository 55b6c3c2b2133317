//! Reference catalog of countries, subdivisions, cities and ISPs.
//!
//! The catalog is built once (from the built-in world, a world CSV file, or
//! programmatically through [`CatalogBuilder`]) and is immutable afterwards.
//! Every index generation shares it through an `Arc`.
//!
//! Back-references (city → subdivision → country) are stored as typed indices
//! into the owning catalog, so they stay valid for as long as the catalog does.

mod loader;
mod location;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

pub use location::Location;

/// Index of a [`Country`] inside its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryIdx(u32);

/// Index of a [`Subdivision`] inside its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubdivisionIdx(u32);

/// Index of a [`City`] inside its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CityIdx(u32);

/// ISO-3166-1 country codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Iso3166_1 {
    pub alpha2: String,
    pub alpha3: String,
    pub numeric: u16,
}

/// A country.
#[derive(Debug, Clone, Serialize)]
pub struct Country {
    /// User-assigned ID, may be 0
    pub id: i32,
    /// ISO-3166-1 codes
    pub iso: Iso3166_1,
    /// Display name, also the lookup key
    pub name: String,
    #[serde(skip)]
    subdivisions: HashMap<String, SubdivisionIdx>,
}

impl Country {
    /// Number of subdivisions known for this country.
    pub fn subdivision_count(&self) -> usize {
        self.subdivisions.len()
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}/{}/{}/{})",
            self.name, self.id, self.iso.alpha2, self.iso.alpha3, self.iso.numeric
        )
    }
}

/// A first-level subdivision (province, state, ...).
#[derive(Debug, Clone, Serialize)]
pub struct Subdivision {
    pub id: i32,
    /// ISO-3166-2 code
    pub iso: String,
    pub name: String,
    #[serde(skip)]
    country: CountryIdx,
    #[serde(skip)]
    cities: HashMap<String, CityIdx>,
}

impl Subdivision {
    /// The owning country.
    pub fn country_idx(&self) -> CountryIdx {
        self.country
    }
}

impl fmt::Display for Subdivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}/{})", self.name, self.id, self.iso)
    }
}

/// A city.
#[derive(Debug, Clone, Serialize)]
pub struct City {
    pub id: i32,
    pub name: String,
    #[serde(skip)]
    subdivision: SubdivisionIdx,
}

impl City {
    /// The owning subdivision.
    pub fn subdivision_idx(&self) -> SubdivisionIdx {
        self.subdivision
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// A network service provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Isp {
    /// ISP ID; 0 marks a synthetic record for an unknown name
    pub id: i32,
    pub name: String,
    /// Alternative names resolving to this ISP
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl Isp {
    /// Synthetic ISP standing in for a name the catalog does not know.
    pub fn unknown(name: &str) -> Self {
        Isp {
            id: 0,
            name: name.to_string(),
            aliases: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.id == 0
    }
}

impl fmt::Display for Isp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// Immutable, name-indexed hierarchy of geographic and ISP entities.
///
/// The one mutable part is the memo of synthetic unknown ISPs, which lives as
/// long as the catalog so every resolver sharing it hands out the same `Arc`.
#[derive(Debug, Default)]
pub struct Catalog {
    countries: Vec<Country>,
    subdivisions: Vec<Subdivision>,
    cities: Vec<City>,
    isps: Vec<Arc<Isp>>,
    countries_by_name: HashMap<String, CountryIdx>,
    isps_by_name: HashMap<String, usize>,
    unknown_isps: Mutex<HashMap<String, Arc<Isp>>>,
}

impl Catalog {
    /// Starts a programmatic catalog.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn country(&self, idx: CountryIdx) -> Option<&Country> {
        self.countries.get(idx.0 as usize)
    }

    pub fn subdivision(&self, idx: SubdivisionIdx) -> Option<&Subdivision> {
        self.subdivisions.get(idx.0 as usize)
    }

    pub fn city(&self, idx: CityIdx) -> Option<&City> {
        self.cities.get(idx.0 as usize)
    }

    /// Finds a country by display name.
    pub fn find_country(&self, name: &str) -> Option<CountryIdx> {
        self.countries_by_name.get(name).copied()
    }

    /// Finds a subdivision by name within a country.
    pub fn find_subdivision(&self, country: CountryIdx, name: &str) -> Option<SubdivisionIdx> {
        self.country(country)?.subdivisions.get(name).copied()
    }

    /// Finds a city by name within a subdivision.
    pub fn find_city(&self, subdivision: SubdivisionIdx, name: &str) -> Option<CityIdx> {
        self.subdivision(subdivision)?.cities.get(name).copied()
    }

    /// Finds an ISP by name or alias.
    pub fn find_isp(&self, name: &str) -> Option<&Arc<Isp>> {
        self.isps_by_name.get(name).map(|&i| &self.isps[i])
    }

    pub fn country_count(&self) -> usize {
        self.countries.len()
    }

    pub fn subdivision_count(&self) -> usize {
        self.subdivisions.len()
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    pub fn isp_count(&self) -> usize {
        self.isps.len()
    }

    /// The synthetic ISP (ID 0) for a name this catalog does not know.
    pub fn unknown_isp(&self, name: &str) -> Arc<Isp> {
        let mut memo = self
            .unknown_isps
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            memo.entry(name.to_string())
                .or_insert_with(|| Arc::new(Isp::unknown(name))),
        )
    }

    /// Number of distinct unknown ISP names materialized so far.
    pub fn unknown_isp_count(&self) -> usize {
        self.unknown_isps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Incremental construction of a [`Catalog`].
///
/// Names are lookup keys: adding a second entity with an existing name
/// replaces the earlier one for lookups.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    catalog: Catalog,
}

impl CatalogBuilder {
    pub fn add_country(&mut self, id: i32, iso: Iso3166_1, name: &str) -> CountryIdx {
        let idx = CountryIdx(self.catalog.countries.len() as u32);
        self.catalog.countries.push(Country {
            id,
            iso,
            name: name.to_string(),
            subdivisions: HashMap::new(),
        });
        self.catalog.countries_by_name.insert(name.to_string(), idx);
        idx
    }

    /// Adds a subdivision under `country`, which must come from this builder.
    pub fn add_subdivision(
        &mut self,
        country: CountryIdx,
        id: i32,
        iso: &str,
        name: &str,
    ) -> SubdivisionIdx {
        let idx = SubdivisionIdx(self.catalog.subdivisions.len() as u32);
        self.catalog.subdivisions.push(Subdivision {
            id,
            iso: iso.to_string(),
            name: name.to_string(),
            country,
            cities: HashMap::new(),
        });
        if let Some(owner) = self.catalog.countries.get_mut(country.0 as usize) {
            owner.subdivisions.insert(name.to_string(), idx);
        }
        idx
    }

    /// Adds a city under `subdivision`, which must come from this builder.
    pub fn add_city(&mut self, subdivision: SubdivisionIdx, id: i32, name: &str) -> CityIdx {
        let idx = CityIdx(self.catalog.cities.len() as u32);
        self.catalog.cities.push(City {
            id,
            name: name.to_string(),
            subdivision,
        });
        if let Some(owner) = self.catalog.subdivisions.get_mut(subdivision.0 as usize) {
            owner.cities.insert(name.to_string(), idx);
        }
        idx
    }

    /// Adds an ISP reachable by its name and each alias.
    pub fn add_isp(&mut self, id: i32, name: &str, aliases: Vec<String>) -> Arc<Isp> {
        let slot = self.catalog.isps.len();
        let isp = Arc::new(Isp {
            id,
            name: name.to_string(),
            aliases,
        });
        self.catalog.isps_by_name.insert(name.to_string(), slot);
        for alias in &isp.aliases {
            self.catalog.isps_by_name.insert(alias.clone(), slot);
        }
        self.catalog.isps.push(Arc::clone(&isp));
        isp
    }

    pub fn build(self) -> Catalog {
        self.catalog
    }
}
