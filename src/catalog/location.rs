//! Three-level location values.

use super::{Catalog, City, CityIdx, Country, CountryIdx, Subdivision, SubdivisionIdx};

/// The most specific level a record resolved to.
///
/// Accessors walk up the catalog back-references; a level below the
/// resolved one is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Country(CountryIdx),
    Subdivision(SubdivisionIdx),
    City(CityIdx),
}

impl Location {
    pub fn country<'c>(&self, catalog: &'c Catalog) -> Option<&'c Country> {
        let idx = match *self {
            Location::Country(idx) => idx,
            Location::Subdivision(idx) => catalog.subdivision(idx)?.country_idx(),
            Location::City(idx) => {
                let city = catalog.city(idx)?;
                catalog.subdivision(city.subdivision_idx())?.country_idx()
            }
        };
        catalog.country(idx)
    }

    pub fn subdivision<'c>(&self, catalog: &'c Catalog) -> Option<&'c Subdivision> {
        match *self {
            Location::Country(_) => None,
            Location::Subdivision(idx) => catalog.subdivision(idx),
            Location::City(idx) => catalog.subdivision(catalog.city(idx)?.subdivision_idx()),
        }
    }

    pub fn city<'c>(&self, catalog: &'c Catalog) -> Option<&'c City> {
        match *self {
            Location::City(idx) => catalog.city(idx),
            _ => None,
        }
    }
}
