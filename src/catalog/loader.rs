//! World CSV loading.
//!
//! Rows are headerless and of varying width:
//!
//! ```text
//! country,<id>,<alpha2>,<alpha3>,<numeric>,<name>
//! subdivision,<id>,<iso-3166-2>,<name>
//! city,<id>,<name>
//! isp,<id>,<name>[,<alias>...]
//! ```
//!
//! Subdivisions attach to the most recent country and cities to the most
//! recent subdivision. Rows with an empty first field are ignored.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use csv::StringRecord;

use super::{Catalog, CatalogBuilder, CountryIdx, Iso3166_1, SubdivisionIdx};
use crate::error_handling::CatalogError;

const BUILTIN_WORLD: &str = include_str!("../../data/world.csv");

impl Catalog {
    /// Loads the world shipped with the crate.
    pub fn builtin() -> Result<Catalog, CatalogError> {
        Catalog::from_reader(BUILTIN_WORLD.as_bytes())
    }

    /// Loads a world CSV file.
    pub fn from_path(path: &Path) -> Result<Catalog, CatalogError> {
        let content = std::fs::read(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Catalog::from_reader(content.as_slice())
    }

    /// Parses world CSV from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Catalog, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut builder = Catalog::builder();
        let mut country: Option<CountryIdx> = None;
        let mut subdivision: Option<SubdivisionIdx> = None;

        for record in csv_reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            match record.get(0).unwrap_or("") {
                "" => {}
                "country" => {
                    country = Some(parse_country(&mut builder, &record, line)?);
                    subdivision = None;
                }
                "subdivision" => {
                    let owner = country.ok_or_else(|| invalid("subdivision", line, "no preceding country"))?;
                    subdivision = Some(parse_subdivision(&mut builder, owner, &record, line)?);
                }
                "city" => {
                    let owner = subdivision
                        .ok_or_else(|| invalid("city", line, "no preceding subdivision"))?;
                    parse_city(&mut builder, owner, &record, line)?;
                }
                "isp" => parse_isp(&mut builder, &record, line)?,
                other => {
                    return Err(CatalogError::UnknownRowKind {
                        kind: other.to_string(),
                        line,
                    })
                }
            }
        }

        let catalog = builder.build();
        log::debug!(
            "Loaded world: {} countries, {} subdivisions, {} cities, {} ISPs",
            catalog.country_count(),
            catalog.subdivision_count(),
            catalog.city_count(),
            catalog.isp_count()
        );
        Ok(catalog)
    }
}

fn invalid(kind: &'static str, line: u64, reason: impl Into<String>) -> CatalogError {
    CatalogError::InvalidRow {
        kind,
        line,
        reason: reason.into(),
    }
}

fn expect_width(
    record: &StringRecord,
    kind: &'static str,
    line: u64,
    width: usize,
) -> Result<(), CatalogError> {
    if record.len() != width {
        return Err(invalid(
            kind,
            line,
            format!("expected {} fields, got {}", width, record.len()),
        ));
    }
    Ok(())
}

fn parse_number<T: FromStr>(
    record: &StringRecord,
    index: usize,
    kind: &'static str,
    line: u64,
) -> Result<T, CatalogError> {
    let raw = record.get(index).unwrap_or("");
    raw.trim()
        .parse()
        .map_err(|_| invalid(kind, line, format!("field {} is not a number: {:?}", index, raw)))
}

fn parse_country(
    builder: &mut CatalogBuilder,
    record: &StringRecord,
    line: u64,
) -> Result<CountryIdx, CatalogError> {
    expect_width(record, "country", line, 6)?;
    let id = parse_number(record, 1, "country", line)?;
    let numeric = parse_number(record, 4, "country", line)?;
    let iso = Iso3166_1 {
        alpha2: record[2].to_string(),
        alpha3: record[3].to_string(),
        numeric,
    };
    Ok(builder.add_country(id, iso, &record[5]))
}

fn parse_subdivision(
    builder: &mut CatalogBuilder,
    country: CountryIdx,
    record: &StringRecord,
    line: u64,
) -> Result<SubdivisionIdx, CatalogError> {
    expect_width(record, "subdivision", line, 4)?;
    let id = parse_number(record, 1, "subdivision", line)?;
    Ok(builder.add_subdivision(country, id, &record[2], &record[3]))
}

fn parse_city(
    builder: &mut CatalogBuilder,
    subdivision: SubdivisionIdx,
    record: &StringRecord,
    line: u64,
) -> Result<(), CatalogError> {
    expect_width(record, "city", line, 3)?;
    let id = parse_number(record, 1, "city", line)?;
    builder.add_city(subdivision, id, &record[2]);
    Ok(())
}

fn parse_isp(
    builder: &mut CatalogBuilder,
    record: &StringRecord,
    line: u64,
) -> Result<(), CatalogError> {
    if record.len() < 3 {
        return Err(invalid(
            "isp",
            line,
            format!("expected at least 3 fields, got {}", record.len()),
        ));
    }
    let id = parse_number(record, 1, "isp", line)?;
    let aliases = record
        .iter()
        .skip(3)
        .filter(|alias| !alias.is_empty())
        .map(str::to_string)
        .collect();
    builder.add_isp(id, &record[2], aliases);
    Ok(())
}
