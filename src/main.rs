//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `geoisp` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - User-facing output formatting
//!
//! All lookup and refresh functionality is implemented in the library crate.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::process;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use geoisp::catalog::{City, Country, Isp, Subdivision};
use geoisp::config::{Command, Opt};
use geoisp::initialization::init_logger_with;
use geoisp::{Config, GeoIsp, GeoIspResult, UnknownLevel, UnknownObserver};

type UnknownNames = Arc<Mutex<BTreeMap<UnknownLevel, BTreeSet<String>>>>;

/// One `locate --json` output line, carrying the catalog entities themselves.
#[derive(Debug, Serialize)]
struct LocateRecord<'a> {
    ip: String,
    country: Option<&'a Country>,
    subdivision: Option<&'a Subdivision>,
    city: Option<&'a City>,
    isps: Vec<&'a Isp>,
    range_end: String,
    generation: u64,
}

impl<'a> LocateRecord<'a> {
    fn new(ip: IpAddr, result: &'a GeoIspResult) -> Self {
        LocateRecord {
            ip: ip.to_string(),
            country: result.country(),
            subdivision: result.subdivision(),
            city: result.city(),
            isps: result.isps().iter().map(|isp| isp.as_ref()).collect(),
            range_end: std::net::Ipv4Addr::from(result.upper_bound()).to_string(),
            generation: result.generation(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    init_logger_with(opt.log_level.clone().into(), opt.log_format.clone())
        .context("Failed to initialize logger")?;

    let config = opt.to_config();
    let outcome = match opt.command {
        Command::Locate {
            json,
            report_unknowns,
        } => locate(config, json, report_unknowns).await,
        Command::Inspect => inspect(config).await,
    };

    if let Err(e) = outcome {
        eprintln!("geoisp error: {:#}", e);
        process::exit(1);
    }
    Ok(())
}

/// Resolves addresses from stdin until EOF, refreshing in the background.
async fn locate(mut config: Config, json: bool, report_unknowns: bool) -> Result<()> {
    let unknowns: UnknownNames = Arc::default();
    if report_unknowns {
        let sink = Arc::clone(&unknowns);
        config.unknown_observer = Some(UnknownObserver::new(move |level, fields| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(level)
                .or_default()
                .insert(fields.join("/"));
        }));
    }

    let engine = GeoIsp::new(config).context("Failed to create engine")?;
    engine
        .initialize()
        .await
        .context("Failed to load database")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_number += 1;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let ip: IpAddr = match input.parse() {
            Ok(ip) => ip,
            Err(_) => {
                eprintln!("line {}: invalid address {:?}", line_number, input);
                continue;
            }
        };
        match engine.lookup_ip(ip) {
            Ok(result) if json => {
                let record = LocateRecord::new(ip, &result);
                println!(
                    "{}",
                    serde_json::to_string(&record).context("Failed to serialize result")?
                );
            }
            Ok(result) => println!("{}\t{}", ip, result),
            Err(e) => eprintln!("line {}: {}", line_number, e),
        }
    }

    engine.shutdown().await;

    if report_unknowns {
        let unknowns = unknowns.lock().unwrap_or_else(PoisonError::into_inner);
        for (level, names) in unknowns.iter() {
            for name in names {
                eprintln!("unknown {}: {}", level, name);
            }
        }
    }
    Ok(())
}

/// Loads the database once and prints a summary.
async fn inspect(mut config: Config) -> Result<()> {
    config.auto_start = false;
    let local_path = config.local_path.clone();
    let engine = GeoIsp::new(config).context("Failed to create engine")?;
    engine
        .initialize()
        .await
        .with_context(|| format!("Failed to load database {}", local_path.display()))?;

    let index = engine
        .snapshot()
        .context("No database published after initialization")?;
    let catalog = engine.catalog();
    println!("Database:    {}", local_path.display());
    println!("Ranges:      {}", index.len());
    println!("Checksum:    {}", index.checksum().validator());
    println!("Generation:  {}", index.generation());
    println!(
        "World:       {} countries, {} subdivisions, {} cities, {} ISPs",
        catalog.country_count(),
        catalog.subdivision_count(),
        catalog.city_count(),
        catalog.isp_count()
    );
    Ok(())
}
