//! The live-refreshing lookup engine.
//!
//! [`GeoIsp`] owns the published [`RangeIndex`] generation and a background
//! task that watches the database source. Lookups take a single atomic load
//! of the current generation and never block; a refresh builds a fresh index
//! off the read path and publishes it with one atomic store.

mod result;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwapOption;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::config::{Config, RefreshObserver};
use crate::database::Checksum;
use crate::error_handling::{InitError, LookupError, RefreshError};
use crate::index::{IndexOptions, RangeIndex};
use crate::refresh::{effective_interval, load_index, Source, SourceChange};
use crate::resolver::RecordResolver;

pub use result::GeoIspResult;

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing published yet.
    Uninitialized,
    /// A load or refresh cycle is running.
    Loading,
    /// An index is published and no cycle is running.
    Ready,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Loading,
            2 => EngineState::Ready,
            _ => EngineState::Uninitialized,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EngineState::Uninitialized => 0,
            EngineState::Loading => 1,
            EngineState::Ready => 2,
        }
    }
}

/// Successful outcome of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new generation was published.
    Reloaded { generation: u64, checksum: Checksum },
    /// The source holds what is already published.
    Unmodified,
}

/// Reported to the [`RefreshObserver`] after every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshEvent {
    /// Generation published after the cycle
    pub generation: u64,
    /// Outcome, or the error message of a failed cycle
    pub outcome: Result<RefreshOutcome, String>,
}

/// State shared between the engine handle and its background task.
struct Shared {
    current: ArcSwapOption<RangeIndex>,
    state: AtomicU8,
    resolver: Arc<RecordResolver>,
    source: tokio::sync::Mutex<Source>,
    min_binary_search_range: usize,
    poll_interval: Duration,
    /// Run a cycle as soon as the task starts instead of after one interval
    check_on_start: bool,
    refresh_observer: Option<RefreshObserver>,
}

impl Shared {
    fn set_state(&self, state: EngineState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Ready when something is published, otherwise back to uninitialized.
    fn settle_state(&self) {
        let state = if self.current.load().is_some() {
            EngineState::Ready
        } else {
            EngineState::Uninitialized
        };
        self.set_state(state);
    }

    fn published_checksum(&self) -> Option<Checksum> {
        self.current.load_full().map(|index| *index.checksum())
    }

    fn published_generation(&self) -> u64 {
        self.current
            .load_full()
            .map_or(0, |index| index.generation())
    }

    /// Loads the local file and publishes it unless its content is already live.
    async fn reload(
        &self,
        source: &mut Source,
        modified: Option<SystemTime>,
    ) -> Result<RefreshOutcome, RefreshError> {
        let generation = self.published_generation() + 1;
        let index = load_index(
            source.local_path(),
            source.format(),
            Arc::clone(&self.resolver),
            IndexOptions {
                min_binary_search_range: self.min_binary_search_range,
                generation,
            },
        )
        .await?;
        source.mark_loaded(modified);

        let checksum = *index.checksum();
        if self.published_checksum() == Some(checksum) {
            log::debug!("Database content unchanged ({}), keeping generation", checksum);
            return Ok(RefreshOutcome::Unmodified);
        }

        let ranges = index.len();
        self.current.store(Some(Arc::new(index)));
        log::info!(
            "Published database generation {} ({} ranges, {})",
            generation,
            ranges,
            checksum.validator()
        );
        Ok(RefreshOutcome::Reloaded {
            generation,
            checksum,
        })
    }

    /// Fetches a missing local file if needed, then loads it.
    async fn first_load(&self, source: &mut Source) -> Result<RefreshOutcome, RefreshError> {
        source.ensure_local().await?;
        let modified = source.local_mtime().await;
        self.reload(source, modified).await
    }

    /// One check-and-reload pass against the source.
    async fn cycle(&self) -> Result<RefreshOutcome, RefreshError> {
        let mut source = self.source.lock().await;
        self.set_state(EngineState::Loading);
        let published = self.published_checksum();
        let result = match source.check(published.as_ref()).await {
            Ok(SourceChange::Unchanged) => Ok(RefreshOutcome::Unmodified),
            Ok(SourceChange::Changed { modified }) => self.reload(&mut source, modified).await,
            Err(e) => Err(e),
        };
        self.settle_state();
        result
    }

    /// Runs a cycle, then logs and reports its outcome.
    async fn cycle_and_report(&self) -> Result<RefreshOutcome, RefreshError> {
        let result = self.cycle().await;
        match &result {
            Ok(RefreshOutcome::Unmodified) => log::debug!("Database unmodified"),
            Ok(RefreshOutcome::Reloaded { .. }) => {}
            Err(e) => log::warn!("Database refresh failed, keeping current index: {}", e),
        }
        if let Some(observer) = &self.refresh_observer {
            observer.notify(&RefreshEvent {
                generation: self.published_generation(),
                outcome: result.as_ref().copied().map_err(|e| e.to_string()),
            });
        }
        result
    }
}

/// IPv4 geolocation and ISP lookup engine with live refresh.
///
/// # Examples
///
/// ```no_run
/// use geoisp::{Config, GeoIsp};
/// use std::net::Ipv4Addr;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = GeoIsp::new(Config::default())?;
/// engine.initialize().await?;
///
/// let result = engine.lookup(Ipv4Addr::new(58, 32, 10, 5))?;
/// println!("{}", result);
///
/// engine.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct GeoIsp {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    auto_start: bool,
}

impl GeoIsp {
    /// Creates an engine, loading the catalog from `config.catalog_path` or the built-in world.
    pub fn new(config: Config) -> Result<Self, InitError> {
        let catalog = match &config.catalog_path {
            Some(path) => Catalog::from_path(path)?,
            None => Catalog::builtin()?,
        };
        GeoIsp::with_catalog(config, Arc::new(catalog))
    }

    /// Creates an engine over an existing catalog.
    pub fn with_catalog(config: Config, catalog: Arc<Catalog>) -> Result<Self, InitError> {
        let source = Source::new(&config)?;
        let resolver = RecordResolver::new(catalog)
            .retain_unknown_isps(config.retain_unknown_isps)
            .with_observer(config.unknown_observer.clone());

        Ok(GeoIsp {
            shared: Arc::new(Shared {
                current: ArcSwapOption::empty(),
                state: AtomicU8::new(EngineState::Uninitialized.as_u8()),
                resolver: Arc::new(resolver),
                source: tokio::sync::Mutex::new(source),
                min_binary_search_range: config.min_binary_search_range,
                poll_interval: effective_interval(config.poll_interval),
                check_on_start: config.remote.is_some(),
                refresh_observer: config.refresh_observer,
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            auto_start: config.auto_start,
        })
    }

    /// Performs the first load and starts the refresh task when auto-start is set.
    ///
    /// A missing local file is downloaded from the remote first.
    pub async fn initialize(&self) -> Result<(), InitError> {
        let shared = &self.shared;
        {
            let mut source = shared.source.lock().await;
            if shared.current.load().is_some() {
                return Err(InitError::AlreadyInitialized);
            }
            log::info!("Initializing from {}", source.describe());

            shared.set_state(EngineState::Loading);
            let loaded = shared.first_load(&mut source).await;
            shared.settle_state();
            loaded?;
        }

        if self.auto_start {
            self.start();
        }
        Ok(())
    }

    /// Starts the background refresh task if it is not running.
    ///
    /// Must be called within a Tokio runtime. Has no effect after [`shutdown`](Self::shutdown).
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) || self.cancel.is_cancelled()
        {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(run_refresh_task(shared, cancel)));
    }

    /// Looks up the record covering `ip`.
    pub fn lookup(&self, ip: Ipv4Addr) -> Result<GeoIspResult, LookupError> {
        let index = self
            .shared
            .current
            .load_full()
            .ok_or(LookupError::NotInitialized)?;
        let position = index.position(u32::from(ip))?;
        Ok(GeoIspResult::new(index, position))
    }

    /// Like [`lookup`](Self::lookup); IPv4-mapped IPv6 addresses are accepted, other IPv6 is invalid.
    pub fn lookup_ip(&self, ip: IpAddr) -> Result<GeoIspResult, LookupError> {
        match ip {
            IpAddr::V4(v4) => self.lookup(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.lookup(v4),
                None => Err(LookupError::InvalidKey(ip)),
            },
        }
    }

    /// Runs one refresh cycle now, serialized with the background task.
    pub async fn refresh_now(&self) -> Result<RefreshOutcome, RefreshError> {
        self.shared.cycle_and_report().await
    }

    /// Stops the background task; lookups keep serving the last generation.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Refresh task ended abnormally: {}", e);
            }
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Checksum of the published generation.
    pub fn checksum(&self) -> Option<Checksum> {
        self.shared.published_checksum()
    }

    /// Published generation number; 0 before the first load.
    pub fn generation(&self) -> u64 {
        self.shared.published_generation()
    }

    /// The published index, for batch work against one consistent generation.
    pub fn snapshot(&self) -> Option<Arc<RangeIndex>> {
        self.shared.current.load_full()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.shared.resolver.catalog()
    }
}

impl Drop for GeoIsp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for GeoIsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoIsp")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("checksum", &self.checksum())
            .field("poll_interval", &self.shared.poll_interval)
            .finish()
    }
}

/// Sleeps for the poll interval and runs a cycle, until cancelled.
///
/// A remote source is checked once before the first sleep, since the mirror
/// may have moved on while the local copy sat on disk.
async fn run_refresh_task(shared: Arc<Shared>, cancel: CancellationToken) {
    log::info!(
        "Refresh task started ({}s interval)",
        shared.poll_interval.as_secs()
    );
    let mut sleep_first = !shared.check_on_start;
    loop {
        if sleep_first {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(shared.poll_interval) => {}
            }
        }
        sleep_first = true;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.cycle_and_report() => {}
        }
    }
    // A cycle dropped mid-flight may have left the state at Loading
    shared.settle_state();
    log::info!("Refresh task stopped");
}
