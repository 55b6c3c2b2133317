//! Local-mode refresh: modification-time polling, republish and failure isolation.

mod helpers;

use std::net::Ipv4Addr;
use std::time::Duration;

use geoisp::{
    Checksum, Config, EngineState, GeoIsp, RefreshError, RefreshEvent, RefreshObserver,
    RefreshOutcome,
};
use helpers::{
    build_dat, bump_mtime, manual_config, sample_catalog, sample_entries, updated_entries,
    write_dat,
};
use tempfile::TempDir;

fn isp_at(engine: &GeoIsp, ip: Ipv4Addr) -> String {
    engine
        .lookup(ip)
        .expect("lookup should succeed")
        .isps()
        .iter()
        .map(|i| i.name.clone())
        .collect::<Vec<_>>()
        .join("/")
}

const SHANGHAI: Ipv4Addr = Ipv4Addr::new(58, 32, 10, 5);

#[tokio::test]
async fn test_unchanged_file_is_unmodified() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_dat(dir.path(), "ipdb.dat", &sample_entries());
    let engine =
        GeoIsp::with_catalog(manual_config(path), sample_catalog()).expect("Failed to create engine");
    engine.initialize().await.expect("Failed to initialize");

    assert_eq!(
        engine.refresh_now().await.expect("refresh should succeed"),
        RefreshOutcome::Unmodified
    );
    assert_eq!(engine.generation(), 1);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn test_newer_file_is_republished() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_dat(dir.path(), "ipdb.dat", &sample_entries());
    let engine = GeoIsp::with_catalog(manual_config(path.clone()), sample_catalog())
        .expect("Failed to create engine");
    engine.initialize().await.expect("Failed to initialize");

    let before = engine.lookup(SHANGHAI).expect("lookup should succeed");
    assert_eq!(isp_at(&engine, SHANGHAI), "ChinaNet");

    let updated = build_dat(&updated_entries());
    std::fs::write(&path, &updated).expect("Failed to rewrite database");
    bump_mtime(&path, Duration::from_secs(5));

    let outcome = engine.refresh_now().await.expect("refresh should succeed");
    assert_eq!(
        outcome,
        RefreshOutcome::Reloaded {
            generation: 2,
            checksum: Checksum::of(&updated)
        }
    );
    assert_eq!(isp_at(&engine, SHANGHAI), "Unicom");
    assert_eq!(engine.checksum(), Some(Checksum::of(&updated)));

    // A handle from the old generation keeps answering from it
    assert_eq!(before.generation(), 1);
    assert_eq!(before.isps()[0].name, "ChinaNet");
}

#[tokio::test]
async fn test_touched_file_with_same_content_keeps_generation() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_dat(dir.path(), "ipdb.dat", &sample_entries());
    let engine = GeoIsp::with_catalog(manual_config(path.clone()), sample_catalog())
        .expect("Failed to create engine");
    engine.initialize().await.expect("Failed to initialize");

    bump_mtime(&path, Duration::from_secs(5));
    assert_eq!(
        engine.refresh_now().await.expect("refresh should succeed"),
        RefreshOutcome::Unmodified
    );
    assert_eq!(engine.generation(), 1);
}

#[tokio::test]
async fn test_malformed_update_keeps_previous_index() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_dat(dir.path(), "ipdb.dat", &sample_entries());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<RefreshEvent>();
    let config = Config {
        refresh_observer: Some(RefreshObserver::new(move |event| {
            let _ = tx.send(event.clone());
        })),
        ..manual_config(path.clone())
    };
    let engine = GeoIsp::with_catalog(config, sample_catalog()).expect("Failed to create engine");
    engine.initialize().await.expect("Failed to initialize");
    let checksum = engine.checksum();

    std::fs::write(&path, b"definitely not a database").expect("Failed to corrupt database");
    bump_mtime(&path, Duration::from_secs(5));

    let err = engine.refresh_now().await.unwrap_err();
    assert!(matches!(err, RefreshError::MalformedDatabase(_)), "got: {}", err);
    assert_eq!(engine.state(), EngineState::Ready);
    assert_eq!(engine.generation(), 1);
    assert_eq!(engine.checksum(), checksum);
    assert_eq!(isp_at(&engine, SHANGHAI), "ChinaNet");

    let event = rx.recv().await.expect("observer should receive the failure");
    assert_eq!(event.generation, 1);
    assert!(event.outcome.unwrap_err().contains("Malformed database"));

    // A repaired file is picked up on the next cycle
    write_dat(dir.path(), "ipdb.dat", &updated_entries());
    bump_mtime(&path, Duration::from_secs(10));
    assert!(matches!(
        engine.refresh_now().await,
        Ok(RefreshOutcome::Reloaded { generation: 2, .. })
    ));
}

#[tokio::test]
async fn test_deleted_file_is_not_an_error() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_dat(dir.path(), "ipdb.dat", &sample_entries());
    let engine = GeoIsp::with_catalog(manual_config(path.clone()), sample_catalog())
        .expect("Failed to create engine");
    engine.initialize().await.expect("Failed to initialize");

    std::fs::remove_file(&path).expect("Failed to remove database");
    assert_eq!(
        engine.refresh_now().await.expect("refresh should succeed"),
        RefreshOutcome::Unmodified
    );
    assert_eq!(isp_at(&engine, SHANGHAI), "ChinaNet");
}

#[tokio::test]
async fn test_background_task_republishes() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_dat(dir.path(), "ipdb.dat", &sample_entries());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<RefreshEvent>();
    let config = Config {
        auto_start: true,
        poll_interval: Duration::from_millis(50),
        refresh_observer: Some(RefreshObserver::new(move |event| {
            let _ = tx.send(event.clone());
        })),
        ..manual_config(path.clone())
    };
    let engine = GeoIsp::with_catalog(config, sample_catalog()).expect("Failed to create engine");
    engine.initialize().await.expect("Failed to initialize");

    std::fs::write(&path, build_dat(&updated_entries())).expect("Failed to rewrite database");
    bump_mtime(&path, Duration::from_secs(5));

    let reloaded = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            if let Ok(RefreshOutcome::Reloaded { generation, .. }) = event.outcome {
                return generation;
            }
        }
        0
    })
    .await
    .expect("background task should republish");
    assert_eq!(reloaded, 2);
    assert_eq!(isp_at(&engine, SHANGHAI), "Unicom");

    engine.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_interrupts_long_sleep() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = write_dat(dir.path(), "ipdb.dat", &sample_entries());
    let config = Config {
        auto_start: true,
        poll_interval: Duration::from_secs(3600),
        ..manual_config(path)
    };
    let engine = GeoIsp::with_catalog(config, sample_catalog()).expect("Failed to create engine");
    engine.initialize().await.expect("Failed to initialize");

    tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
        .await
        .expect("shutdown should not wait for the poll interval");

    // Lookups keep serving the last generation
    assert_eq!(isp_at(&engine, SHANGHAI), "ChinaNet");
    assert_eq!(engine.state(), EngineState::Ready);
}
