// tests/warehouse_sync.rs

//! Warehouse behavior against remote stores: partial failures, the
//! optional secondary artifact, and a directory mirror wired from config.

mod common;

use common::{Fixture, FixtureLoader, toolchain};
use dynamod::layout::ArtifactLayout;
use dynamod::{Config, Error, Runtime};
use std::sync::Arc;

#[tokio::test]
async fn partial_sync_failure_leaves_nothing_behind() {
    let fixture = Fixture::new();
    let module = "default_billing_v1";
    fixture.store.put(fixture.primary_key(module), b"default_billing_v1");
    fixture.store.break_object(fixture.secondary_key(module));

    let err = fixture.warehouse.load(module).await.err().unwrap();
    assert!(matches!(err, Error::SyncFailed(_)));
    assert!(!fixture.layout.module_dir(module).exists());

    let local = fixture.warehouse.local().unwrap();
    assert!(!local.exists(module).await);
}

#[tokio::test]
async fn missing_primary_wins_over_transient_failure() {
    let fixture = Fixture::new();
    let module = "default_billing_v1";
    fixture.store.break_object(fixture.secondary_key(module));

    let err = fixture.warehouse.load(module).await.err().unwrap();
    assert!(err.is_not_found());
    assert!(!fixture.layout.module_dir(module).exists());
}

#[tokio::test]
async fn secondary_artifact_is_optional() {
    let fixture = Fixture::new();
    let module = "default_billing_v1";
    fixture.store.put(fixture.primary_key(module), b"default_billing_v1");

    let tunnel = fixture.warehouse.load(module).await.unwrap();
    assert_eq!(tunnel.invoke("x", ""), "default_billing_v1");

    let local = fixture.warehouse.local().unwrap();
    assert!(local.exists(module).await);
    let secondary = fixture
        .layout
        .artifact_path(module, &ArtifactLayout::secondary_file_name(module));
    assert!(!secondary.exists());
}

#[tokio::test]
async fn empty_local_artifact_is_fetched_again() {
    let fixture = Fixture::new();
    let module = "default_billing_v1";
    fixture.publish(module);
    std::fs::create_dir_all(fixture.layout.module_dir(module)).unwrap();
    std::fs::write(fixture.layout.primary_path(module), b"").unwrap();

    let local = fixture.warehouse.local().unwrap();
    assert!(!local.exists(module).await);

    fixture.warehouse.load(module).await.unwrap();
    let contents = std::fs::read(fixture.layout.primary_path(module)).unwrap();
    assert_eq!(contents, module.as_bytes());
}

#[tokio::test]
async fn local_module_needs_no_remote() {
    let fixture = Fixture::new();
    fixture.install_local("default_billing_v1");

    fixture.warehouse.load("default_billing_v1").await.unwrap();
    assert_eq!(fixture.store.fetches(), 0);
}

#[tokio::test]
async fn mirror_remote_from_config() {
    let warehouse_dir = tempfile::tempdir().unwrap();
    let mirror_dir = tempfile::tempdir().unwrap();

    // The mirror uses the remote key layout below its root.
    let mirror = ArtifactLayout::new(mirror_dir.path(), toolchain());
    std::fs::create_dir_all(mirror.module_dir("default_billing_v1")).unwrap();
    std::fs::write(mirror.primary_path("default_billing_v1"), "mirrored billing").unwrap();

    let config = Config::parse(&format!(
        "[warehouse]\nlocal = \"{}\"\nremote = \"file://{}\"\n\n[package]\ndefault_version = \"v1\"\n",
        warehouse_dir.path().display(),
        mirror_dir.path().display()
    ))
    .unwrap();
    let loader = Arc::new(FixtureLoader::default());
    let runtime = Runtime::with_parts(&config, toolchain(), loader.clone()).unwrap();

    let module = runtime.get_package("billing", "v3").await.unwrap();
    assert_eq!(module.invoke("x", "").unwrap(), "mirrored billing");
    assert!(runtime.registry().contains("default_billing_v1"));

    let local = ArtifactLayout::new(warehouse_dir.path(), toolchain());
    assert!(local.primary_path("default_billing_v1").exists());

    runtime.shutdown().await;
    assert_eq!(loader.created()[0].closes(), 1);
    assert!(runtime.registry().is_empty());
}
