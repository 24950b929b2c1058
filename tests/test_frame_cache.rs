mod common;

use cbersgif::core::parse_scene_id;
use cbersgif::io::cache::{decode_npy, hash_fields};
use cbersgif::io::{CacheKey, FrameCache};
use cbersgif::types::{BandMatrix, Bounds, CbersError};
use common::synthetic_band;
use std::cell::Cell;
use tempfile::TempDir;

fn sample_key() -> CacheKey {
    let scene = parse_scene_id("CBERS_4_MUX_20180911_167_114_L4").unwrap();
    CacheKey {
        source_key: format!("/vsis3/cbers-pds/{}", scene.source_key),
        band: "7".to_string(),
        scene,
        aoi_bounds: Bounds {
            minx: -4817038.883,
            miny: -2638478.3425,
            maxx: -4797038.883,
            maxy: -2618478.3425,
        },
        width: 1000,
        height: 1000,
    }
}

#[test]
fn test_cache_round_trip_is_bit_identical() {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = TempDir::new().unwrap();
    let cache = FrameCache::new(temp_dir.path());
    let key = sample_key();
    let calls = Cell::new(0);

    let first = cache
        .get_or_compute(&key, || {
            calls.set(calls.get() + 1);
            Ok(synthetic_band(7, 64, 48))
        })
        .unwrap();
    let second = cache
        .get_or_compute(&key, || {
            calls.set(calls.get() + 1);
            Ok(BandMatrix::zeros((48, 64)))
        })
        .unwrap();

    assert_eq!(calls.get(), 1, "second lookup must not recompute");
    assert_eq!(first, second);
    assert_eq!(second.dim(), (48, 64));
}

#[test]
fn test_entry_file_named_by_digest() {
    let temp_dir = TempDir::new().unwrap();
    let cache = FrameCache::new(temp_dir.path().join("nested"));
    let key = sample_key();
    let band = synthetic_band(3, 10, 5);

    cache.get_or_compute(&key, || Ok(band.clone())).unwrap();

    let digest = key.digest().unwrap();
    assert_eq!(digest.len(), 64);
    let path = cache.entry_path(&digest).unwrap();
    assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("{}.npy", digest));
    assert!(path.exists());

    let stored = decode_npy(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(stored, band);

    // No temporary files left next to the entry
    let entries = std::fs::read_dir(temp_dir.path().join("nested")).unwrap().count();
    assert_eq!(entries, 1);
}

#[test]
fn test_disabled_cache_always_computes() {
    let cache = FrameCache::disabled();
    assert!(!cache.is_enabled());
    assert!(cache.entry_path("abc").is_none());

    let key = sample_key();
    let calls = Cell::new(0);
    for _ in 0..3 {
        cache
            .get_or_compute(&key, || {
                calls.set(calls.get() + 1);
                Ok(synthetic_band(1, 4, 4))
            })
            .unwrap();
    }
    assert_eq!(calls.get(), 3);
}

#[test]
fn test_every_key_field_changes_digest() {
    let base = sample_key();
    let base_digest = base.digest().unwrap();

    let mut variants = Vec::new();

    let mut k = base.clone();
    k.source_key.push('x');
    variants.push(k);

    let mut k = base.clone();
    k.band = "6".to_string();
    variants.push(k);

    let mut k = base.clone();
    k.scene = parse_scene_id("CBERS_4_MUX_20180912_167_114_L4").unwrap();
    variants.push(k);

    let mut k = base.clone();
    k.aoi_bounds.minx += 1.0;
    variants.push(k);

    let mut k = base.clone();
    k.width = 999;
    variants.push(k);

    let mut k = base.clone();
    k.height = 999;
    variants.push(k);

    for variant in &variants {
        assert_ne!(variant.digest().unwrap(), base_digest);
    }
    assert_eq!(sample_key().digest().unwrap(), base_digest);
}

#[test]
fn test_hash_fields_ignores_order() {
    let a = hash_fields(vec![
        ("band", serde_json::json!("7")),
        ("width", serde_json::json!(1000)),
        ("scene", serde_json::json!({"path": 167, "row": 114})),
    ]);
    let b = hash_fields(vec![
        ("scene", serde_json::json!({"row": 114, "path": 167})),
        ("width", serde_json::json!(1000)),
        ("band", serde_json::json!("7")),
    ]);
    assert_eq!(a, b);
}

#[test]
fn test_failed_compute_stores_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let cache = FrameCache::new(temp_dir.path());
    let key = sample_key();

    let result = cache.get_or_compute(&key, || Err(CbersError::Raster("unreachable".to_string())));
    assert!(matches!(result, Err(CbersError::Raster(_))));

    let path = cache.entry_path(&key.digest().unwrap()).unwrap();
    assert!(!path.exists());
}

#[test]
fn test_corrupt_entry_is_recomputed() {
    let temp_dir = TempDir::new().unwrap();
    let cache = FrameCache::new(temp_dir.path());
    let key = sample_key();
    let path = cache.entry_path(&key.digest().unwrap()).unwrap();
    std::fs::write(&path, b"not an array").unwrap();

    let band = synthetic_band(2, 8, 8);
    let loaded = cache.get_or_compute(&key, || Ok(band.clone())).unwrap();
    assert_eq!(loaded, band);

    let stored = decode_npy(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(stored, band);
}
