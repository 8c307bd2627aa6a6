//! Scan-cache overlap sharing across project scopes, refcount pairing and
//! disk persistence.

use std::path::Path;

use groovy_language_server::classpath::scan_cache::{ScanCacheConfig, SharedScanCache};
use groovy_language_server::classpath::test_support::write_jar;
use groovy_language_server::compiler::ClassLoaderDescriptor;

fn descriptor(paths: &[&Path]) -> ClassLoaderDescriptor {
    ClassLoaderDescriptor::new(
        paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
    )
}

#[test]
fn two_scopes_share_one_scan_at_the_overlap_threshold() {
    let tmp = tempfile::tempdir().unwrap();
    let core = tmp.path().join("core.jar");
    let util = tmp.path().join("util.jar");
    let extra = tmp.path().join("extra.jar");
    let p1_code = tmp.path().join("p1-code.jar");
    let p2_code = tmp.path().join("p2-code.jar");
    for (jar, class) in [
        (&core, "core.Core"),
        (&util, "util.Util"),
        (&extra, "extra.Extra"),
        (&p1_code, "p1.Main"),
        (&p2_code, "p2.Main"),
    ] {
        write_jar(jar, &[class]);
    }
    let cache = SharedScanCache::new(ScanCacheConfig {
        cache_dir: Some(tmp.path().join(".cache")),
        ..ScanCacheConfig::default()
    });

    // p1: [core, util, extra, p1-code].
    let p1 = cache
        .acquire(&descriptor(&[&core, &util, &extra, &p1_code]))
        .expect("p1 scan");
    assert!(!p1.shared);
    assert_eq!(cache.size(), 1);

    // p2 overlaps on 3 of its 4 entries: exactly the 0.75 threshold.
    let p2 = cache
        .acquire(&descriptor(&[&core, &util, &extra, &p2_code]))
        .expect("p2 acquire");
    assert!(p2.shared, "p2 reuses p1's superset scan");
    assert_eq!(cache.size(), 1, "no second scan was admitted");

    let own = p2.own_paths.as_ref().expect("own paths for filtering");
    assert_eq!(own.len(), 4);
    for jar in [&core, &util, &extra, &p2_code] {
        let canonical = jar.canonicalize().unwrap().to_string_lossy().into_owned();
        assert!(own.contains(&canonical), "missing {canonical}");
    }

    // Balanced releases drain the refcount and close the entry.
    let key = p1.handle.key().to_string();
    cache.release(p1.handle);
    assert_eq!(cache.ref_count(&key), 1);
    cache.release(p2.handle);
    assert_eq!(cache.ref_count(&key), 0);
    assert_eq!(cache.size(), 0);
}

#[test]
fn below_threshold_overlap_scans_fresh() {
    let tmp = tempfile::tempdir().unwrap();
    let core = tmp.path().join("core.jar");
    let util = tmp.path().join("util.jar");
    let a = tmp.path().join("a.jar");
    let b = tmp.path().join("b.jar");
    let c = tmp.path().join("c.jar");
    for (jar, class) in [
        (&core, "core.Core"),
        (&util, "util.Util"),
        (&a, "a.A"),
        (&b, "b.B"),
        (&c, "c.C"),
    ] {
        write_jar(jar, &[class]);
    }
    let cache = SharedScanCache::new(ScanCacheConfig {
        cache_dir: Some(tmp.path().join(".cache")),
        ..ScanCacheConfig::default()
    });

    let first = cache
        .acquire(&descriptor(&[&core, &util, &a, &b]))
        .unwrap();
    // 2 of 4 entries overlap: 0.5 < 0.75.
    let second = cache.acquire(&descriptor(&[&core, &util, &b, &c])).unwrap();

    // b overlaps too but the candidate is judged as a whole.
    assert!(!second.shared);
    assert_eq!(cache.size(), 2);
    assert_eq!(cache.stats_snapshot().fresh_scans, 2);

    cache.release(first.handle);
    cache.release(second.handle);
}

#[test]
fn persisted_scan_is_reused_after_process_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = tmp.path().join("core.jar");
    write_jar(&jar, &["core.One", "core.Two", "core.Three"]);
    let cache_dir = tmp.path().join(".cache");

    {
        let cache = SharedScanCache::new(ScanCacheConfig {
            cache_dir: Some(cache_dir.clone()),
            ..ScanCacheConfig::default()
        });
        let result = cache.acquire(&descriptor(&[&jar])).unwrap();
        assert_eq!(result.scan.class_count, 3);
        cache.release(result.handle);
    }

    // A new cache instance stands in for a restarted process.
    let cache = SharedScanCache::new(ScanCacheConfig {
        cache_dir: Some(cache_dir),
        ..ScanCacheConfig::default()
    });
    let result = cache.acquire(&descriptor(&[&jar])).unwrap();
    assert_eq!(result.scan.class_count, 3);
    assert_eq!(cache.stats_snapshot().disk_hits, 1);
    assert_eq!(cache.stats_snapshot().fresh_scans, 0);
    cache.release(result.handle);
}

#[test]
fn reject_filter_change_invalidates_by_key() {
    let tmp = tempfile::tempdir().unwrap();
    let jar = tmp.path().join("lib.jar");
    write_jar(&jar, &["com.example.Keep", "com.megacorp.Drop"]);
    let cache = SharedScanCache::new(ScanCacheConfig {
        cache_dir: Some(tmp.path().join(".cache")),
        ..ScanCacheConfig::default()
    });
    let desc = descriptor(&[&jar]);

    let before = cache.cache_key(&desc);
    let unfiltered = cache.acquire(&desc).unwrap();
    assert_eq!(unfiltered.scan.class_count, 2);
    cache.release(unfiltered.handle);

    cache.set_extra_reject_packages(vec!["com.megacorp".to_string()]);
    assert_ne!(cache.cache_key(&desc), before);

    let filtered = cache.acquire(&desc).unwrap();
    assert_eq!(filtered.scan.class_count, 1);
    assert_eq!(
        filtered.scan.symbols[0].fully_qualified_name,
        "com.example.Keep"
    );
    cache.release(filtered.handle);
}
