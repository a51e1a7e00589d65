//! Template Cache Tests
//!
//! This test suite validates the compiled template cache:
//!
//! 1. Hit stability - unchanged files return the same compiled instance
//! 2. Staleness - a changed length or modification time recompiles exactly once
//! 3. Key isolation - work on one key never disturbs another
//! 4. Replacement - in-flight renders survive their entry being replaced
//! 5. Error isolation - failed compiles leave nothing behind
//! 6. Concurrency - concurrent misses for one key compile once
//! 7. Capacity - LRU eviction and preloading

mod common;

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use serde_json::json;

use common::*;
use templet::binding::Variables;
use templet::cache::{TemplateCache, TemplateCacheConfig, TemplatePreloader};
use templet::engine::SharedTemplate;
use templet::error::{Error, ErrorKind};
use templet::source::{FsTemplateFile, TemplateFile};

fn vars(pairs: &[(&str, serde_json::Value)]) -> Variables {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn render(template: &SharedTemplate, variables: &Variables) -> String {
    template.render_to_string(variables).unwrap()
}

// ============================================================================
// Hit Stability
// ============================================================================

mod hit_stability_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unchanged_file_returns_same_instance() {
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("greet", "Hello, ${name}!");

        let first = cache.fetch(&file).unwrap();
        let second = cache.fetch(&file).unwrap();
        let third = cache.fetch(&file).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(engine.compiles(), 1);
    }

    #[test]
    fn test_hits_are_counted() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("greet", "Hello");

        for _ in 0..5 {
            cache.fetch(&file).unwrap();
        }

        let metrics = cache.metrics();
        assert_eq!(metrics.misses.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.hits.load(Ordering::Relaxed), 4);
        assert!((metrics.hit_rate() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_same_identity_different_content_is_not_detected() {
        // The staleness test is (mtime, length) only; content is never hashed.
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("coarse", "one");
        let first = cache.fetch(&file).unwrap();

        file.rewrite_in_place("two");
        let second = cache.fetch(&file).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(render(&second, &Variables::new()), "one");
        assert_eq!(engine.compiles(), 1);
    }

    #[test]
    fn test_hit_on_real_file() {
        let tree = TemplateTree::new();
        let path = tree.write("page.tmpl", "Page ${title}");
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = FsTemplateFile::new(&path);

        let first = cache.fetch(&file).unwrap();
        let second = cache.fetch(&FsTemplateFile::new(&path)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.compiles(), 1);
        assert_eq!(
            render(&second, &vars(&[("title", json!("Intro"))])),
            "Page Intro"
        );
    }
}

// ============================================================================
// Staleness
// ============================================================================

mod staleness_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_length_change_recompiles_once() {
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("greet", "Hello, ${name}!");
        let first = cache.fetch(&file).unwrap();

        file.rewrite("Goodbye, ${name}!");
        let second = cache.fetch(&file).unwrap();
        let third = cache.fetch(&file).unwrap();

        assert_eq!(engine.compiles(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(
            render(&third, &vars(&[("name", json!("World"))])),
            "Goodbye, World!"
        );
    }

    #[test]
    fn test_mtime_change_alone_recompiles() {
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("greet", "abc");
        let first = cache.fetch(&file).unwrap();

        file.touch();
        let second = cache.fetch(&file).unwrap();

        assert_eq!(engine.compiles(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.metrics().stale.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stale_entry_counted_once_per_request() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("greet", "abc");
        cache.fetch(&file).unwrap();

        file.touch();
        cache.fetch(&file).unwrap();

        let status = cache.status();
        assert_eq!(status.stale, 1);
        assert_eq!(status.misses, 2);
        assert_eq!(status.coalesced, 0);
    }

    #[test]
    fn test_older_mtime_on_disk_is_cached() {
        let tree = TemplateTree::new();
        let path = tree.write_at("page.tmpl", "newer content", 2_000);
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = FsTemplateFile::new(&path);
        cache.fetch(&file).unwrap();

        // Restored from a backup: different content, earlier timestamp
        tree.write_at("page.tmpl", "restored", 1_000);
        let first = cache.fetch(&file).unwrap();
        let second = cache.fetch(&file).unwrap();

        assert_eq!(engine.compiles(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(render(&second, &Variables::new()), "restored");
        assert_eq!(
            cache.get(&file.key()).unwrap().snapshot(),
            file.identity().unwrap()
        );
    }

    #[test]
    fn test_older_mtime_is_cached_without_single_flight() {
        let (cache, engine) = counting_cache(TemplateCacheConfig {
            single_flight: false,
            ..Default::default()
        });
        let file = MemoryFile::new("greet", "newer content");
        file.rewrite_at("newer content", 2_000);
        cache.fetch(&file).unwrap();

        file.rewrite_at("restored", 1_000);
        let first = cache.fetch(&file).unwrap();
        let second = cache.fetch(&file).unwrap();

        assert_eq!(engine.compiles(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.get("greet").unwrap().snapshot(), file.identity().unwrap());
    }

    #[test]
    fn test_entry_snapshot_tracks_latest_compile() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("greet", "v1");
        cache.fetch(&file).unwrap();
        let before = cache.get("greet").unwrap().snapshot();

        file.rewrite("v2 longer");
        cache.fetch(&file).unwrap();
        let after = cache.get("greet").unwrap();

        assert_ne!(before, after.snapshot());
        assert_eq!(after.snapshot(), file.identity().unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_rewrite_on_disk_recompiles() {
        let tree = TemplateTree::new();
        let path = tree.write("page.tmpl", "old");
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = FsTemplateFile::new(&path);
        cache.fetch(&file).unwrap();

        tree.write("page.tmpl", "new!");
        let template = cache.fetch(&file).unwrap();

        assert_eq!(engine.compiles(), 2);
        assert_eq!(render(&template, &Variables::new()), "new!");
    }

    #[test]
    fn test_change_during_read_is_not_cached() {
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("racy", "first");
        file.rewrite_after_next_read("second version");

        let template = cache.fetch(&file).unwrap();
        assert_eq!(render(&template, &Variables::new()), "first");
        assert!(!cache.contains("racy"));

        let template = cache.fetch(&file).unwrap();
        assert_eq!(render(&template, &Variables::new()), "second version");
        assert!(cache.contains("racy"));
        assert_eq!(engine.compiles(), 2);
    }
}

// ============================================================================
// Key Isolation
// ============================================================================

mod isolation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_recompiling_one_key_keeps_the_other() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig::default());
        let a = MemoryFile::new("a", "A");
        let b = MemoryFile::new("b", "B");
        cache.fetch(&a).unwrap();
        let b_first = cache.fetch(&b).unwrap();

        a.rewrite("AA");
        cache.fetch(&a).unwrap();

        let b_second = cache.fetch(&b).unwrap();
        assert!(Arc::ptr_eq(&b_first, &b_second));
    }

    #[test]
    fn test_invalidating_one_key_keeps_the_other() {
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let a = MemoryFile::new("a", "A");
        let b = MemoryFile::new("b", "B");
        cache.fetch(&a).unwrap();
        let b_first = cache.fetch(&b).unwrap();

        assert!(cache.invalidate("a"));
        assert!(!cache.contains("a"));

        assert!(Arc::ptr_eq(&b_first, &cache.fetch(&b).unwrap()));
        assert_eq!(engine.compiles(), 2);
    }

    #[test]
    fn test_failure_on_one_key_keeps_the_other() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig::default());
        let good = MemoryFile::new("good", "fine");
        let bad = MemoryFile::new("bad", "${broken");
        let good_first = cache.fetch(&good).unwrap();

        assert!(cache.fetch(&bad).is_err());
        assert!(Arc::ptr_eq(&good_first, &cache.fetch(&good).unwrap()));
    }
}

// ============================================================================
// Replacement
// ============================================================================

mod replacement_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::sync::Mutex;
    use templet::engine::{EngineError, Template, TemplateEngine};

    /// Template that signals when rendering starts and then waits for a go.
    #[derive(Debug)]
    struct GatedTemplate {
        text: String,
        started: Mutex<mpsc::Sender<()>>,
        gate: Arc<Barrier>,
    }

    impl Template for GatedTemplate {
        fn render(&self, _vars: &Variables, out: &mut dyn io::Write) -> Result<(), EngineError> {
            self.started.lock().unwrap().send(()).ok();
            self.gate.wait();
            out.write_all(self.text.as_bytes())?;
            Ok(())
        }
    }

    struct GatedEngine {
        started: mpsc::Sender<()>,
        gate: Arc<Barrier>,
    }

    impl TemplateEngine for GatedEngine {
        fn name(&self) -> &'static str {
            "gated"
        }

        fn compile(&self, source: &str) -> Result<SharedTemplate, EngineError> {
            Ok(Arc::new(GatedTemplate {
                text: source.to_string(),
                started: Mutex::new(self.started.clone()),
                gate: Arc::clone(&self.gate),
            }))
        }
    }

    #[test]
    fn test_render_in_progress_survives_replacement() {
        let (started_tx, started_rx) = mpsc::channel();
        let gate = Arc::new(Barrier::new(2));
        let cache = Arc::new(TemplateCache::new(
            Arc::new(GatedEngine {
                started: started_tx,
                gate: Arc::clone(&gate),
            }),
            TemplateCacheConfig::default(),
        ));
        let file = MemoryFile::new("page", "old content");

        let renderer = {
            let cache = Arc::clone(&cache);
            let file = file.clone();
            thread::spawn(move || {
                let template = cache.fetch(&file).unwrap();
                template.render_to_string(&Variables::new()).unwrap()
            })
        };

        // Replace the entry while the first render is blocked mid-way.
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        file.rewrite("new content, longer");
        let replacement = cache.fetch(&file).unwrap();
        assert_eq!(cache.len(), 1);
        gate.wait();

        assert_eq!(renderer.join().unwrap(), "old content");
        assert!(Arc::ptr_eq(&replacement, &cache.get("page").unwrap().template()));
    }

    #[test]
    fn test_held_template_outlives_its_entry() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("page", "v1 ${n}");
        let old = cache.fetch(&file).unwrap();

        file.rewrite("v2 ${n}!");
        cache.fetch(&file).unwrap();
        cache.clear();

        assert_eq!(render(&old, &vars(&[("n", json!(1))])), "v1 1");
    }
}

// ============================================================================
// Error Isolation
// ============================================================================

mod error_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compile_failure_caches_nothing_and_retries() {
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("bad", "Hello, ${name");

        let err = cache.fetch(&file).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert!(!cache.contains("bad"));

        // No negative caching: the same broken source is compiled again.
        assert!(cache.fetch(&file).is_err());
        assert_eq!(engine.compiles(), 2);

        file.rewrite("Hello, ${name}");
        assert!(cache.fetch(&file).is_ok());
        assert!(cache.contains("bad"));
        assert_eq!(engine.compiles(), 3);
    }

    #[test]
    fn test_failed_recompile_removes_stale_entry() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("page", "fine");
        cache.fetch(&file).unwrap();

        file.rewrite("<% scriptlet %>");
        let err = cache.fetch(&file).unwrap_err();

        assert!(matches!(err, Error::Compile { ref template, .. } if template == "page"));
        assert!(!cache.contains("page"));
        assert_eq!(cache.metrics().compile_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_read_failure_is_a_compile_error() {
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let file = MemoryFile::new("locked", "text");
        file.set_readable(false);

        let err = cache.fetch(&file).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compile);
        assert!(err.to_string().contains("cannot read"));
        assert_eq!(engine.compiles(), 0);
        assert!(cache.is_empty());
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fetch_concurrently(
        cache: Arc<TemplateCache>,
        file: MemoryFile,
        threads: usize,
    ) -> Vec<SharedTemplate> {
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let file = file.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.fetch(&file).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_single_flight_compiles_once() {
        let engine = CountingEngine::new().with_delay(Duration::from_millis(50));
        let cache = Arc::new(TemplateCache::new(
            Arc::new(engine.clone()),
            TemplateCacheConfig::default(),
        ));

        let results = fetch_concurrently(Arc::clone(&cache), MemoryFile::new("hot", "hot"), 8);

        assert_eq!(engine.compiles(), 1);
        assert!(results.iter().all(|t| Arc::ptr_eq(t, &results[0])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_without_single_flight_results_converge() {
        let engine = CountingEngine::new().with_delay(Duration::from_millis(20));
        let cache = Arc::new(TemplateCache::new(
            Arc::new(engine.clone()),
            TemplateCacheConfig {
                single_flight: false,
                ..TemplateCacheConfig::default()
            },
        ));
        let file = MemoryFile::new("hot", "hot ${x}");

        let results = fetch_concurrently(Arc::clone(&cache), file.clone(), 8);

        assert!(engine.compiles() >= 1);
        assert_eq!(cache.len(), 1);
        let x = vars(&[("x", json!(1))]);
        assert!(results.iter().all(|t| render(t, &x) == "hot 1"));

        // After the race settles, the stored entry is what everyone gets.
        let settled = cache.fetch(&file).unwrap();
        assert!(Arc::ptr_eq(&settled, &cache.fetch(&file).unwrap()));
    }

    #[test]
    fn test_concurrent_fetches_of_distinct_keys() {
        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let file = MemoryFile::new(&format!("t{i}"), &format!("template {i}"));
                    for _ in 0..10 {
                        cache.fetch(&file).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 16);
        assert_eq!(engine.compiles(), 16);
        assert_eq!(cache.metrics().hits.load(Ordering::Relaxed), 16 * 9);
    }
}

// ============================================================================
// Capacity and Preloading
// ============================================================================

mod capacity_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bounded_cache_evicts_least_recently_used() {
        let (cache, engine) = counting_cache(TemplateCacheConfig {
            max_templates: 3,
            ..TemplateCacheConfig::default()
        });
        let files: Vec<_> = (0..4)
            .map(|i| MemoryFile::new(&format!("k{i}"), &format!("{i}")))
            .collect();

        for file in &files[..3] {
            cache.fetch(file).unwrap();
        }
        cache.fetch(&files[0]).unwrap();
        cache.fetch(&files[3]).unwrap();

        assert_eq!(cache.len(), 3);
        assert!(cache.contains("k0"));
        assert!(!cache.contains("k1"));

        // An evicted key simply recompiles.
        cache.fetch(&files[1]).unwrap();
        assert_eq!(engine.compiles(), 5);
    }

    #[test]
    fn test_unbounded_cache_keeps_everything() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig::unbounded());
        for i in 0..100 {
            cache
                .fetch(&MemoryFile::new(&format!("k{i}"), "x"))
                .unwrap();
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.metrics().evictions.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_preload_warms_the_cache() {
        let tree = TemplateTree::new();
        tree.write("index.html.tmpl", "Home");
        tree.write("blog/post.tmpl", "Post ${title}");
        tree.write("blog/broken.tmpl", "${");
        tree.write("style.css", "body {}");

        let (cache, engine) = counting_cache(TemplateCacheConfig::default());
        let report = TemplatePreloader::new(tree.root()).unwrap().preload(&cache);

        assert_eq!(report.compiled, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("blog/broken.tmpl"));
        assert_eq!(cache.len(), 2);

        // Served from the warm cache
        cache
            .fetch(&FsTemplateFile::new(tree.path("blog/post.tmpl")))
            .unwrap();
        assert_eq!(engine.compiles(), 3);
    }

    #[test]
    fn test_status_reports_configuration() {
        let (cache, _engine) = counting_cache(TemplateCacheConfig {
            max_templates: 42,
            single_flight: false,
        });
        cache.fetch(&MemoryFile::new("a", "a")).unwrap();

        let status = cache.status();
        assert_eq!(status.engine, "counting");
        assert_eq!(status.max_templates, 42);
        assert!(!status.single_flight);
        assert_eq!(status.entries, 1);
        assert_eq!(status.compilations, 1);
    }
}
