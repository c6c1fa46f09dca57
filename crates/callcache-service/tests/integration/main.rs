use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use callcache_service::caching::{CacheBackend, InMemoryBackend};
use callcache_service::config::Config;

mod cached_call;

/// Creates a backend according to the given YAML config.
pub fn setup_backend(yaml: &str) -> (Config, Arc<dyn CacheBackend>) {
    callcache_test::setup();

    let config = Config::from_reader(yaml.as_bytes()).unwrap();
    let backend = Arc::new(InMemoryBackend::from_config(&config.caches.in_memory));
    (config, backend)
}

/// Counts the invocations of compute functions.
#[derive(Debug, Clone, Default)]
pub struct Invocations(Arc<AtomicUsize>);

impl Invocations {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
