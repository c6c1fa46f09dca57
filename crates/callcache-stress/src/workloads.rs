use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use callcache_service::caching::{
    CacheBackend, CacheError, CachedCall, CallError, CallGroup, Code, Session, Status,
};
use callcache_test::{CreateDemoRequest, Demo};

#[derive(Debug, Deserialize, Serialize)]
pub struct WorkloadsConfig {
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Workload {
    pub concurrency: usize,
    /// The number of distinct requests that calls pick from.
    #[serde(default = "default_requests")]
    pub requests: usize,
    /// How long the simulated remote call takes.
    #[serde(default, with = "humantime_serde")]
    pub latency: Duration,
    /// The share of remote calls that fail, between `0` and `1`.
    #[serde(default)]
    pub error_rate: f64,
    /// Whether failures of the remote call are cached.
    #[serde(default)]
    pub cache_errors: bool,
}

fn default_requests() -> usize {
    1
}

/// The outcomes of all calls of one workload.
#[derive(Debug, Default)]
pub struct Outcomes {
    pub computations: AtomicUsize,
    pub responses: AtomicUsize,
    pub remote_errors: AtomicUsize,
    pub cached_errors: AtomicUsize,
}

impl Outcomes {
    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> String {
        format!(
            "computations: {}; responses: {}; remote errors: {}; cached errors: {}",
            Self::count(&self.computations),
            Self::count(&self.responses),
            Self::count(&self.remote_errors),
            Self::count(&self.cached_errors),
        )
    }
}

/// A [`Workload`] ready to issue calls.
pub struct PreparedWorkload {
    requests: Vec<CreateDemoRequest>,
    latency: Duration,
    error_rate: f64,
    cache_errors: bool,
    group: CallGroup<CreateDemoRequest, Demo>,
    pub outcomes: Outcomes,
}

pub fn prepare_workload(index: usize, workload: &Workload) -> PreparedWorkload {
    let requests = (0..workload.requests.max(1))
        .map(|i| CreateDemoRequest::new(format!("workload-{index}-demo-{i}")))
        .collect();

    PreparedWorkload {
        requests,
        latency: workload.latency,
        error_rate: workload.error_rate,
        cache_errors: workload.cache_errors,
        group: CallGroup::default(),
        outcomes: Outcomes::default(),
    }
}

/// Issues a single call of the workload.
///
/// Outcomes of the remote call are counted, only failures of the caching machinery are errors.
pub async fn process_payload(
    backend: &Arc<dyn CacheBackend>,
    ttl: Duration,
    workload: &Arc<PreparedWorkload>,
) -> Result<(), CacheError> {
    let request = {
        let index = rand::thread_rng().gen_range(0..workload.requests.len());
        workload.requests[index].clone()
    };

    let compute = {
        let workload = Arc::clone(workload);
        move || {
            let fail = rand::thread_rng().gen_bool(workload.error_rate.clamp(0.0, 1.0));
            async move {
                workload.outcomes.computations.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(workload.latency).await;
                if fail {
                    Err(Status::new(Code::Unavailable, "simulated failure"))
                } else {
                    Ok(Demo::named("stress"))
                }
            }
        }
    };

    let mut call = CachedCall::new(
        Arc::clone(backend),
        compute,
        Session::new(request),
        workload.group.clone(),
        ttl,
    );
    if !workload.cache_errors {
        // the simulated failures are never `NotFound`, so none of them are cached
        call = call.cacheable_errors([Status::not_found("no such demo")]);
    }

    let outcomes = &workload.outcomes;
    match call.get().await {
        Ok(_) => outcomes.responses.fetch_add(1, Ordering::Relaxed),
        Err(CallError::Remote(_)) => outcomes.remote_errors.fetch_add(1, Ordering::Relaxed),
        Err(CallError::Cached(_)) => outcomes.cached_errors.fetch_add(1, Ordering::Relaxed),
        Err(CallError::Cache(err)) => return Err(err),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workloads() {
        let yaml = r#"
            workloads:
              - concurrency: 8
              - concurrency: 64
                requests: 100
                latency: 20ms
                error_rate: 0.1
                cache_errors: true
        "#;
        let config: WorkloadsConfig = serde_yaml::from_str(yaml).unwrap();

        let defaults = &config.workloads[0];
        assert_eq!(defaults.concurrency, 8);
        assert_eq!(defaults.requests, 1);
        assert_eq!(defaults.latency, Duration::ZERO);
        assert!(!defaults.cache_errors);

        let flaky = &config.workloads[1];
        assert_eq!(flaky.requests, 100);
        assert_eq!(flaky.latency, Duration::from_millis(20));
        assert_eq!(flaky.error_rate, 0.1);
        assert!(flaky.cache_errors);
    }

    #[test]
    fn test_prepare_workload() {
        let workload = Workload {
            concurrency: 1,
            requests: 0,
            latency: Duration::ZERO,
            error_rate: 0.0,
            cache_errors: false,
        };
        let prepared = prepare_workload(3, &workload);
        assert_eq!(prepared.requests, vec![CreateDemoRequest::new("workload-3-demo-0")]);
    }
}
