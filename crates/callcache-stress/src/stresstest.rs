use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use callcache_service::caching::{CacheBackend, InMemoryBackend};
use callcache_service::config::Config;
use callcache_service::utils::futures::spawn_guarded;

use crate::workloads::{WorkloadsConfig, prepare_workload, process_payload};

pub async fn perform_stresstest(
    service_config: Config,
    workloads: WorkloadsConfig,
    duration: Duration,
) -> Result<()> {
    let backend: Arc<dyn CacheBackend> =
        Arc::new(InMemoryBackend::from_config(&service_config.caches.in_memory));
    let ttl = service_config.caches.ttl;

    // initialize workloads
    let workloads: Vec<_> = workloads
        .workloads
        .iter()
        .enumerate()
        .map(|(i, workload)| (workload.concurrency, Arc::new(prepare_workload(i, workload))))
        .collect();

    tracing::info!(
        workloads = workloads.len(),
        ?duration,
        "Starting stresstest"
    );

    // run the workloads concurrently
    let mut tasks = Vec::with_capacity(workloads.len());
    for (concurrency, workload) in workloads.into_iter() {
        let start = Instant::now();
        let deadline = tokio::time::Instant::from_std(start + duration);
        let backend = Arc::clone(&backend);

        let task = tokio::spawn(async move {
            let task_durations = Arc::new(Mutex::new(DDSketch::default()));
            let semaphore = Arc::new(Semaphore::new(concurrency));

            // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            loop {
                if deadline.elapsed() > Duration::ZERO {
                    break;
                }
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        let workload = Arc::clone(&workload);
                        let backend = Arc::clone(&backend);
                        let task_durations = Arc::clone(&task_durations);
                        let task_start = Instant::now();

                        spawn_guarded("stresstest", async move {
                            let result = process_payload(&backend, ttl, &workload).await;

                            if let Ok(mut task_durations) = task_durations.lock() {
                                task_durations.add(task_start.elapsed().as_secs_f64());
                            }

                            drop(permit);
                            result
                        });
                    }
                    _ = &mut sleep => {
                        break;
                    }
                }
            }

            let task_durations: DDSketch = match task_durations.lock() {
                Ok(mut task_durations) => std::mem::take(&mut *task_durations),
                Err(_) => DDSketch::default(),
            };

            // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
            let _permits = semaphore.acquire_many(concurrency as u32).await;
            tracing::debug!(concurrency, "Workload finished");

            (concurrency, task_durations, workload)
        });
        tasks.push(task);
    }

    let finished_tasks = futures::future::join_all(tasks).await;

    for (i, task) in finished_tasks.into_iter().enumerate() {
        let (concurrency, task_durations, workload) = task?;

        let ops = task_durations.count();
        let ops_ps = ops as f32 / duration.as_secs_f32();
        println!("Workload {i} (concurrency: {concurrency}): {ops} operations, {ops_ps:.2} ops/s");
        println!("  {}", workload.outcomes.summary());

        if ops == 0 {
            continue;
        }
        let quantile = |q| {
            let secs = task_durations.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs)
        };
        let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
        let (p50, p90, p99) = (quantile(0.5), quantile(0.9), quantile(0.99));
        println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
    }

    Ok(())
}
