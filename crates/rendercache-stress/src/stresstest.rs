use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use sentry::SentryFutureExt;
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use rendercache::RendererImageProvider;
use rendercache::config::Config as RenderCacheConfig;
use rendercache_test::TestRenderer;

use crate::workloads::{KeySpace, WorkloadsConfig, process_request};

pub async fn perform_stresstest(
    config: RenderCacheConfig,
    workloads: WorkloadsConfig,
    duration: Duration,
) -> Result<()> {
    let runtime = tokio::runtime::Handle::current();

    // initialize workloads, each with its own provider
    let workloads: Vec<_> = workloads
        .workloads
        .into_iter()
        .enumerate()
        .map(|(i, workload)| {
            let provider = RendererImageProvider::new(
                &format!("workload-{i}"),
                config.caches.renders,
                TestRenderer::new(workload.render_time),
                runtime.clone(),
            );
            let keys = Arc::new(KeySpace::new(i, workload.keys));
            (workload.concurrency, provider, keys)
        })
        .collect();

    // run the workloads concurrently
    let mut tasks = Vec::with_capacity(workloads.len());
    for (concurrency, provider, keys) in workloads.into_iter() {
        let start = Instant::now();
        let deadline = tokio::time::Instant::from_std(start + duration);

        let task = tokio::spawn(async move {
            let task_durations = Arc::new(Mutex::new(DDSketch::default()));
            let cache_hits = Arc::new(AtomicUsize::new(0));
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
                        let provider = provider.clone();
                        let keys = Arc::clone(&keys);
                        let task_durations = Arc::clone(&task_durations);
                        let cache_hits = Arc::clone(&cache_hits);
                        let task_start = Instant::now();

                        let hub = sentry::Hub::new_from_top(sentry::Hub::current());
                        let ctx = sentry::TransactionContext::new("stresstest", "stresstest");
                        let transaction = hub.start_transaction(ctx);

                        let future = async move {
                            if process_request(&provider, &keys).await {
                                cache_hits.fetch_add(1, Ordering::Relaxed);
                            }

                            transaction.finish();

                            if let Ok(mut task_durations) = task_durations.lock() {
                                task_durations.add(task_start.elapsed().as_secs_f64());
                            }

                            drop(permit);
                        };
                        let future = future.bind_hub(hub);

                        tokio::spawn(future);
                    }
                    _ = &mut sleep => {
                        break;
                    }
                }
            }

            // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
            let _permits = semaphore.acquire_many(concurrency as u32).await;

            let task_durations: DDSketch = match task_durations.lock() {
                Ok(mut task_durations) => std::mem::take(&mut *task_durations),
                Err(_) => DDSketch::default(),
            };
            let computations = provider.renderer().computations();

            (
                concurrency,
                task_durations,
                cache_hits.load(Ordering::Relaxed),
                computations,
            )
        });
        tasks.push(task);
    }

    let finished_tasks = futures::future::join_all(tasks).await;

    for (i, task) in finished_tasks.into_iter().enumerate() {
        let (concurrency, task_durations, cache_hits, computations) = task?;

        let ops = task_durations.count();
        let ops_ps = ops as f32 / duration.as_secs_f32();
        println!("Workload {i} (concurrency: {concurrency}): {ops} operations, {ops_ps:.2} ops/s");
        println!("  {ops} requests; {computations} renders; {cache_hits} cache hits");

        if ops == 0 {
            continue;
        }
        let quantile = |q| {
            let value = task_durations.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(value)
        };
        let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
        let (p50, p90, p99) = (quantile(0.5), quantile(0.9), quantile(0.99));
        println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
    }

    Ok(())
}
