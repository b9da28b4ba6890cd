#![allow(dead_code)]

pub use jobgraph_test_utils::*;

use jobgraph::config::EngineConfig;
use jobgraph::engine::JobEngine;

/// Engine with small pools and a short shutdown timeout.
pub fn engine(job_pool_size: usize, task_pool_size: usize) -> JobEngine {
    JobEngine::new(EngineConfig {
        job_pool_size,
        task_pool_size,
        shutdown_timeout_secs: 5,
    })
}

/// Poll `check` until it returns `true`, panicking after five seconds.
///
/// Task change listeners run off the scheduling loop, so their effects can
/// trail `wait_for_completion` slightly.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    with_timeout(async {
        while !check() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
}
