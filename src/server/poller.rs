use super::Gateway;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run a dispatcher cycle every `every`. A slow cycle delays the next tick
/// rather than stacking cycles up.
pub fn spawn(gateway: Arc<Gateway>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = every.as_secs(), "approval poller started");
        loop {
            ticker.tick().await;
            let worker = Arc::clone(&gateway);
            let task = tokio::task::spawn_blocking(move || worker.dispatcher().process_pending());
            match task.await {
                Ok(Ok(results)) if results.is_empty() => {
                    tracing::debug!("poll tick: queue empty")
                }
                Ok(Ok(results)) => {
                    let failed = results.iter().filter(|result| !result.ok).count();
                    let processed = results.len();
                    tracing::info!(processed, failed, "poll tick applied approvals");
                }
                Ok(Err(err)) => {
                    let error = format!("{err:#}");
                    tracing::warn!(%error, "poll tick failed; retrying next tick")
                }
                Err(err) => {
                    tracing::warn!(error = %err, "poll task panicked; retrying next tick")
                }
            }
        }
    })
}
