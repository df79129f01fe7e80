use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tracing::{info, warn};

use crate::reconciler::EditReconciler;
use crate::scheduler::Scheduler;

/// Register the heartbeat and, when a retention window is configured, the
/// pruning of stale tracked signals.
pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    reconciler: Arc<EditReconciler>,
    retention_hours: Option<u64>,
) -> anyhow::Result<()> {
    let tracked = Arc::clone(&reconciler);
    scheduler
        .add_cron_job("0 0 * * * *", "heartbeat", move || {
            let tracked = Arc::clone(&tracked);
            Box::pin(async move {
                info!("Heartbeat: relay is alive, {} signals tracked", tracked.len());
            })
        })
        .await?;

    let Some(hours) = retention_hours else {
        info!("Signal retention unbounded; pruning disabled");
        return Ok(());
    };

    scheduler
        .add_cron_job("0 */15 * * * *", "prune-signals", move || {
            let reconciler = Arc::clone(&reconciler);
            Box::pin(async move {
                prune(&reconciler, hours);
            })
        })
        .await?;

    Ok(())
}

fn prune(reconciler: &EditReconciler, retention_hours: u64) -> usize {
    if reconciler.is_empty() {
        return 0;
    }
    let cutoff = i64::try_from(retention_hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .and_then(|window| Utc::now().checked_sub_signed(window));
    let Some(cutoff) = cutoff else {
        warn!("Retention of {}h is out of range; skipping prune", retention_hours);
        return 0;
    };
    let removed = reconciler.prune_older_than(cutoff);
    if removed > 0 {
        info!("Pruned {} tracked signals older than {}h", removed, retention_hours);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::MessageKey;

    #[test]
    fn test_prune_keeps_recent_signals() {
        let reconciler = EditReconciler::new();
        reconciler.observe_new(MessageKey::new(-100, 1), "XAUUSD buy 1950");
        assert_eq!(prune(&reconciler, 1), 0);
        assert_eq!(reconciler.len(), 1);
    }

    #[test]
    fn test_prune_out_of_range_retention_removes_nothing() {
        let reconciler = EditReconciler::new();
        reconciler.observe_new(MessageKey::new(-100, 1), "XAUUSD buy 1950");
        assert_eq!(prune(&reconciler, u64::MAX), 0);
        assert_eq!(prune(&reconciler, 3_000_000_000), 0);
        assert_eq!(reconciler.len(), 1);
    }

    #[tokio::test]
    async fn test_register_with_and_without_retention() {
        let scheduler = Scheduler::new().await.unwrap();
        let reconciler = Arc::new(EditReconciler::new());
        register_builtin_tasks(&scheduler, Arc::clone(&reconciler), None)
            .await
            .unwrap();
        register_builtin_tasks(&scheduler, reconciler, Some(24))
            .await
            .unwrap();
    }
}
