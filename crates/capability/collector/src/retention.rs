//! 读数保留期清理

use domain::now_epoch_ms;
use ems_storage::{ReadingStore, StorageError};
use ems_telemetry::record_readings_purged;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub retention_days: u64,
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            interval: Duration::from_secs(86_400),
        }
    }
}

/// 删除 `now_ms - retention_days` 之前的读数，返回删除条数。
pub async fn purge_expired_readings(
    store: &dyn ReadingStore,
    retention_days: u64,
    now_ms: i64,
) -> Result<u64, StorageError> {
    let cutoff = now_ms.saturating_sub((retention_days as i64).saturating_mul(DAY_MS));
    store.delete_readings_before(cutoff).await
}

/// 启动周期清理任务（启动后立即执行一次）。
pub fn spawn_retention_job(store: Arc<dyn ReadingStore>, config: RetentionConfig) -> JoinHandle<()> {
    let period = if config.interval.is_zero() {
        Duration::from_secs(86_400)
    } else {
        config.interval
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match purge_expired_readings(store.as_ref(), config.retention_days, now_epoch_ms()).await
            {
                Ok(purged) => {
                    record_readings_purged(purged);
                    info!(
                        target: "ems.retention",
                        purged = purged,
                        retention_days = config.retention_days,
                        "readings_purged"
                    );
                }
                Err(err) => {
                    warn!(target: "ems.retention", error = %err, "readings_purge_failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Quality, Reading};
    use ems_storage::InMemoryReadingStore;

    fn reading(point: &str, timestamp_ms: i64) -> Reading {
        Reading {
            station_id: "st-1".to_string(),
            device_id: "dev-1".to_string(),
            data_point_id: point.to_string(),
            raw_value: 1,
            value: 1.0,
            quality: Quality::Good,
            timestamp_ms,
        }
    }

    #[tokio::test]
    async fn purges_only_readings_past_retention() {
        let now_ms = 100 * DAY_MS;
        let store = InMemoryReadingStore::new();
        store
            .save_readings(&[
                reading("old", now_ms - 31 * DAY_MS),
                reading("edge", now_ms - 30 * DAY_MS),
                reading("fresh", now_ms - DAY_MS),
            ])
            .await
            .expect("seed");

        let purged = purge_expired_readings(&store, 30, now_ms)
            .await
            .expect("purge");
        assert_eq!(purged, 1);
        assert!(store.readings_for("old").is_empty());
        assert_eq!(store.len(), 2);
    }
}
