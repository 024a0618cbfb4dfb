use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::Engine;

/// Background task that rewrites the WAL once enough appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor pass. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not due");
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!(appends, "WAL compacted");
            true
        }
        Err(e) => {
            error!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FixedClock;
    use crate::model::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap()));
        let engine = Engine::new(test_wal_path("threshold.wal"), clock).unwrap();

        let pid = Ulid::new();
        for minutes in [15, 30, 45] {
            let config = ScheduleConfig {
                appointment_duration_minutes: Some(minutes),
                timezone: Some("Europe/Berlin".into()),
                auto_confirm_appointments: false,
            };
            engine.configure_professional(pid, config).await.unwrap();
        }

        assert!(!compact_if_due(&engine, 4).await);
        assert_eq!(engine.wal_appends_since_compact().await, 3);

        assert!(compact_if_due(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        let config = engine.schedule(pid).await.unwrap();
        assert_eq!(config.appointment_duration_minutes, Some(45));
    }
}
