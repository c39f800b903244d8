use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{BookingError, Engine};

/// Background task that compacts the journal once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = maybe_compact(&engine, threshold).await {
            warn!("journal compaction failed: {e}");
        }
    }
}

/// Compact if at least `threshold` appends happened since the last compaction.
/// Returns whether a compaction ran.
pub async fn maybe_compact(engine: &Engine, threshold: u64) -> Result<bool, BookingError> {
    let appends = engine.journal_appends_since_compact().await;
    if appends == 0 || appends < threshold {
        debug!(appends, threshold, "compaction skipped");
        return Ok(false);
    }
    engine.compact_journal().await?;
    info!(appends, "compacted journal");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_journal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roombook_test_maintenance");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    /// 2025-01-06 09:00 UTC
    const START: Ms = 1_736_154_000_000;

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_journal_path("threshold.journal");
        let engine = Engine::open(path, Arc::new(NotifyHub::new())).unwrap();

        assert!(!maybe_compact(&engine, 3).await.unwrap());

        let rid = Ulid::new();
        engine.create_room(Room::new(rid, "Quiet room", 2)).await.unwrap();
        let req = BookingRequest::new(rid, START, START + HOUR_MS, "Focus", "Ari");
        engine.book(req).await.unwrap();
        assert!(!maybe_compact(&engine, 3).await.unwrap());
        assert_eq!(engine.journal_appends_since_compact().await, 2);

        let req = BookingRequest::new(rid, START + HOUR_MS, START + 2 * HOUR_MS, "Focus", "Ari");
        engine.book(req).await.unwrap();
        assert!(maybe_compact(&engine, 3).await.unwrap());
        assert_eq!(engine.journal_appends_since_compact().await, 0);
        assert_eq!(engine.reservations(rid).await.len(), 2);
    }

    #[tokio::test]
    async fn background_compactor_runs_on_interval() {
        let path = test_journal_path("background.journal");
        let engine = Arc::new(Engine::open(path, Arc::new(NotifyHub::new())).unwrap());
        engine.create_room(Room::new(Ulid::new(), "Loft", 6)).await.unwrap();

        assert_eq!(engine.journal_appends_since_compact().await, 1);

        let task = tokio::spawn(run_compactor(engine.clone(), 1, Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.journal_appends_since_compact().await, 0);
        task.abort();
    }
}
