use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::Store;

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<Store>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// One compactor tick. True if a compaction ran and succeeded.
pub async fn compact_if_due(store: &Store, threshold: u64) -> bool {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not due");
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!(appends, "WAL compacted");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("reservo_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let store = Store::open(path.clone()).unwrap();
        let user = store
            .create_user(NewUser {
                name: "Rui".into(),
                email: "rui@example.com".into(),
            })
            .await
            .unwrap();
        for i in 0..10 {
            store
                .update_user(
                    user.id,
                    &UserPatch {
                        name: Patch::Set(format!("Rui {i}")),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        assert!(!compact_if_due(&store, 100).await);

        let before = std::fs::metadata(&path).unwrap().len();
        assert!(compact_if_due(&store, 5).await);
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");
        assert_eq!(store.wal_appends_since_compact().await, 0);

        drop(store);
        let reopened = Store::open(path).unwrap();
        assert_eq!(reopened.user(user.id).unwrap().name, "Rui 9");
    }
}
