use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::domain::EnrollmentId;

/// Serializes the read-recompute-write sequence per enrollment. One instance
/// is shared by every service that writes enrollment records.
#[derive(Debug, Default)]
pub struct WriterLocks {
    slots: Mutex<HashMap<EnrollmentId, Arc<Mutex<()>>>>,
}

impl WriterLocks {
    pub async fn acquire(&self, id: &EnrollmentId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn second_writer_waits_for_the_first() {
        let locks = Arc::new(WriterLocks::default());
        let id = EnrollmentId::from("enr-1");
        let first = locks.acquire(&id).await;

        let waiting = {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("second writer proceeds")
            .expect("task completes");
    }

    #[tokio::test]
    async fn different_enrollments_do_not_contend() {
        let locks = WriterLocks::default();
        let _first = locks.acquire(&EnrollmentId::from("enr-1")).await;
        tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&EnrollmentId::from("enr-2")),
        )
        .await
        .expect("independent lock");
    }
}
