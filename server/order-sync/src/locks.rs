//! Per-partition mutual exclusion between sync jobs and cleanup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::record::PartitionKey;

/// Shared between the sync engine and the integrity validator so that a
/// partition is never synced and cleaned up at the same time.
#[derive(Debug, Clone, Default)]
pub struct PartitionLocks {
  inner: Arc<Mutex<HashMap<PartitionKey, Arc<AsyncMutex<()>>>>>,
}

impl PartitionLocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn lock(&self, key: &PartitionKey) -> OwnedMutexGuard<()> {
    let slot = {
      let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
      map.entry(key.clone()).or_default().clone()
    };
    slot.lock_owned().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn same_partition_serialises() {
    let locks = PartitionLocks::new();
    let key = PartitionKey::new("Brand", "SG");
    let guard = locks.lock(&key).await;

    let contender = {
      let locks = locks.clone();
      let key = key.clone();
      tokio::spawn(async move {
        let _g = locks.lock(&key).await;
      })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!contender.is_finished());
    drop(guard);
    contender.await.unwrap();
  }

  #[tokio::test]
  async fn different_partitions_do_not_block() {
    let locks = PartitionLocks::new();
    let _a = locks.lock(&PartitionKey::new("Brand", "SG")).await;
    let b = tokio::time::timeout(
      Duration::from_millis(100),
      locks.lock(&PartitionKey::new("Brand", "MY")),
    )
    .await;
    assert!(b.is_ok());
  }
}
