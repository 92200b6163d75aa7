use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manager::PartitionManager;
use crate::types::{Checkpoint, PartitionOwnership};
use crate::util;

type Key = (String, String, String);

/// In-process [`PartitionManager`] backed by a map and a monotonically
/// increasing eTag counter.
///
/// eTag mismatch means no write: a losing claim is silently dropped from
/// the `claim_ownership` result, and a stale conditional checkpoint fails
/// with [`Error::Conflict`]. Checkpoints fold the position into the
/// ownership record itself, so a checkpoint also refreshes the owner's
/// lease.
#[derive(Default)]
pub struct InMemoryPartitionManager {
    records: Mutex<HashMap<Key, PartitionOwnership>>,
    etag_counter: AtomicU64,
}

impl InMemoryPartitionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_etag(&self) -> String {
        (self.etag_counter.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

fn key_of(ownership: &PartitionOwnership) -> Key {
    (
        ownership.event_hub_name.clone(),
        ownership.consumer_group_name.clone(),
        ownership.partition_id.clone(),
    )
}

#[async_trait]
impl PartitionManager for InMemoryPartitionManager {
    async fn list_ownership(
        &self,
        event_hub_name: &str,
        consumer_group_name: &str,
    ) -> Result<Vec<PartitionOwnership>> {
        let records = self.records.lock().await;
        Ok(records
            .values()
            .filter(|o| {
                o.event_hub_name == event_hub_name && o.consumer_group_name == consumer_group_name
            })
            .cloned()
            .collect())
    }

    async fn claim_ownership(
        &self,
        requests: Vec<PartitionOwnership>,
    ) -> Result<Vec<PartitionOwnership>> {
        let mut records = self.records.lock().await;
        let mut committed = Vec::with_capacity(requests.len());

        for mut request in requests {
            let key = key_of(&request);
            let accepted = match records.get(&key) {
                None => request.etag.is_none(),
                Some(stored) => stored.etag == request.etag && request.etag.is_some(),
            };
            if !accepted {
                debug!(
                    partition_id = %request.partition_id,
                    owner_id = %request.owner_id,
                    "claim rejected, etag is stale"
                );
                continue;
            }

            request.etag = Some(self.next_etag());
            request.last_modified_time_ms = util::now_millis();
            records.insert(key, request.clone());
            committed.push(request);
        }

        Ok(committed)
    }

    async fn update_checkpoint(&self, checkpoint: Checkpoint) -> Result<String> {
        let key = (
            checkpoint.event_hub_name.clone(),
            checkpoint.consumer_group_name.clone(),
            checkpoint.partition_id.clone(),
        );
        let mut records = self.records.lock().await;
        let stored = records.get_mut(&key).ok_or_else(|| {
            Error::NotFound(format!(
                "ownership for partition {}",
                checkpoint.partition_id
            ))
        })?;

        if checkpoint.etag.is_some() && stored.etag != checkpoint.etag {
            return Err(Error::Conflict {
                partition_id: checkpoint.partition_id,
            });
        }

        let etag = self.next_etag();
        stored.offset = Some(checkpoint.offset);
        stored.sequence_number = Some(checkpoint.sequence_number);
        stored.etag = Some(etag.clone());
        stored.last_modified_time_ms = util::now_millis();
        Ok(etag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(partition_id: &str, owner_id: &str, etag: Option<&str>) -> PartitionOwnership {
        PartitionOwnership {
            event_hub_name: "orders".to_string(),
            consumer_group_name: "$default".to_string(),
            partition_id: partition_id.to_string(),
            owner_id: owner_id.to_string(),
            owner_level: 0,
            offset: None,
            sequence_number: None,
            last_modified_time_ms: 0,
            etag: etag.map(|e| e.to_string()),
        }
    }

    #[tokio::test]
    async fn first_claim_without_etag_succeeds() {
        let store = InMemoryPartitionManager::new();
        let committed = store
            .claim_ownership(vec![request("0", "processor-a", None)])
            .await
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert!(committed[0].etag.is_some());
        assert!(committed[0].last_modified_time_ms > 0);
    }

    #[tokio::test]
    async fn first_claim_with_etag_is_rejected() {
        let store = InMemoryPartitionManager::new();
        let committed = store
            .claim_ownership(vec![request("0", "processor-a", Some("1"))])
            .await
            .unwrap();
        assert!(committed.is_empty());
        assert!(store
            .list_ownership("orders", "$default")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn stale_etag_claim_is_a_noop() {
        let store = InMemoryPartitionManager::new();
        let first = store
            .claim_ownership(vec![request("0", "processor-a", None)])
            .await
            .unwrap()
            .remove(0);

        // A second claim with the current etag wins and bumps the etag.
        let second = store
            .claim_ownership(vec![request("0", "processor-b", first.etag.as_deref())])
            .await
            .unwrap()
            .remove(0);
        assert_ne!(first.etag, second.etag);

        // Replaying the now-stale request must fail and leave the record
        // untouched.
        let replay = store
            .claim_ownership(vec![request("0", "processor-b", first.etag.as_deref())])
            .await
            .unwrap();
        assert!(replay.is_empty());

        let stored = store
            .list_ownership("orders", "$default")
            .await
            .unwrap()
            .remove(0);
        assert_eq!(stored.owner_id, "processor-b");
        assert_eq!(stored.etag, second.etag);
    }

    #[tokio::test]
    async fn claim_commits_only_the_winning_subset() {
        let store = InMemoryPartitionManager::new();
        store
            .claim_ownership(vec![request("0", "processor-a", None)])
            .await
            .unwrap();

        let committed = store
            .claim_ownership(vec![
                request("0", "processor-b", None), // record exists, no etag
                request("1", "processor-b", None),
            ])
            .await
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].partition_id, "1");
    }

    #[tokio::test]
    async fn checkpoint_updates_position_and_refreshes_lease() {
        let store = InMemoryPartitionManager::new();
        let claimed = store
            .claim_ownership(vec![request("1", "processor-a", None)])
            .await
            .unwrap()
            .remove(0);

        let etag = store
            .update_checkpoint(Checkpoint {
                event_hub_name: "orders".to_string(),
                consumer_group_name: "$default".to_string(),
                owner_id: "processor-a".to_string(),
                partition_id: "1".to_string(),
                offset: 2048,
                sequence_number: 42,
                etag: None,
            })
            .await
            .unwrap();
        assert_ne!(Some(etag.clone()), claimed.etag);

        let stored = store
            .list_ownership("orders", "$default")
            .await
            .unwrap()
            .remove(0);
        assert_eq!(stored.offset, Some(2048));
        assert_eq!(stored.sequence_number, Some(42));
        assert_eq!(stored.etag, Some(etag));
    }

    #[tokio::test]
    async fn conditional_checkpoint_with_stale_etag_conflicts() {
        let store = InMemoryPartitionManager::new();
        let claimed = store
            .claim_ownership(vec![request("1", "processor-a", None)])
            .await
            .unwrap()
            .remove(0);

        let mut checkpoint = Checkpoint {
            event_hub_name: "orders".to_string(),
            consumer_group_name: "$default".to_string(),
            owner_id: "processor-a".to_string(),
            partition_id: "1".to_string(),
            offset: 100,
            sequence_number: 10,
            etag: claimed.etag,
        };
        store.update_checkpoint(checkpoint.clone()).await.unwrap();

        // Same etag again: the first write bumped it, so this is stale.
        checkpoint.offset = 200;
        let err = store.update_checkpoint(checkpoint).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let stored = store
            .list_ownership("orders", "$default")
            .await
            .unwrap()
            .remove(0);
        assert_eq!(stored.offset, Some(100));
    }

    #[tokio::test]
    async fn checkpoint_without_ownership_is_not_found() {
        let store = InMemoryPartitionManager::new();
        let err = store
            .update_checkpoint(Checkpoint {
                event_hub_name: "orders".to_string(),
                consumer_group_name: "$default".to_string(),
                owner_id: "processor-a".to_string(),
                partition_id: "9".to_string(),
                offset: 0,
                sequence_number: 0,
                etag: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn list_ownership_filters_by_hub_and_group() {
        let store = InMemoryPartitionManager::new();
        let mut other_hub = request("0", "processor-a", None);
        other_hub.event_hub_name = "payments".to_string();
        store
            .claim_ownership(vec![request("0", "processor-a", None), other_hub])
            .await
            .unwrap();

        let orders = store.list_ownership("orders", "$default").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].event_hub_name, "orders");
    }
}
