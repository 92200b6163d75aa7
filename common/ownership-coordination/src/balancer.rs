use std::collections::HashMap;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::types::PartitionOwnership;
use crate::util;

const DEFAULT_INACTIVE_TIME_LIMIT: Duration = Duration::from_secs(60);

/// Pure decision function for the decentralized ownership control loop.
///
/// Given an ownership snapshot and the full partition id set, picks at most
/// one partition for this processor to claim. Claiming one partition per
/// tick converges the fleet gradually instead of thundering the store, and
/// random tie-breaking keeps processors that observe the same snapshot from
/// all targeting the same partition.
///
/// An ownership record older than the inactive time limit is treated as
/// abandoned; that expiry is the sole failure-detection signal.
pub struct PartitionLoadBalancer {
    owner_id: String,
    inactive_time_limit: Duration,
}

impl PartitionLoadBalancer {
    pub fn new(owner_id: impl Into<String>, inactive_time_limit: Duration) -> Self {
        Self {
            owner_id: owner_id.into(),
            inactive_time_limit,
        }
    }

    pub fn with_default_time_limit(owner_id: impl Into<String>) -> Self {
        Self::new(owner_id, DEFAULT_INACTIVE_TIME_LIMIT)
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Pick at most one partition to claim, or `None` when this processor
    /// already holds its fair share (or nothing is claimable).
    pub fn load_balance(
        &self,
        current_ownership: &HashMap<String, PartitionOwnership>,
        partition_ids: &[String],
    ) -> Option<String> {
        if partition_ids.is_empty() {
            return None;
        }

        let now = util::now_millis();
        let limit_ms = self.inactive_time_limit.as_millis() as i64;
        let is_active =
            |ownership: &PartitionOwnership| now - ownership.last_modified_time_ms <= limit_ms;

        let mut owner_counts: HashMap<&str, usize> = HashMap::new();
        for ownership in current_ownership.values().filter(|o| is_active(o)) {
            *owner_counts.entry(ownership.owner_id.as_str()).or_default() += 1;
        }

        let self_count = owner_counts
            .get(self.owner_id.as_str())
            .copied()
            .unwrap_or(0);
        // Self is an active owner even before it holds anything.
        let active_owners = owner_counts.len() + usize::from(self_count == 0);

        let min_per = partition_ids.len() / active_owners;
        let extras = partition_ids.len() % active_owners;

        if self_count > min_per {
            return None;
        }
        if self_count == min_per {
            let owners_at_extra = owner_counts.values().filter(|&&c| c >= min_per + 1).count();
            if owners_at_extra >= extras {
                return None;
            }
        }

        let mut rng = rand::thread_rng();

        let unowned: Vec<&String> = partition_ids
            .iter()
            .filter(|id| !current_ownership.contains_key(id.as_str()))
            .collect();
        if let Some(choice) = unowned.choose(&mut rng) {
            return Some((*choice).clone());
        }

        let expired: Vec<&String> = partition_ids
            .iter()
            .filter(|id| {
                current_ownership
                    .get(id.as_str())
                    .is_some_and(|o| !is_active(o))
            })
            .collect();
        if let Some(choice) = expired.choose(&mut rng) {
            return Some((*choice).clone());
        }

        // Steal from the richest: partitions held by owners sitting above
        // even their extra-slot allowance.
        let overloaded: Vec<&String> = partition_ids
            .iter()
            .filter(|id| {
                current_ownership.get(id.as_str()).is_some_and(|o| {
                    is_active(o)
                        && owner_counts
                            .get(o.owner_id.as_str())
                            .is_some_and(|&c| c > min_per + 1)
                })
            })
            .collect();
        overloaded.choose(&mut rng).map(|choice| (*choice).clone())
    }
}
