use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub max_content_bytes: usize,
    /// Bounded outbound queue per push session; a full queue evicts the session.
    pub session_queue_len: usize,
    pub bus_capacity: usize,
    /// Entries kept per user log after trimming.
    pub log_retention: usize,
    /// Hard cap on entries scanned by one pull.
    pub pull_scan_cap: usize,
    pub default_pull_limit: u32,
    pub max_pull_limit: u32,
    pub member_cache_ttl_ms: u64,
    pub user_groups_cache_ttl_ms: u64,
    pub negative_cache_ttl_ms: u64,
    pub mirror_workers: usize,
    pub mirror_queue_len: usize,
    pub mirror_max_tries: u32,
    pub mirror_backoff_initial_ms: u64,
    pub mirror_backoff_max_ms: u64,
    pub mirror_op_timeout_ms: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_content_bytes: 64 * 1024,
            session_queue_len: 256,
            bus_capacity: 1024,
            log_retention: 5000,
            pull_scan_cap: 500,
            default_pull_limit: 20,
            max_pull_limit: 100,
            member_cache_ttl_ms: 5 * 60 * 1000,
            user_groups_cache_ttl_ms: 60 * 60 * 1000,
            negative_cache_ttl_ms: 60 * 1000,
            mirror_workers: 4,
            mirror_queue_len: 1024,
            mirror_max_tries: 5,
            mirror_backoff_initial_ms: 100,
            mirror_backoff_max_ms: 5000,
            mirror_op_timeout_ms: 5000,
        }
    }
}
