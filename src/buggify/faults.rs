//! Fault identifiers
//!
//! Every injection site names its fault with one of these constants so that
//! statistics and per-fault probabilities line up across runs.

/// Faults injected by the simulated append store
pub mod object_store {
    /// Request times out before reaching the backend
    pub const TIMEOUT: &str = "object_store.timeout";
    /// Append is applied but the response is lost, surfacing as a timeout
    pub const TIMEOUT_AFTER_APPLY: &str = "object_store.timeout_after_apply";
    /// Append rejected with a transient backend error
    pub const APPEND_FAIL: &str = "object_store.append_fail";
    /// Append rejected as if the client position were stale
    pub const STALE_POSITION: &str = "object_store.stale_position";
    /// Metadata fetch fails
    pub const HEAD_FAIL: &str = "object_store.head_fail";
    /// Existence probe fails
    pub const EXISTS_FAIL: &str = "object_store.exists_fail";
    /// Delete fails
    pub const DELETE_FAIL: &str = "object_store.delete_fail";
    /// Prefix listing fails
    pub const LIST_FAIL: &str = "object_store.list_fail";
}

/// All known fault identifiers
pub const ALL_FAULTS: &[&str] = &[
    object_store::TIMEOUT,
    object_store::TIMEOUT_AFTER_APPLY,
    object_store::APPEND_FAIL,
    object_store::STALE_POSITION,
    object_store::HEAD_FAIL,
    object_store::EXISTS_FAIL,
    object_store::DELETE_FAIL,
    object_store::LIST_FAIL,
];
