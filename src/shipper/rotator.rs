//! Segment rotation and the append protocol
//!
//! The rotator owns the active segment, the retention ledger and key naming.
//! Every append is issued at the position the backend last confirmed. A
//! failed append is followed by a resync (adopt the backend's metadata) or,
//! when the backend refuses further appends to the object, by a rotation.
//!
//! An append that fails ambiguously (timeout, I/O) may still have landed.
//! It stays in doubt until a metadata fetch shows whether the object grew by
//! exactly its length; with a single writer that growth can only be ours.
//! Nothing is appended while an append is in doubt.

use super::clock::ShipperClock;
use super::error::{ShipperError, ShipperResult};
use super::ledger::RotationLedger;
use super::object_store::{AppendObjectStore, ObjectStoreError};
use super::segment::{RemoteSegment, SegmentNamer};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Why a rotation happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// Active segment reached `max_segment_size`
    SizeLimit,
    /// Backend refused further appends to the active segment
    AppendLimit,
}

/// Counters for rotation and append activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotatorStats {
    pub appends: u64,
    pub failed_appends: u64,
    /// Appends reported as failed that the backend had in fact applied
    pub recovered_appends: u64,
    pub resyncs: u64,
    pub size_rotations: u64,
    pub limit_rotations: u64,
    pub evictions: u64,
    pub delete_failures: u64,
}

impl RotatorStats {
    pub fn rotations(&self) -> u64 {
        self.size_rotations + self.limit_rotations
    }
}

/// An append whose outcome is unknown
#[derive(Debug, Clone)]
struct InDoubtAppend {
    key: String,
    position: u64,
    size: u64,
    payload: Vec<u8>,
}

/// Owns the active segment and its retention history
pub struct SegmentRotator<S: AppendObjectStore, C: ShipperClock> {
    store: S,
    clock: C,
    namer: SegmentNamer,
    active: RemoteSegment,
    ledger: RotationLedger,
    next_index: u64,
    max_segment_size: u64,
    in_doubt: Option<InDoubtAppend>,
    stats: RotatorStats,
}

impl<S: AppendObjectStore, C: ShipperClock> SegmentRotator<S, C> {
    /// Open the rotator, resuming today's newest segment if one exists.
    ///
    /// Lists the keys under today's prefix and admits every segment found in
    /// index order, so retention deletes whatever lies beyond the limit
    /// (including low indices left behind by failed deletes). The highest
    /// index becomes the active segment and numbering continues after it.
    /// A failed listing or metadata fetch aborts startup.
    pub async fn open(
        store: S,
        clock: C,
        namer: SegmentNamer,
        max_segment_size: u64,
        retention_limit: usize,
    ) -> ShipperResult<Self> {
        debug_assert!(max_segment_size > 0, "Precondition: max_segment_size > 0");
        debug_assert!(retention_limit >= 1, "Precondition: retention_limit >= 1");

        let date = clock.now().date_stamp();
        let prefix = namer.day_prefix(&date);
        let listed = store
            .list(&prefix)
            .await
            .map_err(|source| ShipperError::Probe {
                key: prefix.clone(),
                source,
            })?;
        let mut existing: Vec<(u64, String)> = listed
            .into_iter()
            .filter_map(|key| namer.index_of(&date, &key).map(|index| (index, key)))
            .collect();
        existing.sort_by_key(|(index, _)| *index);

        let mut rotator = SegmentRotator {
            store,
            clock,
            active: RemoteSegment::empty(namer.key(&date, 0), 0),
            namer,
            ledger: RotationLedger::new(retention_limit),
            next_index: 1,
            max_segment_size,
            in_doubt: None,
            stats: RotatorStats::default(),
        };

        let Some(&(active_index, _)) = existing.last() else {
            rotator.ledger.push(rotator.active.key.clone());
            info!(key = %rotator.active.key, "Starting new segment");
            return Ok(rotator);
        };

        let found = existing.len();
        for (_, key) in existing {
            rotator.admit(key).await;
        }

        let key = rotator.namer.key(&date, active_index);
        let mut active = RemoteSegment::empty(key, active_index);
        match rotator.store.head(&active.key).await {
            Ok(meta) => active.adopt(meta.size_bytes, meta.next_position),
            Err(e) if e.is_not_found() => {}
            Err(source) => {
                return Err(ShipperError::Probe {
                    key: active.key,
                    source,
                })
            }
        }

        info!(
            key = %active.key,
            size = active.size,
            position = active.position,
            found,
            retained = rotator.ledger.len(),
            "Resuming existing segment"
        );

        rotator.active = active;
        rotator.next_index = active_index + 1;
        rotator.verify_invariants();
        Ok(rotator)
    }

    /// Rotate when the active segment has reached the size threshold
    pub async fn rotate_if_full(&mut self) -> bool {
        if self.active.is_full(self.max_segment_size) {
            self.rotate(RotationReason::SizeLimit).await;
            true
        } else {
            false
        }
    }

    /// Retire the active segment and open the next one
    pub async fn rotate(&mut self, reason: RotationReason) {
        let date = self.clock.now().date_stamp();
        let index = self.next_index;
        self.next_index += 1;
        let key = self.namer.key(&date, index);

        let segment = self.inspect_segment(key, index).await;
        self.admit(segment.key.clone()).await;

        match reason {
            RotationReason::SizeLimit => self.stats.size_rotations += 1,
            RotationReason::AppendLimit => self.stats.limit_rotations += 1,
        }

        info!(
            from = %self.active.key,
            to = %segment.key,
            ?reason,
            "Rotated segment"
        );
        self.active = segment;
        self.verify_invariants();
    }

    /// Append `payload` to the active segment, at most `max_attempts` times.
    ///
    /// Before every retry the rotator either rotates (append ceiling),
    /// settles an ambiguous failure, or resyncs its position from the backend
    /// (any other error). An attempt spent while an earlier append is still
    /// in doubt issues no append.
    pub async fn append_with_retry(
        &mut self,
        payload: &[u8],
        max_attempts: u32,
    ) -> ShipperResult<()> {
        debug_assert!(max_attempts >= 1, "Precondition: max_attempts >= 1");

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            if self.in_doubt.is_some() {
                match self.settle_in_doubt(payload).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) => {
                        last_error = Some(e);
                        continue;
                    }
                }
            }

            let result = self
                .store
                .append_at(&self.active.key, payload, self.active.position)
                .await;

            match result {
                Ok(next_position) => {
                    debug_assert!(
                        next_position >= self.active.position + payload.len() as u64,
                        "Postcondition: backend position must advance past the payload"
                    );
                    self.active.advance(payload.len() as u64, next_position);
                    self.stats.appends += 1;
                    return Ok(());
                }
                Err(e) if e.is_append_limit() => {
                    warn!(
                        key = %self.active.key,
                        attempt,
                        "Append limit reached, rotating"
                    );
                    self.stats.failed_appends += 1;
                    self.rotate(RotationReason::AppendLimit).await;
                    last_error = Some(e);
                }
                Err(e) if e.is_ambiguous() => {
                    warn!(
                        key = %self.active.key,
                        position = self.active.position,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Append outcome unknown, checking backend"
                    );
                    self.stats.failed_appends += 1;
                    self.in_doubt = Some(InDoubtAppend {
                        key: self.active.key.clone(),
                        position: self.active.position,
                        size: self.active.size,
                        payload: payload.to_vec(),
                    });
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(
                        key = %self.active.key,
                        position = self.active.position,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Append failed, resyncing position"
                    );
                    self.stats.failed_appends += 1;
                    self.resync().await;
                    last_error = Some(e);
                }
            }
        }

        // Settle before giving up so the next flush starts from the backend's view
        if self.in_doubt.is_some() {
            match self.settle_in_doubt(payload).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => last_error = Some(e),
            }
        }

        Err(ShipperError::AppendExhausted {
            key: self.active.key.clone(),
            attempts: max_attempts,
            source: last_error.unwrap_or_else(|| {
                ObjectStoreError::Other("no append attempts permitted".to_string())
            }),
        })
    }

    /// Find out whether the in-doubt append landed, adopting the backend's view.
    ///
    /// `Ok(true)` means it landed carrying exactly `payload`, which then
    /// counts as appended. An error leaves the append in doubt.
    async fn settle_in_doubt(&mut self, payload: &[u8]) -> Result<bool, ObjectStoreError> {
        let Some(doubt) = self.in_doubt.take() else {
            return Ok(false);
        };

        self.stats.resyncs += 1;
        let (size, next_position) = match self.store.head(&doubt.key).await {
            Ok(meta) => (meta.size_bytes, meta.next_position),
            Err(e) if e.is_not_found() => (0, 0),
            Err(e) => {
                warn!(key = %doubt.key, error = %e, "Could not settle in-doubt append");
                self.in_doubt = Some(doubt);
                return Err(e);
            }
        };
        if doubt.key == self.active.key {
            self.active.adopt(size, next_position);
        }

        let len = doubt.payload.len() as u64;
        let landed = next_position == doubt.position + len && size == doubt.size + len;
        if !landed {
            debug!(key = %doubt.key, position = next_position, "In-doubt append did not land");
            return Ok(false);
        }
        if doubt.payload != payload {
            // The caller is not retrying the in-doubt batch
            warn!(key = %doubt.key, "In-doubt append landed under a different batch");
            return Ok(false);
        }

        info!(
            key = %doubt.key,
            position = next_position,
            "Append landed despite the error, not resending"
        );
        self.stats.appends += 1;
        self.stats.recovered_appends += 1;
        Ok(true)
    }

    /// Adopt the backend's size and next position for the active segment
    pub async fn resync(&mut self) {
        self.stats.resyncs += 1;
        match self.store.head(&self.active.key).await {
            Ok(meta) => {
                debug!(
                    key = %self.active.key,
                    stale = self.active.position,
                    position = meta.next_position,
                    "Resynced position"
                );
                self.active.adopt(meta.size_bytes, meta.next_position);
            }
            Err(e) if e.is_not_found() => self.active.adopt(0, 0),
            // Keep the local view; the next failed append resyncs again
            Err(e) => warn!(key = %self.active.key, error = %e, "Resync failed"),
        }
    }

    /// Evict down to retention, then enqueue `key`
    async fn admit(&mut self, key: String) {
        while let Some(old) = self.ledger.pop_for_admission() {
            self.delete_retired(&old).await;
        }
        self.ledger.push(key);
    }

    async fn delete_retired(&mut self, key: &str) {
        self.stats.evictions += 1;
        let result = match self.store.exists(key).await {
            Ok(true) => self.store.delete(key).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(key, "Deleted retired segment"),
            Err(e) => {
                self.stats.delete_failures += 1;
                warn!(key, error = %e, "Failed to delete retired segment");
            }
        }
    }

    /// New segment state for `key`, adopting an existing object's size/position
    async fn inspect_segment(&self, key: String, index: u64) -> RemoteSegment {
        let mut segment = RemoteSegment::empty(key, index);
        let found = match self.store.exists(&segment.key).await {
            Ok(true) => self.store.head(&segment.key).await.map(Some),
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };
        match found {
            Ok(Some(meta)) => segment.adopt(meta.size_bytes, meta.next_position),
            Ok(None) => {}
            Err(e) => warn!(key = %segment.key, error = %e, "Segment lookup failed, starting at 0"),
        }
        segment
    }

    pub fn active(&self) -> &RemoteSegment {
        &self.active
    }

    pub fn ledger(&self) -> &RotationLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &RotatorStats {
        &self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn verify_invariants(&self) {
        debug_assert!(
            self.ledger.len() <= self.ledger.retention_limit(),
            "Invariant violated: ledger exceeds retention after rotation"
        );
        debug_assert!(
            self.ledger.keys().last() == Some(self.active.key.as_str()),
            "Invariant violated: active segment must be the newest ledger entry"
        );
        debug_assert!(
            self.next_index > self.active.index,
            "Invariant violated: rotation index must be monotonic"
        );
    }
}
