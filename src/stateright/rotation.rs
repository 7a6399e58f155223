//! Stateright Model for Segment Rotation
//!
//! Exhaustively explores buffering, positional appends, stale views, lost
//! append responses, the backend append ceiling, retention and graceful
//! restarts. Lines are small integers and segment sizes are counted in lines.
//!
//! Properties:
//! - no_loss_no_duplication: evicted ++ retained segments ++ pending is
//!   exactly the lines produced, in order
//! - retention_bounded: the ledger never exceeds the retention limit
//! - stored_segments_bounded: the backend never holds more segments than
//!   the retention limit, across restarts included
//! - active_segment_tracked: the active segment is always in the ledger
//! - append_ceiling_respected: no object takes more appends than the ceiling

use stateright::{Model, Property};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct RotationModelConfig {
    /// Lines produced over the whole run
    pub max_lines: u8,
    /// Lines per segment before a size rotation
    pub max_segment_lines: usize,
    /// Appends the backend accepts per object
    pub append_ceiling: u8,
    pub retention_limit: usize,
}

impl Default for RotationModelConfig {
    fn default() -> Self {
        RotationModelConfig {
            max_lines: 5,
            max_segment_lines: 2,
            append_ceiling: 2,
            retention_limit: 2,
        }
    }
}

/// One object on the backend
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelObject {
    pub lines: Vec<u8>,
    pub appends: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RotationState {
    pub next_line: u8,
    pub pending: Vec<u8>,
    /// Backend objects by segment index
    pub objects: BTreeMap<u64, ModelObject>,
    /// Content of deleted segments, in deletion order
    pub evicted: Vec<u8>,
    /// Retention ledger, oldest first
    pub ledger: Vec<u64>,
    pub active: u64,
    /// Shipper's view of the active object's next position
    pub position: usize,
    pub next_index: u64,
    /// Segment and position of an append whose response was lost
    pub in_doubt: Option<(u64, usize)>,
}

impl RotationState {
    pub fn new() -> Self {
        RotationState {
            next_line: 0,
            pending: Vec::new(),
            objects: BTreeMap::new(),
            evicted: Vec::new(),
            ledger: vec![0],
            active: 0,
            position: 0,
            next_index: 1,
            in_doubt: None,
        }
    }

    fn object_len(&self, index: u64) -> usize {
        self.objects.get(&index).map_or(0, |o| o.lines.len())
    }

    fn admit(&mut self, index: u64, retention_limit: usize) {
        while self.ledger.len() >= retention_limit {
            let old = self.ledger.remove(0);
            if let Some(object) = self.objects.remove(&old) {
                self.evicted.extend(object.lines);
            }
        }
        self.ledger.push(index);
    }

    fn rotate(&mut self, retention_limit: usize) {
        let index = self.next_index;
        self.next_index += 1;
        self.admit(index, retention_limit);
        self.active = index;
        self.position = self.object_len(index);
    }
}

impl Default for RotationState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RotationAction {
    /// Producer hands over the next line
    Produce,
    /// Ship the pending lines as one batch
    Flush,
    /// Like `Flush`, but a successful append's response is lost
    FlushLostAck,
    /// Shipper's position goes stale (e.g. another writer appended)
    Drift,
    /// Graceful stop after a complete flush, then resume from the backend
    Restart,
}

pub struct RotationModel {
    pub config: RotationModelConfig,
}

impl RotationModel {
    pub fn new() -> Self {
        RotationModel {
            config: RotationModelConfig::default(),
        }
    }

    pub fn with_config(config: RotationModelConfig) -> Self {
        RotationModel { config }
    }
}

impl Default for RotationModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for RotationModel {
    type State = RotationState;
    type Action = RotationAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![RotationState::new()]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        if state.next_line < self.config.max_lines {
            actions.push(RotationAction::Produce);
        }
        if !state.pending.is_empty() {
            actions.push(RotationAction::Flush);
            if state.in_doubt.is_none() {
                actions.push(RotationAction::FlushLostAck);
            }
        }
        if state.in_doubt.is_none() && state.position == state.object_len(state.active) {
            actions.push(RotationAction::Drift);
        }
        if state.pending.is_empty() {
            actions.push(RotationAction::Restart);
        }
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut next = state.clone();
        let retention = self.config.retention_limit;

        match action {
            RotationAction::Produce => {
                next.pending.push(next.next_line);
                next.next_line += 1;
            }

            RotationAction::Flush | RotationAction::FlushLostAck => {
                if let Some((segment, position)) = next.in_doubt.take() {
                    // Settle first: growth by exactly the batch means it landed
                    if next.object_len(segment) == position + next.pending.len() {
                        next.pending.clear();
                    }
                    if segment == next.active {
                        next.position = next.object_len(segment);
                    }
                    return Some(next);
                }

                if next.object_len(next.active) >= self.config.max_segment_lines {
                    next.rotate(retention);
                }

                let actual = next.object_len(next.active);
                let appends = next.objects.get(&next.active).map_or(0, |o| o.appends);

                if appends >= self.config.append_ceiling {
                    next.rotate(retention);
                } else if next.position != actual {
                    // Rejected append, resync from object metadata
                    next.position = actual;
                } else {
                    let lost_ack = action == RotationAction::FlushLostAck;
                    let batch = if lost_ack {
                        next.in_doubt = Some((next.active, next.position));
                        next.pending.clone()
                    } else {
                        std::mem::take(&mut next.pending)
                    };
                    let object = next.objects.entry(next.active).or_insert(ModelObject {
                        lines: Vec::new(),
                        appends: 0,
                    });
                    object.lines.extend(batch);
                    object.appends += 1;
                    if !lost_ack {
                        next.position = object.lines.len();
                    }
                }
            }

            RotationAction::Drift => {
                next.position += 1;
            }

            RotationAction::Restart => {
                // Resume from a listing of every stored segment, oldest first
                let existing: Vec<u64> = next.objects.keys().copied().collect();

                next.ledger.clear();
                for &index in &existing {
                    next.admit(index, retention);
                }
                next.active = existing.last().copied().unwrap_or(0);
                next.position = next.object_len(next.active);
                next.next_index = next.active + 1;
            }
        }

        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("no_loss_no_duplication", |_: &RotationModel, state: &RotationState| {
                let mut all = state.evicted.clone();
                for object in state.objects.values() {
                    all.extend(object.lines.iter().copied());
                }
                all.extend(state.pending.iter().copied());
                all == (0..state.next_line).collect::<Vec<_>>()
            }),
            Property::always("retention_bounded", |model: &RotationModel, state: &RotationState| {
                state.ledger.len() <= model.config.retention_limit
            }),
            Property::always(
                "stored_segments_bounded",
                |model: &RotationModel, state: &RotationState| {
                    state.objects.len() <= model.config.retention_limit
                },
            ),
            Property::always("active_segment_tracked", |_: &RotationModel, state: &RotationState| {
                state.ledger.contains(&state.active)
            }),
            Property::always(
                "append_ceiling_respected",
                |model: &RotationModel, state: &RotationState| {
                    state
                        .objects
                        .values()
                        .all(|o| o.appends <= model.config.append_ceiling)
                },
            ),
            Property::sometimes("segments_evicted", |_: &RotationModel, state: &RotationState| {
                !state.evicted.is_empty()
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stateright::Checker;

    fn step(model: &RotationModel, state: &RotationState, action: RotationAction) -> RotationState {
        model.next_state(state, action).unwrap()
    }

    #[test]
    fn test_size_rotation_and_eviction() {
        let model = RotationModel::with_config(RotationModelConfig {
            max_lines: 6,
            max_segment_lines: 1,
            append_ceiling: 10,
            retention_limit: 2,
        });
        let mut state = RotationState::new();
        for _ in 0..3 {
            state = step(&model, &state, RotationAction::Produce);
            state = step(&model, &state, RotationAction::Flush);
        }

        assert_eq!(state.ledger, vec![1, 2]);
        assert_eq!(state.evicted, vec![0]);
        assert_eq!(state.active, 2);
    }

    #[test]
    fn test_drift_resyncs_without_writing() {
        let model = RotationModel::new();
        let mut state = RotationState::new();
        state = step(&model, &state, RotationAction::Produce);
        state = step(&model, &state, RotationAction::Drift);
        state = step(&model, &state, RotationAction::Flush);

        assert!(state.objects.is_empty());
        assert_eq!(state.pending, vec![0]);
        assert_eq!(state.position, 0);

        state = step(&model, &state, RotationAction::Flush);
        assert_eq!(state.objects[&0].lines, vec![0]);
    }

    #[test]
    fn test_restart_resumes_newest() {
        let model = RotationModel::with_config(RotationModelConfig {
            retention_limit: 5,
            ..Default::default()
        });
        let mut state = RotationState::new();
        for _ in 0..3 {
            state = step(&model, &state, RotationAction::Produce);
            state = step(&model, &state, RotationAction::Flush);
        }
        state = step(&model, &state, RotationAction::Restart);

        assert_eq!(state.ledger, vec![0, 1]);
        assert_eq!(state.active, 1);
        assert_eq!(state.position, 1);
        assert_eq!(state.next_index, 2);
    }

    #[test]
    fn test_restart_after_eviction_resumes_newest_run() {
        let model = RotationModel::with_config(RotationModelConfig {
            max_lines: 6,
            max_segment_lines: 1,
            append_ceiling: 10,
            retention_limit: 2,
        });
        let mut state = RotationState::new();
        for _ in 0..4 {
            state = step(&model, &state, RotationAction::Produce);
            state = step(&model, &state, RotationAction::Flush);
        }
        assert_eq!(state.objects.keys().copied().collect::<Vec<_>>(), vec![2, 3]);

        state = step(&model, &state, RotationAction::Restart);
        assert_eq!(state.ledger, vec![2, 3]);
        assert_eq!(state.active, 3);
        assert_eq!(state.next_index, 4);

        state = step(&model, &state, RotationAction::Produce);
        state = step(&model, &state, RotationAction::Flush);
        assert_eq!(state.objects.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(state.evicted, vec![0, 1, 2]);
    }

    #[test]
    fn test_lost_ack_settles_without_resending() {
        let model = RotationModel::new();
        let mut state = RotationState::new();
        state = step(&model, &state, RotationAction::Produce);
        state = step(&model, &state, RotationAction::Produce);
        state = step(&model, &state, RotationAction::FlushLostAck);

        assert_eq!(state.objects[&0].lines, vec![0, 1]);
        assert_eq!(state.pending, vec![0, 1]);
        assert_eq!(state.in_doubt, Some((0, 0)));

        state = step(&model, &state, RotationAction::Flush);
        assert!(state.pending.is_empty());
        assert_eq!(state.position, 2);
        assert_eq!(state.objects[&0].lines, vec![0, 1]);
        assert_eq!(state.objects[&0].appends, 1);
    }

    #[test]
    #[ignore] // Run with: cargo test stateright_rotation -- --ignored --nocapture
    fn stateright_rotation_model_check() {
        let checker = RotationModel::new().checker().spawn_bfs().join();
        println!("States explored: {}", checker.unique_state_count());
        checker.assert_properties();
    }

    #[test]
    fn stateright_rotation_small_model_check() {
        let model = RotationModel::with_config(RotationModelConfig {
            max_lines: 3,
            max_segment_lines: 1,
            append_ceiling: 1,
            retention_limit: 2,
        });
        let checker = model.checker().spawn_bfs().join();
        checker.assert_properties();
    }
}
