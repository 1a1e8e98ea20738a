//! Progress reporting derived from sync state.
//!
//! Reads the persisted counters without mutating them. Percent is
//! non-decreasing within a run: 0 while the event listing drains, scaled
//! by processed events while guests drain, 100 once completed.

use serde::Serialize;

use crate::state::{Stage, SyncState};

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub stage: Stage,
    pub total_events: usize,
    pub processed_events: usize,
    pub failed_events: usize,
    pub progress_percent: u8,
}

impl SyncStatus {
    pub fn from_state(state: &SyncState) -> Self {
        let total = state.pending_event_ids.len();
        let processed = state.last_processed_index.min(total);

        let progress_percent = match state.stage {
            Stage::Events => 0,
            Stage::Guests => {
                if total == 0 {
                    0
                } else {
                    ((processed * 100) / total) as u8
                }
            }
            Stage::Completed => 100,
        };

        SyncStatus {
            stage: state.stage,
            total_events: total,
            processed_events: processed,
            failed_events: state.failed_event_ids.len(),
            progress_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_stage_reports_zero() {
        let state = SyncState::default();
        let status = SyncStatus::from_state(&state);
        assert_eq!(status.progress_percent, 0);
        assert_eq!(status.stage, Stage::Events);
    }

    #[test]
    fn guests_stage_scales_with_processed_events() {
        let mut state = SyncState::default();
        state.stage = Stage::Guests;
        state.pending_event_ids = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        state.last_processed_index = 1;
        assert_eq!(SyncStatus::from_state(&state).progress_percent, 25);

        state.last_processed_index = 3;
        assert_eq!(SyncStatus::from_state(&state).progress_percent, 75);
    }

    #[test]
    fn completed_is_always_full() {
        let mut state = SyncState::default();
        state.stage = Stage::Completed;
        assert_eq!(SyncStatus::from_state(&state).progress_percent, 100);
    }
}
