//! # Progress aggregation
//!
//! Pure functions turning stage state into stage progress, overall progress
//! and the visual [`ProgressColor`] band. Nothing here performs I/O; the
//! engine calls [`recompute`] inside the quest's critical section so the
//! result always reflects post-commit counters.
//!
//! ## Bands
//!
//! | overallProgress | color     |
//! |-----------------|-----------|
//! | 0 – 25          | `red`     |
//! | 26 – 50         | `orange`  |
//! | 51 – 75         | `yellow`  |
//! | 76 – 99         | `green`   |
//! | 100             | `victory` |

use tracing::debug;

use crate::stage::MAX_PROGRESS;
use crate::types::{ProgressColor, Quest, Stage, StageStatus};

/// Outcome of a recomputation, used to detect the 100% crossing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProgressChange {
    pub before: u8,
    pub after: u8,
    pub color: ProgressColor,
}

impl ProgressChange {
    /// `true` only for the recomputation that moved the quest onto 100.
    pub fn crossed_completion(&self) -> bool {
        self.before < MAX_PROGRESS && self.after == MAX_PROGRESS
    }

    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// `floor(100 * collected / needed)` for requirement stages, the curator-set
/// value otherwise.
pub fn stage_progress(stage: &Stage) -> u8 {
    match &stage.requirement {
        Some(requirement) => {
            let needed = requirement.needed();
            if needed == 0 {
                return 0;
            }
            let collected = requirement.collected().min(needed);
            // u128 keeps `collected * 100` exact for any u64 counter.
            ((collected as u128 * 100) / needed as u128) as u8
        }
        None => stage.progress.min(MAX_PROGRESS),
    }
}

/// Arithmetic mean of stage progress, rounded down. A quest without stages is at 0.
pub fn overall_progress(stages: &[Stage]) -> u8 {
    if stages.is_empty() {
        return 0;
    }
    let total: u64 = stages.iter().map(|s| s.progress.min(MAX_PROGRESS) as u64).sum();
    (total / stages.len() as u64) as u8
}

/// Band for an overall progress value. Boundary values belong to the lower band.
pub fn progress_color(overall: u8) -> ProgressColor {
    match overall {
        0..=25 => ProgressColor::Red,
        26..=50 => ProgressColor::Orange,
        51..=75 => ProgressColor::Yellow,
        76..=99 => ProgressColor::Green,
        _ => ProgressColor::Victory,
    }
}

/// Status a stage should hold for its progress. Never moves a stage backwards.
pub fn stage_status(current: StageStatus, progress: u8) -> StageStatus {
    let derived = match progress {
        0 => StageStatus::Pending,
        p if p >= MAX_PROGRESS => StageStatus::Completed,
        _ => StageStatus::InProgress,
    };
    derived.max(current)
}

/// Refresh every derived field of `quest`.
pub fn recompute(quest: &mut Quest) -> ProgressChange {
    let before = quest.overall_progress;
    for stage in &mut quest.stages {
        stage.progress = stage_progress(stage);
        stage.status = stage_status(stage.status, stage.progress);
    }
    quest.overall_progress = overall_progress(&quest.stages);
    quest.progress_color = progress_color(quest.overall_progress);

    debug!(
        "Quest {} progress {} → {} ({})",
        quest.id,
        before,
        quest.overall_progress,
        quest.progress_color.as_str()
    );

    ProgressChange {
        before,
        after: quest.overall_progress,
        color: quest.progress_color,
    }
}
