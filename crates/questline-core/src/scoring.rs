//! XP totals and badge awarding.
//!
//! XP is derived purely from the progression snapshot: completed items
//! contribute their XP value, scaled by the achieved-score ratio when the
//! item carries a mastery threshold (partial credit), then by the global
//! multiplier. Scoring the same snapshot twice yields the same total — no
//! hidden state.
//!
//! Badges are evaluated against the current snapshot and reported as the
//! set difference against the previously awarded set, so each badge is
//! reported exactly once, on the cycle its condition first holds.

use std::collections::BTreeSet;

use crate::model::{BadgeId, CourseDefinition, Item};
use crate::progression::{StudentProgress, UnlockState};

/// Result of one scoring pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub xp_total: u32,
    /// Badges newly satisfied this cycle (already-awarded ones excluded).
    pub new_badges: BTreeSet<BadgeId>,
}

/// Compute XP total and newly earned badges for one student.
pub fn score(progress: &StudentProgress, course: &CourseDefinition) -> ScoreOutcome {
    let multiplier = course.gamification.xp_multiplier;
    let mut xp = 0.0f64;

    for (_, item) in course.items() {
        if !progress.is_completed(item.id()) {
            continue;
        }
        xp += f64::from(item.xp()) * credit_ratio(item, progress);
    }

    let xp_total = (xp * multiplier).round().max(0.0) as u32;

    let new_badges = course
        .badges
        .iter()
        .filter(|badge| !progress.awarded_badges.contains(&badge.id))
        .filter(|badge| condition_satisfied(badge.condition.targets(), progress, course))
        .map(|badge| badge.id.clone())
        .collect();

    ScoreOutcome {
        xp_total,
        new_badges,
    }
}

/// Fraction of an item's XP earned.
///
/// Items with a mastery threshold award partial credit by achieved-score
/// ratio; everything else is all-or-nothing on completion.
fn credit_ratio(item: &Item, progress: &StudentProgress) -> f64 {
    if item.mastery_threshold().is_none() {
        return 1.0;
    }

    let points = item.points_possible().unwrap_or(0.0);
    if points <= 0.0 {
        return 1.0;
    }
    let score = progress
        .items
        .get(item.id())
        .and_then(|p| p.score)
        .unwrap_or(0.0);
    (score / points).clamp(0.0, 1.0)
}

/// `complete_all`: item targets must be completed, module targets mastered.
fn condition_satisfied(
    targets: &[String],
    progress: &StudentProgress,
    course: &CourseDefinition,
) -> bool {
    if targets.is_empty() {
        return false;
    }
    targets.iter().all(|target| {
        if course.module(target).is_some() {
            progress.state(target) == UnlockState::Mastered
        } else {
            progress.is_completed(target)
        }
    })
}
