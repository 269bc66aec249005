//! Mastery progression evaluation.
//!
//! Per student, each module moves through `LOCKED → UNLOCKED → MASTERED`
//! within a single evaluation pass. Modules are processed in topological
//! order of the prerequisite DAG so a node's inputs are always resolved
//! before it is evaluated — one pass, O(V+E), no regressions.
//!
//! Mastery criteria are a closed set of named predicate functions dispatched
//! from [`criterion_satisfied`]; adding a criterion means adding one
//! predicate there, the traversal never changes. Unlock requirements funnel
//! through [`requirements_met`] per node for the same reason: a future
//! boolean expression tree replaces that predicate, not the traversal.
//!
//! Student-facing evaluation never hard-fails: a prerequisite that was never
//! deployed degrades the node to permanently locked and surfaces a
//! configuration warning on the result.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ValidationError;
use crate::graph::SkillGraph;
use crate::model::{BadgeId, CourseDefinition, ItemId, MasteryCriteria, Module, ModuleId};

/// Unlock state of one module for one student. Monotonic within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockState {
    Locked,
    Unlocked,
    Mastered,
}

/// Recorded progress on one item, derived from Canvas submissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    /// Raw score, when graded.
    pub score: Option<f64>,
    /// Present once the item counts as completed.
    pub completed_at: Option<DateTime<Utc>>,
}

/// One student's item-level inputs for an evaluation pass, keyed by
/// content-model item id (the sync layer translates remote assignment ids
/// through the resource map before building this).
#[derive(Debug, Clone, Default)]
pub struct SubmissionSet {
    items: HashMap<ItemId, ItemProgress>,
}

impl SubmissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item_id: impl Into<ItemId>, progress: ItemProgress) {
        self.items.insert(item_id.into(), progress);
    }

    pub fn get(&self, item_id: &str) -> Option<&ItemProgress> {
        self.items.get(item_id)
    }

    pub fn is_completed(&self, item_id: &str) -> bool {
        self.items
            .get(item_id)
            .is_some_and(|p| p.completed_at.is_some())
    }
}

/// A non-fatal configuration problem found during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationWarning {
    pub module: ModuleId,
    pub detail: String,
}

impl std::fmt::Display for ConfigurationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "module '{}': {}", self.module, self.detail)
    }
}

/// One student's computed progression snapshot.
///
/// Recomputed from live submissions each sync cycle; cached for display
/// only, never the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProgress {
    pub student_id: i64,
    pub items: HashMap<ItemId, ItemProgress>,
    pub modules: HashMap<ModuleId, UnlockState>,
    /// Badges already awarded in earlier cycles (input to scoring).
    pub awarded_badges: HashSet<BadgeId>,
    pub warnings: Vec<ConfigurationWarning>,
}

impl StudentProgress {
    /// State of a module, defaulting to locked for unknown ids.
    pub fn state(&self, module_id: &str) -> UnlockState {
        self.modules
            .get(module_id)
            .copied()
            .unwrap_or(UnlockState::Locked)
    }

    pub fn is_completed(&self, item_id: &str) -> bool {
        self.items
            .get(item_id)
            .is_some_and(|p| p.completed_at.is_some())
    }

    /// Carry forward the awarded-badge set from a previous cycle.
    pub fn with_awarded_badges(mut self, badges: HashSet<BadgeId>) -> Self {
        self.awarded_badges = badges;
        self
    }
}

/// Progression evaluator for one course definition.
///
/// Construction validates the prerequisite DAG once; evaluation is then a
/// pure function of the submission set.
pub struct Evaluator<'a> {
    course: &'a CourseDefinition,
    graph: SkillGraph,
    order: Vec<ModuleId>,
}

impl<'a> Evaluator<'a> {
    pub fn new(course: &'a CourseDefinition) -> Result<Self, ValidationError> {
        let graph = SkillGraph::build(course);
        let order = graph.topological_order()?;
        Ok(Self {
            course,
            graph,
            order,
        })
    }

    /// Evaluate one student's module states from their submissions.
    ///
    /// `deployed_modules`, when provided, is the set of module ids known to
    /// exist remotely (from the resource map); a prerequisite outside that
    /// set locks its dependents and produces a configuration warning.
    pub fn evaluate(
        &self,
        student_id: i64,
        submissions: &SubmissionSet,
        deployed_modules: Option<&HashSet<ModuleId>>,
    ) -> StudentProgress {
        let mut states: HashMap<ModuleId, UnlockState> = HashMap::new();
        let mut warnings: Vec<ConfigurationWarning> = Vec::new();

        for module_id in &self.order {
            let Some(module) = self.course.module(module_id) else {
                continue;
            };

            let unlocked = self.requirements_met(
                module,
                &states,
                deployed_modules,
                &mut warnings,
            );

            let state = if !unlocked {
                UnlockState::Locked
            } else if criterion_satisfied(&module.mastery_criteria, module, submissions) {
                UnlockState::Mastered
            } else {
                UnlockState::Unlocked
            };
            states.insert(module_id.clone(), state);
        }

        for warning in &warnings {
            warn!(student_id, %warning, "configuration warning during evaluation");
        }

        let items = self
            .course
            .items()
            .filter_map(|(_, item)| {
                submissions
                    .get(item.id())
                    .map(|p| (item.id().to_string(), p.clone()))
            })
            .collect();

        StudentProgress {
            student_id,
            items,
            modules: states,
            awarded_badges: HashSet::new(),
            warnings,
        }
    }

    /// AND across the requirement set: every prerequisite must be mastered.
    ///
    /// The single funnel point for unlock logic; richer boolean forms
    /// would replace this predicate, not the traversal.
    fn requirements_met(
        &self,
        module: &Module,
        states: &HashMap<ModuleId, UnlockState>,
        deployed_modules: Option<&HashSet<ModuleId>>,
        warnings: &mut Vec<ConfigurationWarning>,
    ) -> bool {
        let mut met = true;

        // Dangling references recorded at graph build lock the node.
        for (from, to) in self.graph.dangling() {
            if from == &module.id {
                warnings.push(ConfigurationWarning {
                    module: module.id.clone(),
                    detail: format!("prerequisite '{to}' does not exist; module stays locked"),
                });
                met = false;
            }
        }

        for prereq in &module.unlock_requirements {
            if let Some(deployed) = deployed_modules {
                if !deployed.contains(prereq) {
                    warnings.push(ConfigurationWarning {
                        module: module.id.clone(),
                        detail: format!(
                            "prerequisite '{prereq}' was never deployed; module stays locked"
                        ),
                    });
                    met = false;
                    continue;
                }
            }
            if states.get(prereq).copied() != Some(UnlockState::Mastered) {
                met = false;
            }
        }

        met
    }
}

/// Dispatch table over the closed set of mastery criteria.
fn criterion_satisfied(
    criteria: &MasteryCriteria,
    module: &Module,
    submissions: &SubmissionSet,
) -> bool {
    match criteria {
        MasteryCriteria::ViewAll => view_all_satisfied(module, submissions),
        MasteryCriteria::MinScore { threshold } => {
            min_score_satisfied(module, submissions, *threshold)
        }
    }
}

/// `view_all`: every item in the module carries a completion timestamp.
fn view_all_satisfied(module: &Module, submissions: &SubmissionSet) -> bool {
    module.items.iter().all(|i| submissions.is_completed(i.id()))
}

/// `min_score`: mean achieved percentage across the module's graded items
/// meets the threshold. Missing scores count as zero; a module with no
/// graded items only satisfies a zero threshold. Zero-point items have no
/// percentage to contribute and are left out of the mean entirely.
fn min_score_satisfied(module: &Module, submissions: &SubmissionSet, threshold: f64) -> bool {
    let mut total_pct = 0.0;
    let mut count = 0u32;

    for item in module.graded_items() {
        let points = item.points_possible().unwrap_or(0.0);
        if points <= 0.0 {
            continue;
        }
        count += 1;
        if let Some(score) = submissions.get(item.id()).and_then(|p| p.score) {
            total_pct += (score / points) * 100.0;
        }
    }

    if count == 0 {
        return threshold <= 0.0;
    }
    total_pct / f64::from(count) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;

    fn graded(id: &str, points: f64) -> Item {
        Item::Assignment {
            id: id.to_string(),
            name: id.to_string(),
            points_possible: points,
            mastery_threshold: None,
            xp: 0,
            badges: vec![],
        }
    }

    fn module(id: &str, prereqs: &[&str], criteria: MasteryCriteria, items: Vec<Item>) -> Module {
        Module {
            id: id.to_string(),
            name: id.to_string(),
            items,
            unlock_requirements: prereqs.iter().map(|s| s.to_string()).collect(),
            mastery_criteria: criteria,
        }
    }

    fn course(modules: Vec<Module>) -> CourseDefinition {
        CourseDefinition {
            course_code: "TEST".into(),
            title: "Test".into(),
            modules,
            badges: vec![],
            gamification: Default::default(),
        }
    }

    fn completed(score: Option<f64>) -> ItemProgress {
        ItemProgress {
            score,
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_entry_point_starts_unlocked() {
        let c = course(vec![module(
            "m1",
            &[],
            MasteryCriteria::ViewAll,
            vec![graded("a1", 10.0)],
        )]);
        let eval = Evaluator::new(&c).unwrap();
        let progress = eval.evaluate(1, &SubmissionSet::new(), None);
        assert_eq!(progress.state("m1"), UnlockState::Unlocked);
    }

    #[test]
    fn test_unlock_requires_all_prereqs_mastered() {
        let c = course(vec![
            module("a", &[], MasteryCriteria::ViewAll, vec![graded("ia", 10.0)]),
            module("b", &[], MasteryCriteria::ViewAll, vec![graded("ib", 10.0)]),
            module("m", &["a", "b"], MasteryCriteria::ViewAll, vec![]),
        ]);
        let eval = Evaluator::new(&c).unwrap();

        // Only A mastered: M stays locked.
        let mut subs = SubmissionSet::new();
        subs.insert("ia", completed(Some(10.0)));
        let progress = eval.evaluate(1, &subs, None);
        assert_eq!(progress.state("a"), UnlockState::Mastered);
        assert_eq!(progress.state("b"), UnlockState::Unlocked);
        assert_eq!(progress.state("m"), UnlockState::Locked);

        // Both mastered: M unlocks (and masters — it has no items).
        subs.insert("ib", completed(Some(10.0)));
        let progress = eval.evaluate(1, &subs, None);
        assert_ne!(progress.state("m"), UnlockState::Locked);
    }

    #[test]
    fn test_min_score_threshold_is_inclusive() {
        let c = course(vec![module(
            "m",
            &[],
            MasteryCriteria::MinScore { threshold: 75.0 },
            vec![graded("x", 100.0), graded("y", 100.0)],
        )]);
        let eval = Evaluator::new(&c).unwrap();

        // 80 + 70 averages exactly 75.0: mastered.
        let mut subs = SubmissionSet::new();
        subs.insert("x", completed(Some(80.0)));
        subs.insert("y", completed(Some(70.0)));
        assert_eq!(
            eval.evaluate(1, &subs, None).state("m"),
            UnlockState::Mastered
        );

        // 80 + 69.8 averages 74.9: not mastered.
        let mut subs = SubmissionSet::new();
        subs.insert("x", completed(Some(80.0)));
        subs.insert("y", completed(Some(69.8)));
        assert_eq!(
            eval.evaluate(1, &subs, None).state("m"),
            UnlockState::Unlocked
        );
    }

    #[test]
    fn test_missing_scores_count_as_zero() {
        let c = course(vec![module(
            "m",
            &[],
            MasteryCriteria::MinScore { threshold: 50.0 },
            vec![graded("x", 100.0), graded("y", 100.0)],
        )]);
        let eval = Evaluator::new(&c).unwrap();
        // Only one of two items scored at 100: average 50, mastered.
        let mut subs = SubmissionSet::new();
        subs.insert("x", completed(Some(100.0)));
        assert_eq!(
            eval.evaluate(1, &subs, None).state("m"),
            UnlockState::Mastered
        );
    }

    #[test]
    fn test_zero_point_items_do_not_dilute_the_mean() {
        // A zero-point participation assignment has no percentage to offer;
        // a perfect score on everything else must still master the module.
        let c = course(vec![module(
            "m",
            &[],
            MasteryCriteria::MinScore { threshold: 75.0 },
            vec![graded("x", 100.0), graded("attendance", 0.0)],
        )]);
        let eval = Evaluator::new(&c).unwrap();
        let mut subs = SubmissionSet::new();
        subs.insert("x", completed(Some(100.0)));
        subs.insert("attendance", completed(Some(0.0)));
        assert_eq!(
            eval.evaluate(1, &subs, None).state("m"),
            UnlockState::Mastered
        );
    }

    #[test]
    fn test_only_zero_point_items_means_no_gradeable_mean() {
        let c = course(vec![module(
            "m",
            &[],
            MasteryCriteria::MinScore { threshold: 50.0 },
            vec![graded("attendance", 0.0)],
        )]);
        let eval = Evaluator::new(&c).unwrap();
        assert_eq!(
            eval.evaluate(1, &SubmissionSet::new(), None).state("m"),
            UnlockState::Unlocked
        );
    }

    #[test]
    fn test_view_all_requires_every_item() {
        let c = course(vec![module(
            "m",
            &[],
            MasteryCriteria::ViewAll,
            vec![graded("x", 10.0), graded("y", 10.0)],
        )]);
        let eval = Evaluator::new(&c).unwrap();

        let mut subs = SubmissionSet::new();
        subs.insert("x", completed(None));
        assert_eq!(
            eval.evaluate(1, &subs, None).state("m"),
            UnlockState::Unlocked
        );

        subs.insert("y", completed(None));
        assert_eq!(
            eval.evaluate(1, &subs, None).state("m"),
            UnlockState::Mastered
        );
    }

    #[test]
    fn test_locked_module_cannot_master_even_with_scores() {
        let c = course(vec![
            module("gate", &[], MasteryCriteria::ViewAll, vec![graded("g", 10.0)]),
            module(
                "inner",
                &["gate"],
                MasteryCriteria::MinScore { threshold: 50.0 },
                vec![graded("i", 10.0)],
            ),
        ]);
        let eval = Evaluator::new(&c).unwrap();
        let mut subs = SubmissionSet::new();
        subs.insert("i", completed(Some(10.0)));
        let progress = eval.evaluate(1, &subs, None);
        assert_eq!(progress.state("inner"), UnlockState::Locked);
    }

    #[test]
    fn test_undeployed_prereq_locks_with_warning() {
        let c = course(vec![
            module("a", &[], MasteryCriteria::ViewAll, vec![]),
            module("m", &["a"], MasteryCriteria::ViewAll, vec![]),
        ]);
        let eval = Evaluator::new(&c).unwrap();

        // "a" exists in the definition but was never deployed.
        let deployed: HashSet<ModuleId> = ["m".to_string()].into_iter().collect();
        let progress = eval.evaluate(1, &SubmissionSet::new(), Some(&deployed));

        assert_eq!(progress.state("m"), UnlockState::Locked);
        assert_eq!(progress.warnings.len(), 1);
        assert!(progress.warnings[0].detail.contains("never deployed"));
    }
}
