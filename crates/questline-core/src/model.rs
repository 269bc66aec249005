//! Typed content model for a gamified course definition.
//!
//! The JSON course definition produced by the course-builder layer is parsed
//! into these tagged-variant entities exactly once, at the load boundary.
//! Everything downstream (deployment, progression, scoring) works with these
//! types; no ad hoc JSON dictionaries survive past the loader.

use serde::{Deserialize, Serialize};

/// Content-model id for a module.
pub type ModuleId = String;
/// Content-model id for an item (page/assignment/quiz).
pub type ItemId = String;
/// Content-model id for a badge.
pub type BadgeId = String;

/// A complete course definition: ordered modules, badge catalog, and the
/// global gamification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseDefinition {
    /// Stable short code, e.g. `"CS101-GAME"`.
    pub course_code: String,
    pub title: String,
    /// Modules in course order; the order defines remote positions.
    pub modules: Vec<Module>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub gamification: GamificationConfig,
}

impl CourseDefinition {
    /// Look up a module by content id.
    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Iterate every item in every module, in course order.
    pub fn items(&self) -> impl Iterator<Item = (&Module, &Item)> {
        self.modules
            .iter()
            .flat_map(|m| m.items.iter().map(move |i| (m, i)))
    }
}

/// Global gamification knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamificationConfig {
    /// Multiplier applied to every XP award.
    #[serde(default = "default_multiplier")]
    pub xp_multiplier: f64,
    /// Mastery threshold (percent) used when a `min_score` module does not
    /// carry its own.
    #[serde(default = "default_threshold")]
    pub default_mastery_threshold: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_threshold() -> f64 {
    75.0
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            xp_multiplier: default_multiplier(),
            default_mastery_threshold: default_threshold(),
        }
    }
}

/// One course module: an ordered list of items, gated by prerequisite
/// modules, with a mastery criterion that unlocks downstream content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub items: Vec<Item>,
    /// Prerequisite module ids. Flat list, conjunctive: every listed module
    /// must be mastered before this one unlocks.
    #[serde(default)]
    pub unlock_requirements: Vec<ModuleId>,
    #[serde(default)]
    pub mastery_criteria: MasteryCriteria,
}

impl Module {
    /// Graded items (assignments and quizzes) in this module.
    pub fn graded_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| i.is_graded())
    }
}

/// How a module transitions from unlocked to mastered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MasteryCriteria {
    /// Every item in the module carries a completion timestamp.
    ViewAll,
    /// The student's aggregate percentage across the module's graded items
    /// meets the threshold (0–100).
    MinScore { threshold: f64 },
}

impl Default for MasteryCriteria {
    fn default() -> Self {
        MasteryCriteria::ViewAll
    }
}

/// A module item. Pages are ungraded content; assignments and quizzes share
/// one grading surface (points, optional per-item mastery threshold, XP
/// value, completion-tier badges).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Page {
        id: ItemId,
        title: String,
        #[serde(default)]
        body: Option<String>,
    },
    Assignment {
        id: ItemId,
        name: String,
        points_possible: f64,
        #[serde(default)]
        mastery_threshold: Option<f64>,
        #[serde(default)]
        xp: u32,
        #[serde(default)]
        badges: Vec<BadgeId>,
    },
    Quiz {
        id: ItemId,
        name: String,
        points_possible: f64,
        #[serde(default)]
        mastery_threshold: Option<f64>,
        #[serde(default)]
        xp: u32,
        #[serde(default)]
        badges: Vec<BadgeId>,
    },
}

impl Item {
    pub fn id(&self) -> &str {
        match self {
            Item::Page { id, .. } | Item::Assignment { id, .. } | Item::Quiz { id, .. } => id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Item::Page { title, .. } => title,
            Item::Assignment { name, .. } | Item::Quiz { name, .. } => name,
        }
    }

    /// Whether this item carries a score (assignments and quizzes).
    pub fn is_graded(&self) -> bool {
        !matches!(self, Item::Page { .. })
    }

    pub fn points_possible(&self) -> Option<f64> {
        match self {
            Item::Page { .. } => None,
            Item::Assignment {
                points_possible, ..
            }
            | Item::Quiz {
                points_possible, ..
            } => Some(*points_possible),
        }
    }

    /// Per-item mastery threshold (percent), when declared.
    pub fn mastery_threshold(&self) -> Option<f64> {
        match self {
            Item::Page { .. } => None,
            Item::Assignment {
                mastery_threshold, ..
            }
            | Item::Quiz {
                mastery_threshold, ..
            } => *mastery_threshold,
        }
    }

    /// XP value awarded when this item is completed.
    pub fn xp(&self) -> u32 {
        match self {
            Item::Page { .. } => 0,
            Item::Assignment { xp, .. } | Item::Quiz { xp, .. } => *xp,
        }
    }

    /// Badges tied to this item's completion tiers.
    pub fn badge_ids(&self) -> &[BadgeId] {
        match self {
            Item::Page { .. } => &[],
            Item::Assignment { badges, .. } | Item::Quiz { badges, .. } => badges,
        }
    }
}

/// A badge and its award condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub id: BadgeId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub condition: AwardCondition,
}

/// When a badge is earned.
///
/// A closed set today; new variants extend badge semantics without touching
/// the scoring traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AwardCondition {
    /// Every listed target is satisfied: item targets must be completed,
    /// module targets must be mastered.
    CompleteAll { targets: Vec<String> },
}

impl AwardCondition {
    pub fn targets(&self) -> &[String] {
        match self {
            AwardCondition::CompleteAll { targets } => targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mastery_criteria_tagged_serde() {
        let json = r#"{"kind":"min_score","threshold":80.0}"#;
        let criteria: MasteryCriteria = serde_json::from_str(json).unwrap();
        assert_eq!(criteria, MasteryCriteria::MinScore { threshold: 80.0 });

        let round = serde_json::to_string(&MasteryCriteria::ViewAll).unwrap();
        assert!(round.contains("view_all"));
    }

    #[test]
    fn test_item_tagged_serde_and_accessors() {
        let json = r#"{
            "type": "assignment",
            "id": "hw-1",
            "name": "Homework 1",
            "points_possible": 100.0,
            "xp": 50,
            "badges": ["first-steps"]
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.id(), "hw-1");
        assert!(item.is_graded());
        assert_eq!(item.xp(), 50);
        assert_eq!(item.points_possible(), Some(100.0));
        assert_eq!(item.badge_ids(), ["first-steps".to_string()]);
    }

    #[test]
    fn test_page_is_not_graded() {
        let page = Item::Page {
            id: "welcome".into(),
            title: "Welcome".into(),
            body: None,
        };
        assert!(!page.is_graded());
        assert_eq!(page.xp(), 0);
        assert!(page.points_possible().is_none());
    }

    #[test]
    fn test_gamification_defaults() {
        let config = GamificationConfig::default();
        assert_eq!(config.xp_multiplier, 1.0);
        assert_eq!(config.default_mastery_threshold, 75.0);
    }

    #[test]
    fn test_module_graded_items_filters_pages() {
        let module = Module {
            id: "m1".into(),
            name: "Module 1".into(),
            items: vec![
                Item::Page {
                    id: "p".into(),
                    title: "Notes".into(),
                    body: None,
                },
                Item::Quiz {
                    id: "q".into(),
                    name: "Quiz".into(),
                    points_possible: 10.0,
                    mastery_threshold: None,
                    xp: 10,
                    badges: vec![],
                },
            ],
            unlock_requirements: vec![],
            mastery_criteria: MasteryCriteria::ViewAll,
        };
        assert_eq!(module.graded_items().count(), 1);
    }
}
