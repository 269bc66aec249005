//! Course definition loading and validation.
//!
//! `load_course` is the single boundary where untyped JSON becomes the typed
//! content model. It is pure: no side effects, no API calls. Validation
//! happens in two stages — serde handles schema/type conformance, then the
//! semantic checks below catch what a type system cannot: duplicate ids,
//! dangling references, threshold ranges, and prerequisite cycles.

use std::collections::HashSet;
use std::path::Path;

use crate::error::ValidationError;
use crate::graph::SkillGraph;
use crate::model::{CourseDefinition, MasteryCriteria};

/// Parse and validate a JSON course definition.
pub fn load_course(json: &str) -> Result<CourseDefinition, ValidationError> {
    let course: CourseDefinition = serde_json::from_str(json)?;
    validate(&course)?;
    Ok(course)
}

/// Read and load a course definition from a file.
pub fn load_course_file(path: &Path) -> Result<CourseDefinition, ValidationError> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        ValidationError::Parse(serde_json::Error::io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        )))
    })?;
    load_course(&json)
}

/// Semantic validation over an already-parsed course.
pub fn validate(course: &CourseDefinition) -> Result<(), ValidationError> {
    if course.modules.is_empty() {
        return Err(ValidationError::EmptyCourse);
    }

    // Unique ids across modules, items, and badges.
    let mut seen: HashSet<&str> = HashSet::new();
    for module in &course.modules {
        if !seen.insert(&module.id) {
            return Err(ValidationError::DuplicateId {
                id: module.id.clone(),
            });
        }
        for item in &module.items {
            if !seen.insert(item.id()) {
                return Err(ValidationError::DuplicateId {
                    id: item.id().to_string(),
                });
            }
        }
    }
    for badge in &course.badges {
        if !seen.insert(&badge.id) {
            return Err(ValidationError::DuplicateId {
                id: badge.id.clone(),
            });
        }
    }

    // Threshold ranges: module criteria and per-item thresholds are percents.
    for module in &course.modules {
        if let MasteryCriteria::MinScore { threshold } = module.mastery_criteria {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(ValidationError::InvalidThreshold {
                    module: module.id.clone(),
                    value: threshold,
                });
            }
        }
        for item in &module.items {
            if let Some(t) = item.mastery_threshold() {
                if !(0.0..=100.0).contains(&t) {
                    return Err(ValidationError::InvalidThreshold {
                        module: module.id.clone(),
                        value: t,
                    });
                }
            }
        }
    }

    // Prerequisite references must resolve, and the DAG must be acyclic.
    let graph = SkillGraph::build(course);
    if let Some((from, to)) = graph.dangling().first() {
        return Err(ValidationError::DanglingReference {
            kind: "module",
            from: from.clone(),
            to: to.clone(),
        });
    }
    graph.topological_order()?;

    // Badge award conditions must point at real items or modules.
    let module_ids: HashSet<&str> = course.modules.iter().map(|m| m.id.as_str()).collect();
    let item_ids: HashSet<&str> = course.items().map(|(_, i)| i.id()).collect();
    for badge in &course.badges {
        for target in badge.condition.targets() {
            if !module_ids.contains(target.as_str()) && !item_ids.contains(target.as_str()) {
                return Err(ValidationError::DanglingReference {
                    kind: "badge",
                    from: badge.id.clone(),
                    to: target.clone(),
                });
            }
        }
    }

    // Item badge references must point at declared badges.
    let badge_ids: HashSet<&str> = course.badges.iter().map(|b| b.id.as_str()).collect();
    for (module, item) in course.items() {
        for badge_ref in item.badge_ids() {
            if !badge_ids.contains(badge_ref.as_str()) {
                return Err(ValidationError::DanglingReference {
                    kind: "item",
                    from: format!("{}/{}", module.id, item.id()),
                    to: badge_ref.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "course_code": "CS101",
        "title": "Intro",
        "modules": [
            {
                "id": "basics",
                "name": "Basics",
                "items": [
                    {"type": "page", "id": "welcome", "title": "Welcome"}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_minimal_course_loads_with_defaults() {
        let course = load_course(MINIMAL).unwrap();
        assert_eq!(course.course_code, "CS101");
        assert_eq!(course.modules.len(), 1);
        assert_eq!(
            course.modules[0].mastery_criteria,
            MasteryCriteria::ViewAll
        );
        assert_eq!(course.gamification.xp_multiplier, 1.0);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(
            load_course("{not json"),
            Err(ValidationError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_course_is_rejected() {
        let json = r#"{"course_code": "X", "title": "X", "modules": []}"#;
        assert!(matches!(
            load_course(json),
            Err(ValidationError::EmptyCourse)
        ));
    }

    #[test]
    fn test_prerequisite_cycle_is_rejected() {
        let json = r#"{
            "course_code": "X", "title": "X",
            "modules": [
                {"id": "a", "name": "A", "items": [], "unlock_requirements": ["b"]},
                {"id": "b", "name": "B", "items": [], "unlock_requirements": ["a"]}
            ]
        }"#;
        match load_course(json) {
            Err(ValidationError::CycleDetected { chain }) => {
                assert!(chain.contains(&"a".to_string()));
                assert!(chain.contains(&"b".to_string()));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn test_dangling_prerequisite_is_rejected() {
        let json = r#"{
            "course_code": "X", "title": "X",
            "modules": [
                {"id": "a", "name": "A", "items": [], "unlock_requirements": ["ghost"]}
            ]
        }"#;
        assert!(matches!(
            load_course(json),
            Err(ValidationError::DanglingReference { kind: "module", .. })
        ));
    }

    #[test]
    fn test_dangling_badge_target_is_rejected() {
        let json = r#"{
            "course_code": "X", "title": "X",
            "modules": [
                {"id": "a", "name": "A", "items": []}
            ],
            "badges": [
                {
                    "id": "explorer", "name": "Explorer",
                    "condition": {"kind": "complete_all", "targets": ["no-such-item"]}
                }
            ]
        }"#;
        assert!(matches!(
            load_course(json),
            Err(ValidationError::DanglingReference { kind: "badge", .. })
        ));
    }

    #[test]
    fn test_duplicate_item_id_is_rejected() {
        let json = r#"{
            "course_code": "X", "title": "X",
            "modules": [
                {"id": "a", "name": "A", "items": [
                    {"type": "page", "id": "dup", "title": "One"},
                    {"type": "page", "id": "dup", "title": "Two"}
                ]}
            ]
        }"#;
        assert!(matches!(
            load_course(json),
            Err(ValidationError::DuplicateId { .. })
        ));
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let json = r#"{
            "course_code": "X", "title": "X",
            "modules": [
                {
                    "id": "a", "name": "A", "items": [],
                    "mastery_criteria": {"kind": "min_score", "threshold": 140.0}
                }
            ]
        }"#;
        assert!(matches!(
            load_course(json),
            Err(ValidationError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_item_badge_reference_must_exist() {
        let json = r#"{
            "course_code": "X", "title": "X",
            "modules": [
                {"id": "a", "name": "A", "items": [
                    {"type": "assignment", "id": "hw", "name": "HW",
                     "points_possible": 10.0, "badges": ["undeclared"]}
                ]}
            ]
        }"#;
        assert!(matches!(
            load_course(json),
            Err(ValidationError::DanglingReference { kind: "item", .. })
        ));
    }
}
