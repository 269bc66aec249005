//! Wire payload construction from content-model entities.
//!
//! Payloads are built deterministically so two deployments of the same
//! definition serialize byte-identically; the digest gate in the deployer
//! depends on this.

use questline_canvas::{AssignmentPayload, ModulePayload};

use crate::model::{Item, Module};

pub(crate) fn module_payload(module: &Module, position: usize) -> ModulePayload {
    ModulePayload {
        name: module.name.clone(),
        position,
        published: true,
    }
}

pub(crate) fn item_payload(item: &Item) -> AssignmentPayload {
    let kind = match item {
        Item::Quiz { .. } => "quiz",
        _ => "assignment",
    };
    AssignmentPayload {
        name: item.title().to_string(),
        points_possible: item.points_possible().unwrap_or(0.0),
        published: true,
        kind: kind.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_item_serializes_identically() {
        let item = Item::Assignment {
            id: "hw-1".into(),
            name: "Homework 1".into(),
            points_possible: 100.0,
            mastery_threshold: Some(70.0),
            xp: 50,
            badges: vec![],
        };
        let a = serde_json::to_vec(&item_payload(&item)).unwrap();
        let b = serde_json::to_vec(&item_payload(&item)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_quiz_payload_kind() {
        let quiz = Item::Quiz {
            id: "q-1".into(),
            name: "Quiz 1".into(),
            points_possible: 20.0,
            mastery_threshold: None,
            xp: 10,
            badges: vec![],
        };
        assert_eq!(item_payload(&quiz).kind, "quiz");
    }
}
