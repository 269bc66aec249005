//! Domain-level error taxonomy for Questline.

use questline_canvas::CanvasError;

/// Errors produced by course definition validation.
///
/// These are fatal: they surface before any API call is made, so a bad
/// content model never causes a partial deployment.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("course definition is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("course has no modules")]
    EmptyCourse,

    #[error("duplicate id: {id}")]
    DuplicateId { id: String },

    #[error("{kind} '{from}' references unknown id '{to}'")]
    DanglingReference {
        kind: &'static str,
        from: String,
        to: String,
    },

    #[error("prerequisite cycle detected: {}", chain.join(" -> "))]
    CycleDetected { chain: Vec<String> },

    #[error("module '{module}' has invalid mastery threshold {value} (expected 0-100)")]
    InvalidThreshold { module: String, value: f64 },
}

/// Questline domain errors.
#[derive(Debug, thiserror::Error)]
pub enum QuestlineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("canvas error: {0}")]
    Canvas(#[from] CanvasError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Questline domain operations.
pub type Result<T> = std::result::Result<T, QuestlineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_names_the_chain() {
        let err = ValidationError::CycleDetected {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "prerequisite cycle detected: a -> b -> a"
        );
    }

    #[test]
    fn test_dangling_reference_display() {
        let err = ValidationError::DanglingReference {
            kind: "badge",
            from: "explorer".into(),
            to: "missing-quiz".into(),
        };
        assert!(err.to_string().contains("badge 'explorer'"));
        assert!(err.to_string().contains("missing-quiz"));
    }

    #[test]
    fn test_canvas_error_converts() {
        let err: QuestlineError = CanvasError::Transient("down".into()).into();
        assert!(err.to_string().contains("canvas error"));
    }
}
