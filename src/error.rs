//! Error types for the engine.
//!
//! `EngineError` covers operations the document legitimately refuses given its
//! current state. Programmer errors (wrong item kind, foreign image, missing
//! required argument) are `debug_assert!` contracts instead and never show up
//! here.

use std::path::PathBuf;

use thiserror::Error;

/// Which selection-driven operation found an empty region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionAction {
    CutOrCopy,
    Float,
}

impl std::fmt::Display for RegionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RegionAction::CutOrCopy => "Unable to cut or copy because the selected region is empty.",
            RegionAction::Float => "Cannot float selection because the selected region is empty.",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unable to add a layer mask since the layer already has one.")]
    LayerHasMask,

    #[error("Cannot add layer mask of different dimensions than specified layer.")]
    MaskSizeMismatch,

    #[error("Cannot rename layer masks.")]
    CannotRenameMask,

    #[error(
        "Cannot create a new layer from the floating selection because it belongs to a layer mask or channel."
    )]
    FloatingSelectionOnChannel,

    #[error("There is no selection to stroke.")]
    NoSelectionToStroke,

    #[error("{0}")]
    EmptyRegion(RegionAction),

    #[error("Item is not part of this image.")]
    NotAttached,
}

/// Failures loading an `EngineConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(
            EngineError::NoSelectionToStroke.to_string(),
            "There is no selection to stroke."
        );
        assert_eq!(
            EngineError::EmptyRegion(RegionAction::Float).to_string(),
            "Cannot float selection because the selected region is empty."
        );
        assert!(EngineError::FloatingSelectionOnChannel
            .to_string()
            .contains("layer mask or channel"));
    }
}
