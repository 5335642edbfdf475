//! Layers, layer masks, channels and the selection of a layered image, with
//! floating selections, quick mask and whole-image resize and crop. Every
//! mutation can be recorded on the image's undo history.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod channel;
pub mod cli;
pub mod composite;
pub mod config;
pub mod drawable;
pub mod error;
pub mod event;
pub mod geometry;
pub mod graph;
pub mod history;
pub mod image;
pub mod item;
pub mod layer;
pub mod logger;
pub mod ops;
pub mod progress;
pub mod undo;
pub mod vectors;

pub use crate::error::{ConfigError, EngineError};
pub use crate::image::Image;
