//! Mutating operations on an [`crate::image::Image`].
//!
//! Everything here takes the image by `&mut` and addresses items by id, the
//! same way the command layer drives the document.

pub mod channel;
pub mod crop;
pub mod floating_sel;
pub mod item;
pub mod layer;
pub mod quick_mask;
pub mod resize;
pub mod selection;
pub mod stroke;
