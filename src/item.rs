// ============================================================================
// Items: identity, placement and the capability traits shared by everything
// that lives inside an image
// ============================================================================

use std::fmt;

use uuid::Uuid;

use crate::error::EngineError;
use crate::geometry::Rect;

/// Identity of an [`crate::image::Image`]. Items carry it as their
/// non-owning back-reference to the image they were created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable handle of a layer, mask or channel within its image. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to any drawable in an image, resolved through the image's
/// containers. A layer mask is addressed through its owning layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawableRef {
    Layer(ItemId),
    LayerMask(ItemId),
    Channel(ItemId),
    Selection,
}

impl DrawableRef {
    pub fn is_channel_like(&self) -> bool {
        matches!(self, DrawableRef::LayerMask(_) | DrawableRef::Channel(_) | DrawableRef::Selection)
    }

    pub fn layer_id(&self) -> Option<ItemId> {
        match self {
            DrawableRef::Layer(id) | DrawableRef::LayerMask(id) => Some(*id),
            _ => None,
        }
    }
}

/// The closed set of item variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    Layer,
    FloatingSelection,
    LayerMask,
    Channel,
    Selection,
}

/// State every item carries regardless of kind.
#[derive(Clone, Debug)]
pub struct ItemBase {
    pub(crate) id: ItemId,
    pub(crate) image: ImageId,
    pub(crate) name: String,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) offset_x: i32,
    pub(crate) offset_y: i32,
    pub(crate) visible: bool,
    /// Detached from the image but still alive, e.g. held by an undo record.
    pub(crate) removed: bool,
}

impl ItemBase {
    pub(crate) fn new(id: ItemId, image: ImageId, name: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            id,
            image,
            name: name.into(),
            width,
            height,
            offset_x: 0,
            offset_y: 0,
            visible: true,
            removed: false,
        }
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Anything with a position and size in image coordinates.
pub trait Positioned {
    fn base(&self) -> &ItemBase;
    fn base_mut(&mut self) -> &mut ItemBase;

    fn id(&self) -> ItemId {
        self.base().id
    }

    fn image_id(&self) -> ImageId {
        self.base().image
    }

    fn width(&self) -> i32 {
        self.base().width
    }

    fn height(&self) -> i32 {
        self.base().height
    }

    fn offset(&self) -> (i32, i32) {
        (self.base().offset_x, self.base().offset_y)
    }

    fn bounds(&self) -> Rect {
        let b = self.base();
        Rect::new(b.offset_x, b.offset_y, b.width, b.height)
    }

    fn is_visible(&self) -> bool {
        self.base().visible
    }

    fn is_removed(&self) -> bool {
        self.base().removed
    }
}

/// Items the user can name. Masks refuse renames; their name follows the layer.
pub trait Nameable: Positioned {
    fn name(&self) -> &str {
        &self.base().name
    }

    fn check_rename(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Items owning a pixel buffer.
pub trait PixelOwning: Positioned {
    fn drawable(&self) -> &crate::drawable::Drawable;
    fn drawable_mut(&mut self) -> &mut crate::drawable::Drawable;

    fn has_alpha(&self) -> bool {
        self.drawable().has_alpha()
    }
}

/// Items that can report an outline for marching ants.
pub trait Boundable {
    /// Outline segments in image coordinates.
    fn boundary(&mut self) -> Vec<crate::geometry::BoundSeg>;
}
