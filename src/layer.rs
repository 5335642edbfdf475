// ============================================================================
// Layers, layer masks and floating-selection state
// ============================================================================

use crate::canvas::LayerMode;
use crate::channel::Channel;
use crate::drawable::{Drawable, PixelBuffer};
use crate::error::EngineError;
use crate::geometry::{BoundSeg, BoundaryType, HALF_WAY, Rect, find_boundary, rect_boundary};
use crate::graph::LayerNodes;
use crate::item::{
    Boundable, DrawableRef, ImageId, ItemBase, ItemId, ItemKind, Nameable, PixelOwning, Positioned,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LayerKind {
    #[default]
    Normal,
    Text,
    Group,
}

/// Initial content of a freshly created layer mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddMaskType {
    White,
    Black,
    Alpha,
    AlphaTransfer,
    Selection,
    Channel,
    Copy,
}

/// What `apply_mask` does with the mask it removes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskApplyMode {
    Apply,
    Discard,
}

// ============================================================================
// LAYER MASK
// ============================================================================

/// A channel bound to exactly one layer. Named after the layer.
#[derive(Clone, Debug)]
pub struct LayerMask {
    pub(crate) channel: Channel,
    pub(crate) layer: ItemId,
}

impl Positioned for LayerMask {
    fn base(&self) -> &ItemBase {
        self.channel.base()
    }

    fn base_mut(&mut self) -> &mut ItemBase {
        self.channel.base_mut()
    }
}

impl PixelOwning for LayerMask {
    fn drawable(&self) -> &Drawable {
        &self.channel.drawable
    }

    fn drawable_mut(&mut self) -> &mut Drawable {
        &mut self.channel.drawable
    }
}

impl Nameable for LayerMask {
    fn check_rename(&self) -> Result<(), EngineError> {
        Err(EngineError::CannotRenameMask)
    }
}

impl LayerMask {
    pub fn mask_name(layer_name: &str) -> String {
        format!("{} mask", layer_name)
    }

    pub fn layer(&self) -> ItemId {
        self.layer
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }
}

// ============================================================================
// FLOATING SELECTION STATE
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct FloatingState {
    /// Drawable the floating pixels will merge into. `Some` ⇔ floating.
    pub(crate) host: Option<DrawableRef>,
    pub(crate) boundary_known: bool,
    pub(crate) segs: Vec<BoundSeg>,
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug)]
pub struct Layer {
    pub(crate) drawable: Drawable,
    pub(crate) kind: LayerKind,
    /// Group this layer belongs to, if any.
    pub(crate) parent: Option<ItemId>,
    pub(crate) opacity: f64,
    pub(crate) mode: LayerMode,
    pub(crate) lock_alpha: bool,
    pub(crate) mask: Option<LayerMask>,
    pub(crate) apply_mask: bool,
    pub(crate) edit_mask: bool,
    pub(crate) show_mask: bool,
    pub(crate) nodes: LayerNodes,
    pub(crate) fs: FloatingState,
}

impl Positioned for Layer {
    fn base(&self) -> &ItemBase {
        &self.drawable.item
    }

    fn base_mut(&mut self) -> &mut ItemBase {
        &mut self.drawable.item
    }
}

impl PixelOwning for Layer {
    fn drawable(&self) -> &Drawable {
        &self.drawable
    }

    fn drawable_mut(&mut self) -> &mut Drawable {
        &mut self.drawable
    }
}

impl Nameable for Layer {}

impl Layer {
    pub(crate) fn new(id: ItemId, image: ImageId, name: impl Into<String>, width: i32, height: i32, has_alpha: bool) -> Self {
        let item = ItemBase::new(id, image, name, width, height);
        let mut buffer = PixelBuffer::new_color(width, height);
        if !has_alpha {
            if let Some(t) = buffer.as_color_mut() {
                t.fill(image::Rgba([255, 255, 255, 255]));
            }
        }
        Self::from_drawable(Drawable::new(item, buffer, has_alpha))
    }

    pub(crate) fn from_drawable(drawable: Drawable) -> Self {
        Self {
            drawable,
            kind: LayerKind::Normal,
            parent: None,
            opacity: 1.0,
            mode: LayerMode::Normal,
            lock_alpha: false,
            mask: None,
            apply_mask: false,
            edit_mask: false,
            show_mask: false,
            nodes: LayerNodes::default(),
            fs: FloatingState::default(),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn item_kind(&self) -> ItemKind {
        if self.is_floating_sel() { ItemKind::FloatingSelection } else { ItemKind::Layer }
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn mode(&self) -> LayerMode {
        self.mode
    }

    pub fn lock_alpha(&self) -> bool {
        self.lock_alpha
    }

    /// Groups composite their children and cannot lock alpha.
    pub fn can_lock_alpha(&self) -> bool {
        self.kind != LayerKind::Group
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn is_group(&self) -> bool {
        self.kind == LayerKind::Group
    }

    pub fn is_text_layer(&self) -> bool {
        self.kind == LayerKind::Text
    }

    pub fn mask(&self) -> Option<&LayerMask> {
        self.mask.as_ref()
    }

    pub fn mask_mut(&mut self) -> Option<&mut LayerMask> {
        self.mask.as_mut()
    }

    pub fn apply_mask(&self) -> bool {
        self.apply_mask
    }

    pub fn edit_mask(&self) -> bool {
        self.edit_mask
    }

    pub fn show_mask(&self) -> bool {
        self.show_mask
    }

    pub fn nodes(&self) -> &LayerNodes {
        &self.nodes
    }

    // ---- floating selection -------------------------------------------------

    pub fn is_floating_sel(&self) -> bool {
        self.fs.host.is_some()
    }

    pub fn floating_sel_host(&self) -> Option<DrawableRef> {
        self.fs.host
    }

    /// Drop the cached floating outline; it is traced again on next request.
    pub(crate) fn invalidate_fs_boundary(&mut self) {
        self.fs.boundary_known = false;
    }

    /// Keep the mask's name and geometry in step with the layer.
    pub(crate) fn sync_mask(&mut self) {
        let (ox, oy) = self.offset();
        let name = LayerMask::mask_name(self.name());
        if let Some(mask) = self.mask.as_mut() {
            mask.channel.drawable.set_offset(ox, oy);
            mask.channel.drawable.item.name = name;
        }
    }
}

impl Boundable for Layer {
    /// Outline of a floating selection in image coordinates.
    fn boundary(&mut self) -> Vec<BoundSeg> {
        if self.fs.boundary_known {
            return self.fs.segs.clone();
        }
        let bounds = self.bounds();
        let segs = if !self.has_alpha() {
            rect_boundary(&bounds)
        } else {
            let local = Rect::new(0, 0, bounds.width, bounds.height);
            let buffer = self.drawable.buffer();
            find_boundary(local, BoundaryType::WithinBounds, local, HALF_WAY, |x, y| buffer.coverage(x, y))
                .into_iter()
                .map(|s| s.translate(bounds.x, bounds.y))
                .collect()
        };
        self.fs.segs = segs.clone();
        self.fs.boundary_known = true;
        segs
    }
}
