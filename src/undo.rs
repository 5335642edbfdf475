// ============================================================================
// Undo records
// ============================================================================
//
// Each record swaps owned state in and out of the image. Replaying goes
// through the regular operations with `push_undo = false`, so notifications
// and graph rewiring happen exactly as for a fresh edit.

use crate::canvas::LayerMode;
use crate::channel::Channel;
use crate::drawable::BufferState;
use crate::event::ImageEvent;
use crate::history::{Command, UndoKind};
use crate::image::Image;
use crate::item::{DrawableRef, ItemId, Positioned};
use crate::layer::{Layer, LayerMask, MaskApplyMode};
use crate::ops;
use crate::vectors::{Guide, SamplePoint, Vectors};

/// Direction of a container change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackChange {
    Add,
    Remove,
}

/// Active layer and channel at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ActiveItems {
    pub layer: Option<ItemId>,
    pub channel: Option<ItemId>,
}

impl ActiveItems {
    pub fn of(image: &Image) -> Self {
        Self { layer: image.active_layer, channel: image.active_channel }
    }

    /// Reinstate without the floating-selection guard of the public setters.
    fn restore(self, image: &mut Image) {
        if image.active_layer != self.layer {
            image.active_layer = self.layer.filter(|id| image.layer(*id).is_some());
            image.emit(ImageEvent::ActiveLayerChanged(image.active_layer));
        }
        if image.active_channel != self.channel {
            image.active_channel = self.channel.filter(|id| image.channel(*id).is_some());
            image.emit(ImageEvent::ActiveChannelChanged(image.active_channel));
        }
    }
}

// ============================================================================
// IMAGE SIZE
// ============================================================================

pub struct ImageSizeUndo {
    width: i32,
    height: i32,
}

impl ImageSizeUndo {
    pub fn new(image: &Image) -> Self {
        Self { width: image.width, height: image.height }
    }

    fn swap(&mut self, image: &mut Image) {
        let (prev_w, prev_h) = (image.width, image.height);
        image.width = self.width;
        image.height = self.height;
        self.width = prev_w;
        self.height = prev_h;
        image.emit(ImageEvent::SizeChanged { offset_x: 0, offset_y: 0, previous_width: prev_w, previous_height: prev_h });
        let canvas = image.bounds();
        image.events.mark_dirty(canvas);
    }
}

impl Command for ImageSizeUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        "Image Size".to_string()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::ImageSize
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

// ============================================================================
// LAYER / CHANNEL STACK
// ============================================================================

/// A layer entering or leaving the stack. Holds the instance while it is out.
pub struct LayerStackUndo {
    change: StackChange,
    layer_id: ItemId,
    index: usize,
    before: ActiveItems,
    after: ActiveItems,
    held: Option<Layer>,
}

impl LayerStackUndo {
    pub fn new(change: StackChange, layer_id: ItemId, index: usize, before: ActiveItems, after: ActiveItems) -> Self {
        Self { change, layer_id, index, before, after, held: None }
    }

    pub fn hold(&mut self, layer: Layer) {
        self.held = Some(layer);
    }

    fn take_out(&mut self, image: &mut Image, active: ActiveItems) {
        let floating = image.layer(self.layer_id).is_some_and(|l| l.is_floating_sel());
        self.held = image.detach_layer(self.layer_id);
        active.restore(image);
        if floating {
            image.emit(ImageEvent::FloatingSelectionChanged);
            ops::selection::invalidate_boundary(image);
        }
    }

    fn put_back(&mut self, image: &mut Image, active: ActiveItems) {
        let Some(layer) = self.held.take() else { return };
        let floating = layer.is_floating_sel();
        image.attach_layer(layer, self.index);
        active.restore(image);
        if floating {
            ops::selection::invalidate_boundary(image);
        }
    }
}

impl Command for LayerStackUndo {
    fn undo(&mut self, image: &mut Image) {
        match self.change {
            StackChange::Add => self.take_out(image, self.before),
            StackChange::Remove => self.put_back(image, self.before),
        }
    }

    fn redo(&mut self, image: &mut Image) {
        match self.change {
            StackChange::Add => self.put_back(image, self.after),
            StackChange::Remove => self.take_out(image, self.after),
        }
    }

    fn description(&self) -> String {
        match self.change {
            StackChange::Add => "Add Layer".to_string(),
            StackChange::Remove => "Remove Layer".to_string(),
        }
    }

    fn kind(&self) -> UndoKind {
        match self.change {
            StackChange::Add => UndoKind::LayerAdd,
            StackChange::Remove => UndoKind::LayerRemove,
        }
    }

    fn memory_size(&self) -> usize {
        self.held.as_ref().map_or(0, |l| l.drawable.buffer().memory_bytes()) + std::mem::size_of::<Self>()
    }
}

pub struct ChannelStackUndo {
    change: StackChange,
    channel_id: ItemId,
    index: usize,
    before: ActiveItems,
    after: ActiveItems,
    held: Option<Channel>,
}

impl ChannelStackUndo {
    pub fn new(change: StackChange, channel_id: ItemId, index: usize, before: ActiveItems, after: ActiveItems) -> Self {
        Self { change, channel_id, index, before, after, held: None }
    }

    pub fn hold(&mut self, channel: Channel) {
        self.held = Some(channel);
    }

    fn take_out(&mut self, image: &mut Image, active: ActiveItems) {
        self.held = image.detach_channel(self.channel_id);
        active.restore(image);
    }

    fn put_back(&mut self, image: &mut Image, active: ActiveItems) {
        if let Some(channel) = self.held.take() {
            image.attach_channel(channel, self.index);
            active.restore(image);
        }
    }
}

impl Command for ChannelStackUndo {
    fn undo(&mut self, image: &mut Image) {
        match self.change {
            StackChange::Add => self.take_out(image, self.before),
            StackChange::Remove => self.put_back(image, self.before),
        }
    }

    fn redo(&mut self, image: &mut Image) {
        match self.change {
            StackChange::Add => self.put_back(image, self.after),
            StackChange::Remove => self.take_out(image, self.after),
        }
    }

    fn description(&self) -> String {
        match self.change {
            StackChange::Add => "Add Channel".to_string(),
            StackChange::Remove => "Remove Channel".to_string(),
        }
    }

    fn kind(&self) -> UndoKind {
        match self.change {
            StackChange::Add => UndoKind::ChannelAdd,
            StackChange::Remove => UndoKind::ChannelRemove,
        }
    }

    fn memory_size(&self) -> usize {
        self.held.as_ref().map_or(0, |c| c.drawable.buffer().memory_bytes()) + std::mem::size_of::<Self>()
    }
}

// ============================================================================
// LAYER MASK
// ============================================================================

/// A mask attached to or detached from its layer. The detached instance is
/// kept so redo re-attaches the very same mask.
pub struct MaskStackUndo {
    change: StackChange,
    layer_id: ItemId,
    description: String,
    held: Option<LayerMask>,
}

impl MaskStackUndo {
    pub fn added(layer_id: ItemId, description: impl Into<String>) -> Self {
        Self { change: StackChange::Add, layer_id, description: description.into(), held: None }
    }

    pub fn removed(layer_id: ItemId, description: impl Into<String>, mask: LayerMask) -> Self {
        Self { change: StackChange::Remove, layer_id, description: description.into(), held: Some(mask) }
    }

    fn take_out(&mut self, image: &mut Image) {
        self.held = ops::layer::detach_mask(image, self.layer_id, MaskApplyMode::Discard, false);
    }

    fn put_back(&mut self, image: &mut Image) {
        if let Some(mask) = self.held.take() {
            if let Err(err) = ops::layer::add_mask(image, self.layer_id, mask, false) {
                log::warn!("undo: could not restore mask of {}: {}", self.layer_id, err);
            }
        }
    }
}

impl Command for MaskStackUndo {
    fn undo(&mut self, image: &mut Image) {
        match self.change {
            StackChange::Add => self.take_out(image),
            StackChange::Remove => self.put_back(image),
        }
    }

    fn redo(&mut self, image: &mut Image) {
        match self.change {
            StackChange::Add => self.put_back(image),
            StackChange::Remove => self.take_out(image),
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn kind(&self) -> UndoKind {
        match self.change {
            StackChange::Add => UndoKind::MaskAdd,
            StackChange::Remove => UndoKind::MaskRemove,
        }
    }

    fn memory_size(&self) -> usize {
        self.held.as_ref().map_or(0, |m| m.channel.drawable.buffer().memory_bytes()) + std::mem::size_of::<Self>()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskFlag {
    Apply,
    Show,
}

/// Apply or show state of a layer's mask.
pub struct MaskFlagUndo {
    layer_id: ItemId,
    flag: MaskFlag,
    value: bool,
    description: String,
}

impl MaskFlagUndo {
    pub fn new(layer_id: ItemId, flag: MaskFlag, value: bool, description: impl Into<String>) -> Self {
        Self { layer_id, flag, value, description: description.into() }
    }

    fn swap(&mut self, image: &mut Image) {
        let Some(layer) = image.layer(self.layer_id) else { return };
        let current = match self.flag {
            MaskFlag::Apply => layer.apply_mask,
            MaskFlag::Show => layer.show_mask,
        };
        match self.flag {
            MaskFlag::Apply => ops::layer::set_apply_mask(image, self.layer_id, self.value, false),
            MaskFlag::Show => ops::layer::set_show_mask(image, self.layer_id, self.value, false),
        }
        self.value = current;
    }
}

impl Command for MaskFlagUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn kind(&self) -> UndoKind {
        match self.flag {
            MaskFlag::Apply => UndoKind::MaskApply,
            MaskFlag::Show => UndoKind::MaskShow,
        }
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.description.len()
    }
}

// ============================================================================
// LAYER PROPERTIES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayerProp {
    Opacity(f64),
    Mode(LayerMode),
    LockAlpha(bool),
}

pub struct LayerPropUndo {
    layer_id: ItemId,
    prop: LayerProp,
}

impl LayerPropUndo {
    pub fn new(layer_id: ItemId, prop: LayerProp) -> Self {
        Self { layer_id, prop }
    }

    fn swap(&mut self, image: &mut Image) {
        let Some(layer) = image.layer(self.layer_id) else { return };
        let id = self.layer_id;
        self.prop = match self.prop {
            LayerProp::Opacity(v) => {
                let current = layer.opacity;
                ops::layer::set_opacity(image, id, v, false);
                LayerProp::Opacity(current)
            }
            LayerProp::Mode(v) => {
                let current = layer.mode;
                ops::layer::set_mode(image, id, v, false);
                LayerProp::Mode(current)
            }
            LayerProp::LockAlpha(v) => {
                let current = layer.lock_alpha;
                ops::layer::set_lock_alpha(image, id, v, false);
                LayerProp::LockAlpha(current)
            }
        };
    }
}

impl Command for LayerPropUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        match self.prop {
            LayerProp::Opacity(_) => "Set Layer Opacity",
            LayerProp::Mode(_) => "Set Layer Mode",
            LayerProp::LockAlpha(_) => "Lock/Unlock Alpha Channel",
        }
        .to_string()
    }

    fn kind(&self) -> UndoKind {
        match self.prop {
            LayerProp::Opacity(_) => UndoKind::LayerOpacity,
            LayerProp::Mode(_) => UndoKind::LayerMode,
            LayerProp::LockAlpha(_) => UndoKind::LayerLockAlpha,
        }
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

// ============================================================================
// ITEM PROPERTIES
// ============================================================================

/// Position of an item. A layer's mask moves with it.
pub struct ItemDisplaceUndo {
    target: DrawableRef,
    offset: (i32, i32),
}

impl ItemDisplaceUndo {
    pub fn new(target: DrawableRef, offset: (i32, i32)) -> Self {
        Self { target, offset }
    }

    fn swap(&mut self, image: &mut Image) {
        let Some(current) = image.drawable(self.target).map(|d| (d.item.offset_x, d.item.offset_y)) else { return };
        ops::item::set_offset(image, self.target, self.offset.0, self.offset.1);
        self.offset = current;
    }
}

impl Command for ItemDisplaceUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        "Move Item".to_string()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::ItemDisplace
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

pub struct ItemRenameUndo {
    target: DrawableRef,
    name: String,
}

impl ItemRenameUndo {
    pub fn new(target: DrawableRef, name: impl Into<String>) -> Self {
        Self { target, name: name.into() }
    }

    fn swap(&mut self, image: &mut Image) {
        let Some(current) = image.drawable(self.target).map(|d| d.item.name.clone()) else { return };
        let name = std::mem::replace(&mut self.name, current);
        ops::item::set_name_unchecked(image, self.target, name);
    }
}

impl Command for ItemRenameUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        "Rename Item".to_string()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::ItemRename
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.name.len()
    }
}

pub struct ItemVisibilityUndo {
    target: DrawableRef,
    visible: bool,
}

impl ItemVisibilityUndo {
    pub fn new(target: DrawableRef, visible: bool) -> Self {
        Self { target, visible }
    }

    fn swap(&mut self, image: &mut Image) {
        let Some(current) = image.drawable(self.target).map(|d| d.item.visible) else { return };
        ops::item::set_visible(image, self.target, self.visible, false);
        self.visible = current;
    }
}

impl Command for ItemVisibilityUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        if self.visible { "Show Item" } else { "Hide Item" }.to_string()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::ItemVisibility
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

// ============================================================================
// PIXELS
// ============================================================================

/// Whole buffer and placement of a drawable.
pub struct DrawableBufferUndo {
    target: DrawableRef,
    state: BufferState,
    description: String,
}

impl DrawableBufferUndo {
    pub fn new(target: DrawableRef, state: BufferState, description: impl Into<String>) -> Self {
        Self { target, state, description: description.into() }
    }

    fn swap(&mut self, image: &mut Image) {
        let Some(drawable) = image.drawable_mut(self.target) else { return };
        let old_bounds = drawable.bounds();
        drawable.swap_state(&mut self.state);
        ops::item::after_buffer_change(image, self.target, old_bounds);
    }
}

impl Command for DrawableBufferUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::DrawableBuffer
    }

    fn memory_size(&self) -> usize {
        self.state.buffer.memory_bytes() + std::mem::size_of::<Self>()
    }
}

/// Ends the floating state of a layer; undo makes it float over its host again.
pub struct FsToLayerUndo {
    layer_id: ItemId,
    host: DrawableRef,
}

impl FsToLayerUndo {
    pub fn new(layer_id: ItemId, host: DrawableRef) -> Self {
        Self { layer_id, host }
    }

    fn set_host(&self, image: &mut Image, host: Option<DrawableRef>) {
        let Some(layer) = image.layer_mut(self.layer_id) else { return };
        layer.fs.host = host;
        layer.invalidate_fs_boundary();
        image.emit(ImageEvent::FloatingSelectionChanged);
        image.emit(ImageEvent::NameChanged(DrawableRef::Layer(self.layer_id)));
        image.update_full(DrawableRef::Layer(self.layer_id));
        ops::selection::invalidate_boundary(image);
    }
}

impl Command for FsToLayerUndo {
    fn undo(&mut self, image: &mut Image) {
        self.set_host(image, Some(self.host));
    }

    fn redo(&mut self, image: &mut Image) {
        self.set_host(image, None);
    }

    fn description(&self) -> String {
        "Floating Selection to Layer".to_string()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::FsToLayer
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

// ============================================================================
// DECORATIONS
// ============================================================================

pub struct GuidesUndo {
    guides: Vec<Guide>,
}

impl GuidesUndo {
    pub fn new(image: &Image) -> Self {
        Self { guides: image.guides.clone() }
    }

    fn swap(&mut self, image: &mut Image) {
        std::mem::swap(&mut self.guides, &mut image.guides);
    }
}

impl Command for GuidesUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        "Guides".to_string()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::ImageGuides
    }

    fn memory_size(&self) -> usize {
        self.guides.len() * std::mem::size_of::<Guide>()
    }
}

pub struct SamplePointsUndo {
    points: Vec<SamplePoint>,
}

impl SamplePointsUndo {
    pub fn new(image: &Image) -> Self {
        Self { points: image.sample_points.clone() }
    }

    fn swap(&mut self, image: &mut Image) {
        std::mem::swap(&mut self.points, &mut image.sample_points);
    }
}

impl Command for SamplePointsUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        "Sample Points".to_string()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::ImageSamplePoints
    }

    fn memory_size(&self) -> usize {
        self.points.len() * std::mem::size_of::<SamplePoint>()
    }
}

pub struct VectorsUndo {
    vectors: Vec<Vectors>,
}

impl VectorsUndo {
    pub fn new(image: &Image) -> Self {
        Self { vectors: image.vectors.clone() }
    }

    fn swap(&mut self, image: &mut Image) {
        std::mem::swap(&mut self.vectors, &mut image.vectors);
    }
}

impl Command for VectorsUndo {
    fn undo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn redo(&mut self, image: &mut Image) {
        self.swap(image);
    }

    fn description(&self) -> String {
        "Paths".to_string()
    }

    fn kind(&self) -> UndoKind {
        UndoKind::Vectors
    }

    fn memory_size(&self) -> usize {
        self.vectors.iter().map(|v| v.strokes.iter().map(|s| s.len() * 16).sum::<usize>()).sum::<usize>()
            + std::mem::size_of::<Self>()
    }
}
