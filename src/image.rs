// ============================================================================
// Image: the aggregate owning every layer, channel and decoration
// ============================================================================

use image::{Rgba, RgbaImage};

use crate::canvas::TiledImage;
use crate::channel::{Channel, ChannelColor, Selection};
use crate::config::EngineConfig;
use crate::drawable::{Drawable, PixelBuffer};
use crate::event::{EventQueue, ImageEvent};
use crate::geometry::{Orientation, Rect};
use crate::graph::{LayerNodeSet, LayerNodes, NodeGraph, NodeId, NodeOp, Pad};
use crate::history::{Command, HistoryManager, UndoKind};
use crate::item::{DrawableRef, ImageId, ItemId, Nameable, Positioned};
use crate::layer::{Layer, LayerKind};
use crate::ops;
use crate::undo::{ActiveItems, ChannelStackUndo, LayerStackUndo, StackChange};
use crate::vectors::{Guide, SamplePoint, Vectors};

/// Name that marks a channel as the quick mask.
pub const QUICK_MASK_NAME: &str = "Qmask";

/// A layered image document.
///
/// Layers are stored bottom to top (index 0 is the bottom of the stack).
/// Items refer to each other by [`ItemId`] and are resolved through here.
#[derive(Debug)]
pub struct Image {
    id: ImageId,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) layers: Vec<Layer>,
    pub(crate) channels: Vec<Channel>,
    pub(crate) selection: Selection,
    pub(crate) vectors: Vec<Vectors>,
    pub(crate) guides: Vec<Guide>,
    pub(crate) sample_points: Vec<SamplePoint>,
    pub(crate) active_layer: Option<ItemId>,
    pub(crate) active_channel: Option<ItemId>,
    pub(crate) quick_mask_state: bool,
    /// Whether a channel was active when quick mask was entered.
    pub(crate) quick_mask_channel_was_active: bool,
    pub(crate) quick_mask_inverted: bool,
    pub(crate) quick_mask_color: ChannelColor,
    pub(crate) history: HistoryManager,
    pub(crate) graph: NodeGraph,
    pub(crate) events: EventQueue,
    config: EngineConfig,
    next_item_id: u32,
    next_decoration_id: u32,
}

impl Image {
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_config(width, height, EngineConfig::default())
    }

    pub fn with_config(width: i32, height: i32, config: EngineConfig) -> Self {
        debug_assert!(width > 0 && height > 0, "image size must be positive");
        let id = ImageId::new();
        let mut history = HistoryManager::new(config.history.max_steps);
        history.set_limits(config.history.max_steps, config.history.max_memory_bytes());
        Self {
            id,
            width,
            height,
            layers: Vec::new(),
            channels: Vec::new(),
            selection: Selection::new(ItemId(0), id, width, height, config.selection_color()),
            vectors: Vec::new(),
            guides: Vec::new(),
            sample_points: Vec::new(),
            active_layer: None,
            active_channel: None,
            quick_mask_state: false,
            quick_mask_channel_was_active: false,
            quick_mask_inverted: config.quick_mask.inverted,
            quick_mask_color: config.quick_mask_color(),
            history,
            graph: NodeGraph::new(),
            events: EventQueue::default(),
            config,
            next_item_id: 1,
            next_decoration_id: 1,
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn alloc_id(&mut self) -> ItemId {
        let id = ItemId(self.next_item_id);
        self.next_item_id += 1;
        id
    }

    // ---- item factories -----------------------------------------------------

    /// A fresh layer belonging to this image but not yet in its stack.
    pub fn new_layer(&mut self, width: i32, height: i32, name: impl Into<String>, has_alpha: bool) -> Layer {
        let id = self.alloc_id();
        Layer::new(id, self.id, name, width, height, has_alpha)
    }

    /// A layer holding a copy of `pixels`, placed at the origin.
    pub fn new_layer_from_rgba(&mut self, pixels: &RgbaImage, name: impl Into<String>) -> Layer {
        let mut layer = self.new_layer(pixels.width() as i32, pixels.height() as i32, name, true);
        *layer.drawable.buffer_mut() = PixelBuffer::Color(TiledImage::from_rgba_image(pixels));
        layer
    }

    /// An empty image-sized group layer.
    pub fn new_group_layer(&mut self, name: impl Into<String>) -> Layer {
        let mut layer = self.new_layer(self.width, self.height, name, true);
        layer.kind = LayerKind::Group;
        layer
    }

    /// A transparent layer standing in for rendered text.
    pub fn new_text_layer(&mut self, width: i32, height: i32, name: impl Into<String>) -> Layer {
        let mut layer = self.new_layer(width, height, name, true);
        layer.kind = LayerKind::Text;
        layer
    }

    /// A fresh, image-sized, fully unselected channel.
    pub fn new_channel(&mut self, name: impl Into<String>, color: ChannelColor) -> Channel {
        let id = self.alloc_id();
        Channel::new(id, self.id, name, self.width, self.height, color)
    }

    pub fn add_vectors(&mut self, name: impl Into<String>) -> ItemId {
        let id = self.alloc_id();
        self.vectors.push(Vectors { id, name: name.into(), width: self.width, height: self.height, strokes: Vec::new() });
        id
    }

    pub fn add_guide(&mut self, orientation: Orientation, position: i32) -> u32 {
        let id = self.next_decoration_id;
        self.next_decoration_id += 1;
        self.guides.push(Guide { id, orientation, position });
        id
    }

    pub fn add_sample_point(&mut self, x: i32, y: i32) -> u32 {
        let id = self.next_decoration_id;
        self.next_decoration_id += 1;
        self.sample_points.push(SamplePoint { id, x, y });
        id
    }

    // ---- lookup -------------------------------------------------------------

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: ItemId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn layer_mut(&mut self, id: ItemId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    pub fn layer_index(&self, id: ItemId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, id: ItemId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id() == id)
    }

    pub fn channel_mut(&mut self, id: ItemId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id() == id)
    }

    pub fn channel_by_name(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name() == name)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn vectors(&self) -> &[Vectors] {
        &self.vectors
    }

    pub fn guides(&self) -> &[Guide] {
        &self.guides
    }

    pub fn sample_points(&self) -> &[SamplePoint] {
        &self.sample_points
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn drawable(&self, r: DrawableRef) -> Option<&Drawable> {
        match r {
            DrawableRef::Layer(id) => self.layer(id).map(|l| &l.drawable),
            DrawableRef::LayerMask(id) => self.layer(id)?.mask.as_ref().map(|m| &m.channel.drawable),
            DrawableRef::Channel(id) => self.channel(id).map(|c| &c.drawable),
            DrawableRef::Selection => Some(&self.selection.channel.drawable),
        }
    }

    pub fn drawable_mut(&mut self, r: DrawableRef) -> Option<&mut Drawable> {
        match r {
            DrawableRef::Layer(id) => self.layer_mut(id).map(|l| &mut l.drawable),
            DrawableRef::LayerMask(id) => self.layer_mut(id)?.mask.as_mut().map(|m| &mut m.channel.drawable),
            DrawableRef::Channel(id) => self.channel_mut(id).map(|c| &mut c.drawable),
            DrawableRef::Selection => Some(&mut self.selection.channel.drawable),
        }
    }

    /// Channel behind a channel-like reference.
    pub(crate) fn channel_like_mut(&mut self, r: DrawableRef) -> Option<&mut Channel> {
        match r {
            DrawableRef::LayerMask(id) => self.layer_mut(id)?.mask.as_mut().map(|m| &mut m.channel),
            DrawableRef::Channel(id) => self.channel_mut(id),
            DrawableRef::Selection => Some(&mut self.selection.channel),
            DrawableRef::Layer(_) => None,
        }
    }

    /// Exact membership in this image's containers.
    pub fn is_attached(&self, r: DrawableRef) -> bool {
        match r {
            DrawableRef::Layer(id) => self.layer(id).is_some(),
            DrawableRef::LayerMask(id) => self.layer(id).is_some_and(|l| l.mask.is_some()),
            DrawableRef::Channel(id) => self.channel(id).is_some(),
            DrawableRef::Selection => true,
        }
    }

    // ---- active items -------------------------------------------------------

    pub fn active_layer(&self) -> Option<ItemId> {
        self.active_layer
    }

    pub fn active_channel(&self) -> Option<ItemId> {
        self.active_channel
    }

    /// Activating a layer deactivates any channel.
    pub fn set_active_layer(&mut self, id: Option<ItemId>) {
        debug_assert!(id.is_none_or(|id| self.layer(id).is_some()), "active layer not in image");
        if let Some(fs) = self.floating_selection() {
            // While floating, only the floating layer may be active
            if id != Some(fs) {
                return;
            }
        }
        if self.active_layer != id {
            self.active_layer = id;
            self.emit(ImageEvent::ActiveLayerChanged(id));
        }
        if id.is_some() {
            self.unset_active_channel();
        }
    }

    pub fn set_active_channel(&mut self, id: Option<ItemId>) {
        debug_assert!(id.is_none_or(|id| self.channel(id).is_some()), "active channel not in image");
        if self.floating_selection().is_some() && id.is_some() {
            return;
        }
        if self.active_channel != id {
            self.active_channel = id;
            self.emit(ImageEvent::ActiveChannelChanged(id));
        }
    }

    pub fn unset_active_channel(&mut self) {
        if self.active_channel.is_some() {
            self.active_channel = None;
            self.emit(ImageEvent::ActiveChannelChanged(None));
        }
    }

    /// What painting operations target: the active channel, else the active
    /// layer's mask while editing it, else the active layer.
    pub fn active_drawable(&self) -> Option<DrawableRef> {
        if let Some(ch) = self.active_channel {
            return Some(DrawableRef::Channel(ch));
        }
        let layer = self.layer(self.active_layer?)?;
        if layer.mask.is_some() && layer.edit_mask {
            Some(DrawableRef::LayerMask(layer.id()))
        } else {
            Some(DrawableRef::Layer(layer.id()))
        }
    }

    pub fn floating_selection(&self) -> Option<ItemId> {
        self.layers.iter().find(|l| l.is_floating_sel()).map(|l| l.id())
    }

    // ---- layer stack --------------------------------------------------------

    /// Insert `layer` at `position` (`None` = top) and make it active.
    pub fn add_layer(&mut self, layer: Layer, position: Option<usize>, push_undo: bool) -> ItemId {
        debug_assert_eq!(layer.image_id(), self.id, "layer belongs to another image");
        debug_assert!(self.layer(layer.id()).is_none(), "layer already attached");
        let id = layer.id();
        let index = position.unwrap_or(self.layers.len()).min(self.layers.len());
        let before = ActiveItems::of(self);
        let floating = layer.is_floating_sel();

        self.attach_layer(layer, index);
        self.set_active_layer(Some(id));

        if push_undo {
            let after = ActiveItems::of(self);
            self.history.push(Box::new(LayerStackUndo::new(StackChange::Add, id, index, before, after)));
        }
        if floating {
            ops::selection::invalidate_boundary(self);
        }
        id
    }

    /// Insert `layer` as the topmost child of `group`, directly below it.
    pub fn add_child_layer(&mut self, mut layer: Layer, group: ItemId, push_undo: bool) -> ItemId {
        let Some(index) = self.layer_index(group).filter(|&i| self.layers[i].is_group()) else {
            debug_assert!(false, "add_child_layer: {} is not a group", group);
            return layer.id();
        };
        layer.parent = Some(group);
        self.add_layer(layer, Some(index), push_undo)
    }

    /// Take `id` out of the stack. A floating selection hands activation back
    /// to its host; a floating selection hosted on the layer or its mask is
    /// removed first.
    pub fn remove_layer(&mut self, id: ItemId, push_undo: bool) {
        if self.layer_index(id).is_none() {
            debug_assert!(false, "remove_layer: {} not attached", id);
            return;
        }
        let hosted = self.floating_selection_on(|host| host.layer_id() == Some(id)).filter(|&fs| fs != id);
        if let Some(fs) = hosted {
            self.history.begin_group(UndoKind::Misc, "Remove Layer");
            self.remove_layer(fs, push_undo);
        }
        self.detach_and_record(id, push_undo);
        if hosted.is_some() {
            self.history.end_group();
        }
    }

    /// Floating selection whose host satisfies `pred`.
    pub(crate) fn floating_selection_on(&self, pred: impl Fn(DrawableRef) -> bool) -> Option<ItemId> {
        let fs = self.floating_selection()?;
        self.layer(fs).and_then(|l| l.floating_sel_host()).filter(|&h| pred(h)).map(|_| fs)
    }

    fn detach_and_record(&mut self, id: ItemId, push_undo: bool) {
        let Some(index) = self.layer_index(id) else { return };
        let before = ActiveItems::of(self);
        let prev_active = self.active_layer;
        let floating = self.layers[index].is_floating_sel();
        let host = self.layers[index].floating_sel_host();

        if floating {
            self.history.begin_group(UndoKind::FsAnchor, "Remove Floating Selection");
        }

        if let Some(layer) = self.detach_layer(id) {
            if prev_active == Some(id) {
                // Prefer the layer that took its place, else the one below
                let next = self.layers.get(index).or_else(|| index.checked_sub(1).and_then(|i| self.layers.get(i)));
                self.active_layer = next.map(|l| l.id());
                self.emit(ImageEvent::ActiveLayerChanged(self.active_layer));
            }
            if let Some(host) = host {
                ops::floating_sel::activate_host(self, host);
            }

            if push_undo {
                let mut record = LayerStackUndo::new(StackChange::Remove, id, index, before, ActiveItems::of(self));
                record.hold(layer);
                self.history.push(Box::new(record));
            }
        }

        if floating {
            self.history.end_group();
            ops::selection::invalidate_boundary(self);
            self.emit(ImageEvent::FloatingSelectionChanged);
        }
    }

    /// Container insert without undo or activation changes.
    pub(crate) fn attach_layer(&mut self, mut layer: Layer, index: usize) {
        let id = layer.id();
        layer.drawable.item.removed = false;
        if let Some(mask) = layer.mask.as_mut() {
            mask.channel.drawable.item.removed = false;
        }
        let extent = layer.bounds();
        let floating = layer.is_floating_sel();
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
        self.emit(ImageEvent::LayerAdded(id));
        self.update(DrawableRef::Layer(id), extent);
        if floating {
            self.emit(ImageEvent::FloatingSelectionChanged);
        }
    }

    /// Container removal without undo. The layer and its mask are marked removed.
    pub(crate) fn detach_layer(&mut self, id: ItemId) -> Option<Layer> {
        let index = self.layer_index(id)?;
        let mut layer = self.layers.remove(index);
        layer.drawable.item.removed = true;
        if let Some(mask) = layer.mask.as_mut() {
            mask.channel.drawable.item.removed = true;
        }
        self.events.mark_dirty(layer.bounds());
        self.emit(ImageEvent::LayerRemoved(id));
        if self.active_layer == Some(id) {
            self.active_layer = None;
        }
        Some(layer)
    }

    // ---- channels -----------------------------------------------------------

    /// Insert `channel` at `position` (`None` = top of the channel list) and
    /// make it the active channel. A floating selection keeps activation.
    pub fn add_channel(&mut self, channel: Channel, position: Option<usize>, push_undo: bool) -> ItemId {
        debug_assert_eq!(channel.image_id(), self.id, "channel belongs to another image");
        let id = channel.id();
        let index = position.unwrap_or(0).min(self.channels.len());

        let before = ActiveItems::of(self);
        self.attach_channel(channel, index);
        self.set_active_channel(Some(id));

        if push_undo {
            let after = ActiveItems::of(self);
            self.history.push(Box::new(ChannelStackUndo::new(StackChange::Add, id, index, before, after)));
        }
        id
    }

    pub fn remove_channel(&mut self, id: ItemId, push_undo: bool) {
        let Some(index) = self.channels.iter().position(|c| c.id() == id) else {
            debug_assert!(false, "remove_channel: {} not attached", id);
            return;
        };
        let before = ActiveItems::of(self);

        let fs_on_channel = self.floating_selection_on(|host| host == DrawableRef::Channel(id));
        if let Some(fs) = fs_on_channel {
            self.history.begin_group(UndoKind::Misc, "Remove Channel");
            self.remove_layer(fs, push_undo);
        }

        let Some(channel) = self.detach_channel(id) else { return };
        if before.channel == Some(id) {
            let next = self.channels.get(index).or_else(|| index.checked_sub(1).and_then(|i| self.channels.get(i)));
            self.active_channel = next.map(|c| c.id());
            self.emit(ImageEvent::ActiveChannelChanged(self.active_channel));
        }

        if push_undo {
            let mut record = ChannelStackUndo::new(StackChange::Remove, id, index, before, ActiveItems::of(self));
            record.hold(channel);
            self.history.push(Box::new(record));
        }
        if fs_on_channel.is_some() {
            self.history.end_group();
        }
    }

    pub(crate) fn attach_channel(&mut self, mut channel: Channel, index: usize) {
        let id = channel.id();
        let is_quick_mask = channel.name() == QUICK_MASK_NAME;
        channel.drawable.item.removed = false;
        let index = index.min(self.channels.len());
        self.channels.insert(index, channel);
        self.emit(ImageEvent::ChannelAdded(id));
        self.update(DrawableRef::Channel(id), self.bounds());
        if is_quick_mask {
            ops::quick_mask::set_quick_mask_state(self, true);
        }
    }

    pub(crate) fn detach_channel(&mut self, id: ItemId) -> Option<Channel> {
        let index = self.channels.iter().position(|c| c.id() == id)?;
        let mut channel = self.channels.remove(index);
        channel.drawable.item.removed = true;
        if self.active_channel == Some(id) {
            self.active_channel = None;
        }
        self.emit(ImageEvent::ChannelRemoved(id));
        self.events.mark_dirty(self.bounds());
        if channel.name() == QUICK_MASK_NAME {
            ops::quick_mask::set_quick_mask_state(self, false);
        }
        Some(channel)
    }

    // ---- compositing graph --------------------------------------------------

    /// Mode node of a layer, building its node chain on first request.
    pub fn layer_node(&mut self, id: ItemId) -> Option<NodeId> {
        let layer = self.layers.iter_mut().find(|l| l.id() == id)?;
        if let LayerNodes::Built(set) = layer.nodes {
            return Some(set.mode);
        }
        let graph = &mut self.graph;
        let (ox, oy) = layer.offset();
        let source = graph.create_node(NodeOp::Source(DrawableRef::Layer(id)));
        let layer_offset = graph.create_node(NodeOp::Translate { x: ox, y: oy });
        let mode = graph.create_node(NodeOp::Mode { mode: layer.mode, opacity: layer.opacity });
        graph.connect(source, layer_offset, Pad::Input);

        graph.connect(layer_offset, mode, Pad::Aux);
        layer.nodes = LayerNodes::Built(LayerNodeSet { source, layer_offset, mode, mask_source: None, mask_offset: None });
        // Mask nodes and routing follow the layer's flags
        ops::layer::sync_nodes(self, id);
        log::debug!("graph: built nodes for layer {}", id);
        Some(mode)
    }

    // ---- notification -------------------------------------------------------

    pub fn emit(&mut self, event: ImageEvent) {
        self.events.push(event);
    }

    /// Request a redraw of `rect` (image coordinates) on behalf of `item`.
    pub fn update(&mut self, item: DrawableRef, rect: Rect) {
        self.events.push(ImageEvent::Update { item, rect });
    }

    /// Redraw the whole extent of a drawable.
    pub fn update_full(&mut self, item: DrawableRef) {
        if let Some(bounds) = self.drawable(item).map(|d| d.bounds()) {
            self.update(item, bounds);
        }
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ImageEvent> {
        self.events.drain()
    }

    // ---- undo ---------------------------------------------------------------

    pub fn undo_group_start(&mut self, kind: UndoKind, description: impl Into<String>) {
        self.history.begin_group(kind, description);
    }

    pub fn undo_group_end(&mut self) {
        self.history.end_group();
    }

    pub fn push_undo(&mut self, command: Box<dyn Command>) {
        self.history.push(command);
    }

    pub fn undo(&mut self) -> Option<String> {
        debug_assert!(!self.history.is_group_open(), "undo inside an open group");
        let mut step = self.history.pop_undo()?;
        let description = step.command.description();
        log::info!("undo: {}", description);
        self.history.set_replaying(true);
        step.command.undo(self);
        self.history.set_replaying(false);
        self.history.push_redo(step);
        self.emit(ImageEvent::Undo(description.clone()));
        Some(description)
    }

    pub fn redo(&mut self) -> Option<String> {
        debug_assert!(!self.history.is_group_open(), "redo inside an open group");
        let mut step = self.history.pop_redo()?;
        let description = step.command.description();
        log::info!("redo: {}", description);
        self.history.set_replaying(true);
        step.command.redo(self);
        self.history.set_replaying(false);
        self.history.push_undo_replayed(step);
        self.emit(ImageEvent::Redo(description.clone()));
        Some(description)
    }

    // ---- quick mask accessors -----------------------------------------------

    pub fn quick_mask_color(&self) -> ChannelColor {
        self.quick_mask_color
    }

    pub fn set_quick_mask_color(&mut self, color: Rgba<u8>) {
        self.quick_mask_color = color;
        if let Some(ch) = self.channels.iter_mut().find(|c| c.name() == QUICK_MASK_NAME) {
            ch.set_color(color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_layer_goes_on_top_and_activates() {
        let mut image = Image::new(10, 10);
        let a = image.new_layer(10, 10, "a", true);
        let a = image.add_layer(a, None, false);
        let b = image.new_layer(10, 10, "b", true);
        let b = image.add_layer(b, None, false);
        assert_eq!(image.layer_index(b), Some(1));
        assert_eq!(image.active_layer(), Some(b));
        image.remove_layer(b, false);
        assert_eq!(image.active_layer(), Some(a));
        assert!(!image.is_attached(DrawableRef::Layer(b)));
    }

    #[test]
    fn removed_layer_comes_back_through_undo() {
        let mut image = Image::new(8, 8);
        let layer = image.new_layer(8, 8, "bg", false);
        let id = image.add_layer(layer, None, true);
        image.remove_layer(id, true);
        assert!(image.layer(id).is_none());
        assert_eq!(image.undo().as_deref(), Some("Remove Layer"));
        let restored = image.layer(id).unwrap();
        assert!(!restored.is_removed());
        assert_eq!(image.active_layer(), Some(id));
    }

    #[test]
    fn active_drawable_prefers_channel() {
        let mut image = Image::new(4, 4);
        let layer = image.new_layer(4, 4, "l", true);
        let l = image.add_layer(layer, None, false);
        assert_eq!(image.active_drawable(), Some(DrawableRef::Layer(l)));
        let ch = image.new_channel("c", Rgba([0, 0, 0, 128]));
        let c = image.add_channel(ch, None, false);
        assert_eq!(image.active_drawable(), Some(DrawableRef::Channel(c)));
    }

    #[test]
    fn layer_node_chain_is_built_once() {
        let mut image = Image::new(4, 4);
        let layer = image.new_layer(4, 4, "l", true);
        let l = image.add_layer(layer, None, false);
        let mode = image.layer_node(l).unwrap();
        let count = image.graph().node_count();
        assert_eq!(image.layer_node(l), Some(mode));
        assert_eq!(image.graph().node_count(), count);
        let set = *image.layer(l).unwrap().nodes().built().unwrap();
        assert_eq!(image.graph().producer(mode, Pad::Aux), Some(set.layer_offset));
        assert_eq!(image.graph().producer(mode, Pad::Aux2), None);
    }
}
