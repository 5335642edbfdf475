use crate::geometry::Rect;
use crate::item::{DrawableRef, ItemId};

/// Something observable changed on an image. Mutating operations enqueue
/// these; the UI drains them with [`crate::image::Image::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum ImageEvent {
    /// Pixels of `item` changed within `rect` (image coordinates).
    Update { item: DrawableRef, rect: Rect },
    MaskChanged(ItemId),
    ApplyMaskChanged(ItemId),
    EditMaskChanged(ItemId),
    ShowMaskChanged(ItemId),
    OpacityChanged(ItemId),
    ModeChanged(ItemId),
    LockAlphaChanged(ItemId),
    NameChanged(DrawableRef),
    VisibilityChanged(DrawableRef),
    LayerAdded(ItemId),
    LayerRemoved(ItemId),
    ChannelAdded(ItemId),
    ChannelRemoved(ItemId),
    ActiveLayerChanged(Option<ItemId>),
    ActiveChannelChanged(Option<ItemId>),
    FloatingSelectionChanged,
    /// Cached selection outline is stale.
    SelectionInvalidated,
    QuickMaskChanged,
    SizeChanged {
        offset_x: i32,
        offset_y: i32,
        previous_width: i32,
        previous_height: i32,
    },
    Undo(String),
    Redo(String),
}

/// Pending events plus the union of all rectangles that need repainting.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<ImageEvent>,
    dirty_rect: Option<Rect>,
    dirty_generation: u64,
}

impl EventQueue {
    pub fn push(&mut self, event: ImageEvent) {
        if let ImageEvent::Update { rect, .. } = &event {
            self.mark_dirty(*rect);
        }
        self.events.push(event);
    }

    /// Merge with any existing dirty rect so pending updates are never lost.
    pub fn mark_dirty(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        self.dirty_rect = Some(match self.dirty_rect {
            Some(existing) => existing.union(&rect),
            None => rect,
        });
        self.dirty_generation = self.dirty_generation.wrapping_add(1);
    }

    pub fn dirty_rect(&self) -> Option<Rect> {
        self.dirty_rect
    }

    pub fn dirty_generation(&self) -> u64 {
        self.dirty_generation
    }

    pub fn take_dirty_rect(&mut self) -> Option<Rect> {
        self.dirty_rect.take()
    }

    pub fn drain(&mut self) -> Vec<ImageEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending(&self) -> &[ImageEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_accumulate_dirty_rect() {
        let mut q = EventQueue::default();
        q.push(ImageEvent::Update { item: DrawableRef::Selection, rect: Rect::new(0, 0, 2, 2) });
        q.push(ImageEvent::Update { item: DrawableRef::Selection, rect: Rect::new(5, 5, 1, 1) });
        assert_eq!(q.dirty_rect(), Some(Rect::new(0, 0, 6, 6)));
        assert_eq!(q.dirty_generation(), 2);
        assert_eq!(q.drain().len(), 2);
        assert!(q.is_empty());
    }
}
