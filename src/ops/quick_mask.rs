// ============================================================================
// QUICK MASK: edit the selection as a tinted channel
// ============================================================================
//
// Entering moves the selection into a channel named `Qmask`; leaving loads
// it back. Adding or removing that channel by any other route, undo
// included, only flips the state.

use crate::event::ImageEvent;
use crate::history::UndoKind;
use crate::image::{Image, QUICK_MASK_NAME};
use crate::item::{DrawableRef, ItemId, Positioned};
use crate::ops;

pub fn quick_mask_state(image: &Image) -> bool {
    image.quick_mask_state
}

fn quick_mask_channel(image: &Image) -> Option<ItemId> {
    image.channel_by_name(QUICK_MASK_NAME).map(|c| c.id())
}

/// Enter or leave quick mask mode. Calls made while a toggle is already in
/// progress return immediately.
pub fn set_quick_mask_state(image: &mut Image, active: bool) {
    if active == image.quick_mask_state {
        return;
    }
    let channel_was_active = if image.quick_mask_state {
        image.quick_mask_channel_was_active
    } else {
        image.active_channel().is_some()
    };
    // Set first so the channel hooks below see the new state
    image.quick_mask_state = active;
    image.quick_mask_channel_was_active = active && channel_was_active;

    let mask = quick_mask_channel(image);
    if active {
        if mask.is_none() {
            enter(image);
        }
    } else if let Some(mask) = mask {
        leave(image, mask, channel_was_active);
    }

    image.emit(ImageEvent::QuickMaskChanged);
}

fn enter(image: &mut Image) {
    image.history.begin_group(UndoKind::ImageQuickMask, "Enable Quick Mask");

    let color = image.quick_mask_color();
    let mut mask = if image.selection.channel.is_empty() {
        let mut channel = image.new_channel(QUICK_MASK_NAME, color);
        channel.clear();
        channel
    } else {
        let Some(channel) = ops::channel::duplicate(image, DrawableRef::Selection, QUICK_MASK_NAME) else {
            image.history.end_group();
            return;
        };
        ops::selection::clear(image, true);
        channel
    };
    mask.set_color(color);
    mask.drawable.item.visible = true;
    if image.quick_mask_inverted {
        mask.invert();
    }
    image.add_channel(mask, None, true);

    image.history.end_group();
    log::info!("quick mask enabled");
}

fn leave(image: &mut Image, mask: ItemId, channel_was_active: bool) {
    image.history.begin_group(UndoKind::ImageQuickMask, "Disable Quick Mask");

    if image.quick_mask_inverted {
        ops::channel::invert(image, DrawableRef::Channel(mask), true);
    }
    let fs_on_mask = image
        .floating_selection()
        .filter(|fs| image.layer(*fs).and_then(|l| l.floating_sel_host()) == Some(DrawableRef::Channel(mask)));
    if let Some(fs) = fs_on_mask {
        ops::floating_sel::anchor(image, fs);
    }
    ops::selection::load(image, DrawableRef::Channel(mask), true);
    image.remove_channel(mask, true);
    if !channel_was_active {
        image.unset_active_channel();
    }

    image.history.end_group();
    log::info!("quick mask disabled");
}

pub fn quick_mask_inverted(image: &Image) -> bool {
    image.quick_mask_inverted
}

/// Flip what the quick mask shows as selected. An active mask is inverted
/// in place.
pub fn invert_quick_mask(image: &mut Image) {
    if let Some(mask) = quick_mask_channel(image).filter(|_| image.quick_mask_state) {
        ops::channel::invert(image, DrawableRef::Channel(mask), true);
    }
    image.quick_mask_inverted = !image.quick_mask_inverted;
    image.emit(ImageEvent::QuickMaskChanged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelOp;
    use crate::geometry::Rect;
    use image::Rgba;

    fn image_with_selection() -> Image {
        let mut image = Image::new(8, 8);
        let layer = image.new_layer(8, 8, "Background", false);
        image.add_layer(layer, None, false);
        ops::selection::select_rect(&mut image, Rect::new(1, 1, 3, 3), ChannelOp::Replace, false);
        image
    }

    #[test]
    fn toggle_moves_selection_through_channel() {
        let mut image = image_with_selection();
        set_quick_mask_state(&mut image, true);
        assert!(quick_mask_state(&image));
        let mask = image.channel_by_name(QUICK_MASK_NAME).unwrap();
        assert_eq!(mask.color(), Rgba([255, 0, 0, 128]));
        assert_eq!(mask.value(2, 2), 255);
        assert!(image.selection_mut().is_empty());
        assert_eq!(image.history().undo_description().as_deref(), Some("Enable Quick Mask"));

        set_quick_mask_state(&mut image, false);
        assert!(!quick_mask_state(&image));
        assert!(image.channel_by_name(QUICK_MASK_NAME).is_none());
        assert_eq!(image.selection_mut().channel.content_bounds(), Some(Rect::new(1, 1, 3, 3)));
        assert_eq!(image.active_channel(), None);
    }

    #[test]
    fn repeated_requests_are_ignored() {
        let mut image = image_with_selection();
        set_quick_mask_state(&mut image, true);
        let steps = image.history().undo_count();
        set_quick_mask_state(&mut image, true);
        assert_eq!(image.history().undo_count(), steps);
        assert_eq!(image.channels().len(), 1);
    }

    #[test]
    fn undo_restores_state_without_new_channels() {
        let mut image = image_with_selection();
        set_quick_mask_state(&mut image, true);
        image.undo();
        assert!(!quick_mask_state(&image));
        assert!(image.channels().is_empty());
        assert_eq!(image.selection_mut().channel.content_bounds(), Some(Rect::new(1, 1, 3, 3)));
        image.redo();
        assert!(quick_mask_state(&image));
        assert_eq!(image.channels().len(), 1);
    }

    #[test]
    fn inverted_mask_round_trips() {
        let mut image = image_with_selection();
        invert_quick_mask(&mut image);
        set_quick_mask_state(&mut image, true);
        let mask = image.channel_by_name(QUICK_MASK_NAME).unwrap();
        assert_eq!(mask.value(2, 2), 0);
        assert_eq!(mask.value(6, 6), 255);
        set_quick_mask_state(&mut image, false);
        assert_eq!(image.selection_mut().channel.content_bounds(), Some(Rect::new(1, 1, 3, 3)));
    }

    #[test]
    fn empty_selection_gives_clear_mask() {
        let mut image = Image::new(4, 4);
        set_quick_mask_state(&mut image, true);
        let id = image.channel_by_name(QUICK_MASK_NAME).unwrap().id();
        assert!(image.channel_mut(id).unwrap().is_empty());
    }

    #[test]
    fn previously_active_channel_stays_active() {
        let mut image = image_with_selection();
        let channel = image.new_channel("Alpha", Rgba([0, 0, 0, 128]));
        let alpha = image.add_channel(channel, None, false);
        set_quick_mask_state(&mut image, true);
        set_quick_mask_state(&mut image, false);
        assert!(image.active_channel().is_some());
        assert!(image.channel(alpha).is_some());
    }
}
