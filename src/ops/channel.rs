// ============================================================================
// CHANNEL OPERATIONS: whole-channel fills and rectangle combines
// ============================================================================
//
// Work on any channel-like drawable: saved channels, layer masks and the
// selection. Each edit is recorded as a buffer swap.

use crate::channel::{Channel, ChannelOp};
use crate::drawable::BufferState;
use crate::geometry::Rect;
use crate::image::Image;
use crate::item::DrawableRef;
use crate::ops;

/// Run `edit` on a scratch copy of the channel and install the result.
fn edit_channel<F>(image: &mut Image, target: DrawableRef, push_undo: bool, description: &str, edit: F)
where
    F: FnOnce(&mut Channel),
{
    debug_assert!(target.is_channel_like(), "{}: {:?} is not a channel", description, target);
    let Some(channel) = image.channel_like_mut(target) else { return };
    let mut scratch = channel.clone();
    edit(&mut scratch);
    let state: BufferState = scratch.drawable.state();
    ops::item::replace_state(image, target, state, push_undo, description);
}

pub fn clear(image: &mut Image, target: DrawableRef, push_undo: bool) {
    let description = if target == DrawableRef::Selection { "Select None" } else { "Clear Channel" };
    edit_channel(image, target, push_undo, description, Channel::clear);
}

pub fn all(image: &mut Image, target: DrawableRef, push_undo: bool) {
    let description = if target == DrawableRef::Selection { "Select All" } else { "Fill Channel" };
    edit_channel(image, target, push_undo, description, Channel::all);
}

pub fn invert(image: &mut Image, target: DrawableRef, push_undo: bool) {
    let description = if target == DrawableRef::Selection { "Invert Selection" } else { "Invert Channel" };
    edit_channel(image, target, push_undo, description, Channel::invert);
}

/// Combine a rectangle given in channel-local coordinates.
pub fn combine_rect(image: &mut Image, target: DrawableRef, rect: Rect, op: ChannelOp, push_undo: bool) {
    let description = if target == DrawableRef::Selection { "Rectangle Select" } else { "Channel Rectangle" };
    edit_channel(image, target, push_undo, description, |c| c.combine_rect(rect, op));
}

/// Duplicate a channel under a new name. The copy is not attached.
pub fn duplicate(image: &mut Image, source: DrawableRef, name: impl Into<String>) -> Option<Channel> {
    let id = image.alloc_id();
    let channel = image.channel_like_mut(source)?;
    let mut copy = channel.duplicate(id, name);
    copy.drawable.item.removed = false;
    Some(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Positioned;
    use image::Rgba;

    fn image_with_channel() -> (Image, crate::item::ItemId) {
        let mut image = Image::new(8, 8);
        let channel = image.new_channel("Alpha", Rgba([255, 0, 0, 128]));
        let id = image.add_channel(channel, None, false);
        (image, id)
    }

    #[test]
    fn fill_and_undo() {
        let (mut image, id) = image_with_channel();
        all(&mut image, DrawableRef::Channel(id), true);
        assert_eq!(image.channel(id).unwrap().value(7, 7), 255);
        assert_eq!(image.history().undo_description().as_deref(), Some("Fill Channel"));
        image.undo();
        assert!(image.channel_mut(id).unwrap().is_empty());
    }

    #[test]
    fn invert_twice_is_identity() {
        let (mut image, id) = image_with_channel();
        combine_rect(&mut image, DrawableRef::Channel(id), Rect::new(2, 2, 3, 3), ChannelOp::Replace, false);
        invert(&mut image, DrawableRef::Channel(id), false);
        assert_eq!(image.channel(id).unwrap().value(2, 2), 0);
        assert_eq!(image.channel(id).unwrap().value(0, 0), 255);
        invert(&mut image, DrawableRef::Channel(id), false);
        assert_eq!(image.channel_mut(id).unwrap().content_bounds(), Some(Rect::new(2, 2, 3, 3)));
    }

    #[test]
    fn duplicate_keeps_pixels_and_color() {
        let (mut image, id) = image_with_channel();
        all(&mut image, DrawableRef::Channel(id), false);
        let copy = duplicate(&mut image, DrawableRef::Channel(id), "Alpha copy").unwrap();
        assert_ne!(copy.id(), id);
        assert_eq!(copy.color(), Rgba([255, 0, 0, 128]));
        assert_eq!(copy.value(4, 4), 255);
    }
}
