// ============================================================================
// Channels: 8-bit coverage drawables (named channels, masks, the selection)
// ============================================================================

use image::{GrayImage, Luma, Rgba};

use crate::drawable::{Drawable, PixelBuffer};
use crate::geometry::{BoundSeg, BoundaryType, HALF_WAY, Rect, find_boundary};
use crate::item::{ImageId, ItemBase, ItemId, Nameable, PixelOwning, Positioned};

/// Colour and opacity used to display masked-out areas.
pub type ChannelColor = Rgba<u8>;

/// How a new shape combines with existing channel content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChannelOp {
    #[default]
    Replace,
    Add,
    Subtract,
    Intersect,
}

/// Cached result of a bounds scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BoundsCache {
    Empty,
    NonEmpty(Rect),
}

#[derive(Clone, Debug)]
struct BoundaryCache {
    clip: Rect,
    segs_in: Vec<BoundSeg>,
    segs_out: Vec<BoundSeg>,
}

#[derive(Clone, Debug)]
pub struct Channel {
    pub(crate) drawable: Drawable,
    pub(crate) color: ChannelColor,
    pub(crate) show_masked: bool,
    bounds: Option<BoundsCache>,
    boundary: Option<BoundaryCache>,
}

impl Positioned for Channel {
    fn base(&self) -> &ItemBase {
        &self.drawable.item
    }

    fn base_mut(&mut self) -> &mut ItemBase {
        &mut self.drawable.item
    }
}

impl PixelOwning for Channel {
    fn drawable(&self) -> &Drawable {
        &self.drawable
    }

    fn drawable_mut(&mut self) -> &mut Drawable {
        &mut self.drawable
    }
}

impl Nameable for Channel {}

impl Channel {
    /// New black (fully unselected) channel.
    pub(crate) fn new(id: ItemId, image: ImageId, name: impl Into<String>, width: i32, height: i32, color: ChannelColor) -> Self {
        let item = ItemBase::new(id, image, name, width, height);
        Self {
            drawable: Drawable::new(item, PixelBuffer::new_mask(width, height), true),
            color,
            show_masked: false,
            bounds: Some(BoundsCache::Empty),
            boundary: None,
        }
    }

    pub fn color(&self) -> ChannelColor {
        self.color
    }

    pub fn set_color(&mut self, color: ChannelColor) {
        self.color = color;
    }

    pub fn show_masked(&self) -> bool {
        self.show_masked
    }

    fn mask(&self) -> Option<&GrayImage> {
        self.drawable.buffer().as_mask()
    }

    /// Value at a channel-local pixel, 0 outside.
    pub fn value(&self, x: i32, y: i32) -> u8 {
        self.drawable.buffer().coverage(x, y)
    }

    /// Drop cached bounds and outline. Required after any pixel change.
    pub fn invalidate_boundary(&mut self) {
        self.bounds = None;
        self.boundary = None;
    }

    fn set_known_bounds(&mut self, bounds: Option<Rect>) {
        self.bounds = Some(match bounds {
            Some(r) => BoundsCache::NonEmpty(r),
            None => BoundsCache::Empty,
        });
        self.boundary = None;
    }

    /// Channel-local bounding box of non-zero pixels, `None` when empty.
    pub fn content_bounds(&mut self) -> Option<Rect> {
        if let Some(cache) = self.bounds {
            return match cache {
                BoundsCache::Empty => None,
                BoundsCache::NonEmpty(r) => Some(r),
            };
        }
        let mut found: Option<(u32, u32, u32, u32)> = None;
        if let Some(mask) = self.mask() {
            for (x, y, px) in mask.enumerate_pixels() {
                if px[0] == 0 {
                    continue;
                }
                found = Some(match found {
                    None => (x, y, x, y),
                    Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
                });
            }
        }
        let bounds = found.map(|(x1, y1, x2, y2)| Rect::from_corners(x1 as i32, y1 as i32, x2 as i32 + 1, y2 as i32 + 1));
        self.set_known_bounds(bounds);
        bounds
    }

    pub fn is_empty(&mut self) -> bool {
        self.content_bounds().is_none()
    }

    /// Outline of the channel: `segs_in` restricted to `clip` (channel-local),
    /// `segs_out` over the whole channel. Cached until the next invalidation.
    pub fn boundary(&mut self, clip: Rect) -> (Vec<BoundSeg>, Vec<BoundSeg>) {
        if let Some(cache) = &self.boundary {
            if cache.clip == clip {
                return (cache.segs_in.clone(), cache.segs_out.clone());
            }
        }
        let full = Rect::new(0, 0, self.width(), self.height());
        let buffer = self.drawable.buffer();
        let sample = |x: i32, y: i32| buffer.coverage(x, y);
        let segs_in = find_boundary(full, BoundaryType::WithinBounds, clip, HALF_WAY, sample);
        let segs_out = find_boundary(full, BoundaryType::IgnoreBounds, full, HALF_WAY, sample);
        self.boundary = Some(BoundaryCache { clip, segs_in: segs_in.clone(), segs_out: segs_out.clone() });
        (segs_in, segs_out)
    }

    // ---- whole-channel fills -------------------------------------------------

    pub fn clear(&mut self) {
        if let Some(mask) = self.drawable.buffer_mut().as_mask_mut() {
            mask.fill(0);
        }
        self.set_known_bounds(None);
    }

    pub fn all(&mut self) {
        if let Some(mask) = self.drawable.buffer_mut().as_mask_mut() {
            mask.fill(255);
        }
        let full = Rect::new(0, 0, self.width(), self.height());
        self.set_known_bounds(Some(full));
    }

    pub fn invert(&mut self) {
        if let Some(mask) = self.drawable.buffer_mut().as_mask_mut() {
            for px in mask.pixels_mut() {
                px[0] = 255 - px[0];
            }
        }
        self.invalidate_boundary();
    }

    /// Combine a rectangle (channel-local) into the channel.
    pub fn combine_rect(&mut self, rect: Rect, op: ChannelOp) {
        let Some(mask) = self.drawable.buffer_mut().as_mask_mut() else { return };
        let (w, h) = (mask.width() as i32, mask.height() as i32);
        for y in 0..h {
            for x in 0..w {
                let inside = rect.contains(x, y);
                let px = mask.get_pixel_mut(x as u32, y as u32);
                *px = match op {
                    ChannelOp::Replace => Luma([if inside { 255 } else { 0 }]),
                    ChannelOp::Add if inside => Luma([255]),
                    ChannelOp::Subtract if inside => Luma([0]),
                    ChannelOp::Intersect if !inside => Luma([0]),
                    _ => *px,
                };
            }
        }
        self.invalidate_boundary();
    }

    /// Independent copy with a fresh identity.
    pub(crate) fn duplicate(&self, id: ItemId, name: impl Into<String>) -> Channel {
        let mut copy = self.clone();
        copy.drawable.item.id = id;
        copy.drawable.item.name = name.into();
        copy.drawable.item.removed = false;
        copy.boundary = None;
        copy
    }
}

// ============================================================================
// SELECTION
// ============================================================================

/// The image's running selection: a full-canvas channel plus the stroking
/// counter that makes it report empty while its own outline is being painted.
#[derive(Clone, Debug)]
pub struct Selection {
    pub(crate) channel: Channel,
    pub(crate) stroking_count: u32,
}

impl Selection {
    pub(crate) fn new(id: ItemId, image: ImageId, width: i32, height: i32, color: ChannelColor) -> Self {
        let mut channel = Channel::new(id, image, "Selection Mask", width, height, color);
        channel.drawable.item.visible = false;
        Self { channel, stroking_count: 0 }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn stroking_count(&self) -> u32 {
        self.stroking_count
    }

    pub fn push_stroking(&mut self) {
        self.stroking_count += 1;
    }

    pub fn pop_stroking(&mut self) {
        debug_assert!(self.stroking_count > 0, "unbalanced pop_stroking");
        self.stroking_count = self.stroking_count.saturating_sub(1);
    }

    /// Reports empty while a stroke of the selection is in progress.
    pub fn is_empty(&mut self) -> bool {
        if self.stroking_count > 0 {
            return true;
        }
        self.channel.is_empty()
    }

    pub fn value(&self, x: i32, y: i32) -> u8 {
        self.channel.value(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(w: i32, h: i32) -> Channel {
        Channel::new(ItemId(7), ImageId::new(), "c", w, h, Rgba([0, 0, 0, 128]))
    }

    #[test]
    fn bounds_follow_content() {
        let mut c = channel(10, 10);
        assert!(c.is_empty());
        c.combine_rect(Rect::new(2, 3, 4, 2), ChannelOp::Replace);
        assert_eq!(c.content_bounds(), Some(Rect::new(2, 3, 4, 2)));
        c.all();
        assert_eq!(c.content_bounds(), Some(Rect::new(0, 0, 10, 10)));
        c.invert();
        assert!(c.is_empty());
    }

    #[test]
    fn combine_ops() {
        let mut c = channel(8, 8);
        c.combine_rect(Rect::new(0, 0, 4, 4), ChannelOp::Replace);
        c.combine_rect(Rect::new(4, 4, 4, 4), ChannelOp::Add);
        assert_eq!(c.content_bounds(), Some(Rect::new(0, 0, 8, 8)));
        c.combine_rect(Rect::new(0, 0, 4, 4), ChannelOp::Subtract);
        assert_eq!(c.content_bounds(), Some(Rect::new(4, 4, 4, 4)));
        c.combine_rect(Rect::new(6, 6, 8, 8), ChannelOp::Intersect);
        assert_eq!(c.content_bounds(), Some(Rect::new(6, 6, 2, 2)));
    }

    #[test]
    fn boundary_is_clipped_inside_only() {
        let mut c = channel(10, 10);
        c.combine_rect(Rect::new(0, 0, 10, 10), ChannelOp::Replace);
        let (segs_in, segs_out) = c.boundary(Rect::new(0, 0, 5, 5));
        assert_eq!(crate::geometry::segments_bounds(&segs_in), Some(Rect::new(0, 0, 5, 5)));
        assert_eq!(crate::geometry::segments_bounds(&segs_out), Some(Rect::new(0, 0, 10, 10)));
    }

    #[test]
    fn stroking_hides_content() {
        let mut sel = Selection::new(ItemId(1), ImageId::new(), 4, 4, Rgba([0, 0, 0, 128]));
        sel.channel.all();
        assert!(!sel.is_empty());
        sel.push_stroking();
        assert!(sel.is_empty());
        sel.pop_stroking();
        assert!(!sel.is_empty());
    }
}
