// ============================================================================
// IMAGE CROP: shrink the canvas to a rectangle
// ============================================================================

use crate::event::ImageEvent;
use crate::geometry::{Orientation, Rect};
use crate::history::UndoKind;
use crate::image::Image;
use crate::item::{DrawableRef, ItemId, Positioned};
use crate::ops;
use crate::undo::{GuidesUndo, ImageSizeUndo, SamplePointsUndo, VectorsUndo};

/// Crop the image to `x1..x2 × y1..y2`. With `crop_layers` every layer is
/// clipped to the new canvas and layers falling entirely outside it are
/// removed; otherwise layers only move.
pub fn crop(image: &mut Image, x1: i32, y1: i32, x2: i32, y2: i32, crop_layers: bool) {
    let (width, height) = (x2 - x1, y2 - y1);
    if width <= 0 || height <= 0 {
        return;
    }
    let (old_width, old_height) = (image.width, image.height);
    log::info!("crop image {}x{} to ({}, {})..({}, {}) layers={}", old_width, old_height, x1, y1, x2, y2, crop_layers);

    let description = if crop_layers { "Crop Image" } else { "Resize Image" };
    image.history.begin_group(UndoKind::ImageCrop, description);

    // Size first, contained items clamp against it
    let record = ImageSizeUndo::new(image);
    image.history.push(Box::new(record));
    image.width = width;
    image.height = height;

    let channels: Vec<ItemId> = image.channels.iter().map(|c| c.id()).collect();
    for id in channels {
        ops::item::resize(image, DrawableRef::Channel(id), width, height, -x1, -y1, true);
    }

    let record = VectorsUndo::new(image);
    image.history.push(Box::new(record));
    for v in &mut image.vectors {
        v.resize(width, height, -x1, -y1);
    }

    ops::item::resize(image, DrawableRef::Selection, width, height, -x1, -y1, true);

    let layers: Vec<ItemId> = image.layers.iter().map(|l| l.id()).collect();
    for id in layers {
        // Gone with the layer it floated over
        if image.layer(id).is_none() {
            continue;
        }
        ops::item::translate(image, DrawableRef::Layer(id), -x1, -y1, true);
        if !crop_layers {
            continue;
        }
        let Some(bounds) = image.layer(id).map(|l| l.bounds()) else { continue };
        match bounds.intersect(&Rect::new(0, 0, width, height)) {
            Some(clamped) if !clamped.is_empty() => {
                if clamped != bounds {
                    let (off_x, off_y) = (bounds.x - clamped.x, bounds.y - clamped.y);
                    ops::item::resize(image, DrawableRef::Layer(id), clamped.width, clamped.height, off_x, off_y, true);
                }
            }
            _ => image.remove_layer(id, true),
        }
    }

    let record = GuidesUndo::new(image);
    image.history.push(Box::new(record));
    image.guides.retain_mut(|g| {
        let (lo, hi, shift) = match g.orientation {
            Orientation::Horizontal => (y1, y2, y1),
            Orientation::Vertical => (x1, x2, x1),
        };
        if !(lo..=hi).contains(&g.position) {
            return false;
        }
        g.position -= shift;
        true
    });

    let record = SamplePointsUndo::new(image);
    image.history.push(Box::new(record));
    image.sample_points.retain_mut(|p| {
        if !(x1..x2).contains(&p.x) || !(y1..y2).contains(&p.y) {
            return false;
        }
        p.x -= x1;
        p.y -= y1;
        true
    });

    image.history.end_group();

    let canvas = image.bounds();
    image.events.mark_dirty(canvas);
    image.emit(ImageEvent::SizeChanged {
        offset_x: -x1,
        offset_y: -y1,
        previous_width: old_width,
        previous_height: old_height,
    });
}
