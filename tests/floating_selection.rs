use image::{Rgba, RgbaImage};

use paintfe_engine::Image;
use paintfe_engine::channel::ChannelOp;
use paintfe_engine::error::{EngineError, RegionAction};
use paintfe_engine::geometry::{Rect, segments_bounds};
use paintfe_engine::item::{DrawableRef, ItemId, Nameable, Positioned};
use paintfe_engine::layer::{AddMaskType, MaskApplyMode};
use paintfe_engine::ops;

fn image_with_background() -> (Image, ItemId) {
    let mut image = Image::new(16, 16);
    let pixels = RgbaImage::from_pixel(16, 16, Rgba([200, 200, 200, 255]));
    let layer = image.new_layer_from_rgba(&pixels, "Background");
    let id = image.add_layer(layer, None, false);
    (image, id)
}

fn patch(image: &mut Image, size: u32, color: Rgba<u8>) -> paintfe_engine::layer::Layer {
    image.new_layer_from_rgba(&RgbaImage::from_pixel(size, size, color), "Pasted Layer")
}

fn floating_count(image: &Image) -> usize {
    image.layers().iter().filter(|l| l.is_floating_sel()).count()
}

#[test]
fn at_most_one_floating_selection() {
    let (mut image, bg) = image_with_background();
    for round in 0..3 {
        let layer = patch(&mut image, 4, Rgba([255, 0, 0, 255]));
        let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::Layer(bg));
        assert_eq!(floating_count(&image), 1, "round {}", round);
        assert_eq!(image.floating_selection(), Some(fs));
    }
    // Two earlier pastes were anchored into the background
    assert_eq!(image.layers().len(), 2);

    ops::selection::select_rect(&mut image, Rect::new(8, 8, 4, 4), ChannelOp::Replace, true);
    ops::selection::float(&mut image, DrawableRef::Layer(bg), true, 1, 1).unwrap();
    assert_eq!(floating_count(&image), 1);
}

#[test]
fn float_and_anchor_moves_pixels() {
    let (mut image, bg) = image_with_background();
    let layer = patch(&mut image, 2, Rgba([0, 0, 255, 255]));
    let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::Layer(bg));
    ops::floating_sel::anchor(&mut image, fs);

    ops::selection::select_rect(&mut image, Rect::new(0, 0, 2, 2), ChannelOp::Replace, true);
    let fs = ops::selection::float(&mut image, DrawableRef::Layer(bg), true, 6, 6).unwrap();
    assert_eq!(image.layer(fs).unwrap().bounds(), Rect::new(6, 6, 2, 2));
    ops::floating_sel::anchor(&mut image, fs);

    let out = paintfe_engine::composite::project(&image);
    assert_eq!(*out.get_pixel(7, 7), Rgba([0, 0, 255, 255]));
    // The cut left transparency behind
    assert_eq!(out.get_pixel(0, 0)[3], 0);
    assert!(image.floating_selection().is_none());
}

#[test]
fn float_refuses_an_empty_region() {
    let (mut image, bg) = image_with_background();
    let steps = image.history().undo_count();
    assert_eq!(
        ops::selection::float(&mut image, DrawableRef::Layer(bg), true, 0, 0),
        Err(EngineError::EmptyRegion(RegionAction::Float))
    );
    assert_eq!(image.history().undo_count(), steps);
}

#[test]
fn floating_outline_replaces_empty_selection_outline() {
    let (mut image, bg) = image_with_background();
    let mut pixels = RgbaImage::new(6, 6);
    for y in 1..4 {
        for x in 2..5 {
            pixels.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    let layer = image.new_layer_from_rgba(&pixels, "Pasted Layer");
    let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::Layer(bg));
    ops::item::translate(&mut image, DrawableRef::Layer(fs), 5, 5, true);

    assert!(ops::selection::is_empty(&mut image));
    let (inner, outer) = ops::selection::boundary(&mut image);
    assert!(outer.is_empty());
    assert_eq!(inner, ops::floating_sel::boundary(&mut image, fs));
    assert_eq!(segments_bounds(&inner), Some(Rect::new(7, 6, 3, 3)));
}

#[test]
fn floating_mask_paste_cannot_become_a_layer() {
    let (mut image, bg) = image_with_background();
    let mask = ops::layer::create_mask(&mut image, bg, AddMaskType::White, None).unwrap();
    ops::layer::add_mask(&mut image, bg, mask, true).unwrap();
    let layer = patch(&mut image, 3, Rgba([0, 0, 0, 255]));
    let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::LayerMask(bg));

    assert_eq!(ops::floating_sel::to_layer(&mut image, fs), Err(EngineError::FloatingSelectionOnChannel));
    assert_eq!(image.floating_selection(), Some(fs));

    ops::floating_sel::anchor(&mut image, fs);
    let mask = image.layer(bg).unwrap().mask().unwrap();
    assert_eq!(mask.channel().value(1, 1), 0);
    assert_eq!(mask.channel().value(10, 10), 255);
}

#[test]
fn undo_of_anchor_restores_floating_state() {
    let (mut image, bg) = image_with_background();
    let layer = patch(&mut image, 2, Rgba([0, 255, 0, 255]));
    let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::Layer(bg));
    ops::floating_sel::anchor(&mut image, fs);
    assert_eq!(image.undo().as_deref(), Some("Anchor Floating Selection"));
    assert_eq!(image.floating_selection(), Some(fs));
    assert_eq!(image.layer(fs).unwrap().floating_sel_host(), Some(DrawableRef::Layer(bg)));
}

#[test]
fn removing_the_host_layer_takes_the_floating_selection_along() {
    let (mut image, _) = image_with_background();
    let host = image.new_layer(8, 8, "Host", true);
    let host = image.add_layer(host, None, false);
    let layer = patch(&mut image, 2, Rgba([255, 0, 0, 255]));
    let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::Layer(host));

    image.remove_layer(host, true);
    assert!(image.layer(host).is_none());
    assert!(image.layer(fs).is_none());
    assert_eq!(floating_count(&image), 0);
    assert_eq!(image.history().undo_description().as_deref(), Some("Remove Layer"));

    image.undo();
    assert_eq!(image.floating_selection(), Some(fs));
    assert_eq!(image.layer(fs).unwrap().floating_sel_host(), Some(DrawableRef::Layer(host)));
    assert!(image.is_attached(DrawableRef::Layer(host)));
}

#[test]
fn discarding_the_host_mask_takes_the_floating_selection_along() {
    let (mut image, bg) = image_with_background();
    let mask = ops::layer::create_mask(&mut image, bg, AddMaskType::White, None).unwrap();
    ops::layer::add_mask(&mut image, bg, mask, true).unwrap();
    let layer = patch(&mut image, 3, Rgba([0, 0, 0, 255]));
    let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::LayerMask(bg));

    ops::layer::apply_mask(&mut image, bg, MaskApplyMode::Discard, true);
    assert!(image.layer(bg).unwrap().mask().is_none());
    assert!(image.layer(fs).is_none());
    assert_eq!(floating_count(&image), 0);
    assert_eq!(image.history().undo_description().as_deref(), Some("Delete Layer Mask"));

    image.undo();
    assert!(image.layer(bg).unwrap().mask().is_some());
    assert_eq!(image.layer(fs).unwrap().floating_sel_host(), Some(DrawableRef::LayerMask(bg)));
}

#[test]
fn crop_that_drops_the_host_drops_the_floating_selection() {
    let (mut image, bg) = image_with_background();
    let corner = image.new_layer(3, 3, "Corner", true);
    let corner = image.add_layer(corner, None, false);
    ops::item::translate(&mut image, DrawableRef::Layer(corner), 12, 12, false);
    let layer = patch(&mut image, 2, Rgba([0, 0, 255, 255]));
    let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::Layer(corner));

    ops::crop::crop(&mut image, 0, 0, 8, 8, true);
    assert!(image.layer(corner).is_none());
    assert!(image.layer(fs).is_none());
    assert_eq!(image.layers().len(), 1);
    assert_eq!(image.layer(bg).unwrap().bounds(), Rect::new(0, 0, 8, 8));
    assert_eq!(image.history().undo_description().as_deref(), Some("Crop Image"));
}

#[test]
fn saving_the_selection_keeps_the_floating_selection() {
    let (mut image, bg) = image_with_background();
    ops::selection::select_rect(&mut image, Rect::new(2, 2, 4, 4), ChannelOp::Replace, true);
    let fs = ops::selection::float(&mut image, DrawableRef::Layer(bg), false, 0, 0).unwrap();
    ops::selection::select_rect(&mut image, Rect::new(1, 1, 3, 3), ChannelOp::Replace, true);

    let saved = ops::selection::save(&mut image).unwrap();
    assert_eq!(image.floating_selection(), Some(fs));
    assert_eq!(image.active_layer(), Some(fs));
    assert_eq!(image.active_channel(), None);
    assert_eq!(image.channel_mut(saved).unwrap().content_bounds(), Some(Rect::new(1, 1, 3, 3)));
}

#[test]
fn renaming_a_floating_selection_makes_it_a_layer_in_one_step() {
    let (mut image, bg) = image_with_background();
    let layer = patch(&mut image, 2, Rgba([0, 255, 0, 255]));
    let fs = ops::floating_sel::attach(&mut image, layer, DrawableRef::Layer(bg));
    let steps = image.history().undo_count();

    ops::item::rename(&mut image, DrawableRef::Layer(fs), "Leaf", true).unwrap();
    let renamed = image.layer(fs).unwrap();
    assert!(!renamed.is_floating_sel());
    assert_eq!(renamed.name(), "Leaf");
    assert_eq!(image.history().undo_count(), steps + 1);
    assert_eq!(image.history().undo_description().as_deref(), Some("Rename Layer"));

    image.undo();
    let restored = image.layer(fs).unwrap();
    assert_eq!(restored.floating_sel_host(), Some(DrawableRef::Layer(bg)));
    assert_eq!(restored.name(), "Pasted Layer");
}
