use image::{Rgba, RgbaImage};

use paintfe_engine::Image;
use paintfe_engine::channel::ChannelOp;
use paintfe_engine::event::ImageEvent;
use paintfe_engine::geometry::{Orientation, Rect};
use paintfe_engine::history::UndoKind;
use paintfe_engine::item::{DrawableRef, ItemId, PixelOwning, Positioned};
use paintfe_engine::ops;
use paintfe_engine::progress::NullProgress;

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 90, 255]))
}

fn layered_image() -> (Image, ItemId, ItemId) {
    let mut image = Image::new(20, 20);
    let bg = image.new_layer_from_rgba(&gradient(20, 20), "Background");
    let bg = image.add_layer(bg, None, false);
    let sticker = image.new_layer_from_rgba(&gradient(5, 5), "Sticker");
    let sticker = image.add_layer(sticker, None, false);
    ops::item::translate(&mut image, DrawableRef::Layer(sticker), 14, 1, false);
    (image, bg, sticker)
}

#[test]
fn crop_drops_layers_outside_the_rectangle() {
    let (mut image, bg, sticker) = layered_image();
    ops::crop::crop(&mut image, 0, 8, 12, 20, true);
    assert!(image.layer(sticker).is_none());
    assert_eq!(image.layer(bg).unwrap().bounds(), Rect::new(0, 0, 12, 12));
    assert_eq!(image.history().undo_kind(), Some(UndoKind::ImageCrop));

    // Content kept its image position
    let out = paintfe_engine::composite::project(&image);
    assert_eq!(*out.get_pixel(3, 2), Rgba([30, 100, 90, 255]));
}

#[test]
fn crop_reports_the_size_change() {
    let (mut image, _, _) = layered_image();
    image.drain_events();
    ops::crop::crop(&mut image, 2, 3, 10, 9, false);
    let events = image.drain_events();
    assert!(events.contains(&ImageEvent::SizeChanged {
        offset_x: -2,
        offset_y: -3,
        previous_width: 20,
        previous_height: 20,
    }));
    assert_eq!((image.width(), image.height()), (8, 6));
}

#[test]
fn same_size_resize_changes_nothing() {
    let (mut image, bg, sticker) = layered_image();
    let channel = image.new_channel("Saved", Rgba([0, 0, 0, 128]));
    let ch = image.add_channel(channel, None, false);
    ops::channel::combine_rect(&mut image, DrawableRef::Channel(ch), Rect::new(4, 4, 3, 3), ChannelOp::Replace, false);
    ops::selection::select_rect(&mut image, Rect::new(1, 1, 6, 2), ChannelOp::Replace, false);

    let snapshot = |image: &Image| {
        let mut out = Vec::new();
        for id in [bg, sticker] {
            let layer = image.layer(id).unwrap();
            out.push((layer.bounds(), layer.drawable().buffer().clone()));
        }
        let channel = image.channel(ch).unwrap();
        out.push((channel.bounds(), channel.drawable().buffer().clone()));
        let selection = image.selection().channel();
        out.push((selection.bounds(), selection.drawable().buffer().clone()));
        out
    };
    let before = snapshot(&image);
    ops::resize::resize(&mut image, 20, 20, 0, 0, &mut NullProgress);
    assert_eq!(snapshot(&image), before);
}

#[test]
fn resize_with_offset_undoes_in_one_step() {
    let (mut image, bg, sticker) = layered_image();
    image.add_guide(Orientation::Horizontal, 10);
    ops::resize::resize(&mut image, 30, 24, 5, 2, &mut NullProgress);
    assert_eq!(image.layer(bg).unwrap().offset(), (5, 2));
    assert_eq!(image.layer(sticker).unwrap().offset(), (19, 3));
    assert_eq!(image.guides()[0].position, 12);

    assert_eq!(image.undo().as_deref(), Some("Resize Image"));
    assert_eq!((image.width(), image.height()), (20, 20));
    assert_eq!(image.layer(sticker).unwrap().offset(), (14, 1));
    assert_eq!(image.guides()[0].position, 10);
}

#[test]
fn fit_canvas_to_selection() {
    let (mut image, bg, _) = layered_image();
    ops::selection::select_rect(&mut image, Rect::new(4, 6, 8, 5), ChannelOp::Replace, false);
    ops::resize::resize_to_selection(&mut image, &mut NullProgress);
    assert_eq!((image.width(), image.height()), (8, 5));
    assert_eq!(image.layer(bg).unwrap().offset(), (-4, -6));
    assert_eq!(ops::selection::bounds(&mut image), Some(Rect::new(0, 0, 8, 5)));
}
