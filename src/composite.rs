// ============================================================================
// PROJECTION: flatten the layer stack into one RGBA image
// ============================================================================
//
// Layers are blended bottom to top. A layer whose compositing nodes are
// built is resolved through the graph wiring; otherwise the mask flags
// decide the same routing directly.

use image::{GrayImage, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{LayerMode, TiledImage, blend_pixel};
use crate::graph::LayerRouting;
use crate::image::Image;
use crate::item::{PixelOwning, Positioned};
use crate::layer::{Layer, LayerKind};

/// Borrowed per-layer inputs for the parallel row loop.
struct LayerView<'a> {
    color: &'a TiledImage,
    mask: Option<&'a GrayImage>,
    offset: (i32, i32),
    size: (i32, i32),
    mode: LayerMode,
    opacity: f32,
    routing: LayerRouting,
}

fn routing(image: &Image, layer: &Layer) -> LayerRouting {
    if let Some(nodes) = layer.nodes().built() {
        return nodes.routing(image.graph());
    }
    let has_mask = layer.mask().is_some();
    LayerRouting {
        mask_on_aux: has_mask && layer.show_mask(),
        mask_on_aux2: has_mask && layer.apply_mask() && !layer.show_mask(),
    }
}

fn view<'a>(image: &'a Image, layer: &'a Layer) -> Option<LayerView<'a>> {
    if !layer.is_visible() || layer.kind() == LayerKind::Group {
        return None;
    }
    let color = layer.drawable().buffer().as_color()?;
    Some(LayerView {
        color,
        mask: layer.mask().and_then(|m| m.channel().drawable.buffer().as_mask()),
        offset: layer.offset(),
        size: (layer.width(), layer.height()),
        mode: layer.mode(),
        opacity: layer.opacity() as f32,
        routing: routing(image, layer),
    })
}

impl LayerView<'_> {
    /// What this layer contributes at image pixel `(x, y)`.
    fn sample(&self, x: i32, y: i32) -> Option<Rgba<u8>> {
        let (lx, ly) = (x - self.offset.0, y - self.offset.1);
        if lx < 0 || ly < 0 || lx >= self.size.0 || ly >= self.size.1 {
            return None;
        }
        let mask_value = || self.mask.map(|m| m.get_pixel(lx as u32, ly as u32)[0]);
        if self.routing.mask_on_aux {
            let v = mask_value()?;
            return Some(Rgba([v, v, v, 255]));
        }
        let mut px = *self.color.get_pixel(lx as u32, ly as u32);
        if self.routing.mask_on_aux2
            && let Some(m) = mask_value()
        {
            px[3] = ((px[3] as u32 * m as u32 + 127) / 255) as u8;
        }
        Some(px)
    }
}

/// Flatten all visible layers of `image` onto a transparent canvas.
pub fn project(image: &Image) -> RgbaImage {
    let (width, height) = (image.width().max(1) as u32, image.height().max(1) as u32);
    let views: Vec<LayerView> = image.layers().iter().filter_map(|l| view(image, l)).collect();
    log::debug!("project {}x{} from {} layers", width, height, views.len());

    let row_len = width as usize * 4;
    let mut raw = vec![0u8; row_len * height as usize];
    raw.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        for x in 0..width as usize {
            let mut base = Rgba([0, 0, 0, 0]);
            for v in &views {
                if let Some(top) = v.sample(x as i32, y as i32) {
                    base = blend_pixel(base, top, v.mode, v.opacity);
                }
            }
            row[x * 4..x * 4 + 4].copy_from_slice(&base.0);
        }
    });

    RgbaImage::from_raw(width, height, raw).unwrap_or_else(|| RgbaImage::new(width, height))
}
