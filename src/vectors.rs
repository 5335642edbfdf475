// ============================================================================
// Image decorations that follow canvas geometry: paths, guides, sample points
// ============================================================================

use crate::geometry::Orientation;
use crate::item::ItemId;

/// A path made of polyline strokes in image coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Vectors {
    pub(crate) id: ItemId,
    pub(crate) name: String,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) strokes: Vec<Vec<(f64, f64)>>,
}

impl Vectors {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    pub fn strokes(&self) -> &[Vec<(f64, f64)>] {
        &self.strokes
    }

    pub fn add_stroke(&mut self, points: Vec<(f64, f64)>) {
        self.strokes.push(points);
    }

    /// Follow a canvas resize: new extent, content moved by the offset.
    pub(crate) fn resize(&mut self, new_w: i32, new_h: i32, off_x: i32, off_y: i32) {
        for stroke in &mut self.strokes {
            for p in stroke.iter_mut() {
                p.0 += off_x as f64;
                p.1 += off_y as f64;
            }
        }
        self.width = new_w;
        self.height = new_h;
    }
}

/// A horizontal or vertical ruler line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Guide {
    pub id: u32,
    pub orientation: Orientation,
    pub position: i32,
}

/// A pinned colour-picker location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplePoint {
    pub id: u32,
    pub x: i32,
    pub y: i32,
}
