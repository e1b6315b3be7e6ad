/// Face primitives and the detection/matching seams.
///
/// The surveillance core never talks to a model directly: detection and
/// embedding go through `FaceEncoder`, scoring goes through `FaceMatcher`.

use anyhow::Result;
use image::RgbImage;

/// Face rectangle in pixel coordinates, (top, right, bottom, left) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self { top, right, bottom, left }
    }

    /// Build from an (x, y, w, h) rectangle, rounding to whole pixels.
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            top: y.round() as i32,
            right: (x + w).round() as i32,
            bottom: (y + h).round() as i32,
            left: x.round() as i32,
        }
    }

    /// Multiply every edge by `factor`.
    pub fn scaled(&self, factor: i32) -> Self {
        Self {
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            left: self.left * factor,
        }
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }
}

/// Fixed-length identity vector for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Detection + embedding capability.
///
/// `encode` returns one embedding per box, in the same order.
pub trait FaceEncoder {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>>;
    fn encode(&mut self, frame: &RgbImage, boxes: &[BoundingBox]) -> Result<Vec<Embedding>>;
}

impl<E: FaceEncoder + ?Sized> FaceEncoder for Box<E> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>> {
        (**self).detect(frame)
    }

    fn encode(&mut self, frame: &RgbImage, boxes: &[BoundingBox]) -> Result<Vec<Embedding>> {
        (**self).encode(frame, boxes)
    }
}

/// Embedding comparison with a built-in acceptance threshold.
pub trait FaceMatcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> f32;
    fn is_match(&self, distance: f32) -> bool;
}

/// L2 threshold published for SFace features.
pub const SFACE_L2_TOLERANCE: f32 = 1.128;

/// Euclidean distance between L2-normalised embeddings.
#[derive(Debug, Clone, Copy)]
pub struct L2Matcher {
    tolerance: f32,
}

impl L2Matcher {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }
}

impl Default for L2Matcher {
    fn default() -> Self {
        Self::new(SFACE_L2_TOLERANCE)
    }
}

impl FaceMatcher for L2Matcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return f32::INFINITY;
        }
        let norm_a = norm(a.as_slice());
        let norm_b = norm(b.as_slice());
        if norm_a == 0.0 || norm_b == 0.0 {
            return f32::INFINITY;
        }
        a.as_slice()
            .iter()
            .zip(b.as_slice())
            .map(|(x, y)| {
                let d = x / norm_a - y / norm_b;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }

    fn is_match(&self, distance: f32) -> bool {
        distance <= self.tolerance
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
