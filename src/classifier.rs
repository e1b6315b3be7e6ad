/// Labels every face in a camera frame.
///
/// Detection runs on a quarter-size copy of the frame; boxes are scaled back
/// to full-resolution coordinates before they leave this module.

use anyhow::{bail, Result};
use image::{imageops, RgbImage};
use tracing::debug;

use crate::face::{BoundingBox, Embedding, FaceEncoder, FaceMatcher};
use crate::gallery::ReferenceGallery;

/// Detection runs at 1/DOWNSCALE_FACTOR of the frame size in each dimension.
pub const DOWNSCALE_FACTOR: u32 = 4;

/// Label given to faces that match no resident.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Full-resolution frame coordinates.
    pub location: BoundingBox,
    pub label: String,
    pub is_known: bool,
    /// Distance to the closest resident, `None` when the gallery is empty.
    pub distance: Option<f32>,
}

impl Detection {
    pub fn known(location: BoundingBox, label: impl Into<String>) -> Self {
        Self { location, label: label.into(), is_known: true, distance: None }
    }

    pub fn unknown(location: BoundingBox) -> Self {
        Self { location, label: UNKNOWN_LABEL.to_string(), is_known: false, distance: None }
    }
}

/// All detections of one frame, in detector order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameResult {
    pub detections: Vec<Detection>,
}

impl FrameResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn has_unknown(&self) -> bool {
        self.detections.iter().any(|d| !d.is_known)
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }
}

/// Quarter-size copy of `frame`, never smaller than 1×1.
pub fn downscale(frame: &RgbImage) -> RgbImage {
    let w = (frame.width() as f32 / DOWNSCALE_FACTOR as f32).round().max(1.0) as u32;
    let h = (frame.height() as f32 / DOWNSCALE_FACTOR as f32).round().max(1.0) as u32;
    imageops::resize(frame, w, h, imageops::FilterType::Triangle)
}

pub struct FrameClassifier<E, M> {
    encoder: E,
    matcher: M,
    gallery: ReferenceGallery,
}

impl<E: FaceEncoder, M: FaceMatcher> FrameClassifier<E, M> {
    pub fn new(encoder: E, matcher: M, gallery: ReferenceGallery) -> Self {
        Self { encoder, matcher, gallery }
    }

    pub fn gallery(&self) -> &ReferenceGallery {
        &self.gallery
    }

    /// Detect, encode and label every face in `frame`.
    pub fn classify(&mut self, frame: &RgbImage) -> Result<FrameResult> {
        let small = downscale(frame);
        let boxes = self.encoder.detect(&small)?;
        if boxes.is_empty() {
            return Ok(FrameResult::default());
        }

        let embeddings = self.encoder.encode(&small, &boxes)?;
        if embeddings.len() != boxes.len() {
            bail!("encoder returned {} embeddings for {} faces", embeddings.len(), boxes.len());
        }

        let detections = boxes
            .iter()
            .zip(&embeddings)
            .map(|(location, embedding)| {
                self.label(location.scaled(DOWNSCALE_FACTOR as i32), embedding)
            })
            .collect::<Vec<_>>();
        debug!("Frame: {} faces", detections.len());
        Ok(FrameResult::new(detections))
    }

    /// Closest resident wins; the first gallery entry wins exact ties.
    fn label(&self, location: BoundingBox, embedding: &Embedding) -> Detection {
        let mut best: Option<(usize, f32)> = None;
        for (idx, entry) in self.gallery.entries().iter().enumerate() {
            let d = self.matcher.distance(embedding, &entry.embedding);
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((idx, d));
            }
        }

        match best {
            Some((idx, d)) if self.matcher.is_match(d) => Detection {
                location,
                label: self.gallery.entries()[idx].name.clone(),
                is_known: true,
                distance: Some(d),
            },
            Some((_, d)) => Detection { distance: Some(d), ..Detection::unknown(location) },
            None => Detection::unknown(location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::L2Matcher;
    use image::Rgb;

    /// Returns fixed boxes/embeddings and records the frame size it saw.
    struct FixedEncoder {
        boxes: Vec<BoundingBox>,
        embeddings: Vec<Embedding>,
        seen: Option<(u32, u32)>,
    }

    impl FaceEncoder for FixedEncoder {
        fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>> {
            self.seen = Some(frame.dimensions());
            Ok(self.boxes.clone())
        }

        fn encode(&mut self, _frame: &RgbImage, _boxes: &[BoundingBox]) -> Result<Vec<Embedding>> {
            Ok(self.embeddings.clone())
        }
    }

    fn gallery() -> ReferenceGallery {
        let mut g = ReferenceGallery::default();
        g.insert("Alice".into(), Embedding::new(vec![1.0, 0.0, 0.0]));
        g.insert("Bob".into(), Embedding::new(vec![0.0, 1.0, 0.0]));
        g
    }

    fn classifier(
        boxes: Vec<BoundingBox>,
        embeddings: Vec<Vec<f32>>,
    ) -> FrameClassifier<FixedEncoder, L2Matcher> {
        let encoder = FixedEncoder {
            boxes,
            embeddings: embeddings.into_iter().map(Embedding::new).collect(),
            seen: None,
        };
        FrameClassifier::new(encoder, L2Matcher::new(0.5), gallery())
    }

    #[test]
    fn test_downscale_quarter() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([9, 9, 9]));
        assert_eq!(downscale(&frame).dimensions(), (160, 120));
        let tiny = RgbImage::new(2, 1);
        assert_eq!(downscale(&tiny).dimensions(), (1, 1));
    }

    #[test]
    fn test_labels_known_and_unknown() {
        let b1 = BoundingBox::new(1, 5, 6, 2);
        let b2 = BoundingBox::new(10, 20, 30, 12);
        let mut c = classifier(vec![b1, b2], vec![vec![0.1, 2.0, 0.0], vec![0.0, 0.0, 1.0]]);

        let result = c.classify(&RgbImage::new(64, 48)).unwrap();
        assert_eq!(c.encoder.seen, Some((16, 12)));
        assert_eq!(result.detections.len(), 2);

        assert_eq!(result.detections[0].label, "Bob");
        assert!(result.detections[0].is_known);
        assert_eq!(result.detections[0].location, b1.scaled(4));

        assert_eq!(result.detections[1].label, UNKNOWN_LABEL);
        assert!(!result.detections[1].is_known);
        assert_eq!(result.detections[1].location, BoundingBox::new(40, 80, 120, 48));
        assert!(result.has_unknown());
    }

    #[test]
    fn test_tie_picks_first_resident() {
        // Equidistant (0.765) from Alice and Bob.
        let mut narrow = classifier(vec![BoundingBox::new(0, 1, 1, 0)], vec![vec![1.0, 1.0, 0.0]]);
        let result = narrow.classify(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(result.detections[0].label, UNKNOWN_LABEL);

        let mut wide = classifier(vec![BoundingBox::new(0, 1, 1, 0)], vec![vec![1.0, 1.0, 0.0]]);
        wide.matcher = L2Matcher::new(1.0);
        let result = wide.classify(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(result.detections[0].label, "Alice");
    }

    #[test]
    fn test_no_faces_is_empty_result() {
        let mut c = classifier(Vec::new(), Vec::new());
        let result = c.classify(&RgbImage::new(32, 32)).unwrap();
        assert!(result.is_empty());
        assert!(!result.has_unknown());
    }

    #[test]
    fn test_embedding_count_mismatch_is_error() {
        let mut c = classifier(vec![BoundingBox::new(0, 1, 1, 0)], Vec::new());
        assert!(c.classify(&RgbImage::new(8, 8)).is_err());
    }

    #[test]
    fn test_empty_gallery_labels_unknown() {
        let encoder = FixedEncoder {
            boxes: vec![BoundingBox::new(0, 1, 1, 0)],
            embeddings: vec![Embedding::new(vec![1.0])],
            seen: None,
        };
        let mut c =
            FrameClassifier::new(encoder, L2Matcher::default(), ReferenceGallery::default());
        let result = c.classify(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(result.detections[0], Detection::unknown(BoundingBox::new(0, 4, 4, 0)));
    }
}
