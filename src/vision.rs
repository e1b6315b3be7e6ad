/// OpenCV backends: camera capture, YuNet/SFace face engine, HighGUI window.
///
/// Frames cross into the core as RGB `image::RgbImage`; conversions to and
/// from OpenCV's BGR `Mat` happen only here.

use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use image::RgbImage;
use opencv::{
    core::{Mat, Point, Ptr, Rect, Scalar, Size, Vector},
    highgui, imgcodecs, imgproc,
    objdetect::{FaceDetectorYN, FaceRecognizerSF},
    prelude::*,
    videoio::{VideoCapture, CAP_ANY},
};
use tracing::{debug, info, warn};

use crate::classifier::{Detection, FrameResult};
use crate::face::{BoundingBox, Embedding, FaceEncoder};
use crate::surveillance::{Display, FrameSource, LoopControl};

// ── Frame conversion ──────────────────────────────────────────────────────────

pub fn rgb_to_bgr_mat(img: &RgbImage) -> Result<Mat> {
    let flat = Mat::from_slice(img.as_raw().as_slice())?;
    let rgb = flat.reshape(3, img.height() as i32)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

pub fn bgr_mat_to_rgb(bgr: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let (w, h) = (rgb.cols() as u32, rgb.rows() as u32);
    let bytes = rgb.data_bytes()?.to_vec();
    RgbImage::from_raw(w, h, bytes)
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", w, h))
}

// ── Camera ────────────────────────────────────────────────────────────────────

/// Opened local camera device.
pub struct CameraStream {
    cap: VideoCapture,
    pub camera_id: u32,
}

impl CameraStream {
    pub fn open(camera_id: u32) -> Result<Self> {
        info!("Opening camera {}", camera_id);
        let index = i32::try_from(camera_id)
            .with_context(|| format!("camera ID {} is not a valid device index", camera_id))?;
        let cap = VideoCapture::new(index, CAP_ANY)?;
        if !cap.is_opened()? {
            bail!(
                "Failed to open camera (ID: {}). Please check your camera connection.",
                camera_id
            );
        }
        Ok(Self { cap, camera_id })
    }

    /// Next raw BGR frame.
    pub fn read_bgr(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            bail!("empty frame or read error on camera {}", self.camera_id);
        }
        Ok(frame)
    }
}

impl FrameSource for CameraStream {
    fn read_frame(&mut self) -> Result<RgbImage> {
        bgr_mat_to_rgb(&self.read_bgr()?)
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        let _ = self.cap.release();
    }
}

/// Whether camera `id` opens and delivers one frame.
pub fn camera_available(id: u32) -> bool {
    match CameraStream::open(id) {
        Ok(mut stream) => stream.read_bgr().is_ok(),
        Err(e) => {
            debug!("Camera {} probe failed: {}", id, e);
            false
        }
    }
}

/// Camera ids from 0 upward that deliver frames, stopping at the first gap.
pub fn list_cameras(max_probes: u32) -> Vec<u32> {
    (0..max_probes).take_while(|id| camera_available(*id)).collect()
}

// ── Face engine ───────────────────────────────────────────────────────────────

/// SFace input edge length.
const SFACE_INPUT: i32 = 112;

/// YuNet detection + SFace embeddings.
pub struct OpenCvFaceEngine {
    detector: Ptr<FaceDetectorYN>,
    recognizer: Ptr<FaceRecognizerSF>,
    /// Rows from the last `detect`, kept for landmark-aligned crops.
    last_faces: Vec<(BoundingBox, Mat)>,
}

impl OpenCvFaceEngine {
    pub fn new(detector_model: &Path, recognizer_model: &Path) -> Result<Self> {
        ensure!(
            detector_model.is_file(),
            "face detector model not found: {}",
            detector_model.display()
        );
        ensure!(
            recognizer_model.is_file(),
            "face recognizer model not found: {}",
            recognizer_model.display()
        );

        let detector = FaceDetectorYN::create(
            &detector_model.to_string_lossy(),
            "",
            Size::new(320, 320),
            0.9,
            0.3,
            5000,
            0,
            0,
        )
        .context("loading YuNet face detector")?;
        let recognizer = FaceRecognizerSF::create(&recognizer_model.to_string_lossy(), "", 0, 0)
            .context("loading SFace recognizer")?;

        info!("Face models loaded: {} / {}", detector_model.display(), recognizer_model.display());
        Ok(Self { detector, recognizer, last_faces: Vec::new() })
    }

    fn embed(&mut self, image: &Mat, b: &BoundingBox) -> Result<Embedding> {
        let mut aligned = Mat::default();
        match self.last_faces.iter().find(|(fb, _)| fb == b) {
            Some((_, row)) => self.recognizer.align_crop(image, row, &mut aligned)?,
            None => aligned = crop_resized(image, b, SFACE_INPUT)?,
        }
        let mut feature = Mat::default();
        self.recognizer.feature(&aligned, &mut feature)?;
        Ok(Embedding::new(feature.data_typed::<f32>()?.to_vec()))
    }
}

impl FaceEncoder for OpenCvFaceEngine {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>> {
        let image = rgb_to_bgr_mat(frame)?;
        self.detector.set_input_size(Size::new(image.cols(), image.rows()))?;

        let mut faces = Mat::default();
        self.detector.detect(&image, &mut faces)?;

        self.last_faces.clear();
        for i in 0..faces.rows() {
            let at = |c: i32| faces.at_2d::<f32>(i, c).map(|v| *v);
            let b = BoundingBox::from_xywh(at(0)?, at(1)?, at(2)?, at(3)?);
            self.last_faces.push((b, faces.row(i)?.try_clone()?));
        }
        Ok(self.last_faces.iter().map(|(b, _)| *b).collect())
    }

    fn encode(&mut self, frame: &RgbImage, boxes: &[BoundingBox]) -> Result<Vec<Embedding>> {
        let image = rgb_to_bgr_mat(frame)?;
        let mut out = Vec::with_capacity(boxes.len());
        for b in boxes {
            out.push(self.embed(&image, b)?);
        }
        Ok(out)
    }
}

/// Crop `b` (clamped to the image) and resize to `edge`×`edge`.
fn crop_resized(image: &Mat, b: &BoundingBox, edge: i32) -> Result<Mat> {
    let x1 = b.left.max(0);
    let y1 = b.top.max(0);
    let x2 = b.right.min(image.cols());
    let y2 = b.bottom.min(image.rows());
    if x2 <= x1 || y2 <= y1 {
        bail!("face box {:?} lies outside the frame", b);
    }
    let roi = Mat::roi(image, Rect::new(x1, y1, x2 - x1, y2 - y1))?;
    let mut resized = Mat::default();
    imgproc::resize(&roi, &mut resized, Size::new(edge, edge), 0.0, 0.0, imgproc::INTER_LINEAR)?;
    Ok(resized)
}

// ── Window ────────────────────────────────────────────────────────────────────

pub const SURVEILLANCE_WINDOW: &str = "Surveillance";

const KEY_ESC: i32 = 27;

fn bgr(r: u8, g: u8, b: u8) -> Scalar {
    Scalar::new(b as f64, g as f64, r as f64, 0.0)
}

/// HighGUI window; `q` stops the loop.
pub struct Window {
    name: String,
}

impl Window {
    pub fn open(name: &str) -> Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self { name: name.to_string() })
    }

    pub fn show(&self, image: &Mat) -> Result<()> {
        highgui::imshow(&self.name, image)?;
        Ok(())
    }

    /// Pump the event loop for 1 ms and return the low byte of the key, if any.
    pub fn poll_key(&self) -> Result<Option<i32>> {
        let key = highgui::wait_key(1)?;
        Ok((key >= 0).then_some(key & 0xFF))
    }
}

impl Display for Window {
    fn present(&mut self, frame: &RgbImage, result: &FrameResult) -> Result<LoopControl> {
        let mut image = rgb_to_bgr_mat(frame)?;
        for detection in result.iter() {
            draw_detection(&mut image, detection)?;
        }
        self.show(&image)?;
        Ok(match self.poll_key()? {
            Some(k) if k == 'q' as i32 => LoopControl::Stop,
            _ => LoopControl::Continue,
        })
    }

    fn stop_hint(&self) -> &'static str {
        "Press 'q' to quit."
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        let _ = highgui::destroy_all_windows();
    }
}

/// Box plus a filled label band along its bottom edge.
fn draw_detection(image: &mut Mat, d: &Detection) -> Result<()> {
    let color = if d.is_known {
        bgr(0x00, 0xFF, 0x00)
    } else {
        bgr(0xFF, 0x00, 0x00)
    };
    let b = d.location;
    imgproc::rectangle_points(
        image,
        Point::new(b.left, b.top),
        Point::new(b.right, b.bottom),
        color,
        2,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::rectangle_points(
        image,
        Point::new(b.left, b.bottom - 35),
        Point::new(b.right, b.bottom),
        color,
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        image,
        &d.label,
        Point::new(b.left + 6, b.bottom - 6),
        imgproc::FONT_HERSHEY_COMPLEX,
        0.8,
        bgr(0xFF, 0xFF, 0xFF),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

// ── Enrollment ────────────────────────────────────────────────────────────────

/// Live preview; SPACE saves the frame to `dest`, `q`/ESC aborts.
/// Returns whether a frame was saved.
pub fn capture_reference(camera_id: u32, dest: &Path) -> Result<bool> {
    let mut stream = CameraStream::open(camera_id)?;
    let window = Window::open("Enroll")?;

    loop {
        let frame = stream.read_bgr()?;
        window.show(&frame)?;
        match window.poll_key()? {
            Some(k) if k == ' ' as i32 => {
                let written = imgcodecs::imwrite(&dest.to_string_lossy(), &frame, &Vector::new())?;
                ensure!(written, "could not write {}", dest.display());
                info!("Saved reference face to {}", dest.display());
                return Ok(true);
            }
            Some(k) if k == 'q' as i32 || k == KEY_ESC => {
                warn!("Enrollment aborted");
                return Ok(false);
            }
            _ => {}
        }
    }
}
