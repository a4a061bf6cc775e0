//! Frames, frame sources and the affine resampler that cuts model tiles.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::Matrix3;

use crate::crop::{CropTransform, FrameOrientation, Point2};
use crate::{Error, Result};

/// A captured frame and the orientation it was stored in.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub orientation: FrameOrientation,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            orientation: FrameOrientation::upright(),
        }
    }

    pub fn with_orientation(image: RgbImage, orientation: FrameOrientation) -> Self {
        Self { image, orientation }
    }

    /// Width and height of the upright view, in pixels.
    pub fn upright_size(&self) -> (u32, u32) {
        self.orientation
            .upright_size(self.image.width(), self.image.height())
    }

    /// Upright width over height; 1 for an empty frame.
    pub fn aspect(&self) -> f32 {
        match self.upright_size() {
            (width, height) if width > 0 && height > 0 => width as f32 / height as f32,
            _ => 1.0,
        }
    }

    /// Converts a normalized upright point to upright pixel coordinates.
    pub fn to_pixel(&self, point: &Point2) -> Point2 {
        let (width, height) = self.upright_size();
        Point2::new(point.x * width as f32, point.y * height as f32)
    }
}

/// Produces frames one at a time until exhausted.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Frame source over a list of still images, read in order.
pub struct ImageSequence {
    paths: std::vec::IntoIter<PathBuf>,
    orientation: FrameOrientation,
}

impl ImageSequence {
    pub fn new(paths: Vec<PathBuf>, orientation: FrameOrientation) -> Self {
        Self {
            paths: paths.into_iter(),
            orientation,
        }
    }

    /// All png/jpg/jpeg files in `dir`, sorted by file name.
    pub fn from_dir<P: AsRef<Path>>(dir: P, orientation: FrameOrientation) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        log::info!("found {} frames", paths.len());

        Ok(Self::new(paths, orientation))
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.paths.next() {
            Some(path) => {
                log::debug!("reading frame {}", path.display());
                let image = image::open(&path)?.to_rgb8();
                Ok(Some(Frame::with_orientation(image, self.orientation)))
            }
            None => Ok(None),
        }
    }
}

/// Cuts a model tile out of a frame along an arbitrary affine crop.
pub trait Resampler: Send + Sync {
    fn resample(
        &self,
        frame: &Frame,
        width: u32,
        height: u32,
        transform: &CropTransform,
    ) -> Result<RgbImage>;
}

/// [`Resampler`] backed by `imageproc`'s projective warp.
#[derive(Debug, Clone, Copy)]
pub struct AffineResampler {
    interpolation: Interpolation,
}

impl AffineResampler {
    pub fn new(interpolation: Interpolation) -> Self {
        Self { interpolation }
    }
}

impl Default for AffineResampler {
    fn default() -> Self {
        Self::new(Interpolation::Bilinear)
    }
}

impl Resampler for AffineResampler {
    fn resample(
        &self,
        frame: &Frame,
        width: u32,
        height: u32,
        transform: &CropTransform,
    ) -> Result<RgbImage> {
        if width == 0 || height == 0 {
            return Err(Error::Resample(format!("empty tile {}x{}", width, height)));
        }

        let source = &frame.image;
        let to_normalized = Matrix3::new_nonuniform_scaling(&nalgebra::Vector2::new(
            1.0 / source.width() as f32,
            1.0 / source.height() as f32,
        ));
        let to_tile_pixels = Matrix3::new_nonuniform_scaling(&nalgebra::Vector2::new(
            width as f32,
            height as f32,
        ));
        let pixels = to_tile_pixels * transform.sampling_matrix() * to_normalized;

        let projection = Projection::from_matrix(row_major(&pixels))
            .ok_or_else(|| Error::Resample("crop projection is not invertible".to_string()))?;

        let mut tile = RgbImage::new(width, height);
        warp_into(source, &projection, self.interpolation, Rgb([0, 0, 0]), &mut tile);

        Ok(tile)
    }
}

fn row_major(m: &Matrix3<f32>) -> [f32; 9] {
    [
        m[(0, 0)],
        m[(0, 1)],
        m[(0, 2)],
        m[(1, 0)],
        m[(1, 1)],
        m[(1, 2)],
        m[(2, 0)],
        m[(2, 1)],
        m[(2, 2)],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::{CropOptions, NormalizedRect};

    fn quadrant_frame() -> Frame {
        // left half red, right half blue
        let image = RgbImage::from_fn(80, 40, |x, _| {
            if x < 40 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        Frame::new(image)
    }

    #[test]
    fn test_axis_aligned_crop_samples_the_rect() {
        let frame = quadrant_frame();
        let transform =
            CropTransform::build(&CropOptions::new(NormalizedRect::new(0.0, 0.0, 0.4, 1.0)))
                .unwrap();
        let tile = AffineResampler::default()
            .resample(&frame, 16, 16, &transform)
            .unwrap();

        assert_eq!(tile.dimensions(), (16, 16));
        assert_eq!(tile.get_pixel(8, 8), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_mirrored_crop_swaps_sides() {
        let frame = quadrant_frame();
        let rect = NormalizedRect::new(0.25, 0.25, 0.5, 0.5);
        let plain = CropTransform::build(&CropOptions::new(rect)).unwrap();
        let mirrored = CropTransform::build(&CropOptions::new(rect).mirror(true, false)).unwrap();

        let resampler = AffineResampler::default();
        let a = resampler.resample(&frame, 16, 16, &plain).unwrap();
        let b = resampler.resample(&frame, 16, 16, &mirrored).unwrap();

        assert_eq!(a.get_pixel(2, 8), &Rgb([255, 0, 0]));
        assert_eq!(b.get_pixel(2, 8), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_frame_orientation_is_applied_when_sampling() {
        let mut frame = quadrant_frame();
        frame.orientation.mirror_horizontal = true;
        let transform =
            CropTransform::build(&CropOptions::new(NormalizedRect::new(0.0, 0.0, 0.4, 1.0)))
                .unwrap();
        let tile = AffineResampler::default()
            .resample(&frame, 16, 16, &transform)
            .unwrap();

        // the upright left edge is the stored right edge
        assert_eq!(tile.get_pixel(8, 8), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_empty_tile_is_rejected() {
        let frame = quadrant_frame();
        let transform =
            CropTransform::build(&CropOptions::new(NormalizedRect::full_frame())).unwrap();
        let result = AffineResampler::default().resample(&frame, 0, 16, &transform);
        assert!(matches!(result, Err(Error::Resample(_))));
    }

    #[test]
    fn test_to_pixel_uses_upright_size() {
        let mut frame = quadrant_frame();
        frame.orientation.quarter_turns = 1;
        let p = frame.to_pixel(&Point2::new(0.5, 0.25));
        assert_eq!((p.x, p.y), (20.0, 20.0));
    }

    #[test]
    fn test_aspect_follows_orientation() {
        let mut frame = quadrant_frame();
        assert_eq!(frame.aspect(), 2.0);
        frame.orientation.quarter_turns = 3;
        assert_eq!(frame.aspect(), 0.5);
        assert_eq!(Frame::new(RgbImage::new(0, 10)).aspect(), 1.0);
    }

    #[test]
    fn test_letterbox_pads_a_wide_frame() {
        let frame = Frame::new(RgbImage::from_pixel(256, 128, Rgb([255, 255, 255])));
        let options = CropOptions::new(NormalizedRect::letterbox(frame.aspect()))
            .aspect(frame.aspect());
        let transform = CropTransform::build(&options).unwrap();
        let tile = AffineResampler::default()
            .resample(&frame, 16, 16, &transform)
            .unwrap();

        // the frame fills the middle half of the tile, rows above and below are padding
        assert_eq!(tile.get_pixel(8, 1), &Rgb([0, 0, 0]));
        assert_eq!(tile.get_pixel(8, 14), &Rgb([0, 0, 0]));
        assert_eq!(tile.get_pixel(8, 8), &Rgb([255, 255, 255]));
        assert_eq!(tile.get_pixel(1, 8), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_image_sequence_reads_sorted_frames() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("b.png", 20u8), ("a.png", 10u8)] {
            RgbImage::from_pixel(4, 4, Rgb([value, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequence::from_dir(dir.path(), FrameOrientation::upright()).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(first.image.get_pixel(0, 0)[0], 10);
        assert_eq!(second.image.get_pixel(0, 0)[0], 20);
        assert!(source.next_frame().unwrap().is_none());
    }
}
