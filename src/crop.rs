//! Rotation-normalized crop transforms between frame space and model tiles.
//!
//! Every stage of the tracker feeds its model a square tile cut out of the
//! frame. The tile is described by a rectangle in normalized frame coordinates
//! (origin top-left, `x` to the right, `y` down, both in `[0, 1]`), rotated
//! about its center, optionally shifted, scaled and mirrored. [`CropTransform`]
//! holds the affine matrix from frame space to tile space together with its
//! inverse, which is the only route model outputs take back into the frame.
//!
//! Normalized coordinates stretch each axis by a different pixel length. All
//! angles, squares and rotations are therefore taken in pixel proportions,
//! using the frame aspect (upright width / height).

use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub type Point2 = nalgebra::Point2<f32>;

/// Axis-aligned rectangle in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole frame.
    pub fn full_frame() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn from_min_max(min: Point2, max: Point2) -> Self {
        Self::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    /// Pixel-square region centered on `center`, `side` measured in frame heights.
    pub fn square_around(center: Point2, side: f32, aspect: f32) -> Self {
        let width = side / aspect;
        Self::new(center.x - width / 2.0, center.y - side / 2.0, width, side)
    }

    /// Smallest pixel square centered on the frame that contains all of it.
    pub fn letterbox(aspect: f32) -> Self {
        Self::square_around(Point2::new(0.5, 0.5), aspect.max(1.0), aspect)
    }

    /// Pixel square around the same center, as long as the longer side.
    ///
    /// Degenerate rectangles are returned unchanged.
    pub fn square_long(&self, aspect: f32) -> Self {
        if self.is_degenerate() {
            return *self;
        }
        let side = (self.width * aspect).max(self.height);
        Self::square_around(self.center(), side, aspect)
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// True when the rectangle cannot be turned into an invertible crop.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
            || !self.x.is_finite()
            || !self.y.is_finite()
            || !self.width.is_finite()
            || !self.height.is_finite()
    }
}

/// How a stored frame relates to the upright view the landmarks live in.
///
/// The stored image is first mirrored, then turned clockwise by
/// `quarter_turns * 90` degrees to become upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOrientation {
    pub quarter_turns: u8,
    pub mirror_horizontal: bool,
    pub mirror_vertical: bool,
}

impl FrameOrientation {
    pub fn upright() -> Self {
        Self::default()
    }

    /// Size of the upright view of a stored frame of `width` x `height` pixels.
    pub fn upright_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.quarter_turns % 2 == 1 {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Maps normalized coordinates of the stored frame to the upright frame.
    pub fn source_to_upright(&self) -> Matrix3<f32> {
        let mirror = Matrix3::new_nonuniform_scaling(&Vector2::new(
            if self.mirror_horizontal { -1.0 } else { 1.0 },
            if self.mirror_vertical { -1.0 } else { 1.0 },
        ));
        // one clockwise quarter turn on screen: (dx, dy) -> (-dy, dx)
        let quarter = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let mut turn = Matrix3::identity();
        for _ in 0..self.quarter_turns % 4 {
            turn = quarter * turn;
        }

        Matrix3::new_translation(&Vector2::new(0.5, 0.5))
            * turn
            * mirror
            * Matrix3::new_translation(&Vector2::new(-0.5, -0.5))
    }
}

/// Parameters of a crop: which part of the frame ends up in the model tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropOptions {
    /// Source rectangle in upright normalized frame coordinates.
    pub rect: NormalizedRect,
    /// Rotation of the rectangle about its center, counter-clockwise on screen.
    pub rotation: f32,
    /// Offset of the crop center, in units of the scaled rectangle size,
    /// measured along the rotated rectangle axes.
    pub shift: Vector2<f32>,
    /// Growth factor of the rectangle on each axis.
    pub scale: Vector2<f32>,
    pub mirror_horizontal: bool,
    pub mirror_vertical: bool,
    /// Orientation of the stored frame the tile is sampled from.
    pub orientation: FrameOrientation,
    /// Upright frame width over height.
    pub aspect: f32,
}

impl CropOptions {
    pub fn new(rect: NormalizedRect) -> Self {
        Self {
            rect,
            rotation: 0.0,
            shift: Vector2::zeros(),
            scale: Vector2::new(1.0, 1.0),
            mirror_horizontal: false,
            mirror_vertical: false,
            orientation: FrameOrientation::upright(),
            aspect: 1.0,
        }
    }

    pub fn rotation(mut self, radians: f32) -> Self {
        self.rotation = radians;
        self
    }

    pub fn shift(mut self, shift: Vector2<f32>) -> Self {
        self.shift = shift;
        self
    }

    pub fn scale(mut self, scale: Vector2<f32>) -> Self {
        self.scale = scale;
        self
    }

    pub fn mirror(mut self, horizontal: bool, vertical: bool) -> Self {
        self.mirror_horizontal = horizontal;
        self.mirror_vertical = vertical;
        self
    }

    pub fn orientation(mut self, orientation: FrameOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }
}

/// Affine map between upright frame space and the unit square of a model tile.
///
/// Built fresh for every stage invocation and never cached across frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropTransform {
    /// upright frame -> tile
    matrix: Matrix3<f32>,
    /// tile -> upright frame
    inverse: Matrix3<f32>,
    /// stored frame -> tile, with the frame orientation folded in
    sampling: Matrix3<f32>,
}

impl CropTransform {
    /// Builds the crop described by `options`.
    ///
    /// Rotation, shift and mirroring are applied in pixel proportions, so a
    /// pixel-square rectangle yields a pixel-square, unsheared tile at any angle.
    ///
    /// Fails with [`Error::DegenerateRoi`] when the source rectangle (or its
    /// scaled size) has no extent, since no invertible transform exists then.
    pub fn build(options: &CropOptions) -> Result<Self> {
        let rect = options.rect;
        if rect.is_degenerate() {
            return Err(Error::DegenerateRoi {
                width: rect.width,
                height: rect.height,
            });
        }

        let aspect = options.aspect;
        if !(aspect > 0.0) || !aspect.is_finite() {
            return Err(Error::DegenerateRoi {
                width: aspect,
                height: 1.0,
            });
        }

        // sizes and offsets in frame heights
        let size = Vector2::new(
            rect.width * aspect * options.scale.x,
            rect.height * options.scale.y,
        );
        if !(size.x > 0.0 && size.y > 0.0) || !size.x.is_finite() || !size.y.is_finite() {
            return Err(Error::DegenerateRoi {
                width: size.x,
                height: size.y,
            });
        }

        // counter-clockwise on screen is clockwise in y-down coordinates
        let (sin, cos) = options.rotation.sin_cos();
        let rotation = Matrix3::new(cos, sin, 0.0, -sin, cos, 0.0, 0.0, 0.0, 1.0);

        let offset = rotation
            * Vector3::new(options.shift.x * size.x, options.shift.y * size.y, 0.0);
        let center = Vector2::new(rect.center().x * aspect, rect.center().y) + offset.xy();

        let mirror = Vector2::new(
            if options.mirror_horizontal { -1.0 } else { 1.0 },
            if options.mirror_vertical { -1.0 } else { 1.0 },
        );

        let inverse = Matrix3::new_nonuniform_scaling(&Vector2::new(1.0 / aspect, 1.0))
            * Matrix3::new_translation(&center)
            * rotation
            * Matrix3::new_nonuniform_scaling(&size.component_mul(&mirror))
            * Matrix3::new_translation(&Vector2::new(-0.5, -0.5));

        let matrix = inverse.try_inverse().ok_or(Error::DegenerateRoi {
            width: size.x,
            height: size.y,
        })?;
        let sampling = matrix * options.orientation.source_to_upright();

        Ok(Self {
            matrix,
            inverse,
            sampling,
        })
    }

    /// Upright frame space to tile space.
    pub fn matrix(&self) -> &Matrix3<f32> {
        &self.matrix
    }

    /// Tile space back to upright frame space.
    pub fn inverse(&self) -> &Matrix3<f32> {
        &self.inverse
    }

    /// Stored (un-oriented) frame space to tile space; what a resampler warps with.
    pub fn sampling_matrix(&self) -> &Matrix3<f32> {
        &self.sampling
    }

    pub fn frame_to_tile(&self, point: &Point2) -> Point2 {
        self.matrix.transform_point(point)
    }

    pub fn tile_to_frame(&self, point: &Point2) -> Point2 {
        self.inverse.transform_point(point)
    }

    /// Corners of the tile in frame space: top-left, top-right, bottom-right, bottom-left.
    pub fn frame_corners(&self) -> [Point2; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]
        .map(|corner| self.tile_to_frame(&corner))
    }
}

/// In-plane rotation that levels the line from `left` to `right`, as seen in
/// pixels of a frame with the given aspect.
pub fn face_rotation(left: &Point2, right: &Point2, aspect: f32) -> f32 {
    let vec = right - left;
    -vec.y.atan2(vec.x * aspect)
}
