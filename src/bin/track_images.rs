use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use log::info;

use face_mesh_tracker::config::{TrackerConfig, EXAMPLE_CONFIG};
use face_mesh_tracker::crop::Point2;
use face_mesh_tracker::frame::{Frame, ImageSequence};
use face_mesh_tracker::tracking::{FaceTracker, FrameOutcome, FrameResult, TrackingConsumer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Track a face through a directory of frames", long_about = None)]
struct Args {
    /// Directory of png/jpg frames, processed in file name order
    #[arg(required_unless_present = "print_config")]
    frames: Option<PathBuf>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Write annotated frames into this directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

/// Logs every frame and optionally saves it with the tracked points drawn in.
struct Annotator {
    output: Option<PathBuf>,
    index: usize,
    tracked: usize,
}

impl Annotator {
    fn new(output: Option<PathBuf>) -> Self {
        Self {
            output,
            index: 0,
            tracked: 0,
        }
    }

    fn draw(&self, frame: &Frame, result: &FrameResult) -> RgbImage {
        let mut image = upright_image(frame);
        let green = Rgb([0u8, 255u8, 0u8]);
        let red = Rgb([255u8, 0u8, 0u8]);
        let blue = Rgb([0u8, 128u8, 255u8]);

        let pixel = |x: f32, y: f32| frame.to_pixel(&Point2::new(x, y));

        if let Some(face) = &result.face {
            let corner = pixel(face.rect.x, face.rect.y);
            let size = pixel(face.rect.width, face.rect.height);
            let rect = Rect::at(corner.x as i32, corner.y as i32)
                .of_size((size.x as u32).max(1), (size.y as u32).max(1));
            draw_hollow_rect_mut(&mut image, rect, green);
        }

        if let Some(mesh) = &result.mesh {
            for p in mesh.keypoints.iter() {
                let p = pixel(p.x, p.y);
                draw_cross_mut(&mut image, green, p.x as i32, p.y as i32);
            }
        }

        if let Some(eyes) = &result.eyes {
            for eye in [&eyes.left, &eyes.right] {
                for p in eye.eye_contour.iter() {
                    let p = pixel(p.x, p.y);
                    draw_cross_mut(&mut image, blue, p.x as i32, p.y as i32);
                }
                if let (Some(center), Some(edge)) = (eye.iris.first(), eye.iris.get(1)) {
                    let c = pixel(center.x, center.y);
                    let e = pixel(edge.x, edge.y);
                    let radius = (e - c).norm().max(1.0);
                    let center = (c.x as i32, c.y as i32);
                    draw_hollow_circle_mut(&mut image, center, radius as i32, red);
                }
            }
        }

        image
    }
}

impl TrackingConsumer for Annotator {
    fn consume(&mut self, frame: &Frame, result: &FrameResult) {
        let index = self.index;
        self.index += 1;

        match result.outcome {
            FrameOutcome::Tracked => {
                self.tracked += 1;
                if let Some(eyes) = &result.eyes {
                    info!(
                        "frame {}: left iris {:?}, right iris {:?} ({})",
                        index,
                        eyes.left.iris_center().map(|p| (p.x, p.y)),
                        eyes.right.iris_center().map(|p| (p.x, p.y)),
                        if result.detected { "detected" } else { "tracked" }
                    );
                }
            }
            FrameOutcome::LowConfidence => info!("frame {}: low confidence", index),
            FrameOutcome::NoDetection => info!("frame {}: no face", index),
        }

        if let Some(dir) = &self.output {
            let path = dir.join(format!("frame_{:05}.png", index));
            if let Err(e) = self.draw(frame, result).save(&path) {
                log::error!("failed to write {}: {}", path.display(), e);
            }
        }
    }
}

/// The stored image turned into the upright view the landmarks refer to.
fn upright_image(frame: &Frame) -> RgbImage {
    let orientation = frame.orientation;
    let mut image = frame.image.clone();
    if orientation.mirror_horizontal {
        image = imageops::flip_horizontal(&image);
    }
    if orientation.mirror_vertical {
        image = imageops::flip_vertical(&image);
    }
    match orientation.quarter_turns % 4 {
        1 => imageops::rotate90(&image),
        2 => imageops::rotate180(&image),
        3 => imageops::rotate270(&image),
        _ => image,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if args.print_config {
        print!("{}", EXAMPLE_CONFIG);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            TrackerConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => TrackerConfig::default(),
    };
    config.validate()?;

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let frames_dir = args
        .frames
        .context("a frames directory is required")?;
    let mut source = ImageSequence::from_dir(&frames_dir, config.frame.orientation()?)?;

    let mut tracker = FaceTracker::from_config(&config)?;
    let mut annotator = Annotator::new(args.output);
    let count = tracker.run(&mut source, &mut annotator)?;

    info!("tracked {} of {} frames", annotator.tracked, count);

    Ok(())
}
