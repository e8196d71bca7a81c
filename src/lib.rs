//! Pyramid histogram-of-gradients (PHOG) feature extraction.
//!
//! A [`Phog`] instance analyzes an image once (edge detection, gradient
//! magnitude and orientation fields, per-pixel orientation binning) and then
//! answers descriptor queries for arbitrary rectangular regions. Each query
//! walks a breadth-first quadtree pyramid over the region and concatenates
//! the edge-gated orientation histogram of every cell into one long feature
//! vector.
//!
//! The crate also provides [`Keypoint`], a serializable local-feature
//! record (position, scale, orientation and a byte-quantized descriptor)
//! for interchange with keypoint matching and indexing code.
//!
//! # Example
//! ```no_run
//! use phog::{Phog, Rect};
//!
//! let mut phog = Phog::default();
//! phog.analyze_path("image.png").unwrap();
//! let feature = phog.extract_feature(Rect::new(0.0, 0.0, 320.0, 240.0)).unwrap();
//! assert_eq!(feature.len(), 8 * 85);
//! ```

mod gradient;
mod histogram;
mod keypoint;
mod rect;
mod sampler;

pub use histogram::{Histogram, OrientationBinner};
pub use keypoint::{
    rescale_keypoints, shift_keypoints, Keypoint, KeypointLocation, DEFAULT_DESCRIPTOR_LENGTH,
};
pub use rect::Rect;
pub use sampler::QuadtreeSampler;

use gradient::{edge_mask, gradient_magnitudes_and_orientations};
use image::DynamicImage;
use log::*;
use ndarray::Array2;
use std::path::Path;
use thiserror::Error;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// The error type for PHOG extraction and keypoint serialization.
#[derive(Debug, Error)]
pub enum Error {
    /// The input image has no pixels.
    #[error("input image has zero area")]
    EmptyImage,
    /// A feature was requested before any image was analyzed.
    #[error("no image has been analyzed yet")]
    NotAnalyzed,
    /// The query rectangle has zero or negative area.
    #[error("region {0:?} has no area")]
    EmptyRegion(Rect),
    #[error("pyramid level count must be positive")]
    InvalidLevelCount,
    #[error("orientation bin count must be positive")]
    InvalidBinCount,
    /// The homogeneous divisor of a projective transform was zero.
    #[error("projective transform is degenerate at ({x}, {y})")]
    DegenerateTransform { x: f32, y: f32 },
    /// A keypoint text record held a token that is not a valid number.
    #[error("invalid numeric literal {token:?} in keypoint record")]
    InvalidKeypointToken { token: String },
    /// A keypoint text record held a descriptor value outside `[0, 255]`.
    #[error("descriptor value {value} outside [0, 255]")]
    DescriptorByteRange { value: i16 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Contains the configuration parameters of the PHOG extractor.
///
/// The most commonly tuned parameter is the pyramid depth; [`Phog::new`]
/// sets it and leaves everything else at its default. The defaults produce
/// the classic 8-bin, 4-level, 680-dimensional PHOG shape.
#[derive(Debug)]
pub struct Phog {
    /// Deepest pyramid subdivision level. Histogram cells are produced for
    /// every level from 0 (the whole query rectangle) through this level
    /// inclusive. Must be at least 1.
    pub levels: u32,

    /// Number of equal-width orientation bins spanning `[-pi, pi]`.
    pub orientation_bins: usize,

    /// Low threshold for the Canny edge detector.
    pub canny_low_threshold: f32,

    /// High threshold for the Canny edge detector.
    pub canny_high_threshold: f32,

    analysis: Option<Analysis>,
}

/// State produced by [`Phog::analyze`]: edge-gated gradient magnitudes and
/// the per-pixel orientation bin assignment.
#[derive(Debug)]
struct Analysis {
    magnitudes: Array2<f32>,
    binner: OrientationBinner,
}

impl Default for Phog {
    fn default() -> Phog {
        Phog {
            levels: 3,
            orientation_bins: 8,
            canny_low_threshold: 50.0,
            canny_high_threshold: 100.0,
            analysis: None,
        }
    }
}

impl Phog {
    /// This convenience constructor is provided for the very common case
    /// that only the pyramid depth needs to be chosen.
    pub fn new(levels: u32) -> Self {
        Self {
            levels,
            ..Default::default()
        }
    }

    /// Analyze an image, replacing the state left by any previous call.
    ///
    /// Runs edge detection, computes the gradient magnitude and orientation
    /// fields, gates the magnitudes by the edge mask (pixels off detected
    /// edges contribute zero to every histogram) and precomputes the
    /// orientation bin of every pixel. Afterwards
    /// [`Phog::extract_feature`] can be queried for arbitrary rectangles.
    ///
    /// # Arguments
    /// * `image` - The input image to analyze.
    pub fn analyze(&mut self, image: &DynamicImage) -> Result<(), Error> {
        if self.orientation_bins == 0 {
            return Err(Error::InvalidBinCount);
        }
        let gray = image.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return Err(Error::EmptyImage);
        }
        trace!("Running Canny edge detection.");
        let mask = edge_mask(&gray, self.canny_low_threshold, self.canny_high_threshold);
        trace!("Computing gradient magnitudes and orientations.");
        let mut field = gradient_magnitudes_and_orientations(&gray);
        field.mask_magnitudes(&mask);
        trace!("Binning pixel orientations.");
        let binner = OrientationBinner::analyze(field.orientations.view(), self.orientation_bins);
        self.analysis = Some(Analysis {
            magnitudes: field.magnitudes,
            binner,
        });
        info!("Analyzed a {} x {} image", gray.width(), gray.height());
        Ok(())
    }

    /// Analyze an image loaded from disk.
    ///
    /// # Arguments
    /// * `path` - The input image path.
    pub fn analyze_path(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.analyze(&image::open(path)?)
    }

    /// Extract the pyramid histogram-of-gradients descriptor of a
    /// rectangular region of the last analyzed image.
    ///
    /// Every pyramid cell contributes one contiguous block of
    /// `orientation_bins` values; blocks are concatenated level by level in
    /// sampler order, so the result holds
    /// `orientation_bins * QuadtreeSampler::cell_count(levels)` entries.
    /// The result depends only on `rect`, the configuration and the last
    /// [`Phog::analyze`] call.
    ///
    /// # Arguments
    /// * `rect` - The query region, clipped to the image bounds cell by
    ///   cell.
    pub fn extract_feature(&self, rect: Rect) -> Result<Histogram, Error> {
        let analysis = self.analysis.as_ref().ok_or(Error::NotAnalyzed)?;
        if rect.is_empty() {
            return Err(Error::EmptyRegion(rect));
        }
        if self.levels == 0 {
            return Err(Error::InvalidLevelCount);
        }
        let sampler = QuadtreeSampler::new(rect, self.levels);
        let mut feature = Histogram::empty();
        #[cfg(not(feature = "rayon"))]
        {
            for cell in sampler {
                feature.combine(
                    &analysis
                        .binner
                        .compute_histogram(cell, analysis.magnitudes.view()),
                );
            }
        }
        #[cfg(feature = "rayon")]
        {
            let cells: Vec<Rect> = sampler.collect();
            let parts: Vec<Histogram> = cells
                .par_iter()
                .map(|&cell| {
                    analysis
                        .binner
                        .compute_histogram(cell, analysis.magnitudes.view())
                })
                .collect();
            for part in &parts {
                feature.combine(part);
            }
        }
        debug!(
            "Extracted a {}-dimensional feature from {:?}",
            feature.len(),
            rect
        );
        Ok(feature)
    }
}
