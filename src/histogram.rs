use derive_more::{Deref, DerefMut};
use ndarray::{Array2, ArrayView2};
use std::f32::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::rect::Rect;

/// An ordered histogram vector.
///
/// [`Histogram::combine`] appends, so a pyramid feature is one long vector
/// in which every cell keeps its own contiguous block of bins.
#[derive(Debug, Clone, PartialEq, Deref, DerefMut)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram(pub Vec<f32>);

impl Histogram {
    /// The zero-length histogram, used to seed concatenation.
    pub fn empty() -> Self {
        Histogram(Vec::new())
    }

    pub fn zeros(bins: usize) -> Self {
        Histogram(vec![0.0; bins])
    }

    /// Append another histogram as a distinct contiguous block.
    ///
    /// This is concatenation, not element-wise summation: combining the
    /// histograms of four quadrants yields a vector four times as long, not
    /// the histogram of their union.
    pub fn combine(&mut self, other: &Histogram) {
        self.0.extend_from_slice(&other.0);
    }
}

/// Assigns every pixel of an orientation field to one of a fixed number of
/// equal-width angular bins, precomputed so that weighted histograms of
/// arbitrary sub-rectangles can be answered without touching the
/// orientation field again.
///
/// Bins span `[-pi, pi]`, the range of `atan2`; the upper edge folds into
/// the last bin. Assignment is hard, with no interpolation between
/// neighboring bins.
#[derive(Debug, Clone)]
pub struct OrientationBinner {
    bins: usize,
    bin_map: Array2<usize>,
}

impl OrientationBinner {
    /// Precompute the bin assignment of every pixel.
    pub fn analyze(orientations: ArrayView2<f32>, bins: usize) -> Self {
        debug_assert!(bins > 0);
        let bin_width = (2.0 * PI) / bins as f32;
        let bin_map = orientations.mapv(|orientation| {
            (((orientation + PI) / bin_width) as usize).min(bins - 1)
        });
        OrientationBinner { bins, bin_map }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Histogram of the pixels inside `rect`, each contributing its weight
    /// to its precomputed bin.
    ///
    /// The rectangle is clipped to the field bounds rather than rejected;
    /// an empty clip yields the all-zero histogram.
    pub fn compute_histogram(&self, rect: Rect, weights: ArrayView2<f32>) -> Histogram {
        debug_assert_eq!(self.bin_map.dim(), weights.dim());
        let (height, width) = self.bin_map.dim();
        let mut histogram = Histogram::zeros(self.bins);
        if let Some((rows, cols)) = rect.pixel_bounds(width, height) {
            for y in rows {
                for x in cols.clone() {
                    histogram.0[self.bin_map[[y, x]]] += weights[[y, x]];
                }
            }
        }
        histogram
    }
}
