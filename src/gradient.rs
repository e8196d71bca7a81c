use image::GrayImage;
use imageproc::edges::canny;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::*;
use ndarray::{azip, Array2};
use nshare::RefNdarray2;

/// Per-pixel gradient magnitude and orientation of a grayscale image.
///
/// Orientations are `atan2(gy, gx)` in radians, in `(-pi, pi]`.
#[derive(Debug)]
pub struct GradientField {
    pub magnitudes: Array2<f32>,
    pub orientations: Array2<f32>,
}

impl GradientField {
    /// Gate the magnitudes by a mask, element-wise. Orientations are left
    /// untouched; they only ever decide bin membership.
    pub fn mask_magnitudes(&mut self, mask: &Array2<f32>) {
        debug_assert_eq!(self.magnitudes.dim(), mask.dim());
        azip!((m in &mut self.magnitudes, &gate in mask) *m *= gate);
    }
}

/// Compute gradient magnitude and orientation fields from Sobel
/// derivatives.
pub fn gradient_magnitudes_and_orientations(image: &GrayImage) -> GradientField {
    let (width, height) = image.dimensions();
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);
    let mut magnitudes = Array2::zeros((height as usize, width as usize));
    let mut orientations = Array2::zeros((height as usize, width as usize));
    for y in 0..height {
        for x in 0..width {
            let dx = f32::from(gx.get_pixel(x, y)[0]);
            let dy = f32::from(gy.get_pixel(x, y)[0]);
            magnitudes[[y as usize, x as usize]] = (dx * dx + dy * dy).sqrt();
            orientations[[y as usize, x as usize]] = dy.atan2(dx);
        }
    }
    GradientField {
        magnitudes,
        orientations,
    }
}

/// Binary edge mask from the Canny detector: 1.0 on edge pixels, 0.0
/// elsewhere.
pub fn edge_mask(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> Array2<f32> {
    let edges = canny(image, low_threshold, high_threshold);
    let mask = edges
        .ref_ndarray2()
        .mapv(|v| if v > 0 { 1.0 } else { 0.0 });
    debug!(
        "Canny marked {} of {} pixels as edges",
        mask.sum(),
        mask.len()
    );
    mask
}

#[cfg(test)]
mod tests {
    use super::{edge_mask, gradient_magnitudes_and_orientations, GradientField};
    use image::GrayImage;
    use ndarray::Array2;

    /// Left half dark, right half bright: a single vertical step edge.
    fn step_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            image::Luma([if x < width / 2 { 0u8 } else { 200u8 }])
        })
    }

    #[test]
    fn step_edge_points_along_x() {
        let image = step_image(16, 16);
        let field = gradient_magnitudes_and_orientations(&image);
        let row = 8usize;
        // The response sits on the step and points in +x; away from the
        // step the image is flat.
        assert!(field.magnitudes[[row, 7]] > 0.0);
        assert!(field.magnitudes[[row, 8]] > 0.0);
        assert_eq!(field.magnitudes[[row, 2]], 0.0);
        assert_eq!(field.magnitudes[[row, 13]], 0.0);
        assert!(field.orientations[[row, 7]].abs() < 1e-3);
        // Canny agrees that the step is an edge.
        assert!(edge_mask(&image, 50.0, 100.0).sum() > 0.0);
    }

    #[test]
    fn flat_image_has_no_edges_and_no_gradient() {
        let flat = GrayImage::from_pixel(12, 12, image::Luma([77u8]));
        assert_eq!(edge_mask(&flat, 50.0, 100.0).sum(), 0.0);
        let field = gradient_magnitudes_and_orientations(&flat);
        assert_eq!(field.magnitudes.sum(), 0.0);
    }

    #[test]
    fn masking_zeroes_gated_magnitudes() {
        let mut field = GradientField {
            magnitudes: Array2::from_elem((2, 2), 3.0),
            orientations: Array2::zeros((2, 2)),
        };
        let mut mask = Array2::zeros((2, 2));
        mask[[0, 1]] = 1.0;
        field.mask_magnitudes(&mask);
        assert_eq!(field.magnitudes[[0, 1]], 3.0);
        assert_eq!(field.magnitudes.sum(), 3.0);
    }
}
