//! Contains the PlaneMapper struct, which describes the relationship
//! between the integral pixel plane of a frame, with its origin at
//! 0,0, and the patch of the complex plane that frame shows at a given
//! magnification.
use num::Complex;

/// The frame anchor: the fraction of the image width at which the
/// zoom target sits, horizontally and vertically.  Both axes are
/// measured in widths so that pixels stay square.
pub const ANCHOR: (f64, f64) = (0.5, 0.3);

/// Describes the x, y of a pixel in the frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pixel(pub u32, pub u32);

/// Maps pixels, and positions inside pixels, to points on the complex
/// plane for one frame.  Cheap to build; one is made per frame.
#[derive(Debug, Clone, Copy)]
pub struct PlaneMapper {
    width: f64,
    offset: Complex<f64>,
    magnification: f64,
}

impl PlaneMapper {
    /// Constructor.  `offset` is the zoom target, subtracted from the
    /// mapped point; `magnification` shrinks the visible patch.
    pub fn new(width: u32, offset: Complex<f64>, magnification: f64) -> PlaneMapper {
        PlaneMapper {
            width: f64::from(width),
            offset,
            magnification,
        }
    }

    /// Given a pixel and a sub-pixel offset in `[0, 1)` on each axis,
    /// return the complex number that position corresponds to.
    #[inline]
    pub fn subpixel_to_point(&self, pixel: Pixel, ssx: f64, ssy: f64) -> Complex<f64> {
        Complex::new(
            (((f64::from(pixel.0) + ssx) / self.width) - ANCHOR.0) / self.magnification
                - self.offset.re,
            (((f64::from(pixel.1) + ssy) / self.width) - ANCHOR.1) / self.magnification
                - self.offset.im,
        )
    }

    /// The point at the centre of a pixel.
    #[inline]
    pub fn pixel_to_point(&self, pixel: Pixel) -> Complex<f64> {
        self.subpixel_to_point(pixel, 0.5, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_pixel_maps_to_the_negated_offset() {
        let pm = PlaneMapper::new(100, Complex::new(0.25, -0.5), 1.0);
        assert_eq!(pm.subpixel_to_point(Pixel(50, 30), 0.0, 0.0), Complex::new(-0.25, 0.5));
    }

    #[test]
    fn both_axes_scale_by_width() {
        let pm = PlaneMapper::new(10, Complex::new(0.0, 0.0), 1.0);
        let a = pm.subpixel_to_point(Pixel(0, 0), 0.0, 0.0);
        let b = pm.subpixel_to_point(Pixel(1, 1), 0.0, 0.0);
        assert!(((b.re - a.re) - 0.1).abs() < 1e-12);
        assert!(((b.im - a.im) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn magnification_shrinks_the_patch() {
        let pm = PlaneMapper::new(4, Complex::new(0.0, 0.0), 2.0);
        assert_eq!(pm.subpixel_to_point(Pixel(0, 0), 0.0, 0.0), Complex::new(-0.25, -0.15));
        assert_eq!(pm.subpixel_to_point(Pixel(4, 0), 0.0, 0.0), Complex::new(0.25, -0.15));
    }

    #[test]
    fn pixel_to_point_uses_the_centre() {
        let pm = PlaneMapper::new(8, Complex::new(0.5, 0.3), 1.0);
        assert_eq!(
            pm.pixel_to_point(Pixel(3, 5)),
            pm.subpixel_to_point(Pixel(3, 5), 0.5, 0.5)
        );
    }
}
