//! Page geometry.
//!
//! All values are in pixels with the origin at the top-left corner of the
//! page. The margin is always derived from the *image* width, so it scales
//! with the source resolution rather than with the output page.

use serde::Serialize;
use thiserror::Error;

use crate::options::{Orientation, PdfOptions};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("image dimensions must be positive, got {width}x{height}")]
    InvalidImage { width: f64, height: f64 },
    #[error("page dimensions must be positive, got {width}x{height}")]
    InvalidPage { width: f64, height: f64 },
    #[error("margin of {margin:.1}px on each side leaves no room on a {page_width:.1}x{page_height:.1}px page")]
    MarginExceedsPage {
        margin: f64,
        page_width: f64,
        page_height: f64,
    },
}

/// placement of an image on its page
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// size and orientation of a single page
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSetup {
    pub width: f64,
    pub height: f64,
    pub orientation: Orientation,
}

/// absolute margin for an image: a fraction of its width, applied on both axes
pub fn margin_px(image_width: f64, margin_ratio: f64) -> f64 {
    image_width * margin_ratio
}

/// Fit an `iw`x`ih` image inside a `pw`x`ph` page minus margins, preserving
/// aspect ratio and centering on the cross axis.
///
/// A margin wide enough to invert the constrained dimension is rejected
/// instead of producing a negative rectangle.
pub fn fit_image(
    iw: f64,
    ih: f64,
    pw: f64,
    ph: f64,
    margin_ratio: f64,
) -> Result<Rect, LayoutError> {
    if !(iw > 0.0 && ih > 0.0 && iw.is_finite() && ih.is_finite()) {
        return Err(LayoutError::InvalidImage {
            width: iw,
            height: ih,
        });
    }
    if !(pw > 0.0 && ph > 0.0 && pw.is_finite() && ph.is_finite()) {
        return Err(LayoutError::InvalidPage {
            width: pw,
            height: ph,
        });
    }

    let page_aspect = pw / ph;
    let image_aspect = iw / ih;
    let margin = margin_px(iw, margin_ratio);

    let rect = if image_aspect > page_aspect {
        // wider than the page: width-constrained
        let width = pw - margin * 2.0;
        let height = width / image_aspect;
        Rect {
            x: margin,
            y: (ph - height) / 2.0,
            width,
            height,
        }
    } else {
        let height = ph - margin * 2.0;
        let width = height * image_aspect;
        Rect {
            x: (pw - width) / 2.0,
            y: margin,
            width,
            height,
        }
    };

    if rect.width <= 0.0 || rect.height <= 0.0 {
        return Err(LayoutError::MarginExceedsPage {
            margin,
            page_width: pw,
            page_height: ph,
        });
    }
    Ok(rect)
}

/// Page size and orientation for one image.
///
/// Fit mode sizes the page to the image plus margin on both axes and takes
/// the orientation from the image itself. Standard sizes use the requested
/// orientation and are the same for every page. This is the only place page
/// sizes are decided, the first page included.
pub fn resolve_page(iw: f64, ih: f64, options: &PdfOptions) -> PageSetup {
    match options.size.dimensions_px() {
        None => {
            let margin = margin_px(iw, options.margin.ratio());
            let orientation = if iw > ih {
                Orientation::Landscape
            } else {
                Orientation::Portrait
            };
            PageSetup {
                width: iw + margin * 2.0,
                height: ih + margin * 2.0,
                orientation,
            }
        }
        Some(dims) => {
            let (width, height) = options.orientation.apply(dims);
            PageSetup {
                width,
                height,
                orientation: options.orientation,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Margin, PageSize};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn wide_image_on_tall_page() {
        let r = fit_image(800.0, 400.0, 600.0, 800.0, 0.02).unwrap();
        assert!(close(r.x, 16.0));
        assert!(close(r.y, 258.0));
        assert!(close(r.width, 568.0));
        assert!(close(r.height, 284.0));
    }

    #[test]
    fn tall_image_on_wide_page() {
        // margin = 400 * 0.05 = 20; height = 600 - 40 = 560; width = 560 * 0.5 = 280
        let r = fit_image(400.0, 800.0, 1000.0, 600.0, 0.05).unwrap();
        assert!(close(r.height, 560.0));
        assert!(close(r.width, 280.0));
        assert!(close(r.x, 360.0));
        assert!(close(r.y, 20.0));
    }

    #[test]
    fn equal_aspect_is_height_constrained() {
        let r = fit_image(100.0, 200.0, 300.0, 600.0, 0.0).unwrap();
        let expected = Rect {
            x: 0.0,
            y: 0.0,
            width: 300.0,
            height: 600.0,
        };
        assert_eq!(r, expected);
    }

    #[test]
    fn no_margin_fills_constrained_axis() {
        let r = fit_image(1000.0, 500.0, 800.0, 800.0, 0.0).unwrap();
        assert!(close(r.width, 800.0));
        assert!(close(r.height, 400.0));
        assert!(close(r.y, 200.0));
    }

    #[test]
    fn repeated_calls_are_bit_identical() {
        let a = fit_image(1234.0, 987.0, 793.7, 1122.5, 0.095).unwrap();
        let b = fit_image(1234.0, 987.0, 793.7, 1122.5, 0.095).unwrap();
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
        assert_eq!(a.width.to_bits(), b.width.to_bits());
        assert_eq!(a.height.to_bits(), b.height.to_bits());
    }

    #[test]
    fn oversized_margin_rejected() {
        // margin = 6000 * 0.095 = 570 per side, wider than an A4 page in px
        let err = fit_image(6000.0, 3000.0, 793.7, 1122.5, 0.095).unwrap_err();
        assert!(matches!(err, LayoutError::MarginExceedsPage { .. }));
    }

    #[test]
    fn degenerate_inputs_rejected() {
        assert!(matches!(
            fit_image(0.0, 10.0, 100.0, 100.0, 0.0),
            Err(LayoutError::InvalidImage { .. })
        ));
        assert!(matches!(
            fit_image(10.0, 10.0, 100.0, f64::NAN, 0.0),
            Err(LayoutError::InvalidPage { .. })
        ));
    }

    #[test]
    fn fit_mode_page_wraps_image() {
        let options = PdfOptions {
            size: PageSize::Fit,
            margin: Margin::Normal,
            orientation: Orientation::Portrait,
            ..Default::default()
        };
        let page = resolve_page(800.0, 400.0, &options);
        assert_eq!(page.width, 800.0 + 800.0 * 0.05 * 2.0);
        assert_eq!(page.height, 400.0 + 800.0 * 0.05 * 2.0);
        assert_eq!(page.orientation, Orientation::Landscape);

        let page = resolve_page(300.0, 300.0, &options);
        assert_eq!(page.orientation, Orientation::Portrait);
    }

    #[test]
    fn fit_mode_image_fills_page_inside_margin() {
        let options = PdfOptions {
            size: PageSize::Fit,
            margin: Margin::Large,
            ..Default::default()
        };
        let page = resolve_page(640.0, 480.0, &options);
        let ratio = options.margin.ratio();
        let r = fit_image(640.0, 480.0, page.width, page.height, ratio).unwrap();
        let m = 640.0 * 0.095;
        assert!(close(r.x, m));
        assert!(close(r.width, 640.0));
        assert!((r.height - 480.0).abs() < 1e-6);
    }

    #[test]
    fn standard_page_honours_orientation() {
        let mut options = PdfOptions {
            size: PageSize::Letter,
            ..Default::default()
        };
        let page = resolve_page(10.0, 5000.0, &options);
        assert_eq!((page.width, page.height), (816.0, 1056.0));
        assert_eq!(page.orientation, Orientation::Portrait);

        options.orientation = Orientation::Landscape;
        let page = resolve_page(10.0, 5000.0, &options);
        assert_eq!((page.width, page.height), (1056.0, 816.0));
        assert_eq!(page.orientation, Orientation::Landscape);
    }
}
