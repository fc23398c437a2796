//! Output options for a generation request.
//!
//! Options come from an optional JSON file and from CLI flags. Every enum
//! parses only its listed values, so an out-of-range value is rejected
//! here and never reaches the layout code.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Points per CSS pixel. Page geometry is computed in pixels.
pub const PT_PER_PX: f64 = 72.0 / 96.0;

pub const DEFAULT_FILENAME: &str = "file";

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("invalid {field} '{value}' (expected one of: {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: String,
    },
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse options file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
    Legal,
    A3,
    /// size each page to its own image plus margin
    Fit,
}

impl PageSize {
    /// portrait dimensions in points, `None` for fit
    pub fn dimensions_pt(self) -> Option<(f64, f64)> {
        match self {
            PageSize::A4 => Some((595.28, 841.89)),
            PageSize::Letter => Some((612.0, 792.0)),
            PageSize::Legal => Some((612.0, 1008.0)),
            PageSize::A3 => Some((841.89, 1190.55)),
            PageSize::Fit => None,
        }
    }

    /// portrait dimensions in pixels, `None` for fit
    pub fn dimensions_px(self) -> Option<(f64, f64)> {
        self.dimensions_pt().map(|(w, h)| (w / PT_PER_PX, h / PT_PER_PX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Margin {
    None,
    #[default]
    Small,
    Normal,
    Large,
}

impl Margin {
    /// margin as a fraction of the image width
    pub fn ratio(self) -> f64 {
        match self {
            Margin::None => 0.0,
            Margin::Small => 0.02,
            Margin::Normal => 0.05,
            Margin::Large => 0.095,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    /// orient a (w, h) pair: portrait puts the long side vertical
    pub fn apply(self, (w, h): (f64, f64)) -> (f64, f64) {
        let (short, long) = if w <= h { (w, h) } else { (h, w) };
        match self {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }
}

fn parse_value_enum<T: ValueEnum>(field: &'static str, s: &str) -> Result<T, OptionsError> {
    T::from_str(s.trim(), true).map_err(|_| OptionsError::InvalidValue {
        field,
        value: s.to_string(),
        expected: T::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

impl FromStr for PageSize {
    type Err = OptionsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_value_enum("page size", s)
    }
}

impl FromStr for Margin {
    type Err = OptionsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_value_enum("margin", s)
    }
}

impl FromStr for Orientation {
    type Err = OptionsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_value_enum("orientation", s)
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PdfOptions {
    pub size: PageSize,
    pub margin: Margin,
    /// ignored in fit mode
    pub orientation: Orientation,
    pub compress: bool,
    pub filename: String,
}

impl PdfOptions {
    /// load options from a JSON file; unknown keys and values are rejected
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let bytes = std::fs::read(path)?;
        let mut options: PdfOptions = serde_json::from_slice(&bytes)?;
        options.filename = options.filename.trim().to_string();
        Ok(options)
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = filename.trim().to_string();
        self
    }

    /// `<filename>.pdf`, falling back to `file.pdf`
    pub fn output_file_name(&self) -> String {
        let name = self.filename.trim();
        let name = match name.len().checked_sub(4) {
            Some(i) if name.get(i..).is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf")) => {
                &name[..i]
            }
            _ => name,
        };
        if name.is_empty() {
            format!("{}.pdf", DEFAULT_FILENAME)
        } else {
            format!("{}.pdf", name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_form_defaults() {
        let o = PdfOptions::default();
        assert_eq!(o.size, PageSize::A4);
        assert_eq!(o.margin, Margin::Small);
        assert_eq!(o.orientation, Orientation::Portrait);
        assert!(!o.compress);
        assert_eq!(o.filename, "");
    }

    #[test]
    fn margin_ratios() {
        assert_eq!(Margin::None.ratio(), 0.0);
        assert_eq!(Margin::Small.ratio(), 0.02);
        assert_eq!(Margin::Normal.ratio(), 0.05);
        assert_eq!(Margin::Large.ratio(), 0.095);
    }

    #[test]
    fn page_size_dimensions() {
        let (w, h) = PageSize::A4.dimensions_pt().unwrap();
        assert!((w - 595.28).abs() < 0.01);
        assert!((h - 841.89).abs() < 0.01);
        let (w, h) = PageSize::Letter.dimensions_px().unwrap();
        assert!((w - 816.0).abs() < 1e-9);
        assert!((h - 1056.0).abs() < 1e-9);
        assert!(PageSize::Fit.dimensions_pt().is_none());
    }

    #[test]
    fn standard_sizes_are_portrait() {
        for ps in [PageSize::A4, PageSize::Letter, PageSize::Legal, PageSize::A3] {
            let (w, h) = ps.dimensions_pt().unwrap();
            assert!(h > w);
        }
    }

    #[test]
    fn orientation_apply() {
        assert_eq!(Orientation::Portrait.apply((10.0, 20.0)), (10.0, 20.0));
        assert_eq!(Orientation::Portrait.apply((20.0, 10.0)), (10.0, 20.0));
        assert_eq!(Orientation::Landscape.apply((10.0, 20.0)), (20.0, 10.0));
        assert_eq!(Orientation::Landscape.apply((5.0, 5.0)), (5.0, 5.0));
    }

    #[test]
    fn parse_enums_case_insensitive() {
        assert_eq!("Letter".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert_eq!(" fit ".parse::<PageSize>().unwrap(), PageSize::Fit);
        assert_eq!("LARGE".parse::<Margin>().unwrap(), Margin::Large);
        assert_eq!("landscape".parse::<Orientation>().unwrap(), Orientation::Landscape);
    }

    #[test]
    fn parse_enums_reject_unknown() {
        let err = "b5".parse::<PageSize>().unwrap_err();
        match err {
            OptionsError::InvalidValue {
                field,
                value,
                expected,
            } => {
                assert_eq!(field, "page size");
                assert_eq!(value, "b5");
                assert!(expected.contains("fit"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!("huge".parse::<Margin>().is_err());
        assert!("sideways".parse::<Orientation>().is_err());
    }

    #[test]
    fn output_file_name_defaults_and_trims() {
        let o = PdfOptions::default();
        assert_eq!(o.output_file_name(), "file.pdf");
        let o = PdfOptions::default().with_filename("  holiday  ");
        assert_eq!(o.output_file_name(), "holiday.pdf");
        let o = PdfOptions::default().with_filename("   ");
        assert_eq!(o.output_file_name(), "file.pdf");
        let o = PdfOptions::default().with_filename("scan.pdf");
        assert_eq!(o.output_file_name(), "scan.pdf");
    }

    #[test]
    fn output_file_name_strips_pdf_extension_in_any_case() {
        let o = PdfOptions::default().with_filename("Scan.PDF");
        assert_eq!(o.output_file_name(), "Scan.pdf");
        let o = PdfOptions::default().with_filename("report.Pdf ");
        assert_eq!(o.output_file_name(), "report.pdf");
        let o = PdfOptions::default().with_filename(".PDF");
        assert_eq!(o.output_file_name(), "file.pdf");
        let o = PdfOptions::default().with_filename("notes.pdfx");
        assert_eq!(o.output_file_name(), "notes.pdfx.pdf");
        let o = PdfOptions::default().with_filename("日記");
        assert_eq!(o.output_file_name(), "日記.pdf");
    }

    #[test]
    fn json_roundtrip_and_partial() {
        let json = r#"{"size":"fit","margin":"large","compress":true,"filename":" out "}"#;
        let dir = std::env::temp_dir().join("picpdf_test_options_json");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("opts.json");
        std::fs::write(&path, json).unwrap();

        let o = PdfOptions::load(&path).unwrap();
        assert_eq!(o.size, PageSize::Fit);
        assert_eq!(o.margin, Margin::Large);
        assert_eq!(o.orientation, Orientation::Portrait);
        assert!(o.compress);
        assert_eq!(o.filename, "out");
    }

    #[test]
    fn json_rejects_invalid_enum() {
        let r: Result<PdfOptions, _> = serde_json::from_str(r#"{"size":"b5"}"#);
        assert!(r.is_err());
        let r: Result<PdfOptions, _> = serde_json::from_str(r#"{"colour":"red"}"#);
        assert!(r.is_err());
    }
}
