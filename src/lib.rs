//! Lay images out on PDF pages.
//!
//! Images are ingested into an ordered [`ImageList`], each one gets a page
//! resolved from [`PdfOptions`], is fitted inside that page's margins, and the
//! pages are handed to a [`DocumentWriter`]. [`PdfWriter`] is the lopdf-backed
//! writer used by the CLI.

pub mod assemble;
pub mod embed;
pub mod ingest;
pub mod layout;
pub mod list;
pub mod options;
pub mod parse;
pub mod pdf;
pub mod preview;

pub use assemble::{generate, plan_document, AssembleError, DocumentWriter, PagePlan};
pub use ingest::{ingest_files, CancelToken, ImageId, ImageRecord, IngestError, IngestOptions};
pub use layout::{fit_image, resolve_page, LayoutError, PageSetup, Rect};
pub use list::{ImageList, ListError};
pub use options::{Margin, Orientation, PageSize, PdfOptions};
pub use pdf::{render_pdf, Metadata, PdfWriter};
pub use preview::{PreviewRegistry, PreviewUrl};
