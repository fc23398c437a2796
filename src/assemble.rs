//! Document assembly: one page per image, in list order.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::ingest::{ImageId, ImageRecord};
use crate::layout::{fit_image, resolve_page, LayoutError, PageSetup, Rect};
use crate::list::ImageList;
use crate::options::PdfOptions;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssembleError {
    #[error("no images to put in the document")]
    NoImages,
    #[error("cannot lay out page {page} ({path}): {source}")]
    Layout {
        page: usize,
        path: PathBuf,
        #[source]
        source: LayoutError,
    },
}

/// Receives pages and image placements and accumulates the document.
///
/// Geometry handed to a writer is in pixels, origin top-left.
pub trait DocumentWriter {
    /// called once with the full list before the first page
    fn begin(&mut self, _images: &ImageList) -> Result<()> {
        Ok(())
    }

    /// start a new page; later drawing goes onto it
    fn add_page(&mut self, page: &PageSetup) -> Result<()>;

    fn draw_image(&mut self, image: &ImageRecord, at: &Rect) -> Result<()>;
}

/// geometry of one output page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagePlan {
    /// 1-based page number
    pub page: usize,
    pub image: ImageId,
    pub source: PathBuf,
    pub image_width: u32,
    pub image_height: u32,
    pub setup: PageSetup,
    pub placement: Rect,
}

/// Resolve every page and its placement. Each image is fitted against its
/// own page, never against the first one.
pub fn plan_document(
    images: &ImageList,
    options: &PdfOptions,
) -> Result<Vec<PagePlan>, AssembleError> {
    if images.is_empty() {
        return Err(AssembleError::NoImages);
    }
    images
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let (iw, ih) = record.dimensions();
            let setup = resolve_page(iw, ih, options);
            let placement = fit_image(iw, ih, setup.width, setup.height, options.margin.ratio())
                .map_err(|source| AssembleError::Layout {
                    page: i + 1,
                    path: record.source.path.clone(),
                    source,
                })?;
            Ok(PagePlan {
                page: i + 1,
                image: record.id,
                source: record.source.path.clone(),
                image_width: record.width,
                image_height: record.height,
                setup,
                placement,
            })
        })
        .collect()
}

/// Lay out every image and feed the pages to `writer`.
///
/// An empty list is rejected before the writer sees anything.
pub fn generate<W: DocumentWriter>(
    images: &ImageList,
    options: &PdfOptions,
    writer: &mut W,
) -> Result<Vec<PagePlan>> {
    let plans = plan_document(images, options)?;
    writer.begin(images)?;
    let total = plans.len();
    for (plan, record) in plans.iter().zip(images) {
        writer.add_page(&plan.setup)?;
        writer.draw_image(record, &plan.placement)?;
        log::info!("  [{}/{}] {}", plan.page, total, record.source.path.display());
    }
    Ok(plans)
}
