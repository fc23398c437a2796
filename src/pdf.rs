use anyhow::{Context, Result};
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::assemble::DocumentWriter;
use crate::embed::{deflate, prepare_image, PreparedImage};
use crate::ingest::{ImageId, ImageRecord};
use crate::layout::{PageSetup, Rect};
use crate::list::ImageList;
use crate::options::PT_PER_PX;

/// document info dictionary entries
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

struct OpenPage {
    setup: PageSetup,
    operations: Vec<Operation>,
    xobjects: Dictionary,
}

/// [`DocumentWriter`] that builds a PDF with lopdf.
pub struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<Object>,
    current: Option<OpenPage>,
    prepared: HashMap<ImageId, PreparedImage>,
    level: Compression,
    compress: bool,
    metadata: Metadata,
}

fn name(s: &str) -> Object {
    Object::Name(s.as_bytes().to_vec())
}

fn text(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
}

impl PdfWriter {
    pub fn new(compress: bool, metadata: Metadata) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_ids: Vec::new(),
            current: None,
            prepared: HashMap::new(),
            level: if compress {
                Compression::best()
            } else {
                Compression::fast()
            },
            compress,
            metadata,
        }
    }

    fn add_image_object(&mut self, image: PreparedImage) -> ObjectId {
        match image {
            PreparedImage::Jpeg {
                width,
                height,
                components,
                invert_cmyk,
                data,
            } => {
                let color_space = match components {
                    1 => "DeviceGray",
                    4 => "DeviceCMYK",
                    _ => "DeviceRGB",
                };
                let mut dict = dictionary! {
                    "Type" => name("XObject"),
                    "Subtype" => name("Image"),
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => name(color_space),
                    "BitsPerComponent" => 8,
                    "Filter" => name("DCTDecode"),
                };
                if invert_cmyk {
                    let decode = [1, 0, 1, 0, 1, 0, 1, 0].map(Object::Integer).to_vec();
                    dict.set("Decode", decode);
                }
                self.doc.add_object(Stream::new(dict, data))
            }
            PreparedImage::Compressed {
                width,
                height,
                color_channels,
                color,
                alpha,
            } => {
                let color_space = if color_channels == 1 {
                    "DeviceGray"
                } else {
                    "DeviceRGB"
                };
                let mut dict = dictionary! {
                    "Type" => name("XObject"),
                    "Subtype" => name("Image"),
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => name(color_space),
                    "BitsPerComponent" => 8,
                    "Filter" => name("FlateDecode"),
                };
                if let Some(alpha) = alpha {
                    let smask_id = self.doc.add_object(Stream::new(
                        dictionary! {
                            "Type" => name("XObject"),
                            "Subtype" => name("Image"),
                            "Width" => width as i64,
                            "Height" => height as i64,
                            "ColorSpace" => name("DeviceGray"),
                            "BitsPerComponent" => 8,
                            "Filter" => name("FlateDecode"),
                        },
                        alpha,
                    ));
                    dict.set("SMask", smask_id);
                }
                self.doc.add_object(Stream::new(dict, color))
            }
        }
    }

    fn flush_page(&mut self) -> Result<()> {
        let Some(page) = self.current.take() else {
            return Ok(());
        };
        let content = Content {
            operations: page.operations,
        };
        let encoded = content.encode().context("Failed to encode content stream")?;
        let stream = if self.compress {
            let data = deflate(self.level, encoded.len(), [&encoded])?;
            Stream::new(dictionary! { "Filter" => name("FlateDecode") }, data)
        } else {
            Stream::new(dictionary! {}, encoded)
        };
        let content_id = self.doc.add_object(stream);
        let resources_id = self.doc.add_object(dictionary! {
            "XObject" => page.xobjects,
        });
        let width_pt = (page.setup.width * PT_PER_PX) as f32;
        let height_pt = (page.setup.height * PT_PER_PX) as f32;
        let page_id = self.doc.add_object(dictionary! {
            "Type" => name("Page"),
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(width_pt),
                Object::Real(height_pt),
            ],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        self.page_ids.push(page_id.into());
        Ok(())
    }

    fn write_info(&mut self) {
        let mut info = Dictionary::new();
        info.set("Producer", text(&format!("picpdf {}", env!("CARGO_PKG_VERSION"))));
        let now = chrono::Utc::now();
        info.set("CreationDate", text(&now.format("D:%Y%m%d%H%M%SZ").to_string()));
        if let Some(title) = &self.metadata.title {
            info.set("Title", text(title));
        }
        if let Some(author) = &self.metadata.author {
            info.set("Author", text(author));
        }
        let info_id = self.doc.add_object(Object::Dictionary(info));
        self.doc.trailer.set("Info", info_id);
    }

    /// close the last page and serialize the document
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.flush_page()?;
        anyhow::ensure!(!self.page_ids.is_empty(), "Document has no pages");

        let count = self.page_ids.len() as i64;
        let kids = std::mem::take(&mut self.page_ids);
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => name("Pages"),
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => name("Catalog"),
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.write_info();

        let mut out = Vec::new();
        self.doc.save_to(&mut out).context("Failed to serialize PDF")?;
        Ok(out)
    }
}

impl DocumentWriter for PdfWriter {
    /// decode and compress every image up front, in parallel
    fn begin(&mut self, images: &ImageList) -> Result<()> {
        let level = self.level;
        let prepared: Vec<(ImageId, Result<PreparedImage>)> = images
            .iter()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|record| (record.id, prepare_image(&record.source, level)))
            .collect();
        for (id, result) in prepared {
            self.prepared.insert(id, result?);
        }
        Ok(())
    }

    fn add_page(&mut self, page: &PageSetup) -> Result<()> {
        self.flush_page()?;
        self.current = Some(OpenPage {
            setup: *page,
            operations: Vec::new(),
            xobjects: Dictionary::new(),
        });
        Ok(())
    }

    fn draw_image(&mut self, image: &ImageRecord, at: &Rect) -> Result<()> {
        anyhow::ensure!(self.current.is_some(), "No page to draw {} on", image.id);
        let prepared = match self.prepared.remove(&image.id) {
            Some(p) => p,
            None => prepare_image(&image.source, self.level)?,
        };
        let (pw, ph) = prepared.dimensions();
        log::debug!("{}: embedding {}x{} pixels", image.source.path.display(), pw, ph);
        let image_id = self.add_image_object(prepared);

        let page = self.current.as_mut().context("No open page")?;
        let im_name = format!("Im{}", page.xobjects.len());
        page.xobjects.set(im_name.as_bytes().to_vec(), image_id);

        // top-left pixel geometry to bottom-left points
        let x = (at.x * PT_PER_PX) as f32;
        let y = ((page.setup.height - at.y - at.height) * PT_PER_PX) as f32;
        let w = (at.width * PT_PER_PX) as f32;
        let h = (at.height * PT_PER_PX) as f32;
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(w),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(h),
                    Object::Real(x),
                    Object::Real(y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(im_name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }
}

/// lay out `images` and render them into PDF bytes
pub fn render_pdf(
    images: &ImageList,
    options: &crate::options::PdfOptions,
    metadata: Metadata,
) -> Result<Vec<u8>> {
    let mut writer = PdfWriter::new(options.compress, metadata);
    crate::assemble::generate(images, options, &mut writer)?;
    writer.finish()
}
