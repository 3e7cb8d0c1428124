//! PDF document builder used by the page assembler.
//!
//! [`PdfBuilder`] is the seam between page assembly and the binary writer:
//! one call per page, one call to serialise. [`LopdfBuilder`] implements it
//! on the `lopdf` object model. Each page's MediaBox is the image size in
//! pixels and a single image XObject is drawn to fill it.
//!
//! JPEG payloads are embedded verbatim with `DCTDecode`. PNG payloads are
//! decoded to 8-bit samples and stored with `FlateDecode`; alpha becomes an
//! `SMask`.

use crate::output::{EncodedImage, PdfEncoding};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{ColorType, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use thiserror::Error;

/// Failures reported by a [`PdfBuilder`].
#[derive(Debug, Error)]
pub enum PdfError {
    /// A single page could not be added. The document is still usable.
    #[error("cannot embed {name}: {detail}")]
    Embed { name: String, detail: String },

    /// The document could not be serialised.
    #[error("cannot serialise document: {0}")]
    Write(String),
}

/// Incremental PDF writer: add image pages, then serialise once.
pub trait PdfBuilder: Send {
    /// Append a page sized to `image` and draw the image on it.
    /// `name` must be unique within the document.
    fn add_image_page(&mut self, name: &str, image: &EncodedImage) -> Result<(), PdfError>;

    /// Pages added so far.
    fn page_count(&self) -> usize;

    /// Serialise the document to `out`.
    fn write_to(&mut self, out: &mut dyn Write) -> Result<(), PdfError>;
}

/// [`PdfBuilder`] backed by `lopdf`.
pub struct LopdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for LopdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LopdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let catalog_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }
}

impl PdfBuilder for LopdfBuilder {
    fn add_image_page(&mut self, name: &str, image: &EncodedImage) -> Result<(), PdfError> {
        let embed_err = |detail: String| PdfError::Embed {
            name: name.to_string(),
            detail,
        };

        let width = image.width.round() as i64;
        let height = image.height.round() as i64;
        if width <= 0 || height <= 0 {
            return Err(embed_err(format!("invalid page size {width}x{height}")));
        }

        // Build every stream before touching the document so a failure leaves no orphans.
        let xobject = match image.encoding {
            PdfEncoding::Jpeg => jpeg_xobject(image),
            PdfEncoding::Png => png_xobject(image),
        }
        .map_err(embed_err)?;

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0.into(),
                        0.into(),
                        height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content
            .encode()
            .map_err(|e| embed_err(format!("content stream: {e}")))?;

        let mut image_stream = xobject.image;
        if let Some(mask) = xobject.mask {
            let mask_id = self.doc.add_object(mask);
            image_stream.dict.set("SMask", Object::Reference(mask_id));
        }
        let image_id = self.doc.add_object(image_stream);
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content_bytes));

        let resources = Dictionary::from_iter([(
            "XObject",
            Object::Dictionary(Dictionary::from_iter([(
                name,
                Object::Reference(image_id),
            )])),
        )]);
        let page_id = self.doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), width.into(), height.into()]),
            ),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
        ]));
        self.kids.push(Object::Reference(page_id));
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn write_to(&mut self, out: &mut dyn Write) -> Result<(), PdfError> {
        let pages = Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(self.kids.clone())),
            ("Count", Object::Integer(self.kids.len() as i64)),
        ]);
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| PdfError::Write(e.to_string()))?;
        out.write_all(&buf)
            .map_err(|e| PdfError::Write(e.to_string()))
    }
}

struct ImageXObject {
    image: Stream,
    mask: Option<Stream>,
}

fn image_dict(width: u32, height: u32, color_space: &str, filter: &str) -> Dictionary {
    Dictionary::from_iter([
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(width))),
        ("Height", Object::Integer(i64::from(height))),
        ("ColorSpace", Object::Name(color_space.as_bytes().to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(filter.as_bytes().to_vec())),
    ])
}

fn jpeg_xobject(image: &EncodedImage) -> Result<ImageXObject, String> {
    let components = jpeg_components(&image.data).ok_or("no JPEG frame header found")?;
    let (width, height) = (image.width.round() as u32, image.height.round() as u32);
    let color_space = match components {
        1 => "DeviceGray",
        4 => "DeviceCMYK",
        _ => "DeviceRGB",
    };
    let mut dict = image_dict(width, height, color_space, "DCTDecode");
    if components == 4 {
        // Adobe CMYK JPEGs store inverted samples.
        let decode = [1, 0, 1, 0, 1, 0, 1, 0].map(Object::Integer).to_vec();
        dict.set("Decode", Object::Array(decode));
    }
    Ok(ImageXObject {
        image: Stream::new(dict, image.data.clone()),
        mask: None,
    })
}

fn png_xobject(image: &EncodedImage) -> Result<ImageXObject, String> {
    let decoded = image::load_from_memory_with_format(&image.data, ImageFormat::Png)
        .map_err(|e| format!("PNG decode: {e}"))?;
    let (width, height) = (decoded.width(), decoded.height());

    let is_gray = matches!(decoded.color(), ColorType::L8 | ColorType::L16);
    if is_gray {
        let samples = decoded.to_luma8().into_raw();
        return Ok(ImageXObject {
            image: Stream::new(
                image_dict(width, height, "DeviceGray", "FlateDecode"),
                flate_compress(&samples)?,
            ),
            mask: None,
        });
    }

    let rgba = decoded.to_rgba8();
    let pixels = (width as usize) * (height as usize);
    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = Vec::with_capacity(pixels);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    let has_alpha = decoded.color().has_alpha() && alpha.iter().any(|&a| a != u8::MAX);

    let mask = if has_alpha {
        Some(Stream::new(
            image_dict(width, height, "DeviceGray", "FlateDecode"),
            flate_compress(&alpha)?,
        ))
    } else {
        None
    };
    Ok(ImageXObject {
        image: Stream::new(
            image_dict(width, height, "DeviceRGB", "FlateDecode"),
            flate_compress(&rgb)?,
        ),
        mask,
    })
}

fn flate_compress(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| format!("deflate: {e}"))
}

/// Number of colour components declared by the first JPEG frame header.
pub fn jpeg_components(data: &[u8]) -> Option<u8> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        match marker {
            0xFF => {
                i += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                i += 2;
                continue;
            }
            0xDA | 0xD9 => return None,
            _ => {}
        }
        let len = usize::from(u16::from_be_bytes([*data.get(i + 2)?, *data.get(i + 3)?]));
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            return data.get(i + 9).copied();
        }
        i += 2 + len;
    }
    None
}
