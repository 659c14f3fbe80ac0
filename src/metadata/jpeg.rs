//! JPEG marker-segment walker.
//!
//! Collects frame dimensions and the metadata-bearing application segments
//! that appear before the first scan. Entropy-coded data is never read.
//!
//! | Segment | Extracted |
//! |---|---|
//! | SOFn | width, height |
//! | APP1 `Exif\0\0` | EXIF (TIFF structure, header stripped) |
//! | APP1 `http://ns.adobe.com/xap/1.0/\0` | standard XMP |
//! | APP1 `http://ns.adobe.com/xmp/extension/\0` | extended XMP chunks |
//! | APP2 `ICC_PROFILE\0` | ICC profile chunks |
//! | APP13 `Photoshop 3.0\0` | IPTC-IIM (resource 0x0404) |
//! | APP14 `Adobe` | color transform |

use super::ReadState;
use super::error::{MetadataError, hex};
use super::iptc;
use super::stream::ByteStream;
use super::xmp;
use serde::Serialize;
use std::io::{Read, Seek};
use tracing::{debug, warn};

const FORMAT: &str = "JPEG";

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;
const APP1: u8 = 0xE1;
const APP2: u8 = 0xE2;
const APP13: u8 = 0xED;
const APP14: u8 = 0xEE;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const STANDARD_XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const EXTENDED_XMP_HEADER: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";
const ICC_HEADER: &[u8] = b"ICC_PROFILE\0";
const ADOBE_HEADER: &[u8] = b"Adobe";

/// Color transform declared by an Adobe APP14 segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdobeColorTransform {
    Unknown,
    YCbCr,
    Ycck,
}

impl AdobeColorTransform {
    fn from_app14(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::YCbCr),
            2 => Some(Self::Ycck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JpegMetadata {
    pub width: u16,
    pub height: u16,
    pub exif: Option<Vec<u8>>,
    pub iptc: Option<Vec<u8>>,
    /// RDF element of the standard XMP packet.
    pub xmp: Option<String>,
    /// RDF element reassembled from extended XMP chunks.
    pub extended_xmp: Option<String>,
    pub icc_profile: Option<Vec<u8>>,
    pub has_adobe_segment: bool,
    pub color_transform: Option<AdobeColorTransform>,
}

#[derive(Debug)]
pub struct JpegMetadataReader<R> {
    stream: Option<ByteStream<R>>,
    state: ReadState<JpegMetadata>,
}

impl<R: Read + Seek> Default for JpegMetadataReader<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Read + Seek> JpegMetadataReader<R> {
    pub fn new() -> Self {
        Self {
            stream: None,
            state: ReadState::Unparsed,
        }
    }

    pub fn set_source(&mut self, source: R) {
        self.stream = Some(ByteStream::new(source));
        self.state = ReadState::Unparsed;
    }

    pub fn into_source(self) -> Option<R> {
        self.stream.map(ByteStream::into_inner)
    }

    pub fn metadata(&mut self) -> Result<&JpegMetadata, MetadataError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(MetadataError::SourceNotSet);
        };
        self.state.ensure(|| read_jpeg(stream))
    }

    pub fn width(&mut self) -> Result<u16, MetadataError> {
        Ok(self.metadata()?.width)
    }

    pub fn height(&mut self) -> Result<u16, MetadataError> {
        Ok(self.metadata()?.height)
    }

    pub fn exif(&mut self) -> Result<Option<&[u8]>, MetadataError> {
        Ok(self.metadata()?.exif.as_deref())
    }

    pub fn iptc(&mut self) -> Result<Option<&[u8]>, MetadataError> {
        Ok(self.metadata()?.iptc.as_deref())
    }

    pub fn xmp(&mut self) -> Result<Option<&str>, MetadataError> {
        Ok(self.metadata()?.xmp.as_deref())
    }

    pub fn icc_profile(&mut self) -> Result<Option<&[u8]>, MetadataError> {
        Ok(self.metadata()?.icc_profile.as_deref())
    }

    pub fn has_adobe_segment(&mut self) -> Result<bool, MetadataError> {
        Ok(self.metadata()?.has_adobe_segment)
    }

    pub fn color_transform(&mut self) -> Result<Option<AdobeColorTransform>, MetadataError> {
        Ok(self.metadata()?.color_transform)
    }
}

#[derive(Default)]
struct Chunks {
    icc: Vec<(u8, Vec<u8>)>,
    extended_xmp: Vec<(u32, Vec<u8>)>,
    extended_xmp_len: usize,
}

fn read_jpeg<R: Read + Seek>(s: &mut ByteStream<R>) -> Result<JpegMetadata, MetadataError> {
    let soi: [u8; 2] = s.read_array()?;
    if soi != [0xFF, SOI] {
        return Err(MetadataError::InvalidSignature {
            format: FORMAT,
            found: hex(&soi),
        });
    }

    let mut meta = JpegMetadata::default();
    let mut chunks = Chunks::default();

    loop {
        let marker = next_marker(s)?;
        match marker {
            SOS | EOI => break,
            SOI | TEM | 0xD0..=0xD7 => continue,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let data = read_segment(s)?;
                let dims = data.get(1..5).ok_or_else(|| malformed("SOF segment too short"))?;
                meta.height = u16::from_be_bytes([dims[0], dims[1]]);
                meta.width = u16::from_be_bytes([dims[2], dims[3]]);
            }
            APP1 => read_app1(&read_segment(s)?, &mut meta, &mut chunks),
            APP2 => {
                let data = read_segment(s)?;
                if let Some(rest) = data.strip_prefix(ICC_HEADER) {
                    if let [seq, _count, profile @ ..] = rest {
                        chunks.icc.push((*seq, profile.to_vec()));
                    }
                }
            }
            APP13 => {
                let data = read_segment(s)?;
                if data.starts_with(iptc::PHOTOSHOP_HEADER) {
                    if let Some(iim) = iptc::iim_from_photoshop_resources(&data) {
                        meta.iptc = Some(iim.to_vec());
                    }
                }
            }
            APP14 => {
                let data = read_segment(s)?;
                if data.starts_with(ADOBE_HEADER) && data.len() >= 12 {
                    meta.has_adobe_segment = true;
                    meta.color_transform = AdobeColorTransform::from_app14(data[11]);
                }
            }
            _ => skip_segment(s)?,
        }
    }

    if !chunks.icc.is_empty() {
        chunks.icc.sort_by_key(|(seq, _)| *seq);
        meta.icc_profile = Some(chunks.icc.into_iter().flat_map(|(_, c)| c).collect());
    }
    if !chunks.extended_xmp.is_empty() {
        meta.extended_xmp = assemble_extended_xmp(chunks.extended_xmp, chunks.extended_xmp_len);
    }

    debug!(
        width = meta.width,
        height = meta.height,
        exif = meta.exif.is_some(),
        iptc = meta.iptc.is_some(),
        xmp = meta.xmp.is_some(),
        icc = meta.icc_profile.is_some(),
        "read JPEG metadata"
    );
    Ok(meta)
}

fn read_app1(data: &[u8], meta: &mut JpegMetadata, chunks: &mut Chunks) {
    if let Some(exif) = data.strip_prefix(EXIF_HEADER) {
        meta.exif = Some(exif.to_vec());
    } else if let Some(packet) = data.strip_prefix(STANDARD_XMP_HEADER) {
        meta.xmp = xmp::rdf_from_bytes(packet);
        if meta.xmp.is_none() {
            warn!("JPEG XMP packet has no rdf:RDF element");
        }
    } else if let Some(rest) = data.strip_prefix(EXTENDED_XMP_HEADER) {
        // GUID (32 ASCII hex), full length (u32), chunk offset (u32), data
        if rest.len() < 40 {
            warn!(len = rest.len(), "short extended XMP chunk ignored");
            return;
        }
        let full = u32::from_be_bytes([rest[32], rest[33], rest[34], rest[35]]) as usize;
        let offset = u32::from_be_bytes([rest[36], rest[37], rest[38], rest[39]]);
        let part = &rest[40..];
        if (offset as usize).saturating_add(part.len()) > full {
            warn!(
                offset,
                len = part.len(),
                full,
                "extended XMP chunk past declared length ignored"
            );
            return;
        }
        chunks.extended_xmp_len = chunks.extended_xmp_len.max(full);
        chunks.extended_xmp.push((offset, part.to_vec()));
    }
}

fn assemble_extended_xmp(mut parts: Vec<(u32, Vec<u8>)>, declared: usize) -> Option<String> {
    // Padding is bounded by the bytes actually received, not the header.
    let received: usize = parts.iter().map(|(_, part)| part.len()).sum();
    if declared > received {
        warn!(declared, received, "extended XMP incomplete");
        return None;
    }
    parts.sort_by_key(|(offset, _)| *offset);
    let mut buf = Vec::new();
    for (offset, part) in parts {
        let offset = offset as usize;
        if offset > buf.len() {
            buf.resize(offset, b' ');
        }
        buf.truncate(offset);
        buf.extend_from_slice(&part);
    }
    xmp::rdf_from_bytes(&buf)
}

/// Next marker code, stepping over `0xFF` fill bytes.
fn next_marker<R: Read + Seek>(s: &mut ByteStream<R>) -> Result<u8, MetadataError> {
    let lead = s.read_u8()?;
    if lead != 0xFF {
        return Err(malformed(format!("expected marker, found {lead:02X}")));
    }
    loop {
        match s.read_u8()? {
            0xFF => continue,
            code => return Ok(code),
        }
    }
}

fn segment_len<R: Read + Seek>(s: &mut ByteStream<R>) -> Result<usize, MetadataError> {
    let len = s.read_u16_be()? as usize;
    len.checked_sub(2)
        .ok_or_else(|| malformed(format!("segment length {len}")))
}

fn read_segment<R: Read + Seek>(s: &mut ByteStream<R>) -> Result<Vec<u8>, MetadataError> {
    let len = segment_len(s)?;
    Ok(s.read_vec(len)?)
}

fn skip_segment<R: Read + Seek>(s: &mut ByteStream<R>) -> Result<(), MetadataError> {
    let len = segment_len(s)?;
    Ok(s.skip(len as u64)?)
}

fn malformed(reason: impl Into<String>) -> MetadataError {
    MetadataError::Malformed {
        format: FORMAT,
        reason: reason.into(),
    }
}
