//! JPEG2000 (JP2 container and raw codestream) metadata.
//!
//! The JP2 box walk pulls EXIF, IPTC and XMP from `uuid` boxes, then reads
//! the main header of the contiguous codestream (`jp2c`) for image and tile
//! geometry, component layout and DWT decomposition levels. Reading stops at
//! the first tile-part, so tile-level COD/COC overrides are not consulted.

use super::ReadState;
use super::error::{MetadataError, hex};
use super::stream::ByteStream;
use super::xmp;
use std::io::{Read, Seek};
use std::time::Instant;
use tracing::{debug, warn};

const FORMAT: &str = "JP2";

pub(crate) const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];
/// SOC followed by SIZ: a bare codestream with no JP2 wrapper.
pub(crate) const CODESTREAM_SIGNATURE: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

const BOX_UUID: &[u8; 4] = b"uuid";
const BOX_CODESTREAM: &[u8; 4] = b"jp2c";

const EXIF_UUID: [u8; 16] = *b"JpgTiffExif->JP2";
const IPTC_UUID: [u8; 16] = [
    0x33, 0xC7, 0xA4, 0xD2, 0xB8, 0x1D, 0x47, 0x23, 0xA0, 0xBA, 0xF1, 0xA3, 0xE0, 0x97, 0xAD, 0x38,
];
const XMP_UUID: [u8; 16] = [
    0xBE, 0x7A, 0xCF, 0xCB, 0x97, 0xA9, 0x42, 0xE8, 0x9C, 0x71, 0x99, 0x94, 0x91, 0xE3, 0xAF, 0xAC,
];

const SOC: u8 = 0x4F;
const SIZ: u8 = 0x51;
const COD: u8 = 0x52;
const COC: u8 = 0x53;
const SOT: u8 = 0x90;
const SOD: u8 = 0x93;
const EOC: u8 = 0xD9;

/// Bytes of SIZ segment data read below (through Ssiz of component 0).
const SIZ_MIN_LEN: usize = 37;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jpeg2000Metadata {
    pub width: u32,
    pub height: u32,
    /// Reference tile size; equals the image size when untiled.
    pub tile_width: u32,
    pub tile_height: u32,
    pub num_components: u16,
    /// Bits per sample of the first component.
    pub component_size: u8,
    pub decomposition_levels: u8,
    pub exif: Option<Vec<u8>>,
    pub iptc: Option<Vec<u8>>,
    pub xmp: Option<String>,
}

impl Jpeg2000Metadata {
    /// Resolution levels available to a decoder.
    pub fn num_resolutions(&self) -> u32 {
        u32::from(self.decomposition_levels) + 1
    }
}

#[derive(Debug)]
pub struct Jpeg2000MetadataReader<R> {
    stream: Option<ByteStream<R>>,
    state: ReadState<Jpeg2000Metadata>,
}

impl<R: Read + Seek> Default for Jpeg2000MetadataReader<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Read + Seek> Jpeg2000MetadataReader<R> {
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

    pub fn metadata(&mut self) -> Result<&Jpeg2000Metadata, MetadataError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(MetadataError::SourceNotSet);
        };
        self.state.ensure(|| read_jp2(stream))
    }

    pub fn width(&mut self) -> Result<u32, MetadataError> {
        Ok(self.metadata()?.width)
    }

    pub fn height(&mut self) -> Result<u32, MetadataError> {
        Ok(self.metadata()?.height)
    }

    pub fn tile_width(&mut self) -> Result<u32, MetadataError> {
        Ok(self.metadata()?.tile_width)
    }

    pub fn tile_height(&mut self) -> Result<u32, MetadataError> {
        Ok(self.metadata()?.tile_height)
    }

    pub fn num_components(&mut self) -> Result<u16, MetadataError> {
        Ok(self.metadata()?.num_components)
    }

    pub fn component_size(&mut self) -> Result<u8, MetadataError> {
        Ok(self.metadata()?.component_size)
    }

    pub fn decomposition_levels(&mut self) -> Result<u8, MetadataError> {
        Ok(self.metadata()?.decomposition_levels)
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
}

fn read_jp2<R: Read + Seek>(s: &mut ByteStream<R>) -> Result<Jpeg2000Metadata, MetadataError> {
    let started = Instant::now();
    let mut meta = Jpeg2000Metadata::default();

    s.mark()?;
    let signature: [u8; 12] = s.read_array()?;
    s.reset()?;

    if signature[..4] == CODESTREAM_SIGNATURE {
        read_codestream(s, &mut meta)?;
    } else if signature == JP2_SIGNATURE {
        walk_boxes(s, &mut meta)?;
    } else {
        return Err(MetadataError::InvalidSignature {
            format: FORMAT,
            found: hex(&signature),
        });
    }

    debug!(
        width = meta.width,
        height = meta.height,
        tile_width = meta.tile_width,
        tile_height = meta.tile_height,
        components = meta.num_components,
        bits = meta.component_size,
        levels = meta.decomposition_levels,
        xmp = meta.xmp.is_some(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "read JPEG2000 metadata"
    );
    Ok(meta)
}

fn walk_boxes<R: Read + Seek>(
    s: &mut ByteStream<R>,
    meta: &mut Jpeg2000Metadata,
) -> Result<(), MetadataError> {
    let end = s.length()?;
    while s.position()? < end {
        let lbox = s.read_u32_be()?;
        let tbox: [u8; 4] = s.read_array()?;
        let data_len = match lbox {
            0 => end.saturating_sub(s.position()?),
            1 => s
                .read_u64_be()?
                .checked_sub(16)
                .ok_or_else(|| malformed("XLBox shorter than its header"))?,
            n => u64::from(n)
                .checked_sub(8)
                .ok_or_else(|| malformed(format!("box length {n}")))?,
        };

        match &tbox {
            BOX_UUID => read_uuid_box(s, data_len, meta)?,
            BOX_CODESTREAM => return read_codestream(s, meta),
            _ => s.skip(data_len)?,
        }
    }
    Ok(())
}

fn read_uuid_box<R: Read + Seek>(
    s: &mut ByteStream<R>,
    data_len: u64,
    meta: &mut Jpeg2000Metadata,
) -> Result<(), MetadataError> {
    let payload_len = data_len
        .checked_sub(16)
        .ok_or_else(|| malformed("uuid box shorter than its UUID"))?;
    let uuid: [u8; 16] = s.read_array()?;
    let payload_len =
        usize::try_from(payload_len).map_err(|_| malformed("uuid box too large"))?;

    match uuid {
        EXIF_UUID => meta.exif = Some(s.read_vec(payload_len)?),
        IPTC_UUID => meta.iptc = Some(s.read_vec(payload_len)?),
        XMP_UUID => {
            let packet = s.read_vec(payload_len)?;
            meta.xmp = xmp::rdf_from_bytes(&packet);
            if meta.xmp.is_none() {
                warn!("JP2 XMP box has no rdf:RDF element");
            }
        }
        _ => s.skip(payload_len as u64)?,
    }
    Ok(())
}

fn read_codestream<R: Read + Seek>(
    s: &mut ByteStream<R>,
    meta: &mut Jpeg2000Metadata,
) -> Result<(), MetadataError> {
    loop {
        let [lead, code]: [u8; 2] = s.read_array()?;
        if lead != 0xFF {
            return Ok(());
        }
        match code {
            SOC => {}
            SIZ => read_siz(&read_segment(s)?, meta)?,
            COD => {
                let data = read_segment(s)?;
                meta.decomposition_levels =
                    *data.get(5).ok_or_else(|| malformed("COD segment too short"))?;
            }
            COC => {
                let data = read_segment(s)?;
                // Ccoc is one byte below 257 components, two otherwise; Scoc
                // follows, then SPcoc starting with the level count.
                let ccoc_len = if meta.num_components < 257 { 1 } else { 2 };
                meta.decomposition_levels = *data
                    .get(ccoc_len + 1)
                    .ok_or_else(|| malformed("COC segment too short"))?;
            }
            SOT | SOD | EOC => return Ok(()),
            _ => {
                let len = segment_len(s)?;
                s.skip(len as u64)?;
            }
        }
    }
}

fn read_siz(data: &[u8], meta: &mut Jpeg2000Metadata) -> Result<(), MetadataError> {
    if data.len() < SIZ_MIN_LEN {
        return Err(malformed(format!("SIZ segment of {} bytes", data.len())));
    }
    let u32_at = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    meta.width = u32_at(2);
    meta.height = u32_at(6);
    meta.tile_width = u32_at(18);
    meta.tile_height = u32_at(22);
    meta.num_components = u16::from_be_bytes([data[34], data[35]]);
    // High bit of Ssiz flags signed samples.
    meta.component_size = (data[36] & 0x7F) + 1;
    Ok(())
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

fn malformed(reason: impl Into<String>) -> MetadataError {
    MetadataError::Malformed {
        format: FORMAT,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn jp2_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut v = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        v.extend_from_slice(kind);
        v.extend_from_slice(payload);
        v
    }

    fn marker_segment(code: u8, data: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, code];
        v.extend_from_slice(&((data.len() + 2) as u16).to_be_bytes());
        v.extend_from_slice(data);
        v
    }

    fn siz(width: u32, height: u32, tile: u32, components: u16, ssiz: u8) -> Vec<u8> {
        let mut d = vec![0, 0]; // Rsiz
        d.extend_from_slice(&width.to_be_bytes());
        d.extend_from_slice(&height.to_be_bytes());
        d.extend_from_slice(&[0; 8]); // XOsiz, YOsiz
        d.extend_from_slice(&tile.to_be_bytes());
        d.extend_from_slice(&tile.to_be_bytes());
        d.extend_from_slice(&[0; 8]); // XTOsiz, YTOsiz
        d.extend_from_slice(&components.to_be_bytes());
        for _ in 0..components {
            d.extend_from_slice(&[ssiz, 1, 1]);
        }
        marker_segment(SIZ, &d)
    }

    fn codestream(levels: u8) -> Vec<u8> {
        let mut v = vec![0xFF, SOC];
        v.extend(siz(1000, 800, 256, 3, 7));
        v.extend(marker_segment(COD, &[0, 0, 0, 1, 1, levels, 4, 4, 0, 0]));
        v.extend(marker_segment(0x5C, &[0x22, 0x88])); // QCD
        v.extend_from_slice(&[0xFF, SOT, 0, 10]);
        v
    }

    fn read(bytes: Vec<u8>) -> Result<Jpeg2000Metadata, MetadataError> {
        let mut r = Jpeg2000MetadataReader::new();
        r.set_source(Cursor::new(bytes));
        r.metadata().cloned()
    }

    fn jp2(boxes: &[Vec<u8>]) -> Vec<u8> {
        let mut v = JP2_SIGNATURE.to_vec();
        for b in boxes {
            v.extend_from_slice(b);
        }
        v
    }

    #[test]
    fn codestream_geometry() {
        let bytes = jp2(&[jp2_box(b"ftyp", b"jp2 \0\0\0\0jp2 "), jp2_box(b"jp2c", &codestream(5))]);
        let m = read(bytes).unwrap();
        assert_eq!((m.width, m.height), (1000, 800));
        assert_eq!((m.tile_width, m.tile_height), (256, 256));
        assert_eq!(m.num_components, 3);
        assert_eq!(m.component_size, 8);
        assert_eq!(m.decomposition_levels, 5);
        assert_eq!(m.num_resolutions(), 6);
    }

    #[test]
    fn bare_codestream() {
        let m = read(codestream(3)).unwrap();
        assert_eq!(m.width, 1000);
        assert_eq!(m.decomposition_levels, 3);
    }

    #[test]
    fn coc_overrides_cod() {
        let mut cs = codestream(5);
        let sot = cs.len() - 4;
        // Ccoc (1 byte), Scoc, SPcoc: levels, ...
        cs.splice(sot..sot, marker_segment(COC, &[0, 0, 2, 4, 4, 0, 0]));
        let m = read(cs).unwrap();
        assert_eq!(m.decomposition_levels, 2);
    }

    #[test]
    fn signed_samples_mask_sign_bit() {
        let mut cs = vec![0xFF, SOC];
        cs.extend(siz(4, 4, 4, 1, 0x8F));
        cs.extend_from_slice(&[0xFF, EOC]);
        assert_eq!(read(cs).unwrap().component_size, 16);
    }

    #[test]
    fn uuid_boxes() {
        let mut xmp_payload = XMP_UUID.to_vec();
        xmp_payload.extend_from_slice(b"<x:xmpmeta><rdf:RDF ></rdf:RDF></x:xmpmeta>");
        let mut exif_payload = EXIF_UUID.to_vec();
        exif_payload.extend_from_slice(b"II*\0");
        let mut iptc_payload = IPTC_UUID.to_vec();
        iptc_payload.extend_from_slice(&[0x1C, 2, 5, 0, 1, b'x']);
        let mut other = [0xAA; 16].to_vec();
        other.extend_from_slice(b"ignored");

        let bytes = jp2(&[
            jp2_box(BOX_UUID, &other),
            jp2_box(BOX_UUID, &xmp_payload),
            jp2_box(BOX_UUID, &exif_payload),
            jp2_box(BOX_UUID, &iptc_payload),
            jp2_box(BOX_CODESTREAM, &codestream(1)),
        ]);
        let m = read(bytes).unwrap();
        assert_eq!(m.xmp.as_deref(), Some("<rdf:RDF ></rdf:RDF>"));
        assert_eq!(m.exif.as_deref(), Some(&b"II*\0"[..]));
        assert_eq!(m.iptc.as_deref(), Some(&[0x1C, 2, 5, 0, 1, b'x'][..]));
    }

    #[test]
    fn extended_box_length() {
        let payload = b"anything";
        let mut big = 1u32.to_be_bytes().to_vec();
        big.extend_from_slice(b"free");
        big.extend_from_slice(&((payload.len() + 16) as u64).to_be_bytes());
        big.extend_from_slice(payload);
        let bytes = jp2(&[big, jp2_box(BOX_CODESTREAM, &codestream(4))]);
        assert_eq!(read(bytes).unwrap().decomposition_levels, 4);
    }

    #[test]
    fn box_to_end_of_stream() {
        let mut last = 0u32.to_be_bytes().to_vec();
        last.extend_from_slice(b"jp2c");
        last.extend(codestream(2));
        assert_eq!(read(jp2(&[last])).unwrap().decomposition_levels, 2);
    }

    #[test]
    fn clean_end_without_codestream() {
        let m = read(jp2(&[jp2_box(b"ftyp", b"jp2 ")])).unwrap();
        assert_eq!(m.width, 0);
    }

    #[test]
    fn short_siz_is_malformed() {
        let mut cs = vec![0xFF, SOC];
        cs.extend(marker_segment(SIZ, &[0; 10]));
        assert!(matches!(read(cs).unwrap_err(), MetadataError::Malformed { .. }));
    }

    #[test]
    fn not_jp2() {
        let err = read(b"\x89PNG\r\n\x1a\n\0\0\0\0".to_vec()).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidSignature { format: "JP2", .. }));
    }

    #[test]
    fn truncated_box() {
        let mut bytes = jp2(&[]);
        bytes.extend_from_slice(&[0, 0, 0, 40, b'u', b'u', b'i', b'd', 1, 2]);
        assert!(read(bytes).unwrap_err().is_truncation());
    }
}
