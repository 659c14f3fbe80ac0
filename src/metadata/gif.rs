//! GIF block walker.
//!
//! Reads the logical screen size, the NETSCAPE loop count, the graphic
//! control delay and the XMP application extension without decoding any
//! image data. XMP is stored in GIF as a raw byte run followed by a "magic
//! trailer" (so generic decoders that expect sub-blocks see a valid stream);
//! it must never be read as sub-blocks.
//!
//! Layout walked here:
//!
//! ```text
//! "GIF" "87a"|"89a"
//! width:u16le height:u16le flags:u8 background:u8 aspect:u8
//! [global color table]
//! { 0x2C image descriptor | 0x21 label extension } ... 0x3B
//! ```

use super::error::{MetadataError, hex};
use super::stream::ByteStream;
use super::xmp;
use super::ReadState;
use std::io::{self, Read, Seek};
use std::time::Instant;
use tracing::{debug, warn};

const FORMAT: &str = "GIF";
const SIGNATURE: &[u8; 3] = b"GIF";
const VERSIONS: [&[u8; 3]; 2] = [b"87a", b"89a"];

const IMAGE_DESCRIPTOR: u8 = 0x2C;
const EXTENSION_INTRODUCER: u8 = 0x21;
const TRAILER: u8 = 0x3B;

const PLAIN_TEXT_LABEL: u8 = 0x01;
const APPLICATION_LABEL: u8 = 0xFF;
const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
const COMMENT_LABEL: u8 = 0xFE;

const NETSCAPE_ID: &[u8; 8] = b"NETSCAPE";
const NETSCAPE_AUTH: &[u8; 3] = b"2.0";
const XMP_ID: &[u8; 8] = b"XMP Data";
const XMP_AUTH: &[u8; 3] = b"XMP";

/// Flag bit marking a color table in the screen and image descriptors.
const COLOR_TABLE_FLAG: u8 = 0x01;

/// Bytes of the XMP magic trailer left in the buffer once the raw read
/// stops. The trailer is 258 bytes (`0x01`, `0xFF` down to `0x00`, then the
/// block terminator); reading stops at its `0x00`, so the bytes `0x01,
/// 0xFF..=0x02` remain and are dropped.
pub const XMP_TRAILER_LEN: usize = 256;

/// Largest raw XMP block kept, trailer included. Longer blocks are skipped.
pub const MAX_XMP_LEN: usize = 64 * 1024;

/// Loop count reported when no NETSCAPE extension is present.
pub const DEFAULT_LOOP_COUNT: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GifMetadata {
    pub width: u16,
    pub height: u16,
    /// Length in bytes of the global color table, if the header declares one.
    pub color_table_len: Option<usize>,
    pub loop_count: u16,
    /// Frame delay in hundredths of a second.
    pub delay_time: u16,
    /// RDF/XML from the XMP application extension.
    pub xmp: Option<String>,
}

/// Lazily parses GIF metadata from a seekable stream.
///
/// The first accessor call parses; later calls return the cached result,
/// including a cached failure.
///
/// ```
/// use iiif_raster::metadata::GifMetadataReader;
/// use std::io::Cursor;
///
/// let gif = b"GIF89a\x02\x00\x03\x00\x00\x00\x00\x3B".to_vec();
/// let mut reader = GifMetadataReader::new();
/// reader.set_source(Cursor::new(gif));
/// assert_eq!(reader.width().unwrap(), 2);
/// assert_eq!(reader.loop_count().unwrap(), 1);
/// ```
#[derive(Debug)]
pub struct GifMetadataReader<R> {
    stream: Option<ByteStream<R>>,
    state: ReadState<GifMetadata>,
}

impl<R: Read + Seek> Default for GifMetadataReader<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Read + Seek> GifMetadataReader<R> {
    pub fn new() -> Self {
        Self {
            stream: None,
            state: ReadState::Unparsed,
        }
    }

    /// Bind a fresh stream, discarding anything read from a previous one.
    pub fn set_source(&mut self, source: R) {
        self.stream = Some(ByteStream::new(source));
        self.state = ReadState::Unparsed;
    }

    /// Give the stream back to the caller.
    pub fn into_source(self) -> Option<R> {
        self.stream.map(ByteStream::into_inner)
    }

    pub fn metadata(&mut self) -> Result<&GifMetadata, MetadataError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(MetadataError::SourceNotSet);
        };
        self.state.ensure(|| read_gif(stream))
    }

    pub fn width(&mut self) -> Result<u16, MetadataError> {
        Ok(self.metadata()?.width)
    }

    pub fn height(&mut self) -> Result<u16, MetadataError> {
        Ok(self.metadata()?.height)
    }

    pub fn loop_count(&mut self) -> Result<u16, MetadataError> {
        Ok(self.metadata()?.loop_count)
    }

    pub fn delay_time(&mut self) -> Result<u16, MetadataError> {
        Ok(self.metadata()?.delay_time)
    }

    pub fn xmp(&mut self) -> Result<Option<&str>, MetadataError> {
        Ok(self.metadata()?.xmp.as_deref())
    }
}

fn read_gif<R: Read + Seek>(s: &mut ByteStream<R>) -> Result<GifMetadata, MetadataError> {
    let started = Instant::now();

    let signature: [u8; 3] = s.read_array()?;
    if &signature != SIGNATURE {
        return Err(MetadataError::InvalidSignature {
            format: FORMAT,
            found: hex(&signature),
        });
    }
    let version: [u8; 3] = s.read_array()?;
    if !VERSIONS.contains(&&version) {
        return Err(MetadataError::InvalidVersion {
            format: FORMAT,
            found: hex(&version),
        });
    }

    let width = s.read_u16_le()?;
    let height = s.read_u16_le()?;
    let flags = s.read_u8()?;
    let color_table_len = color_table_len(flags);
    s.skip(2)?;

    let mut meta = GifMetadata {
        width,
        height,
        color_table_len,
        loop_count: DEFAULT_LOOP_COUNT,
        delay_time: 0,
        xmp: None,
    };

    // Some files declare a table they don't contain. Skip it tentatively; if
    // the walk then runs off the end, come back and walk from here instead.
    s.mark()?;
    if let Some(len) = color_table_len {
        if (len as u64) < s.length()? {
            s.skip(len as u64)?;
        }
    }
    match walk_blocks(s, &mut meta) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            warn!(
                declared = color_table_len,
                "GIF ended early after skipping the color table; retrying without skip"
            );
            s.reset()?;
            walk_blocks(s, &mut meta)?;
        }
        Err(e) => return Err(e.into()),
    }

    debug!(
        width = meta.width,
        height = meta.height,
        loop_count = meta.loop_count,
        delay = meta.delay_time,
        xmp = meta.xmp.is_some(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "read GIF metadata"
    );
    Ok(meta)
}

fn color_table_len(flags: u8) -> Option<usize> {
    (flags & COLOR_TABLE_FLAG != 0).then(|| 3 * (1usize << ((flags & 0b111) + 1)))
}

fn walk_blocks<R: Read + Seek>(s: &mut ByteStream<R>, meta: &mut GifMetadata) -> io::Result<()> {
    loop {
        match s.read_u8()? {
            IMAGE_DESCRIPTOR => skip_image(s)?,
            EXTENSION_INTRODUCER => read_extension(s, meta)?,
            TRAILER => return Ok(()),
            _ => {}
        }
    }
}

fn skip_image<R: Read + Seek>(s: &mut ByteStream<R>) -> io::Result<()> {
    // left, top, width, height (u16 each), flags
    let descriptor: [u8; 9] = s.read_array()?;
    if let Some(len) = color_table_len(descriptor[8]) {
        s.skip(len as u64)?;
    }
    s.skip(1)?; // LZW minimum code size
    skip_sub_blocks(s)
}

fn read_extension<R: Read + Seek>(s: &mut ByteStream<R>, meta: &mut GifMetadata) -> io::Result<()> {
    match s.read_u8()? {
        PLAIN_TEXT_LABEL => {
            s.skip(13)?;
            skip_sub_blocks(s)
        }
        APPLICATION_LABEL => read_application_extension(s, meta),
        GRAPHIC_CONTROL_LABEL => {
            s.skip(2)?;
            meta.delay_time = s.read_u16_le()?;
            s.skip(1)
        }
        COMMENT_LABEL => skip_sub_blocks(s),
        _ => skip_sub_blocks(s),
    }
}

fn read_application_extension<R: Read + Seek>(
    s: &mut ByteStream<R>,
    meta: &mut GifMetadata,
) -> io::Result<()> {
    s.skip(1)?; // block size, always 11
    let identifier: [u8; 8] = s.read_array()?;
    let auth: [u8; 3] = s.read_array()?;

    if &identifier == NETSCAPE_ID && &auth == NETSCAPE_AUTH {
        // sub-block size, sub-block id
        s.skip(2)?;
        meta.loop_count = s.read_u16_le()?;
        Ok(())
    } else if &identifier == XMP_ID && &auth == XMP_AUTH {
        meta.xmp = read_xmp(s)?;
        Ok(())
    } else {
        skip_sub_blocks(s)
    }
}

fn read_xmp<R: Read + Seek>(s: &mut ByteStream<R>) -> io::Result<Option<String>> {
    let mut raw = Vec::new();
    loop {
        match s.read_u8()? {
            0 => break,
            b if raw.len() < MAX_XMP_LEN => raw.push(b),
            _ => {
                warn!(max = MAX_XMP_LEN, "GIF XMP block too large, skipped");
                while s.read_u8()? != 0 {}
                return Ok(None);
            }
        }
    }
    let Some(packet_len) = raw.len().checked_sub(XMP_TRAILER_LEN) else {
        warn!(len = raw.len(), "GIF XMP block shorter than its trailer");
        return Ok(None);
    };
    let rdf = xmp::rdf_from_bytes(&raw[..packet_len]);
    if rdf.is_none() {
        warn!("GIF XMP packet has no rdf:RDF element");
    }
    Ok(rdf)
}

fn skip_sub_blocks<R: Read + Seek>(s: &mut ByteStream<R>) -> io::Result<()> {
    loop {
        match s.read_u8()? {
            0 => return Ok(()),
            len => s.skip(len as u64)?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> GifMetadataReader<Cursor<Vec<u8>>> {
        let mut r = GifMetadataReader::new();
        r.set_source(Cursor::new(bytes));
        r
    }

    fn header(width: u16, height: u16, flags: u8) -> Vec<u8> {
        let mut v = b"GIF89a".to_vec();
        v.extend_from_slice(&width.to_le_bytes());
        v.extend_from_slice(&height.to_le_bytes());
        v.extend_from_slice(&[flags, 0, 0]);
        v
    }

    #[test]
    fn color_table_length_from_flags() {
        assert_eq!(color_table_len(0b0000_0000), None);
        assert_eq!(color_table_len(0b0000_0001), Some(12));
        assert_eq!(color_table_len(0b0000_0111), Some(768));
        assert_eq!(color_table_len(0b1111_0101), Some(192));
    }

    #[test]
    fn reads_screen_size() {
        let mut bytes = header(640, 480, 0);
        bytes.push(TRAILER);
        let mut r = reader(bytes);
        assert_eq!(r.width().unwrap(), 640);
        assert_eq!(r.height().unwrap(), 480);
        assert_eq!(r.delay_time().unwrap(), 0);
    }

    #[test]
    fn graphic_control_delay() {
        let mut bytes = header(1, 1, 0);
        bytes.extend_from_slice(&[0x21, 0xF9, 0x04, 0x00, 0x32, 0x00, 0x00, 0x00]);
        bytes.push(TRAILER);
        assert_eq!(reader(bytes).delay_time().unwrap(), 50);
    }

    #[test]
    fn image_descriptor_data_is_skipped() {
        let mut bytes = header(4, 4, 0);
        bytes.push(IMAGE_DESCRIPTOR);
        bytes.extend_from_slice(&[0, 0, 0, 0, 4, 0, 4, 0, 0]);
        bytes.push(2); // LZW min code size
        // Image data containing bytes that look like block tags.
        bytes.extend_from_slice(&[3, 0x21, 0xF9, 0x3B, 0]);
        bytes.extend_from_slice(&[0x21, 0xF9, 0x04, 0x00, 0x07, 0x00, 0x00, 0x00]);
        bytes.push(TRAILER);
        assert_eq!(reader(bytes).delay_time().unwrap(), 7);
    }

    #[test]
    fn comment_and_unknown_extensions_skipped() {
        let mut bytes = header(1, 1, 0);
        bytes.extend_from_slice(&[0x21, 0xFE, 3, b'h', b'e', b'y', 0]);
        bytes.extend_from_slice(&[0x21, 0x42, 2, 0xAA, 0xBB, 0]);
        bytes.extend_from_slice(&[0x21, 0xFF, 0x0B]);
        bytes.extend_from_slice(b"ANIMEXTS1.0");
        bytes.extend_from_slice(&[3, 1, 9, 0, 0]);
        bytes.push(TRAILER);
        let mut r = reader(bytes);
        assert_eq!(r.loop_count().unwrap(), DEFAULT_LOOP_COUNT);
    }

    #[test]
    fn plain_text_extension_skipped() {
        let mut bytes = header(1, 1, 0);
        bytes.extend_from_slice(&[0x21, 0x01]);
        bytes.extend_from_slice(&[12; 13]);
        bytes.extend_from_slice(&[2, b'h', b'i', 0]);
        bytes.push(TRAILER);
        assert!(reader(bytes).metadata().is_ok());
    }

    #[test]
    fn bad_version_rejected() {
        let mut bytes = b"GIF90a".to_vec();
        bytes.extend_from_slice(&[1, 0, 1, 0, 0, 0, 0, TRAILER]);
        let err = reader(bytes).width().unwrap_err();
        assert!(matches!(err, MetadataError::InvalidVersion { .. }), "{err}");
    }

    #[test]
    fn truncated_header_is_fatal() {
        let err = reader(b"GIF89a\x01".to_vec()).width().unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn missing_trailer_after_retry_is_fatal() {
        let bytes = header(1, 1, 0);
        let err = reader(bytes).width().unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn no_source() {
        let mut r: GifMetadataReader<Cursor<Vec<u8>>> = GifMetadataReader::new();
        assert!(matches!(r.width(), Err(MetadataError::SourceNotSet)));
    }

    #[test]
    fn set_source_resets_state() {
        let mut r = reader(b"PNG".to_vec());
        assert!(r.width().is_err());
        let mut bytes = header(9, 9, 0);
        bytes.push(TRAILER);
        r.set_source(Cursor::new(bytes));
        assert_eq!(r.width().unwrap(), 9);
    }

    #[test]
    fn xmp_shorter_than_trailer_is_absent() {
        let mut bytes = header(1, 1, 0);
        bytes.extend_from_slice(&[0x21, 0xFF, 0x0B]);
        bytes.extend_from_slice(b"XMP DataXMP");
        bytes.extend_from_slice(b"<rdf:RDF></rdf:RDF>");
        bytes.push(0);
        bytes.push(TRAILER);
        assert_eq!(reader(bytes).xmp().unwrap(), None);
    }

    #[test]
    fn oversized_xmp_is_skipped() {
        let mut bytes = header(7, 1, 0);
        bytes.extend_from_slice(&[0x21, 0xFF, 0x0B]);
        bytes.extend_from_slice(b"XMP DataXMP");
        bytes.extend(std::iter::repeat_n(b'a', MAX_XMP_LEN + 10));
        bytes.push(0);
        bytes.push(TRAILER);
        let mut r = reader(bytes);
        assert_eq!(r.xmp().unwrap(), None);
        assert_eq!(r.width().unwrap(), 7);
    }
}
