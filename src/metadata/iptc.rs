//! IPTC-IIM decoding.
//!
//! Only three Application Record (record 2) datasets are surfaced:
//!
//! | Dataset | Field |
//! |---|---|
//! | 2:05 ObjectName | `object_name` |
//! | 2:25 Keywords (repeatable) | `keywords` |
//! | 2:120 Caption-Abstract | `caption` |
//!
//! IIM bytes arrive raw (JPEG2000 IPTC box, TIFF tag 33723) or wrapped in
//! Photoshop image resource blocks (JPEG APP13, TIFF tag 34377).

use serde::Serialize;

const DATASET_MARKER: u8 = 0x1C;
const APPLICATION_RECORD: u8 = 2;
const OBJECT_NAME: u8 = 5;
const KEYWORDS: u8 = 25;
const CAPTION: u8 = 120;

pub(crate) const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_MARKER: &[u8; 4] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

const TIFF_TAG_IPTC: u16 = 33723;
const TIFF_TAG_PHOTOSHOP: u16 = 34377;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IptcFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl IptcFields {
    pub fn is_empty(&self) -> bool {
        self.object_name.is_none() && self.caption.is_none() && self.keywords.is_empty()
    }
}

/// Decode a run of IIM datasets. Bytes that don't start a dataset are
/// stepped over; a dataset whose length overruns the buffer ends decoding.
pub fn parse_iim(data: &[u8]) -> IptcFields {
    let mut fields = IptcFields::default();
    let mut pos = 0;

    while let Some(head) = data.get(pos..pos + 5) {
        if head[0] != DATASET_MARKER {
            pos += 1;
            continue;
        }
        let (record, dataset) = (head[1], head[2]);
        let len = u16::from_be_bytes([head[3], head[4]]) as usize;
        pos += 5;
        let Some(value) = data.get(pos..pos + len) else {
            break;
        };
        pos += len;

        if record != APPLICATION_RECORD {
            continue;
        }
        let value = String::from_utf8_lossy(value).trim().to_string();
        if value.is_empty() {
            continue;
        }
        match dataset {
            OBJECT_NAME => fields.object_name = Some(value),
            KEYWORDS => fields.keywords.push(value),
            CAPTION => fields.caption = Some(value),
            _ => {}
        }
    }
    fields
}

/// Find the IIM payload (resource 0x0404) inside Photoshop image resource
/// blocks. A leading `Photoshop 3.0\0` header is accepted.
///
/// Each block: `8BIM`, id (u16), Pascal name padded to even length,
/// size (u32), data padded to even length.
pub fn iim_from_photoshop_resources(data: &[u8]) -> Option<&[u8]> {
    let data = data.strip_prefix(PHOTOSHOP_HEADER).unwrap_or(data);
    let mut pos = 0;

    while pos + 12 <= data.len() {
        if &data[pos..pos + 4] != RESOURCE_MARKER {
            pos += 1;
            continue;
        }
        let id = u16::from_be_bytes([data[pos + 4], data[pos + 5]]);
        pos += 6;

        let name_len = *data.get(pos)? as usize;
        pos += (1 + name_len).next_multiple_of(2);

        let size = u32::from_be_bytes(data.get(pos..pos + 4)?.try_into().ok()?) as usize;
        pos += 4;
        let payload = data.get(pos..pos.checked_add(size)?)?;

        if id == IPTC_RESOURCE_ID {
            return Some(payload);
        }
        pos += size.next_multiple_of(2);
    }
    None
}

/// Read IPTC fields from a TIFF file's IFD chain: the raw IIM tag first,
/// then Photoshop resources. Returns `None` if nothing usable is found or
/// the header isn't TIFF.
pub fn from_tiff(data: &[u8]) -> Option<IptcFields> {
    let tiff = Tiff::new(data)?;
    let mut ifd = tiff.u32(4)? as usize;
    // Guard against IFD cycles.
    let mut visited = 0;

    while ifd != 0 && visited < 64 {
        visited += 1;
        let count = tiff.u16(ifd)? as usize;
        for i in 0..count {
            let entry = ifd + 2 + i * 12;
            let tag = tiff.u16(entry)?;
            if tag != TIFF_TAG_IPTC && tag != TIFF_TAG_PHOTOSHOP {
                continue;
            }
            let Some(value) = tiff.entry_bytes(entry) else {
                continue;
            };
            let fields = if tag == TIFF_TAG_IPTC {
                parse_iim(value)
            } else {
                iim_from_photoshop_resources(value).map(parse_iim).unwrap_or_default()
            };
            if !fields.is_empty() {
                return Some(fields);
            }
        }
        ifd = tiff.u32(ifd + 2 + count * 12)? as usize;
    }
    None
}

struct Tiff<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let big_endian = match data.get(0..2)? {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let tiff = Self { data, big_endian };
        (tiff.u16(2)? == 42).then_some(tiff)
    }

    fn u16(&self, at: usize) -> Option<u16> {
        let b: [u8; 2] = self.data.get(at..at + 2)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn u32(&self, at: usize) -> Option<u32> {
        let b: [u8; 4] = self.data.get(at..at + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    /// Value bytes of a 12-byte IFD entry, inline or at its offset.
    fn entry_bytes(&self, entry: usize) -> Option<&'a [u8]> {
        let unit = match self.u16(entry + 2)? {
            1 | 2 | 6 | 7 => 1,
            3 | 8 => 2,
            4 | 9 | 11 | 13 => 4,
            5 | 10 | 12 => 8,
            _ => 1,
        };
        let len = (self.u32(entry + 4)? as usize).checked_mul(unit)?;
        let start = if len <= 4 {
            entry + 8
        } else {
            self.u32(entry + 8)? as usize
        };
        self.data.get(start..start.checked_add(len)?)
    }
}
