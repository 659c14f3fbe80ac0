//! XMP packet helpers.

const RDF_OPEN: &str = "<rdf:RDF";
const RDF_CLOSE: &str = "</rdf:RDF>";

/// The `<rdf:RDF ...>...</rdf:RDF>` element of an XMP packet, without the
/// `x:xmpmeta` wrapper and `<?xpacket?>` processing instructions.
pub fn extract_rdf(packet: &str) -> Option<&str> {
    let start = packet.find(RDF_OPEN)?;
    let end = packet[start..].find(RDF_CLOSE)? + start + RDF_CLOSE.len();
    Some(&packet[start..end])
}

/// Decode `bytes` as UTF-8 (lossy) and trim to the RDF element.
pub fn rdf_from_bytes(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    extract_rdf(&text).map(str::to_string)
}
