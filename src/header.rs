//! OFX header block parsing and emission.
//!
//! OFX 1.x documents open with colon-delimited `KEY:VALUE` lines terminated
//! by a blank line; OFX 2.x documents carry the same metadata in an
//! `<?OFX KEY="VALUE" ...?>` processing instruction after the XML
//! declaration. Either form is followed by the tag body handled by the
//! tokenizer.

use std::io::Write;

use crate::error::{Error, Result};
use crate::OfxVersion;

/// The well-known OFX header entries, with the customary defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfxHeader {
    pub header_version: String,
    pub data: String,
    pub version: String,
    pub security: String,
    pub encoding: String,
    pub charset: String,
    pub compression: String,
    pub old_file_uid: String,
    pub new_file_uid: String,
}

impl Default for OfxHeader {
    fn default() -> Self {
        OfxHeader {
            header_version: "100".to_string(),
            data: "OFXSGML".to_string(),
            version: "102".to_string(),
            security: "NONE".to_string(),
            encoding: "USASCII".to_string(),
            charset: "1252".to_string(),
            compression: "NONE".to_string(),
            old_file_uid: "NONE".to_string(),
            new_file_uid: "NONE".to_string(),
        }
    }
}

impl OfxHeader {
    /// Header defaults for a document of the given wire version.
    pub fn for_version(version: OfxVersion) -> Self {
        match version {
            OfxVersion::V1 => OfxHeader::default(),
            OfxVersion::V2 => OfxHeader {
                header_version: "200".to_string(),
                version: "200".to_string(),
                ..OfxHeader::default()
            },
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match key {
            "OFXHEADER" => self.header_version = value.to_string(),
            "DATA" => self.data = value.to_string(),
            "VERSION" => self.version = value.to_string(),
            "SECURITY" => self.security = value.to_string(),
            "ENCODING" => self.encoding = value.to_string(),
            "CHARSET" => self.charset = value.to_string(),
            "COMPRESSION" => self.compression = value.to_string(),
            "OLDFILEUID" => self.old_file_uid = value.to_string(),
            "NEWFILEUID" => self.new_file_uid = value.to_string(),
            other => tracing::debug!(key = other, "ignoring unknown OFX header"),
        }
    }

    /// The wire mode declared by `VERSION` (1xx is SGML, everything else
    /// strict XML).
    pub fn wire_version(&self) -> OfxVersion {
        if self.version.starts_with('1') {
            OfxVersion::V1
        } else {
            OfxVersion::V2
        }
    }

    /// Write the colon-delimited OFX 1.x header block, blank line included.
    pub fn write_v1<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(writer, "OFXHEADER:{}", self.header_version)?;
        writeln!(writer, "DATA:{}", self.data)?;
        writeln!(writer, "VERSION:{}", self.version)?;
        writeln!(writer, "SECURITY:{}", self.security)?;
        writeln!(writer, "ENCODING:{}", self.encoding)?;
        writeln!(writer, "CHARSET:{}", self.charset)?;
        writeln!(writer, "COMPRESSION:{}", self.compression)?;
        writeln!(writer, "OLDFILEUID:{}", self.old_file_uid)?;
        writeln!(writer, "NEWFILEUID:{}", self.new_file_uid)?;
        writeln!(writer)?;
        Ok(())
    }

    /// Write the XML declaration and `<?OFX ...?>` processing instruction.
    pub fn write_v2<W: Write>(&self, writer: &mut W) -> Result<()> {
        writeln!(
            writer,
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>"
        )?;
        writeln!(
            writer,
            "<?OFX OFXHEADER=\"{}\" VERSION=\"{}\" SECURITY=\"{}\" OLDFILEUID=\"{}\" NEWFILEUID=\"{}\"?>",
            self.header_version, self.version, self.security, self.old_file_uid, self.new_file_uid
        )?;
        Ok(())
    }
}

/// Split a document into its parsed header, the wire mode to tokenize the
/// body with, and the body text itself.
pub fn split_document(input: &str) -> Result<(OfxHeader, OfxVersion, &str)> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('<') {
        let header = parse_v2_header(trimmed)?;
        return Ok((header, OfxVersion::V2, trimmed));
    }

    let mut header = OfxHeader::default();
    let mut saw_entry = false;
    let mut offset = 0;
    for line in input.split_inclusive('\n') {
        let text = line.trim();
        if text.starts_with('<') {
            break;
        }
        offset += line.len();
        if text.is_empty() {
            if saw_entry {
                break;
            }
            continue;
        }
        match text.split_once(':') {
            Some((key, value)) => {
                header.set(key.trim(), value);
                saw_entry = true;
            }
            None => {
                return Err(Error::Header(format!("malformed header line: {text}")));
            }
        }
    }

    if !saw_entry {
        return Err(Error::Header("no OFX header block found".to_string()));
    }

    let body = &input[offset..];
    let version = header.wire_version();
    Ok((header, version, body))
}

/// Pull the header entries out of the `<?OFX ...?>` processing instruction,
/// if present. OFX 2.x files without one still parse with defaults.
fn parse_v2_header(input: &str) -> Result<OfxHeader> {
    let mut header = OfxHeader::for_version(OfxVersion::V2);
    if let Some(start) = input.find("<?OFX") {
        let rest = &input[start + 5..];
        let end = rest
            .find("?>")
            .ok_or_else(|| Error::Header("unterminated <?OFX?> instruction".to_string()))?;
        for pair in rest[..end].split_whitespace() {
            if let Some((key, value)) = pair.split_once('=') {
                header.set(key, value.trim_matches(|c| c == '"' || c == '\''));
            }
        }
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_v1_header() {
        let doc = "OFXHEADER:100\nDATA:OFXSGML\nVERSION:102\nSECURITY:NONE\n\n<OFX></OFX>";
        let (header, version, body) = split_document(doc).unwrap();
        assert_eq!(version, OfxVersion::V1);
        assert_eq!(header.version, "102");
        assert_eq!(header.data, "OFXSGML");
        assert_eq!(body.trim(), "<OFX></OFX>");
    }

    #[test]
    fn test_parse_minimal_v1_header() {
        let doc = "OFXHEADER:100\nVERSION:102\n\n<BUYSTOCK></BUYSTOCK>";
        let (header, version, body) = split_document(doc).unwrap();
        assert_eq!(version, OfxVersion::V1);
        assert_eq!(header.header_version, "100");
        assert!(body.contains("<BUYSTOCK>"));
    }

    #[test]
    fn test_parse_v2_header() {
        let doc = "<?xml version=\"1.0\"?>\n<?OFX OFXHEADER=\"200\" VERSION=\"211\" SECURITY=\"NONE\"?>\n<OFX></OFX>";
        let (header, version, _) = split_document(doc).unwrap();
        assert_eq!(version, OfxVersion::V2);
        assert_eq!(header.version, "211");
        assert_eq!(header.security, "NONE");
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(split_document("not an ofx document").is_err());
    }

    #[test]
    fn test_v1_header_round_trip() {
        let header = OfxHeader::default();
        let mut out = Vec::new();
        header.write_v1(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let doc = format!("{text}<OFX></OFX>");
        let (parsed, version, _) = split_document(&doc).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(version, OfxVersion::V1);
    }
}
