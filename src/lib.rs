//! OFX Codec Library
//!
//! A metadata-driven marshalling engine for the Open Financial Exchange
//! format, covering both the SGML-flavored 1.x wire form and the strict-XML
//! 2.x wire form.
//!
//! # Supported Formats
//!
//! - **OFX 1.x**: colon-delimited header block, SGML body where leaf
//!   elements may omit their closing tags
//! - **OFX 2.x**: `<?OFX ...?>` processing-instruction header, well-formed
//!   XML body
//!
//! # Features
//!
//! - Declarative aggregate metadata: wire tags, field order, required
//!   flags, scalar types
//! - Unmarshal to a statically known root type or dispatch on the root tag
//! - Marshal any registered aggregate to either wire form
//! - Tolerant reading: unknown tags are skipped, unknown enum tokens are
//!   preserved as raw strings
//! - Use standard `Read` and `Write` traits for flexibility
//!
//! # Examples
//!
//! ## Parsing an OFX 1.x document
//!
//! ```
//! use ofx_codec::domain::default_registry;
//! use ofx_codec::domain::investment::BuyStockTransaction;
//! use ofx_codec::reader::AggregateUnmarshaller;
//!
//! let doc = "OFXHEADER:100\nVERSION:102\n\n\
//!            <BUYSTOCK><INVBUY><UNITS>10<UNITPRICE>25.50<TOTAL>-255.00</INVBUY>\
//!            <BUYTYPE>BUY</BUYSTOCK>";
//! let buy: BuyStockTransaction =
//!     AggregateUnmarshaller::new(default_registry()).unmarshal(doc.as_bytes())?;
//! assert_eq!(buy.buy_type.as_deref(), Some("BUY"));
//! # Ok::<(), ofx_codec::Error>(())
//! ```
//!
//! ## Writing the same object as OFX 2.x
//!
//! ```
//! # use ofx_codec::domain::default_registry;
//! # use ofx_codec::domain::seclist::SecurityId;
//! use ofx_codec::writer::AggregateMarshaller;
//! use ofx_codec::OfxVersion;
//!
//! let security = SecurityId {
//!     unique_id: Some("123456789".to_string()),
//!     unique_id_type: Some("CUSIP".to_string()),
//! };
//! let xml = AggregateMarshaller::new(default_registry())
//!     .marshal_to_string(&security, OfxVersion::V2)?;
//! assert!(xml.contains("<UNIQUEID>123456789</UNIQUEID>"));
//! # Ok::<(), ofx_codec::Error>(())
//! ```

pub mod coerce;
pub mod domain;
pub mod error;
pub mod header;
pub mod meta;
pub mod reader;
pub mod tokenizer;
pub mod writer;

use std::str::FromStr;

// Re-export commonly used types
pub use error::{Error, Result};
pub use meta::{Aggregate, AggregateDescriptor, FieldDescriptor, Registry, RegistryBuilder};
pub use reader::{unmarshal_any, AggregateUnmarshaller};
pub use writer::AggregateMarshaller;

/// The two OFX wire forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfxVersion {
    /// OFX 1.x SGML form
    V1,
    /// OFX 2.x XML form
    V2,
}

impl FromStr for OfxVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" | "102" | "103" | "151" | "160" => Ok(OfxVersion::V1),
            "2" | "200" | "202" | "203" | "210" | "211" | "220" => Ok(OfxVersion::V2),
            other => Err(Error::Header(format!("unsupported OFX version: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_str() {
        assert_eq!("102".parse::<OfxVersion>().unwrap(), OfxVersion::V1);
        assert_eq!("160".parse::<OfxVersion>().unwrap(), OfxVersion::V1);
        assert_eq!("200".parse::<OfxVersion>().unwrap(), OfxVersion::V2);
        assert_eq!("211".parse::<OfxVersion>().unwrap(), OfxVersion::V2);
        assert!("999".parse::<OfxVersion>().is_err());
    }
}
