//! Marshalling: a typed object graph to OFX bytes.
//!
//! Emission walks field descriptors in their declared order. Absent optional
//! values are omitted entirely; an absent required value aborts the marshal.
//! In the 1.x wire form leaf elements are written without closing tags, the
//! way virtually all SGML-era OFX producers did; aggregates are always
//! closed in both forms.

use std::io::Write;

use crate::coerce;
use crate::error::{Error, Result};
use crate::header::OfxHeader;
use crate::meta::{Aggregate, AggregateDescriptor, FieldKind, Registry};
use crate::tokenizer::escape_text;
use crate::OfxVersion;

/// Marshaller over a registry of aggregate metadata.
pub struct AggregateMarshaller<'r> {
    registry: &'r Registry,
}

impl<'r> AggregateMarshaller<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        AggregateMarshaller { registry }
    }

    /// Marshal a complete document (header block plus body) to bytes.
    pub fn marshal(&self, aggregate: &dyn Aggregate, version: OfxVersion) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(aggregate, version, &mut out)?;
        Ok(out)
    }

    /// Marshal to a `String`. Output is plain ASCII-compatible UTF-8.
    pub fn marshal_to_string(
        &self,
        aggregate: &dyn Aggregate,
        version: OfxVersion,
    ) -> Result<String> {
        let bytes = self.marshal(aggregate, version)?;
        String::from_utf8(bytes).map_err(|e| Error::Encoding(e.utf8_error()))
    }

    /// Marshal into any sink implementing `Write`.
    pub fn write_to<W: Write>(
        &self,
        aggregate: &dyn Aggregate,
        version: OfxVersion,
        writer: &mut W,
    ) -> Result<()> {
        let header = OfxHeader::for_version(version);
        match version {
            OfxVersion::V1 => header.write_v1(writer)?,
            OfxVersion::V2 => header.write_v2(writer)?,
        }
        // The root tag comes from the value's runtime type, so a field
        // declared as a base type still emits its concrete tag.
        let desc = self.registry.describe_value(aggregate)?;
        self.write_aggregate(writer, desc, aggregate, version)
    }

    fn write_aggregate<W: Write>(
        &self,
        writer: &mut W,
        desc: &AggregateDescriptor,
        value: &dyn Aggregate,
        version: OfxVersion,
    ) -> Result<()> {
        writeln!(writer, "<{}>", desc.tag())?;
        for field in desc.fields() {
            match &field.kind {
                FieldKind::Element { get, .. } => {
                    let tag = field.tag().unwrap_or("?");
                    let text = match get(value) {
                        Some(scalar) => escape_text(&coerce::render(&scalar)),
                        None => String::new(),
                    };
                    if text.is_empty() {
                        if field.required() {
                            return Err(Error::RequiredValue {
                                tag: tag.to_string(),
                                aggregate: desc.tag().to_string(),
                            });
                        }
                        continue;
                    }
                    match version {
                        OfxVersion::V1 => writeln!(writer, "<{tag}>{text}")?,
                        OfxVersion::V2 => writeln!(writer, "<{tag}>{text}</{tag}>")?,
                    }
                }
                FieldKind::Child { get, .. } => match get(value) {
                    Some(child) => {
                        let child_desc = self.registry.describe_value(child)?;
                        self.write_aggregate(writer, child_desc, child, version)?;
                    }
                    None => {
                        if field.required() {
                            return Err(Error::RequiredValue {
                                tag: field.tag().unwrap_or("?").to_string(),
                                aggregate: desc.tag().to_string(),
                            });
                        }
                    }
                },
                FieldKind::ChildList { get, .. } => {
                    for child in get(value) {
                        let child_desc = self.registry.describe_value(child)?;
                        self.write_aggregate(writer, child_desc, child, version)?;
                    }
                }
            }
        }
        writeln!(writer, "</{}>", desc.tag())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::default_registry;
    use crate::domain::investment::{
        BuyStockTransaction, InvBuyInfo, InvestmentTransaction, InvestmentTransactionKind,
        InvestmentTransactionList,
    };
    use crate::domain::seclist::SecurityId;
    use crate::reader::AggregateUnmarshaller;
    use chrono::TimeZone;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn secid() -> SecurityId {
        SecurityId {
            unique_id: Some("123456789".to_string()),
            unique_id_type: Some("CUSIP".to_string()),
        }
    }

    #[test]
    fn test_marshal_v1_elements_unclosed() {
        let text = AggregateMarshaller::new(default_registry())
            .marshal_to_string(&secid(), OfxVersion::V1)
            .unwrap();
        assert!(text.starts_with("OFXHEADER:100\n"));
        assert!(text.contains("VERSION:102\n"));
        assert!(text.contains("\n\n<SECID>\n"));
        assert!(text.contains("<UNIQUEID>123456789\n"));
        assert!(text.contains("<UNIQUEIDTYPE>CUSIP\n"));
        assert!(text.contains("</SECID>"));
        assert!(!text.contains("</UNIQUEID>"));
    }

    #[test]
    fn test_marshal_v2_elements_closed() {
        let text = AggregateMarshaller::new(default_registry())
            .marshal_to_string(&secid(), OfxVersion::V2)
            .unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(text.contains("<?OFX OFXHEADER=\"200\" VERSION=\"200\""));
        assert!(text.contains("<UNIQUEID>123456789</UNIQUEID>"));
        assert!(text.contains("<UNIQUEIDTYPE>CUSIP</UNIQUEIDTYPE>"));
    }

    #[test]
    fn test_marshal_missing_required_rejected() {
        let incomplete = SecurityId {
            unique_id: Some("123456789".to_string()),
            unique_id_type: None,
        };
        let result =
            AggregateMarshaller::new(default_registry()).marshal(&incomplete, OfxVersion::V1);
        match result {
            Err(Error::RequiredValue { tag, aggregate }) => {
                assert_eq!(tag, "UNIQUEIDTYPE");
                assert_eq!(aggregate, "SECID");
            }
            other => panic!("expected RequiredValue, got {other:?}"),
        }
    }

    #[test]
    fn test_marshal_escapes_text() {
        let mut tran = InvestmentTransaction::default();
        tran.transaction_id = Some("T&1".to_string());
        tran.trade_date = Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        tran.memo = Some("AT&T <shares>".to_string());
        let text = AggregateMarshaller::new(default_registry())
            .marshal_to_string(&tran, OfxVersion::V1)
            .unwrap();
        assert!(text.contains("<FITID>T&amp;1"));
        assert!(text.contains("<MEMO>AT&amp;T &lt;shares&gt;"));
    }

    #[test]
    fn test_round_trip_v1() {
        let original = BuyStockTransaction {
            buy_investment: Some(InvBuyInfo {
                investment_transaction: Some(InvestmentTransaction {
                    transaction_id: Some("TX-1".to_string()),
                    trade_date: Some(Utc.with_ymd_and_hms(2023, 7, 5, 14, 25, 30).unwrap()),
                    ..InvestmentTransaction::default()
                }),
                security_id: Some(secid()),
                units: Some(Decimal::new(10, 0)),
                unit_price: Some(Decimal::new(2550, 2)),
                total: Some(Decimal::new(-25500, 2)),
                ..InvBuyInfo::default()
            }),
            buy_type: Some("BUY".to_string()),
        };
        let bytes = AggregateMarshaller::new(default_registry())
            .marshal(&original, OfxVersion::V1)
            .unwrap();
        let parsed: BuyStockTransaction = AggregateUnmarshaller::new(default_registry())
            .unmarshal(&bytes)
            .unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_round_trip_v2_heterogeneous_list() {
        let mut list = InvestmentTransactionList::default();
        list.start = Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        list.end = Some(Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap());
        list.transactions
            .push(InvestmentTransactionKind::BuyStock(BuyStockTransaction {
                buy_investment: Some(InvBuyInfo {
                    units: Some(Decimal::new(5, 0)),
                    unit_price: Some(Decimal::new(100, 0)),
                    total: Some(Decimal::new(-500, 0)),
                    ..InvBuyInfo::default()
                }),
                buy_type: Some("BUY".to_string()),
            }));
        let bytes = AggregateMarshaller::new(default_registry())
            .marshal(&list, OfxVersion::V2)
            .unwrap();
        let parsed: InvestmentTransactionList = AggregateUnmarshaller::new(default_registry())
            .unmarshal(&bytes)
            .unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn test_optional_absent_omitted() {
        let text = AggregateMarshaller::new(default_registry())
            .marshal_to_string(&secid(), OfxVersion::V1)
            .unwrap();
        // SECID has exactly two fields; nothing else is emitted.
        let body = text.split("\n\n").nth(1).unwrap();
        assert_eq!(body.lines().count(), 4);
    }
}
