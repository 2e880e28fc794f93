//! Investment transaction aggregates.
//!
//! Buy/sell transactions wrap a shared info aggregate (`INVBUY`/`INVSELL`)
//! carrying the common fields, mirroring the wire layout. The transaction
//! list is heterogeneous: entries are resolved by wire tag and collected
//! into [`InvestmentTransactionKind`] in encounter order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::common::OriginalCurrencyInfo;
use crate::domain::seclist::SecurityId;
use crate::error::Result;
use crate::meta::{impl_aggregate, Aggregate, RegistryBuilder};

/// Type of a buy transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuyType {
    Buy,
    BuyToCover,
}

impl BuyType {
    pub fn from_ofx(raw: &str) -> Option<Self> {
        match raw {
            "BUY" => Some(BuyType::Buy),
            "BUYTOCOVER" => Some(BuyType::BuyToCover),
            _ => None,
        }
    }
}

/// Type of a sell transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SellType {
    Sell,
    SellShort,
}

impl SellType {
    pub fn from_ofx(raw: &str) -> Option<Self> {
        match raw {
            "SELL" => Some(SellType::Sell),
            "SELLSHORT" => Some(SellType::SellShort),
            _ => None,
        }
    }
}

/// Type of investment income.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IncomeType {
    LongTermCapGains,
    ShortTermCapGains,
    Dividend,
    Interest,
    Misc,
}

impl IncomeType {
    pub fn from_ofx(raw: &str) -> Option<Self> {
        match raw {
            "CGLONG" => Some(IncomeType::LongTermCapGains),
            "CGSHORT" => Some(IncomeType::ShortTermCapGains),
            "DIV" => Some(IncomeType::Dividend),
            "INTEREST" => Some(IncomeType::Interest),
            "MISC" => Some(IncomeType::Misc),
            _ => None,
        }
    }
}

/// Sub-account a position or amount belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubAccountType {
    Cash,
    Margin,
    Short,
    Other,
}

impl SubAccountType {
    pub fn from_ofx(raw: &str) -> Option<Self> {
        match raw {
            "CASH" => Some(SubAccountType::Cash),
            "MARGIN" => Some(SubAccountType::Margin),
            "SHORT" => Some(SubAccountType::Short),
            "OTHER" => Some(SubAccountType::Other),
            _ => None,
        }
    }
}

/// 401(k) money source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Inv401kSource {
    Pretax,
    AfterTax,
    Match,
    ProfitSharing,
    Rollover,
    OtherVest,
    OtherNonvest,
}

impl Inv401kSource {
    pub fn from_ofx(raw: &str) -> Option<Self> {
        match raw {
            "PRETAX" => Some(Inv401kSource::Pretax),
            "AFTERTAX" => Some(Inv401kSource::AfterTax),
            "MATCH" => Some(Inv401kSource::Match),
            "PROFITSHARING" => Some(Inv401kSource::ProfitSharing),
            "ROLLOVER" => Some(Inv401kSource::Rollover),
            "OTHERVEST" => Some(Inv401kSource::OtherVest),
            "OTHERNONVEST" => Some(Inv401kSource::OtherNonvest),
            _ => None,
        }
    }
}

/// Fields common to every investment transaction (`INVTRAN`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct InvestmentTransaction {
    pub transaction_id: Option<String>,
    pub server_id: Option<String>,
    pub trade_date: Option<DateTime<Utc>>,
    pub settlement_date: Option<DateTime<Utc>>,
    pub reversal_transaction_id: Option<String>,
    pub memo: Option<String>,
}

/// Shared fields of a buy transaction (`INVBUY`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct InvBuyInfo {
    pub investment_transaction: Option<InvestmentTransaction>,
    pub security_id: Option<SecurityId>,
    pub units: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub markup: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub taxes: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub load: Option<Decimal>,
    pub total: Option<Decimal>,
    pub currency_code: Option<String>,
    pub original_currency: Option<OriginalCurrencyInfo>,
    pub sub_account_security: Option<String>,
    pub sub_account_fund: Option<String>,
}

impl InvBuyInfo {
    /// A transaction is priced in exactly one currency: setting the code
    /// clears any original-currency aggregate.
    pub fn set_currency_code(&mut self, code: String) {
        self.currency_code = Some(code);
        self.original_currency = None;
    }

    pub fn set_original_currency(&mut self, currency: OriginalCurrencyInfo) {
        self.original_currency = Some(currency);
        self.currency_code = None;
    }

    pub fn sub_account_security_enum(&self) -> Option<SubAccountType> {
        self.sub_account_security
            .as_deref()
            .and_then(SubAccountType::from_ofx)
    }

    pub fn sub_account_fund_enum(&self) -> Option<SubAccountType> {
        self.sub_account_fund
            .as_deref()
            .and_then(SubAccountType::from_ofx)
    }
}

/// Shared fields of a sell transaction (`INVSELL`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct InvSellInfo {
    pub investment_transaction: Option<InvestmentTransaction>,
    pub security_id: Option<SecurityId>,
    pub units: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub markdown: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub taxes: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub load: Option<Decimal>,
    pub gain: Option<Decimal>,
    pub total: Option<Decimal>,
    pub currency_code: Option<String>,
    pub original_currency: Option<OriginalCurrencyInfo>,
    pub sub_account_security: Option<String>,
    pub sub_account_fund: Option<String>,
}

impl InvSellInfo {
    pub fn set_currency_code(&mut self, code: String) {
        self.currency_code = Some(code);
        self.original_currency = None;
    }

    pub fn set_original_currency(&mut self, currency: OriginalCurrencyInfo) {
        self.original_currency = Some(currency);
        self.currency_code = None;
    }

    pub fn sub_account_security_enum(&self) -> Option<SubAccountType> {
        self.sub_account_security
            .as_deref()
            .and_then(SubAccountType::from_ofx)
    }

    pub fn sub_account_fund_enum(&self) -> Option<SubAccountType> {
        self.sub_account_fund
            .as_deref()
            .and_then(SubAccountType::from_ofx)
    }
}

/// Buy of a stock (`BUYSTOCK`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BuyStockTransaction {
    pub buy_investment: Option<InvBuyInfo>,
    pub buy_type: Option<String>,
}

impl BuyStockTransaction {
    pub fn buy_type_enum(&self) -> Option<BuyType> {
        self.buy_type.as_deref().and_then(BuyType::from_ofx)
    }
}

/// Sale of mutual fund shares (`SELLMF`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SellMutualFundTransaction {
    pub sell_investment: Option<InvSellInfo>,
    pub sell_type: Option<String>,
    pub average_cost_basis: Option<Decimal>,
    pub related_transaction_id: Option<String>,
}

impl SellMutualFundTransaction {
    pub fn sell_type_enum(&self) -> Option<SellType> {
        self.sell_type.as_deref().and_then(SellType::from_ofx)
    }
}

/// Investment income: dividends, interest, capital gains (`INCOME`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct IncomeTransaction {
    pub investment_transaction: Option<InvestmentTransaction>,
    pub security_id: Option<SecurityId>,
    pub income_type: Option<String>,
    pub total: Option<Decimal>,
    pub sub_account_security: Option<String>,
    pub sub_account_fund: Option<String>,
    pub tax_exempt: Option<bool>,
    pub withholding: Option<Decimal>,
    pub currency_code: Option<String>,
    pub original_currency: Option<OriginalCurrencyInfo>,
    pub inv_401k_source: Option<String>,
}

impl IncomeTransaction {
    pub fn set_currency_code(&mut self, code: String) {
        self.currency_code = Some(code);
        self.original_currency = None;
    }

    pub fn set_original_currency(&mut self, currency: OriginalCurrencyInfo) {
        self.original_currency = Some(currency);
        self.currency_code = None;
    }

    pub fn income_type_enum(&self) -> Option<IncomeType> {
        self.income_type.as_deref().and_then(IncomeType::from_ofx)
    }

    pub fn inv_401k_source_enum(&self) -> Option<Inv401kSource> {
        self.inv_401k_source
            .as_deref()
            .and_then(Inv401kSource::from_ofx)
    }
}

/// The closed set of transaction types an [`InvestmentTransactionList`]
/// accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InvestmentTransactionKind {
    BuyStock(BuyStockTransaction),
    SellMutualFund(SellMutualFundTransaction),
    Income(IncomeTransaction),
}

impl InvestmentTransactionKind {
    pub fn as_aggregate(&self) -> &dyn Aggregate {
        match self {
            InvestmentTransactionKind::BuyStock(t) => t,
            InvestmentTransactionKind::SellMutualFund(t) => t,
            InvestmentTransactionKind::Income(t) => t,
        }
    }

    /// Reclaim a boxed aggregate, declining types outside the set.
    pub fn from_aggregate(boxed: Box<dyn Aggregate>) -> Option<Self> {
        let any = boxed.into_any();
        let any = match any.downcast::<BuyStockTransaction>() {
            Ok(t) => return Some(InvestmentTransactionKind::BuyStock(*t)),
            Err(any) => any,
        };
        let any = match any.downcast::<SellMutualFundTransaction>() {
            Ok(t) => return Some(InvestmentTransactionKind::SellMutualFund(*t)),
            Err(any) => any,
        };
        match any.downcast::<IncomeTransaction>() {
            Ok(t) => Some(InvestmentTransactionKind::Income(*t)),
            Err(_) => None,
        }
    }
}

/// List of investment transactions over a date range (`INVTRANLIST`).
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct InvestmentTransactionList {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub transactions: Vec<InvestmentTransactionKind>,
}

impl_aggregate!(
    InvestmentTransaction,
    InvBuyInfo,
    InvSellInfo,
    BuyStockTransaction,
    SellMutualFundTransaction,
    IncomeTransaction,
    InvestmentTransactionList,
);

pub(crate) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .aggregate::<InvestmentTransaction>("INVTRAN")?
        .string(
            "FITID",
            0,
            true,
            |t| t.transaction_id.clone(),
            |t, v| t.transaction_id = Some(v),
        )
        .string(
            "SRVRTID",
            10,
            false,
            |t| t.server_id.clone(),
            |t, v| t.server_id = Some(v),
        )
        .datetime("DTTRADE", 20, true, |t| t.trade_date, |t, v| t.trade_date = Some(v))
        .datetime(
            "DTSETTLE",
            30,
            false,
            |t| t.settlement_date,
            |t, v| t.settlement_date = Some(v),
        )
        .string(
            "REVERSALFITID",
            40,
            false,
            |t| t.reversal_transaction_id.clone(),
            |t, v| t.reversal_transaction_id = Some(v),
        )
        .string("MEMO", 50, false, |t| t.memo.clone(), |t, v| t.memo = Some(v));

    builder
        .aggregate::<InvBuyInfo>("INVBUY")?
        .child::<InvestmentTransaction>(
            10,
            false,
            |b| b.investment_transaction.as_ref(),
            |b, v| b.investment_transaction = Some(v),
        )
        .child::<SecurityId>(
            20,
            false,
            |b| b.security_id.as_ref(),
            |b, v| b.security_id = Some(v),
        )
        .decimal("UNITS", 30, true, |b| b.units, |b, v| b.units = Some(v))
        .decimal("UNITPRICE", 40, true, |b| b.unit_price, |b, v| b.unit_price = Some(v))
        .decimal("MARKUP", 50, false, |b| b.markup, |b, v| b.markup = Some(v))
        .decimal("COMMISSION", 60, false, |b| b.commission, |b, v| b.commission = Some(v))
        .decimal("TAXES", 70, false, |b| b.taxes, |b, v| b.taxes = Some(v))
        .decimal("FEES", 80, false, |b| b.fees, |b, v| b.fees = Some(v))
        .decimal("LOAD", 90, false, |b| b.load, |b, v| b.load = Some(v))
        .decimal("TOTAL", 100, true, |b| b.total, |b, v| b.total = Some(v))
        .string(
            "CURRENCY",
            110,
            false,
            |b| b.currency_code.clone(),
            InvBuyInfo::set_currency_code,
        )
        .child::<OriginalCurrencyInfo>(
            120,
            false,
            |b| b.original_currency.as_ref(),
            InvBuyInfo::set_original_currency,
        )
        .string(
            "SUBACCTSEC",
            130,
            false,
            |b| b.sub_account_security.clone(),
            |b, v| b.sub_account_security = Some(v),
        )
        .string(
            "SUBACCTFUND",
            140,
            false,
            |b| b.sub_account_fund.clone(),
            |b, v| b.sub_account_fund = Some(v),
        );

    builder
        .aggregate::<InvSellInfo>("INVSELL")?
        .child::<InvestmentTransaction>(
            10,
            false,
            |s| s.investment_transaction.as_ref(),
            |s, v| s.investment_transaction = Some(v),
        )
        .child::<SecurityId>(
            20,
            false,
            |s| s.security_id.as_ref(),
            |s, v| s.security_id = Some(v),
        )
        .decimal("UNITS", 30, true, |s| s.units, |s, v| s.units = Some(v))
        .decimal("UNITPRICE", 40, true, |s| s.unit_price, |s, v| s.unit_price = Some(v))
        .decimal("MARKDOWN", 50, false, |s| s.markdown, |s, v| s.markdown = Some(v))
        .decimal("COMMISSION", 60, false, |s| s.commission, |s, v| s.commission = Some(v))
        .decimal("TAXES", 70, false, |s| s.taxes, |s, v| s.taxes = Some(v))
        .decimal("FEES", 80, false, |s| s.fees, |s, v| s.fees = Some(v))
        .decimal("LOAD", 90, false, |s| s.load, |s, v| s.load = Some(v))
        .decimal("GAIN", 95, false, |s| s.gain, |s, v| s.gain = Some(v))
        .decimal("TOTAL", 100, true, |s| s.total, |s, v| s.total = Some(v))
        .string(
            "CURRENCY",
            110,
            false,
            |s| s.currency_code.clone(),
            InvSellInfo::set_currency_code,
        )
        .child::<OriginalCurrencyInfo>(
            120,
            false,
            |s| s.original_currency.as_ref(),
            InvSellInfo::set_original_currency,
        )
        .string(
            "SUBACCTSEC",
            130,
            false,
            |s| s.sub_account_security.clone(),
            |s, v| s.sub_account_security = Some(v),
        )
        .string(
            "SUBACCTFUND",
            140,
            false,
            |s| s.sub_account_fund.clone(),
            |s, v| s.sub_account_fund = Some(v),
        );

    builder
        .aggregate::<BuyStockTransaction>("BUYSTOCK")?
        .child::<InvBuyInfo>(
            10,
            false,
            |b| b.buy_investment.as_ref(),
            |b, v| b.buy_investment = Some(v),
        )
        .string(
            "BUYTYPE",
            20,
            true,
            |b| b.buy_type.clone(),
            |b, v| b.buy_type = Some(v),
        );

    builder
        .aggregate::<SellMutualFundTransaction>("SELLMF")?
        .child::<InvSellInfo>(
            10,
            false,
            |s| s.sell_investment.as_ref(),
            |s, v| s.sell_investment = Some(v),
        )
        .string(
            "SELLTYPE",
            20,
            false,
            |s| s.sell_type.clone(),
            |s, v| s.sell_type = Some(v),
        )
        .decimal(
            "AVGCOSTBASIS",
            30,
            false,
            |s| s.average_cost_basis,
            |s, v| s.average_cost_basis = Some(v),
        )
        .string(
            "RELFITID",
            40,
            false,
            |s| s.related_transaction_id.clone(),
            |s, v| s.related_transaction_id = Some(v),
        );

    builder
        .aggregate::<IncomeTransaction>("INCOME")?
        .child::<InvestmentTransaction>(
            10,
            false,
            |i| i.investment_transaction.as_ref(),
            |i, v| i.investment_transaction = Some(v),
        )
        .child::<SecurityId>(
            20,
            false,
            |i| i.security_id.as_ref(),
            |i, v| i.security_id = Some(v),
        )
        .string(
            "INCOMETYPE",
            30,
            true,
            |i| i.income_type.clone(),
            |i, v| i.income_type = Some(v),
        )
        .decimal("TOTAL", 40, true, |i| i.total, |i, v| i.total = Some(v))
        .string(
            "SUBACCTSEC",
            50,
            false,
            |i| i.sub_account_security.clone(),
            |i, v| i.sub_account_security = Some(v),
        )
        .string(
            "SUBACCTFUND",
            60,
            false,
            |i| i.sub_account_fund.clone(),
            |i, v| i.sub_account_fund = Some(v),
        )
        .boolean(
            "TAXEXEMPT",
            70,
            false,
            |i| i.tax_exempt,
            |i, v| i.tax_exempt = Some(v),
        )
        .decimal(
            "WITHHOLDING",
            80,
            false,
            |i| i.withholding,
            |i, v| i.withholding = Some(v),
        )
        .string(
            "CURRENCY",
            90,
            false,
            |i| i.currency_code.clone(),
            IncomeTransaction::set_currency_code,
        )
        .string(
            "INV401KSOURCE",
            110,
            false,
            |i| i.inv_401k_source.clone(),
            |i, v| i.inv_401k_source = Some(v),
        )
        .child::<OriginalCurrencyInfo>(
            120,
            false,
            |i| i.original_currency.as_ref(),
            IncomeTransaction::set_original_currency,
        );

    builder
        .aggregate::<InvestmentTransactionList>("INVTRANLIST")?
        .datetime("DTSTART", 0, true, |l| l.start, |l, v| l.start = Some(v))
        .datetime("DTEND", 10, true, |l| l.end, |l, v| l.end = Some(v))
        .child_list_any(
            20,
            |l| l.transactions.iter().map(|t| t.as_aggregate()).collect(),
            |l, boxed| match InvestmentTransactionKind::from_aggregate(boxed) {
                Some(tran) => {
                    l.transactions.push(tran);
                    true
                }
                None => false,
            },
        );

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::domain::default_registry;
    use crate::reader::AggregateUnmarshaller;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    use super::*;

    fn v1(body: &str) -> String {
        format!("OFXHEADER:100\nVERSION:102\n\n{body}")
    }

    #[test]
    fn test_enum_lookups() {
        assert_eq!(BuyType::from_ofx("BUYTOCOVER"), Some(BuyType::BuyToCover));
        assert_eq!(SellType::from_ofx("SELLSHORT"), Some(SellType::SellShort));
        assert_eq!(IncomeType::from_ofx("CGLONG"), Some(IncomeType::LongTermCapGains));
        assert_eq!(Inv401kSource::from_ofx("ROLLOVER"), Some(Inv401kSource::Rollover));
        assert_eq!(BuyType::from_ofx("SHORTED"), None);
    }

    #[test]
    fn test_currency_mutual_exclusion() {
        let mut info = InvBuyInfo::default();
        info.set_currency_code("USD".to_string());
        assert_eq!(info.currency_code.as_deref(), Some("USD"));

        info.set_original_currency(OriginalCurrencyInfo {
            currency_rate: Some(Decimal::new(109, 2)),
            currency_code: Some("EUR".to_string()),
        });
        assert_eq!(info.currency_code, None);
        assert!(info.original_currency.is_some());

        info.set_currency_code("GBP".to_string());
        assert_eq!(info.original_currency, None);
    }

    #[test]
    fn test_heterogeneous_list_preserves_order() {
        let doc = v1(
            "<INVTRANLIST><DTSTART>20230101<DTEND>20231231\
             <BUYSTOCK><INVBUY><UNITS>10<UNITPRICE>25.50<TOTAL>-255.00</INVBUY>\
             <BUYTYPE>BUY</BUYSTOCK>\
             <INCOME><INCOMETYPE>DIV<TOTAL>12.40</INCOME>\
             <SELLMF><INVSELL><UNITS>-3<UNITPRICE>40.00<TOTAL>120.00</INVSELL>\
             <SELLTYPE>SELL</SELLMF>\
             </INVTRANLIST>",
        );
        let list: InvestmentTransactionList = AggregateUnmarshaller::new(default_registry())
            .unmarshal(doc.as_bytes())
            .unwrap();
        assert_eq!(
            list.start,
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(list.transactions.len(), 3);
        assert!(matches!(
            list.transactions[0],
            InvestmentTransactionKind::BuyStock(_)
        ));
        assert!(matches!(
            list.transactions[1],
            InvestmentTransactionKind::Income(_)
        ));
        assert!(matches!(
            list.transactions[2],
            InvestmentTransactionKind::SellMutualFund(_)
        ));
    }

    #[test]
    fn test_list_drops_foreign_aggregate() {
        // SECID is registered but is not a transaction; the list declines it
        // and parsing continues.
        let doc = v1(
            "<INVTRANLIST><DTSTART>20230101<DTEND>20231231\
             <SECID><UNIQUEID>1<UNIQUEIDTYPE>CUSIP</SECID>\
             <INCOME><INCOMETYPE>DIV<TOTAL>12.40</INCOME>\
             </INVTRANLIST>",
        );
        let list: InvestmentTransactionList = AggregateUnmarshaller::new(default_registry())
            .unmarshal(doc.as_bytes())
            .unwrap();
        assert_eq!(list.transactions.len(), 1);
    }

    #[test]
    fn test_nested_wrapper_fields() {
        let doc = v1(
            "<SELLMF><INVSELL><INVTRAN><FITID>S-9<DTTRADE>20230915</INVTRAN>\
             <SECID><UNIQUEID>987<UNIQUEIDTYPE>CUSIP</SECID>\
             <UNITS>-3<UNITPRICE>40.00<GAIN>15.00<TOTAL>120.00</INVSELL>\
             <SELLTYPE>SELL<AVGCOSTBASIS>35.00</SELLMF>",
        );
        let sell: SellMutualFundTransaction = AggregateUnmarshaller::new(default_registry())
            .unmarshal(doc.as_bytes())
            .unwrap();
        let invsell = sell.sell_investment.as_ref().unwrap();
        assert_eq!(
            invsell
                .investment_transaction
                .as_ref()
                .unwrap()
                .transaction_id
                .as_deref(),
            Some("S-9")
        );
        assert_eq!(invsell.gain, Some(Decimal::new(1500, 2)));
        assert_eq!(sell.sell_type_enum(), Some(SellType::Sell));
        assert_eq!(sell.average_cost_basis, Some(Decimal::new(3500, 2)));
    }
}
