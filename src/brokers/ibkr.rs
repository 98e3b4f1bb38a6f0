//! Interactive Brokers Flex Query statement (XML).

use super::{FileFormatError, ParsedStatement};
use crate::core::{CanonicalTransaction, Side, Subtype, TransactionType};
use crate::utils::parse_decimal;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

pub const SOURCE: &str = "ibkr";

#[derive(Debug, Deserialize)]
struct FlexQueryResponse {
    #[serde(rename = "FlexStatements")]
    statements: FlexStatements,
}

#[derive(Debug, Deserialize)]
struct FlexStatements {
    #[serde(rename = "FlexStatement", default)]
    items: Vec<FlexStatement>,
}

#[derive(Debug, Deserialize)]
struct FlexStatement {
    #[serde(rename = "Trades", default)]
    trades: Option<Trades>,
    #[serde(rename = "CashTransactions", default)]
    cash_transactions: Option<CashTransactions>,
}

#[derive(Debug, Deserialize)]
struct Trades {
    #[serde(rename = "Trade", default)]
    items: Vec<Trade>,
}

#[derive(Debug, Deserialize)]
struct CashTransactions {
    #[serde(rename = "CashTransaction", default)]
    items: Vec<CashTransaction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Trade {
    #[serde(rename = "@assetCategory")]
    asset_category: String,
    #[serde(rename = "@symbol")]
    symbol: String,
    #[serde(rename = "@description")]
    description: String,
    #[serde(rename = "@isin")]
    isin: String,
    #[serde(rename = "@quantity")]
    quantity: String,
    #[serde(rename = "@tradePrice")]
    trade_price: String,
    #[serde(rename = "@proceeds")]
    proceeds: String,
    #[serde(rename = "@currency")]
    currency: String,
    #[serde(rename = "@ibCommission")]
    ib_commission: String,
    #[serde(rename = "@buySell")]
    buy_sell: String,
    #[serde(rename = "@putCall")]
    put_call: String,
    #[serde(rename = "@dateTime")]
    date_time: String,
    #[serde(rename = "@tradeDate")]
    trade_date: String,
    #[serde(rename = "@ibOrderID")]
    ib_order_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CashTransaction {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "@description")]
    description: String,
    #[serde(rename = "@dateTime")]
    date_time: String,
    #[serde(rename = "@amount")]
    amount: String,
    #[serde(rename = "@currency")]
    currency: String,
    #[serde(rename = "@levelOfDetail")]
    level_of_detail: String,
    #[serde(rename = "@isin")]
    isin: String,
    #[serde(rename = "@symbol")]
    symbol: String,
}

/// Flex timestamps come as `20230115;093000`, `2023-01-15;09:30:00`,
/// `2023-01-15 09:30:00` or a bare date.
fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    const FORMATS: &[&str] = &[
        "%Y%m%d;%H%M%S",
        "%Y-%m-%d;%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d, %H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            ["%Y%m%d", "%Y-%m-%d"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Σ|ibCommission| of all fills sharing an order id
fn commissions_by_order(trades: &[Trade]) -> HashMap<&str, Decimal> {
    let mut commissions: HashMap<&str, Decimal> = HashMap::new();
    for trade in trades {
        let order_id = trade.ib_order_id.trim();
        if order_id.is_empty() {
            continue;
        }
        let commission = parse_decimal(&trade.ib_commission).unwrap_or_default();
        *commissions.entry(order_id).or_default() += commission.abs();
    }
    commissions
}

impl Trade {
    fn text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.symbol
        } else {
            &self.description
        }
    }

    fn instrument_type(&self) -> Option<(TransactionType, Subtype)> {
        match self.asset_category.trim() {
            "STK" => Some((TransactionType::Stock, Subtype::None)),
            "OPT" => match self.put_call.trim() {
                "C" => Some((TransactionType::Option, Subtype::Call)),
                "P" => Some((TransactionType::Option, Subtype::Put)),
                _ => None,
            },
            _ => None,
        }
    }

    fn to_canonical(
        &self,
        commissions: &HashMap<&str, Decimal>,
    ) -> Result<CanonicalTransaction, String> {
        let (kind, subtype) = self.instrument_type().ok_or_else(|| {
            format!(
                "unsupported asset category '{}' ({})",
                self.asset_category, self.put_call
            )
        })?;
        let side = self
            .buy_sell
            .split_whitespace()
            .next()
            .and_then(Side::parse)
            .ok_or_else(|| format!("invalid buySell '{}'", self.buy_sell))?;
        let datetime = parse_datetime(&self.date_time)
            .or_else(|| parse_datetime(&self.trade_date))
            .ok_or_else(|| format!("invalid dateTime '{}'", self.date_time))?;
        let quantity = parse_decimal(&self.quantity)
            .ok_or_else(|| format!("invalid quantity '{}'", self.quantity))?;
        let price = parse_decimal(&self.trade_price)
            .ok_or_else(|| format!("invalid tradePrice '{}'", self.trade_price))?;
        let amount = parse_decimal(&self.proceeds)
            .ok_or_else(|| format!("invalid proceeds '{}'", self.proceeds))?;
        let order_id = non_empty(&self.ib_order_id);
        let commission = match order_id.as_deref().and_then(|id| commissions.get(id)) {
            Some(total) => *total,
            None => parse_decimal(&self.ib_commission).unwrap_or_default().abs(),
        };

        Ok(CanonicalTransaction {
            source: SOURCE.to_string(),
            datetime,
            product: self.symbol.trim().to_string(),
            isin: non_empty(&self.isin),
            quantity: quantity.abs(),
            price,
            currency: self.currency.trim().to_string(),
            amount,
            kind,
            subtype,
            side: Some(side),
            order_id,
            commission,
            description: self.text().trim().to_string(),
        })
    }
}

impl CashTransaction {
    fn is_detail(&self) -> bool {
        matches!(self.level_of_detail.trim(), "" | "DETAIL")
    }

    fn to_canonical(&self) -> Result<CanonicalTransaction, String> {
        let datetime = parse_datetime(&self.date_time)
            .ok_or_else(|| format!("invalid dateTime '{}'", self.date_time))?;
        let amount = parse_decimal(&self.amount)
            .ok_or_else(|| format!("invalid amount '{}'", self.amount))?;
        let (kind, subtype, amount) = match self.kind.trim() {
            "Dividends" | "Payment In Lieu Of Dividends" => {
                (TransactionType::Dividend, Subtype::None, amount)
            }
            "Withholding Tax" => (TransactionType::Dividend, Subtype::Tax, -amount.abs()),
            "Deposits/Withdrawals" if amount < Decimal::ZERO => {
                (TransactionType::Cash, Subtype::Withdrawal, amount)
            }
            "Deposits/Withdrawals" => (TransactionType::Cash, Subtype::Deposit, amount),
            "Other Fees" | "Commission Adjustments" => {
                (TransactionType::Fee, Subtype::None, -amount.abs())
            }
            _ => (TransactionType::Unknown, Subtype::None, amount),
        };
        let description = non_empty(&self.description).unwrap_or_else(|| self.kind.clone());

        Ok(CanonicalTransaction {
            source: SOURCE.to_string(),
            datetime,
            product: self.symbol.trim().to_string(),
            isin: non_empty(&self.isin),
            quantity: Decimal::ZERO,
            price: Decimal::ZERO,
            currency: self.currency.trim().to_string(),
            amount,
            kind,
            subtype,
            side: None,
            order_id: None,
            commission: Decimal::ZERO,
            description,
        })
    }
}

pub fn parse(bytes: &[u8]) -> Result<ParsedStatement, FileFormatError> {
    let text = std::str::from_utf8(bytes).map_err(|e| FileFormatError::Markup(e.to_string()))?;
    let response: FlexQueryResponse = quick_xml::de::from_str(text.trim_start_matches('\u{feff}'))?;

    let mut statement = ParsedStatement::default();
    let mut position = 0;
    for flex in response.statements.items {
        let trades = flex.trades.map(|t| t.items).unwrap_or_default();
        let commissions = commissions_by_order(&trades);
        for trade in &trades {
            position += 1;
            match trade.to_canonical(&commissions) {
                Ok(tx) => statement.transactions.push(tx),
                Err(reason) => {
                    let datetime = parse_datetime(&trade.date_time);
                    statement.skip(position, datetime, trade.text(), reason)
                }
            }
        }

        for cash in flex.cash_transactions.map(|c| c.items).unwrap_or_default() {
            position += 1;
            if !cash.is_detail() {
                log::debug!("Ignoring {} summary row '{}'", cash.level_of_detail, cash.description);
                continue;
            }
            match cash.to_canonical() {
                Ok(tx) => statement.transactions.push(tx),
                Err(reason) => {
                    let datetime = parse_datetime(&cash.date_time);
                    statement.skip(position, datetime, &cash.description, reason)
                }
            }
        }
    }
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const STATEMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<FlexQueryResponse queryName="tax" type="AF">
  <FlexStatements count="1">
    <FlexStatement accountId="U1234567" fromDate="20230101" toDate="20231231">
      <Trades>
        <Trade assetCategory="STK" symbol="AAPL" description="APPLE INC" isin="US0378331005" quantity="6" tradePrice="150" proceeds="-900" currency="USD" ibCommission="-0.6" buySell="BUY" putCall="" dateTime="20230115;093000" tradeDate="20230115" ibOrderID="111"/>
        <Trade assetCategory="STK" symbol="AAPL" description="APPLE INC" isin="US0378331005" quantity="4" tradePrice="150" proceeds="-600" currency="USD" ibCommission="-0.4" buySell="BUY" putCall="" dateTime="20230115;093001" tradeDate="20230115" ibOrderID="111"/>
        <Trade assetCategory="OPT" symbol="AAPL  230120P00140000" description="AAPL 20JAN23 140 P" isin="" quantity="-1" tradePrice="2.1" proceeds="210" currency="USD" ibCommission="-1.05" buySell="SELL" putCall="P" dateTime="2023-01-10;15:00:00" tradeDate="20230110" ibOrderID="222"/>
        <Trade assetCategory="CASH" symbol="EUR.USD" description="EUR.USD" quantity="1000" tradePrice="1.08" proceeds="-1080" currency="USD" ibCommission="-2" buySell="BUY" dateTime="20230111;100000" ibOrderID="333"/>
      </Trades>
      <CashTransactions>
        <CashTransaction type="Dividends" description="AAPL(US0378331005) CASH DIVIDEND USD 0.23 PER SHARE" dateTime="20230216" amount="2.3" currency="USD" levelOfDetail="DETAIL" isin="US0378331005" symbol="AAPL"/>
        <CashTransaction type="Withholding Tax" description="AAPL(US0378331005) CASH DIVIDEND - US TAX" dateTime="20230216" amount="-0.35" currency="USD" levelOfDetail="DETAIL" isin="US0378331005" symbol="AAPL"/>
        <CashTransaction type="Dividends" description="summary" dateTime="20230216" amount="2.3" currency="USD" levelOfDetail="SUMMARY"/>
        <CashTransaction type="Deposits/Withdrawals" description="CASH RECEIPTS" dateTime="20230102" amount="5000" currency="EUR" levelOfDetail="DETAIL"/>
        <CashTransaction type="Broker Interest Received" description="EUR CREDIT INT FOR DEC-2022" dateTime="20230105" amount="1.2" currency="EUR"/>
        <CashTransaction type="Other Fees" description="SNAPSHOT MARKET DATA FEE" dateTime="bogus" amount="1" currency="USD"/>
      </CashTransactions>
    </FlexStatement>
  </FlexStatements>
</FlexQueryResponse>"#;

    fn parsed() -> ParsedStatement {
        parse(STATEMENT.as_bytes()).unwrap()
    }

    #[test]
    fn partial_fills_share_commission() {
        let statement = parsed();
        let fills: Vec<_> = statement
            .transactions
            .iter()
            .filter(|t| t.order_id.as_deref() == Some("111"))
            .collect();
        assert_eq!(fills.len(), 2);
        assert!(fills.iter().all(|t| t.commission == dec!(1.0)));
        assert_eq!(fills[0].side, Some(Side::Buy));
        assert_eq!(fills[0].amount, dec!(-900));
        assert_eq!(fills[0].isin.as_deref(), Some("US0378331005"));
    }

    #[test]
    fn option_quantity_is_absolute() {
        let statement = parsed();
        let option = statement
            .transactions
            .iter()
            .find(|t| t.kind == TransactionType::Option)
            .unwrap();
        assert_eq!(option.subtype, Subtype::Put);
        assert_eq!(option.quantity, dec!(1));
        assert_eq!(option.side, Some(Side::Sell));
        assert_eq!(option.isin, None);
        assert_eq!(
            option.datetime,
            NaiveDate::from_ymd_opt(2023, 1, 10).unwrap().and_hms_opt(15, 0, 0).unwrap()
        );
    }

    #[test]
    fn cash_rows_mapped_and_summaries_ignored() {
        let statement = parsed();
        let cash: Vec<_> = statement
            .transactions
            .iter()
            .filter(|t| !t.kind.is_trade())
            .map(|t| (t.kind, t.subtype, t.amount))
            .collect();
        assert_eq!(
            cash,
            vec![
                (TransactionType::Dividend, Subtype::None, dec!(2.3)),
                (TransactionType::Dividend, Subtype::Tax, dec!(-0.35)),
                (TransactionType::Cash, Subtype::Deposit, dec!(5000)),
                (TransactionType::Unknown, Subtype::None, dec!(1.2)),
            ]
        );
    }

    #[test]
    fn unsupported_and_undated_rows_are_skipped() {
        let statement = parsed();
        assert_eq!(statement.skipped.len(), 2);
        assert!(statement.skipped[0].reason.contains("CASH"));
        assert!(statement.skipped[1].reason.contains("dateTime"));
    }

    #[test]
    fn malformed_markup_is_a_format_error() {
        assert!(matches!(
            parse(b"<FlexQueryResponse><FlexStatements>"),
            Err(FileFormatError::Markup(_))
        ));
        assert!(matches!(
            parse(b"<FlexQueryResponse></FlexQueryResponse>"),
            Err(FileFormatError::Markup(_))
        ));
    }

    #[test]
    fn datetime_variants() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap().and_hms_opt(9, 30, 0);
        assert_eq!(parse_datetime("20230115;093000"), expected);
        assert_eq!(parse_datetime("2023-01-15;09:30:00"), expected);
        assert_eq!(parse_datetime("2023-01-15 09:30:00"), expected);
        assert_eq!(
            parse_datetime("20230115"),
            NaiveDate::from_ymd_opt(2023, 1, 15).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_datetime(""), None);
    }
}
