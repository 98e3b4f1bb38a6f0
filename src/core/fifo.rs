//! First-in-first-out lot matching of buys against sells.

use super::country::CountryCode;
use super::transaction::{ProcessedTransaction, Side};
use super::warnings::Warning;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeMap;

/// Remaining quantity of one purchase, valued in the reporting currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct PurchaseLot {
    pub acquired: NaiveDate,
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    #[schemars(with = "f64")]
    pub unit_cost: Decimal,
}

impl PurchaseLot {
    pub fn cost(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

/// Open lots of a single instrument, ordered by ascending acquisition date.
///
/// Lots are owned by the queue for one matching pass; exhausted lots are
/// removed by index.
#[derive(Debug, Clone, Default)]
pub struct LotQueue {
    lots: Vec<PurchaseLot>,
}

/// Portion of a lot consumed by a sale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotMatch {
    pub acquired: NaiveDate,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

impl LotQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a lot after every lot acquired on or before the same date
    pub fn push(&mut self, lot: PurchaseLot) {
        let index = self.lots.partition_point(|l| l.acquired <= lot.acquired);
        self.lots.insert(index, lot);
    }

    /// Consume up to `quantity` oldest-first. Returns the matched portions and
    /// the quantity left unmatched.
    pub fn consume(&mut self, quantity: Decimal) -> (Vec<LotMatch>, Decimal) {
        let mut remaining = quantity;
        let mut matches = Vec::new();
        while remaining > Decimal::ZERO && !self.lots.is_empty() {
            let oldest = &mut self.lots[0];
            let matched = remaining.min(oldest.quantity);
            matches.push(LotMatch {
                acquired: oldest.acquired,
                quantity: matched,
                unit_cost: oldest.unit_cost,
            });
            oldest.quantity -= matched;
            remaining -= matched;
            if oldest.quantity.is_zero() {
                let exhausted = self.lots.remove(0);
                log::debug!("Lot of {} exhausted", exhausted.acquired);
            }
        }
        (matches, remaining)
    }

    pub fn total_quantity(&self) -> Decimal {
        self.lots.iter().map(|l| l.quantity).sum()
    }

    pub fn into_lots(self) -> Vec<PurchaseLot> {
        self.lots
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

/// Result of matching (part of) a sale against one lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct RealizedGainRecord {
    pub instrument: String,
    pub product: String,
    #[schemars(with = "String")]
    pub country: CountryCode,
    pub sale_date: NaiveDate,
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    #[schemars(with = "f64")]
    pub sale_value: Decimal,
    /// Empty for the zero-cost-basis remainder of an oversold position
    pub purchase_date: Option<NaiveDate>,
    #[schemars(with = "f64")]
    pub purchase_value: Decimal,
    #[schemars(with = "f64")]
    pub delta: Decimal,
    pub zero_cost_basis: bool,
}

impl RealizedGainRecord {
    pub fn year(&self) -> i32 {
        self.sale_date.year()
    }
}

/// Lots still open for one instrument after all sales were applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct OpenPosition {
    pub instrument: String,
    pub product: String,
    #[schemars(with = "String")]
    pub country: CountryCode,
    pub lots: Vec<PurchaseLot>,
}

impl OpenPosition {
    pub fn quantity(&self) -> Decimal {
        self.lots.iter().map(|l| l.quantity).sum()
    }

    pub fn cost_basis(&self) -> Decimal {
        self.lots.iter().map(PurchaseLot::cost).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct FifoReport {
    pub records: Vec<RealizedGainRecord>,
    pub open_positions: Vec<OpenPosition>,
    pub warnings: Vec<Warning>,
}

impl FifoReport {
    pub fn total_delta(&self) -> Decimal {
        self.records.iter().map(|r| r.delta).sum()
    }

    /// Keep only the sales, and their warnings, of one calendar year.
    /// Open positions stay as matched over the full history.
    pub fn in_year(mut self, year: i32) -> Self {
        self.records.retain(|r| r.year() == year);
        self.warnings.retain(|w| match w {
            Warning::UnmatchedSale { date, .. } => date.year() == year,
            Warning::MissingRate => true,
        });
        self
    }
}

/// Match every sale against the open lots of its instrument.
///
/// Only trades with a side take part. Within an instrument, transactions are
/// folded in datetime order with buys first at equal datetimes.
pub fn match_lots(transactions: &[ProcessedTransaction]) -> FifoReport {
    let mut by_instrument: BTreeMap<&str, Vec<&ProcessedTransaction>> = BTreeMap::new();
    for tx in transactions
        .iter()
        .filter(|tx| tx.kind().is_trade() && tx.transaction.side.is_some())
    {
        by_instrument.entry(tx.instrument()).or_default().push(tx);
    }

    let mut report = FifoReport::default();
    for (instrument, mut trades) in by_instrument {
        trades.sort_by_key(|tx| (tx.transaction.datetime, tx.transaction.side != Some(Side::Buy)));
        let mut queue = LotQueue::new();
        for tx in &trades {
            match tx.transaction.side {
                Some(Side::Buy) => fold_buy(&mut queue, instrument, tx),
                Some(Side::Sell) => fold_sell(&mut queue, instrument, tx, &mut report),
                None => {}
            }
        }
        if !queue.is_empty() {
            // product and country of the latest trade describe the position
            let last = trades[trades.len() - 1];
            report.open_positions.push(OpenPosition {
                instrument: instrument.to_string(),
                product: last.transaction.product.clone(),
                country: last.country.clone(),
                lots: queue.into_lots(),
            });
        }
    }

    log::info!(
        "Matched {} realized gain records, {} open positions",
        report.records.len(),
        report.open_positions.len()
    );
    report
}

fn fold_buy(queue: &mut LotQueue, instrument: &str, tx: &ProcessedTransaction) {
    let quantity = tx.transaction.quantity.abs();
    if quantity.is_zero() {
        return;
    }
    let lot = PurchaseLot {
        acquired: tx.date(),
        quantity,
        unit_cost: tx.unit_value_reporting(),
    };
    log::debug!(
        "{instrument} BUY {} @ {} on {}",
        lot.quantity,
        lot.unit_cost,
        lot.acquired
    );
    queue.push(lot);
}

fn fold_sell(
    queue: &mut LotQueue,
    instrument: &str,
    tx: &ProcessedTransaction,
    report: &mut FifoReport,
) {
    let requested = tx.transaction.quantity.abs();
    let sale_price = tx.unit_value_reporting();
    let sale_date = tx.date();
    let (matches, unmatched) = queue.consume(requested);
    log::debug!(
        "{instrument} SELL {requested} @ {sale_price} on {sale_date}: {} lots, {} left open",
        matches.len(),
        queue.total_quantity()
    );

    let record = |quantity: Decimal, purchase_date: Option<NaiveDate>, unit_cost: Decimal| {
        let sale_value = quantity * sale_price;
        let purchase_value = quantity * unit_cost;
        RealizedGainRecord {
            instrument: instrument.to_string(),
            product: tx.transaction.product.clone(),
            country: tx.country.clone(),
            sale_date,
            quantity,
            sale_value,
            purchase_date,
            purchase_value,
            delta: sale_value - purchase_value,
            zero_cost_basis: purchase_date.is_none(),
        }
    };

    for m in matches {
        report
            .records
            .push(record(m.quantity, Some(m.acquired), m.unit_cost));
    }

    if unmatched > Decimal::ZERO {
        let warning = Warning::UnmatchedSale {
            instrument: instrument.to_string(),
            date: sale_date,
            unmatched,
            requested,
        };
        log::warn!("{warning}; remainder recorded with zero cost basis");
        report.records.push(record(unmatched, None, Decimal::ZERO));
        report.warnings.push(warning);
    }
}
