// 🧾 Domain Model - Goods, Sales and the flattened SaleLine storage unit
//
// Sales are produced by the generator and never mutated afterwards.
// Storage backends only ever see the flattened SaleLine form.

use chrono::{NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SalesError};

/// Prices are money: at most this many fractional digits.
pub const PRICE_SCALE: u32 = 2;

// ============================================================================
// GOODS
// ============================================================================

/// One catalog item. Equality is by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Goods {
    name: String,
    price: Decimal,
}

impl Goods {
    /// Price must be non-negative with at most two fractional digits.
    pub fn new(name: impl Into<String>, price: Decimal) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(SalesError::invalid("goods name must not be empty"));
        }
        price_to_cents(&name, price)?;

        Ok(Goods { name, price })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Decimal {
        self.price
    }
}

// ============================================================================
// SALE
// ============================================================================

/// One receipt. `goods` keeps purchase order and may repeat an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    bill_id: u64,
    sale_date: NaiveDateTime,
    shop: String,
    goods: Vec<Goods>,
}

impl Sale {
    pub fn new(
        bill_id: u64,
        sale_date: NaiveDateTime,
        shop: impl Into<String>,
        goods: Vec<Goods>,
    ) -> Result<Self> {
        if bill_id == 0 {
            return Err(SalesError::invalid("bill_id must be >= 1"));
        }
        if goods.is_empty() {
            return Err(SalesError::invalid(format!(
                "sale {} must contain at least one goods entry",
                bill_id
            )));
        }
        require_whole_second("sale_date", sale_date)?;

        Ok(Sale {
            bill_id,
            sale_date,
            shop: shop.into(),
            goods,
        })
    }

    pub fn bill_id(&self) -> u64 {
        self.bill_id
    }

    pub fn sale_date(&self) -> NaiveDateTime {
        self.sale_date
    }

    pub fn shop(&self) -> &str {
        &self.shop
    }

    pub fn goods(&self) -> &[Goods] {
        &self.goods
    }

    /// Sum of the prices of every goods entry, duplicates included.
    pub fn total(&self) -> Decimal {
        self.goods.iter().map(Goods::price).sum()
    }
}

// ============================================================================
// SALE LINE (storage unit)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub line_id: u64,
    pub goods_name: String,
    pub price: Decimal,
    pub shop: String,
    pub sale_date: NaiveDateTime,
    pub bill_id: u64,
}

impl SaleLine {
    /// Price in minor units, as both stores persist it.
    pub fn price_cents(&self) -> Result<i64> {
        price_to_cents(&self.goods_name, self.price)
    }

    /// Sale timestamp as unix seconds (naive dates are treated as UTC).
    pub fn sale_ts(&self) -> Result<i64> {
        require_whole_second("sale_date", self.sale_date)?;
        Ok(timestamp(self.sale_date))
    }
}

/// One line per (sale, goods) pair. `line_id` runs from 1 across the whole
/// batch and is not reset per sale.
pub fn flatten_sales(sales: &[Sale]) -> Vec<SaleLine> {
    let mut lines = Vec::with_capacity(sales.iter().map(|s| s.goods.len()).sum());
    let mut line_id = 1u64;

    for sale in sales {
        for goods in &sale.goods {
            lines.push(SaleLine {
                line_id,
                goods_name: goods.name.clone(),
                price: goods.price,
                shop: sale.shop.clone(),
                sale_date: sale.sale_date,
                bill_id: sale.bill_id,
            });
            line_id += 1;
        }
    }

    lines
}

// ============================================================================
// QUERY ARGUMENTS
// ============================================================================

/// Optional date bounds: `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

impl DateWindow {
    /// No constraint on sale_date.
    pub fn all() -> Self {
        DateWindow::default()
    }

    /// Bounds must fall on whole seconds, the resolution both stores keep.
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Result<Self> {
        if let Some(s) = start {
            require_whole_second("window start", s)?;
        }
        if let Some(e) = end {
            require_whole_second("window end", e)?;
        }
        if let (Some(s), Some(e)) = (start, end) {
            if e <= s {
                return Err(SalesError::invalid(format!(
                    "inverted date window: start {} is not before end {}",
                    s, e
                )));
            }
        }
        Ok(DateWindow { start, end })
    }

    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        DateWindow::new(Some(start), Some(end))
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    /// Bounds as unix seconds, the unit both stores filter on.
    pub fn bounds_ts(&self) -> (Option<i64>, Option<i64>) {
        (self.start.map(timestamp), self.end.map(timestamp))
    }
}

/// Conjunctive filter for `count_lines`. Omitted fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFilter {
    pub goods_name: Option<String>,
    pub shop: Option<String>,
    pub window: DateWindow,
}

impl LineFilter {
    pub fn new() -> Self {
        LineFilter::default()
    }

    pub fn goods(mut self, name: impl Into<String>) -> Self {
        self.goods_name = Some(name.into());
        self
    }

    pub fn shop(mut self, shop: impl Into<String>) -> Self {
        self.shop = Some(shop.into());
        self
    }

    pub fn window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }
}

/// Canonical multiset of goods bought together in one bill, with how many
/// bills contained exactly it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination {
    pub goods: Vec<String>,
    pub count: u64,
}

impl Combination {
    pub fn new(goods: Vec<String>, count: u64) -> Self {
        Combination { goods, count }
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Non-negative, at most two fractional digits, and fits `i64` cents.
fn price_to_cents(name: &str, price: Decimal) -> Result<i64> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(SalesError::invalid(format!(
            "price of '{}' must not be negative, got {}",
            name, price
        )));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(SalesError::invalid(format!(
            "price of '{}' has sub-cent precision: {}",
            name, price
        )));
    }

    let mut scaled = price;
    scaled.rescale(PRICE_SCALE);
    i64::try_from(scaled.mantissa()).map_err(|_| {
        SalesError::invalid(format!("price of '{}' is out of range: {}", name, price))
    })
}

pub(crate) fn require_whole_second(what: &str, date: NaiveDateTime) -> Result<()> {
    if date.nanosecond() != 0 {
        return Err(SalesError::invalid(format!(
            "{} {} has a fractional second",
            what, date
        )));
    }
    Ok(())
}

pub(crate) fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, PRICE_SCALE)
}

pub(crate) fn timestamp(date: NaiveDateTime) -> i64 {
    date.and_utc().timestamp()
}
