// 🎲 Synthetic Sales Generator
//
// Pure function over an injected random source: the same seed always yields
// the same batch.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;

use crate::error::{Result, SalesError};
use crate::model::{require_whole_second, Goods, Sale};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Everything the generator needs apart from randomness.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub total_count: usize,
    pub goods: Vec<Goods>,
    /// Exclusive upper bound on goods per sale: a sale holds at most
    /// `max_goods_len - 1` entries.
    pub max_goods_len: usize,
    pub shops: Vec<String>,
    pub date_start: NaiveDateTime,
    pub date_end: NaiveDateTime,
}

impl GeneratorConfig {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Sale>> {
        generate_sales(
            rng,
            self.total_count,
            &self.goods,
            self.max_goods_len,
            &self.shops,
            self.date_start,
            self.date_end,
        )
    }
}

impl Default for GeneratorConfig {
    /// Catalog, shops and quarter used by the benchmark run.
    fn default() -> Self {
        GeneratorConfig {
            total_count: 100_000,
            goods: default_catalog(),
            max_goods_len: 5,
            shops: ["ATB", "Fora", "Silpo", "Novus", "Polissya"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            date_start: midnight(2022, 9, 17),
            date_end: midnight(2022, 12, 17),
        }
    }
}

fn default_catalog() -> Vec<Goods> {
    [
        ("potatoes", 15),
        ("fillet", 120),
        ("eggs", 60),
        ("milk", 35),
        ("bread", 25),
        ("beer", 35),
        ("tea", 40),
        ("coffee", 120),
        ("butter", 60),
        ("onion", 35),
    ]
    .iter()
    .filter_map(|(name, price)| Goods::new(*name, Decimal::from(*price)).ok())
    .collect()
}

fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

// ============================================================================
// GENERATION
// ============================================================================

/// Generate `total_count` sales with `bill_id` running 1..=total_count.
///
/// Each sale gets a date drawn uniformly in whole seconds from
/// `[date_start, date_end)`, a shop drawn uniformly from `shops`, and
/// `k ~ U[1, max_goods_len)` goods drawn uniformly with replacement.
pub fn generate_sales<R: Rng + ?Sized>(
    rng: &mut R,
    total_count: usize,
    goods: &[Goods],
    max_goods_len: usize,
    shops: &[String],
    date_start: NaiveDateTime,
    date_end: NaiveDateTime,
) -> Result<Vec<Sale>> {
    if total_count < 1 {
        return Err(SalesError::invalid("total_count must be >= 1"));
    }
    if goods.is_empty() {
        return Err(SalesError::invalid("goods catalog must not be empty"));
    }
    if max_goods_len < 2 {
        return Err(SalesError::invalid(format!(
            "max_goods_len must be >= 2, got {}",
            max_goods_len
        )));
    }
    if shops.is_empty() {
        return Err(SalesError::invalid("shop list must not be empty"));
    }
    if date_end <= date_start {
        return Err(SalesError::invalid(format!(
            "date_end {} must be after date_start {}",
            date_end, date_start
        )));
    }

    // Offsets are whole seconds, so the start fixes every sale's sub-second part
    require_whole_second("date_start", date_start)?;

    let seconds_between = (date_end - date_start).num_seconds();
    if seconds_between < 1 {
        return Err(SalesError::invalid(
            "date range must span at least one whole second",
        ));
    }

    let mut sales = Vec::with_capacity(total_count);

    for bill_id in 1..=total_count as u64 {
        let sale_date = date_start + Duration::seconds(rng.gen_range(0..seconds_between));

        // Non-empty checked above
        let shop = shops.choose(rng).cloned().unwrap_or_default();

        let k = rng.gen_range(1..max_goods_len);
        let picked: Vec<Goods> = (0..k)
            .filter_map(|_| goods.choose(rng).cloned())
            .collect();

        sales.push(Sale::new(bill_id, sale_date, shop, picked)?);
    }

    log::debug!(
        "generated {} sales between {} and {}",
        sales.len(),
        date_start,
        date_end
    );

    Ok(sales)
}
