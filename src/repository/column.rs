// 📊 Column store: Arrow record batch served through a DataFusion context
//
// The `sales` table is one RecordBatch in a MemTable. String columns are
// dictionary encoded, prices are Decimal128 cents, dates are second-resolution
// timestamps. An ingest builds the full batch first and only then swaps the
// table, so readers never observe a half-written store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use datafusion::arrow::array::{
    Array, ArrayRef, Decimal128Array, DictionaryArray, TimestampSecondArray, UInt64Array,
};
use datafusion::arrow::datatypes::{DataType, Field, Int32Type, Schema, SchemaRef, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::common::cast::{
    as_decimal128_array, as_int64_array, as_list_array, as_string_array,
};
use datafusion::datasource::MemTable;
use datafusion::prelude::SessionContext;
use datafusion::scalar::ScalarValue;
use rust_decimal::Decimal;
use tokio::runtime::{Builder, Runtime};

use super::{Backend, SalesRepository};
use crate::error::{BackendError, Result, SalesError};
use crate::model::{
    flatten_sales, from_cents, Combination, DateWindow, LineFilter, Sale, SaleLine, PRICE_SCALE,
};

const TABLE: &str = "sales";

/// Widest Decimal128; sums stay exact long past the i64 cents range.
const PRICE_PRECISION: u8 = 38;

fn column_error(err: impl Into<BackendError>) -> SalesError {
    SalesError::backend(Backend::Column, err)
}

fn dictionary_type() -> DataType {
    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
}

pub fn sales_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("line_id", DataType::UInt64, false),
        Field::new("goods_name", dictionary_type(), false),
        Field::new(
            "price",
            DataType::Decimal128(PRICE_PRECISION, PRICE_SCALE as i8),
            false,
        ),
        Field::new("shop", dictionary_type(), false),
        Field::new("sale_date", DataType::Timestamp(TimeUnit::Second, None), false),
        Field::new("bill_id", DataType::UInt64, false),
    ]))
}

// ============================================================================
// RECORD BATCH
// ============================================================================

/// Columnar image of `lines`, rows in primary key order.
fn build_batch(lines: &[SaleLine]) -> Result<RecordBatch> {
    for pair in lines.windows(2) {
        if pair[1].line_id <= pair[0].line_id {
            return Err(column_error(BackendError::CorruptPart(format!(
                "primary key out of order: {} after {}",
                pair[1].line_id, pair[0].line_id
            ))));
        }
    }

    let prices = lines
        .iter()
        .map(|l| l.price_cents().map(i128::from))
        .collect::<Result<Vec<_>>>()?;
    let dates = lines
        .iter()
        .map(SaleLine::sale_ts)
        .collect::<Result<Vec<_>>>()?;

    let line_id = UInt64Array::from_iter_values(lines.iter().map(|l| l.line_id));
    let goods_name: DictionaryArray<Int32Type> =
        lines.iter().map(|l| l.goods_name.as_str()).collect();
    let price = Decimal128Array::from(prices)
        .with_precision_and_scale(PRICE_PRECISION, PRICE_SCALE as i8)
        .map_err(column_error)?;
    let shop: DictionaryArray<Int32Type> = lines.iter().map(|l| l.shop.as_str()).collect();
    let sale_date = TimestampSecondArray::from(dates);
    let bill_id = UInt64Array::from_iter_values(lines.iter().map(|l| l.bill_id));

    RecordBatch::try_new(
        sales_schema(),
        vec![
            Arc::new(line_id) as ArrayRef,
            Arc::new(goods_name),
            Arc::new(price),
            Arc::new(shop),
            Arc::new(sale_date),
            Arc::new(bill_id),
        ],
    )
    .map_err(column_error)
}

/// Decimal128 cents from an aggregate, held to the i64 range both stores share.
fn cents_to_decimal(cents: i128) -> Result<Decimal> {
    i64::try_from(cents).map(from_cents).map_err(|_| {
        column_error(BackendError::Overflow(format!(
            "revenue of {} cents exceeds the 64-bit range",
            cents
        )))
    })
}

// ============================================================================
// WHERE CLAUSE BUILDER
// ============================================================================

/// Conjunctive WHERE clause with `$n` placeholders.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    values: Vec<ScalarValue>,
}

impl Conditions {
    fn for_window(window: &DateWindow) -> Self {
        let mut cond = Conditions::default();
        cond.add_window(window);
        cond
    }

    fn for_filter(filter: &LineFilter) -> Self {
        let mut cond = Conditions::default();
        if let Some(name) = &filter.goods_name {
            cond.push("CAST(goods_name AS VARCHAR) =", ScalarValue::from(name.as_str()));
        }
        if let Some(shop) = &filter.shop {
            cond.push("CAST(shop AS VARCHAR) =", ScalarValue::from(shop.as_str()));
        }
        cond.add_window(&filter.window);
        cond
    }

    fn add_window(&mut self, window: &DateWindow) {
        let (start, end) = window.bounds_ts();
        if let Some(start) = start {
            self.push("sale_date >=", ScalarValue::TimestampSecond(Some(start), None));
        }
        if let Some(end) = end {
            self.push("sale_date <", ScalarValue::TimestampSecond(Some(end), None));
        }
    }

    fn push(&mut self, lhs: &str, value: ScalarValue) {
        self.values.push(value);
        self.clauses.push(format!("{} ${}", lhs, self.values.len()));
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Analytical engine client: a DataFusion session driven by a private
/// current-thread runtime so callers stay synchronous.
pub struct ColumnEngine {
    ctx: SessionContext,
    runtime: Runtime,
}

impl ColumnEngine {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().build().map_err(column_error)?;
        Ok(ColumnEngine {
            ctx: SessionContext::new(),
            runtime,
        })
    }

    fn has_table(&self) -> Result<bool> {
        self.ctx.table_exist(TABLE).map_err(column_error)
    }

    fn require_table(&self) -> Result<()> {
        if self.has_table()? {
            Ok(())
        } else {
            Err(column_error(BackendError::SessionClosed))
        }
    }

    /// Replace the registered table with one holding exactly `batch`.
    fn swap_table(&self, batch: RecordBatch) -> Result<()> {
        let table = MemTable::try_new(batch.schema(), vec![vec![batch]]).map_err(column_error)?;
        self.ctx.deregister_table(TABLE).map_err(column_error)?;
        self.ctx
            .register_table(TABLE, Arc::new(table))
            .map_err(column_error)?;
        Ok(())
    }

    fn create_table(&self) -> Result<()> {
        self.swap_table(RecordBatch::new_empty(sales_schema()))
    }

    fn drop_table(&self) -> Result<()> {
        self.ctx.deregister_table(TABLE).map_err(column_error)?;
        Ok(())
    }

    fn query(&self, sql: &str, params: Vec<ScalarValue>) -> Result<Vec<RecordBatch>> {
        self.require_table()?;
        log::debug!("column store: {}", sql);

        self.runtime
            .block_on(async {
                let df = self.ctx.sql(sql).await?;
                let df = if params.is_empty() {
                    df
                } else {
                    df.with_param_values(params)?
                };
                df.collect().await
            })
            .map_err(column_error)
    }
}

// ============================================================================
// REPOSITORY
// ============================================================================

pub struct ColumnSalesRepository {
    engine: ColumnEngine,
}

impl ColumnSalesRepository {
    /// Register an empty `sales` table on `engine`.
    pub fn open(engine: ColumnEngine) -> Result<Self> {
        engine.create_table()?;
        log::debug!("column store ready");
        Ok(ColumnSalesRepository { engine })
    }

    /// Drop the table and release the engine.
    pub fn close(self) -> Result<()> {
        self.engine.drop_table()
    }

    /// SUM(price) GROUP BY a dictionary column, keyed by its string value.
    fn revenue_map(&self, column: &str, cond: Conditions) -> Result<BTreeMap<String, Decimal>> {
        let sql = format!(
            "SELECT CAST({col} AS VARCHAR) AS key, SUM(price) AS revenue
             FROM {table} {filter}
             GROUP BY CAST({col} AS VARCHAR)",
            col = column,
            table = TABLE,
            filter = cond.sql()
        );

        let mut revenue = BTreeMap::new();
        for batch in self.engine.query(&sql, cond.values)? {
            let keys = as_string_array(batch.column(0)).map_err(column_error)?;
            let sums = as_decimal128_array(batch.column(1)).map_err(column_error)?;
            for i in 0..batch.num_rows() {
                revenue.insert(keys.value(i).to_string(), cents_to_decimal(sums.value(i))?);
            }
        }
        Ok(revenue)
    }
}

impl SalesRepository for ColumnSalesRepository {
    fn backend(&self) -> Backend {
        Backend::Column
    }

    fn ingest(&mut self, sales: &[Sale]) -> Result<usize> {
        self.engine.require_table()?;

        let lines = flatten_sales(sales);
        let batch = build_batch(&lines)?;
        self.engine.swap_table(batch)?;

        log::info!(
            "column store: loaded {} lines from {} sales",
            lines.len(),
            sales.len()
        );
        Ok(lines.len())
    }

    fn count_lines(&self, filter: &LineFilter) -> Result<u64> {
        let cond = Conditions::for_filter(filter);
        let sql = format!("SELECT COUNT(*) AS lines FROM {} {}", TABLE, cond.sql());

        let mut total = 0u64;
        for batch in self.engine.query(&sql, cond.values)? {
            let counts = as_int64_array(batch.column(0)).map_err(column_error)?;
            total += counts.iter().flatten().map(|c| c as u64).sum::<u64>();
        }
        Ok(total)
    }

    fn total_revenue(&self, window: &DateWindow) -> Result<Decimal> {
        let cond = Conditions::for_window(window);
        let sql = format!("SELECT SUM(price) AS revenue FROM {} {}", TABLE, cond.sql());

        let mut total = Decimal::ZERO;
        for batch in self.engine.query(&sql, cond.values)? {
            let sums = as_decimal128_array(batch.column(0)).map_err(column_error)?;
            // SUM over no rows is NULL
            for cents in sums.iter().flatten() {
                total += cents_to_decimal(cents)?;
            }
        }
        Ok(total)
    }

    fn revenue_by_goods(&self) -> Result<BTreeMap<String, Decimal>> {
        self.revenue_map("goods_name", Conditions::default())
    }

    fn revenue_by_shop(&self, window: &DateWindow) -> Result<BTreeMap<String, Decimal>> {
        self.revenue_map("shop", Conditions::for_window(window))
    }

    /// Collect-then-sort: `array_sort(array_agg(goods_name))` per bill,
    /// keeping bills with exactly `items_in_bill` lines in the window.
    fn bill_combinations(
        &self,
        items_in_bill: usize,
        window: &DateWindow,
    ) -> Result<Vec<Combination>> {
        let cond = Conditions::for_window(window);
        let sql = format!(
            "SELECT array_sort(array_agg(CAST(goods_name AS VARCHAR))) AS combo
             FROM {} {}
             GROUP BY bill_id
             HAVING COUNT(*) = {}",
            TABLE,
            cond.sql(),
            items_in_bill
        );

        let mut counts: HashMap<Vec<String>, u64> = HashMap::new();
        for batch in self.engine.query(&sql, cond.values)? {
            let combos = as_list_array(batch.column(0)).map_err(column_error)?;
            for i in 0..combos.len() {
                let values = combos.value(i);
                let names = as_string_array(&values).map_err(column_error)?;
                let combo: Vec<String> = names.iter().flatten().map(str::to_string).collect();
                *counts.entry(combo).or_insert(0) += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(goods, count)| Combination::new(goods, count))
            .collect())
    }
}
