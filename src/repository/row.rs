// Row store: SaleLines in one SQLite table, primary key line_id
//
// Prices are stored in cents so SUM stays exact. Dates are unix seconds.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use rust_decimal::Decimal;

use super::{Backend, SalesRepository};
use crate::error::{Result, SalesError};
use crate::model::{flatten_sales, from_cents, Combination, DateWindow, LineFilter, Sale};

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

pub struct SqlSalesRepository {
    conn: Connection,
}

impl SqlSalesRepository {
    /// Open (or create) the database at `path` and start from an empty table.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(Path::new(path))?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn
        };
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_schema(&conn)?;
        log::debug!("row store ready");
        Ok(SqlSalesRepository { conn })
    }

    /// Drop the table and close the connection.
    pub fn close(self) -> Result<()> {
        self.conn.execute("DROP TABLE IF EXISTS sales", [])?;
        self.conn.close().map_err(|(_, e)| SalesError::from(e))
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn setup_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS sales;
         CREATE TABLE sales (
            line_id INTEGER PRIMARY KEY,
            goods_name TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            shop TEXT NOT NULL,
            sale_date INTEGER NOT NULL,
            bill_id INTEGER NOT NULL
         );
         CREATE INDEX idx_sales_date ON sales(sale_date);
         CREATE INDEX idx_sales_bill ON sales(bill_id);",
    )?;
    Ok(())
}

// ============================================================================
// WHERE CLAUSE BUILDER
// ============================================================================

/// Conjunctive WHERE clause with positional parameters.
#[derive(Default)]
struct Conditions {
    clauses: Vec<&'static str>,
    values: Vec<Value>,
}

impl Conditions {
    fn for_window(window: &DateWindow) -> Self {
        let mut cond = Conditions::default();
        let (start, end) = window.bounds_ts();
        if let Some(start) = start {
            cond.push("sale_date >= ?", Value::Integer(start));
        }
        if let Some(end) = end {
            cond.push("sale_date < ?", Value::Integer(end));
        }
        cond
    }

    fn for_filter(filter: &LineFilter) -> Self {
        let mut cond = Conditions::default();
        if let Some(name) = &filter.goods_name {
            cond.push("goods_name = ?", Value::Text(name.clone()));
        }
        if let Some(shop) = &filter.shop {
            cond.push("shop = ?", Value::Text(shop.clone()));
        }
        let window = Conditions::for_window(&filter.window);
        cond.clauses.extend(window.clauses);
        cond.values.extend(window.values);
        cond
    }

    fn push(&mut self, clause: &'static str, value: Value) {
        self.clauses.push(clause);
        self.values.push(value);
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn revenue_map(
    conn: &Connection,
    column: &str,
    cond: &Conditions,
) -> Result<BTreeMap<String, Decimal>> {
    let sql = format!(
        "SELECT {col}, SUM(price_cents) FROM sales {filter} GROUP BY {col}",
        col = column,
        filter = cond.sql()
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(params_from_iter(cond.values.iter()), |row| {
            let key: String = row.get(0)?;
            let cents: i64 = row.get(1)?;
            Ok((key, from_cents(cents)))
        })?
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

    Ok(rows)
}

// ============================================================================
// QUERY CONTRACT
// ============================================================================

impl SalesRepository for SqlSalesRepository {
    fn backend(&self) -> Backend {
        Backend::Row
    }

    fn ingest(&mut self, sales: &[Sale]) -> Result<usize> {
        let lines = flatten_sales(sales);

        // Dropping the transaction without commit rolls everything back.
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sales", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sales (line_id, goods_name, price_cents, shop, sale_date, bill_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for line in &lines {
                let price_cents = line.price_cents()?;
                let sale_ts = line.sale_ts()?;
                stmt.execute(params![
                    line.line_id as i64,
                    line.goods_name,
                    price_cents,
                    line.shop,
                    sale_ts,
                    line.bill_id as i64,
                ])?;
            }
        }
        tx.commit()?;

        log::info!("row store: loaded {} lines from {} sales", lines.len(), sales.len());
        Ok(lines.len())
    }

    fn count_lines(&self, filter: &LineFilter) -> Result<u64> {
        let cond = Conditions::for_filter(filter);
        let sql = format!("SELECT COUNT(*) FROM sales {}", cond.sql());
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(cond.values.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn total_revenue(&self, window: &DateWindow) -> Result<Decimal> {
        let cond = Conditions::for_window(window);
        let sql = format!("SELECT COALESCE(SUM(price_cents), 0) FROM sales {}", cond.sql());
        let cents: i64 = self
            .conn
            .query_row(&sql, params_from_iter(cond.values.iter()), |row| row.get(0))?;
        Ok(from_cents(cents))
    }

    fn revenue_by_goods(&self) -> Result<BTreeMap<String, Decimal>> {
        revenue_map(&self.conn, "goods_name", &Conditions::default())
    }

    fn revenue_by_shop(&self, window: &DateWindow) -> Result<BTreeMap<String, Decimal>> {
        revenue_map(&self.conn, "shop", &Conditions::for_window(window))
    }

    /// Ordered aggregate: `json_group_array(goods_name ORDER BY goods_name)`
    /// builds the sorted array per bill, then identical arrays are counted.
    fn bill_combinations(
        &self,
        items_in_bill: usize,
        window: &DateWindow,
    ) -> Result<Vec<Combination>> {
        let mut cond = Conditions::for_window(window);
        let sql = format!(
            "SELECT combo, COUNT(*) FROM (
                SELECT json_group_array(goods_name ORDER BY goods_name) AS combo
                FROM sales {}
                GROUP BY bill_id
                HAVING COUNT(*) = ?
             )
             GROUP BY combo",
            cond.sql()
        );
        cond.values.push(Value::Integer(items_in_bill as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(cond.values.iter()), |row| {
                let combo: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((combo, count))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(combo, count)| {
                let goods: Vec<String> = serde_json::from_str(&combo)
                    .map_err(|e| SalesError::backend(Backend::Row, e))?;
                Ok(Combination::new(goods, count as u64))
            })
            .collect()
    }
}
