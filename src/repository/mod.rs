// 🗄️ Sales Repositories - one query contract, two storage engines
//
// Both backends answer the same logical queries. The only backend-specific
// aggregation is `bill_combinations`: how each engine builds the sorted goods
// array per bill. Ranking, validation and session scoping live here.

pub mod column;
pub mod row;

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::error::{Result, SalesError};
use crate::model::{Combination, DateWindow, LineFilter, Sale};
use crate::settings::Settings;

pub use column::{ColumnEngine, ColumnSalesRepository};
pub use row::SqlSalesRepository;

/// Default number of combinations returned by `top_combinations`.
pub const DEFAULT_TOP_COUNT: usize = 10;

// ============================================================================
// BACKEND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Row-oriented relational store (SQLite)
    Row,

    /// Column-oriented analytical store
    Column,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Row => "row",
            Backend::Column => "column",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// QUERY CONTRACT
// ============================================================================

pub trait SalesRepository {
    fn backend(&self) -> Backend;

    /// Replace the store's contents with the flattened lines of `sales`.
    /// All lines become visible or none do. Returns the number of lines.
    fn ingest(&mut self, sales: &[Sale]) -> Result<usize>;

    fn count_lines(&self, filter: &LineFilter) -> Result<u64>;

    /// Zero when nothing matches.
    fn total_revenue(&self, window: &DateWindow) -> Result<Decimal>;

    fn revenue_by_goods(&self) -> Result<BTreeMap<String, Decimal>>;

    fn revenue_by_shop(&self, window: &DateWindow) -> Result<BTreeMap<String, Decimal>>;

    /// One entry per distinct sorted goods array among bills that have
    /// exactly `items_in_bill` lines inside `window`. Order is unspecified.
    fn bill_combinations(
        &self,
        items_in_bill: usize,
        window: &DateWindow,
    ) -> Result<Vec<Combination>>;

    /// Most frequent combinations of `items_in_bill` goods, count
    /// descending, ties broken by ascending combination.
    fn top_combinations(
        &self,
        items_in_bill: usize,
        top_count: usize,
        window: &DateWindow,
    ) -> Result<Vec<Combination>> {
        if items_in_bill < 1 {
            return Err(SalesError::invalid("items_in_bill must be >= 1"));
        }
        if top_count < 1 {
            return Err(SalesError::invalid("top_count must be >= 1"));
        }

        log::debug!(
            "{}: top {} combinations of {} items in {:?}",
            self.backend(),
            top_count,
            items_in_bill,
            window
        );

        let combinations = self.bill_combinations(items_in_bill, window)?;
        Ok(rank_combinations(combinations, top_count))
    }
}

/// Sort by count descending then combination ascending, keep `top_count`.
pub fn rank_combinations(mut combinations: Vec<Combination>, top_count: usize) -> Vec<Combination> {
    combinations.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.goods.cmp(&b.goods)));
    combinations.truncate(top_count);
    combinations
}

// ============================================================================
// SCOPED SESSIONS
// ============================================================================

/// Open the row store, hand it to `body`, then drop the schema and close
/// the connection whether or not `body` succeeded.
pub fn with_sql_repository<T, F>(settings: &Settings, body: F) -> Result<T>
where
    F: FnOnce(&mut SqlSalesRepository) -> Result<T>,
{
    let mut repo = SqlSalesRepository::open(&settings.sqlite_path)?;
    let outcome = body(&mut repo);
    finish_session(Backend::Row, outcome, repo.close())
}

/// Column-store counterpart of [`with_sql_repository`].
pub fn with_column_repository<T, F>(body: F) -> Result<T>
where
    F: FnOnce(&mut ColumnSalesRepository) -> Result<T>,
{
    let mut repo = ColumnSalesRepository::open(ColumnEngine::new()?)?;
    let outcome = body(&mut repo);
    finish_session(Backend::Column, outcome, repo.close())
}

fn finish_session<T>(backend: Backend, outcome: Result<T>, closed: Result<()>) -> Result<T> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => {
            log::error!("{} session failed to close: {}", backend, e);
            Err(e)
        }
        (Err(e), closed) => {
            log::error!("{} session aborted: {}", backend, e);
            if let Err(close_err) = closed {
                log::error!("{} session failed to close: {}", backend, close_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorConfig;
    use crate::model::Goods;
    use chrono::{NaiveDate, NaiveDateTime};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn goods(name: &str, price: i64) -> Goods {
        Goods::new(name, Decimal::from(price)).unwrap()
    }

    fn scenario_sales() -> Vec<Sale> {
        vec![
            Sale::new(1, at(10, 1), "A", vec![goods("bread", 10), goods("milk", 20)]).unwrap(),
            Sale::new(2, at(10, 2), "A", vec![goods("milk", 20), goods("bread", 10)]).unwrap(),
            Sale::new(3, at(10, 3), "B", vec![goods("bread", 10)]).unwrap(),
        ]
    }

    fn both_backends() -> Vec<Box<dyn SalesRepository>> {
        vec![
            Box::new(SqlSalesRepository::open_in_memory().unwrap()),
            Box::new(ColumnSalesRepository::open(ColumnEngine::new().unwrap()).unwrap()),
        ]
    }

    fn random_batch(seed: u64, total: usize) -> Vec<Sale> {
        let mut config = GeneratorConfig::default();
        config.total_count = total;
        config.max_goods_len = 4;
        config.goods.truncate(4);
        config.generate(&mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_scenario_on_both_backends() {
        for mut repo in both_backends() {
            let backend = repo.backend();
            assert_eq!(repo.ingest(&scenario_sales()).unwrap(), 5);

            let all = DateWindow::all();
            assert_eq!(repo.total_revenue(&all).unwrap(), Decimal::from(70), "{}", backend);
            assert_eq!(
                repo.count_lines(&LineFilter::new().goods("bread")).unwrap(),
                3,
                "{}",
                backend
            );

            let by_shop = repo.revenue_by_shop(&all).unwrap();
            let expected: BTreeMap<String, Decimal> = [
                ("A".to_string(), Decimal::from(60)),
                ("B".to_string(), Decimal::from(10)),
            ]
            .into_iter()
            .collect();
            assert_eq!(by_shop, expected, "{}", backend);

            let top = repo.top_combinations(2, DEFAULT_TOP_COUNT, &all).unwrap();
            assert_eq!(
                top,
                vec![Combination::new(vec!["bread".into(), "milk".into()], 2)],
                "{}",
                backend
            );
        }
    }

    #[test]
    fn test_empty_store_returns_zero_values() {
        for repo in both_backends() {
            let all = DateWindow::all();
            assert_eq!(repo.total_revenue(&all).unwrap(), Decimal::ZERO);
            assert_eq!(repo.count_lines(&LineFilter::new()).unwrap(), 0);
            assert!(repo.revenue_by_goods().unwrap().is_empty());
            assert!(repo.revenue_by_shop(&all).unwrap().is_empty());
            assert!(repo.top_combinations(2, 10, &all).unwrap().is_empty());
        }
    }

    #[test]
    fn test_unmatched_items_in_bill_is_empty_not_error() {
        for mut repo in both_backends() {
            repo.ingest(&scenario_sales()).unwrap();
            let top = repo.top_combinations(7, 10, &DateWindow::all()).unwrap();
            assert!(top.is_empty());
        }
    }

    #[test]
    fn test_top_combinations_rejects_zero_arguments() {
        for repo in both_backends() {
            let all = DateWindow::all();
            assert!(repo.top_combinations(0, 10, &all).unwrap_err().is_invalid_argument());
            assert!(repo.top_combinations(2, 0, &all).unwrap_err().is_invalid_argument());
        }
    }

    #[test]
    fn test_window_filters_lines_before_grouping_bills() {
        // Bill 3 falls outside the window and must not count as a pair.
        let sales = vec![
            Sale::new(1, at(10, 5), "A", vec![goods("bread", 10)]).unwrap(),
            Sale::new(2, at(10, 6), "A", vec![goods("milk", 20), goods("tea", 40)]).unwrap(),
            Sale::new(3, at(11, 6), "A", vec![goods("milk", 20), goods("tea", 40)]).unwrap(),
        ];
        let window = DateWindow::between(at(10, 1), at(11, 1)).unwrap();

        for mut repo in both_backends() {
            repo.ingest(&sales).unwrap();
            let singles = repo.top_combinations(1, 10, &window).unwrap();
            assert_eq!(singles, vec![Combination::new(vec!["bread".into()], 1)]);

            let pairs = repo.top_combinations(2, 10, &window).unwrap();
            assert_eq!(pairs, vec![Combination::new(vec!["milk".into(), "tea".into()], 1)]);
        }
    }

    #[test]
    fn test_duplicates_inside_a_bill_count() {
        let sales = vec![
            Sale::new(1, at(10, 1), "A", vec![goods("bread", 10), goods("bread", 10)]).unwrap(),
            Sale::new(2, at(10, 2), "A", vec![goods("bread", 10), goods("milk", 20)]).unwrap(),
            Sale::new(3, at(10, 3), "A", vec![goods("bread", 10), goods("bread", 10)]).unwrap(),
        ];

        for mut repo in both_backends() {
            repo.ingest(&sales).unwrap();
            let top = repo.top_combinations(2, 10, &DateWindow::all()).unwrap();
            assert_eq!(
                top,
                vec![
                    Combination::new(vec!["bread".into(), "bread".into()], 2),
                    Combination::new(vec!["bread".into(), "milk".into()], 1),
                ]
            );
            assert_eq!(repo.total_revenue(&DateWindow::all()).unwrap(), Decimal::from(70));
        }
    }

    #[test]
    fn test_count_lines_filters_are_conjunctive() {
        let sales = vec![
            Sale::new(1, at(9, 20), "A", vec![goods("bread", 10), goods("milk", 20)]).unwrap(),
            Sale::new(2, at(10, 2), "A", vec![goods("bread", 10)]).unwrap(),
            Sale::new(3, at(10, 3), "B", vec![goods("bread", 10)]).unwrap(),
        ];
        let october = DateWindow::between(at(10, 1), at(11, 1)).unwrap();

        for mut repo in both_backends() {
            repo.ingest(&sales).unwrap();
            assert_eq!(repo.count_lines(&LineFilter::new()).unwrap(), 4);
            assert_eq!(repo.count_lines(&LineFilter::new().shop("A")).unwrap(), 3);
            assert_eq!(
                repo.count_lines(&LineFilter::new().goods("bread").shop("A").window(october))
                    .unwrap(),
                1
            );
            assert_eq!(
                repo.count_lines(&LineFilter::new().goods("bread").window(october)).unwrap(),
                2
            );
            assert_eq!(repo.count_lines(&LineFilter::new().goods("caviar")).unwrap(), 0);
            assert_eq!(repo.total_revenue(&october).unwrap(), Decimal::from(20));
        }
    }

    #[test]
    fn test_ingest_replaces_previous_contents() {
        for mut repo in both_backends() {
            repo.ingest(&scenario_sales()).unwrap();
            repo.ingest(&scenario_sales()[2..]).unwrap();

            assert_eq!(repo.count_lines(&LineFilter::new()).unwrap(), 1);
            assert_eq!(repo.total_revenue(&DateWindow::all()).unwrap(), Decimal::from(10));
        }
    }

    #[test]
    fn test_round_trip_revenue_and_count() {
        let sales = random_batch(5, 300);
        let expected_total: Decimal = sales.iter().map(Sale::total).sum();
        let expected_lines: usize = sales.iter().map(|s| s.goods().len()).sum();

        for mut repo in both_backends() {
            assert_eq!(repo.ingest(&sales).unwrap(), expected_lines);
            assert_eq!(repo.total_revenue(&DateWindow::all()).unwrap(), expected_total);
            assert_eq!(
                repo.count_lines(&LineFilter::new()).unwrap(),
                expected_lines as u64
            );

            let first = repo.revenue_by_shop(&DateWindow::all()).unwrap();
            let second = repo.revenue_by_shop(&DateWindow::all()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_cross_backend_parity() {
        let sales = random_batch(2022, 2_000);
        let october = DateWindow::between(at(10, 1), at(11, 1)).unwrap();

        let mut row = SqlSalesRepository::open_in_memory().unwrap();
        let mut column = ColumnSalesRepository::open(ColumnEngine::new().unwrap()).unwrap();
        row.ingest(&sales).unwrap();
        column.ingest(&sales).unwrap();

        for window in [DateWindow::all(), october] {
            assert_eq!(row.total_revenue(&window).unwrap(), column.total_revenue(&window).unwrap());
            assert_eq!(
                row.revenue_by_shop(&window).unwrap(),
                column.revenue_by_shop(&window).unwrap()
            );
            for filter in [
                LineFilter::new().window(window),
                LineFilter::new().goods("milk").window(window),
                LineFilter::new().goods("milk").shop("ATB").window(window),
            ] {
                assert_eq!(row.count_lines(&filter).unwrap(), column.count_lines(&filter).unwrap());
            }
            for items in 1..=4 {
                assert_eq!(
                    row.top_combinations(items, DEFAULT_TOP_COUNT, &window).unwrap(),
                    column.top_combinations(items, DEFAULT_TOP_COUNT, &window).unwrap(),
                    "items_in_bill = {}",
                    items
                );
            }
        }
        assert_eq!(row.revenue_by_goods().unwrap(), column.revenue_by_goods().unwrap());
    }

    #[test]
    fn test_rank_breaks_ties_by_combination() {
        let ranked = rank_combinations(
            vec![
                Combination::new(vec!["milk".into(), "tea".into()], 3),
                Combination::new(vec!["bread".into(), "tea".into()], 3),
                Combination::new(vec!["bread".into(), "milk".into()], 5),
                Combination::new(vec!["beer".into(), "tea".into()], 1),
            ],
            3,
        );

        let order: Vec<Vec<String>> = ranked.into_iter().map(|c| c.goods).collect();
        assert_eq!(
            order,
            vec![
                vec!["bread".to_string(), "milk".to_string()],
                vec!["bread".to_string(), "tea".to_string()],
                vec!["milk".to_string(), "tea".to_string()],
            ]
        );
    }

    #[test]
    fn test_revenue_overflow_is_a_backend_error() {
        // Each price fits in i64 cents, their sum does not
        let gold = Goods::new("gold", Decimal::from(50_000_000_000_000_000i64)).unwrap();
        let sales = vec![Sale::new(1, at(10, 1), "A", vec![gold.clone(), gold]).unwrap()];

        for mut repo in both_backends() {
            let backend = repo.backend();
            repo.ingest(&sales).unwrap();

            let err = repo.total_revenue(&DateWindow::all()).unwrap_err();
            assert!(err.is_backend(), "{}: {}", backend, err);
            assert!(err.to_string().starts_with(backend.as_str()), "{}", err);

            assert!(repo.revenue_by_goods().unwrap_err().is_backend(), "{}", backend);
            assert_eq!(repo.count_lines(&LineFilter::new()).unwrap(), 2);
        }
    }

    #[test]
    fn test_scoped_sessions_release_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.db");
        let settings = Settings {
            sqlite_path: path.to_str().unwrap().to_string(),
            ..Settings::default()
        };

        let result: Result<()> = with_sql_repository(&settings, |repo| {
            repo.ingest(&scenario_sales())?;
            Err(SalesError::invalid("boom"))
        });
        assert!(result.unwrap_err().is_invalid_argument());

        let conn = rusqlite::Connection::open(&path).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sales'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);

        let result: Result<()> = with_column_repository(|repo| {
            repo.ingest(&scenario_sales())?;
            Err(SalesError::invalid("boom"))
        });
        assert!(result.unwrap_err().is_invalid_argument());

        let total = with_column_repository(|repo| {
            repo.ingest(&scenario_sales())?;
            repo.total_revenue(&DateWindow::all())
        })
        .unwrap();
        assert_eq!(total, Decimal::from(70));
    }
}
