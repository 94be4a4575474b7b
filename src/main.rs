use std::env;
use std::fmt::Debug;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::SeedableRng;

use sales_bench::report::{goods_table, parity, revenue_table, top_table};
use sales_bench::{
    export::export_to_path, with_column_repository, with_sql_repository, DateWindow,
    GeneratorConfig, LineFilter, Sale, SalesError, SalesRepository, Settings, DEFAULT_TOP_COUNT,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let settings = Settings::from_env().context("Failed to read settings")?;

    match args.get(1).map(String::as_str) {
        None | Some("run") => run_benchmark(&settings),
        Some("export") => match args.get(2) {
            Some(path) => run_export(&settings, Path::new(path)),
            None => bail!("usage: sales-bench export <path.csv>"),
        },
        Some(other) => bail!("unknown command '{}' (expected 'run' or 'export')", other),
    }
}

fn generate(settings: &Settings) -> Result<(GeneratorConfig, Vec<Sale>)> {
    let config = GeneratorConfig {
        total_count: settings.total_count,
        ..GeneratorConfig::default()
    };

    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let sales = config.generate(&mut rng).context("Failed to generate sales")?;
    log::info!("Generated {} bills", sales.len());
    Ok((config, sales))
}

fn run_export(settings: &Settings, path: &Path) -> Result<()> {
    let (_, sales) = generate(settings)?;
    export_to_path(&sales, path)
        .with_context(|| format!("Failed to export sale lines to {}", path.display()))?;
    Ok(())
}

fn run_benchmark(settings: &Settings) -> Result<()> {
    let (config, sales) = generate(settings)?;
    log::info!("Goods catalog:\n{}", goods_table(&config.goods));

    with_sql_repository(settings, |row| {
        with_column_repository(|column| {
            for repo in [
                &mut *row as &mut dyn SalesRepository,
                &mut *column as &mut dyn SalesRepository,
            ] {
                log::info!("Loading {} bills into the {} store...", sales.len(), repo.backend());
                let lines = repo.ingest(&sales)?;
                log::info!("Finished loading {} lines into the {} store.", lines, repo.backend());
            }
            run_queries(&*row, &*column)
        })
    })
    .context("Benchmark session failed")?;

    Ok(())
}

/// October 2022, the reporting period used by every windowed query.
fn october() -> sales_bench::Result<DateWindow> {
    let first_of = |month: u32| -> sales_bench::Result<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2022, month, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| SalesError::invalid(format!("no such date: 2022-{:02}-01", month)))
    };
    DateWindow::between(first_of(10)?, first_of(11)?)
}

fn run_queries(row: &dyn SalesRepository, column: &dyn SalesRepository) -> sales_bench::Result<()> {
    let period = october()?;

    compare("1. Goods lines sold", row, column, |r| r.count_lines(&LineFilter::new()))?;

    compare("2. Revenue", row, column, |r| r.total_revenue(&DateWindow::all()))?;

    compare("3. Revenue for 2022-10-01 .. 2022-11-01", row, column, |r| {
        r.total_revenue(&period)
    })?;

    compare(
        "4. 'bread' bought in 'ATB' for 2022-10-01 .. 2022-11-01",
        row,
        column,
        |r| r.count_lines(&LineFilter::new().goods("bread").shop("ATB").window(period)),
    )?;

    compare(
        "5. 'beer' bought in all shops for 2022-10-01 .. 2022-11-01",
        row,
        column,
        |r| r.count_lines(&LineFilter::new().goods("beer").window(period)),
    )?;

    let (r, c) = compare_quiet("6. Revenue by goods", row, column, |r| r.revenue_by_goods())?;
    log::info!("Row store:\n{}", revenue_table("Goods", &r));
    log::info!("Column store:\n{}", revenue_table("Goods", &c));

    let (r, c) = compare_quiet(
        "7. Revenue by shop for 2022-10-01 .. 2022-11-01",
        row,
        column,
        |r| r.revenue_by_shop(&period),
    )?;
    log::info!("Row store:\n{}", revenue_table("Shop", &r));
    log::info!("Column store:\n{}", revenue_table("Shop", &c));

    for (step, items) in [(8, 2), (9, 3), (10, 4)] {
        let label = format!(
            "{}. Top {} purchases of {} goods for 2022-10-01 .. 2022-11-01",
            step, DEFAULT_TOP_COUNT, items
        );
        let (r, c) = compare_quiet(&label, row, column, |r| {
            r.top_combinations(items, DEFAULT_TOP_COUNT, &period)
        })?;
        log::info!("Row store:\n{}", top_table(&r));
        log::info!("Column store:\n{}", top_table(&c));
    }

    Ok(())
}

/// Run one query on both stores and log both answers.
fn compare<T, F>(
    label: &str,
    row: &dyn SalesRepository,
    column: &dyn SalesRepository,
    query: F,
) -> sales_bench::Result<()>
where
    T: PartialEq + Debug,
    F: Fn(&dyn SalesRepository) -> sales_bench::Result<T>,
{
    let (r, c) = compare_quiet(label, row, column, query)?;
    log::info!("  row store:    {:?}", r);
    log::info!("  column store: {:?}", c);
    Ok(())
}

/// Like [`compare`] but leaves rendering of the answers to the caller.
/// The first failing store aborts the run.
fn compare_quiet<T, F>(
    label: &str,
    row: &dyn SalesRepository,
    column: &dyn SalesRepository,
    query: F,
) -> sales_bench::Result<(T, T)>
where
    T: PartialEq + Debug,
    F: Fn(&dyn SalesRepository) -> sales_bench::Result<T>,
{
    log::info!("{}", label);
    let r = query(row)?;
    let c = query(column)?;
    if r == c {
        log::info!("  backends agree");
    } else {
        log::warn!("  backends disagree: {}", parity(&r, &c));
    }
    Ok((r, c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sales_bench::{ColumnEngine, ColumnSalesRepository, Goods, SqlSalesRepository};

    #[test]
    fn test_october_window() {
        let period = october().unwrap();
        assert_eq!(period.start().unwrap().to_string(), "2022-10-01 00:00:00");
        assert_eq!(period.end().unwrap().to_string(), "2022-11-01 00:00:00");
    }

    #[test]
    fn test_query_failure_aborts_the_battery() {
        let gold = Goods::new("gold", Decimal::from(50_000_000_000_000_000i64)).unwrap();
        let date = NaiveDate::from_ymd_opt(2022, 10, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let sales = vec![Sale::new(1, date, "ATB", vec![gold.clone(), gold]).unwrap()];

        let mut row = SqlSalesRepository::open_in_memory().unwrap();
        let mut column = ColumnSalesRepository::open(ColumnEngine::new().unwrap()).unwrap();
        row.ingest(&sales).unwrap();
        column.ingest(&sales).unwrap();

        let err = run_queries(&row, &column).unwrap_err();
        assert!(err.is_backend());
    }
}
