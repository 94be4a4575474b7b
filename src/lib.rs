// Sales Bench - Core Library
// Synthetic retail sales, loaded into a row store and a column store,
// queried through one contract so the answers can be compared.

pub mod error;
pub mod export;
pub mod generator;
pub mod model;
pub mod report;
pub mod repository;
pub mod settings;

// Re-export commonly used types
pub use error::{BackendError, Result, SalesError};
pub use generator::{generate_sales, GeneratorConfig};
pub use model::{flatten_sales, Combination, DateWindow, Goods, LineFilter, Sale, SaleLine};
pub use repository::{
    rank_combinations, with_column_repository, with_sql_repository, Backend,
    ColumnEngine, ColumnSalesRepository, SalesRepository, SqlSalesRepository,
    DEFAULT_TOP_COUNT,
};
pub use settings::Settings;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
