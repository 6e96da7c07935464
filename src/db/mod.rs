// Postgres-backed trade ledger
pub mod postgres;

pub use postgres::PostgresTradeStore;
