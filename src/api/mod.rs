// Market data: exchange client and the indicator snapshot provider
pub mod binance;
pub mod provider;

pub use binance::BinanceClient;
pub use provider::{
    CandleSnapshotProvider, CandleSource, ReplayCandleSource, SnapshotFetch, SnapshotProvider,
    SnapshotWindow, UnavailableReason,
};
