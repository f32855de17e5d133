pub mod derived;
pub mod drawdown;
pub mod rollup;

pub use derived::{format_duration, hold_duration, newest_signal, signals_per_hour, time_ago};
pub use drawdown::{drawdown_series, DrawdownPoint};
pub use rollup::{compute_rollup, Rollup};
