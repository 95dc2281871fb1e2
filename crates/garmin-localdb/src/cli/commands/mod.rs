pub mod sync;

pub use sync::{parse_date, parse_metric, reset as sync_reset, run as sync_run, status as sync_status};
