//! Transformation module.
//!
//! The request-time pipeline, leaves first:
//! - Filter: selection to row set (union semantics)
//! - Aggregate: sums per (split, date)
//! - Top-N: leading categories plus a `Rest` bucket
//! - Rates: level rates or day-over-day increments
//! - Order: deterministic category ranking
//! - Pipeline: timeline, progression and map views

pub mod aggregate;
pub mod filter;
pub mod order;
pub mod pipeline;
pub mod rates;
pub mod top_n;

pub use aggregate::{aggregate, Grouping};
pub use filter::{resolve, select, RowSet};
pub use order::{order, order_by};
pub use pipeline::*;
pub use rates::Mode;
pub use top_n::{reduce, REST_LABEL};
