//! Imputation module for handling missing values.
//!
//! Null filling is driven by [`FillOperation`](crate::config::FillOperation)
//! records: mode, median, mean or a custom literal per set of columns.

mod statistical;

pub use statistical::NullImputer;
