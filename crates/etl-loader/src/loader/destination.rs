//! The storage collaborator seen by the loader.

use thiserror::Error;

/// Errors raised by a destination.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// The destination refused the request without a driver error.
    #[error("{0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A relational store that accepts DDL and bulk CSV copies inside explicit
/// transactions.
///
/// Calls are blocking. The loader always brackets a `copy_rows` with
/// `begin` and then either `commit` or `rollback`.
pub trait BulkDestination {
    /// Run a DDL statement outside of any batch transaction.
    fn execute_ddl(&mut self, statement: &str) -> Result<(), DestinationError>;

    fn begin(&mut self) -> Result<(), DestinationError>;

    /// Copy CSV rows (no header, empty field = NULL) into `table`.
    ///
    /// `table` and `columns` are already lower-cased. Returns the number of
    /// rows the destination accepted.
    fn copy_rows(
        &mut self,
        table: &str,
        columns: &[String],
        payload: &[u8],
    ) -> Result<u64, DestinationError>;

    fn commit(&mut self) -> Result<(), DestinationError>;

    fn rollback(&mut self) -> Result<(), DestinationError>;
}
