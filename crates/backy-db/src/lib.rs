//! # Backy Database Layer
//!
//! MySQL support for the Backy engine: introspecting a live database,
//! emitting reloadable SQL in dependency order as a lazy statement stream,
//! parsing SQL text back into statements (including the dialect's dynamic
//! `DELIMITER` directive), and replaying statements under a conflict policy.
//!
//! The extraction side never materialises the whole database: table rows are
//! streamed off the wire and handed to the caller's [`StatementSink`] one
//! bounded statement at a time.

pub mod connection;
pub mod error;
pub mod extract;
pub mod parser;
pub mod replay;
pub mod sort;
pub mod sorting;
pub mod values;

pub use connection::MySqlSession;
pub use error::{BoxError, DbError, Result};
pub use extract::{Extractor, StatementSink};
pub use parser::StatementParser;
pub use replay::{clean_statement, Replayer};
pub use sort::topological_sort;
pub use values::{decode_row, encode_row, SqlValue};
