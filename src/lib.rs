//! minidb: a minimal relational database engine served over TCP.
//!
//! SQL statements move through a four-stage pipeline: the tokenizer and
//! parser produce an AST, the compiler resolves it against the catalog into a
//! typed Statement, the planner lowers that into a physical Plan, and the
//! executor drives the plan's pull-based operator tree over batched columnar
//! data. Tables persist as one packed column file per column plus JSON
//! metadata under the data directory.

pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod server;
pub mod sql;
pub mod storage;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use config::Config;
pub use error::{DbError, DbResult};
pub use exec::executor::{QueryExecutor, QueryOutput};
pub use server::DatabaseServer;
pub use storage::catalog::Catalog;
pub use storage::table::{Table, TableManager};
pub use types::{ColumnVector, DataChunk, DataType, JoinType, Row, TableSchema};
pub use value::Value;
