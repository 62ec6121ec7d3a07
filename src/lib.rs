//! Native TCP protocol client for ClickHouse-compatible columnar databases.
//!
//! ```no_run
//! use chnative::{Client, Config};
//!
//! let client = Client::connect(Config::with_host("localhost", 9000))?;
//! for row in client.query_rows("SELECT number, toString(number) FROM system.numbers LIMIT 3")? {
//!     let (n, s): (u64, String) = chnative::FromRow::from_row(row?)?;
//!     println!("{n} {s}");
//! }
//! # Ok::<(), chnative::Error>(())
//! ```
pub mod binary;
pub mod block;
pub mod cli;
pub mod client;
pub mod compression;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod types;
pub mod value;

pub use block::{Block, BlockBuilder, Column};
pub use cli::{Command, prompt};
pub use client::{Client, ColumnIndex, FromRow, FromValue, QueryEvent, QueryEvents, QueryResult, Row, Rows};
pub use config::{Config, Host, HostSelectionPolicy, QueryOptions, QueryStage, TlsConfig};
pub use connection::{CancelHandle, Connection, ConnectionState};
pub use error::{Error, Result};
pub use protocol::{ProfileInfo, Progress, ServerContext, ServerException, SettingValue, Settings};
pub use types::DataType;
pub use value::{Decimal, Value};
