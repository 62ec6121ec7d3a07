//! Client-server message layer.
//!
//! This module defines the packets exchanged over a native-protocol session and the
//! [`ProtocolTransport`] that moves them across a byte stream.
//!
//! # Overview
//!
//! Every packet starts with a varint tag followed by a tag-specific body built from the
//! [`binary`](crate::binary) primitives. Client packets are [`Request`]s, server packets are
//! [`Response`]s. Both directions can be written and read, so the same types drive the
//! client and the scripted test servers.
//!
//! | tag | request | response     |
//! |-----|---------|--------------|
//! | 0   | Hello   | Hello        |
//! | 1   | Query   | Data         |
//! | 2   | Data    | Exception    |
//! | 3   | Cancel  | Progress     |
//! | 4   | Ping    | Pong         |
//! | 5   |         | EndOfStream  |
//! | 6   |         | ProfileInfo  |
//! | 7   |         | Totals       |
//! | 8   |         | Extremes     |
//!
//! # Versioning
//!
//! The client always announces [`CLIENT_REVISION`]. Optional fields of the server Hello are
//! gated on the revision the server announces back.
mod context;
mod exception;
mod request;
mod response;
mod settings;
mod transport;

pub use context::{ClientContext, ServerContext};
pub use exception::ServerException;
pub use request::{DataPacket, Hello, Query, Request};
pub use response::{ProfileInfo, Progress, Response};
pub use settings::{SettingValue, Settings};
pub use transport::{ProtocolTransport, TransportError};

/// Prefix of the client name sent in the Hello packet.
pub const CLIENT_NAME_PREFIX: &str = "ClickHouse";

pub const CLIENT_VERSION_MAJOR: u64 = 1;
pub const CLIENT_VERSION_MINOR: u64 = 1;
pub const CLIENT_REVISION: u64 = 54_380;

/// First server revision that sends its timezone in Hello.
pub const REVISION_WITH_SERVER_TIMEZONE: u64 = 54_058;
/// First server revision that sends its display name in Hello.
pub const REVISION_WITH_SERVER_DISPLAY_NAME: u64 = 54_372;
