use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::types::DEFAULT_TIMEZONE;

use super::{
    CLIENT_REVISION, CLIENT_VERSION_MAJOR, CLIENT_VERSION_MINOR, REVISION_WITH_SERVER_DISPLAY_NAME,
    REVISION_WITH_SERVER_TIMEZONE,
};

const QUERY_KIND_INITIAL: u64 = 1;
const INTERFACE_TCP: u64 = 1;
const DEFAULT_INITIAL_ADDRESS: &str = "0.0.0.0:0";
const DEFAULT_DISPLAY_NAME: &str = "localhost";

/// Identity of the client, embedded in every Query packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub initial_address: String,
    pub hostname: String,
    pub client_name: String,
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
}

impl ClientContext {
    /// Context for this process, reporting the local hostname.
    pub fn new(client_name: impl Into<String>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| DEFAULT_DISPLAY_NAME.to_string());
        Self {
            initial_address: DEFAULT_INITIAL_ADDRESS.to_string(),
            hostname,
            client_name: client_name.into(),
            major: CLIENT_VERSION_MAJOR,
            minor: CLIENT_VERSION_MINOR,
            revision: CLIENT_REVISION,
        }
    }

    pub fn write(&self, writer: &mut BinaryWriter) {
        writer.write_varint(QUERY_KIND_INITIAL);
        // initial user and initial query id
        writer.write_string("");
        writer.write_string("");
        writer.write_string(&self.initial_address);

        writer.write_varint(INTERFACE_TCP);
        // os user
        writer.write_string("");
        writer.write_string(&self.hostname);
        writer.write_string(&self.client_name);
        writer.write_varint(self.major);
        writer.write_varint(self.minor);
        writer.write_varint(self.revision);
        // quota key
        writer.write_string("");
    }

    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        let kind = reader.read_varint()?;
        if kind != QUERY_KIND_INITIAL {
            return Err(BinaryError::unsupported(format!("query kind {kind}")));
        }
        reader.read_string()?;
        reader.read_string()?;
        let initial_address = reader.read_string()?;

        let interface = reader.read_varint()?;
        if interface != INTERFACE_TCP {
            return Err(BinaryError::unsupported(format!("client interface {interface}")));
        }
        reader.read_string()?;
        let hostname = reader.read_string()?;
        let client_name = reader.read_string()?;
        let major = reader.read_varint()?;
        let minor = reader.read_varint()?;
        let revision = reader.read_varint()?;
        reader.read_string()?;

        Ok(Self {
            initial_address,
            hostname,
            client_name,
            major,
            minor,
            revision,
        })
    }
}

/// What the server announced in its Hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerContext {
    pub name: String,
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    /// Server timezone, used for `DateTime` columns without an explicit zone.
    pub timezone: String,
    pub display_name: String,
}

impl Default for ServerContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            major: 0,
            minor: 0,
            revision: 0,
            timezone: DEFAULT_TIMEZONE.to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }
}

impl ServerContext {
    /// Reads the body of a server Hello. Fields the announced revision predates get defaults.
    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        let name = reader.read_string()?;
        let major = reader.read_varint()?;
        let minor = reader.read_varint()?;
        let revision = reader.read_varint()?;
        let timezone = if revision >= REVISION_WITH_SERVER_TIMEZONE {
            reader.read_string()?
        } else {
            DEFAULT_TIMEZONE.to_string()
        };
        let display_name = if revision >= REVISION_WITH_SERVER_DISPLAY_NAME {
            reader.read_string()?
        } else {
            DEFAULT_DISPLAY_NAME.to_string()
        };

        Ok(Self {
            name,
            major,
            minor,
            revision,
            timezone,
            display_name,
        })
    }

    pub fn write(&self, writer: &mut BinaryWriter) {
        writer.write_string(&self.name);
        writer.write_varint(self.major);
        writer.write_varint(self.minor);
        writer.write_varint(self.revision);
        if self.revision >= REVISION_WITH_SERVER_TIMEZONE {
            writer.write_string(&self.timezone);
        }
        if self.revision >= REVISION_WITH_SERVER_DISPLAY_NAME {
            writer.write_string(&self.display_name);
        }
    }
}
