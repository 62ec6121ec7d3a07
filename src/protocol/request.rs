use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::block::Block;
use crate::compression::{self, CompressionMethod, DEFAULT_FRAME_SIZE};
use crate::config::QueryStage;

use super::{
    CLIENT_NAME_PREFIX, CLIENT_REVISION, CLIENT_VERSION_MAJOR, CLIENT_VERSION_MINOR, ClientContext,
    ServerContext, Settings,
};

const TAG_HELLO: u64 = 0;
const TAG_QUERY: u64 = 1;
const TAG_DATA: u64 = 2;
const TAG_CANCEL: u64 = 3;
const TAG_PING: u64 = 4;

/// Client greeting. The name goes on the wire as `"ClickHouse <client_name>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub client_name: String,
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Hello {
    pub fn new(
        client_name: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            major: CLIENT_VERSION_MAJOR,
            minor: CLIENT_VERSION_MINOR,
            revision: CLIENT_REVISION,
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    fn write(&self, writer: &mut BinaryWriter) {
        writer.write_string(&format!("{CLIENT_NAME_PREFIX} {}", self.client_name));
        writer.write_varint(self.major);
        writer.write_varint(self.minor);
        writer.write_varint(self.revision);
        writer.write_string(&self.database);
        writer.write_string(&self.user);
        writer.write_string(&self.password);
    }

    fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        let name = reader.read_string()?;
        let client_name = name
            .strip_prefix(CLIENT_NAME_PREFIX)
            .map_or(name.as_str(), str::trim_start)
            .to_string();
        Ok(Self {
            client_name,
            major: reader.read_varint()?,
            minor: reader.read_varint()?,
            revision: reader.read_varint()?,
            database: reader.read_string()?,
            user: reader.read_string()?,
            password: reader.read_string()?,
        })
    }
}

/// A SQL statement submission.
///
/// On the wire it is always followed by an empty external-tables Data packet, which
/// [`Request::write`] emits and [`Request::read`] consumes as part of the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub query_id: String,
    pub client: ClientContext,
    pub settings: Settings,
    pub stage: QueryStage,
    pub compression: bool,
    pub sql: String,
}

impl Query {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_string(&self.query_id);
        self.client.write(writer);
        self.settings.write(writer);
        writer.write_varint(self.stage as u64);
        writer.write_bool(self.compression);
        writer.write_string(&self.sql);

        writer.write_varint(TAG_DATA);
        DataPacket::external_tables().write(writer, self.compression)
    }

    fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        let query_id = reader.read_string()?;
        let client = ClientContext::read(reader)?;
        let settings = Settings::read(reader)?;
        let stage = QueryStage::from_u64(reader.read_varint()?)?;
        let compression = reader.read_bool()?;
        let sql = reader.read_string()?;

        let tag = reader.read_varint()?;
        if tag != TAG_DATA {
            return Err(BinaryError::malformed(format!(
                "expected external tables data after query, got tag {tag}"
            )));
        }
        DataPacket::read(reader, compression, None)?;

        Ok(Self {
            query_id,
            client,
            settings,
            stage,
            compression,
            sql,
        })
    }
}

/// A named block. Used by both directions: inserts and external tables from the client,
/// result sets, totals and extremes from the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPacket {
    pub name: String,
    pub block: Block,
}

impl DataPacket {
    pub fn new(block: Block) -> Self {
        Self {
            name: String::new(),
            block,
        }
    }

    /// The empty packet that terminates an insert or an external table list.
    pub fn external_tables() -> Self {
        Self::default()
    }

    /// Writes the name and the block. With compression the block is LZ4 framed.
    pub fn write(&self, writer: &mut BinaryWriter, compression: bool) -> Result<(), BinaryError> {
        writer.write_string(&self.name);
        if compression {
            let mut raw = BinaryWriter::new();
            self.block.write(&mut raw)?;
            compression::write_frames(raw.as_slice(), CompressionMethod::Lz4, DEFAULT_FRAME_SIZE, writer);
        } else {
            self.block.write(writer)?;
        }
        Ok(())
    }

    /// Reads a packet body. A compressed block may span several frames, which are
    /// decompressed one at a time until the block parses.
    pub fn read(
        reader: &mut BinaryReader<'_>,
        compression: bool,
        context: Option<&ServerContext>,
    ) -> Result<Self, BinaryError> {
        let name = reader.read_string()?;
        if !compression {
            let block = Block::read(reader, context)?;
            return Ok(Self { name, block });
        }

        let mut decompressed = Vec::new();
        loop {
            match Block::read(&mut BinaryReader::new(&decompressed), context) {
                Ok(block) => return Ok(Self { name, block }),
                Err(BinaryError::NeedMoreData) => {
                    decompressed.extend(compression::read_frame(reader)?);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Hello(Hello),
    Query(Query),
    Data(DataPacket),
    Cancel,
    Ping,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Hello(_) => "Hello",
            Request::Query(_) => "Query",
            Request::Data(_) => "Data",
            Request::Cancel => "Cancel",
            Request::Ping => "Ping",
        }
    }

    /// Encodes the packet. `compression` applies to Data packets; a Query carries its own flag.
    pub fn write(&self, writer: &mut BinaryWriter, compression: bool) -> Result<(), BinaryError> {
        match self {
            Request::Hello(hello) => {
                writer.write_varint(TAG_HELLO);
                hello.write(writer);
            }
            Request::Query(query) => {
                writer.write_varint(TAG_QUERY);
                query.write(writer)?;
            }
            Request::Data(data) => {
                writer.write_varint(TAG_DATA);
                data.write(writer, compression)?;
            }
            Request::Cancel => writer.write_varint(TAG_CANCEL),
            Request::Ping => writer.write_varint(TAG_PING),
        }
        Ok(())
    }

    /// Decodes one packet. Nothing is consumed on [`BinaryError::NeedMoreData`].
    pub fn read(reader: &mut BinaryReader<'_>, compression: bool) -> Result<Self, BinaryError> {
        let mut probe = reader.clone();
        let request = match probe.read_varint()? {
            TAG_HELLO => Request::Hello(Hello::read(&mut probe)?),
            TAG_QUERY => Request::Query(Query::read(&mut probe)?),
            TAG_DATA => Request::Data(DataPacket::read(&mut probe, compression, None)?),
            TAG_CANCEL => Request::Cancel,
            TAG_PING => Request::Ping,
            tag => return Err(BinaryError::malformed(format!("unknown request tag {tag}"))),
        };
        *reader = probe;
        Ok(request)
    }
}
