use crate::binary::{BinaryError, BinaryReader, BinaryWriter};

use super::{DataPacket, ServerContext, ServerException};

const TAG_HELLO: u64 = 0;
const TAG_DATA: u64 = 1;
const TAG_EXCEPTION: u64 = 2;
const TAG_PROGRESS: u64 = 3;
const TAG_PONG: u64 = 4;
const TAG_END_OF_STREAM: u64 = 5;
const TAG_PROFILE_INFO: u64 = 6;
const TAG_TOTALS: u64 = 7;
const TAG_EXTREMES: u64 = 8;
const TAG_TABLES_STATUS: u64 = 9;

/// Incremental query progress. Counters are deltas since the previous packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
}

impl Progress {
    fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        Ok(Self {
            rows: reader.read_varint()?,
            bytes: reader.read_varint()?,
            total_rows: reader.read_varint()?,
        })
    }

    fn write(&self, writer: &mut BinaryWriter) {
        writer.write_varint(self.rows);
        writer.write_varint(self.bytes);
        writer.write_varint(self.total_rows);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
}

impl ProfileInfo {
    fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        Ok(Self {
            rows: reader.read_varint()?,
            blocks: reader.read_varint()?,
            bytes: reader.read_varint()?,
            applied_limit: reader.read_bool()?,
            rows_before_limit: reader.read_varint()?,
            calculated_rows_before_limit: reader.read_bool()?,
        })
    }

    fn write(&self, writer: &mut BinaryWriter) {
        writer.write_varint(self.rows);
        writer.write_varint(self.blocks);
        writer.write_varint(self.bytes);
        writer.write_bool(self.applied_limit);
        writer.write_varint(self.rows_before_limit);
        writer.write_bool(self.calculated_rows_before_limit);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Hello(ServerContext),
    Data(DataPacket),
    Exception(ServerException),
    Progress(Progress),
    Pong,
    EndOfStream,
    ProfileInfo(ProfileInfo),
    Totals(DataPacket),
    Extremes(DataPacket),
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Hello(_) => "Hello",
            Response::Data(_) => "Data",
            Response::Exception(_) => "Exception",
            Response::Progress(_) => "Progress",
            Response::Pong => "Pong",
            Response::EndOfStream => "EndOfStream",
            Response::ProfileInfo(_) => "ProfileInfo",
            Response::Totals(_) => "Totals",
            Response::Extremes(_) => "Extremes",
        }
    }

    /// Whether this packet ends a query exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Response::EndOfStream | Response::Exception(_))
    }

    /// Decodes one packet. Nothing is consumed on [`BinaryError::NeedMoreData`].
    ///
    /// `compression` is the session setting and applies to Data, Totals and Extremes.
    /// `context` resolves unzoned `DateTime` columns to the server timezone.
    pub fn read(
        reader: &mut BinaryReader<'_>,
        compression: bool,
        context: Option<&ServerContext>,
    ) -> Result<Self, BinaryError> {
        let mut probe = reader.clone();
        let response = match probe.read_varint()? {
            TAG_HELLO => Response::Hello(ServerContext::read(&mut probe)?),
            TAG_DATA => Response::Data(DataPacket::read(&mut probe, compression, context)?),
            TAG_EXCEPTION => Response::Exception(ServerException::read(&mut probe)?),
            TAG_PROGRESS => Response::Progress(Progress::read(&mut probe)?),
            TAG_PONG => Response::Pong,
            TAG_END_OF_STREAM => Response::EndOfStream,
            TAG_PROFILE_INFO => Response::ProfileInfo(ProfileInfo::read(&mut probe)?),
            TAG_TOTALS => Response::Totals(DataPacket::read(&mut probe, compression, context)?),
            TAG_EXTREMES => Response::Extremes(DataPacket::read(&mut probe, compression, context)?),
            TAG_TABLES_STATUS => return Err(BinaryError::unsupported("tables status response")),
            tag => return Err(BinaryError::malformed(format!("unknown response tag {tag}"))),
        };
        *reader = probe;
        Ok(response)
    }

    pub fn write(&self, writer: &mut BinaryWriter, compression: bool) -> Result<(), BinaryError> {
        match self {
            Response::Hello(context) => {
                writer.write_varint(TAG_HELLO);
                context.write(writer);
            }
            Response::Data(data) => {
                writer.write_varint(TAG_DATA);
                data.write(writer, compression)?;
            }
            Response::Exception(exception) => {
                writer.write_varint(TAG_EXCEPTION);
                exception.write(writer);
            }
            Response::Progress(progress) => {
                writer.write_varint(TAG_PROGRESS);
                progress.write(writer);
            }
            Response::Pong => writer.write_varint(TAG_PONG),
            Response::EndOfStream => writer.write_varint(TAG_END_OF_STREAM),
            Response::ProfileInfo(info) => {
                writer.write_varint(TAG_PROFILE_INFO);
                info.write(writer);
            }
            Response::Totals(data) => {
                writer.write_varint(TAG_TOTALS);
                data.write(writer, compression)?;
            }
            Response::Extremes(data) => {
                writer.write_varint(TAG_EXTREMES);
                data.write(writer, compression)?;
            }
        }
        Ok(())
    }
}
