//! Columnar blocks.
//!
//! A [`Block`] is the unit of data exchange: an ordered set of named, typed columns sharing a
//! row count. Blocks travel inside `Data`, `Totals` and `Extremes` packets.
//!
//! # Wire layout
//!
//! ```text
//! settings:  (varint key, value)* varint 0
//! columns:   varint
//! rows:      varint
//! per column: string name, string type name, column data
//! ```
mod builder;

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::protocol::ServerContext;
use crate::types::DataType;
use crate::value::Value;

pub use builder::BlockBuilder;

const SETTING_END: u64 = 0;
const SETTING_IS_OVERFLOWS: u64 = 1;
const SETTING_BUCKET_NUM: u64 = 2;

/// Aggregation metadata carried in the block prologue. Only present keys are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockSettings {
    pub is_overflows: Option<bool>,
    pub bucket_num: Option<i32>,
}

impl BlockSettings {
    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        let mut settings = BlockSettings::default();
        loop {
            match reader.read_varint()? {
                SETTING_END => return Ok(settings),
                SETTING_IS_OVERFLOWS => settings.is_overflows = Some(reader.read_bool()?),
                SETTING_BUCKET_NUM => settings.bucket_num = Some(reader.read_i32()?),
                key => return Err(BinaryError::unsupported(format!("block setting {key}"))),
            }
        }
    }

    pub fn write(&self, writer: &mut BinaryWriter) {
        if let Some(is_overflows) = self.is_overflows {
            writer.write_varint(SETTING_IS_OVERFLOWS);
            writer.write_bool(is_overflows);
        }
        if let Some(bucket_num) = self.bucket_num {
            writer.write_varint(SETTING_BUCKET_NUM);
            writer.write_i32(bucket_num);
        }
        writer.write_varint(SETTING_END);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            data_type,
            values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub settings: BlockSettings,
    columns: Vec<Column>,
    rows: usize,
}

impl Block {
    /// Builds a block, checking every column holds `rows` values.
    pub fn new(rows: usize, columns: Vec<Column>) -> Result<Self, BinaryError> {
        if let Some(column) = columns.iter().find(|c| c.values.len() != rows) {
            return Err(BinaryError::malformed(format!(
                "column {} has {} values, block has {rows} rows",
                column.name,
                column.values.len()
            )));
        }
        Ok(Self {
            settings: BlockSettings::default(),
            columns,
            rows,
        })
    }

    /// A block with no columns and no rows, used to terminate data streams.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Values of one row, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        (index < self.rows).then(|| self.columns.iter().map(|c| &c.values[index]).collect())
    }

    pub fn read(reader: &mut BinaryReader<'_>, context: Option<&ServerContext>) -> Result<Self, BinaryError> {
        let settings = BlockSettings::read(reader)?;
        let column_count = reader.read_varint()?;
        let rows = usize::try_from(reader.read_varint()?)
            .map_err(|_| BinaryError::malformed("row count overflows usize"))?;

        let mut columns = Vec::new();
        for _ in 0..column_count {
            let name = reader.read_string()?;
            let type_name = reader.read_string()?;
            let data_type = match context {
                Some(context) => DataType::parse_with_context(&type_name, context)?,
                None => DataType::parse(&type_name)?,
            };
            let values = data_type.decode_column(rows, reader)?;
            columns.push(Column { name, data_type, values });
        }

        Ok(Self { settings, columns, rows })
    }

    pub fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        self.settings.write(writer);
        writer.write_varint(self.columns.len() as u64);
        writer.write_varint(self.rows as u64);
        for column in &self.columns {
            writer.write_string(&column.name);
            writer.write_string(&column.data_type.name());
            column.data_type.encode_column(&column.values, writer)?;
        }
        Ok(())
    }

    fn check_column_count(&self, sample: &Block) -> Result<(), BinaryError> {
        if self.columns.len() != sample.columns.len() {
            return Err(BinaryError::malformed(format!(
                "column count mismatch: {} vs {} expected",
                self.columns.len(),
                sample.columns.len()
            )));
        }
        Ok(())
    }

    /// Checks names and canonical types match `sample` index by index.
    pub fn validate_against(&self, sample: &Block) -> Result<(), BinaryError> {
        self.check_column_count(sample)?;
        for (i, (ours, theirs)) in self.columns.iter().zip(&sample.columns).enumerate() {
            if ours.name != theirs.name {
                return Err(BinaryError::malformed(format!(
                    "column name mismatch at index {i}: {} vs {} expected",
                    ours.name, theirs.name
                )));
            }
            if ours.data_type.name() != theirs.data_type.name() {
                return Err(BinaryError::malformed(format!(
                    "column type mismatch for {}: {} vs {} expected",
                    ours.name, ours.data_type, theirs.data_type
                )));
            }
        }
        Ok(())
    }

    /// Reshapes this block to the server's sample: names and types come from `sample`, values
    /// from the matching column here.
    ///
    /// Columns match by position when every name lines up, otherwise by name, so callers may
    /// list columns in any order. A name missing from either side is a mismatch.
    pub fn normalize_for_insert(&self, sample: &Block) -> Result<Block, BinaryError> {
        self.check_column_count(sample)?;
        let positional = self
            .columns
            .iter()
            .zip(&sample.columns)
            .all(|(ours, theirs)| ours.name == theirs.name);

        let mut columns = Vec::with_capacity(sample.columns.len());
        for (i, expected) in sample.columns.iter().enumerate() {
            let source = if positional {
                &self.columns[i]
            } else {
                self.column(&expected.name).ok_or_else(|| {
                    BinaryError::malformed(format!(
                        "column name mismatch at index {i}: {} vs {} expected",
                        self.columns[i].name, expected.name
                    ))
                })?
            };
            columns.push(Column {
                name: expected.name.clone(),
                data_type: expected.data_type.clone(),
                values: source.values.clone(),
            });
        }

        Ok(Block {
            settings: self.settings,
            columns,
            rows: self.rows,
        })
    }
}
