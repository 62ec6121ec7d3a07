use crate::binary::BinaryError;
use crate::types::DataType;
use crate::value::Value;

use super::{Block, Column};

/// Assembles a [`Block`] column by column, inferring the row count.
///
/// ```
/// use chnative::{BlockBuilder, DataType, Value};
///
/// let block = BlockBuilder::new()
///     .column("id", DataType::UInt32, vec![1u32, 2])
///     .column("tag", DataType::parse("Nullable(String)").unwrap(), vec![Some("a"), None])
///     .build()
///     .unwrap();
/// assert_eq!(block.rows(), 2);
/// assert_eq!(block.columns()[1].values[1], Value::Null);
/// ```
#[derive(Debug, Default)]
pub struct BlockBuilder {
    columns: Vec<Column>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column<T: Into<Value>>(mut self, name: impl Into<String>, data_type: DataType, values: Vec<T>) -> Self {
        self.push_column(name, data_type, values);
        self
    }

    pub fn push_column<T: Into<Value>>(&mut self, name: impl Into<String>, data_type: DataType, values: Vec<T>) {
        self.columns.push(Column::new(
            name,
            data_type,
            values.into_iter().map(Into::into).collect(),
        ));
    }

    /// Fails when columns disagree on their length.
    pub fn build(self) -> Result<Block, BinaryError> {
        let rows = self.columns.first().map_or(0, |c| c.values.len());
        Block::new(rows, self.columns)
    }
}
