use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};

/// A typed query setting.
///
/// Settings travel without a type tag, so the encoding is chosen by the variant:
/// integers and booleans as varints, floats and characters as text, durations as whole
/// seconds or milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Int64(i64),
    Int32(i32),
    Float32(f32),
    Bool(bool),
    String(String),
    Seconds(Duration),
    Milliseconds(Duration),
    Char(char),
}

/// How a setting received without type information is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingKind {
    Int,
    Float,
    Bool,
    Seconds,
    Milliseconds,
    Text,
}

impl SettingKind {
    /// Well-known setting names. Anything else is assumed to be text.
    fn for_name(name: &str) -> Self {
        match name {
            "max_block_size"
            | "max_insert_block_size"
            | "max_threads"
            | "max_memory_usage"
            | "max_rows_to_read"
            | "max_result_rows"
            | "max_result_bytes"
            | "max_query_size"
            | "min_insert_block_size_rows"
            | "min_insert_block_size_bytes"
            | "priority"
            | "readonly"
            | "network_compression_method_level" => SettingKind::Int,
            "totals_auto_threshold" | "max_streams_to_max_threads_ratio" => SettingKind::Float,
            "extremes" | "use_uncompressed_cache" | "insert_deduplicate" | "log_queries" | "async_insert" => {
                SettingKind::Bool
            }
            "max_execution_time" | "connect_timeout" | "receive_timeout" | "send_timeout" => {
                SettingKind::Seconds
            }
            "connect_timeout_with_failover_ms" | "queue_max_wait_ms" | "poll_interval" => {
                SettingKind::Milliseconds
            }
            _ => SettingKind::Text,
        }
    }
}

impl SettingValue {
    pub fn write(&self, writer: &mut BinaryWriter) {
        match self {
            SettingValue::Int64(v) => writer.write_varint(*v as u64),
            SettingValue::Int32(v) => writer.write_varint(i64::from(*v) as u64),
            SettingValue::Float32(v) => writer.write_string(&v.to_string()),
            SettingValue::Bool(v) => writer.write_bool(*v),
            SettingValue::String(v) => writer.write_string(v),
            SettingValue::Seconds(d) => writer.write_varint(d.as_secs()),
            SettingValue::Milliseconds(d) => writer.write_varint(d.as_millis() as u64),
            SettingValue::Char(c) => writer.write_string(c.encode_utf8(&mut [0; 4])),
        }
    }

    /// Reads the value of setting `name`, inferring its type from the name.
    ///
    /// Only the server side of the protocol reads settings, and here that is the scripted
    /// test server. Names outside the built-in list are read as text, so a numeric setting
    /// with an unlisted name desynchronizes the rest of the packet. Send such settings as
    /// [`SettingValue::String`] when they must be read back.
    pub fn read(name: &str, reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        Ok(match SettingKind::for_name(name) {
            SettingKind::Int => SettingValue::Int64(reader.read_varint()? as i64),
            SettingKind::Bool => SettingValue::Bool(reader.read_bool()?),
            SettingKind::Seconds => SettingValue::Seconds(Duration::from_secs(reader.read_varint()?)),
            SettingKind::Milliseconds => SettingValue::Milliseconds(Duration::from_millis(reader.read_varint()?)),
            SettingKind::Float => {
                let text = reader.read_string()?;
                let value = text
                    .parse()
                    .map_err(|_| BinaryError::malformed(format!("setting {name}: bad float {text:?}")))?;
                SettingValue::Float32(value)
            }
            SettingKind::Text => SettingValue::String(reader.read_string()?),
        })
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Int64(v) => write!(f, "{v}"),
            SettingValue::Int32(v) => write!(f, "{v}"),
            SettingValue::Float32(v) => write!(f, "{v}"),
            SettingValue::Bool(v) => write!(f, "{}", u8::from(*v)),
            SettingValue::String(v) => write!(f, "{v}"),
            SettingValue::Seconds(d) => write!(f, "{}", d.as_secs()),
            SettingValue::Milliseconds(d) => write!(f, "{}", d.as_millis()),
            SettingValue::Char(c) => write!(f, "{c}"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SettingValue {
                fn from(v: $ty) -> Self {
                    SettingValue::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    i64 => Int64,
    i32 => Int32,
    f32 => Float32,
    bool => Bool,
    String => String,
    char => Char,
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::String(v.to_string())
    }
}

/// Named settings, written in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// These settings overridden by `overrides`.
    pub fn merged(&self, overrides: &Settings) -> Settings {
        let mut values = self.values.clone();
        values.extend(overrides.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Settings { values }
    }

    /// Writes `(name, value)` pairs followed by the empty-name terminator.
    pub fn write(&self, writer: &mut BinaryWriter) {
        for (name, value) in &self.values {
            writer.write_string(name);
            value.write(writer);
        }
        writer.write_string("");
    }

    /// Reads settings written by [`Settings::write`]. See [`SettingValue::read`] for the
    /// names whose types are known.
    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        let mut settings = Settings::new();
        loop {
            let name = reader.read_string()?;
            if name.is_empty() {
                return Ok(settings);
            }
            let value = SettingValue::read(&name, reader)?;
            settings.values.insert(name, value);
        }
    }
}

impl<K: Into<String>, V: Into<SettingValue>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Settings::new();
        for (k, v) in iter {
            settings.set(k, v);
        }
        settings
    }
}
