use crate::binary::BinaryError;
use crate::protocol::ServerContext;

use super::decimal::{MAX_PRECISION, width_for};
use super::temporal::MAX_DATETIME64_SCALE;
use super::{DataType, Zone};

/// Timezone assumed for `DateTime` columns when no server context is available.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Tokenizer for type names.
#[derive(Debug, Clone)]
pub struct TypeLexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TypeLexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    pub fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    pub fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.rest().chars().next()
    }

    pub fn consume(&mut self, expected: char) -> Result<(), BinaryError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(c) => Err(BinaryError::malformed(format!(
                "expected '{expected}', found '{c}' in {:?}",
                self.input
            ))),
            None => Err(BinaryError::malformed(format!(
                "expected '{expected}', found end of {:?}",
                self.input
            ))),
        }
    }

    pub fn read_identifier(&mut self) -> Result<&'a str, BinaryError> {
        self.skip_whitespace();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(BinaryError::malformed(format!("expected identifier in {:?}", self.input)));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    pub fn read_signed_int(&mut self) -> Result<i64, BinaryError> {
        self.skip_whitespace();
        let rest = self.rest();
        let sign_len = usize::from(rest.starts_with(['-', '+']));
        let digits = rest[sign_len..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len() - sign_len);
        let text = &rest[..sign_len + digits];
        let value = text
            .parse::<i64>()
            .map_err(|_| BinaryError::malformed(format!("expected integer in {:?}", self.input)))?;
        self.pos += text.len();
        Ok(value)
    }

    pub fn read_unsigned(&mut self) -> Result<u64, BinaryError> {
        let value = self.read_signed_int()?;
        u64::try_from(value).map_err(|_| BinaryError::malformed(format!("negative size in {:?}", self.input)))
    }

    /// Reads a single-quoted literal. A backslash escapes the next character.
    pub fn read_string_literal(&mut self) -> Result<String, BinaryError> {
        self.consume('\'')?;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\'' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(BinaryError::malformed(format!("unterminated string literal in {:?}", self.input)))
    }
}

impl DataType {
    /// Parses a type name. Unzoned `DateTime` columns get [`DEFAULT_TIMEZONE`].
    pub fn parse(name: &str) -> Result<DataType, BinaryError> {
        Parser {
            lexer: TypeLexer::new(name),
            timezone: DEFAULT_TIMEZONE,
        }
        .parse_all()
    }

    /// Parses a type name, resolving unzoned `DateTime` columns to the server's timezone.
    pub fn parse_with_context(name: &str, context: &ServerContext) -> Result<DataType, BinaryError> {
        Parser {
            lexer: TypeLexer::new(name),
            timezone: &context.timezone,
        }
        .parse_all()
    }
}

struct Parser<'a> {
    lexer: TypeLexer<'a>,
    timezone: &'a str,
}

impl Parser<'_> {
    fn parse_all(mut self) -> Result<DataType, BinaryError> {
        let ty = self.parse_type()?;
        self.lexer.skip_whitespace();
        if !self.lexer.is_at_end() {
            return Err(BinaryError::malformed(format!(
                "unexpected trailing input {:?} in type {:?}",
                self.lexer.rest(),
                self.lexer.input
            )));
        }
        Ok(ty)
    }

    fn nested(&mut self) -> Result<Box<DataType>, BinaryError> {
        self.lexer.consume('(')?;
        let ty = self.parse_type()?;
        self.lexer.consume(')')?;
        Ok(Box::new(ty))
    }

    fn single_int(&mut self) -> Result<u64, BinaryError> {
        self.lexer.consume('(')?;
        let n = self.lexer.read_unsigned()?;
        self.lexer.consume(')')?;
        Ok(n)
    }

    /// Comma separated items up to the closing parenthesis.
    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T, BinaryError>) -> Result<Vec<T>, BinaryError> {
        self.lexer.consume('(')?;
        let mut items = vec![item(self)?];
        while self.lexer.peek() == Some(',') {
            self.lexer.consume(',')?;
            items.push(item(self)?);
        }
        self.lexer.consume(')')?;
        Ok(items)
    }

    fn tuple_element(&mut self) -> Result<DataType, BinaryError> {
        // Named elements (`Tuple(id UInt64, name String)`) keep only the type.
        let mut probe = self.lexer.clone();
        probe.read_identifier()?;
        if probe.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            self.lexer.read_identifier()?;
        }
        self.parse_type()
    }

    fn enum_entry(&mut self) -> Result<(String, i64), BinaryError> {
        let name = self.lexer.read_string_literal()?;
        self.lexer.consume('=')?;
        let code = self.lexer.read_signed_int()?;
        Ok((name, code))
    }

    fn scale(&self, value: u64, limit: u8) -> Result<u8, BinaryError> {
        u8::try_from(value)
            .ok()
            .filter(|s| *s <= limit)
            .ok_or_else(|| BinaryError::unsupported(format!("scale {value} in {:?}", self.lexer.input)))
    }

    fn decimal(&self, precision: u64, scale: u64) -> Result<DataType, BinaryError> {
        let precision = u8::try_from(precision)
            .ok()
            .filter(|p| *p <= MAX_PRECISION)
            .ok_or_else(|| BinaryError::unsupported(format!("decimal precision {precision}")))?;
        width_for(precision)?;
        let scale = self.scale(scale, precision)?;
        Ok(DataType::Decimal { precision, scale })
    }

    /// Optional `(scale)` suffix of `Decimal32` and friends.
    fn optional_scale(&mut self) -> Result<u64, BinaryError> {
        if self.lexer.peek() == Some('(') {
            self.single_int()
        } else {
            Ok(0)
        }
    }

    fn parse_type(&mut self) -> Result<DataType, BinaryError> {
        let ident = self.lexer.read_identifier()?;
        Ok(match ident.to_ascii_lowercase().as_str() {
            "int8" => DataType::Int8,
            "int16" => DataType::Int16,
            "int32" => DataType::Int32,
            "int64" => DataType::Int64,
            "uint8" => DataType::UInt8,
            "uint16" => DataType::UInt16,
            "uint32" => DataType::UInt32,
            "uint64" => DataType::UInt64,
            "float32" => DataType::Float32,
            "float64" => DataType::Float64,
            "bool" => DataType::Bool,
            "string" => DataType::String,
            "json" => DataType::Json,
            "uuid" => DataType::Uuid,
            "ipv4" => DataType::IPv4,
            "ipv6" => DataType::IPv6,
            "date" => DataType::Date,
            "date32" => DataType::Date32,
            "nothing" => DataType::Nothing,
            "fixedstring" | "binary" => {
                let n = self.single_int()?;
                DataType::FixedString(
                    usize::try_from(n).map_err(|_| BinaryError::malformed(format!("FixedString({n}) too large")))?,
                )
            }
            "array" => DataType::Array(self.nested()?),
            "nullable" => DataType::Nullable(self.nested()?),
            "lowcardinality" => DataType::LowCardinality(self.nested()?),
            "tuple" => DataType::Tuple(self.list(Self::tuple_element)?),
            "map" => {
                self.lexer.consume('(')?;
                let key = self.parse_type()?;
                self.lexer.consume(',')?;
                let value = self.parse_type()?;
                self.lexer.consume(')')?;
                DataType::Map(Box::new(key), Box::new(value))
            }
            "enum8" => {
                let entries = self.list(Self::enum_entry)?;
                DataType::Enum8(
                    entries
                        .into_iter()
                        .map(|(name, code)| {
                            i8::try_from(code)
                                .map(|c| (name, c))
                                .map_err(|_| BinaryError::malformed(format!("Enum8 code {code} out of range")))
                        })
                        .collect::<Result<_, _>>()?,
                )
            }
            "enum16" => {
                let entries = self.list(Self::enum_entry)?;
                DataType::Enum16(
                    entries
                        .into_iter()
                        .map(|(name, code)| {
                            i16::try_from(code)
                                .map(|c| (name, c))
                                .map_err(|_| BinaryError::malformed(format!("Enum16 code {code} out of range")))
                        })
                        .collect::<Result<_, _>>()?,
                )
            }
            "decimal" => {
                self.lexer.consume('(')?;
                let precision = self.lexer.read_unsigned()?;
                let scale = if self.lexer.peek() == Some(',') {
                    self.lexer.consume(',')?;
                    self.lexer.read_unsigned()?
                } else {
                    0
                };
                self.lexer.consume(')')?;
                self.decimal(precision, scale)?
            }
            "decimal32" => {
                let scale = self.optional_scale()?;
                self.decimal(9, scale)?
            }
            "decimal64" => {
                let scale = self.optional_scale()?;
                self.decimal(18, scale)?
            }
            "decimal128" => {
                let scale = self.optional_scale()?;
                self.decimal(38, scale)?
            }
            "decimal256" => {
                let scale = self.optional_scale()?;
                self.decimal(76, scale)?
            }
            "datetime" => {
                if self.lexer.peek() == Some('(') {
                    self.lexer.consume('(')?;
                    let zone = self.lexer.read_string_literal()?;
                    self.lexer.consume(')')?;
                    DataType::DateTime(Zone::explicit(zone))
                } else {
                    DataType::DateTime(Zone::implicit(self.timezone))
                }
            }
            "datetime64" => {
                let mut scale = 3;
                let mut zone = Zone::implicit(self.timezone);
                if self.lexer.peek() == Some('(') {
                    self.lexer.consume('(')?;
                    let raw = self.lexer.read_unsigned()?;
                    scale = self.scale(raw, MAX_DATETIME64_SCALE)?;
                    if self.lexer.peek() == Some(',') {
                        self.lexer.consume(',')?;
                        zone = Zone::explicit(self.lexer.read_string_literal()?);
                    }
                    self.lexer.consume(')')?;
                }
                DataType::DateTime64(scale, zone)
            }
            _ => return Err(BinaryError::unsupported(format!("type {ident}"))),
        })
    }
}
