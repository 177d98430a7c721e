//! Table schemas and the SQL type system.
//!
//! A [`TableSchema`] maps column names to [`ColumnDefinition`]s and is
//! persisted to the table's `.schma` file. Validation happens at two points:
//! when a definition enters the catalog (create table, add column) and when
//! a value enters a row (insert, update).
//!
//! The recognized data types form a closed set. Aliases (`CHAR`/`CHARACTER`,
//! `BOOL`/`BOOLEAN`, ...) are kept as distinct variants so a schema prints
//! back exactly what was declared.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opal_common::error::{OpalError, OpalResult};
use opal_common::MAX_COLUMN_NAME_SIZE;

use crate::value::Value;

/// Number of significant digits used when measuring numeric precision and
/// scale on insert.
const NUMERIC_SIGNIFICANT_DIGITS: usize = 14;

/// The closed set of column data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum DataType {
    Character,
    Char,
    Numeric,
    Decimal,
    Dec,
    Float,
    Double,
    Real,
    Int,
    Integer,
    SmallInt,
    Date,
    Time,
    Timestamp,
    DateTime,
    Uuid,
    Binary,
    Blob,
    Boolean,
    Bool,
    Text,
}

impl DataType {
    /// Fixed-length character types (`length` required).
    pub fn is_character(self) -> bool {
        matches!(self, DataType::Character | DataType::Char)
    }

    /// Fractional numeric types (`precision` and `scale` required).
    pub fn is_fractional(self) -> bool {
        matches!(
            self,
            DataType::Numeric
                | DataType::Decimal
                | DataType::Dec
                | DataType::Float
                | DataType::Double
                | DataType::Real
        )
    }

    /// Integer types.
    pub fn is_integer(self) -> bool {
        matches!(self, DataType::Int | DataType::Integer | DataType::SmallInt)
    }

    /// Temporal types.
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            DataType::Date | DataType::Time | DataType::Timestamp | DataType::DateTime
        )
    }
}

impl FromStr for DataType {
    type Err = OpalError;

    fn from_str(s: &str) -> OpalResult<Self> {
        let ty = match s.to_uppercase().as_str() {
            "CHARACTER" => DataType::Character,
            "CHAR" => DataType::Char,
            "NUMERIC" => DataType::Numeric,
            "DECIMAL" => DataType::Decimal,
            "DEC" => DataType::Dec,
            "FLOAT" => DataType::Float,
            "DOUBLE" => DataType::Double,
            "REAL" => DataType::Real,
            "INT" => DataType::Int,
            "INTEGER" => DataType::Integer,
            "SMALLINT" => DataType::SmallInt,
            "DATE" => DataType::Date,
            "TIME" => DataType::Time,
            "TIMESTAMP" => DataType::Timestamp,
            "DATETIME" => DataType::DateTime,
            "UUID" => DataType::Uuid,
            "BINARY" => DataType::Binary,
            "BLOB" => DataType::Blob,
            "BOOLEAN" => DataType::Boolean,
            "BOOL" => DataType::Bool,
            "TEXT" => DataType::Text,
            other => return Err(OpalError::schema(format!("invalid data type {other}"))),
        };
        Ok(ty)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Character => "CHARACTER",
            DataType::Char => "CHAR",
            DataType::Numeric => "NUMERIC",
            DataType::Decimal => "DECIMAL",
            DataType::Dec => "DEC",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Real => "REAL",
            DataType::Int => "INT",
            DataType::Integer => "INTEGER",
            DataType::SmallInt => "SMALLINT",
            DataType::Date => "DATE",
            DataType::Time => "TIME",
            DataType::Timestamp => "TIMESTAMP",
            DataType::DateTime => "DATETIME",
            DataType::Uuid => "UUID",
            DataType::Binary => "BINARY",
            DataType::Blob => "BLOB",
            DataType::Boolean => "BOOLEAN",
            DataType::Bool => "BOOL",
            DataType::Text => "TEXT",
        };
        f.write_str(s)
    }
}

/// A foreign-key reference to another table's column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced table name.
    pub table: String,
    /// Referenced column name.
    pub column: String,
}

/// Column default: a literal, or a sentinel resolved at insert time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// A literal value stored as declared.
    Literal(Value),
    /// Today's date at insert time.
    CurrentDate,
    /// The current time at insert time.
    CurrentTime,
    /// The current timestamp at insert time.
    CurrentTimestamp,
    /// A freshly generated UUID v4.
    NewUuid,
}

/// A column definition within a table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column data type.
    pub data_type: DataType,
    /// Column cannot be null.
    pub not_null: bool,
    /// Column is auto-assigned from the table sequence.
    pub sequence: bool,
    /// Column is unique (backed by the `unique_<col>` index).
    pub unique: bool,
    /// Declared length for character and binary types.
    pub length: Option<u32>,
    /// Declared precision for fractional numeric types.
    pub precision: Option<u32>,
    /// Declared scale for fractional numeric types.
    pub scale: Option<u32>,
    /// Foreign-key reference.
    pub references: Option<ForeignKey>,
    /// Default applied when an insert omits the column.
    pub default: Option<DefaultValue>,
    /// Check predicate, serialized by the parser. Opaque at this layer.
    pub check: Option<Vec<u8>>,
}

impl ColumnDefinition {
    /// Creates a plain nullable column of `data_type`.
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            not_null: false,
            sequence: false,
            unique: false,
            length: None,
            precision: None,
            scale: None,
            references: None,
            default: None,
            check: None,
        }
    }

    /// Marks the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column as the table's sequence column.
    pub fn sequence(mut self) -> Self {
        self.sequence = true;
        self
    }

    /// Marks the column unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the declared length.
    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the declared precision and scale.
    pub fn precision_scale(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Sets a foreign-key reference.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Sets the column default.
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// The schema of a table: an ordered mapping of column definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Column definitions keyed by column name.
    pub columns: BTreeMap<String, ColumnDefinition>,
}

impl TableSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, builder style.
    pub fn with_column(mut self, name: impl Into<String>, def: ColumnDefinition) -> Self {
        self.columns.insert(name.into(), def);
        self
    }

    /// Looks up a column definition.
    pub fn get(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.get(name)
    }

    /// Returns the sequence column name, if the schema declares one.
    pub fn sequence_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, def)| def.sequence)
            .map(|(name, _)| name.as_str())
    }

    /// Validates every definition plus the cross-column sequence rule.
    pub fn validate(&self) -> OpalResult<()> {
        let mut sequence_defined = false;

        for (name, def) in &self.columns {
            validate_definition(name, def)?;

            if def.sequence {
                if sequence_defined {
                    return Err(OpalError::schema(
                        "only one sequence column is allowed per table",
                    ));
                }
                sequence_defined = true;
            }
        }

        Ok(())
    }
}

/// Validates a single column definition for create table or add column.
pub fn validate_definition(name: &str, def: &ColumnDefinition) -> OpalResult<()> {
    if name.len() > MAX_COLUMN_NAME_SIZE {
        return Err(OpalError::schema(format!(
            "column name is too long, max length is {MAX_COLUMN_NAME_SIZE}"
        )));
    }

    if def.data_type.is_character() && def.length.unwrap_or(0) == 0 {
        return Err(OpalError::schema(format!("column {name} requires a length")));
    }

    if def.data_type.is_fractional() {
        if def.precision.unwrap_or(0) == 0 {
            return Err(OpalError::schema(format!(
                "column {name} requires a precision"
            )));
        }
        if def.scale.unwrap_or(0) == 0 {
            return Err(OpalError::schema(format!("column {name} requires a scale")));
        }
    }

    if def.sequence {
        if !def.unique || !def.not_null {
            return Err(OpalError::schema(format!(
                "sequence column {name} must be unique and not null"
            )));
        }
        if !matches!(def.data_type, DataType::Int | DataType::Integer) {
            return Err(OpalError::schema(format!(
                "sequence column {name} must be an integer"
            )));
        }
    }

    Ok(())
}

/// Validates and coerces one column value on insert.
///
/// Null values pick up the column default (sentinels resolve here); otherwise
/// the value is checked and normalized per type class: temporal and UUID text
/// is parsed into its variant, BINARY/BLOB hex is decoded to bytes, CHAR text
/// is stripped of surrounding quotes.
///
/// Sequence columns are assigned by the table store before this runs.
pub fn coerce_insert_value(name: &str, def: &ColumnDefinition, value: Value) -> OpalResult<Value> {
    if value.is_null() {
        if def.not_null && !def.sequence {
            return Err(OpalError::schema(format!("column {name} cannot be null")));
        }
        return match &def.default {
            Some(default) => Ok(resolve_default(default)),
            None => Ok(Value::Null),
        };
    }

    match def.data_type {
        DataType::Text => match value {
            Value::Text(_) => Ok(value),
            other => Err(type_error(name, "a string", &other)),
        },
        DataType::Bool | DataType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            other => Err(type_error(name, "a boolean", &other)),
        },
        DataType::Blob => decode_hex_value(name, value, None),
        DataType::Binary => decode_hex_value(name, value, def.length),
        DataType::Uuid => match value {
            Value::Uuid(_) => Ok(value),
            Value::Text(s) => {
                let parsed = Uuid::parse_str(&s).map_err(|_| {
                    OpalError::schema(format!("'{s}' is not a valid UUID"))
                })?;
                Ok(Value::Uuid(parsed))
            }
            other => Err(type_error(name, "a UUID", &other)),
        },
        DataType::Date | DataType::Time | DataType::Timestamp | DataType::DateTime => {
            match value {
                Value::Timestamp(_) => Ok(value),
                Value::Text(s) => {
                    let ts = parse_temporal(def.data_type, strip_quotes(&s))?;
                    Ok(Value::Timestamp(ts))
                }
                other => Err(type_error(name, "a string", &other)),
            }
        }
        DataType::Char | DataType::Character => match value {
            Value::Text(s) => {
                let stripped = strip_quotes(&s);
                let max = def.length.unwrap_or(0) as usize;
                if stripped.chars().count() > max {
                    return Err(OpalError::schema(format!("column {name} is too long")));
                }
                Ok(Value::text(stripped))
            }
            other => Err(type_error(name, "a string", &other)),
        },
        DataType::Numeric
        | DataType::Decimal
        | DataType::Dec
        | DataType::Float
        | DataType::Double
        | DataType::Real => {
            let v = value
                .as_float()
                .ok_or_else(|| type_error(name, "a floating point number", &value))?;
            check_numeric_bounds(name, def, v)?;
            Ok(Value::Float(v))
        }
        DataType::Int | DataType::Integer | DataType::SmallInt => {
            let v = value
                .as_int()
                .ok_or_else(|| type_error(name, "an int", &value))?;
            check_integer_bounds(name, def.data_type, v)?;
            Ok(Value::Int(v))
        }
    }
}

/// Validates one column value on update. Narrower than the insert path:
/// only character length, numeric bounds, and integer range are re-checked.
pub fn coerce_update_value(name: &str, def: &ColumnDefinition, value: Value) -> OpalResult<Value> {
    match def.data_type {
        DataType::Char | DataType::Character => match value {
            Value::Text(s) => {
                let stripped = strip_quotes(&s);
                let max = def.length.unwrap_or(0) as usize;
                if stripped.chars().count() > max {
                    return Err(OpalError::schema(format!("column {name} is too long")));
                }
                Ok(Value::text(stripped))
            }
            Value::Null if !def.not_null => Ok(Value::Null),
            other => Err(type_error(name, "a string", &other)),
        },
        DataType::Numeric
        | DataType::Decimal
        | DataType::Dec
        | DataType::Float
        | DataType::Double
        | DataType::Real => {
            let v = value
                .as_float()
                .ok_or_else(|| type_error(name, "a floating point number", &value))?;
            check_numeric_bounds(name, def, v)?;
            Ok(Value::Float(v))
        }
        DataType::Int | DataType::Integer | DataType::SmallInt => {
            let v = value
                .as_int()
                .ok_or_else(|| type_error(name, "an int", &value))?;
            check_integer_bounds(name, def.data_type, v)?;
            Ok(Value::Int(v))
        }
        _ => Ok(value),
    }
}

fn type_error(name: &str, expected: &str, got: &Value) -> OpalError {
    OpalError::schema(format!(
        "column {name} is not {expected} (got {})",
        got.type_name()
    ))
}

/// Strips surrounding single quotes, SQL-literal style.
fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix('\'').unwrap_or(s);
    s.strip_suffix('\'').unwrap_or(s)
}

/// Decodes a hex-encoded binary value, enforcing a declared length on the
/// hex string when given.
fn decode_hex_value(name: &str, value: Value, length: Option<u32>) -> OpalResult<Value> {
    match value {
        Value::Bytes(b) => {
            if let Some(max) = length {
                if b.len() * 2 > max as usize {
                    return Err(OpalError::schema(format!("column {name} is too long")));
                }
            }
            Ok(Value::Bytes(b))
        }
        Value::Text(s) => {
            let s = s.strip_prefix("0x").unwrap_or(&s);
            if let Some(max) = length {
                if s.len() > max as usize {
                    return Err(OpalError::schema(format!("column {name} is too long")));
                }
            }
            let bytes = hex::decode(s).map_err(|_| {
                OpalError::schema(format!("column {name} is not a valid binary"))
            })?;
            Ok(Value::Bytes(bytes))
        }
        other => Err(type_error(name, "a string", &other)),
    }
}

/// Resolves a column default at insert time.
fn resolve_default(default: &DefaultValue) -> Value {
    match default {
        DefaultValue::Literal(v) => v.clone(),
        DefaultValue::CurrentDate => {
            let now = Utc::now();
            Value::Timestamp(
                now.date_naive()
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is valid")
                    .and_utc(),
            )
        }
        DefaultValue::CurrentTime | DefaultValue::CurrentTimestamp => Value::Timestamp(Utc::now()),
        DefaultValue::NewUuid => Value::Uuid(Uuid::new_v4()),
    }
}

/// Parses a temporal literal in its canonical form.
///
/// `DATE` is `YYYY-MM-DD`; `TIME` is `HH:MM:SS` (attached to the epoch
/// date); `TIMESTAMP`/`DATETIME` is `YYYY-MM-DD HH:MM:SS`, with the compact
/// `HHMMSS` time form normalized before parsing.
fn parse_temporal(data_type: DataType, s: &str) -> OpalResult<DateTime<Utc>> {
    let invalid = || {
        OpalError::schema(format!(
            "'{s}' is not a valid {}",
            data_type.to_string().to_lowercase()
        ))
    };

    match data_type {
        DataType::Date => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())?;
            Ok(date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc())
        }
        DataType::Time => {
            let time = NaiveTime::parse_from_str(s, "%H:%M:%S").map_err(|_| invalid())?;
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date");
            Ok(epoch.and_time(time).and_utc())
        }
        DataType::Timestamp | DataType::DateTime => {
            let normalized = normalize_datetime(s).ok_or_else(invalid)?;
            let ts = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S")
                .map_err(|_| invalid())?;
            Ok(ts.and_utc())
        }
        _ => Err(invalid()),
    }
}

/// Rewrites `YYYY-MM-DD HHMMSS` into `YYYY-MM-DD HH:MM:SS`; colon-separated
/// input passes through.
fn normalize_datetime(s: &str) -> Option<String> {
    let (date, time) = s.split_at_checked(10)?;
    let time = time.strip_prefix(' ')?;

    if time.contains(':') {
        return Some(s.to_string());
    }
    if time.len() != 6 {
        return None;
    }

    Some(format!(
        "{date} {}:{}:{}",
        &time[..2],
        &time[2..4],
        &time[4..]
    ))
}

/// Measures scale and total digits of `value` rendered at 14 significant
/// digits, and checks the declared limits. Values that render without a
/// fractional part pass unchecked.
fn check_numeric_bounds(name: &str, def: &ColumnDefinition, value: f64) -> OpalResult<()> {
    let rendered = format_significant(value, NUMERIC_SIGNIFICANT_DIGITS);

    let Some((int_part, frac_part)) = rendered.split_once('.') else {
        return Ok(());
    };

    let scale = frac_part.len();
    let precision = int_part.chars().filter(char::is_ascii_digit).count() + scale;

    if let Some(max_scale) = def.scale {
        if scale > max_scale as usize {
            return Err(OpalError::schema(format!(
                "column {name} has too many digits after the decimal point"
            )));
        }
    }
    if let Some(max_precision) = def.precision {
        if precision > max_precision as usize {
            return Err(OpalError::schema(format!("column {name} is too large")));
        }
    }

    Ok(())
}

fn check_integer_bounds(name: &str, data_type: DataType, value: i64) -> OpalResult<()> {
    match data_type {
        DataType::Int | DataType::Integer => {
            if value > i64::from(i32::MAX) {
                return Err(OpalError::schema(format!(
                    "column {name} is too large for INT/INTEGER"
                )));
            }
        }
        DataType::SmallInt => {
            if value > i64::from(i16::MAX) {
                return Err(OpalError::schema(format!(
                    "column {name} is too large for SMALLINT"
                )));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Renders a float with at most `digits` significant digits, trailing zeros
/// trimmed. Mirrors C's `%.14g` for the fixed-notation range this layer
/// cares about.
fn format_significant(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }

    let exponent = value.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= digits as i32 {
        return format!("{value:e}");
    }

    let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
    let fixed = format!("{value:.decimals$}");
    if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        fixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_col(len: u32) -> ColumnDefinition {
        ColumnDefinition::new(DataType::Char).length(len)
    }

    #[test]
    fn test_data_type_parse_aliases() {
        assert_eq!("char".parse::<DataType>().unwrap(), DataType::Char);
        assert_eq!("INTEGER".parse::<DataType>().unwrap(), DataType::Integer);
        assert_eq!("Bool".parse::<DataType>().unwrap(), DataType::Bool);
        assert!("VARCHAR2".parse::<DataType>().is_err());
    }

    #[test]
    fn test_definition_requires_length() {
        let def = ColumnDefinition::new(DataType::Char);
        assert!(validate_definition("c", &def).is_err());
        assert!(validate_definition("c", &char_col(8)).is_ok());
    }

    #[test]
    fn test_definition_requires_precision_scale() {
        let def = ColumnDefinition::new(DataType::Decimal);
        assert!(validate_definition("d", &def).is_err());

        let def = ColumnDefinition::new(DataType::Decimal).precision_scale(10, 2);
        assert!(validate_definition("d", &def).is_ok());
    }

    #[test]
    fn test_sequence_rules() {
        let ok = ColumnDefinition::new(DataType::Int)
            .sequence()
            .unique()
            .not_null();
        assert!(validate_definition("id", &ok).is_ok());

        let not_unique = ColumnDefinition::new(DataType::Int).sequence().not_null();
        assert!(validate_definition("id", &not_unique).is_err());

        let not_int = ColumnDefinition::new(DataType::Text)
            .sequence()
            .unique()
            .not_null();
        assert!(validate_definition("id", &not_int).is_err());

        let smallint = ColumnDefinition::new(DataType::SmallInt)
            .sequence()
            .unique()
            .not_null();
        assert!(validate_definition("id", &smallint).is_err());
    }

    #[test]
    fn test_schema_single_sequence() {
        let schema = TableSchema::new()
            .with_column(
                "a",
                ColumnDefinition::new(DataType::Int).sequence().unique().not_null(),
            )
            .with_column(
                "b",
                ColumnDefinition::new(DataType::Int).sequence().unique().not_null(),
            );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_not_null_enforced() {
        let def = ColumnDefinition::new(DataType::Text).not_null();
        assert!(coerce_insert_value("t", &def, Value::Null).is_err());
    }

    #[test]
    fn test_default_applied() {
        let def = ColumnDefinition::new(DataType::Int)
            .default_value(DefaultValue::Literal(Value::Int(7)));
        assert_eq!(
            coerce_insert_value("n", &def, Value::Null).unwrap(),
            Value::Int(7)
        );

        let def = ColumnDefinition::new(DataType::Uuid).default_value(DefaultValue::NewUuid);
        assert!(matches!(
            coerce_insert_value("u", &def, Value::Null).unwrap(),
            Value::Uuid(_)
        ));

        let def =
            ColumnDefinition::new(DataType::Timestamp).default_value(DefaultValue::CurrentTimestamp);
        assert!(matches!(
            coerce_insert_value("ts", &def, Value::Null).unwrap(),
            Value::Timestamp(_)
        ));
    }

    #[test]
    fn test_char_length_and_quotes() {
        let def = char_col(4);
        assert_eq!(
            coerce_insert_value("c", &def, Value::text("'abcd'")).unwrap(),
            Value::text("abcd")
        );
        assert!(coerce_insert_value("c", &def, Value::text("abcde")).is_err());
    }

    #[test]
    fn test_integer_ranges() {
        let int_def = ColumnDefinition::new(DataType::Int);
        assert!(coerce_insert_value("i", &int_def, Value::Int(2_147_483_647)).is_ok());
        assert!(coerce_insert_value("i", &int_def, Value::Int(2_147_483_648)).is_err());

        let small_def = ColumnDefinition::new(DataType::SmallInt);
        assert!(coerce_insert_value("s", &small_def, Value::Int(32_767)).is_ok());
        assert!(coerce_insert_value("s", &small_def, Value::Int(32_768)).is_err());
    }

    #[test]
    fn test_numeric_scale_precision() {
        let def = ColumnDefinition::new(DataType::Decimal).precision_scale(5, 2);
        assert!(coerce_insert_value("d", &def, Value::Float(123.45)).is_ok());
        // three digits after the decimal point
        assert!(coerce_insert_value("d", &def, Value::Float(1.234)).is_err());
        // six total digits
        assert!(coerce_insert_value("d", &def, Value::Float(1234.56)).is_err());
        // no fractional part renders, so no check applies
        assert!(coerce_insert_value("d", &def, Value::Float(1234567.0)).is_ok());
    }

    #[test]
    fn test_temporal_parsing() {
        let def = ColumnDefinition::new(DataType::Date);
        let v = coerce_insert_value("d", &def, Value::text("'2024-09-14'")).unwrap();
        assert_eq!(v.stringify(), "2024-09-14 00:00:00");
        assert!(coerce_insert_value("d", &def, Value::text("14/09/2024")).is_err());

        let def = ColumnDefinition::new(DataType::Timestamp);
        let compact = coerce_insert_value("t", &def, Value::text("2024-09-14 153201")).unwrap();
        assert_eq!(compact.stringify(), "2024-09-14 15:32:01");
        let colons = coerce_insert_value("t", &def, Value::text("2024-09-14 15:32:01")).unwrap();
        assert_eq!(compact, colons);

        let def = ColumnDefinition::new(DataType::Time);
        let v = coerce_insert_value("t", &def, Value::text("06:30:00")).unwrap();
        assert_eq!(v.stringify(), "1970-01-01 06:30:00");
    }

    #[test]
    fn test_uuid_validation() {
        let def = ColumnDefinition::new(DataType::Uuid);
        let v = coerce_insert_value(
            "u",
            &def,
            Value::text("67e55044-10b1-426f-9247-bb680e5fe0c8"),
        )
        .unwrap();
        assert!(matches!(v, Value::Uuid(_)));
        assert!(coerce_insert_value("u", &def, Value::text("not-a-uuid")).is_err());
    }

    #[test]
    fn test_binary_hex() {
        let def = ColumnDefinition::new(DataType::Blob);
        assert_eq!(
            coerce_insert_value("b", &def, Value::text("0xdeadbeef")).unwrap(),
            Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert!(coerce_insert_value("b", &def, Value::text("zz")).is_err());

        let def = ColumnDefinition::new(DataType::Binary).length(4);
        assert!(coerce_insert_value("b", &def, Value::text("beef")).is_ok());
        assert!(coerce_insert_value("b", &def, Value::text("deadbeef")).is_err());
    }

    #[test]
    fn test_update_coercion_narrow() {
        // update leaves temporal text alone
        let def = ColumnDefinition::new(DataType::Timestamp);
        assert_eq!(
            coerce_update_value("t", &def, Value::text("whatever")).unwrap(),
            Value::text("whatever")
        );

        let def = char_col(2);
        assert!(coerce_update_value("c", &def, Value::text("abc")).is_err());

        let def = ColumnDefinition::new(DataType::SmallInt);
        assert!(coerce_update_value("s", &def, Value::Int(40_000)).is_err());
    }

    #[test]
    fn test_format_significant() {
        assert_eq!(format_significant(10.5, 14), "10.5");
        assert_eq!(format_significant(0.125, 14), "0.125");
        assert_eq!(format_significant(1234567.0, 14), "1234567");
        assert_eq!(format_significant(-2.5, 14), "-2.5");
    }
}
