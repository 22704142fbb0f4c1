use compact_str::CompactString;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Runtime-typed scalar held by a leaf node.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Text(CompactString),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Raw JSON payload, kept as text so ordering and equality stay total.
    Json(CompactString),
}

/// Declared type of a scalar field; drives strict decoding.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScalarType {
    Boolean,
    Integer,
    Unsigned,
    Float,
    Text,
    List(Box<ScalarType>),
    Map(Box<ScalarType>),
    Json,
}

impl ScalarType {
    pub fn name(&self) -> String {
        match self {
            ScalarType::Boolean => "boolean".into(),
            ScalarType::Integer => "integer".into(),
            ScalarType::Unsigned => "unsigned".into(),
            ScalarType::Float => "float".into(),
            ScalarType::Text => "text".into(),
            ScalarType::List(inner) => format!("list<{}>", inner.name()),
            ScalarType::Map(inner) => format!("map<{}>", inner.name()),
            ScalarType::Json => "json".into(),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (ScalarType::Boolean, Value::Boolean(_)) => true,
            (ScalarType::Integer, Value::Integer(_)) => true,
            (ScalarType::Unsigned, Value::Unsigned(_)) => true,
            (ScalarType::Float, Value::Float(_)) => true,
            (ScalarType::Text, Value::Text(_)) => true,
            (ScalarType::List(inner), Value::List(items)) => {
                items.iter().all(|v| inner.matches(v))
            }
            (ScalarType::Map(inner), Value::Map(entries)) => {
                entries.values().all(|v| inner.matches(v))
            }
            (ScalarType::Json, Value::Json(_)) => true,
            _ => false,
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            ScalarType::Boolean => Value::Boolean(false),
            ScalarType::Integer => Value::Integer(0),
            ScalarType::Unsigned => Value::Unsigned(0),
            ScalarType::Float => Value::Float(0.0),
            ScalarType::Text => Value::Text(CompactString::default()),
            ScalarType::List(_) => Value::List(Vec::new()),
            ScalarType::Map(_) => Value::Map(BTreeMap::new()),
            ScalarType::Json => Value::Json("null".into()),
        }
    }
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Unsigned(_) => "unsigned",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Json(_) => "json",
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Unsigned(_) => 3,
            Value::Float(_) => 4,
            Value::Text(_) => 5,
            Value::List(_) => 6,
            Value::Map(_) => 7,
            Value::Json(_) => 8,
        }
    }

    /// The key a value yields when it backs a container key field.
    pub fn as_key(&self) -> Option<Key> {
        match self {
            Value::Integer(v) => Some(Key::Int(*v)),
            Value::Unsigned(v) => Some(Key::Uint(*v)),
            Value::Text(v) => Some(Key::Text(v.clone())),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Unsigned(a), Value::Unsigned(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (Value::Json(a), Value::Json(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Container key. Stringifies losslessly for element directory names and
/// path tokens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Int(i64),
    Uint(u64),
    Text(CompactString),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KeyType {
    Int,
    Uint,
    Text,
}

impl KeyType {
    pub fn name(self) -> &'static str {
        match self {
            KeyType::Int => "int",
            KeyType::Uint => "uint",
            KeyType::Text => "text",
        }
    }

    pub fn parse(self, token: &str) -> Option<Key> {
        match self {
            KeyType::Int => token.parse::<i64>().ok().map(Key::Int),
            KeyType::Uint => token.parse::<u64>().ok().map(Key::Uint),
            KeyType::Text => Some(Key::Text(token.into())),
        }
    }

    pub fn matches(self, key: &Key) -> bool {
        matches!(
            (self, key),
            (KeyType::Int, Key::Int(_))
                | (KeyType::Uint, Key::Uint(_))
                | (KeyType::Text, Key::Text(_))
        )
    }
}

impl Key {
    pub fn as_value(&self) -> Value {
        match self {
            Key::Int(v) => Value::Integer(*v),
            Key::Uint(v) => Value::Unsigned(*v),
            Key::Text(v) => Value::Text(v.clone()),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Key::Int(_) => KeyType::Int,
            Key::Uint(_) => KeyType::Uint,
            Key::Text(_) => KeyType::Text,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{v}"),
            Key::Uint(v) => write!(f, "{v}"),
            Key::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        Key::Uint(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(v.into())
    }
}
