use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};

/// Free form, JSON shaped configuration of one reader or writer.
///
/// Values are addressed with dotted paths where array elements are selected with a bracketed
/// index, as in `connection[0].table`. Cloning a [`Configuration`] is always deep, so every slice
/// owns its configuration outright.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    root: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(Self {
            root: serde_json::from_str(json)?,
        })
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Returns the value at `path`, or `None` when a segment is missing. An empty path selects
    /// the root.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in parse_path(path).ok()? {
            current = match segment {
                Segment::Key(key) => current.as_object()?.get(key)?,
                Segment::Index(index) => current.as_array()?.get(index)?,
            };
        }

        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some_and(|value| !value.is_null())
    }

    /// Returns the value at `path` as a string, rendering numbers and booleans.
    pub fn get_string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        match self.get(path)? {
            Value::Number(value) => value.as_i64(),
            Value::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            Value::Bool(value) => Some(*value),
            Value::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_list(&self, path: &str) -> Option<&Vec<Value>> {
        self.get(path)?.as_array()
    }

    /// Returns the strings of the list at `path`. A single string is treated as a one element
    /// list.
    pub fn get_string_list(&self, path: &str) -> Option<Vec<String>> {
        match self.get(path)? {
            Value::String(value) => Some(vec![value.clone()]),
            Value::Array(values) => values
                .iter()
                .map(|value| value.as_str().map(str::to_owned))
                .collect(),
            _ => None,
        }
    }

    /// Returns a deep copy of the subtree at `path`.
    pub fn get_configuration(&self, path: &str) -> Option<Configuration> {
        self.get(path).cloned().map(Configuration::from_value)
    }

    pub fn require_string(&self, path: &str) -> SyncResult<String> {
        match self.get_string(path) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => bail!(
                ErrorKind::ConfigError,
                "Missing required string setting",
                path
            ),
        }
    }

    pub fn require_i64(&self, path: &str) -> SyncResult<i64> {
        match self.get_i64(path) {
            Some(value) => Ok(value),
            None => bail!(
                ErrorKind::ConfigError,
                "Missing required integer setting",
                path
            ),
        }
    }

    pub fn require_configuration(&self, path: &str) -> SyncResult<Configuration> {
        match self.get(path) {
            Some(value) if value.is_object() => Ok(Configuration::from_value(value.clone())),
            _ => bail!(
                ErrorKind::ConfigError,
                "Missing required configuration section",
                path
            ),
        }
    }

    /// Sets the value at `path`, creating the objects leading to it. Existing values that are
    /// in the way are replaced.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> SyncResult<()> {
        let segments = parse_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            self.root = value.into();
            return Ok(());
        };

        let mut current = &mut self.root;
        for segment in parents {
            current = child_mut(current, segment);
        }

        *child_mut(current, last) = value.into();

        Ok(())
    }

    /// Removes the value at `path` and returns it.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = parse_path(path).ok()?;
        let (last, parents) = segments.split_last()?;

        let mut current = &mut self.root;
        for segment in parents {
            current = match segment {
                Segment::Key(key) => current.as_object_mut()?.get_mut(*key)?,
                Segment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
            };
        }

        match last {
            Segment::Key(key) => current.as_object_mut()?.remove(*key),
            Segment::Index(index) => {
                let array = current.as_array_mut()?;
                (*index < array.len()).then(|| array.remove(*index))
            }
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

impl From<Value> for Configuration {
    fn from(root: Value) -> Self {
        Configuration::from_value(root)
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &Segment<'_>) -> &'a mut Value {
    match segment {
        Segment::Key(key) => {
            if !value.is_object() {
                *value = Value::Object(Map::new());
            }
            let Value::Object(map) = value else {
                unreachable!("value was just replaced with an object");
            };

            map.entry(key.to_string()).or_insert(Value::Null)
        }
        Segment::Index(index) => {
            if !value.is_array() {
                *value = Value::Array(Vec::new());
            }
            let Value::Array(array) = value else {
                unreachable!("value was just replaced with an array");
            };
            if array.len() <= *index {
                array.resize(index + 1, Value::Null);
            }

            &mut array[*index]
        }
    }
}

fn parse_path(path: &str) -> SyncResult<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }

    for part in path.split('.') {
        let (key, mut indexes) = match part.find('[') {
            Some(position) => (&part[..position], &part[position..]),
            None => (part, ""),
        };

        if key.is_empty() && indexes.is_empty() {
            bail!(ErrorKind::ConfigError, "Empty configuration path segment", path);
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }

        while !indexes.is_empty() {
            let Some(end) = indexes.find(']') else {
                bail!(ErrorKind::ConfigError, "Unclosed index in configuration path", path);
            };
            if !indexes.starts_with('[') {
                bail!(ErrorKind::ConfigError, "Malformed configuration path", path);
            }

            segments.push(Segment::Index(indexes[1..end].parse()?));
            indexes = &indexes[end + 1..];
        }
    }

    Ok(segments)
}
