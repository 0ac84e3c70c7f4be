//! Row-oriented records: ordered column name to value mappings.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::value::Value;

/// One row as an ordered mapping from column name to value.
///
/// Records keep their insertion order, but compare like mappings: two records
/// are equal when they hold the same columns with the same values.
#[derive(Debug, Clone, Default)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, builder style.
    pub fn with_value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Insert or replace a column value. New columns go to the end.
    pub fn insert(&mut self, column: &str, value: impl Into<Value>) -> Option<Value> {
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((column.to_string(), value));
                None
            }
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(name, _)| name == column)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the listed columns, in the listed order. Absent columns are skipped.
    pub fn project<S: AsRef<str>>(&self, columns: &[S]) -> Record {
        columns
            .iter()
            .filter_map(|c| self.get(c.as_ref()).map(|v| (c.as_ref().to_string(), v.clone())))
            .collect()
    }

    /// Split into the listed columns and everything else.
    pub fn partition<S: AsRef<str>>(&self, columns: &[S]) -> (Record, Record) {
        let (matched, rest): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .cloned()
            .partition(|(name, _)| columns.iter().any(|c| c.as_ref() == name));
        (Record { entries: matched }, Record { entries: rest })
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name).is_some_and(|v| v == value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            let k: String = k.into();
            record.insert(&k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Build a [`Record`] from `column => value` pairs.
///
/// ```
/// use rust_sqlite_records::{record, Value};
///
/// let r = record! { "id" => 1, "name" => "a" };
/// assert_eq!(r.get("id"), Some(&Value::Integer(1)));
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($col:expr => $val:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.insert($col, $val); )+
        record
    }};
}

/// Compare two record sequences as multisets: same records, any order.
pub fn records_equal(left: &[Record], right: &[Record]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut unmatched: Vec<&Record> = right.iter().collect();
    for record in left {
        match unmatched.iter().position(|r| *r == record) {
            Some(idx) => {
                unmatched.swap_remove(idx);
            }
            None => return false,
        }
    }
    true
}
