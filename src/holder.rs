//! The ordered key/value tree that DSSAT readers return.
//!
//! A [`DataHolder`] maps string keys to a [`Value`]: raw text, a nested holder,
//! or a list of records (one holder per data line of a table). Keys keep the
//! order they were first inserted in at every level.
//!
//! ```
//! use dssatformat::holder::{DataHolder, Value};
//!
//! let mut root = DataHolder::new();
//! root.holder_entry("experiment").insert("exname", Value::from("UFGA8201"));
//! root.insert("Z", Value::from("UFGA8201.ZIP"));
//!
//! assert_eq!(root.keys().collect::<Vec<_>>(), vec!["experiment", "Z"]);
//! assert_eq!(root.get_holder("experiment").and_then(|h| h.get_text("exname")), Some("UFGA8201"));
//! ```

/// A value stored in a [`DataHolder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Holder(DataHolder),
    Records(Vec<DataHolder>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(s) = self { Some(s) } else { None }
    }

    pub fn as_holder(&self) -> Option<&DataHolder> {
        if let Value::Holder(h) = self { Some(h) } else { None }
    }

    pub fn as_records(&self) -> Option<&[DataHolder]> {
        if let Value::Records(r) = self { Some(r) } else { None }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DataHolder> for Value {
    fn from(value: DataHolder) -> Self {
        Value::Holder(value)
    }
}


/// An insertion-ordered map from string keys to [`Value`]s.
///
/// Holders are small (a few dozen keys at most), so lookups are linear scans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataHolder {
    entries: Vec<(String, Value)>
}

impl DataHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Insert a value under `key`, returning the value it replaced.
    ///
    /// Replacing a key keeps its original position.
    pub fn insert<K: Into<String>>(&mut self, key: K, value: Value) -> Option<Value> {
        let key = key.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    pub fn get_holder(&self, key: &str) -> Option<&DataHolder> {
        self.get(key).and_then(Value::as_holder)
    }

    pub fn get_records(&self, key: &str) -> Option<&[DataHolder]> {
        self.get(key).and_then(Value::as_records)
    }

    /// Return the nested holder under `key`, inserting an empty one first if the
    /// key is absent or holds something other than a holder.
    pub fn holder_entry<K: Into<String>>(&mut self, key: K) -> &mut DataHolder {
        let key = key.into();
        let i = match self.position(&key) {
            Some(i) => {
                if !matches!(self.entries[i].1, Value::Holder(_)) {
                    self.entries[i].1 = Value::Holder(DataHolder::new());
                }
                i
            },
            None => {
                self.entries.push((key, Value::Holder(DataHolder::new())));
                self.entries.len() - 1
            }
        };

        match &mut self.entries[i].1 {
            Value::Holder(h) => h,
            _ => unreachable!("entry was just made a holder"),
        }
    }

    /// Append a record to the list under `key`, creating the list if needed.
    ///
    /// A non-list value already under `key` is replaced by a new list.
    pub fn push_record<K: Into<String>>(&mut self, key: K, record: DataHolder) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => match &mut self.entries[i].1 {
                Value::Records(r) => r.push(record),
                other => *other = Value::Records(vec![record]),
            },
            None => self.entries.push((key, Value::Records(vec![record]))),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for DataHolder {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut holder = DataHolder::new();
        for (k, v) in iter {
            holder.insert(k, v);
        }
        holder
    }
}

impl IntoIterator for DataHolder {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer {
        match self {
            Value::Text(s) => serializer.serialize_str(s),
            Value::Holder(h) => h.serialize(serializer),
            Value::Records(r) => serializer.collect_seq(r),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for DataHolder {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> DataHolder {
        pairs.iter().map(|(k, v)| (*k, Value::from(*v))).collect()
    }

    #[test]
    fn test_insert_keeps_position() {
        let mut h = record(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let old = h.insert("a", Value::from("9"));
        assert_eq!(old, Some(Value::from("1")));
        assert_eq!(h.keys().collect::<Vec<_>>(), vec!["a", "b", "c"], "Overwriting moved the key");
        assert_eq!(h.get_text("a"), Some("9"));
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_holder_entry() {
        let mut h = DataHolder::new();
        h.holder_entry("fields").insert("id_field", Value::from("UFGA0001"));
        h.holder_entry("fields").insert("wsta", Value::from("UFGA"));
        let fields = h.get_holder("fields").expect("'fields' should be a holder");
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["id_field", "wsta"]);

        h.insert("note", Value::from("text"));
        assert!(h.holder_entry("note").is_empty(), "A text value should be replaced by an empty holder");
    }

    #[test]
    fn test_push_record() {
        let mut h = DataHolder::new();
        h.push_record("rows", record(&[("x", "1")]));
        h.push_record("rows", record(&[("x", "2")]));
        let rows = h.get_records("rows").expect("'rows' should be records");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_text("x"), Some("2"));
        assert!(h.get_text("rows").is_none());
        assert!(h.contains_key("rows"));
        assert!(!h.contains_key("cols"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_keeps_order() {
        let mut h = DataHolder::new();
        h.insert("z", Value::from("last?"));
        h.holder_entry("a").push_record("rows", record(&[("b", " 1"), ("a", "2 ")]));
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"{"z":"last?","a":{"rows":[{"b":" 1","a":"2 "}]}}"#);
    }
}
