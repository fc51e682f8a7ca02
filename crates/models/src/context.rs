use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Values threaded from step to step and from job to job.
///
/// Steps never mutate the context they receive; they return a new one which becomes the
/// input of the next step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataContext(BTreeMap<String, Value>);

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String view of a value. Numbers and booleans are rendered, other kinds yield `None`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Consuming insert, handy when building a step's output from its input.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DataContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        DataContext(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_leaves_source_untouched() {
        let input = DataContext::new().with("a", "1");
        let output = input.clone().with("b", 2);

        assert_eq!(input.len(), 1);
        assert_eq!(output.len(), 2);
        assert_eq!(output.get_str("a").as_deref(), Some("1"));
        assert_eq!(output.get_str("b").as_deref(), Some("2"));
    }

    #[test]
    fn test_get_str_rejects_structured_values() {
        let ctx: DataContext = [("list", serde_json::json!([1, 2]))].into_iter().collect();
        assert!(ctx.contains_key("list"));
        assert_eq!(ctx.get_str("list"), None);
        assert_eq!(ctx.get_str("missing"), None);
    }
}
