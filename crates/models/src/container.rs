use std::collections::HashMap;

/// Handle to an environment provisioned by the runtime client.
///
/// The id is assigned by the substrate when the environment is created and never changes
/// afterwards. Variable bindings are attached to the handle and handed to every exec as the
/// process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    id: String,
    env: HashMap<String, String>,
}

/// Strips every whitespace character from a variable name, wherever it appears.
pub fn sanitize_variable_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

impl Container {
    /// Wraps an id a substrate returned from `create`. Only the runtime client should call
    /// this; a handle with any other id refers to nothing.
    #[doc(hidden)]
    pub fn new(id: impl Into<String>) -> Self {
        Container {
            id: id.into(),
            env: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Adds (or overwrites) a variable binding. The name is sanitized first, so names that
    /// only differ in whitespace refer to the same binding.
    pub fn add_variable(&mut self, name: &str, value: impl Into<String>) {
        self.env.insert(sanitize_variable_name(name), value.into());
    }

    /// Removes a variable binding if present.
    pub fn remove_variable(&mut self, name: &str) {
        self.env.remove(&sanitize_variable_name(name));
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.env
            .get(&sanitize_variable_name(name))
            .map(|value| value.as_str())
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Bindings in quoted `NAME='VALUE'` form, sorted by name.
    pub fn exported_variables(&self) -> Vec<String> {
        self.sorted()
            .into_iter()
            .map(|(key, value)| format!("{}='{}'", key, value.replace('\'', "'\\''")))
            .collect()
    }

    /// Bindings in raw `NAME=VALUE` form, sorted by name. The engine passes each entry
    /// verbatim to the process, so no quoting is applied here.
    pub fn env_bindings(&self) -> Vec<String> {
        self.sorted()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }

    fn sorted(&self) -> Vec<(&String, &String)> {
        let mut pairs: Vec<_> = self.env.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}
