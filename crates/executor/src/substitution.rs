use lazy_static::lazy_static;
use models::DataContext;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref VARS_PATTERN: Regex =
        Regex::new(r"\$\{\{\s*vars\.([a-zA-Z0-9_-]+)\s*\}\}").unwrap();
}

const BINDING_PREFIX: &str = "ANYPIPE_VAR_";

/// A command with its `${{ vars.KEY }}` references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub script: String,
    /// Variables the script expects in its process environment.
    pub bindings: Vec<(String, String)>,
}

/// Replaces `${{ vars.KEY }}` references with values from the data context.
///
/// Values never become script text: each reference turns into a `${ANYPIPE_VAR_N}` expansion
/// and the value travels in [`Substituted::bindings`], so captured output cannot inject shell
/// syntax. Strings, numbers and booleans are substituted. Missing keys and other value types
/// are left in place with the `$` escaped so the shell does not try to expand them.
pub fn substitute_vars(command: &str, context: &DataContext) -> Substituted {
    let mut keys: Vec<String> = Vec::new();
    let mut bindings = Vec::new();

    let script = VARS_PATTERN
        .replace_all(command, |caps: &regex::Captures| {
            let key = &caps[1];
            let value = match context.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => return format!("\\${{{{ vars.{} }}}}", key),
            };

            let index = match keys.iter().position(|k| k == key) {
                Some(index) => index,
                None => {
                    keys.push(key.to_string());
                    bindings.push((format!("{}{}", BINDING_PREFIX, keys.len() - 1), value));
                    keys.len() - 1
                }
            };
            format!("${{{}{}}}", BINDING_PREFIX, index)
        })
        .into_owned();

    Substituted { script, bindings }
}
