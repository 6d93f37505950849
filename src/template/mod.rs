//! Placeholder substitution and the built-in template registry
//!
//! Templates use `${name}` placeholders. Rendering never fails: a placeholder
//! with no value is copied to the output untouched, which lets the start
//! script keep its own shell variables and lets one value set serve several
//! templates.

use std::collections::HashMap;

use regex::{Captures, Regex};

/// Built-in template names
pub mod names {
    /// Server configuration file
    pub const SERVER_CONFIG: &str = "my.cnf";
    /// Start script
    pub const START_SCRIPT: &str = "start.sh";
}

lazy_static::lazy_static! {
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    static ref REGISTRY: HashMap<&'static str, &'static str> = {
        let mut templates = HashMap::new();
        templates.insert(names::SERVER_CONFIG, include_str!("../../templates/my.cnf.in"));
        templates.insert(names::START_SCRIPT, include_str!("../../templates/start.sh.in"));
        templates
    };
}

/// Look up a built-in template by name
pub fn get(name: &str) -> Option<&'static str> {
    REGISTRY.get(name).copied()
}

/// Names of every built-in template
pub fn available() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Substitute `${key}` placeholders in `template` with `values`.
///
/// Values are inserted literally; the output is not scanned again.
pub fn render(template: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
