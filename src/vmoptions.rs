//! VM option snapshot parsed from the log's `CommandLine flags:` line.

use std::collections::HashMap;

use serde::Serialize;

use crate::util::{GB, KB, MB, UNKNOWN_INT};

#[derive(Clone, Debug, Default, Serialize)]
pub struct VmOptions {
    raw: String,
    options: HashMap<String, String>,
}

impl VmOptions {
    /// Parse the flag list, e.g.
    /// `-XX:MaxHeapSize=4294967296 -XX:MaxMetaspaceSize=512m -XX:+UseG1GC -Xmx4g`.
    pub fn parse(flags: &str) -> Self {
        let mut options = HashMap::new();
        for token in flags.split_whitespace() {
            if let Some(rest) = token.strip_prefix("-XX:+") {
                options.insert(rest.to_string(), "true".to_string());
            } else if let Some(rest) = token.strip_prefix("-XX:-") {
                options.insert(rest.to_string(), "false".to_string());
            } else if let Some(rest) = token.strip_prefix("-XX:") {
                if let Some((k, v)) = rest.split_once('=') {
                    options.insert(k.to_string(), v.to_string());
                }
            } else if let Some(rest) = token.strip_prefix("-Xmx") {
                options.insert("MaxHeapSize".to_string(), rest.to_string());
            } else if let Some(rest) = token.strip_prefix("-Xms") {
                options.insert("InitialHeapSize".to_string(), rest.to_string());
            } else if let Some(rest) = token.strip_prefix("-Xmn") {
                options.insert("NewSize".to_string(), rest.to_string());
            }
        }
        Self {
            raw: flags.trim().to_string(),
            options,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn bool_flag(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| v == "true")
    }

    /// Byte-valued option; UNKNOWN when absent or unparsable.
    pub fn size(&self, name: &str) -> i64 {
        self.get(name).and_then(parse_size).unwrap_or(UNKNOWN_INT)
    }

    pub fn max_heap_size(&self) -> i64 {
        self.size("MaxHeapSize")
    }

    pub fn max_metaspace_size(&self) -> i64 {
        self.size("MaxMetaspaceSize")
    }

    pub fn disable_explicit_gc(&self) -> bool {
        self.bool_flag("DisableExplicitGC").unwrap_or(false)
    }
}

/// "512m", "4g", "4294967296" → bytes.
fn parse_size(v: &str) -> Option<i64> {
    let v = v.trim();
    let (digits, unit) = match v.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => v.split_at(i),
        None => (v, ""),
    };
    let n: i64 = digits.parse().ok()?;
    match unit.to_ascii_lowercase().as_str() {
        "" | "b" => Some(n),
        "k" => Some(n * KB),
        "m" => Some(n * MB),
        "g" => Some(n * GB),
        _ => None,
    }
}
