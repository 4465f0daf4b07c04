// Environment seeding for payload parameters
//
// Parameter types declare which environment variables may pre-fill which
// fields. Seeding is best effort: a variable whose value the target type does
// not accept is logged and ignored.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Source of environment variables
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Maps an environment variable onto a (dotted) field path of the JSON form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvBinding {
    pub field: &'static str,
    pub var: &'static str,
}

impl EnvBinding {
    pub const fn new(field: &'static str, var: &'static str) -> Self {
        Self { field, var }
    }
}

/// Apply `bindings` to `doc`, the JSON form of a `T`
///
/// Each value is first tried as a JSON scalar (so `3306` can fill a number
/// field) and then as a plain string. Returns how many bindings were applied.
pub fn seed<T: DeserializeOwned>(
    doc: &mut Value,
    bindings: &[EnvBinding],
    env: &dyn EnvSource,
) -> usize {
    let mut applied = 0;

    for binding in bindings {
        let Some(raw) = env.var(binding.var) else {
            continue;
        };

        let mut candidates = Vec::with_capacity(2);
        if let Ok(parsed) = serde_json::from_str::<Value>(&raw) {
            if !parsed.is_null() {
                candidates.push(parsed);
            }
        }
        candidates.push(Value::String(raw));

        let accepted = candidates.into_iter().find_map(|candidate| {
            let mut trial = doc.clone();
            if !set_path(&mut trial, binding.field, candidate) {
                return None;
            }
            serde_json::from_value::<T>(trial.clone()).ok().map(|_| trial)
        });

        match accepted {
            Some(trial) => {
                *doc = trial;
                applied += 1;
                debug!(var = binding.var, field = binding.field, "Seeded field from environment");
            }
            None => {
                warn!(
                    var = binding.var,
                    field = binding.field,
                    "env parse error, ignore environment variable for payload"
                );
            }
        }
    }

    applied
}

/// Set a dotted path inside a JSON object, creating intermediate objects
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> bool {
    let mut current = doc;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        let Some(object) = current.as_object_mut() else {
            return false;
        };
        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return true;
        }
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    false
}
