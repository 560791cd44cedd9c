//! `ApplicationState`: a recursive JSON value mutated by snapshot/delta.

use serde_json::Value;

/// A thin wrapper so callers cannot forget that mutation only happens via
/// `replace` (full snapshot) or RFC 6902 patches — never by reaching into
/// the inner `Value` directly from outside the renderer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplicationState(Value);

impl ApplicationState {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn empty() -> Self {
        Self(Value::Null)
    }

    pub fn replace(&mut self, value: Value) {
        self.0 = value;
    }

    pub fn get(&self) -> &Value {
        &self.0
    }

    /// A fully-owned copy for external exposure: `GetState` never hands out
    /// a reference an external caller could use to mutate state behind the
    /// renderer's write lock.
    pub fn snapshot(&self) -> Value {
        self.0.clone()
    }
}
