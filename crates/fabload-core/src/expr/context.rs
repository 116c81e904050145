//! Run-scoped variable store backing `$set(name,value)` and `${name}`.

use std::collections::HashMap;
use std::sync::RwLock;

/// Name → last-set value.
///
/// One context is created per run and shared by every task of that run. The
/// map is internally synchronized, so concurrent groups may read and write it
/// safely, but a `$set` in one group is not ordered against a `${}` in another.
/// Inside one group members run in order, so set-then-reference holds there.
#[derive(Debug, Default)]
pub struct VariableContext {
    vars: RwLock<HashMap<String, String>>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut vars = self.vars.write().unwrap_or_else(|e| e.into_inner());
        vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let vars = self.vars.read().unwrap_or_else(|e| e.into_inner());
        vars.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.vars.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
