//! Reducer-typed state management
//!
//! Session state is a JSON object. Nodes return partial updates; the
//! [`StateSchema`] decides, per field, how an update combines with the
//! current value. Fields without a registered reducer are overwritten -
//! accumulator fields (transcripts, metric lists, token counters) register
//! append or sum reducers so node updates can stay small deltas.
//!
//! The reducer receives `(current, update)` and returns the merged value,
//! which keeps merge semantics explicit instead of leaning on any
//! language-level default.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// State structure is invalid (e.g. not an object when expected)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Reducer encountered incompatible types or failed to merge
    #[error("Reducer error: {0}")]
    ReducerError(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Trait for reducing/merging state values.
///
/// Reducers define how multiple writes to the same state field combine
/// across node executions.
pub trait Reducer: Send + Sync {
    /// Apply an update to the current value (which may be null).
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value>;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;
}

/// Replaces the current value with the update. Default when no reducer is
/// registered for a field.
#[derive(Debug, Clone)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> Result<Value> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Appends the update to the current array.
///
/// Array + array concatenates; array + scalar pushes; null initializes.
/// Used for transcripts and per-phase metric lists.
#[derive(Debug, Clone)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Array(curr), Value::Array(upd)) => {
                let mut result = curr.clone();
                result.extend_from_slice(upd);
                Ok(Value::Array(result))
            }
            (Value::Null, Value::Array(upd)) => Ok(Value::Array(upd.clone())),
            (Value::Array(curr), single) => {
                let mut result = curr.clone();
                result.push(single.clone());
                Ok(Value::Array(result))
            }
            (Value::Null, single) => Ok(Value::Array(vec![single.clone()])),
            _ => Err(StateError::ReducerError(
                "append reducer requires the current value to be an array or null".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Merges the update object into the current object, key by key.
///
/// Top-level keys from the update replace keys in the current object;
/// missing keys are preserved. Used for per-domain fact/artifact/debug maps
/// where each domain contributes its own entry.
#[derive(Debug, Clone)]
pub struct MergeReducer;

impl Reducer for MergeReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Object(curr), Value::Object(upd)) => {
                let mut result = curr.clone();
                for (k, v) in upd {
                    result.insert(k.clone(), v.clone());
                }
                Ok(Value::Object(result))
            }
            (Value::Null, Value::Object(upd)) => Ok(Value::Object(upd.clone())),
            _ => Err(StateError::ReducerError(
                "merge reducer requires object values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "merge"
    }
}

/// Adds the numeric update to the current numeric value.
///
/// Null initializes to the update. Used for token accumulators.
#[derive(Debug, Clone)]
pub struct SumReducer;

impl Reducer for SumReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        let curr = match current {
            Value::Null => 0,
            Value::Number(n) => n.as_i64().ok_or_else(|| {
                StateError::ReducerError("sum reducer requires integer values".to_string())
            })?,
            _ => {
                return Err(StateError::ReducerError(
                    "sum reducer requires numeric values".to_string(),
                ))
            }
        };
        let upd = update.as_i64().ok_or_else(|| {
            StateError::ReducerError("sum reducer requires integer updates".to_string())
        })?;
        Ok(Value::from(curr + upd))
    }

    fn name(&self) -> &str {
        "sum"
    }
}

/// Per-field reducer registry applied to every node update.
#[derive(Default)]
pub struct StateSchema {
    reducers: HashMap<String, Box<dyn Reducer>>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reducer for a field. Fields without one are overwritten.
    pub fn add_field(&mut self, field: impl Into<String>, reducer: Box<dyn Reducer>) {
        self.reducers.insert(field.into(), reducer);
    }

    /// Builder-style variant of [`add_field`](Self::add_field).
    pub fn with_field(mut self, field: impl Into<String>, reducer: Box<dyn Reducer>) -> Self {
        self.add_field(field, reducer);
        self
    }

    /// Fold `update` into `state`, field by field.
    pub fn apply(&self, state: &mut Value, update: &Value) -> Result<()> {
        let update_map = match update {
            Value::Object(map) => map,
            Value::Null => return Ok(()),
            _ => {
                return Err(StateError::InvalidState(
                    "node updates must be JSON objects".to_string(),
                ))
            }
        };

        let state_map = state.as_object_mut().ok_or_else(|| {
            StateError::InvalidState("state must be a JSON object".to_string())
        })?;

        for (field, new_value) in update_map {
            let current = state_map.get(field).cloned().unwrap_or(Value::Null);
            let merged = match self.reducers.get(field) {
                Some(reducer) => reducer.reduce(&current, new_value)?,
                None => new_value.clone(),
            };
            state_map.insert(field.clone(), merged);
        }
        Ok(())
    }

    pub fn fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.reducers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overwrite_replaces_value() {
        let r = OverwriteReducer;
        assert_eq!(r.reduce(&json!("old"), &json!("new")).unwrap(), json!("new"));
    }

    #[test]
    fn append_concatenates_and_initializes() {
        let r = AppendReducer;
        assert_eq!(
            r.reduce(&json!([1, 2]), &json!([3])).unwrap(),
            json!([1, 2, 3])
        );
        assert_eq!(r.reduce(&Value::Null, &json!([1])).unwrap(), json!([1]));
        assert_eq!(r.reduce(&json!([1]), &json!(2)).unwrap(), json!([1, 2]));
    }

    #[test]
    fn merge_is_per_key() {
        let r = MergeReducer;
        let merged = r
            .reduce(
                &json!({"flowise": {"a": 1}, "other": true}),
                &json!({"flowise": {"b": 2}}),
            )
            .unwrap();
        assert_eq!(merged, json!({"flowise": {"b": 2}, "other": true}));
    }

    #[test]
    fn sum_accumulates_integers() {
        let r = SumReducer;
        assert_eq!(r.reduce(&json!(100), &json!(42)).unwrap(), json!(142));
        assert_eq!(r.reduce(&Value::Null, &json!(7)).unwrap(), json!(7));
        assert!(r.reduce(&json!("x"), &json!(1)).is_err());
    }

    #[test]
    fn schema_applies_registered_reducers() {
        let schema = StateSchema::new()
            .with_field("messages", Box::new(AppendReducer))
            .with_field("total_tokens", Box::new(SumReducer));

        let mut state = json!({"messages": ["hi"], "total_tokens": 10, "plan": "a"});
        schema
            .apply(
                &mut state,
                &json!({"messages": ["there"], "total_tokens": 5, "plan": "b"}),
            )
            .unwrap();

        assert_eq!(state["messages"], json!(["hi", "there"]));
        assert_eq!(state["total_tokens"], json!(15));
        assert_eq!(state["plan"], json!("b"));
    }

    #[test]
    fn null_update_is_noop() {
        let schema = StateSchema::new();
        let mut state = json!({"a": 1});
        schema.apply(&mut state, &Value::Null).unwrap();
        assert_eq!(state, json!({"a": 1}));
    }
}
