// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Nested context scopes attached to every document built on a thread.
//!
//! A [`ContextStack`] belongs to one thread (it is `!Sync`). Each
//! [`ContextStack::push`] adds a frame of named mappings and returns a guard
//! that pops the frame when dropped, panics included. When a document is
//! built the frames are collapsed outermost first, so an inner scope's keys
//! override an outer scope's keys of the same name.

use crate::document::value::FieldValue;
use crate::error::ShipperError;
use serde_json::{Map, Value};
use std::cell::RefCell;

type Frame = Vec<(String, FieldValue)>;

#[derive(Debug, Default)]
pub struct ContextStack {
    frames: RefCell<Vec<Frame>>,
}

impl ContextStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a scope with the given named contexts.
    ///
    /// Every value must be a mapping; otherwise nothing is pushed and
    /// [`ShipperError::InvalidContext`] names the offending key.
    pub fn push<I, K, V>(&self, contexts: I) -> Result<ContextGuard<'_>, ShipperError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let frame: Frame = contexts
            .into_iter()
            .map(|(name, data)| (name.into(), data.into()))
            .collect();

        if let Some((name, _)) = frame.iter().find(|(_, data)| !data.is_mapping()) {
            return Err(ShipperError::InvalidContext(name.clone()));
        }

        let mut frames = self.frames.borrow_mut();
        let depth = frames.len();
        frames.push(frame);

        Ok(ContextGuard { stack: self, depth })
    }

    /// Runs `f` inside a scope with the given contexts.
    pub fn scope<I, K, V, F, R>(&self, contexts: I, f: F) -> Result<R, ShipperError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
        F: FnOnce() -> R,
    {
        let _guard = self.push(contexts)?;
        Ok(f())
    }

    /// Whether any scope is currently entered.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.frames.borrow().is_empty()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Deep-merges all frames, outermost first, into one JSON object.
    #[must_use]
    pub fn collapse(&self) -> Map<String, Value> {
        let mut collapsed = Map::new();
        for frame in self.frames.borrow().iter() {
            for (name, data) in frame {
                let Value::Object(data) = data.to_json() else {
                    continue;
                };
                match collapsed.get_mut(name) {
                    Some(existing) => deep_merge(existing, data),
                    None => {
                        collapsed.insert(name.clone(), Value::Object(data));
                    }
                }
            }
        }
        collapsed
    }
}

/// Leaves the scope it was created for when dropped.
#[must_use = "the context is removed as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ContextGuard<'a> {
    stack: &'a ContextStack,
    depth: usize,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.stack.frames.borrow_mut().truncate(self.depth);
    }
}

fn deep_merge(target: &mut Value, source: Map<String, Value>) {
    let Value::Object(target) = target else {
        *target = Value::Object(source);
        return;
    };
    for (key, value) in source {
        match value {
            Value::Object(inner) if target.get(&key).is_some_and(Value::is_object) => {
                if let Some(existing) = target.get_mut(&key) {
                    deep_merge(existing, inner);
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::value::SharedMap;
    use serde_json::json;
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn test_empty_stack() {
        let stack = ContextStack::new();
        assert!(!stack.exists());
        assert!(stack.collapse().is_empty());
    }

    #[test]
    fn test_scope_is_removed_on_drop() {
        let stack = ContextStack::new();
        {
            let _guard = stack
                .push([("user", json!({"id": 1}))])
                .expect("mapping context");
            assert!(stack.exists());
            assert_eq!(stack.collapse()["user"], json!({"id": 1}));
        }
        assert!(!stack.exists());
    }

    #[test]
    fn test_nested_contexts_deep_merge() {
        let stack = ContextStack::new();
        let _outer = stack
            .push([("request", json!({"id": "abc", "meta": {"a": 1, "b": 2}}))])
            .expect("mapping context");
        let _inner = stack
            .push([
                ("request", json!({"meta": {"b": 3}, "user": "me"})),
                ("job", json!({"name": "import"})),
            ])
            .expect("mapping context");

        assert_eq!(stack.depth(), 2);
        assert_eq!(
            Value::Object(stack.collapse()),
            json!({
                "request": {"id": "abc", "meta": {"a": 1, "b": 3}, "user": "me"},
                "job": {"name": "import"},
            })
        );
    }

    #[test]
    fn test_invalid_context_is_rejected() {
        let stack = ContextStack::new();
        let result = stack.push([
            ("good", FieldValue::from(json!({"k": "v"}))),
            ("bad", FieldValue::from("not a mapping")),
        ]);

        match result {
            Err(ShipperError::InvalidContext(name)) => assert_eq!(name, "bad"),
            other => panic!("expected InvalidContext, got {other:?}"),
        }
        assert!(!stack.exists());
    }

    #[test]
    fn test_scope_restored_after_panic() {
        let stack = ContextStack::new();
        let _outer = stack
            .push([("outer", json!({"kept": true}))])
            .expect("mapping context");

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _inner = stack
                .push([("inner", json!({"lost": true}))])
                .expect("mapping context");
            panic!("boom");
        }));

        assert!(result.is_err());
        assert_eq!(stack.depth(), 1);
        assert_eq!(Value::Object(stack.collapse()), json!({"outer": {"kept": true}}));
    }

    #[test]
    fn test_scope_helper() {
        let stack = ContextStack::new();
        let seen = stack
            .scope([("user", json!({"id": 7}))], || stack.collapse())
            .expect("mapping context");
        assert_eq!(seen["user"]["id"], json!(7));
        assert!(!stack.exists());
    }

    #[test]
    fn test_shared_map_context_is_sanitized() {
        let circular = SharedMap::new();
        let egg = SharedMap::new();
        circular.insert("egg", egg.clone());
        egg.insert("chicken", circular.clone());

        let stack = ContextStack::new();
        let _guard = stack.push([("data", circular)]).expect("mapping context");

        let collapsed = stack.collapse();
        assert_eq!(
            collapsed["data"]["egg"]["chicken"],
            json!(crate::constants::CIRCULAR_REFERENCE_PLACEHOLDER)
        );
    }
}
