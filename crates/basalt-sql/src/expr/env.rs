use std::rc::Rc;

use basalt_document::{FieldBuffer, Value};

use super::CURRENT_VALUE;

/// A bound query parameter: named (`$name`) or positional (`?`).
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Option<String>,
    pub value: Value,
}

impl Param {
    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Param {
            name: Some(name.into()),
            value,
        }
    }

    pub fn positional(value: Value) -> Self {
        Param { name: None, value }
    }
}

/// A lexical scope used during evaluation: local bindings, the parameter
/// list, and an optional outer scope. Environments chain along the operator
/// pipeline; each operator that synthesizes a new current value wraps the
/// incoming environment rather than mutating it. The chain is strictly
/// tree-shaped, so shared ancestry is reference-counted without cycles.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    params: Vec<Param>,
    buf: FieldBuffer,
    outer: Option<Rc<Environment>>,
}

impl Environment {
    pub fn new(params: Vec<Param>) -> Self {
        Environment {
            params,
            buf: FieldBuffer::new(),
            outer: None,
        }
    }

    /// A fresh local scope whose lookups fall through to `outer`.
    pub fn wrap(outer: Rc<Environment>) -> Self {
        Environment {
            params: Vec::new(),
            buf: FieldBuffer::new(),
            outer: Some(outer),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self.buf.get(name) {
            Some(v) => Some(v.clone()),
            None => self.outer.as_ref()?.get(name),
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.buf.set(name, value);
    }

    pub fn get_current_value(&self) -> Option<Value> {
        self.get(CURRENT_VALUE)
    }

    pub fn set_current_value(&mut self, value: Value) {
        self.set(CURRENT_VALUE, value);
    }

    pub fn get_param_by_name(&self, name: &str) -> Option<Value> {
        let local = self
            .params
            .iter()
            .find(|p| p.name.as_deref() == Some(name));
        match local {
            Some(p) => Some(p.value.clone()),
            None => self.outer.as_ref()?.get_param_by_name(name),
        }
    }

    /// Positional parameters are numbered from 1.
    pub fn get_param_by_index(&self, index: usize) -> Option<Value> {
        if index == 0 {
            return None;
        }
        match self.params.get(index - 1) {
            Some(p) => Some(p.value.clone()),
            None => self.outer.as_ref()?.get_param_by_index(index),
        }
    }
}
