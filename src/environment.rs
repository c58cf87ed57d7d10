use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::object::Object;

/// A lexical scope. Closures hold their defining scope through an `Rc`, so a
/// scope lives as long as any function created in it.
#[derive(Default)]
pub struct Environment {
    values: RefCell<FxHashMap<String, Object>>,
    parent: Option<Rc<Environment>>,
}

impl Environment {
    pub fn new(parent: Option<Rc<Environment>>) -> Rc<Self> {
        Rc::new(Self {
            values: RefCell::new(FxHashMap::default()),
            parent,
        })
    }

    pub fn new_enclosed(outer: &Rc<Environment>) -> Rc<Self> {
        Self::new(Some(Rc::clone(outer)))
    }

    pub fn get(&self, name: &str) -> Option<Object> {
        if let Some(value) = self.values.borrow().get(name) {
            Some(value.clone())
        } else if let Some(parent) = &self.parent {
            parent.get(name)
        } else {
            None
        }
    }

    /// Bind `name` in this scope only, shadowing any outer binding.
    pub fn set(&self, name: impl Into<String>, value: Object) {
        self.values.borrow_mut().insert(name.into(), value);
    }

    /// Rebind `name` in the nearest scope that already binds it, or bind it
    /// here when no scope does.
    pub fn assign(&self, name: &str, value: Object) {
        if let Err(value) = self.assign_existing(name, value) {
            self.set(name, value);
        }
    }

    fn assign_existing(&self, name: &str, value: Object) -> Result<(), Object> {
        if let Some(slot) = self.values.borrow_mut().get_mut(name) {
            *slot = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign_existing(name, value),
            None => Err(value),
        }
    }
}
