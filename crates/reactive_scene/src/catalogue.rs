//! Tag → constructor registry
//!
//! Declared tags (`mesh`, `boxGeometry`, …) are resolved here to the
//! constructor that builds the engine object. The table is shared by every
//! root created with the same handle; [`Catalogue::global`] is the
//! thread's shared instance. Registration is additive: there is no removal,
//! and a later registration for the same tag replaces the earlier one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::engine::{PropValue, SceneObject};

/// Constructor building an engine object from constructor arguments
pub type Constructor = Rc<dyn Fn(&[PropValue]) -> Result<Box<dyn SceneObject>, ConstructError>>;

/// Tag lookup failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown tag '{tag}': it is not registered in the catalogue")]
pub struct UnknownTagError {
    /// The tag that was looked up
    pub tag: String,
}

/// A constructor rejected its arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ConstructError {
    /// Human readable reason
    pub reason: String,
}

impl ConstructError {
    /// Create a construct error
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// One tag binding
#[derive(Clone)]
pub struct CatalogueEntry {
    /// Tag name
    pub tag: String,
    /// Constructor for the tag
    pub constructor: Constructor,
    /// Maximum number of constructor arguments, when known
    pub arity: Option<usize>,
}

impl fmt::Debug for CatalogueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogueEntry")
            .field("tag", &self.tag)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

thread_local! {
    static GLOBAL: Catalogue = Catalogue::new();
}

/// Shared tag registry (cheap to clone; clones share the table)
#[derive(Clone, Default)]
pub struct Catalogue {
    entries: Rc<RefCell<HashMap<String, CatalogueEntry>>>,
}

impl Catalogue {
    /// Create an empty catalogue
    pub fn new() -> Self {
        Self::default()
    }

    /// The thread's shared catalogue
    pub fn global() -> Self {
        GLOBAL.with(Clone::clone)
    }

    /// Register a constructor without an arity limit
    pub fn register<F>(&self, tag: &str, constructor: F)
    where
        F: Fn(&[PropValue]) -> Result<Box<dyn SceneObject>, ConstructError> + 'static,
    {
        self.insert(CatalogueEntry {
            tag: tag.to_string(),
            constructor: Rc::new(constructor),
            arity: None,
        });
    }

    /// Register a constructor accepting at most `arity` arguments
    pub fn register_with_arity<F>(&self, tag: &str, arity: usize, constructor: F)
    where
        F: Fn(&[PropValue]) -> Result<Box<dyn SceneObject>, ConstructError> + 'static,
    {
        self.insert(CatalogueEntry {
            tag: tag.to_string(),
            constructor: Rc::new(constructor),
            arity: Some(arity),
        });
    }

    /// Register many entries at once
    pub fn extend(&self, entries: impl IntoIterator<Item = (String, Constructor)>) {
        for (tag, constructor) in entries {
            self.insert(CatalogueEntry { tag, constructor, arity: None });
        }
    }

    fn insert(&self, entry: CatalogueEntry) {
        let mut entries = self.entries.borrow_mut();
        if let Some(existing) = entries.get(&entry.tag) {
            if Rc::ptr_eq(&existing.constructor, &entry.constructor) && existing.arity == entry.arity {
                return;
            }
            log::debug!("Catalogue entry '{}' replaced", entry.tag);
        } else {
            log::trace!("Catalogue entry '{}' registered", entry.tag);
        }
        entries.insert(entry.tag.clone(), entry);
    }

    /// Look up a tag
    pub fn resolve(&self, tag: &str) -> Result<CatalogueEntry, UnknownTagError> {
        self.entries
            .borrow()
            .get(tag)
            .cloned()
            .ok_or_else(|| UnknownTagError { tag: tag.to_string() })
    }

    /// Whether a tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.borrow().contains_key(tag)
    }

    /// Number of registered tags
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the catalogue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        let mut tags: Vec<_> = entries.keys().collect();
        tags.sort();
        f.debug_struct("Catalogue").field("tags", &tags).finish()
    }
}
