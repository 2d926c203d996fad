// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_debug_implementations)] // registry internals are not debug logged

//! Process-wide registries consulted while freezing.
//!
//! * classes: name to [`Class`](crate::Class), used to rebuild nested instances
//!   from persisted bytes;
//! * mutable attributes: type name to the attribute names that are never
//!   frozen (the exclusion registry);
//! * frozen types: host type names whose objects are already immutable.
//!
//! All registries are safe to read from several threads at once.

use crate::instance::Class;
use crate::Rc;

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::fmt;
use dashmap::DashMap;

type String = Rc<str>;


/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyExists { name: String, registry: String },
    InvalidName { name: String, registry: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists { name, registry } => {
                write!(
                    f,
                    "{registry} registration failed: An item with the name '{name}' is already registered."
                )
            }
            RegistryError::InvalidName { name, registry } => {
                write!(f, "{registry} registration failed: The name '{name}' is invalid (empty or whitespace-only names are not allowed).")
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Validates that a name is not empty or whitespace-only.
pub fn validate_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() {
        Err(RegistryError::InvalidName {
            name: String::from(name),
            registry: String::from(registry_name),
        })
    } else {
        Ok(())
    }
}

/// Generic thread-safe registry for items of type T using DashMap.
pub struct Registry<T> {
    inner: DashMap<String, Rc<T>>,
    name: String,
}

impl<T> Registry<T> {
    /// Create a new, empty registry with a given name.
    pub fn new(registry_name: impl Into<String>) -> Self {
        Self {
            inner: DashMap::new(),
            name: registry_name.into(),
        }
    }

    /// Get the name of this registry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an item with a given name. Returns Err if name already exists.
    pub fn register(&self, name: impl Into<String>, item: Rc<T>) -> Result<(), RegistryError> {
        let name = name.into();
        validate_name(&name, &self.name)?;

        use dashmap::mapref::entry::Entry;
        match self.inner.entry(name) {
            Entry::Occupied(e) => Err(RegistryError::AlreadyExists {
                name: e.key().clone(),
                registry: self.name.clone(),
            }),
            Entry::Vacant(e) => {
                e.insert(item);
                Ok(())
            }
        }
    }

    /// Insert or replace the item under `name` with the result of `f`, which
    /// receives the current item if there is one. The entry is locked while
    /// `f` runs.
    pub fn update(
        &self,
        name: impl Into<String>,
        f: impl FnOnce(Option<&T>) -> T,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        validate_name(&name, &self.name)?;

        use dashmap::mapref::entry::Entry;
        match self.inner.entry(name) {
            Entry::Occupied(mut e) => {
                let item = f(Some(e.get().as_ref()));
                e.insert(Rc::new(item));
            }
            Entry::Vacant(e) => {
                e.insert(Rc::new(f(None)));
            }
        }
        Ok(())
    }

    /// Retrieve an item by name, if it exists.
    pub fn get(&self, name: &str) -> Option<Rc<T>> {
        self.inner.get(name).map(|entry| Rc::clone(entry.value()))
    }

    /// Remove an item by name. Returns the removed item if it existed.
    pub fn remove(&self, name: &str) -> Option<Rc<T>> {
        self.inner.remove(name).map(|(_, v)| v)
    }

    /// List all registered item names.
    pub fn list_names(&self) -> Vec<String> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Check if an item with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Try to register an item, but don't fail if the name already exists.
    /// Returns Ok(true) if the item was registered, Ok(false) if the name already exists.
    pub fn try_register(
        &self,
        name: impl Into<String>,
        item: Rc<T>,
    ) -> Result<bool, RegistryError> {
        match self.register(name, item) {
            Ok(()) => Ok(true),
            Err(RegistryError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Names of attributes excluded from freezing for one type.
pub type AttributeSet = BTreeSet<String>;

/// Global registry instances
pub mod instances {
    use super::*;

    lazy_static::lazy_static! {
        /// Classes that nested instances can be restored through.
        pub static ref CLASS_REGISTRY: Registry<Class> = Registry::new("CLASS_REGISTRY");
    }

    lazy_static::lazy_static! {
        /// Attribute names that stay mutable, keyed by type name.
        pub static ref MUTABLE_ATTRIBUTE_REGISTRY: Registry<AttributeSet> =
            Registry::new("MUTABLE_ATTRIBUTE_REGISTRY");
    }

    lazy_static::lazy_static! {
        /// Host types treated as already immutable.
        pub static ref FROZEN_TYPE_REGISTRY: Registry<()> = Registry::new("FROZEN_TYPE_REGISTRY");
    }
}

/// Macro to generate helper functions for registry operations.
macro_rules! generate_registry_helpers {
    ($registry_var:ident, $item_type:ty, $item_description:literal, $item_description_plural:literal) => {
        #[doc = concat!("Retrieve a ", $item_description, " by name.")]
        pub fn get(name: &str) -> Option<Rc<$item_type>> {
            $registry_var.get(name)
        }

        #[doc = concat!("Remove a ", $item_description, " by name.")]
        pub fn remove(name: &str) -> Option<Rc<$item_type>> {
            $registry_var.remove(name)
        }

        #[doc = concat!("List all registered ", $item_description, " names.")]
        pub fn list_names() -> Vec<String> {
            $registry_var.list_names()
        }

        #[doc = concat!("Check if a ", $item_description, " with the given name exists.")]
        pub fn contains(name: &str) -> bool {
            $registry_var.contains(name)
        }

        #[doc = concat!("Get the number of registered ", $item_description_plural, ".")]
        pub fn len() -> usize {
            $registry_var.len()
        }

        #[doc = concat!("Check if the ", $item_description, " registry is empty.")]
        pub fn is_empty() -> bool {
            $registry_var.is_empty()
        }
    };
}

/// Helper functions for the class registry.
pub mod classes {
    use super::instances::CLASS_REGISTRY;
    use super::*;

    /// Register a class under its own name.
    pub fn register(class: Class) -> Result<(), RegistryError> {
        let name: String = class.name().into();
        CLASS_REGISTRY.register(name, Rc::new(class))
    }

    generate_registry_helpers!(CLASS_REGISTRY, Class, "class", "classes");
}

/// Helper functions for the exclusion registry.
pub mod mutable_attributes {
    use super::instances::MUTABLE_ATTRIBUTE_REGISTRY;
    use super::*;

    /// Add `names` to the attributes excluded for `type_name`. Repeated
    /// registrations accumulate.
    pub fn register<'a>(
        type_name: &str,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), RegistryError> {
        let names: Vec<String> = names.into_iter().map(String::from).collect();
        for name in &names {
            validate_name(name, MUTABLE_ATTRIBUTE_REGISTRY.name())?;
        }
        MUTABLE_ATTRIBUTE_REGISTRY.update(type_name, |existing| {
            let mut set = existing.cloned().unwrap_or_default();
            set.extend(names);
            set
        })
    }

    /// True if `attribute` is excluded for any type in `lineage`.
    pub fn excludes(lineage: &[String], attribute: &str) -> bool {
        lineage.iter().any(|t| {
            MUTABLE_ATTRIBUTE_REGISTRY
                .get(t)
                .is_some_and(|set| set.contains(attribute))
        })
    }

    generate_registry_helpers!(
        MUTABLE_ATTRIBUTE_REGISTRY,
        AttributeSet,
        "mutable attribute set",
        "mutable attribute sets"
    );
}

/// Helper functions for the frozen-type registry.
pub mod frozen_types {
    use super::instances::FROZEN_TYPE_REGISTRY;
    use super::*;

    /// Mark `type_name` as inherently immutable. Registering twice is a no-op.
    pub fn register(type_name: &str) -> Result<(), RegistryError> {
        FROZEN_TYPE_REGISTRY
            .try_register(type_name, Rc::new(()))
            .map(|_| ())
    }

    generate_registry_helpers!(FROZEN_TYPE_REGISTRY, (), "frozen type", "frozen types");
}

/// Registers `class` so nested instances of it can be restored by name.
pub fn register_class(class: Class) -> Result<(), RegistryError> {
    classes::register(class)
}

pub fn lookup_class(name: &str) -> Option<Rc<Class>> {
    classes::get(name)
}

/// Excludes `names` from freezing on objects of `type_name` and of every
/// type that declares it as a base.
pub fn register_mutable_attributes<'a>(
    type_name: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), RegistryError> {
    mutable_attributes::register(type_name, names)
}

/// Marks host objects of `type_name` as already immutable: they are stored
/// as-is instead of being wrapped.
pub fn register_frozen_type(type_name: &str) -> Result<(), RegistryError> {
    frozen_types::register(type_name)
}

pub(crate) fn is_frozen_type(type_name: &str) -> bool {
    frozen_types::contains(type_name)
}

pub(crate) fn is_mutable_attribute(lineage: &[String], attribute: &str) -> bool {
    mutable_attributes::excludes(lineage, attribute)
}
