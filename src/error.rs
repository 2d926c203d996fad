// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::graph::NodeId;
use crate::protected::ProtectedOp;
use crate::registry::RegistryError;
use crate::Rc;

use core::fmt;
use thiserror::Error;

type String = Rc<str>;

pub type Result<T, E = FreezeError> = core::result::Result<T, E>;

/// Identifies a constructor argument in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentRef {
    Position(usize),
    Keyword(String),
}

impl fmt::Display for ArgumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentRef::Position(index) => write!(f, "at position {index}"),
            ArgumentRef::Keyword(name) => write!(f, "'{name}'"),
        }
    }
}

/// Errors raised while freezing values or constructing instances.
#[derive(Debug, Error)]
pub enum FreezeError {
    /// A constructor argument cannot be hashed and the class has no hash reducer.
    #[error("{type_name} initialized with unhashable argument {argument}: {value}")]
    Construction {
        type_name: String,
        argument: ArgumentRef,
        value: alloc::string::String,
    },

    /// A protected operation was attempted on a frozen value or a locked instance.
    #[error("{type_name} does not support {} ({})", operation.description(), operation.category())]
    ForbiddenMutation {
        type_name: String,
        operation: ProtectedOp,
    },

    /// The graph being frozen contains a reference cycle through `node`.
    #[error("reference cycle detected: node {node} is reachable from itself")]
    CyclicGraph { node: NodeId },

    /// A host object behaved inconsistently with the wrapping contract.
    #[error("{type_name}.{attribute}: {reason}")]
    TypeMismatch {
        type_name: String,
        attribute: String,
        reason: alloc::string::String,
    },

    #[error("unhashable {kind} cannot be used as a {role}")]
    Unhashable {
        kind: &'static str,
        role: &'static str,
    },

    #[error("'{type_name}' object has no attribute '{attribute}'")]
    NoAttribute { type_name: String, attribute: String },

    #[error("initializer of {type_name} failed: {message}")]
    Initializer {
        type_name: String,
        message: alloc::string::String,
    },

    /// A host callback (native attribute, function, reducer) failed.
    #[error("{type_name} raised: {message}")]
    Host {
        type_name: String,
        message: alloc::string::String,
    },

    #[error("node {0} does not exist in this graph")]
    InvalidNode(NodeId),

    /// An operation the mutable node kind does not support.
    #[error("{0}")]
    Graph(alloc::string::String),

    #[error("persistence failed: {0}")]
    Persistence(alloc::string::String),

    #[error("class '{0}' is not registered")]
    UnknownClass(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl FreezeError {
    pub(crate) fn forbidden(type_name: impl Into<String>, operation: ProtectedOp) -> Self {
        FreezeError::ForbiddenMutation {
            type_name: type_name.into(),
            operation,
        }
    }

    pub(crate) fn graph(message: impl Into<alloc::string::String>) -> Self {
        FreezeError::Graph(message.into())
    }

    /// Recover an engine error that travelled through a host callback, or wrap
    /// the host's own failure.
    pub(crate) fn from_host(type_name: &str, error: anyhow::Error) -> Self {
        match error.downcast::<FreezeError>() {
            Ok(e) => e,
            Err(e) => FreezeError::Host {
                type_name: type_name.into(),
                message: alloc::format!("{e:#}"),
            },
        }
    }

    pub(crate) fn from_initializer(type_name: &str, error: anyhow::Error) -> Self {
        match error.downcast::<FreezeError>() {
            Ok(e) => e,
            Err(e) => FreezeError::Initializer {
                type_name: type_name.into(),
                message: alloc::format!("{e:#}"),
            },
        }
    }

    pub fn is_forbidden_mutation(&self) -> bool {
        matches!(self, FreezeError::ForbiddenMutation { .. })
    }
}
