//! # kfuse - layered resource composition
//!
//! `kfuse` reads a set of resource documents, runs generator and transformer plugins over them
//! and renders the result. Builds can be layered: the output of one directory is a resource of
//! the next.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `kfuse` works internally.
//!
//! ### Documents
//!
//! A document is a tree of [value::Value]s with an identity ([resid::ResId]): group, version,
//! kind, namespace and name. A [documents::DocumentStore] holds documents in order and never
//! holds two documents with the same identity.
//!
//! ```yaml
//! apiVersion: apps/v1        # group "apps", version "v1"
//! kind: Deployment
//! metadata:
//!   name: web
//!   namespace: prod
//! spec:
//!   template:
//!     spec:
//!       containers:
//!       - name: web
//!         envFrom:
//!         - configMapRef:
//!             name: settings  # a name reference to ConfigMap "settings"
//! ```
//!
//! ### Addressing fields
//!
//! Plugins target whole documents with a [selector::Selector] and fields inside them with a
//! [field_path::FieldPath]. [path_matcher] walks a tree along a path:
//! - map keys descend, lists are broadcast over unless a segment picks elements
//! - missing keys end the walk, or get created when asked to
//! - values of a Secret's `data` are base64 decoded before a mutator sees them
//!
//! ### Names and references
//!
//! Generated ConfigMaps and Secrets get a name suffix derived from their content
//! ([content_hash::ContentNamer]), so a changed payload rolls out as a new object. Renaming a
//! document breaks every field that refers to it by name. [reference::ReferenceRules] list the
//! referring fields per kind and [reference::ReferenceRepairer] rewrites them after a batch of
//! renames.
//!
//! When a layer configures data for a map that is only generated in another layer, it still
//! needs the final hashed name. The super map transformers compute it by generating a scaffold,
//! hashing it and repairing references, then drop the scaffold again
//! (see [builtins::SuperMap]). This only works because the hash is deterministic.
//!
//! ### Pipeline
//!
//! see [pipeline]
//!
//! | **step**     | **plugins**                                                    |
//! |--------------|----------------------------------------------------------------|
//! | generate     | `ConfigMapGenerator`, `SecretGenerator`, `SuperConfigMap`, ... |
//! | repair names | hashed generator output                                        |
//! | transform    | `SuperConfigMap`, `SearchReplace`, `SelectivePatch`, ...       |
//!
//! Plugins are created from a [plugin::Registry] by the `kind` of their configuration document.
//!
//! ### Output
//!
//! The final store is rendered as a yaml stream, or as a json list.
//!
pub mod builtins;
pub mod content_hash;
pub mod document;
pub mod documents;
pub mod error;
pub mod field_path;
pub mod path_matcher;
pub mod pipeline;
pub mod plugin;
pub mod reference;
pub mod resid;
pub mod selector;
mod util;
pub mod value;
mod visit;

pub use error::{Error, Result};
