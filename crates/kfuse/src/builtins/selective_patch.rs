//! merge patches for selected documents
//!
//! ```yaml
//! apiVersion: kfuse/v1
//! kind: SelectivePatch
//! metadata:
//!   name: web
//! enabled: true
//! patches:
//! - path: patch.yaml
//!   target:
//!     name: web
//! - patch: |
//!     apiVersion: apps/v1
//!     kind: Deployment
//!     metadata:
//!       name: web
//!     spec:
//!       replicas: 3
//! ```
//!
//! A patch without `target` applies to the document with the patch's own kind and name. Patches
//! never change the identity of their target: `apiVersion`, `kind`, `metadata.name` and
//! `metadata.namespace` of a patch are ignored.
//!
//! Merging:
//! - maps are merged key by key, a `null` value deletes the key
//! - lists whose elements all carry a `name` are merged element by element
//! - anything else replaces the target value
//!
//! Nothing is patched unless `enabled` is set.
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::plugin::{decode_config, PluginHelpers, Transformer};
use crate::selector::Selector;
use crate::value::Value;
use serde::Deserialize;

const KIND: &str = "SelectivePatch";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchArgs {
    /// File holding the patch documents
    pub path: String,
    /// Inline patch documents
    pub patch: String,
    pub target: Option<Selector>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectivePatchArgs {
    pub enabled: bool,
    pub patches: Vec<PatchArgs>,
}

#[derive(Debug, Clone)]
struct Patch {
    target: Selector,
    tree: Value,
}

#[derive(Debug, Default)]
pub struct SelectivePatch {
    enabled: bool,
    patches: Vec<Patch>,
}

impl SelectivePatch {
    fn load(helpers: &PluginHelpers, args: &PatchArgs) -> Result<Vec<Patch>> {
        let yaml = match (args.path.is_empty(), args.patch.is_empty()) {
            (false, true) => helpers.loader().load(&args.path)?,
            (true, false) => args.patch.clone(),
            _ => {
                return Err(Error::configuration(
                    KIND,
                    "every patch needs exactly one of path or patch",
                ))
            }
        };

        let documents = helpers.factory().from_yaml(&yaml)?;
        let patches = documents
            .iter()
            .map(|document| {
                let target = args.target.clone().unwrap_or_else(|| Selector {
                    group: document.gvk().group,
                    version: document.gvk().version,
                    kind: document.kind().to_string(),
                    namespace: document.namespace().to_string(),
                    name: document.name().to_string(),
                    ..Default::default()
                });
                Patch {
                    target,
                    tree: without_identity(document.tree().clone()),
                }
            })
            .collect();
        Ok(patches)
    }
}

impl Transformer for SelectivePatch {
    fn configure(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()> {
        let args: SelectivePatchArgs = decode_config(KIND, config)?;
        self.enabled = args.enabled;
        self.patches = vec![];
        for patch in &args.patches {
            self.patches.extend(Self::load(helpers, patch)?);
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn transform(&mut self, store: &mut DocumentStore) -> Result<()> {
        if !self.enabled {
            tracing::info!(patches = self.patches.len(), "patches disabled, nothing to do");
            return Ok(());
        }

        for patch in &self.patches {
            let targets = store.select_mut(&patch.target)?;
            if targets.is_empty() {
                tracing::debug!(selector = %patch.target, "patch matched no document");
            }
            for document in targets {
                let mut tree = document.tree().clone();
                merge(&mut tree, patch.tree.clone());
                document.set_tree(tree)?;
                tracing::debug!(id = ?document.id(), "patched");
            }
        }
        Ok(())
    }
}

fn without_identity(tree: Value) -> Value {
    let Value::Object(mut tree) = tree else {
        return tree;
    };
    tree.shift_remove("apiVersion");
    tree.shift_remove("kind");

    if let Some(Value::Object(metadata)) = tree.get_mut("metadata") {
        metadata.shift_remove("name");
        metadata.shift_remove("namespace");
        if metadata.is_empty() {
            tree.shift_remove("metadata");
        }
    }
    Value::Object(tree)
}

fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.shift_remove(&key);
                    continue;
                }
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(patch))
            if !patch.is_empty() && keyed_by_name(target.as_slice()) && keyed_by_name(&patch) =>
        {
            for item in patch {
                let name = item.get("name").cloned();
                match target
                    .iter_mut()
                    .find(|existing| existing.get("name") == name.as_ref())
                {
                    Some(existing) => merge(existing, item),
                    None => target.push(item),
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

fn keyed_by_name(items: &[Value]) -> bool {
    items
        .iter()
        .all(|item| item.get("name").is_some_and(Value::is_scalar))
}
