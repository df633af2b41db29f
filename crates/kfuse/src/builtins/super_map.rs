//! ConfigMaps and Secrets that may be generated in another layer
//!
//! As a generator this behaves like the plain map generator.
//!
//! As a transformer it looks for a document of the same kind and name:
//! - found: the configured `data` is merged into it, then it is renamed to its new content hash
//!   and every reference to it is repaired
//! - not found and `assumeTargetWillExist` (default): the document is generated only to learn
//!   the hashed name it will get wherever it is really generated; references are repaired to
//!   that name and the generated document is dropped again
//! - not found otherwise: nothing happens
//!
//! ```yaml
//! apiVersion: kfuse/v1
//! kind: SuperConfigMap
//! metadata:
//!   name: settings
//! data:
//!   LOG_LEVEL: debug
//! assumeTargetWillExist: true
//! prefix: ""
//! configurations:
//! - references.yaml
//! ```
use super::data_map::MapDecorator;
use crate::content_hash::ContentNamer;
use crate::document::Document;
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::path_matcher;
use crate::plugin::{decode_config, Generator, PluginHelpers, Transformer};
use crate::reference::{ReferenceRepairer, ReferenceRules, Rename};
use crate::value::{Object, Value};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuperMapArgs {
    pub assume_target_will_exist: bool,
    pub prefix: String,
    /// Reference rule files merged over the builtin rules
    pub configurations: Vec<String>,
}

impl Default for SuperMapArgs {
    fn default() -> Self {
        Self {
            assume_target_will_exist: true,
            prefix: String::new(),
            configurations: vec![],
        }
    }
}

#[derive(Default)]
pub struct SuperMap<D> {
    args: SuperMapArgs,
    decorator: D,
    rules: ReferenceRules,
    namer: ContentNamer,
}

impl<D: MapDecorator> SuperMap<D> {
    fn configure_all(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()> {
        self.decorator.configure(helpers, config)?;
        self.args = decode_config(self.decorator.kind(), config)?;
        self.rules = ReferenceRules::load(helpers.loader(), &self.args.configurations)?;
        Ok(())
    }

    fn repair(&self, store: &mut DocumentStore, renames: &[Rename]) -> Result<()> {
        ReferenceRepairer::new(&self.rules).repair(store, renames)?;
        Ok(())
    }

    /// Merges data into the existing document and renames it to its new hash
    #[tracing::instrument(level = "trace", skip_all)]
    fn merge(&self, store: &mut DocumentStore, document: Document) -> Result<()> {
        let id = document.id();
        tracing::info!(%id, "merging into existing document");

        let mut merged = document;
        self.append_data(&mut merged)?;

        if self.decorator.hashing_disabled() {
            return store
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(id.clone()))?
                .set_tree(merged.tree().clone());
        }

        let original = merged.original_id();
        let mut unsuffixed = merged.clone();
        unsuffixed.set_name(&original.name);
        let suffixed = self.namer.suffixed_name(&unsuffixed)?;

        let target = id.with_name(&suffixed);
        if target != id && store.get(&target).is_some() {
            return Err(Error::DuplicateIdentity(target));
        }

        store.remove(&id)?;
        merged.store_previous_id();
        merged.set_name(&suffixed);
        store.append(merged)?;

        let mut renames = vec![Rename::new(id.clone(), suffixed.clone())];
        if original != id {
            renames.push(Rename::new(original, suffixed));
        }
        self.repair(store, &renames)
    }

    fn append_data(&self, document: &mut Document) -> Result<()> {
        let Value::Object(tree) = document.tree_mut() else {
            return Err(Error::InvalidDocument(self.decorator.name().to_string()));
        };

        let data = tree
            .entry("data".to_string())
            .or_insert_with(|| Value::Object(Object::new()));
        if data.is_null() {
            *data = Value::Object(Object::new());
        }
        let found = data.type_name();
        let Value::Object(data) = data else {
            return Err(Error::TypeMismatch {
                path: "data".into(),
                expected: "object",
                found,
            });
        };

        for (key, value) in self.decorator.config_data() {
            let value = match value {
                Value::String(text) if self.decorator.should_encode() => {
                    Value::String(path_matcher::encode(text))
                }
                other => other.clone(),
            };
            data.insert(key.clone(), value);
        }
        Ok(())
    }

    /// Computes the name the document will have once generated elsewhere and repairs
    /// references to it; the document itself is not kept
    #[tracing::instrument(level = "trace", skip_all)]
    fn resolve_future_name(&mut self, store: &mut DocumentStore) -> Result<()> {
        tracing::info!(
            kind = self.decorator.kind(),
            name = self.decorator.name(),
            "resolving name of a document generated elsewhere"
        );

        if self.decorator.namespace().is_empty() {
            let namespace = store
                .get_by_index(0)
                .map(|first| first.namespace().to_string())
                .unwrap_or_default();
            if !namespace.is_empty() {
                self.decorator.set_namespace(&namespace);
            }
        }

        let scaffold = self.decorator.build()?;
        let start = scaffold.id();
        store.append(scaffold)?;

        let mut current = start.clone();
        let mut renames = vec![];
        if !self.args.prefix.is_empty() {
            let prefixed = format!("{}{}", self.args.prefix, start.name);
            store.rename(&current, &prefixed)?;
            renames.push(current.clone());
            current = current.with_name(prefixed);
        }

        let scaffold = store
            .get(&current)
            .ok_or_else(|| Error::NotFound(current.clone()))?;
        let suffixed = self.namer.suffixed_name(scaffold)?;
        store.rename(&current, &suffixed)?;
        renames.push(current.clone());

        let renames: Vec<_> = renames
            .into_iter()
            .map(|from| Rename::new(from, suffixed.clone()))
            .collect();
        self.repair(store, &renames)?;

        store.remove(&current.with_name(suffixed.as_str()))?;
        tracing::debug!(id=%start, name=%suffixed, "scaffold dropped");
        Ok(())
    }
}

impl<D: MapDecorator> Generator for SuperMap<D> {
    fn configure(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()> {
        self.configure_all(helpers, config)
    }

    fn generate(&mut self, store: &DocumentStore) -> Result<DocumentStore> {
        self.decorator.generate(store)
    }
}

impl<D: MapDecorator> Transformer for SuperMap<D> {
    fn configure(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()> {
        self.configure_all(helpers, config)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn transform(&mut self, store: &mut DocumentStore) -> Result<()> {
        let kind = self.decorator.kind();
        let existing = store.find(kind, self.decorator.name()).cloned();

        match existing {
            Some(document) => self.merge(store, document),
            None if self.args.assume_target_will_exist && !self.decorator.hashing_disabled() => {
                self.resolve_future_name(store)
            }
            None => {
                tracing::info!(
                    kind,
                    name = self.decorator.name(),
                    assume_target_will_exist = self.args.assume_target_will_exist,
                    hashing_disabled = self.decorator.hashing_disabled(),
                    "document not found, nothing to do"
                );
                Ok(())
            }
        }
    }
}
