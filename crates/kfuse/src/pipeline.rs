//! build pipeline
//!
//! A build runs in three steps:
//! 1. generators, in declared order; each sees the documents generated before it
//! 2. one reference repair for every generated document that got a hashed name
//! 3. transformers, in declared order, against the complete store
//!
//! The first error ends the build, no partial result is returned.
//!
//! A build directory holds a `kfuse.yaml`:
//! ```yaml
//! resources:
//! - deployment.yaml
//! - ../base
//! generators:
//! - generators.yaml
//! transformers:
//! - transformers.yaml
//! configurations:
//! - references.yaml
//! ```
//! Generator and transformer files hold one or more plugin configuration documents.
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::plugin::{Generator, Loader, PluginHelpers, Registry, Transformer};
use crate::reference::{ReferenceRepairer, ReferenceRules, Rename};
use crate::value::Value;
use serde::Deserialize;
use std::path::Path;

pub const BUILD_FILE: &str = "kfuse.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Files or directories of documents
    pub resources: Vec<String>,
    /// Files of generator configurations
    pub generators: Vec<String>,
    /// Files of transformer configurations
    pub transformers: Vec<String>,
    /// Reference rule files merged over the builtin rules
    pub configurations: Vec<String>,
}

impl BuildConfig {
    pub fn load(loader: &Loader) -> Result<Self> {
        Ok(serde_yaml::from_str(&loader.load(BUILD_FILE)?)?)
    }
}

pub struct Pipeline<'r> {
    registry: &'r Registry,
    helpers: PluginHelpers,
    rules: ReferenceRules,
    generators: Vec<(String, Box<dyn Generator>)>,
    transformers: Vec<(String, Box<dyn Transformer>)>,
}

impl<'r> Pipeline<'r> {
    pub fn new(registry: &'r Registry, helpers: PluginHelpers) -> Self {
        Self {
            registry,
            helpers,
            rules: ReferenceRules::builtin(),
            generators: vec![],
            transformers: vec![],
        }
    }

    /// Rules used to repair references to hashed generator output
    pub fn with_rules(self, rules: ReferenceRules) -> Self {
        Self { rules, ..self }
    }

    /// Instantiates and configures the generator selected by the `kind` of `config`
    pub fn add_generator(&mut self, config: &Value) -> Result<()> {
        let kind = plugin_kind(config)?;
        let mut generator = self.registry.generator(&kind)?;
        generator.configure(&self.helpers, config)?;
        self.generators.push((kind, generator));
        Ok(())
    }

    /// Instantiates and configures the transformer selected by the `kind` of `config`
    pub fn add_transformer(&mut self, config: &Value) -> Result<()> {
        let kind = plugin_kind(config)?;
        let mut transformer = self.registry.transformer(&kind)?;
        transformer.configure(&self.helpers, config)?;
        self.transformers.push((kind, transformer));
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn run(&mut self, resources: DocumentStore) -> Result<DocumentStore> {
        let mut store = resources;

        for (kind, generator) in self.generators.iter_mut() {
            let generated = generator.generate(&store)?;
            tracing::info!(kind = %kind, documents = generated.len(), "generated");
            store.append_all(generated)?;
        }

        let renames: Vec<_> = store
            .iter()
            .filter(|document| !document.previous_ids().is_empty())
            .map(|document| Rename::new(document.original_id(), document.name().to_string()))
            .collect();
        ReferenceRepairer::new(&self.rules).repair(&mut store, &renames)?;

        for (kind, transformer) in self.transformers.iter_mut() {
            transformer.transform(&mut store)?;
            store.ensure_unique()?;
            tracing::info!(kind = %kind, documents = store.len(), "transformed");
        }

        Ok(store)
    }
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("generators", &self.generators.iter().map(|(kind, _)| kind).collect::<Vec<_>>())
            .field("transformers", &self.transformers.iter().map(|(kind, _)| kind).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn plugin_kind(config: &Value) -> Result<String> {
    config
        .get("kind")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidDocument("plugin configuration without kind".into()))
}

/// Every document of a yaml stream, without requiring a name
fn plugin_configs(yaml: &str) -> Result<Vec<Value>> {
    let mut configs = vec![];
    for part in serde_yaml::Deserializer::from_str(yaml) {
        let value = Value::deserialize(part)?;
        if !value.is_null() {
            configs.push(value);
        }
    }
    Ok(configs)
}

/// Builds the directory `dir` as described by its `kfuse.yaml`
#[tracing::instrument(level = "debug", skip(registry))]
pub fn build(dir: &Path, registry: &Registry) -> Result<DocumentStore> {
    let loader = Loader::new(dir);
    let config = BuildConfig::load(&loader)?;

    let mut resources = DocumentStore::new();
    for path in &config.resources {
        resources.load_path(&loader.resolve(path))?;
    }

    let rules = ReferenceRules::load(&loader, &config.configurations)?;
    let mut pipeline = Pipeline::new(registry, PluginHelpers::new(loader.clone())).with_rules(rules);
    for path in &config.generators {
        for plugin in plugin_configs(&loader.load(path)?)? {
            pipeline.add_generator(&plugin)?;
        }
    }
    for path in &config.transformers {
        for plugin in plugin_configs(&loader.load(path)?)? {
            pipeline.add_transformer(&plugin)?;
        }
    }

    pipeline.run(resources)
}
