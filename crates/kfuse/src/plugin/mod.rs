//! plugin contract
//!
//! A plugin is configured once from its configuration document and then either
//! - generates: returns new documents ([Generator])
//! - transforms: edits the store in place ([Transformer])
//!
//! Plugins are looked up by the `kind` of their configuration document in a [Registry].
mod helpers;

pub use helpers::{DefaultValidator, DocumentFactory, Loader, PluginHelpers, Validator};

use crate::builtins;
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::value::Value;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;

pub trait Generator {
    fn configure(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()>;

    /// Produces new documents; `store` holds everything generated so far
    fn generate(&mut self, store: &DocumentStore) -> Result<DocumentStore>;
}

pub trait Transformer {
    fn configure(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()>;

    fn transform(&mut self, store: &mut DocumentStore) -> Result<()>;
}

pub type GeneratorConstructor = fn() -> Box<dyn Generator>;
pub type TransformerConstructor = fn() -> Box<dyn Transformer>;

/// Plugin constructors by kind
#[derive(Default, Clone)]
pub struct Registry {
    generators: IndexMap<String, GeneratorConstructor>,
    transformers: IndexMap<String, TransformerConstructor>,
}

impl Registry {
    /// Registry holding every plugin shipped with this crate
    pub fn builtin() -> Self {
        let mut registry = Self::default();

        registry.register_generator("ConfigMapGenerator", || {
            Box::<builtins::ConfigMapGenerator>::default()
        });
        registry.register_generator("SecretGenerator", || {
            Box::<builtins::SecretGenerator>::default()
        });
        registry.register_generator("SuperConfigMap", || Box::<builtins::SuperConfigMap>::default());
        registry.register_generator("SuperSecret", || Box::<builtins::SuperSecret>::default());

        registry.register_transformer("SuperConfigMap", || {
            Box::<builtins::SuperConfigMap>::default()
        });
        registry.register_transformer("SuperSecret", || Box::<builtins::SuperSecret>::default());
        registry.register_transformer("SearchReplace", || {
            Box::<builtins::SearchReplace>::default()
        });
        registry.register_transformer("FullPath", || Box::<builtins::FullPath>::default());
        registry.register_transformer("SuperVars", || Box::<builtins::SuperVars>::default());
        registry.register_transformer("SelectivePatch", || {
            Box::<builtins::SelectivePatch>::default()
        });
        registry.register_transformer("ImageTagTransformer", || {
            Box::<builtins::ImageTagTransformer>::default()
        });

        registry
    }

    pub fn register_generator(&mut self, kind: &str, constructor: GeneratorConstructor) {
        self.generators.insert(kind.to_string(), constructor);
    }

    pub fn register_transformer(&mut self, kind: &str, constructor: TransformerConstructor) {
        self.transformers.insert(kind.to_string(), constructor);
    }

    pub fn generator(&self, kind: &str) -> Result<Box<dyn Generator>> {
        self.generators
            .get(kind)
            .map(|constructor| constructor())
            .ok_or_else(|| Error::configuration(kind, "no generator registered for this kind"))
    }

    pub fn transformer(&self, kind: &str) -> Result<Box<dyn Transformer>> {
        self.transformers
            .get(kind)
            .map(|constructor| constructor())
            .ok_or_else(|| Error::configuration(kind, "no transformer registered for this kind"))
    }

    pub fn generator_kinds(&self) -> impl Iterator<Item = &str> {
        self.generators.keys().map(String::as_str)
    }

    pub fn transformer_kinds(&self) -> impl Iterator<Item = &str> {
        self.transformers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("generators", &self.generators.keys().collect::<Vec<_>>())
            .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Decodes a plugin configuration document into its argument struct
///
/// Unknown fields are ignored; missing required fields are a [Error::Configuration].
pub(crate) fn decode_config<T: DeserializeOwned>(plugin: &str, config: &Value) -> Result<T> {
    let yaml = serde_yaml::to_value(config)?;
    serde_yaml::from_value(yaml).map_err(|e| Error::configuration(plugin, e))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[test]
    fn builtin_kinds() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.generator_kinds().collect::<Vec<_>>(),
            vec!["ConfigMapGenerator", "SecretGenerator", "SuperConfigMap", "SuperSecret"]
        );
        assert_eq!(
            registry.transformer_kinds().collect::<Vec<_>>(),
            vec![
                "SuperConfigMap",
                "SuperSecret",
                "SearchReplace",
                "FullPath",
                "SuperVars",
                "SelectivePatch",
                "ImageTagTransformer"
            ]
        );
    }

    #[test]
    fn unknown_kind() {
        let registry = Registry::builtin();
        assert!(matches!(
            registry.transformer("ConfigMapGenerator"),
            Err(Error::Configuration { .. })
        ));
        assert!(matches!(
            Registry::default().generator("ConfigMapGenerator"),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn config_decoding() {
        #[derive(Deserialize, Debug)]
        struct Args {
            path: String,
            #[serde(default)]
            count: i64,
        }

        let config = Value::from_yaml_str("kind: Test\npath: a/b\nunknown: 1\n").unwrap();
        let args: Args = decode_config("Test", &config).unwrap();
        assert_eq!(args.path, "a/b");
        assert_eq!(args.count, 0);

        let config = Value::from_yaml_str("kind: Test\n").unwrap();
        let err = decode_config::<Args>("Test", &config).unwrap_err();
        assert!(matches!(err, Error::Configuration { plugin, .. } if plugin == "Test"));
    }
}
