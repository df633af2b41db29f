//! ConfigMap and Secret generators
//!
//! ```yaml
//! apiVersion: kfuse/v1
//! kind: ConfigMapGenerator
//! metadata:
//!   name: settings
//! literals:
//! - LOG_LEVEL=debug
//! files:
//! - app.properties
//! - custom-key=config/other.properties
//! envs:
//! - defaults.env
//! options:
//!   disableNameSuffixHash: false
//!   labels:
//!     app: web
//! ```
//!
//! Both kinds share one implementation; [MapSource] holds what differs.
use crate::content_hash::ContentNamer;
use crate::document::Document;
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::path_matcher;
use crate::plugin::{decode_config, Generator, PluginHelpers};
use crate::resid::Gvk;
use crate::value::{Object, Value};
use indexmap::IndexMap;
use serde::Deserialize;
use std::marker::PhantomData;

/// What differs between the generated kinds
pub trait MapSource {
    const KIND: &'static str;
    /// Values are stored base64 encoded
    const ENCODED: bool;

    /// Adds kind specific top level fields
    fn decorate(_tree: &mut Object, _args: &MapArgs) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigMapSource;

impl MapSource for ConfigMapSource {
    const KIND: &'static str = "ConfigMap";
    const ENCODED: bool = false;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SecretSource;

impl MapSource for SecretSource {
    const KIND: &'static str = "Secret";
    const ENCODED: bool = true;

    fn decorate(tree: &mut Object, args: &MapArgs) {
        let secret_type = args.secret_type.as_deref().unwrap_or("Opaque");
        tree.insert("type".into(), secret_type.into());
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MapMetadata {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapOptions {
    pub disable_name_suffix_hash: bool,
    pub labels: IndexMap<String, String>,
    pub annotations: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapArgs {
    pub metadata: MapMetadata,
    /// Overrides `metadata.name`
    pub name: Option<String>,
    /// Overrides `metadata.namespace`
    pub namespace: Option<String>,
    /// `key=value`
    pub literals: Vec<String>,
    /// `path` or `key=path`
    pub files: Vec<String>,
    /// files with `KEY=VALUE` lines
    pub envs: Vec<String>,
    pub data: IndexMap<String, Value>,
    pub options: MapOptions,
    #[serde(rename = "type")]
    pub secret_type: Option<String>,
}

/// Capabilities a map generator offers to [super::SuperMap]
pub trait MapDecorator: Generator {
    fn kind(&self) -> &'static str;
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;
    fn set_namespace(&mut self, namespace: &str);
    /// Data merged into an existing document
    fn config_data(&self) -> &IndexMap<String, Value>;
    fn should_encode(&self) -> bool;
    fn hashing_disabled(&self) -> bool;
    /// The generated document under its unsuffixed name
    fn build(&self) -> Result<Document>;
}

pub struct DataMapGenerator<S> {
    args: MapArgs,
    helpers: Option<PluginHelpers>,
    namer: ContentNamer,
    source: PhantomData<S>,
}

impl<S> Default for DataMapGenerator<S> {
    fn default() -> Self {
        Self {
            args: MapArgs::default(),
            helpers: None,
            namer: ContentNamer::default(),
            source: PhantomData,
        }
    }
}

impl<S: MapSource> DataMapGenerator<S> {
    fn helpers(&self) -> Result<&PluginHelpers> {
        self.helpers
            .as_ref()
            .ok_or_else(|| Error::configuration(S::KIND, "plugin was not configured"))
    }

    fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::configuration(S::KIND, format!("{}: {message}", self.name()))
    }

    /// Key value pairs from every source, in the order envs, literals, data, files
    fn pairs(&self) -> Result<Vec<(String, String)>> {
        let helpers = self.helpers()?;
        let mut pairs = vec![];

        for env in &self.args.envs {
            let contents = helpers.loader().load(env)?;
            for line in contents.lines().map(str::trim) {
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let (key, value) = line
                    .split_once('=')
                    .ok_or_else(|| self.error(format!("line '{line}' in {env} is not KEY=VALUE")))?;
                pairs.push((key.trim().to_string(), value.to_string()));
            }
        }

        for literal in &self.args.literals {
            let (key, value) = literal
                .split_once('=')
                .ok_or_else(|| self.error(format!("literal '{literal}' is not key=value")))?;
            pairs.push((key.to_string(), unquote(value).to_string()));
        }

        for (key, value) in &self.args.data {
            pairs.push((key.clone(), data_text(value)?));
        }

        for file in &self.args.files {
            let (key, path) = match file.split_once('=') {
                Some((key, path)) => (key.to_string(), path),
                None => {
                    let name = std::path::Path::new(file)
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .ok_or_else(|| self.error(format!("file '{file}' has no file name")))?;
                    (name, file.as_str())
                }
            };
            pairs.push((key, helpers.loader().load(path)?));
        }

        Ok(pairs)
    }
}

/// Text of a data value as it will be stored
fn data_text(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)?,
        scalar => scalar.scalar_text().unwrap_or_default(),
    })
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value)
}

fn string_map(map: &IndexMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
            .collect(),
    )
}

impl<S: MapSource> Generator for DataMapGenerator<S> {
    fn configure(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()> {
        self.args = decode_config(S::KIND, config)?;
        self.helpers = Some(helpers.clone());

        if self.name().is_empty() {
            return Err(Error::configuration(S::KIND, "a name is required"));
        }
        helpers
            .validator()
            .validate_name(self.name())
            .map_err(|message| self.error(message))?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(kind = S::KIND))]
    fn generate(&mut self, _store: &DocumentStore) -> Result<DocumentStore> {
        let mut document = self.build()?;

        if !self.hashing_disabled() {
            let suffixed = self.namer.suffixed_name(&document)?;
            document.store_previous_id();
            document.set_name(&suffixed);
        }

        tracing::info!(id=%document.id(), "generated");
        self.helpers()?.factory().from_documents([document])
    }
}

impl<S: MapSource> MapDecorator for DataMapGenerator<S> {
    fn kind(&self) -> &'static str {
        S::KIND
    }

    fn name(&self) -> &str {
        self.args
            .name
            .as_deref()
            .unwrap_or(&self.args.metadata.name)
    }

    fn namespace(&self) -> &str {
        self.args
            .namespace
            .as_deref()
            .unwrap_or(&self.args.metadata.namespace)
    }

    fn set_namespace(&mut self, namespace: &str) {
        self.args.namespace = Some(namespace.to_string());
    }

    fn config_data(&self) -> &IndexMap<String, Value> {
        &self.args.data
    }

    fn should_encode(&self) -> bool {
        S::ENCODED
    }

    fn hashing_disabled(&self) -> bool {
        self.args.options.disable_name_suffix_hash
    }

    fn build(&self) -> Result<Document> {
        let validator = self.helpers()?.validator();

        let mut data = Object::new();
        for (key, value) in self.pairs()? {
            validator
                .validate_data_key(&key)
                .map_err(|message| self.error(message))?;
            if data.contains_key(&key) {
                return Err(self.error(format!("duplicate key '{key}'")));
            }

            let value = if S::ENCODED {
                path_matcher::encode(&value)
            } else {
                value
            };
            data.insert(key, Value::String(value));
        }

        let mut document = Document::new(&Gvk::new("", "v1", S::KIND), self.name());
        if !self.namespace().is_empty() {
            document.set_namespace(self.namespace());
        }

        let Value::Object(tree) = document.tree_mut() else {
            return Err(Error::InvalidDocument(self.name().to_string()));
        };
        if let Some(Value::Object(metadata)) = tree.get_mut("metadata") {
            if !self.args.options.labels.is_empty() {
                metadata.insert("labels".into(), string_map(&self.args.options.labels));
            }
            if !self.args.options.annotations.is_empty() {
                metadata.insert(
                    "annotations".into(),
                    string_map(&self.args.options.annotations),
                );
            }
        }
        S::decorate(tree, &self.args);
        tree.insert("data".into(), Value::Object(data));

        Ok(document)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::plugin::Loader;
    use pretty_assertions::assert_eq;

    fn configure<G: Generator + Default>(yaml: &str) -> Result<G> {
        let mut generator = G::default();
        let helpers = PluginHelpers::new(Loader::new(env!("CARGO_MANIFEST_DIR")));
        generator.configure(&helpers, &Value::from_yaml_str(yaml).unwrap())?;
        Ok(generator)
    }

    fn generate<G: Generator + Default>(yaml: &str) -> Result<DocumentStore> {
        configure::<G>(yaml)?.generate(&DocumentStore::new())
    }

    #[test]
    fn config_map_without_hash() {
        let store = generate::<DataMapGenerator<ConfigMapSource>>(
            r#"
kind: ConfigMapGenerator
metadata:
  name: settings
  namespace: prod
literals:
- LOG_LEVEL=debug
- 'GREETING="hello world"'
options:
  disableNameSuffixHash: true
  labels:
    app: web
"#,
        )
        .unwrap();

        assert_eq!(
            store.to_yaml().unwrap(),
            r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  namespace: prod
  labels:
    app: web
data:
  LOG_LEVEL: debug
  GREETING: hello world
"#
        );
    }

    #[test]
    fn hashed_name_keeps_previous_identity() {
        let store = generate::<DataMapGenerator<ConfigMapSource>>(
            "kind: ConfigMapGenerator\nmetadata:\n  name: settings\nliterals:\n- a=b\n",
        )
        .unwrap();

        let document = store.get_by_index(0).unwrap();
        assert!(document.name().starts_with("settings-"));
        assert_eq!(document.original_id().name, "settings");
    }

    #[test]
    fn same_payload_same_name() {
        let config = "kind: ConfigMapGenerator\nmetadata:\n  name: settings\nliterals:\n- a=b\n";
        let first = generate::<DataMapGenerator<ConfigMapSource>>(config).unwrap();
        let second = generate::<DataMapGenerator<ConfigMapSource>>(config).unwrap();
        let other = generate::<DataMapGenerator<ConfigMapSource>>(&config.replace("a=b", "a=c"))
            .unwrap();

        let name = |store: &DocumentStore| store.get_by_index(0).unwrap().name().to_string();
        assert_eq!(name(&first), name(&second));
        assert_ne!(name(&first), name(&other));
    }

    #[test]
    fn secret_values_are_encoded() {
        let store = generate::<DataMapGenerator<SecretSource>>(
            "kind: SecretGenerator\nname: creds\nliterals:\n- password=hunter2\noptions:\n  disableNameSuffixHash: true\n",
        )
        .unwrap();

        assert_eq!(
            store.to_yaml().unwrap(),
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\ntype: Opaque\ndata:\n  password: aHVudGVyMg==\n"
        );
    }

    #[test]
    fn data_values_become_text() {
        let store = generate::<DataMapGenerator<ConfigMapSource>>(
            "kind: ConfigMapGenerator\nname: c\ndata:\n  replicas: 3\n  enabled: true\noptions:\n  disableNameSuffixHash: true\n",
        )
        .unwrap();

        let data = store.get_by_index(0).unwrap().tree().get("data").unwrap();
        assert_eq!(data.get("replicas"), Some(&Value::from("3")));
        assert_eq!(data.get("enabled"), Some(&Value::from("true")));
    }

    #[test]
    fn duplicate_keys() {
        let err = generate::<DataMapGenerator<ConfigMapSource>>(
            "kind: ConfigMapGenerator\nname: c\nliterals:\n- a=1\n- a=2\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn invalid_input() {
        assert!(matches!(
            configure::<DataMapGenerator<ConfigMapSource>>("kind: ConfigMapGenerator\n"),
            Err(Error::Configuration { .. })
        ));
        assert!(matches!(
            configure::<DataMapGenerator<ConfigMapSource>>("kind: ConfigMapGenerator\nname: Not_Valid\n"),
            Err(Error::Configuration { .. })
        ));
        assert!(matches!(
            generate::<DataMapGenerator<ConfigMapSource>>(
                "kind: ConfigMapGenerator\nname: c\nliterals:\n- novalue\n"
            ),
            Err(Error::Configuration { .. })
        ));
        assert!(matches!(
            generate::<DataMapGenerator<ConfigMapSource>>(
                "kind: ConfigMapGenerator\nname: c\nliterals:\n- bad/key=1\n"
            ),
            Err(Error::Configuration { .. })
        ));
    }
}
