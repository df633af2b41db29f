use crate::document::Document;
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::util;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads files relative to the build directory
#[derive(Debug, Clone)]
pub struct Loader {
    root: PathBuf,
}

impl Loader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` joined onto the root unless it is absolute, lexically cleaned
    pub fn resolve(&self, path: &str) -> PathBuf {
        util::clean_path(&self.root.join(path))
    }

    pub fn load(&self, path: &str) -> Result<String> {
        let path = self.resolve(path);
        tracing::debug!(path=%path.display(), "loading");
        std::fs::read_to_string(&path).map_err(|source| Error::Load { path, source })
    }
}

pub trait Validator {
    /// Document names
    fn validate_name(&self, name: &str) -> std::result::Result<(), String>;

    /// Keys of ConfigMap and Secret data
    fn validate_data_key(&self, key: &str) -> std::result::Result<(), String>;
}

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid name regex")
});

static DATA_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-._a-zA-Z0-9]+$").expect("valid data key regex"));

/// DNS subdomain names, data keys of alphanumerics, `-`, `_` and `.`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValidator;

impl Validator for DefaultValidator {
    fn validate_name(&self, name: &str) -> std::result::Result<(), String> {
        if name.len() > 253 {
            return Err(format!("name '{name}' is longer than 253 characters"));
        }
        if !NAME.is_match(name) {
            return Err(format!(
                "name '{name}' must consist of lower case alphanumerics, '-' or '.'"
            ));
        }
        Ok(())
    }

    fn validate_data_key(&self, key: &str) -> std::result::Result<(), String> {
        if key.len() > 253 {
            return Err(format!("key '{key}' is longer than 253 characters"));
        }
        if key == "." || key == ".." || !DATA_KEY.is_match(key) {
            return Err(format!(
                "key '{key}' must consist of alphanumerics, '-', '_' or '.'"
            ));
        }
        Ok(())
    }
}

/// Builds document stores for plugin output
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentFactory;

impl DocumentFactory {
    pub fn from_documents(&self, documents: impl IntoIterator<Item = Document>) -> Result<DocumentStore> {
        let mut store = DocumentStore::new();
        for document in documents {
            store.append(document)?;
        }
        Ok(store)
    }

    pub fn from_yaml(&self, yaml: &str) -> Result<DocumentStore> {
        DocumentStore::from_yaml_str(yaml)
    }
}

/// Collaborators handed to every plugin on configuration
#[derive(Clone)]
pub struct PluginHelpers {
    loader: Loader,
    factory: DocumentFactory,
    validator: Arc<dyn Validator + Send + Sync>,
}

impl PluginHelpers {
    pub fn new(loader: Loader) -> Self {
        Self {
            loader,
            factory: DocumentFactory,
            validator: Arc::new(DefaultValidator),
        }
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn factory(&self) -> &DocumentFactory {
        &self.factory
    }

    pub fn validator(&self) -> &(dyn Validator + Send + Sync) {
        self.validator.as_ref()
    }
}

impl std::fmt::Debug for PluginHelpers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHelpers")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve() {
        let loader = Loader::new("/work/overlay");
        assert_eq!(loader.resolve("../base/a.yaml"), PathBuf::from("/work/base/a.yaml"));
        assert_eq!(loader.resolve("/etc/b.yaml"), PathBuf::from("/etc/b.yaml"));
    }

    #[test]
    fn missing_file() {
        let loader = Loader::new("/does/not/exist");
        assert!(matches!(loader.load("a.yaml"), Err(Error::Load { .. })));
    }

    #[test]
    fn names_and_keys() {
        let validator = DefaultValidator;
        assert!(validator.validate_name("app-config.v1").is_ok());
        assert!(validator.validate_name("App").is_err());
        assert!(validator.validate_name("-app").is_err());

        assert!(validator.validate_data_key("app.properties").is_ok());
        assert!(validator.validate_data_key("DB_HOST").is_ok());
        assert!(validator.validate_data_key("a/b").is_err());
        assert!(validator.validate_data_key("..").is_err());
    }
}
