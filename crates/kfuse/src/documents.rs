//! collection of documents ([Document] in insertion order)
//!
//! [DocumentStore] keeps
//! - the insertion order, which is also the output order
//! - identity uniqueness: no two documents share a [ResId] at any time
//!
//! Every operation that could break uniqueness checks before it changes anything, so a failed
//! call leaves the store as it was.
use crate::document::Document;
use crate::error::{Error, Result};
use crate::resid::ResId;
use crate::selector::Selector;
use crate::value::Value;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Default, Debug, Clone, PartialEq)]
pub struct DocumentStore {
    documents: Vec<Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Document> {
        self.documents.iter_mut()
    }

    /// Appends a document, fails if its identity is taken
    pub fn append(&mut self, document: Document) -> Result<()> {
        let id = document.id();
        if self.position(&id).is_some() {
            return Err(Error::DuplicateIdentity(id));
        }

        tracing::trace!(%id, "append");
        self.documents.push(document);
        Ok(())
    }

    /// Appends every document of `other` or none of them
    pub fn append_all(&mut self, other: DocumentStore) -> Result<()> {
        let mut seen: HashSet<ResId> = self.documents.iter().map(Document::id).collect();
        for document in &other.documents {
            let id = document.id();
            if !seen.insert(id.clone()) {
                return Err(Error::DuplicateIdentity(id));
            }
        }

        self.documents.extend(other.documents);
        Ok(())
    }

    pub fn remove(&mut self, id: &ResId) -> Result<Document> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;

        tracing::trace!(%id, "remove");
        Ok(self.documents.remove(index))
    }

    pub fn get(&self, id: &ResId) -> Option<&Document> {
        self.documents.iter().find(|d| &d.id() == id)
    }

    pub fn get_mut(&mut self, id: &ResId) -> Option<&mut Document> {
        self.documents.iter_mut().find(|d| &d.id() == id)
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn position(&self, id: &ResId) -> Option<usize> {
        self.documents.iter().position(|d| &d.id() == id)
    }

    /// Every document matching `selector`, in store order
    pub fn select(&self, selector: &Selector) -> Result<Vec<&Document>> {
        let matcher = selector.matcher()?;
        Ok(self.documents.iter().filter(|d| matcher.matches(d)).collect())
    }

    /// Mutable handles to every document matching `selector`
    pub fn select_mut(&mut self, selector: &Selector) -> Result<Vec<&mut Document>> {
        let matcher = selector.matcher()?;
        Ok(self
            .documents
            .iter_mut()
            .filter(|d| matcher.matches(d))
            .collect())
    }

    /// Changes the name of the document `id`, keeping its position
    ///
    /// The previous identity is recorded on the document.
    pub fn rename(&mut self, id: &ResId, name: &str) -> Result<()> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;

        let target = id.with_name(name);
        if &target != id && self.position(&target).is_some() {
            return Err(Error::DuplicateIdentity(target));
        }

        tracing::debug!(%id, name, "rename");
        let document = &mut self.documents[index];
        document.store_previous_id();
        document.set_name(name);
        Ok(())
    }

    /// First document of `kind` whose current or previous name is `name`
    pub fn find(&self, kind: &str, name: &str) -> Option<&Document> {
        self.documents
            .iter()
            .find(|d| d.kind() == kind && d.has_name(name))
    }

    /// Fails on the first identity that appears twice
    ///
    /// Documents can be edited through [Document::tree_mut]; this catches identity collisions
    /// caused that way.
    pub fn ensure_unique(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for document in &self.documents {
            let id = document.id();
            if !seen.insert(id.clone()) {
                return Err(Error::DuplicateIdentity(id));
            }
        }
        Ok(())
    }
}

impl DocumentStore {
    /// Parses a multi document yaml stream; empty documents are skipped
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut store = Self::new();
        for part in serde_yaml::Deserializer::from_str(yaml) {
            let value = Value::deserialize(part)?;
            if value.is_null() {
                continue;
            }
            store.append(Document::from_value(value)?)?;
        }
        Ok(store)
    }

    /// Renders all documents in order, separated by `---`
    pub fn to_yaml(&self) -> Result<String> {
        let parts = self
            .documents
            .iter()
            .map(Document::to_yaml)
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join("---\n"))
    }

    /// All trees as one list, used for json output
    pub fn to_value(&self) -> Value {
        Value::Array(self.documents.iter().map(|d| d.tree().clone()).collect())
    }

    pub fn load_file(&mut self, file_path: &Path) -> Result<()> {
        tracing::info!(path=%file_path.display(), "loading file");

        let contents = std::fs::read_to_string(file_path).map_err(|source| Error::Load {
            path: file_path.to_path_buf(),
            source,
        })?;

        self.append_all(Self::from_yaml_str(&contents)?)
    }

    /// Loads every `*.yaml` and `*.yml` file in `dir_path`, sorted by file name
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<()> {
        let io_error = |source| Error::Load {
            path: dir_path.to_path_buf(),
            source,
        };

        let mut files = vec![];
        for dir_entry in std::fs::read_dir(dir_path).map_err(io_error)? {
            let dir_entry = dir_entry.map_err(io_error)?;
            if !dir_entry.file_type().map_err(io_error)?.is_file() {
                continue;
            }

            let path = dir_entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml")
            );
            if is_yaml {
                files.push(path);
            }
        }

        files.sort();
        for file_path in files {
            self.load_file(&file_path)?;
        }
        Ok(())
    }

    /// Loads a file or a directory
    pub fn load_path(&mut self, path: &Path) -> Result<()> {
        if path.is_dir() {
            self.load_directory(path)
        } else {
            self.load_file(path)
        }
    }
}

impl IntoIterator for DocumentStore {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl From<Document> for DocumentStore {
    fn from(document: Document) -> Self {
        Self {
            documents: vec![document],
        }
    }
}

/// Utility macro to create a [DocumentStore] from yaml
///
/// ```
/// # use kfuse::documents;
/// let store = documents!("
/// apiVersion: v1
/// kind: ConfigMap
/// metadata:
///   name: one
/// ---
/// apiVersion: v1
/// kind: ConfigMap
/// metadata:
///   name: two
/// ");
/// assert_eq!(store.len(), 2);
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use kfuse::documents;
/// documents!("kind: ConfigMap");
/// ```
#[macro_export]
macro_rules! documents {
    { $expr:expr } => {
        $crate::documents::DocumentStore::from_yaml_str($expr).expect("documents must parse")
    };
}
