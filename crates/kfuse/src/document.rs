//! a single structured document with a stable identity
//!
//! The identity is read from the tree itself (`apiVersion`, `kind`, `metadata.namespace`,
//! `metadata.name`), so renaming a document means rewriting `metadata.name`.
//! Every rename should be preceded by [Document::store_previous_id] so that references to
//! the old name can be found and repaired.
use crate::error::{Error, Result};
use crate::resid::{Gvk, ResId};
use crate::value::{Object, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    tree: Value,
    previous_ids: Vec<ResId>,
}

impl Document {
    pub fn from_value(tree: Value) -> Result<Self> {
        validate(&tree)?;
        Ok(Self {
            tree,
            previous_ids: vec![],
        })
    }

    /// Skeleton document with only identity fields set
    pub fn new(gvk: &Gvk, name: &str) -> Self {
        let mut metadata = Object::new();
        metadata.insert("name".into(), name.into());

        let mut tree = Object::new();
        tree.insert("apiVersion".into(), gvk.api_version().into());
        tree.insert("kind".into(), gvk.kind.as_str().into());
        tree.insert("metadata".into(), Value::Object(metadata));

        Self {
            tree: Value::Object(tree),
            previous_ids: vec![],
        }
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Mutable access to the tree
    ///
    /// Changing identity fields through this bypasses uniqueness checks, use
    /// [crate::documents::DocumentStore::rename] instead.
    pub fn tree_mut(&mut self) -> &mut Value {
        &mut self.tree
    }

    /// Replace the whole tree; the new tree must still carry an identity
    pub fn set_tree(&mut self, tree: Value) -> Result<()> {
        validate(&tree)?;
        self.tree = tree;
        Ok(())
    }

    pub fn api_version(&self) -> &str {
        self.tree
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.tree
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn gvk(&self) -> Gvk {
        Gvk::from_api_version(self.api_version(), self.kind())
    }

    pub fn name(&self) -> &str {
        self.metadata_field("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata_field("namespace")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn id(&self) -> ResId {
        ResId::new(self.gvk(), self.namespace(), self.name())
    }

    /// Identity before the first rename
    pub fn original_id(&self) -> ResId {
        self.previous_ids.first().cloned().unwrap_or_else(|| self.id())
    }

    pub fn previous_ids(&self) -> &[ResId] {
        &self.previous_ids
    }

    pub fn store_previous_id(&mut self) {
        self.previous_ids.push(self.id());
    }

    /// Current or any previous name equals `name`
    pub fn has_name(&self, name: &str) -> bool {
        self.name() == name || self.previous_ids.iter().any(|id| id.name == name)
    }

    pub fn labels(&self) -> Option<&Object> {
        self.metadata_field("labels").and_then(Value::as_object)
    }

    pub fn annotations(&self) -> Option<&Object> {
        self.metadata_field("annotations")
            .and_then(Value::as_object)
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert("name".into(), name.into());
        }
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert("namespace".into(), namespace.into());
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.tree)?)
    }

    fn metadata_field(&self, field: &str) -> Option<&Value> {
        self.tree.get("metadata").and_then(|m| m.get(field))
    }

    fn metadata_mut(&mut self) -> Option<&mut Object> {
        self.tree
            .as_object_mut()?
            .get_mut("metadata")?
            .as_object_mut()
    }
}

fn validate(tree: &Value) -> Result<()> {
    let Value::Object(object) = tree else {
        return Err(Error::InvalidDocument(format!(
            "expected an object, found {}",
            tree.type_name()
        )));
    };

    match object.get("kind") {
        Some(Value::String(kind)) if !kind.is_empty() => {}
        _ => return Err(Error::InvalidDocument("missing kind".into())),
    }

    match object.get("apiVersion") {
        None | Some(Value::String(_)) => {}
        Some(other) => {
            return Err(Error::InvalidDocument(format!(
                "apiVersion must be a string, found {}",
                other.type_name()
            )))
        }
    }

    match tree.get("metadata").and_then(|m| m.get("name")) {
        Some(Value::String(name)) if !name.is_empty() => Ok(()),
        _ => Err(Error::InvalidDocument("missing metadata.name".into())),
    }
}
