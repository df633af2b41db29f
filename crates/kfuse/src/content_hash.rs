//! content addressed names
//!
//! Algorithm `sha256/v1`:
//! 1. drop volatile fields from a copy of the tree
//! 2. reduce the tree to its hash input
//!    - `ConfigMap`: `kind`, `name`, `data`, plus `binaryData` and `immutable` when set
//!    - `Secret`: `kind`, `type`, `name`, `data`, plus `immutable` when set
//!    - anything else: the whole tree
//! 3. render compact json with object keys sorted at every level
//! 4. sha256, lower case hex, keep 10 characters
//! 5. replace `0 1 3 a e` with `g h k m t`
//!
//! Layers that are built independently rely on this producing the same name for the same
//! content. Changing any step requires a new algorithm version.
use crate::document::Document;
use crate::error::Result;
use crate::path_matcher;
use crate::selector::FieldSpec;
use crate::value::{Object, Value};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use sha2::{Digest, Sha256};

pub const HASH_ALGORITHM: &str = "sha256/v1";

const HASH_LENGTH: usize = 10;

#[derive(Debug, Clone, Default, derive_new::new)]
pub struct ContentNamer {
    /// Fields excluded from the hash
    volatile: Vec<FieldSpec>,
}

impl ContentNamer {
    pub fn hash(&self, document: &Document) -> Result<String> {
        let mut tree = document.tree().clone();
        let gvk = document.gvk();
        for spec in self.volatile.iter().filter(|spec| spec.applies_to(&gvk)) {
            let path = spec.field_path()?;
            if !path.is_root() {
                path_matcher::remove(&mut tree, &path)?;
            }
        }

        let input = hash_input(document.kind(), document.name(), tree);
        let canonical = serde_json::to_vec(&Canonical(&input))?;

        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        let digest = hex::encode(hasher.finalize());

        let hash = encode(&digest[..HASH_LENGTH]);
        tracing::trace!(name = document.name(), %hash, "content hash");
        Ok(hash)
    }

    /// `<name>-<hash>` for the document's current name
    pub fn suffixed_name(&self, document: &Document) -> Result<String> {
        Ok(format!("{}-{}", document.name(), self.hash(document)?))
    }
}

fn hash_input(kind: &str, name: &str, tree: Value) -> Value {
    let Value::Object(mut tree) = tree else {
        return tree;
    };

    let mut input = Object::new();
    match kind {
        "ConfigMap" => {
            input.insert("kind".into(), kind.into());
            input.insert("name".into(), name.into());
            input.insert("data".into(), take_or_empty(&mut tree, "data"));
            for optional in ["binaryData", "immutable"] {
                if let Some(value) = tree.shift_remove(optional) {
                    input.insert(optional.into(), value);
                }
            }
        }
        "Secret" => {
            input.insert("kind".into(), kind.into());
            input.insert(
                "type".into(),
                tree.shift_remove("type").unwrap_or_else(|| "".into()),
            );
            input.insert("name".into(), name.into());
            input.insert("data".into(), take_or_empty(&mut tree, "data"));
            if let Some(value) = tree.shift_remove("immutable") {
                input.insert("immutable".into(), value);
            }
        }
        _ => return Value::Object(tree),
    }

    Value::Object(input)
}

fn take_or_empty(tree: &mut Object, key: &str) -> Value {
    match tree.shift_remove(key) {
        Some(Value::Null) | None => Value::Object(Object::new()),
        Some(value) => value,
    }
}

fn encode(hex: &str) -> String {
    hex.chars()
        .map(|c| match c {
            '0' => 'g',
            '1' => 'h',
            '3' => 'k',
            'a' => 'm',
            'e' => 't',
            c => c,
        })
        .collect()
}

/// Serializes a [Value] with object keys in sorted order
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0 {
            Value::Array(items) => {
                let mut ser = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    ser.serialize_element(&Canonical(item))?;
                }
                ser.end()
            }
            Value::Object(object) => {
                let mut entries: Vec<_> = object.iter().collect();
                entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

                let mut ser = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    ser.serialize_entry(key, &Canonical(value))?;
                }
                ser.end()
            }
            scalar => scalar.serialize(serializer),
        }
    }
}
