//! locating and mutating fields inside a document tree
//!
//! Walking rules for each [Segment]:
//! - a map key on an object descends into that key; a missing key ends the walk (no-op), unless
//!   `create` is set and only map keys follow, in which case the key is created
//! - a map key on an array is applied to every element (broadcast)
//! - an index or `key=value` match on an array picks elements
//! - anything else on a scalar is a [Error::TypeMismatch]
//!
//! When the addressed node itself is an array, every element is handed to the mutator.
//!
//! Some kinds store their field values base64 encoded (a Secret's `data`). [PathMatcher::apply]
//! decodes such values before the mutator sees them and encodes the result again.
use crate::document::Document;
use crate::error::{Error, Result};
use crate::field_path::{FieldPath, Segment};
use crate::value::{Object, Value};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Function applied to every located node; returns the replacement
pub type Mutator<'m> = dyn FnMut(Value) -> Result<Value> + 'm;

/// A `kind` whose values below the top level `field` are base64 encoded
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct BinaryField {
    pub kind: String,
    pub field: String,
}

#[derive(Debug, Clone)]
pub struct PathMatcher {
    binary_fields: Vec<BinaryField>,
}

impl Default for PathMatcher {
    fn default() -> Self {
        Self {
            binary_fields: vec![
                BinaryField::new("Secret".into(), "data".into()),
                BinaryField::new("ConfigMap".into(), "binaryData".into()),
            ],
        }
    }
}

impl PathMatcher {
    pub fn new(binary_fields: Vec<BinaryField>) -> Self {
        Self { binary_fields }
    }

    /// Whether values addressed by `path` in documents of `kind` are base64 encoded
    pub fn is_binary(&self, kind: &str, path: &FieldPath) -> bool {
        let Some(field) = path.first_field() else {
            return false;
        };
        self.binary_fields
            .iter()
            .any(|binary| binary.kind == kind && binary.field == field)
    }

    /// Apply `mutator` to every node addressed by `path`
    ///
    /// Returns the number of nodes handed to the mutator. Nothing is written unless the mutator
    /// succeeds for every node.
    pub fn apply(
        &self,
        document: &mut Document,
        path: &FieldPath,
        create: bool,
        mutator: &mut Mutator<'_>,
    ) -> Result<usize> {
        if self.is_binary(document.kind(), path) {
            let mut decoding = |value: Value| mutate_encoded(value, path, mutator);
            apply_tree(document.tree_mut(), path, create, &mut decoding)
        } else {
            apply_tree(document.tree_mut(), path, create, mutator)
        }
    }
}

/// Apply `mutator` to every node addressed by `path`, without any decoding
pub fn apply_tree(
    tree: &mut Value,
    path: &FieldPath,
    create: bool,
    mutator: &mut Mutator<'_>,
) -> Result<usize> {
    if !create {
        return write(tree, path, false, mutator);
    }

    // created keys only land in `tree` together with the values written below them
    let mut staged = tree.clone();
    let count = write(&mut staged, path, true, mutator)?;
    if count > 0 {
        *tree = staged;
    }
    Ok(count)
}

fn write(
    tree: &mut Value,
    path: &FieldPath,
    create: bool,
    mutator: &mut Mutator<'_>,
) -> Result<usize> {
    let handles = locate(tree, path, create)?;

    let updates = handles
        .iter()
        .map(|handle| mutator((**handle).clone()))
        .collect::<Result<Vec<_>>>()?;

    let count = handles.len();
    for (handle, update) in handles.into_iter().zip(updates) {
        *handle = update;
    }

    Ok(count)
}

/// Mutable handles to every node addressed by `path`
///
/// With `create`, missing keys are inserted on the way (the addressed field as `Null`) as long
/// as only map keys remain in the path. Index and `key=value` segments are never created.
pub fn locate<'a>(tree: &'a mut Value, path: &FieldPath, create: bool) -> Result<Vec<&'a mut Value>> {
    let mut handles = vec![];
    collect(tree, path.segments(), path, create, true, &mut handles)?;
    Ok(handles)
}

/// First node addressed by `path`
///
/// Arrays on the way are searched element by element, an array at the end of the path is
/// returned as a whole.
pub fn lookup<'a>(tree: &'a Value, path: &FieldPath) -> Result<Option<&'a Value>> {
    find(tree, path.segments(), path)
}

/// Delete the field addressed by `path`
///
/// Returns the number of removed nodes.
pub fn remove(tree: &mut Value, path: &FieldPath) -> Result<usize> {
    let Some((last, parent)) = path.segments().split_last() else {
        return Err(Error::TypeMismatch {
            path: path.to_string(),
            expected: "a field",
            found: "the document root",
        });
    };

    let broadcast = matches!(last, Segment::Field(_));
    let mut parents = vec![];
    collect(tree, parent, path, false, broadcast, &mut parents)?;

    let mut removed = 0;
    for node in parents {
        match (last, node) {
            (Segment::Field(key), Value::Object(object)) => {
                removed += usize::from(object.shift_remove(key).is_some());
            }
            (Segment::Index(index), Value::Array(items)) if *index < items.len() => {
                items.remove(*index);
                removed += 1;
            }
            (Segment::Match { key, value }, Value::Array(items)) => {
                let before = items.len();
                items.retain(|item| !element_matches(item, key, value));
                removed += before - items.len();
            }
            _ => {}
        }
    }

    Ok(removed)
}

fn collect<'a>(
    node: &'a mut Value,
    segments: &[Segment],
    path: &FieldPath,
    create: bool,
    broadcast_leaf: bool,
    out: &mut Vec<&'a mut Value>,
) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        if broadcast_leaf && matches!(node, Value::Array(_)) {
            if let Value::Array(items) = node {
                out.extend(items.iter_mut());
            }
        } else {
            out.push(node);
        }
        return Ok(());
    };

    let creating = create
        && segments
            .iter()
            .all(|segment| matches!(segment, Segment::Field(_)));
    if creating && node.is_null() {
        *node = Value::Object(Object::new());
    }

    match segment {
        Segment::Field(key) => match node {
            Value::Object(object) => {
                if !object.contains_key(key) {
                    if !creating {
                        return Ok(());
                    }
                    let fresh = match rest {
                        [] => Value::Null,
                        _ => Value::Object(Object::new()),
                    };
                    object.insert(key.clone(), fresh);
                }
                match object.get_mut(key) {
                    Some(child) => collect(child, rest, path, create, broadcast_leaf, out),
                    None => Ok(()),
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    collect(item, segments, path, create, broadcast_leaf, out)?;
                }
                Ok(())
            }
            Value::Null => Ok(()),
            other => Err(mismatch(path, "object", other)),
        },
        Segment::Index(index) => match node {
            Value::Array(items) => match items.get_mut(*index) {
                Some(item) => collect(item, rest, path, create, broadcast_leaf, out),
                None => Ok(()),
            },
            Value::Null => Ok(()),
            other => Err(mismatch(path, "array", other)),
        },
        Segment::Match { key, value } => match node {
            Value::Array(items) => {
                for item in items
                    .iter_mut()
                    .filter(|item| element_matches(item, key, value))
                {
                    collect(item, rest, path, create, broadcast_leaf, out)?;
                }
                Ok(())
            }
            Value::Null => Ok(()),
            other => Err(mismatch(path, "array", other)),
        },
    }
}

fn find<'a>(node: &'a Value, segments: &[Segment], path: &FieldPath) -> Result<Option<&'a Value>> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(Some(node));
    };

    match (segment, node) {
        (Segment::Field(key), Value::Object(object)) => match object.get(key) {
            Some(child) => find(child, rest, path),
            None => Ok(None),
        },
        (Segment::Field(_), Value::Array(items)) => {
            for item in items {
                if let Some(found) = find(item, segments, path)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        }
        (Segment::Index(index), Value::Array(items)) => match items.get(*index) {
            Some(item) => find(item, rest, path),
            None => Ok(None),
        },
        (Segment::Match { key, value }, Value::Array(items)) => {
            for item in items.iter().filter(|item| element_matches(item, key, value)) {
                if let Some(found) = find(item, rest, path)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        }
        (_, Value::Null) => Ok(None),
        (Segment::Field(_), other) => Err(mismatch(path, "object", other)),
        (_, other) => Err(mismatch(path, "array", other)),
    }
}

fn element_matches(item: &Value, key: &str, value: &str) -> bool {
    item.get(key)
        .and_then(Value::scalar_text)
        .is_some_and(|text| text == value)
}

fn mismatch(path: &FieldPath, expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        path: path.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn mutate_encoded(value: Value, path: &FieldPath, mutator: &mut Mutator<'_>) -> Result<Value> {
    let plain = match value {
        Value::String(encoded) => Value::String(decode(&encoded).map_err(|message| {
            Error::Encoding {
                path: path.to_string(),
                message,
            }
        })?),
        Value::Null => Value::Null,
        other => return mutator(other),
    };

    Ok(match mutator(plain)? {
        Value::Null => Value::Null,
        other => match other.scalar_text() {
            Some(text) => Value::String(STANDARD.encode(text)),
            None => other,
        },
    })
}

/// Decode base64 text, ignoring embedded whitespace (line wrapped values)
pub(crate) fn decode(encoded: &str) -> std::result::Result<String, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

pub(crate) fn encode(plain: &str) -> String {
    STANDARD.encode(plain)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(yaml: &str) -> Value {
        Value::from_yaml_str(yaml).unwrap()
    }

    fn path(path: &str) -> FieldPath {
        FieldPath::parse(path).unwrap()
    }

    fn upper(value: Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(s.to_uppercase()),
            other => other,
        })
    }

    const CONTAINERS: &str = r#"
spec:
  containers:
  - name: web
    image: nginx
  - name: sidecar
    image: envoy
"#;

    #[test]
    fn broadcast_over_lists() {
        let mut value = tree(CONTAINERS);
        let count =
            apply_tree(&mut value, &path("spec/containers/image"), false, &mut upper).unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            value,
            tree("spec:\n  containers:\n  - name: web\n    image: NGINX\n  - name: sidecar\n    image: ENVOY\n")
        );
    }

    #[test]
    fn explicit_index_only_mutates_that_element() {
        let mut value = tree(CONTAINERS);
        let count =
            apply_tree(&mut value, &path("spec.containers[1].image"), false, &mut upper).unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            value,
            tree("spec:\n  containers:\n  - name: web\n    image: nginx\n  - name: sidecar\n    image: ENVOY\n")
        );
    }

    #[test]
    fn match_segment() {
        let mut value = tree(CONTAINERS);
        apply_tree(
            &mut value,
            &path("spec/containers[name=web]/image"),
            false,
            &mut upper,
        )
        .unwrap();

        assert_eq!(
            lookup(&value, &path("spec.containers[0].image")).unwrap(),
            Some(&Value::from("NGINX"))
        );
        assert_eq!(
            lookup(&value, &path("spec.containers[1].image")).unwrap(),
            Some(&Value::from("envoy"))
        );
    }

    #[test]
    fn list_leaf_broadcasts_to_elements() {
        let mut value = tree("args:\n- a\n- b\n");
        let count = apply_tree(&mut value, &path("args"), false, &mut upper).unwrap();
        assert_eq!(count, 2);
        assert_eq!(value, tree("args:\n- A\n- B\n"));
    }

    #[test]
    fn missing_fields_are_a_noop() {
        let mut value = tree(CONTAINERS);
        let before = value.clone();
        let count = apply_tree(&mut value, &path("spec/volumes/name"), false, &mut upper).unwrap();

        assert_eq!(count, 0);
        assert_eq!(value, before);
    }

    #[test]
    fn create_if_not_present() {
        let mut value = tree("metadata:\n  name: x\n");
        let count = apply_tree(
            &mut value,
            &path("metadata/labels/app"),
            true,
            &mut |_| Ok(Value::from("web")),
        )
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(value, tree("metadata:\n  name: x\n  labels:\n    app: web\n"));
    }

    #[test]
    fn create_does_not_invent_lists() {
        let mut value = tree("spec: {}\n");
        let count = apply_tree(
            &mut value,
            &path("spec.containers[0].image"),
            true,
            &mut |_| Ok(Value::from("x")),
        )
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(value, tree("spec: {}\n"));

        let mut value = tree("spec: {}\n");
        let count = apply_tree(
            &mut value,
            &path("spec/template/containers[name=web]/image"),
            true,
            &mut |_| Ok(Value::from("x")),
        )
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(value, tree("spec: {}\n"));
    }

    #[test]
    fn failing_mutator_does_not_create_fields() {
        let mut value = tree("metadata:\n  name: x\n");
        let result = apply_tree(&mut value, &path("metadata/labels/app"), true, &mut |_| {
            Err(Error::MissingReferenceTarget("app".into()))
        });

        assert!(result.is_err());
        assert_eq!(value, tree("metadata:\n  name: x\n"));
    }

    #[test]
    fn create_below_every_list_element() {
        let mut value = tree(CONTAINERS);
        let count = apply_tree(
            &mut value,
            &path("spec/containers/resources/limits/cpu"),
            true,
            &mut |_| Ok(Value::from("1")),
        )
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            lookup(&value, &path("spec.containers[1].resources.limits.cpu")).unwrap(),
            Some(&Value::from("1"))
        );
    }

    #[test]
    fn scalar_in_the_way_is_a_type_mismatch() {
        let mut value = tree("spec: 3\n");
        let err = apply_tree(&mut value, &path("spec/replicas"), false, &mut upper).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: "object",
                found: "integer",
                ..
            }
        ));
    }

    #[test]
    fn type_follows_mutator_result() {
        let mut value = tree("spec:\n  replicas: \"3\"\n  paused: true\n");
        apply_tree(&mut value, &path("spec/replicas"), false, &mut |v| {
            Ok(v.scalar_text()
                .and_then(|t| t.parse::<i64>().ok())
                .map(Value::Integer)
                .unwrap_or(v))
        })
        .unwrap();
        apply_tree(&mut value, &path("spec/paused"), false, &mut Ok).unwrap();

        assert_eq!(value.get("spec").unwrap().get("replicas"), Some(&Value::Integer(3)));
        assert_eq!(value.get("spec").unwrap().get("paused"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn failing_mutator_leaves_tree_untouched() {
        let mut value = tree(CONTAINERS);
        let before = value.clone();
        let mut calls = 0;
        let result = apply_tree(&mut value, &path("spec/containers/image"), false, &mut |v| {
            calls += 1;
            if calls == 2 {
                Err(Error::MissingReferenceTarget("boom".into()))
            } else {
                upper(v)
            }
        });

        assert!(result.is_err());
        assert_eq!(value, before);
    }

    #[test]
    fn secret_data_is_decoded_for_the_mutator() {
        let yaml = format!(
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: s\ndata:\n  password: {}\n",
            encode("hunter2")
        );
        let mut doc = Document::from_value(tree(&yaml)).unwrap();

        let mut seen = vec![];
        PathMatcher::default()
            .apply(&mut doc, &path("data/password"), false, &mut |v| {
                seen.push(v.clone());
                Ok(Value::from("correct horse"))
            })
            .unwrap();

        assert_eq!(seen, vec![Value::from("hunter2")]);
        let stored = lookup(doc.tree(), &path("data/password")).unwrap().unwrap();
        assert_eq!(decode(stored.as_str().unwrap()).unwrap(), "correct horse");
    }

    #[test]
    fn created_secret_data_is_encoded() {
        let mut doc = Document::from_value(tree(
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: s\ndata: {}\n",
        ))
        .unwrap();

        PathMatcher::default()
            .apply(&mut doc, &path("data/token"), true, &mut |_| Ok(Value::from("abc")))
            .unwrap();

        let stored = lookup(doc.tree(), &path("data/token")).unwrap().unwrap();
        assert_eq!(stored, &Value::from(encode("abc")));
    }

    #[test]
    fn invalid_base64_is_an_encoding_error() {
        let mut doc = Document::from_value(tree(
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: s\ndata:\n  password: '%%%'\n",
        ))
        .unwrap();

        let err = PathMatcher::default()
            .apply(&mut doc, &path("data/password"), false, &mut Ok)
            .unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
    }

    #[test]
    fn other_kinds_are_not_decoded() {
        let mut doc = Document::from_value(tree(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: c\ndata:\n  key: aGVsbG8=\n",
        ))
        .unwrap();

        let mut seen = vec![];
        PathMatcher::default()
            .apply(&mut doc, &path("data/key"), false, &mut |v| {
                seen.push(v.clone());
                Ok(v)
            })
            .unwrap();
        assert_eq!(seen, vec![Value::from("aGVsbG8=")]);
    }

    #[test]
    fn lookup_returns_whole_lists() {
        let value = tree(CONTAINERS);
        let found = lookup(&value, &path("spec/containers")).unwrap().unwrap();
        assert_eq!(found.as_array().map(<[Value]>::len), Some(2));

        let found = lookup(&value, &path("spec/containers/name")).unwrap();
        assert_eq!(found, Some(&Value::from("web")));
    }

    #[test]
    fn remove_fields() {
        let mut value = tree(CONTAINERS);
        let removed = remove(&mut value, &path("spec/containers/image")).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            value,
            tree("spec:\n  containers:\n  - name: web\n  - name: sidecar\n")
        );

        let removed = remove(&mut value, &path("spec/containers[0]")).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(value, tree("spec:\n  containers:\n  - name: sidecar\n"));
    }
}
