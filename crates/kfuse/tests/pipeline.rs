//! Build tests
//!
//! Each test builds one directory below /tests/fixtures/ and checks the rendered documents.
use kfuse::documents::DocumentStore;
use kfuse::field_path::FieldPath;
use kfuse::path_matcher;
use kfuse::plugin::Registry;
use kfuse::value::Value;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn build(name: &str) -> kfuse::Result<DocumentStore> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("KFUSE_LOG"))
        .with_writer(std::io::stderr)
        .try_init();

    kfuse::pipeline::build(&fixture(name), &Registry::builtin())
}

fn field(store: &DocumentStore, index: usize, path: &str) -> Value {
    let tree = store.get_by_index(index).unwrap().tree();
    path_matcher::lookup(tree, &FieldPath::parse(path).unwrap())
        .unwrap()
        .cloned()
        .unwrap_or_default()
}

#[test]
fn generated_without_hash() {
    let store = build("no_hash").unwrap();

    insta::assert_snapshot!(store.to_yaml().unwrap(), @r###"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  labels:
    app: web
data:
  REGION: eu-west
  LOG_LEVEL: debug
  MODE: production
"###);
}

#[test]
fn layers_agree_on_hashed_names() {
    let base = build("layers/base").unwrap();
    assert_eq!(base.len(), 1);
    let generated = base.get_by_index(0).unwrap().name().to_string();
    assert!(generated.starts_with("settings-"), "{generated}");

    // the overlay never sees the generated map, only its data
    let overlay = build("layers/overlay").unwrap();
    assert_eq!(overlay.len(), 1);
    assert_eq!(overlay.get_by_index(0).unwrap().kind(), "Deployment");

    for path in [
        "spec/template/spec/volumes[name=settings]/configMap/name",
        "spec/template/spec/containers[name=web]/envFrom[0]/configMapRef/name",
    ] {
        assert_eq!(field(&overlay, 0, path), Value::from(generated.as_str()), "{path}");
    }
}

#[test]
fn secret_data_is_replaced_decoded() {
    let store = build("secret").unwrap();

    insta::assert_snapshot!(store.to_yaml().unwrap(), @r###"
apiVersion: v1
kind: Secret
metadata:
  name: database
type: Opaque
data:
  url: cG9zdGdyZXM6Ly9kYi5leGFtcGxlLmNvbS9kYg==
"###);
}

#[test]
fn vars_and_search_replace() {
    let store = build("app").unwrap();

    insta::assert_snapshot!(store.to_yaml().unwrap(), @r###"
apiVersion: v1
kind: Service
metadata:
  name: api
spec:
  selector:
    app: api
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: web
        image: registry.example.com/web:1.0
        env:
        - name: UPSTREAM
          value: api.prod.svc
"###);
}

#[test]
fn relative_paths_are_resolved() {
    let store = build("paths").unwrap();

    let root = fixture("paths");
    let expected = [root.join("patch.yaml"), root.parent().unwrap().join("shared/patch.yaml")];
    let patches = field(&store, 0, "patches");
    let paths: Vec<_> = patches
        .as_array()
        .unwrap()
        .iter()
        .map(|patch| patch.get("path").and_then(Value::as_str).unwrap().to_string())
        .collect();

    assert_eq!(
        paths,
        expected
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
    );
}

#[test]
fn patched_and_retagged() {
    let store = build("selective_patch").unwrap();

    insta::assert_snapshot!(store.to_yaml().unwrap(), @r###"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    metadata:
      labels:
        working: true
    spec:
      containers:
      - name: web
        image: registry.example.com/nginx:1.27
"###);
}

#[test]
fn missing_build_file() {
    let result = build("does-not-exist");
    assert!(matches!(result, Err(kfuse::Error::Load { .. })));
}
