//! Turns relative file paths inside documents into absolute ones
//!
//! Paths are resolved against the directory of the build, so documents handed to a later layer
//! still point at the right files.
//!
//! ```yaml
//! apiVersion: kfuse/v1
//! kind: FullPath
//! fieldSpecs:
//! - kind: SelectivePatch
//!   path: patches/path
//! ```
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::path_matcher;
use crate::plugin::{decode_config, Loader, PluginHelpers, Transformer};
use crate::selector::FieldSpec;
use crate::value::Value;
use serde::Deserialize;
use std::path::Path;

const KIND: &str = "FullPath";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FullPathArgs {
    pub field_specs: Vec<FieldSpec>,
}

#[derive(Debug, Default)]
pub struct FullPath {
    args: FullPathArgs,
    loader: Option<Loader>,
}

impl Transformer for FullPath {
    fn configure(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()> {
        self.args = decode_config(KIND, config)?;
        self.loader = Some(helpers.loader().clone());
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn transform(&mut self, store: &mut DocumentStore) -> Result<()> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| Error::configuration(KIND, "plugin was not configured"))?;

        let mut resolved = 0;
        let mut absolute = |value: Value| -> Result<Value> {
            Ok(match value {
                Value::String(path) if !path.is_empty() && !Path::new(&path).is_absolute() => {
                    resolved += 1;
                    Value::String(loader.resolve(&path).to_string_lossy().into_owned())
                }
                other => other,
            })
        };

        for document in store.iter_mut() {
            let gvk = document.gvk();
            for spec in self.args.field_specs.iter().filter(|spec| spec.applies_to(&gvk)) {
                let path = spec.field_path()?;
                path_matcher::apply_tree(
                    document.tree_mut(),
                    &path,
                    spec.create_if_not_present,
                    &mut absolute,
                )?;
            }
        }

        tracing::debug!(resolved, root=%loader.root().display(), "paths resolved");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use crate::field_path::FieldPath;
    use pretty_assertions::assert_eq;

    const PATCHES: &str = r#"
apiVersion: kfuse/v1
kind: SelectivePatch
metadata:
  name: chronos
patches:
- path: deployment.yaml
  target:
    kind: Deployment
- path: ../shared/redis.yaml
- path: /etc/kfuse/absolute.yaml
- path: ""
---
apiVersion: kfuse/v1
kind: SelectivePatch
metadata:
  name: foobar
patches:
- foo: bar
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: untouched
patches:
- path: deployment.yaml
"#;

    fn transform(config: &str, store: &mut DocumentStore) -> Result<()> {
        let mut transformer = FullPath::default();
        let helpers = PluginHelpers::new(Loader::new("/foo/bar"));
        transformer.configure(&helpers, &Value::from_yaml_str(config).unwrap())?;
        transformer.transform(store)
    }

    fn paths(store: &DocumentStore, index: usize) -> Vec<Value> {
        let tree = store.get_by_index(index).unwrap().tree();
        let patches = path_matcher::lookup(tree, &FieldPath::parse("patches").unwrap())
            .unwrap()
            .and_then(Value::as_array)
            .unwrap();
        patches.iter().filter_map(|patch| patch.get("path").cloned()).collect()
    }

    const CONFIG: &str = r#"
kind: FullPath
fieldSpecs:
- kind: SelectivePatch
  path: patches/path
"#;

    #[test]
    fn relative_paths_become_absolute() {
        let mut store = documents!(PATCHES);
        transform(CONFIG, &mut store).unwrap();

        assert_eq!(
            paths(&store, 0),
            vec![
                Value::from("/foo/bar/deployment.yaml"),
                Value::from("/foo/shared/redis.yaml"),
                Value::from("/etc/kfuse/absolute.yaml"),
                Value::from(""),
            ]
        );
    }

    #[test]
    fn other_kinds_and_missing_fields_are_untouched() {
        let mut store = documents!(PATCHES);
        let before = store.clone();
        transform(CONFIG, &mut store).unwrap();

        assert_eq!(store.get_by_index(1), before.get_by_index(1));
        assert_eq!(paths(&store, 2), vec![Value::from("deployment.yaml")]);
    }

    #[test]
    fn path_not_found() {
        let mut store = documents!(PATCHES);
        let before = store.clone();
        transform(
            "kind: FullPath\nfieldSpecs:\n- kind: SelectivePatch\n  path: abra/cadabra\n",
            &mut store,
        )
        .unwrap();

        assert_eq!(store, before);
    }

    #[test]
    fn field_spec_creates_missing_keys() {
        let mut store = documents!(
            "apiVersion: kfuse/v1\nkind: SelectivePatch\nmetadata:\n  name: chronos\nspec: {}\n"
        );
        transform(
            "kind: FullPath\nfieldSpecs:\n- kind: SelectivePatch\n  path: spec/chartHome\n  create: true\n",
            &mut store,
        )
        .unwrap();

        let tree = store.get_by_index(0).unwrap().tree();
        let spec = tree.get("spec").and_then(Value::as_object).unwrap();
        assert_eq!(spec.get("chartHome"), Some(&Value::Null));
    }
}
