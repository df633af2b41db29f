//! `$(NAME)` substitution with values read from other documents
//!
//! ```yaml
//! apiVersion: kfuse/v1
//! kind: SuperVars
//! vars:
//! - name: SERVICE_NAME
//!   objref:
//!     apiVersion: v1
//!     kind: Service
//!     name: web
//!   fieldref:
//!     fieldpath: metadata.name
//! configurations:
//! - varreference.yaml
//! ```
//!
//! Only fields named by var reference rules are expanded. `$$` escapes a `$`, unknown names are
//! left as they are.
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::field_path::FieldPath;
use crate::path_matcher;
use crate::plugin::{decode_config, PluginHelpers, Transformer};
use crate::reference::{ReferenceRules, Var};
use crate::util::VarRewriter;
use crate::value::Value;
use crate::visit::VisitStringsMut;
use indexmap::IndexMap;
use serde::Deserialize;

const KIND: &str = "SuperVars";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SuperVarsArgs {
    pub vars: Vec<Var>,
    /// Reference rule files merged over the builtin rules
    pub configurations: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SuperVars {
    args: SuperVarsArgs,
    rules: ReferenceRules,
}

impl SuperVars {
    /// Value of every var, read from the single document its `objref` points at
    fn resolve(&self, store: &DocumentStore) -> Result<IndexMap<String, String>> {
        let mut values = IndexMap::new();
        for var in &self.args.vars {
            let documents: Vec<_> = store
                .iter()
                .filter(|document| var.objref.matches(document))
                .collect();
            let document = match documents.as_slice() {
                [document] => *document,
                [] => {
                    return Err(Error::MissingReferenceTarget(format!(
                        "var {} refers to {}, which does not exist",
                        var.name, var.objref
                    )))
                }
                _ => {
                    return Err(Error::Selector {
                        selector: var.objref.to_string(),
                        count: documents.len(),
                    })
                }
            };

            let path = FieldPath::parse(&var.fieldref.field_path)?;
            let value = path_matcher::lookup(document.tree(), &path)?
                .and_then(Value::scalar_text)
                .ok_or_else(|| {
                    Error::MissingReferenceTarget(format!(
                        "var {} refers to field {path} of {:?}, which holds no value",
                        var.name,
                        document.id()
                    ))
                })?;

            tracing::trace!(name = %var.name, value = %value, "var resolved");
            values.insert(var.name.clone(), value);
        }
        Ok(values)
    }
}

impl Transformer for SuperVars {
    fn configure(&mut self, helpers: &PluginHelpers, config: &Value) -> Result<()> {
        self.args = decode_config(KIND, config)?;
        self.rules = ReferenceRules::load(helpers.loader(), &self.args.configurations)?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn transform(&mut self, store: &mut DocumentStore) -> Result<()> {
        let vars = self.resolve(store)?;
        if vars.is_empty() {
            return Ok(());
        }

        let mut rewriter = VarRewriter::new(&vars);
        for document in store.iter_mut() {
            let gvk = document.gvk();
            for spec in self.rules.var_reference.iter().filter(|spec| spec.applies_to(&gvk)) {
                let mut expand = |mut value: Value| -> Result<Value> {
                    value.visit_strings_mut(&mut rewriter);
                    Ok(value)
                };
                let path = spec.field_path()?;
                path_matcher::apply_tree(
                    document.tree_mut(),
                    &path,
                    spec.create_if_not_present,
                    &mut expand,
                )?;
            }
        }

        tracing::debug!(vars = vars.len(), rewritten = rewriter.rewritten(), "vars expanded");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use crate::plugin::Loader;
    use pretty_assertions::assert_eq;

    const STORE: &str = r#"
apiVersion: kfuse/v1
kind: SuperSecret
metadata:
  name: my-secret
  labels:
    myproperty: propertyvalue
stringData:
  myproperty: $(MYPROPERTY)-something
---
apiVersion: kfuse/v1
kind: SuperConfigMap
metadata:
  name: my-configmap
  labels:
    myproperty: propertyvalue-2
data:
  myproperty: $(MYPROPERTY2)-something
  escaped: $$(MYPROPERTY2)
"#;

    fn transform(config: &str, store: &mut DocumentStore) -> Result<()> {
        let mut transformer = SuperVars::default();
        let loader = Loader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/vars"));
        transformer.configure(&PluginHelpers::new(loader), &Value::from_yaml_str(config).unwrap())?;
        transformer.transform(store)
    }

    fn field(store: &DocumentStore, index: usize, path: &str) -> Value {
        let tree = store.get_by_index(index).unwrap().tree();
        path_matcher::lookup(tree, &FieldPath::parse(path).unwrap())
            .unwrap()
            .cloned()
            .unwrap_or_default()
    }

    const BOTH_VARS: &str = r#"
kind: SuperVars
configurations:
- varreference.yaml
vars:
- name: MYPROPERTY
  objref:
    apiVersion: kfuse/v1
    kind: SuperSecret
    name: my-secret
  fieldref:
    fieldpath: metadata.labels.myproperty
- name: MYPROPERTY2
  objref:
    apiVersion: kfuse/v1
    kind: SuperConfigMap
    name: my-configmap
  fieldref:
    fieldpath: metadata.labels.myproperty
"#;

    #[test]
    fn vars_are_expanded() {
        let mut store = documents!(STORE);
        transform(BOTH_VARS, &mut store).unwrap();

        assert_eq!(field(&store, 0, "stringData.myproperty"), Value::from("propertyvalue-something"));
        assert_eq!(field(&store, 1, "data.myproperty"), Value::from("propertyvalue-2-something"));
        assert_eq!(field(&store, 1, "data.escaped"), Value::from("$(MYPROPERTY2)"));
    }

    #[test]
    fn unresolved_field_fails() {
        let mut store = documents!(STORE);
        // the second var points at a label that does not exist
        let config = BOTH_VARS.strip_suffix("myproperty\n").unwrap().to_string() + "not-there\n";

        let result = transform(&config, &mut store);
        assert!(matches!(result, Err(Error::MissingReferenceTarget(_))));
    }

    #[test]
    fn unknown_vars_are_left_in_place() {
        let mut store = documents!(STORE);
        transform(
            r#"
kind: SuperVars
configurations:
- varreference.yaml
vars:
- name: MYPROPERTY
  objref:
    kind: SuperSecret
    name: my-secret
  fieldref:
    fieldpath: metadata.labels.myproperty
"#,
            &mut store,
        )
        .unwrap();

        assert_eq!(field(&store, 0, "stringData.myproperty"), Value::from("propertyvalue-something"));
        assert_eq!(field(&store, 1, "data.myproperty"), Value::from("$(MYPROPERTY2)-something"));
    }

    #[test]
    fn no_substitution_without_var_references() {
        let mut store = documents!(STORE);
        let before = store.clone();
        transform(&BOTH_VARS.replace("configurations:\n- varreference.yaml\n", ""), &mut store).unwrap();

        assert_eq!(store, before);
    }

    #[test]
    fn missing_and_ambiguous_objects() {
        let mut store = documents!(STORE);
        let missing = "kind: SuperVars\nvars:\n- name: A\n  objref:\n    kind: Service\n";
        assert!(matches!(
            transform(missing, &mut store),
            Err(Error::MissingReferenceTarget(_))
        ));

        let ambiguous = "kind: SuperVars\nvars:\n- name: A\n  objref:\n    apiVersion: kfuse/v1\n";
        assert!(matches!(
            transform(ambiguous, &mut store),
            Err(Error::Selector { count: 2, .. })
        ));
    }

    #[test]
    fn builtin_var_references() {
        let mut store = documents!(
            r#"
apiVersion: v1
kind: Service
metadata:
  name: web-svc
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
        args:
        - --upstream=$(SERVICE)
        env:
        - name: UPSTREAM
          value: http://$(SERVICE):8080
"#
        );
        transform(
            "kind: SuperVars\nvars:\n- name: SERVICE\n  objref:\n    kind: Service\n",
            &mut store,
        )
        .unwrap();

        assert_eq!(
            field(&store, 1, "spec/template/spec/containers[0]/args[0]"),
            Value::from("--upstream=web-svc")
        );
        assert_eq!(
            field(&store, 1, "spec/template/spec/containers[0]/env[0]/value"),
            Value::from("http://web-svc:8080")
        );
    }
}
