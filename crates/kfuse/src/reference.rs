//! references between documents and their repair after renames
//!
//! A name reference rule says: fields at `fieldSpecs` hold the name of a document of kind `kind`.
//! When such a document is renamed, [ReferenceRepairer] rewrites those fields.
//!
//! ```yaml
//! nameReference:
//! - kind: ConfigMap
//!   version: v1
//!   fieldSpecs:
//!   - kind: Deployment
//!     path: spec/template/spec/volumes/configMap/name
//! varReference:
//! - kind: Deployment
//!   path: spec/template/spec/containers/args
//! ```
use crate::document::Document;
use crate::documents::DocumentStore;
use crate::error::Result;
use crate::field_path::FieldPath;
use crate::path_matcher;
use crate::plugin::Loader;
use crate::resid::{Gvk, ResId};
use crate::selector::FieldSpec;
use crate::util::NameRewriter;
use crate::value::Value;
use crate::visit::VisitStringsMut;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Fields holding the name of a `kind` document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameReference {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub kind: String,
    #[serde(default)]
    pub field_specs: Vec<FieldSpec>,
}

impl NameReference {
    pub fn gvk(&self) -> Gvk {
        Gvk::new(&self.group, &self.version, &self.kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReferenceRules {
    pub name_reference: Vec<NameReference>,
    /// Fields in which `$(VAR)` is expanded
    pub var_reference: Vec<FieldSpec>,
}

const POD_SPECS: [(&str, &str); 7] = [
    ("Pod", "spec"),
    ("Deployment", "spec/template/spec"),
    ("StatefulSet", "spec/template/spec"),
    ("DaemonSet", "spec/template/spec"),
    ("ReplicaSet", "spec/template/spec"),
    ("Job", "spec/template/spec"),
    ("CronJob", "spec/jobTemplate/spec/template/spec"),
];

const CONTAINERS: [&str; 2] = ["containers", "initContainers"];

impl ReferenceRules {
    /// Rules for ConfigMap and Secret consumers of the common workload kinds
    pub fn builtin() -> Self {
        let mut config_map = vec![];
        let mut secret = vec![];
        let mut vars = vec![];

        for (kind, pod_spec) in POD_SPECS {
            let spec = |path: &str| FieldSpec::new(kind, &format!("{pod_spec}/{path}"));

            config_map.push(spec("volumes/configMap/name"));
            config_map.push(spec("volumes/projected/sources/configMap/name"));
            secret.push(spec("volumes/secret/secretName"));
            secret.push(spec("volumes/projected/sources/secret/name"));
            secret.push(spec("imagePullSecrets/name"));

            for containers in CONTAINERS {
                config_map.push(spec(&format!("{containers}/env/valueFrom/configMapKeyRef/name")));
                config_map.push(spec(&format!("{containers}/envFrom/configMapRef/name")));
                secret.push(spec(&format!("{containers}/env/valueFrom/secretKeyRef/name")));
                secret.push(spec(&format!("{containers}/envFrom/secretRef/name")));

                vars.push(spec(&format!("{containers}/args")));
                vars.push(spec(&format!("{containers}/command")));
                vars.push(spec(&format!("{containers}/env/value")));
            }
        }

        secret.push(FieldSpec::new("Ingress", "spec/tls/secretName"));
        secret.push(FieldSpec::new("ServiceAccount", "secrets/name"));
        secret.push(FieldSpec::new("ServiceAccount", "imagePullSecrets/name"));

        Self {
            name_reference: vec![
                NameReference {
                    version: "v1".into(),
                    kind: "ConfigMap".into(),
                    field_specs: config_map,
                    ..Default::default()
                },
                NameReference {
                    version: "v1".into(),
                    kind: "Secret".into(),
                    field_specs: secret,
                    ..Default::default()
                },
            ],
            var_reference: vars,
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Builtin rules merged with every configuration file in `paths`
    pub fn load(loader: &Loader, paths: &[String]) -> Result<Self> {
        let mut rules = Self::builtin();
        for path in paths {
            let custom = Self::from_yaml_str(&loader.load(path)?)?;
            rules.merge(custom);
        }
        Ok(rules)
    }

    /// Adds rules from `other`; field specs already present are skipped
    pub fn merge(&mut self, other: ReferenceRules) {
        for incoming in other.name_reference {
            match self
                .name_reference
                .iter_mut()
                .find(|existing| existing.gvk() == incoming.gvk())
            {
                Some(existing) => {
                    for spec in incoming.field_specs {
                        if !existing.field_specs.contains(&spec) {
                            existing.field_specs.push(spec);
                        }
                    }
                }
                None => self.name_reference.push(incoming),
            }
        }

        for spec in other.var_reference {
            if !self.var_reference.contains(&spec) {
                self.var_reference.push(spec);
            }
        }
    }
}

/// Points at documents by `apiVersion`, `kind` and `name`; empty parts match anything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

impl ObjectRef {
    pub fn gvk(&self) -> Gvk {
        Gvk::from_api_version(&self.api_version, &self.kind)
    }

    pub fn matches(&self, document: &Document) -> bool {
        document.gvk().is_selected(&self.gvk())
            && (self.name.is_empty() || self.name == document.name())
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.api_version, self.kind, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    #[serde(rename = "fieldpath", alias = "fieldPath")]
    pub field_path: String,
}

impl Default for FieldRef {
    fn default() -> Self {
        Self {
            field_path: "metadata.name".into(),
        }
    }
}

/// A named value read from the field `fieldref` of the document `objref`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Var {
    #[serde(default)]
    pub name: String,
    pub objref: ObjectRef,
    #[serde(default)]
    pub fieldref: FieldRef,
}

/// A document formerly known as `from` is now named `to`
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct Rename {
    pub from: ResId,
    pub to: String,
}

/// Rewrites name references after a batch of renames
#[derive(Debug, derive_new::new)]
pub struct ReferenceRepairer<'r> {
    rules: &'r ReferenceRules,
}

impl ReferenceRepairer<'_> {
    /// Applies all `renames` to every referring field of every document in `store`
    ///
    /// The whole batch is applied at once per field, so the order of `renames` does not matter.
    /// Fields are never created. Returns the number of rewritten values.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn repair(&self, store: &mut DocumentStore, renames: &[Rename]) -> Result<usize> {
        if renames.is_empty() {
            return Ok(0);
        }

        let mut rewritten = 0;
        for document in store.iter_mut() {
            let gvk = document.gvk();
            let namespace = document.namespace().to_string();

            let mut by_path: IndexMap<&str, Vec<(&str, &str)>> = IndexMap::new();
            for rename in renames.iter().filter(|r| r.from.is_in_namespace(&namespace)) {
                for rule in self
                    .rules
                    .name_reference
                    .iter()
                    .filter(|rule| rename.from.gvk.is_selected(&rule.gvk()))
                {
                    for spec in rule.field_specs.iter().filter(|s| s.applies_to(&gvk)) {
                        let pairs = by_path.entry(spec.path.as_str()).or_default();
                        let pair = (rename.from.name.as_str(), rename.to.as_str());
                        if !pairs.contains(&pair) {
                            pairs.push(pair);
                        }
                    }
                }
            }

            for (path, pairs) in by_path {
                let path = FieldPath::parse(path)?;
                let mut rewriter = NameRewriter::new(&pairs);
                path_matcher::apply_tree(document.tree_mut(), &path, false, &mut |mut value: Value| {
                    value.visit_strings_mut(&mut rewriter);
                    Ok(value)
                })?;
                rewritten += rewriter.rewritten();
            }
        }

        tracing::debug!(renames = renames.len(), rewritten, "references repaired");
        Ok(rewritten)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::documents;
    use pretty_assertions::assert_eq;

    fn config_map(name: &str) -> ResId {
        ResId::new(Gvk::new("", "v1", "ConfigMap"), "", name)
    }

    const STORE: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      volumes:
      - name: config
        configMap:
          name: settings
      - name: other
        secret:
          secretName: settings
      containers:
      - name: web
        envFrom:
        - configMapRef:
            name: settings
        - configMapRef:
            name: features
---
apiVersion: v1
kind: Service
metadata:
  name: settings
spec:
  selector:
    app: settings
"#;

    #[test]
    fn repairs_every_referring_field() {
        let mut store = documents!(STORE);
        let rules = ReferenceRules::builtin();

        let renames = vec![
            Rename::new(config_map("settings"), "settings-renamed".into()),
            Rename::new(config_map("features"), "features-renamed".into()),
        ];
        let count = ReferenceRepairer::new(&rules).repair(&mut store, &renames).unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            store.get_by_index(0).unwrap().to_yaml().unwrap(),
            r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      volumes:
      - name: config
        configMap:
          name: settings-renamed
      - name: other
        secret:
          secretName: settings
      containers:
      - name: web
        envFrom:
        - configMapRef:
            name: settings-renamed
        - configMapRef:
            name: features-renamed
"#
        );
    }

    #[test]
    fn unrelated_documents_are_untouched() {
        let mut store = documents!(STORE);
        let service_before = store.get_by_index(1).unwrap().clone();

        let rules = ReferenceRules::builtin();
        let renames = vec![Rename::new(config_map("settings"), "settings-x".into())];
        ReferenceRepairer::new(&rules).repair(&mut store, &renames).unwrap();

        assert_eq!(store.get_by_index(1).unwrap(), &service_before);
        // the secret volume refers to a Secret, not to the renamed ConfigMap
        let secret_name = path_matcher::lookup(
            store.get_by_index(0).unwrap().tree(),
            &FieldPath::parse("spec/template/spec/volumes/secret/secretName").unwrap(),
        )
        .unwrap();
        assert_eq!(secret_name, Some(&Value::from("settings")));
    }

    #[test]
    fn namespaces_must_match() {
        let mut store = documents!(STORE);
        let before = store.clone();

        let rules = ReferenceRules::builtin();
        let other_namespace = ResId::new(Gvk::new("", "v1", "ConfigMap"), "prod", "settings");
        let renames = vec![Rename::new(other_namespace, "settings-x".into())];

        let count = ReferenceRepairer::new(&rules).repair(&mut store, &renames).unwrap();
        assert_eq!(count, 0);
        assert_eq!(store, before);

        let default_namespace = ResId::new(Gvk::new("", "v1", "ConfigMap"), "default", "settings");
        let renames = vec![Rename::new(default_namespace, "settings-x".into())];
        let count = ReferenceRepairer::new(&rules).repair(&mut store, &renames).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn no_renames_no_changes() {
        let mut store = documents!(STORE);
        let before = store.clone();
        let rules = ReferenceRules::builtin();

        assert_eq!(ReferenceRepairer::new(&rules).repair(&mut store, &[]).unwrap(), 0);
        assert_eq!(store, before);
    }

    #[test]
    fn object_ref_wildcards() {
        let store = documents!(STORE);
        let deployment = store.get_by_index(0).unwrap();

        let by_kind = ObjectRef {
            kind: "Deployment".into(),
            ..Default::default()
        };
        assert!(by_kind.matches(deployment));

        let by_group = ObjectRef {
            api_version: "apps/".into(),
            kind: "Deployment".into(),
            name: "web".into(),
        };
        assert!(by_group.matches(deployment));

        let other_name = ObjectRef {
            name: "api".into(),
            ..by_group
        };
        assert!(!other_name.matches(deployment));
    }

    #[test]
    fn var_defaults_to_name_field() {
        let var: Var = serde_yaml::from_str("name: APP\nobjref:\n  kind: Deployment\n").unwrap();
        assert_eq!(var.fieldref.field_path, "metadata.name");
    }

    #[test]
    fn custom_rules_merge_without_duplicates() {
        let mut rules = ReferenceRules::builtin();
        let builtin_count = rules.name_reference[0].field_specs.len();

        let custom = ReferenceRules::from_yaml_str(
            r#"
nameReference:
- kind: ConfigMap
  version: v1
  fieldSpecs:
  - kind: Deployment
    path: spec/template/spec/volumes/configMap/name
  - kind: MyResource
    path: spec/configName
- kind: Service
  fieldSpecs:
  - kind: Ingress
    path: spec/rules/http/paths/backend/service/name
varReference:
- kind: MyResource
  path: spec/command
"#,
        )
        .unwrap();
        rules.merge(custom);

        assert_eq!(rules.name_reference.len(), 3);
        assert_eq!(rules.name_reference[0].field_specs.len(), builtin_count + 1);
        assert!(rules
            .var_reference
            .contains(&FieldSpec::new("MyResource", "spec/command")));
    }
}
