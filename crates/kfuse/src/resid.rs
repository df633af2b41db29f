//! document identity
//!
//! A document is identified by group, version, kind, namespace and name ([ResId]).
use serde::{Deserialize, Serialize};

/// Group, version and kind of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Split an `apiVersion` (`group/version`, or just `version` for the core group)
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.rsplit_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Whether this gvk is matched by `selector`. Empty selector fields match anything.
    pub fn is_selected(&self, selector: &Gvk) -> bool {
        (selector.group.is_empty() || selector.group == self.group)
            && (selector.version.is_empty() || selector.version == self.version)
            && (selector.kind.is_empty() || selector.kind == self.kind)
    }
}

/// Unique identity of a document within a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResId {
    pub gvk: Gvk,
    pub namespace: String,
    pub name: String,
}

impl ResId {
    pub fn new(gvk: Gvk, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Namespace comparison where the empty namespace is the `default` namespace
    pub fn is_in_namespace(&self, namespace: &str) -> bool {
        normalize_namespace(&self.namespace) == normalize_namespace(namespace)
    }
}

fn normalize_namespace(namespace: &str) -> &str {
    if namespace.is_empty() {
        "default"
    } else {
        namespace
    }
}

impl std::fmt::Display for ResId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let group = if self.gvk.group.is_empty() {
            "[noGrp]"
        } else {
            self.gvk.group.as_str()
        };
        let namespace = if self.namespace.is_empty() {
            "[noNs]"
        } else {
            self.namespace.as_str()
        };
        write!(
            f,
            "{}.{}.{}/{}.{}",
            self.gvk.kind, self.gvk.version, group, self.name, namespace
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn api_version_split() {
        assert_eq!(Gvk::from_api_version("v1", "ConfigMap"), Gvk::new("", "v1", "ConfigMap"));
        assert_eq!(
            Gvk::from_api_version("apps/v1", "Deployment"),
            Gvk::new("apps", "v1", "Deployment")
        );
        assert_eq!(Gvk::new("apps", "v1", "Deployment").api_version(), "apps/v1");
    }

    #[test]
    fn empty_selector_fields_match_anything() {
        let gvk = Gvk::new("apps", "v1", "Deployment");
        assert!(gvk.is_selected(&Gvk::default()));
        assert!(gvk.is_selected(&Gvk::new("", "", "Deployment")));
        assert!(!gvk.is_selected(&Gvk::new("", "", "StatefulSet")));
        assert!(!gvk.is_selected(&Gvk::new("batch", "", "")));
    }

    #[test]
    fn default_namespace_is_empty_namespace() {
        let id = ResId::new(Gvk::new("", "v1", "ConfigMap"), "", "cm");
        assert!(id.is_in_namespace("default"));
        assert!(id.is_in_namespace(""));
        assert!(!id.is_in_namespace("kube-system"));
    }

    #[test]
    fn display() {
        let id = ResId::new(Gvk::new("", "v1", "ConfigMap"), "", "cm");
        assert_eq!(id.to_string(), "ConfigMap.v1.[noGrp]/cm.[noNs]");
    }
}
