//! targeting documents
//!
//! - [Selector] picks whole documents (kind/name/namespace/labels/annotations)
//! - [FieldSpec] picks a field path inside documents of a given kind
use crate::document::Document;
use crate::error::{Error, Result};
use crate::field_path::FieldPath;
use crate::resid::Gvk;
use crate::value::{Object, Value};
use serde::{Deserialize, Serialize};

/// Conjunctive document filter; empty fields match anything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Selector {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// `key=value` pairs separated by `,`
    pub label_selector: String,
    /// `key=value` pairs separated by `,`
    pub annotation_selector: String,
}

impl Selector {
    pub fn gvk(&self) -> Gvk {
        Gvk::new(&self.group, &self.version, &self.kind)
    }

    pub(crate) fn matcher(&self) -> Result<SelectorMatcher<'_>> {
        Ok(SelectorMatcher {
            selector: self,
            gvk: self.gvk(),
            labels: parse_pairs(&self.label_selector)?,
            annotations: parse_pairs(&self.annotation_selector)?,
        })
    }

    pub fn matches(&self, document: &Document) -> Result<bool> {
        Ok(self.matcher()?.matches(document))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = vec![];
        for (key, value) in [
            ("group", &self.group),
            ("version", &self.version),
            ("kind", &self.kind),
            ("namespace", &self.namespace),
            ("name", &self.name),
            ("labels", &self.label_selector),
            ("annotations", &self.annotation_selector),
        ] {
            if !value.is_empty() {
                parts.push(format!("{key}={value}"));
            }
        }
        write!(f, "[{}]", parts.join(" "))
    }
}

pub(crate) struct SelectorMatcher<'s> {
    selector: &'s Selector,
    gvk: Gvk,
    labels: Vec<(String, String)>,
    annotations: Vec<(String, String)>,
}

impl SelectorMatcher<'_> {
    pub(crate) fn matches(&self, document: &Document) -> bool {
        document.gvk().is_selected(&self.gvk)
            && (self.selector.name.is_empty() || self.selector.name == document.name())
            && (self.selector.namespace.is_empty()
                || self.selector.namespace == document.namespace())
            && contains_all(document.labels(), &self.labels)
            && contains_all(document.annotations(), &self.annotations)
    }
}

fn contains_all(map: Option<&Object>, pairs: &[(String, String)]) -> bool {
    pairs.iter().all(|(key, expected)| {
        map.and_then(|m| m.get(key))
            .and_then(Value::scalar_text)
            .is_some_and(|actual| &actual == expected)
    })
}

fn parse_pairs(selector: &str) -> Result<Vec<(String, String)>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(Error::configuration(
                "selector",
                format!("expected key=value, found '{pair}'"),
            )),
        })
        .collect()
}

/// Filter over document gvk plus a field path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    pub path: String,
    #[serde(default, alias = "create")]
    pub create_if_not_present: bool,
}

impl FieldSpec {
    pub fn new(kind: &str, path: &str) -> Self {
        Self {
            kind: kind.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn gvk(&self) -> Gvk {
        Gvk::new(&self.group, &self.version, &self.kind)
    }

    pub fn applies_to(&self, gvk: &Gvk) -> bool {
        gvk.is_selected(&self.gvk())
    }

    pub fn field_path(&self) -> Result<FieldPath> {
        Ok(FieldPath::parse(&self.path)?)
    }
}
