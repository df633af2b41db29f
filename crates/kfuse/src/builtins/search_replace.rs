//! regex search and replace inside selected documents
//!
//! ```yaml
//! apiVersion: kfuse/v1
//! kind: SearchReplace
//! target:
//!   kind: Deployment
//! path: spec/template/spec/containers/image
//! search: ^registry.local/
//! replace: registry.example.com/
//! ```
//!
//! The replacement is taken from the first of
//! - `replace`: a string, integer, boolean or decimal
//! - `replaceWithObjRef`: a field of another document (`objref` + `fieldref.fieldpath`)
//! - `replaceWithEnvVar`: an environment variable, empty when unset
//!
//! Scalars are searched in their text form. A scalar that does not change keeps its node. Objects
//! and lists are searched in their JSON text, which allows replacing keys. The path `/` searches
//! the whole document.
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::field_path::FieldPath;
use crate::path_matcher::{self, PathMatcher};
use crate::plugin::{decode_config, PluginHelpers, Transformer};
use crate::reference::Var;
use crate::selector::Selector;
use crate::value::Value;
use regex::Regex;
use serde::Deserialize;

const KIND: &str = "SearchReplace";

/// Node type of a changed scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ReplaceType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "float64")]
    Float64,
}

impl ReplaceType {
    fn of(value: &Value) -> Self {
        match value {
            Value::Integer(_) => ReplaceType::Int64,
            Value::Boolean(_) => ReplaceType::Bool,
            Value::Decimal(_) => ReplaceType::Float64,
            _ => ReplaceType::String,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ReplaceType::String => "string",
            ReplaceType::Int64 => "int64",
            ReplaceType::Bool => "bool",
            ReplaceType::Float64 => "float64",
        }
    }

    fn convert(self, text: String) -> Result<Value> {
        let parsed = match self {
            ReplaceType::String => return Ok(Value::String(text)),
            ReplaceType::Int64 => text.parse().map(Value::Integer).ok(),
            ReplaceType::Bool => text.parse().map(Value::Boolean).ok(),
            ReplaceType::Float64 => text.parse().map(Value::Decimal).ok(),
        };
        parsed.ok_or_else(|| {
            Error::configuration(KIND, format!("'{text}' is not a valid {}", self.name()))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReplaceArgs {
    pub target: Selector,
    pub path: String,
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub replace: Value,
    #[serde(default)]
    pub replace_with_env_var: String,
    #[serde(default)]
    pub replace_with_obj_ref: Option<Var>,
    #[serde(default)]
    pub replace_type: Option<ReplaceType>,
}

struct Configured {
    args: SearchReplaceArgs,
    path: FieldPath,
    search: Regex,
}

/// Replacement text plus the typed value it came from
#[derive(Debug)]
struct Replacement {
    text: String,
    value: Value,
}

impl Replacement {
    fn new(value: Value) -> Result<Self> {
        let text = value.scalar_text().ok_or_else(|| {
            let found = value.type_name();
            Error::configuration(KIND, format!("replacement must be a scalar, found {found}"))
        })?;
        Ok(Self { text, value })
    }

    fn text(text: String) -> Self {
        Self {
            value: Value::String(text.clone()),
            text,
        }
    }
}

#[derive(Default)]
pub struct SearchReplace {
    configured: Option<Configured>,
    matcher: PathMatcher,
}

impl SearchReplace {
    fn configured(&self) -> Result<&Configured> {
        self.configured
            .as_ref()
            .ok_or_else(|| Error::configuration(KIND, "plugin was not configured"))
    }

    /// `None` when the referenced object does not exist
    fn replacement(&self, store: &DocumentStore) -> Result<Option<Replacement>> {
        let args = &self.configured()?.args;

        if !matches!(&args.replace, Value::Null) && args.replace != Value::from("") {
            return Replacement::new(args.replace.clone()).map(Some);
        }

        if let Some(var) = &args.replace_with_obj_ref {
            let path = FieldPath::parse(&var.fieldref.field_path)?;
            for document in store.iter().filter(|document| var.objref.matches(document)) {
                match self.field_value(document.kind(), document.tree(), &path) {
                    Ok(Some(replacement)) => return Ok(Some(replacement)),
                    Ok(None) => {
                        tracing::debug!(id=?document.id(), path=%path, "referenced field not found")
                    }
                    Err(error) => {
                        tracing::debug!(id=?document.id(), path=%path, %error, "referenced field unusable")
                    }
                }
            }
            return Ok(None);
        }

        if !args.replace_with_env_var.is_empty() {
            let value = std::env::var(&args.replace_with_env_var).unwrap_or_default();
            return Ok(Some(Replacement::text(value)));
        }

        Ok(Some(Replacement::text(String::new())))
    }

    fn field_value(&self, kind: &str, tree: &Value, path: &FieldPath) -> Result<Option<Replacement>> {
        let Some(value) = path_matcher::lookup(tree, path)? else {
            return Ok(None);
        };

        let mut replacement = Replacement::new(value.clone())?;
        if let (true, Value::String(encoded)) = (self.matcher.is_binary(kind, path), value) {
            replacement.text = path_matcher::decode(encoded).map_err(|message| Error::Encoding {
                path: path.to_string(),
                message,
            })?;
        }
        Ok(Some(replacement))
    }
}

impl Configured {
    fn replace(&self, value: Value, replacement: &Replacement) -> Result<Value> {
        match value {
            Value::Array(_) | Value::Object(_) => {
                let json = serde_json::to_string(&value)?;
                let replaced = self.search.replace_all(&json, replacement.text.as_str());
                Ok(serde_json::from_str(&replaced)?)
            }
            Value::Null => Ok(value),
            scalar => {
                let Some(text) = scalar.scalar_text() else {
                    return Ok(scalar);
                };
                let replaced = self.search.replace_all(&text, replacement.text.as_str());
                if replaced == text {
                    return Ok(scalar);
                }

                let replace_type = match self.args.replace_type {
                    Some(replace_type) => replace_type,
                    None if replaced == replacement.text => ReplaceType::of(&replacement.value),
                    None => ReplaceType::String,
                };
                replace_type.convert(replaced.into_owned())
            }
        }
    }
}

impl Transformer for SearchReplace {
    fn configure(&mut self, _helpers: &PluginHelpers, config: &Value) -> Result<()> {
        let args: SearchReplaceArgs = decode_config(KIND, config)?;
        let path = FieldPath::parse(&args.path)?;
        let search = Regex::new(&args.search)?;
        self.configured = Some(Configured { args, path, search });
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn transform(&mut self, store: &mut DocumentStore) -> Result<()> {
        let Some(replacement) = self.replacement(store)? else {
            tracing::info!("referenced object not found, nothing replaced");
            return Ok(());
        };
        let configured = self.configured()?;

        let mut replaced = 0;
        for document in store.select_mut(&configured.args.target)? {
            if configured.path.is_root() {
                let tree = configured.replace(document.tree().clone(), &replacement)?;
                if tree.as_object().is_none() {
                    return Err(Error::InvalidDocument(format!(
                        "replacing in {:?} did not produce an object",
                        document.id()
                    )));
                }
                document.set_tree(tree)?;
                replaced += 1;
            } else {
                replaced += self.matcher.apply(document, &configured.path, false, &mut |value| {
                    configured.replace(value, &replacement)
                })?;
            }
        }

        tracing::debug!(search=%configured.search, replaced, "search and replace");
        Ok(())
    }
}
