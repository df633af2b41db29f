//! rewrites container images
//!
//! ```yaml
//! apiVersion: kfuse/v1
//! kind: ImageTagTransformer
//! imageTag:
//!   name: nginx
//!   newName: registry.example.com/nginx
//!   newTag: "1.27"
//! fieldSpecs:
//! - kind: CronTab
//!   path: spec/image
//! ```
//!
//! Every `image` of a `containers` or `initContainers` list anywhere in a document is updated
//! when its name (without tag or digest) equals `imageTag.name`, then the fields named by
//! `fieldSpecs`. A `digest` takes precedence over `newTag`; without either the old tag or digest
//! is kept.
use crate::documents::DocumentStore;
use crate::error::{Error, Result};
use crate::path_matcher;
use crate::plugin::{decode_config, PluginHelpers, Transformer};
use crate::selector::FieldSpec;
use crate::value::Value;
use serde::Deserialize;

const KIND: &str = "ImageTagTransformer";

const CONTAINER_LISTS: [&str; 2] = ["containers", "initContainers"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageTag {
    pub name: String,
    pub new_name: String,
    pub new_tag: String,
    pub digest: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageTagArgs {
    pub image_tag: ImageTag,
    pub field_specs: Vec<FieldSpec>,
}

#[derive(Debug, Default)]
pub struct ImageTagTransformer {
    args: ImageTagArgs,
}

impl ImageTag {
    /// The updated image, `None` when `image` is another image
    fn update(&self, image: &str) -> Option<String> {
        let (name, suffix) = split_image(image);
        if name != self.name {
            return None;
        }
        Some(self.render(name, suffix))
    }

    fn render(&self, name: &str, suffix: &str) -> String {
        let name = if self.new_name.is_empty() {
            name
        } else {
            &self.new_name
        };
        let suffix = if !self.digest.is_empty() {
            format!("@{}", self.digest)
        } else if !self.new_tag.is_empty() {
            format!(":{}", self.new_tag)
        } else {
            suffix.to_string()
        };
        format!("{name}{suffix}")
    }

    fn rewrite(&self, value: Value) -> Value {
        match value {
            Value::String(image) => match self.update(&image) {
                Some(updated) => Value::String(updated),
                None => Value::String(image),
            },
            // a created field gets the complete image
            Value::Null => Value::String(self.render(&self.name, "")),
            other => other,
        }
    }
}

/// Splits `registry:5000/name:tag` into `registry:5000/name` and `:tag` (or `@digest`)
fn split_image(image: &str) -> (&str, &str) {
    if let Some(at) = image.find('@') {
        return image.split_at(at);
    }
    let name_start = image.rfind('/').map_or(0, |slash| slash + 1);
    match image[name_start..].find(':') {
        Some(colon) => image.split_at(name_start + colon),
        None => (image, ""),
    }
}

fn rewrite_containers(node: &mut Value, image_tag: &ImageTag) -> usize {
    let mut updated = 0;
    match node {
        Value::Object(object) => {
            for (key, value) in object.iter_mut() {
                if let (true, Value::Array(containers)) =
                    (CONTAINER_LISTS.contains(&key.as_str()), &mut *value)
                {
                    for container in containers.iter_mut() {
                        let image = container
                            .as_object_mut()
                            .and_then(|container| container.get_mut("image"));
                        let Some(Value::String(image)) = image else {
                            continue;
                        };
                        if let Some(new_image) = image_tag.update(image) {
                            *image = new_image;
                            updated += 1;
                        }
                    }
                }
                updated += rewrite_containers(value, image_tag);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                updated += rewrite_containers(item, image_tag);
            }
        }
        _ => {}
    }
    updated
}

impl Transformer for ImageTagTransformer {
    fn configure(&mut self, _helpers: &PluginHelpers, config: &Value) -> Result<()> {
        self.args = decode_config(KIND, config)?;
        if self.args.image_tag.name.is_empty() {
            return Err(Error::configuration(KIND, "imageTag.name is required"));
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn transform(&mut self, store: &mut DocumentStore) -> Result<()> {
        let image_tag = &self.args.image_tag;

        let mut updated = 0;
        for document in store.iter_mut() {
            updated += rewrite_containers(document.tree_mut(), image_tag);

            let gvk = document.gvk();
            for spec in self.args.field_specs.iter().filter(|spec| spec.applies_to(&gvk)) {
                let path = spec.field_path()?;
                updated += path_matcher::apply_tree(
                    document.tree_mut(),
                    &path,
                    spec.create_if_not_present,
                    &mut |value| Ok(image_tag.rewrite(value)),
                )?;
            }
        }

        tracing::debug!(image = %image_tag.name, updated, "images updated");
        Ok(())
    }
}
