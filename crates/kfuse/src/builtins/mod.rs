//! plugins shipped with kfuse
//!
//! | kind                  | generator | transformer |
//! |-----------------------|-----------|-------------|
//! | `ConfigMapGenerator`  | yes       |             |
//! | `SecretGenerator`     | yes       |             |
//! | `SuperConfigMap`      | yes       | yes         |
//! | `SuperSecret`         | yes       | yes         |
//! | `SearchReplace`       |           | yes         |
//! | `FullPath`            |           | yes         |
//! | `SuperVars`           |           | yes         |
//! | `SelectivePatch`      |           | yes         |
//! | `ImageTagTransformer` |           | yes         |
mod data_map;
mod full_path;
mod image_tag;
mod search_replace;
mod selective_patch;
mod super_map;
mod super_vars;

pub use data_map::{
    ConfigMapSource, DataMapGenerator, MapArgs, MapDecorator, MapSource, SecretSource,
};
pub use full_path::FullPath;
pub use image_tag::{ImageTag, ImageTagTransformer};
pub use search_replace::SearchReplace;
pub use selective_patch::SelectivePatch;
pub use super_map::{SuperMap, SuperMapArgs};
pub use super_vars::SuperVars;

pub type ConfigMapGenerator = DataMapGenerator<ConfigMapSource>;
pub type SecretGenerator = DataMapGenerator<SecretSource>;
pub type SuperConfigMap = SuperMap<ConfigMapGenerator>;
pub type SuperSecret = SuperMap<SecretGenerator>;
