//! Post-processing steps applied to a freshly decoded scene.
//!
//! The importer runs the enabled steps in one fixed order: default-material
//! substitution, normal generation, UV transform baking, component removal,
//! validation. Every step mutates the scene in place.

pub(crate) mod default_material;
pub(crate) mod normals;
pub(crate) mod remove_component;
pub(crate) mod spatial;
pub(crate) mod uv_transform;
pub(crate) mod validate;

pub use self::{
    remove_component::ComponentFlags, spatial::SpatialSort, uv_transform::UvTransform,
};

use crate::{config::Config, scene::Scene, Error};

bitflags! {
    pub struct PostProcessFlags: u32 {
        const REPLACE_DEFAULT_MATERIAL = 0x1;
        const GEN_NORMALS = 0x2;
        const BAKE_UV_TRANSFORMS = 0x4;
        const REMOVE_COMPONENTS = 0x8;
        const VALIDATE = 0x10;
    }
}

impl Default for PostProcessFlags {
    fn default() -> Self {
        Self::REPLACE_DEFAULT_MATERIAL
            | Self::GEN_NORMALS
            | Self::BAKE_UV_TRANSFORMS
            | Self::REMOVE_COMPONENTS
            | Self::VALIDATE
    }
}

/// Runs the configured steps over `scene`, in the fixed pipeline order.
pub fn run(scene: &mut Scene, config: &Config, flags: PostProcessFlags) -> Result<(), Error> {
    if flags.contains(PostProcessFlags::REPLACE_DEFAULT_MATERIAL) {
        default_material::replace(scene);
    }

    if flags.contains(PostProcessFlags::GEN_NORMALS) {
        normals::generate(scene);
    }

    if flags.contains(PostProcessFlags::BAKE_UV_TRANSFORMS) {
        uv_transform::bake(scene, config);
    }

    if flags.contains(PostProcessFlags::REMOVE_COMPONENTS) {
        let mask = ComponentFlags::from_bits_truncate(config.remove_components());
        if !mask.is_empty() {
            remove_component::remove(scene, mask);
        }
    }

    if flags.contains(PostProcessFlags::VALIDATE) {
        validate::validate(scene)?;
    }

    Ok(())
}
