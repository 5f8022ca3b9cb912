//! Materials as typed, keyed property bags.
//!
//! A property is addressed by `(name, texture kind, texture index)`; plain
//! material properties leave the texture parts empty. Values carry one of
//! four type tags and are replaced wholesale when a key is re-added.

use {
    crate::math::{vec3, Vec3},
    std::fmt::{Display, Formatter, Result as FmtResult},
};

/// Longest stored string, in bytes. Longer inputs are truncated.
pub const MAX_STRING_LEN: usize = 1023;

// Canonical property key spellings.
pub const KEY_NAME: &str = "?mat.name";
pub const KEY_COLOR_DIFFUSE: &str = "$clr.diffuse";
pub const KEY_COLOR_SPECULAR: &str = "$clr.specular";
pub const KEY_COLOR_AMBIENT: &str = "$clr.ambient";
pub const KEY_COLOR_EMISSIVE: &str = "$clr.emissive";
pub const KEY_OPACITY: &str = "$mat.opacity";
pub const KEY_BUMP_SCALING: &str = "$mat.bumpscaling";
pub const KEY_SHININESS: &str = "$mat.shininess";
pub const KEY_SHININESS_STRENGTH: &str = "$mat.shinpercent";
pub const KEY_REFRACTION_INDEX: &str = "$mat.refracti";
pub const KEY_SHADING_MODEL: &str = "$mat.shadingm";
pub const KEY_WIREFRAME: &str = "$mat.wireframe";
pub const KEY_TWO_SIDED: &str = "$mat.twosided";
pub const KEY_BACKGROUND_IMAGE: &str = "?bg.global";

/// Shading model codes stored under [`KEY_SHADING_MODEL`].
pub mod shading {
    pub const FLAT: i32 = 1;
    pub const GOURAUD: i32 = 2;
    pub const PHONG: i32 = 3;
    pub const COOK_TORRANCE: i32 = 4;
    pub const TOON: i32 = 5;
    pub const FRESNEL: i32 = 6;
    pub const NONE: i32 = 9;
}

/// What a texture is applied to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TextureKind {
    Ambient,
    Diffuse,
    Emissive,
    Height,
    Opacity,
    Reflection,
    Shininess,
    Specular,
}

impl TextureKind {
    pub const ALL: [Self; 8] = [
        Self::Diffuse,
        Self::Specular,
        Self::Ambient,
        Self::Emissive,
        Self::Opacity,
        Self::Height,
        Self::Shininess,
        Self::Reflection,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::Diffuse => "diffuse",
            Self::Emissive => "emissive",
            Self::Height => "height",
            Self::Opacity => "opacity",
            Self::Reflection => "reflection",
            Self::Shininess => "shininess",
            Self::Specular => "specular",
        }
    }
}

/// Which per-texture attribute a key addresses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TextureStack {
    Axis,
    Blend,
    File,
    Flags,
    MapModeU,
    MapModeV,
    Op,
    Transform,
    UvwSrc,
}

impl TextureStack {
    fn name(self) -> &'static str {
        match self {
            Self::Axis => "$tex.mapaxis",
            Self::Blend => "$tex.blend",
            Self::File => "$tex.file",
            Self::Flags => "$tex.flags",
            Self::MapModeU => "$tex.mapmodeu",
            Self::MapModeV => "$tex.mapmodev",
            Self::Op => "$tex.op",
            Self::Transform => "$tex.uvtrafo",
            Self::UvwSrc => "$tex.uvwsrc",
        }
    }
}

/// Full address of one property within a material.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PropertyKey {
    pub name: String,
    pub texture: Option<(TextureKind, u32)>,
}

impl PropertyKey {
    pub fn scalar<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            texture: None,
        }
    }

    pub fn texture(stack: TextureStack, kind: TextureKind, index: u32) -> Self {
        Self {
            name: stack.name().to_owned(),
            texture: Some((kind, index)),
        }
    }
}

impl Display for PropertyKey {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self.texture {
            Some((kind, index)) => write!(f, "{}.{}[{}]", self.name, kind.name(), index),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A property value with its type tag.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Buffer(Vec<u8>),
    Floats(Vec<f32>),
    Ints(Vec<i32>),
    Str(String),
}

/// Conversion from a stored property into a caller-facing type.
///
/// Returns `None` when the type tag does not match; there is no implicit
/// numeric coercion.
pub trait FromProperty: Sized {
    fn from_property(value: &PropertyValue) -> Option<Self>;
}

impl FromProperty for f32 {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Floats(data) => data.first().copied(),
            _ => None,
        }
    }
}

impl FromProperty for i32 {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Ints(data) => data.first().copied(),
            _ => None,
        }
    }
}

impl FromProperty for String {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Str(data) => Some(data.clone()),
            _ => None,
        }
    }
}

impl FromProperty for Vec3 {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Floats(data) if data.len() >= 3 => {
                Some(vec3(data[0], data[1], data[2]))
            }
            _ => None,
        }
    }
}

impl FromProperty for Vec<f32> {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Floats(data) => Some(data.clone()),
            _ => None,
        }
    }
}

/// One material: an ordered bag of uniquely keyed properties.
#[derive(Clone, Debug, Default)]
pub struct Material {
    props: Vec<(PropertyKey, PropertyValue)>,
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any existing property with the
    /// same key.
    pub fn add(&mut self, key: PropertyKey, value: PropertyValue) {
        if let Some(existing) = self.props.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.props.push((key, value));
        }
    }

    pub fn add_str<S: Into<String>>(&mut self, key: PropertyKey, value: S) {
        let mut value = value.into();
        if value.len() > MAX_STRING_LEN {
            warn!("material string for {} truncated to {} bytes", key, MAX_STRING_LEN);
            let mut cut = MAX_STRING_LEN;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            value.truncate(cut);
        }

        self.add(key, PropertyValue::Str(value));
    }

    pub fn add_f32(&mut self, key: PropertyKey, value: f32) {
        self.add(key, PropertyValue::Floats(vec![value]));
    }

    pub fn add_i32(&mut self, key: PropertyKey, value: i32) {
        self.add(key, PropertyValue::Ints(vec![value]));
    }

    pub fn add_color(&mut self, key: PropertyKey, value: Vec3) {
        self.add(key, PropertyValue::Floats(vec![value.x, value.y, value.z]));
    }

    /// Deletes the property stored under `key`, if any.
    pub fn remove(&mut self, key: &PropertyKey) {
        self.props.retain(|(k, _)| k != key);
    }

    pub fn value(&self, key: &PropertyKey) -> Option<&PropertyValue> {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// Fetches a property coerced to `T`, or `None` when it is absent or its
    /// type tag differs.
    pub fn get<T: FromProperty>(&self, key: &PropertyKey) -> Option<T> {
        self.value(key).and_then(T::from_property)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(PropertyKey, PropertyValue)> {
        self.props.iter()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn name(&self) -> Option<String> {
        self.get(&PropertyKey::scalar(KEY_NAME))
    }

    /// Number of texture slots of the given kind, counted densely from zero.
    pub fn texture_count(&self, kind: TextureKind) -> u32 {
        let mut index = 0;
        while self
            .value(&PropertyKey::texture(TextureStack::File, kind, index))
            .is_some()
        {
            index += 1;
        }

        index
    }

    /// Whether any texture slot of any kind is populated.
    pub fn has_any_texture(&self) -> bool {
        TextureKind::ALL
            .iter()
            .any(|kind| self.texture_count(*kind) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn add_replaces_same_key() {
        let mut mat = Material::new();
        mat.add_f32(PropertyKey::scalar(KEY_OPACITY), 0.5);
        mat.add_f32(PropertyKey::scalar(KEY_OPACITY), 1.0);

        assert_eq!(mat.len(), 1);
        assert_eq!(mat.get::<f32>(&PropertyKey::scalar(KEY_OPACITY)), Some(1.0));
    }

    #[test]
    pub fn typed_get_rejects_mismatched_tag() {
        let mut mat = Material::new();
        mat.add_i32(PropertyKey::scalar(KEY_SHADING_MODEL), shading::PHONG);

        assert_eq!(mat.get::<f32>(&PropertyKey::scalar(KEY_SHADING_MODEL)), None);
        assert_eq!(
            mat.get::<i32>(&PropertyKey::scalar(KEY_SHADING_MODEL)),
            Some(shading::PHONG)
        );
    }

    #[test]
    pub fn texture_keys_are_indexed() {
        let mut mat = Material::new();
        mat.add_str(
            PropertyKey::texture(TextureStack::File, TextureKind::Diffuse, 0),
            "base.png",
        );
        mat.add_str(
            PropertyKey::texture(TextureStack::File, TextureKind::Diffuse, 1),
            "detail.png",
        );

        assert_eq!(mat.texture_count(TextureKind::Diffuse), 2);
        assert_eq!(mat.texture_count(TextureKind::Specular), 0);
        assert!(mat.has_any_texture());
    }

    #[test]
    pub fn strings_are_capped() {
        let mut mat = Material::new();
        mat.add_str(PropertyKey::scalar(KEY_NAME), "x".repeat(4096));

        assert_eq!(mat.name().unwrap().len(), MAX_STRING_LEN);
    }

    #[test]
    pub fn key_display_forms() {
        assert_eq!(PropertyKey::scalar(KEY_NAME).to_string(), "?mat.name");
        assert_eq!(
            PropertyKey::texture(TextureStack::File, TextureKind::Diffuse, 0).to_string(),
            "$tex.file.diffuse[0]"
        );
        assert_eq!(
            PropertyKey::texture(TextureStack::UvwSrc, TextureKind::Height, 2).to_string(),
            "$tex.uvwsrc.height[2]"
        );
    }
}
