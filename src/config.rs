use {
    serde::{Deserialize, Serialize},
    toml::from_str,
};

/// A value accepted by [`Config::set`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Float(f32),
    Int(i64),
    Str(String),
}

impl From<bool> for ConfigValue {
    fn from(val: bool) -> Self {
        Self::Bool(val)
    }
}

impl From<f32> for ConfigValue {
    fn from(val: f32) -> Self {
        Self::Float(val)
    }
}

impl From<i64> for ConfigValue {
    fn from(val: i64) -> Self {
        Self::Int(val)
    }
}

impl From<&str> for ConfigValue {
    fn from(val: &str) -> Self {
        Self::Str(val.to_owned())
    }
}

impl ConfigValue {
    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(val) => Some(*val),
            Self::Int(val) => Some(*val != 0),
            _ => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Int(val) if *val >= 0 => Some(*val as u32),
            _ => None,
        }
    }

    fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(val) => Some(*val),
            Self::Int(val) => Some(*val as f32),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<String> {
        match self {
            Self::Str(val) => Some(val.clone()),
            Self::Int(val) => Some(val.to_string()),
            _ => None,
        }
    }
}

/// Importer configuration.
///
/// Every option has a sensible default; unset fields stay at it. Options can
/// be read from a TOML document (field names below) or poked individually
/// through [`Config::set`] using the dotted option keys
/// (`"pp.slm.triangle_limit"`, `"imp.lwo.layer"`, …).
#[derive(Debug, Default)]
pub struct Config {
    data: Data,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Data {
    ac_separate_backface_cull: Option<bool>,
    ase_reconstruct_normals: Option<bool>,
    global_keyframe: Option<u32>,
    irr_fps: Option<u32>,
    lwo_layer: Option<String>,
    mdl_color_map: Option<String>,
    normal_smoothing_angle: Option<f32>,
    og_allow_different_world_matrices: Option<bool>,
    og_min_faces: Option<u32>,
    remove_components: Option<u32>,
    sort_by_ptype_remove: Option<u32>,
    speed_flag: Option<bool>,
    tangent_smoothing_angle: Option<f32>,
    triangle_limit: Option<u32>,
    uv_legacy_rotation: Option<bool>,
    uv_transform_process: Option<u32>,
    vertex_limit: Option<u32>,
    weights_limit: Option<u32>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a config from TOML text; unknown or malformed documents fall
    /// back to the defaults.
    pub fn from_toml(text: &str) -> Self {
        Self {
            data: from_str(text).unwrap_or_else(|err| {
                warn!("config parse error, using defaults: {}", err);

                Data::default()
            }),
        }
    }

    /// Sets one option by its dotted key. Unknown keys and mismatched value
    /// types are logged and ignored.
    pub fn set<V: Into<ConfigValue>>(&mut self, key: &str, value: V) {
        let value = value.into();
        let accepted = match key {
            "pp.slm.triangle_limit" => put(&mut self.data.triangle_limit, value.as_u32()),
            "pp.slm.vertex_limit" => put(&mut self.data.vertex_limit, value.as_u32()),
            "pp.lbw.weights_limit" => put(&mut self.data.weights_limit, value.as_u32()),
            "imp.global.kf" => put(&mut self.data.global_keyframe, value.as_u32()),
            "imp.ac.sepbfcull" => put(&mut self.data.ac_separate_backface_cull, value.as_bool()),
            "imp.ase.reconn" => put(&mut self.data.ase_reconstruct_normals, value.as_bool()),
            "imp.lwo.layer" => put(&mut self.data.lwo_layer, value.as_str()),
            "imp.irr.fps" => put(&mut self.data.irr_fps, value.as_u32()),
            "imp.mdl.color_map" => put(&mut self.data.mdl_color_map, value.as_str()),
            "imp.speed_flag" => put(&mut self.data.speed_flag, value.as_bool()),
            "pp.ct.max_smoothing" => put(&mut self.data.tangent_smoothing_angle, value.as_f32()),
            "pp.gsn.max_smoothing" => put(&mut self.data.normal_smoothing_angle, value.as_f32()),
            "pp.og.min_faces" => put(&mut self.data.og_min_faces, value.as_u32()),
            "pp.og.allow_diffwm" => put(
                &mut self.data.og_allow_different_world_matrices,
                value.as_bool(),
            ),
            "pp.rvc.flags" => put(&mut self.data.remove_components, value.as_u32()),
            "pp.sbp.remove" => put(&mut self.data.sort_by_ptype_remove, value.as_u32()),
            "pp.tuv.process" => put(&mut self.data.uv_transform_process, value.as_u32()),
            "pp.tuv.legacy_rot" => put(&mut self.data.uv_legacy_rotation, value.as_bool()),
            _ => {
                warn!("unknown config key: {}", key);
                return;
            }
        };

        if !accepted {
            warn!("config value for {} has the wrong type, ignored", key);
        }
    }

    /// Meshes above this triangle count are split. The default is 1,000,000.
    pub fn triangle_limit(&self) -> u32 {
        self.data.triangle_limit.unwrap_or(1_000_000).max(1)
    }

    /// Meshes above this vertex count are split. The default is 1,000,000.
    pub fn vertex_limit(&self) -> u32 {
        self.data.vertex_limit.unwrap_or(1_000_000).max(1)
    }

    /// Per-vertex bone influences kept by the weight-limit step. The default
    /// value is 4.
    pub fn weights_limit(&self) -> u32 {
        self.data.weights_limit.unwrap_or(4).max(1)
    }

    /// Keyframe to import for formats that load a single static pose.
    pub fn global_keyframe(&self) -> u32 {
        self.data.global_keyframe.unwrap_or(0)
    }

    pub fn ac_separate_backface_cull(&self) -> bool {
        self.data.ac_separate_backface_cull.unwrap_or(true)
    }

    /// Whether ASE normals are always rebuilt from smoothing groups.
    pub fn ase_reconstruct_normals(&self) -> bool {
        self.data.ase_reconstruct_normals.unwrap_or(true)
    }

    /// Restricts an LWO import to the layer with this name or index.
    pub fn lwo_layer(&self) -> Option<&str> {
        self.data.lwo_layer.as_deref()
    }

    /// Output frame rate for IRR. The default value is 100.
    pub fn irr_fps(&self) -> u32 {
        self.data.irr_fps.unwrap_or(100).max(1)
    }

    pub fn mdl_color_map(&self) -> Option<&str> {
        self.data.mdl_color_map.as_deref()
    }

    /// Value will be in the range of [0,175] degrees. The default is 45.
    pub fn tangent_smoothing_angle(&self) -> f32 {
        self.data
            .tangent_smoothing_angle
            .unwrap_or(45.0)
            .max(0.0)
            .min(175.0)
    }

    /// Value will be in the range of [0,175] degrees. The default is 175.
    pub fn normal_smoothing_angle(&self) -> f32 {
        self.data
            .normal_smoothing_angle
            .unwrap_or(175.0)
            .max(0.0)
            .min(175.0)
    }

    pub fn og_min_faces(&self) -> u32 {
        self.data.og_min_faces.unwrap_or(1)
    }

    pub fn og_allow_different_world_matrices(&self) -> bool {
        self.data.og_allow_different_world_matrices.unwrap_or(false)
    }

    /// Bitmask of vertex components the removal step drops.
    pub fn remove_components(&self) -> u32 {
        self.data.remove_components.unwrap_or(0)
    }

    /// Bitmask of primitive types the primitive filter drops.
    pub fn sort_by_ptype_remove(&self) -> u32 {
        self.data.sort_by_ptype_remove.unwrap_or(0)
    }

    /// Bitmask of UV transform parts (scale|rotation|translation) the baking
    /// step applies. All three by default.
    pub fn uv_transform_process(&self) -> u32 {
        self.data.uv_transform_process.unwrap_or(0x7)
    }

    /// Reproduces the historical asymmetric UV rotation instead of a proper
    /// 2-D rotation.
    pub fn uv_legacy_rotation(&self) -> bool {
        self.data.uv_legacy_rotation.unwrap_or(false)
    }

    pub fn speed_flag(&self) -> bool {
        self.data.speed_flag.unwrap_or(false)
    }
}

fn put<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = Some(value);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn defaults() {
        let config = Config::new();

        assert_eq!(config.weights_limit(), 4);
        assert_eq!(config.irr_fps(), 100);
        assert_eq!(config.normal_smoothing_angle(), 175.0);
        assert_eq!(config.uv_transform_process(), 0x7);
        assert!(!config.uv_legacy_rotation());
    }

    #[test]
    pub fn set_by_dotted_key() {
        let mut config = Config::new();
        config.set("pp.slm.triangle_limit", 5i64);
        config.set("imp.lwo.layer", "Layer_1");
        config.set("pp.gsn.max_smoothing", 500.0f32);

        assert_eq!(config.triangle_limit(), 5);
        assert_eq!(config.lwo_layer(), Some("Layer_1"));

        // clamped to the documented cap
        assert_eq!(config.normal_smoothing_angle(), 175.0);
    }

    #[test]
    pub fn wrong_type_is_ignored() {
        let mut config = Config::new();
        config.set("pp.slm.triangle_limit", "lots");

        assert_eq!(config.triangle_limit(), 1_000_000);
    }

    #[test]
    pub fn from_toml_text() {
        let config = Config::from_toml("weights_limit = 2\nase_reconstruct_normals = false\n");

        assert_eq!(config.weights_limit(), 2);
        assert!(!config.ase_reconstruct_normals());
    }
}
