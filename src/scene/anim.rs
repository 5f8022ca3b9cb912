use crate::math::{Quat, Vec3};

/// A position or scale key on an animation channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VectorKey {
    /// Key time, in ticks.
    pub time: f64,
    pub value: Vec3,
}

/// A rotation key on an animation channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuatKey {
    pub time: f64,
    pub value: Quat,
}

/// The keyframes affecting a single named bone or node.
///
/// The three key sequences are independent; each must be strictly increasing
/// in time and stay within `[0, duration]` of the owning animation.
#[derive(Clone, Debug, Default)]
pub struct NodeChannel {
    /// Name of the bone or node this channel animates.
    pub name: String,

    pub position_keys: Vec<VectorKey>,
    pub rotation_keys: Vec<QuatKey>,
    pub scale_keys: Vec<VectorKey>,
}

/// One animation clip.
#[derive(Clone, Debug, Default)]
pub struct Animation {
    pub channels: Vec<NodeChannel>,

    /// Length of the clip, in ticks.
    pub duration: f64,

    pub name: String,

    /// Playback rate; zero means the source did not specify one.
    pub ticks_per_second: f64,
}

impl Animation {
    /// Grows `duration` so that the given key time fits.
    pub fn cover(&mut self, time: f64) {
        if time > self.duration {
            self.duration = time;
        }
    }
}
