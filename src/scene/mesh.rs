use crate::math::{Mat4, Vec3, Vec4};

/// Texture coordinate channels a mesh may carry at most.
pub const MAX_TEXCOORD_CHANNELS: usize = 4;

/// Vertex color channels a mesh may carry at most.
pub const MAX_COLOR_CHANNELS: usize = 4;

/// Face material slot value meaning "no material was assigned during
/// parsing"; resolved by the default-material step before hand-off.
pub const DEFAULT_MATERIAL_SENTINEL: u32 = 0xcdcdcdcd;

/// A polygon: an ordered list of indices into the owning mesh's vertex
/// arrays, plus the smoothing-group bitmask the face belongs to.
///
/// Two faces sharing a position and a common smoothing bit share a smoothed
/// normal there; a mask of zero keeps the face flat.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Face {
    pub indices: Vec<u32>,
    pub smoothing: u32,
}

impl Face {
    pub fn triangle(a: u32, b: u32, c: u32) -> Self {
        Self {
            indices: vec![a, b, c],
            smoothing: 0,
        }
    }

    pub fn with_smoothing(mut self, smoothing: u32) -> Self {
        self.smoothing = smoothing;
        self
    }
}

/// The influence of one bone on one vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexWeight {
    pub vertex: u32,
    pub weight: f32,
}

/// A bone with its inverse bind-pose transform and the vertices it drives.
#[derive(Clone, Debug, Default)]
pub struct Bone {
    pub name: String,

    /// Transforms from mesh space into bone space at bind time.
    pub offset: Mat4,

    pub weights: Vec<VertexWeight>,
}

/// One texture coordinate channel with one to three active components.
#[derive(Clone, Debug, Default)]
pub struct TexCoordChannel {
    pub components: u8,
    pub data: Vec<Vec3>,
}

/// A single drawable mesh referencing exactly one material.
///
/// Positions are required; every other vertex stream is optional but, when
/// present, parallel to the position array. Texture coordinate and color
/// channels are packed from index zero upward: channel `k + 1` never exists
/// without channel `k`.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub bones: Vec<Bone>,
    pub colors: [Option<Vec<Vec4>>; MAX_COLOR_CHANNELS],
    pub faces: Vec<Face>,

    /// Index into the owning scene's material array.
    pub material: u32,

    pub bitangents: Option<Vec<Vec3>>,
    pub normals: Option<Vec<Vec3>>,
    pub positions: Vec<Vec3>,
    pub tangents: Option<Vec<Vec3>>,
    pub texcoords: [Option<TexCoordChannel>; MAX_TEXCOORD_CHANNELS],
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of trailing texture coordinate channels in use.
    pub fn texcoord_channel_count(&self) -> usize {
        self.texcoords.iter().take_while(|c| c.is_some()).count()
    }

    pub fn color_channel_count(&self) -> usize {
        self.colors.iter().take_while(|c| c.is_some()).count()
    }

    /// Whether every face index addresses a unique vertex (no sharing), the
    /// layout decoders hand to post-processing.
    pub fn is_verbose(&self) -> bool {
        let mut seen = vec![false; self.positions.len()];
        for face in &self.faces {
            for &index in &face.indices {
                match seen.get_mut(index as usize) {
                    Some(flag) if !*flag => *flag = true,
                    _ => return false,
                }
            }
        }

        true
    }

    /// Per-vertex sum of all bone weights; empty when the mesh has no bones.
    pub fn weight_sums(&self) -> Vec<f32> {
        if self.bones.is_empty() {
            return vec![];
        }

        let mut sums = vec![0.0; self.positions.len()];
        for bone in &self.bones {
            for weight in &bone.weights {
                if let Some(sum) = sums.get_mut(weight.vertex as usize) {
                    *sum += weight.weight;
                }
            }
        }

        sums
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::math::vec3};

    #[test]
    pub fn verbose_layout_detection() {
        let mut mesh = Mesh::default();
        mesh.positions = vec![vec3(0.0, 0.0, 0.0); 6];
        mesh.faces = vec![Face::triangle(0, 1, 2), Face::triangle(3, 4, 5)];
        assert!(mesh.is_verbose());

        mesh.faces[1] = Face::triangle(2, 3, 4);
        assert!(!mesh.is_verbose());
    }

    #[test]
    pub fn weight_sums_accumulate_across_bones() {
        let mut mesh = Mesh::default();
        mesh.positions = vec![vec3(0.0, 0.0, 0.0); 2];
        mesh.bones = vec![
            Bone {
                name: "a".to_owned(),
                offset: Mat4::IDENTITY,
                weights: vec![VertexWeight {
                    vertex: 0,
                    weight: 0.25,
                }],
            },
            Bone {
                name: "b".to_owned(),
                offset: Mat4::IDENTITY,
                weights: vec![
                    VertexWeight {
                        vertex: 0,
                        weight: 0.75,
                    },
                    VertexWeight {
                        vertex: 1,
                        weight: 1.0,
                    },
                ],
            },
        ];

        assert_eq!(mesh.weight_sums(), vec![1.0, 1.0]);
    }

    #[test]
    pub fn channel_counts_stop_at_first_gap() {
        let mut mesh = Mesh::default();
        mesh.texcoords[0] = Some(TexCoordChannel {
            components: 2,
            data: vec![],
        });
        mesh.texcoords[2] = Some(TexCoordChannel {
            components: 2,
            data: vec![],
        });

        assert_eq!(mesh.texcoord_channel_count(), 1);
    }
}
