//! Position lookups keyed by smoothing-group bitmasks.
//!
//! The structure answers one question: which vertices sit within ε of a query
//! position *and* share a smoothing group with it. Entries are sorted by
//! their projection onto an arbitrary plane normal so a query only scans a
//! narrow distance window instead of the whole cloud.

use {
    crate::{
        math::{vec3, Vec3},
        scene::Face,
    },
    std::cmp::Ordering,
};

struct Entry {
    distance: f32,
    index: u32,
    position: Vec3,
    smoothing: u32,
}

pub struct SpatialSort {
    entries: Vec<Entry>,
    normal: Vec3,
}

impl SpatialSort {
    /// Indexes every vertex referenced by `faces`, attaching the owning
    /// face's smoothing bitmask to it.
    pub fn prepare(positions: &[Vec3], faces: &[Face]) -> Self {
        // an arbitrary but fixed projection axis; nothing is special about
        // these values except that no coordinate plane is parallel to it
        let normal = vec3(0.8523, 0.34321, 0.5736).normalize();

        let mut entries = Vec::with_capacity(faces.len() * 3);
        for face in faces {
            for &index in &face.indices {
                if let Some(position) = positions.get(index as usize) {
                    entries.push(Entry {
                        distance: position.dot(normal),
                        index,
                        position: *position,
                        smoothing: face.smoothing,
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));

        Self { entries, normal }
    }

    /// All indexed vertices whose position lies within `epsilon` of
    /// `position` (componentwise) and whose smoothing bitmask intersects
    /// `smoothing`.
    ///
    /// A query mask of zero means the vertex belongs to no smoothing group
    /// and shares its position with nobody: the result is empty and the
    /// caller keeps its flat normal.
    pub fn find(&self, position: Vec3, smoothing: u32, epsilon: f32) -> Vec<u32> {
        if smoothing == 0 {
            return vec![];
        }

        // the projection distance of two positions within the componentwise
        // ε box differs by at most ε · Σ|n_i|
        let window =
            epsilon * (self.normal.x.abs() + self.normal.y.abs() + self.normal.z.abs());
        let distance = position.dot(self.normal);
        let start = self
            .entries
            .partition_point(|entry| entry.distance < distance - window);

        let mut res = vec![];
        for entry in &self.entries[start..] {
            if entry.distance > distance + window {
                break;
            }

            if entry.smoothing & smoothing == 0 {
                continue;
            }

            let delta = entry.position - position;
            if delta.x.abs() <= epsilon && delta.y.abs() <= epsilon && delta.z.abs() <= epsilon {
                res.push(entry.index);
            }
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        rand::{rngs::SmallRng, Rng, SeedableRng},
    };

    const FUZZ_COUNT: usize = 2_000;

    fn quad(_positions: &[Vec3], smoothing: [u32; 2]) -> Vec<Face> {
        vec![
            Face::triangle(0, 1, 2).with_smoothing(smoothing[0]),
            Face::triangle(3, 4, 5).with_smoothing(smoothing[1]),
        ]
    }

    #[test]
    pub fn shared_positions_with_common_group() {
        // two triangles sharing an edge, duplicated verbose-style
        let positions = vec![
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 1.0, 0.0),
        ];
        let faces = quad(&positions, [1, 1]);
        let sort = SpatialSort::prepare(&positions, &faces);

        let mut res = sort.find(vec3(1.0, 0.0, 0.0), 1, 1e-5);
        res.sort_unstable();
        assert_eq!(res, vec![1, 3]);
    }

    #[test]
    pub fn disjoint_groups_do_not_share() {
        let positions = vec![
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            vec3(1.0, 1.0, 0.0),
        ];
        let faces = quad(&positions, [1, 2]);
        let sort = SpatialSort::prepare(&positions, &faces);

        let res = sort.find(vec3(1.0, 0.0, 0.0), 1, 1e-5);
        assert_eq!(res, vec![1]);
    }

    #[test]
    pub fn zero_mask_is_unshared() {
        let positions = vec![vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)];
        let faces = vec![Face::triangle(0, 1, 2)];
        let sort = SpatialSort::prepare(&positions, &faces);

        assert!(sort.find(positions[0], 0, 1e-5).is_empty());
    }

    #[test]
    pub fn fuzz_matches_linear_scan() {
        let mut rng = SmallRng::seed_from_u64(13);
        let positions = (0..64)
            .map(|_| {
                vec3(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
            })
            .collect::<Vec<_>>();
        let faces = (0..positions.len() / 3)
            .map(|face| {
                let base = face as u32 * 3;
                Face::triangle(base, base + 1, base + 2).with_smoothing(1 << (face % 3))
            })
            .collect::<Vec<_>>();
        let sort = SpatialSort::prepare(&positions, &faces);

        for _ in 0..FUZZ_COUNT {
            let query = vec3(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            let mask = 1 << rng.gen_range(0..3);
            let epsilon = rng.gen_range(0.01..0.5);

            let mut expected = vec![];
            for face in &faces {
                if face.smoothing & mask == 0 {
                    continue;
                }

                for &index in &face.indices {
                    let delta = positions[index as usize] - query;
                    if delta.x.abs() <= epsilon
                        && delta.y.abs() <= epsilon
                        && delta.z.abs() <= epsilon
                    {
                        expected.push(index);
                    }
                }
            }
            expected.sort_unstable();

            let mut actual = sort.find(query, mask, epsilon);
            actual.sort_unstable();

            assert_eq!(actual, expected);
        }
    }
}
