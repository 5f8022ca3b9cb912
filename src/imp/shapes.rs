//! Tessellations of standard geometric shapes.
//!
//! All generators append unit-sized geometry centered on the origin as a
//! plain triangle soup: every three consecutive positions form one
//! counter-clockwise triangle. Callers scale and translate via the node
//! transform.

use crate::math::{vec3, vec3_normalize_safe, Vec3};

const GOLDEN: f32 = 1.618034;

fn push_triangle(out: &mut Vec<Vec3>, a: Vec3, b: Vec3, c: Vec3) {
    out.push(a);
    out.push(b);
    out.push(c);
}

/// A regular icosahedron with unit circumradius.
pub fn make_icosahedron(out: &mut Vec<Vec3>) {
    let t = GOLDEN;
    let verts = [
        vec3(-1.0, t, 0.0),
        vec3(1.0, t, 0.0),
        vec3(-1.0, -t, 0.0),
        vec3(1.0, -t, 0.0),
        vec3(0.0, -1.0, t),
        vec3(0.0, 1.0, t),
        vec3(0.0, -1.0, -t),
        vec3(0.0, 1.0, -t),
        vec3(t, 0.0, -1.0),
        vec3(t, 0.0, 1.0),
        vec3(-t, 0.0, -1.0),
        vec3(-t, 0.0, 1.0),
    ]
    .map(vec3_normalize_safe);

    for face in FACES {
        push_triangle(
            out,
            verts[face[0]],
            verts[face[1]],
            verts[face[2]],
        );
    }
}

const FACES: [[usize; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];

/// A unit sphere built by subdividing an icosahedron `tessellation` times.
pub fn make_sphere(tessellation: u32, out: &mut Vec<Vec3>) {
    let mut soup = vec![];
    make_icosahedron(&mut soup);

    for _ in 0..tessellation {
        let mut next = Vec::with_capacity(soup.len() * 4);
        for tri in soup.chunks_exact(3) {
            let (a, b, c) = (tri[0], tri[1], tri[2]);
            let ab = vec3_normalize_safe((a + b) * 0.5);
            let bc = vec3_normalize_safe((b + c) * 0.5);
            let ca = vec3_normalize_safe((c + a) * 0.5);

            push_triangle(&mut next, a, ab, ca);
            push_triangle(&mut next, ab, b, bc);
            push_triangle(&mut next, ca, bc, c);
            push_triangle(&mut next, ab, bc, ca);
        }

        soup = next;
    }

    out.append(&mut soup);
}

/// A regular tetrahedron with unit circumradius.
pub fn make_tetrahedron(out: &mut Vec<Vec3>) {
    let verts = [
        vec3(1.0, 1.0, 1.0),
        vec3(1.0, -1.0, -1.0),
        vec3(-1.0, 1.0, -1.0),
        vec3(-1.0, -1.0, 1.0),
    ]
    .map(vec3_normalize_safe);

    push_triangle(out, verts[0], verts[2], verts[1]);
    push_triangle(out, verts[0], verts[1], verts[3]);
    push_triangle(out, verts[0], verts[3], verts[2]);
    push_triangle(out, verts[1], verts[2], verts[3]);
}

/// An axis-aligned cube with unit circumradius.
pub fn make_hexahedron(out: &mut Vec<Vec3>) {
    let s = 1.0 / 3.0f32.sqrt();
    let corner = |x: f32, y: f32, z: f32| vec3(x * s, y * s, z * s);

    let quads = [
        // +x, -x
        [
            corner(1.0, -1.0, -1.0),
            corner(1.0, 1.0, -1.0),
            corner(1.0, 1.0, 1.0),
            corner(1.0, -1.0, 1.0),
        ],
        [
            corner(-1.0, -1.0, 1.0),
            corner(-1.0, 1.0, 1.0),
            corner(-1.0, 1.0, -1.0),
            corner(-1.0, -1.0, -1.0),
        ],
        // +y, -y
        [
            corner(-1.0, 1.0, -1.0),
            corner(-1.0, 1.0, 1.0),
            corner(1.0, 1.0, 1.0),
            corner(1.0, 1.0, -1.0),
        ],
        [
            corner(-1.0, -1.0, 1.0),
            corner(-1.0, -1.0, -1.0),
            corner(1.0, -1.0, -1.0),
            corner(1.0, -1.0, 1.0),
        ],
        // +z, -z
        [
            corner(-1.0, -1.0, 1.0),
            corner(1.0, -1.0, 1.0),
            corner(1.0, 1.0, 1.0),
            corner(-1.0, 1.0, 1.0),
        ],
        [
            corner(1.0, -1.0, -1.0),
            corner(-1.0, -1.0, -1.0),
            corner(-1.0, 1.0, -1.0),
            corner(1.0, 1.0, -1.0),
        ],
    ];

    for quad in &quads {
        push_triangle(out, quad[0], quad[1], quad[2]);
        push_triangle(out, quad[0], quad[2], quad[3]);
    }
}

/// A regular octahedron with unit circumradius.
pub fn make_octahedron(out: &mut Vec<Vec3>) {
    let px = vec3(1.0, 0.0, 0.0);
    let nx = vec3(-1.0, 0.0, 0.0);
    let py = vec3(0.0, 1.0, 0.0);
    let ny = vec3(0.0, -1.0, 0.0);
    let pz = vec3(0.0, 0.0, 1.0);
    let nz = vec3(0.0, 0.0, -1.0);

    push_triangle(out, py, pz, px);
    push_triangle(out, py, px, nz);
    push_triangle(out, py, nz, nx);
    push_triangle(out, py, nx, pz);
    push_triangle(out, ny, px, pz);
    push_triangle(out, ny, nz, px);
    push_triangle(out, ny, nx, nz);
    push_triangle(out, ny, pz, nx);
}

/// A regular dodecahedron, built as the dual of the icosahedron: one
/// pentagon per icosahedron vertex, its corners at the adjacent face
/// centers.
pub fn make_dodecahedron(out: &mut Vec<Vec3>) {
    let t = GOLDEN;
    let verts = [
        vec3(-1.0, t, 0.0),
        vec3(1.0, t, 0.0),
        vec3(-1.0, -t, 0.0),
        vec3(1.0, -t, 0.0),
        vec3(0.0, -1.0, t),
        vec3(0.0, 1.0, t),
        vec3(0.0, -1.0, -t),
        vec3(0.0, 1.0, -t),
        vec3(t, 0.0, -1.0),
        vec3(t, 0.0, 1.0),
        vec3(-t, 0.0, -1.0),
        vec3(-t, 0.0, 1.0),
    ]
    .map(vec3_normalize_safe);

    for (vertex_idx, axis) in verts.iter().enumerate() {
        // centers of the five faces sharing this vertex form a pentagon
        let mut corners: Vec<Vec3> = FACES
            .iter()
            .filter(|face| face.contains(&vertex_idx))
            .map(|face| {
                vec3_normalize_safe(verts[face[0]] + verts[face[1]] + verts[face[2]])
            })
            .collect();

        // order them by angle around the vertex direction
        let reference = vec3_normalize_safe(corners[0] - *axis * corners[0].dot(*axis));
        let bitangent = axis.cross(reference);
        corners.sort_by(|a, b| {
            let angle = |v: &Vec3| {
                let flat = *v - *axis * v.dot(*axis);
                flat.dot(bitangent).atan2(flat.dot(reference))
            };

            angle(a).partial_cmp(&angle(b)).unwrap()
        });

        // fan the pentagon; increasing angle keeps the normal outward
        for i in 1..corners.len() - 1 {
            push_triangle(out, corners[0], corners[i], corners[i + 1]);
        }
    }
}

/// A cone (or cylinder, or capped frustum) along the y axis from the origin
/// to `height`, with the given start and end radii.
pub fn make_cone(height: f32, radius_bottom: f32, radius_top: f32, sides: u32, out: &mut Vec<Vec3>) {
    let sides = sides.max(3);
    let ring = |angle: f32, radius: f32, y: f32| {
        vec3(angle.cos() * radius, y, angle.sin() * radius)
    };

    let step = std::f32::consts::PI * 2.0 / sides as f32;
    for side in 0..sides {
        let a0 = side as f32 * step;
        let a1 = (side + 1) as f32 * step;

        let b0 = ring(a0, radius_bottom, 0.0);
        let b1 = ring(a1, radius_bottom, 0.0);
        let t0 = ring(a0, radius_top, height);
        let t1 = ring(a1, radius_top, height);

        // the side strip degenerates to single triangles at an apex
        if radius_bottom > 0.0 {
            push_triangle(out, b0, t0, b1);
        }
        if radius_top > 0.0 {
            push_triangle(out, b1, t0, t1);
        }

        // caps, fanned around the axis
        if radius_bottom > 0.0 {
            push_triangle(out, vec3(0.0, 0.0, 0.0), b0, b1);
        }
        if radius_top > 0.0 {
            push_triangle(out, vec3(0.0, height, 0.0), t1, t0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unit_distance(soup: &[Vec3]) {
        for position in soup {
            assert!((position.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    pub fn icosahedron_has_twenty_faces() {
        let mut soup = vec![];
        make_icosahedron(&mut soup);

        assert_eq!(soup.len(), 60);
        assert_unit_distance(&soup);
    }

    #[test]
    pub fn sphere_subdivision_quadruples_faces() {
        let mut soup = vec![];
        make_sphere(2, &mut soup);

        assert_eq!(soup.len(), 60 * 16);
        assert_unit_distance(&soup);
    }

    #[test]
    pub fn dodecahedron_has_twelve_pentagons() {
        let mut soup = vec![];
        make_dodecahedron(&mut soup);

        // 12 pentagons, 3 triangles each
        assert_eq!(soup.len(), 12 * 3 * 3);
    }

    #[test]
    pub fn platonic_solids_triangle_counts() {
        let mut soup = vec![];
        make_tetrahedron(&mut soup);
        assert_eq!(soup.len(), 12);

        soup.clear();
        make_hexahedron(&mut soup);
        assert_eq!(soup.len(), 36);

        soup.clear();
        make_octahedron(&mut soup);
        assert_eq!(soup.len(), 24);
    }

    #[test]
    pub fn cone_and_cylinder() {
        let mut soup = vec![];
        make_cone(2.0, 1.0, 1.0, 8, &mut soup);

        // cylinder: 2 side triangles and 2 cap triangles per segment
        assert_eq!(soup.len(), 8 * 4 * 3);

        soup.clear();
        make_cone(2.0, 1.0, 0.0, 8, &mut soup);

        // cone: one side triangle and one cap triangle per segment
        assert_eq!(soup.len(), 8 * 2 * 3);
    }
}
