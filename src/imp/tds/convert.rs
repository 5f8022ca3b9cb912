//! Builds the canonical scene from the 3DS intermediate model.
//!
//! Every source mesh is split per material, with vertices duplicated so each
//! face owns its corners outright. The splits remember the source object's
//! name and transform in a carrier value the node-graph builder consumes.

use {
    super::{chunks, Intermediate, RawMaterial, RawMesh},
    crate::{
        config::Config,
        math::{vec3, Mat4, Vec3},
        scene::{
            material::{
                shading, PropertyKey, TextureStack, KEY_BACKGROUND_IMAGE, KEY_COLOR_AMBIENT,
                KEY_COLOR_DIFFUSE, KEY_COLOR_EMISSIVE, KEY_COLOR_SPECULAR, KEY_NAME, KEY_OPACITY,
                KEY_SHADING_MODEL, KEY_SHININESS, KEY_SHININESS_STRENGTH, KEY_TWO_SIDED,
                KEY_WIREFRAME,
            },
            mesh::TexCoordChannel,
            Face, Material, Mesh, Node, Scene, TextureKind,
        },
        post::UvTransform,
        Error, ErrorKind,
    },
    std::collections::BTreeMap,
};

/// Helper objects with this name prefix carry hierarchy only, no geometry.
const DUMMY_PREFIX: &str = "$$$DUMMY";

/// A canonical mesh plus the bookkeeping the node-graph builder needs.
struct MeshCarrier {
    mesh: Mesh,
    owner: String,
    transform: Option<Mat4>,
}

pub(crate) fn build_scene(mut scratch: Intermediate, _config: &Config) -> Result<Scene, Error> {
    for mesh in &mut scratch.meshes {
        check_indices(mesh);
    }

    let ambient = scratch.ambient;
    let mut scene = Scene::new();
    for material in &scratch.materials {
        scene.materials.push(convert_material(material, ambient));
    }

    let mut carriers = split_meshes(&scratch);
    if carriers.iter().map(|c| c.mesh.faces.len()).sum::<usize>() == 0 {
        return Err(Error::new(
            ErrorKind::InvalidGeometry,
            "no faces loaded, the mesh is empty",
        ));
    }

    if scratch.has_background && !scratch.background.is_empty() {
        if let Some(material) = scene.materials.first_mut() {
            material.add_str(
                PropertyKey::scalar(KEY_BACKGROUND_IMAGE),
                scratch.background.clone(),
            );
        }
    }

    scene.root = build_node_graph(&scratch, &mut carriers);
    apply_master_scale(&mut scene, scratch.master_scale);
    scene.meshes = carriers.into_iter().map(|carrier| carrier.mesh).collect();

    Ok(scene)
}

fn check_indices(mesh: &mut RawMesh) {
    let count = mesh.positions.len() as u32;
    if count == 0 {
        mesh.faces.clear();
        return;
    }

    for face in &mut mesh.faces {
        for index in face.iter_mut() {
            if *index >= count {
                warn!("face index overflow in 3DS file");
                *index = count - 1;
            }
        }
    }
}

fn convert_material(src: &RawMaterial, ambient: Vec3) -> Material {
    let mut res = Material::new();
    res.add_str(PropertyKey::scalar(KEY_NAME), src.name.clone());

    // the scene-wide base ambient contributes to every material
    res.add_color(PropertyKey::scalar(KEY_COLOR_AMBIENT), src.ambient + ambient);
    res.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), src.diffuse);
    res.add_color(PropertyKey::scalar(KEY_COLOR_SPECULAR), src.specular);
    res.add_color(PropertyKey::scalar(KEY_COLOR_EMISSIVE), src.emissive);
    res.add_f32(PropertyKey::scalar(KEY_OPACITY), src.opacity);

    let mut shading_mode = src.shading;
    if matches!(shading_mode, chunks::SHADE_PHONG | chunks::SHADE_METAL)
        && (src.shininess == 0.0 || src.shininess_strength == 0.0)
    {
        shading_mode = chunks::SHADE_GOURAUD;
    }

    if matches!(shading_mode, chunks::SHADE_PHONG | chunks::SHADE_METAL) {
        res.add_f32(PropertyKey::scalar(KEY_SHININESS), src.shininess);
        res.add_f32(
            PropertyKey::scalar(KEY_SHININESS_STRENGTH),
            src.shininess_strength,
        );
    }

    res.add_i32(
        PropertyKey::scalar(KEY_SHADING_MODEL),
        match shading_mode {
            chunks::SHADE_FLAT => shading::FLAT,
            // wire shading approximated as plain lambertian
            chunks::SHADE_WIRE | chunks::SHADE_GOURAUD => shading::GOURAUD,
            chunks::SHADE_PHONG => shading::PHONG,
            chunks::SHADE_METAL => shading::COOK_TORRANCE,
            _ => shading::GOURAUD,
        },
    );

    if src.shading == chunks::SHADE_WIRE {
        res.add_i32(PropertyKey::scalar(KEY_WIREFRAME), 1);
    }

    if src.two_sided {
        res.add_i32(PropertyKey::scalar(KEY_TWO_SIDED), 1);
    }

    let slots = [
        (TextureKind::Diffuse, &src.tex_diffuse),
        (TextureKind::Specular, &src.tex_specular),
        (TextureKind::Opacity, &src.tex_opacity),
        (TextureKind::Emissive, &src.tex_emissive),
        (TextureKind::Height, &src.tex_bump),
        (TextureKind::Shininess, &src.tex_shininess),
    ];
    for (kind, tex) in slots.iter() {
        if tex.path.is_empty() {
            continue;
        }

        res.add_str(
            PropertyKey::texture(TextureStack::File, *kind, 0),
            tex.path.clone(),
        );

        if !tex.blend.is_nan() {
            res.add_f32(PropertyKey::texture(TextureStack::Blend, *kind, 0), tex.blend);
        }

        let transform = UvTransform {
            offset_u: tex.offset_u,
            offset_v: tex.offset_v,
            rotation: tex.rotation,
            scale_u: tex.scale_u,
            scale_v: tex.scale_v,
        };
        if !transform.is_identity() {
            res.add(
                PropertyKey::texture(TextureStack::Transform, *kind, 0),
                crate::scene::PropertyValue::Floats(transform.to_floats()),
            );
        }
    }

    res
}

// one canonical mesh per (source mesh, referenced material), in the verbose
// layout: every face owns three fresh vertices
fn split_meshes(scratch: &Intermediate) -> Vec<MeshCarrier> {
    let mut res = vec![];
    for src in &scratch.meshes {
        let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (face_idx, material) in src.face_materials.iter().enumerate() {
            groups.entry(*material).or_default().push(face_idx);
        }

        let mut first = true;
        for (material, face_indices) in groups {
            let mut mesh = Mesh::default();
            mesh.material = material;
            mesh.positions.reserve(face_indices.len() * 3);

            let has_uv = !src.texcoords.is_empty();
            let mut uv = vec![];
            for &face_idx in &face_indices {
                let face = src.faces[face_idx];
                let base = mesh.positions.len() as u32;

                // emit the corners in reverse to restore the winding the
                // z-axis flip inverted
                for &corner in face.iter().rev() {
                    mesh.positions.push(src.positions[corner as usize]);
                    if has_uv {
                        let tc = src
                            .texcoords
                            .get(corner as usize)
                            .copied()
                            .unwrap_or_default();
                        uv.push(vec3(tc.x, tc.y, 0.0));
                    }
                }

                mesh.faces.push(
                    Face::triangle(base, base + 1, base + 2)
                        .with_smoothing(src.smoothing.get(face_idx).copied().unwrap_or(0)),
                );
            }

            if has_uv {
                mesh.texcoords[0] = Some(TexCoordChannel {
                    components: 2,
                    data: uv,
                });
            }

            res.push(MeshCarrier {
                mesh,
                owner: src.name.clone(),
                transform: if first { src.transform } else { None },
            });
            first = false;
        }
    }

    res
}

fn build_node_graph(scratch: &Intermediate, carriers: &mut [MeshCarrier]) -> Node {
    let root_children: Vec<usize> = (1..scratch.nodes.len())
        .filter(|idx| scratch.nodes[*idx].parent == Some(0))
        .collect();

    if root_children.is_empty() {
        // the file has no hierarchy at all; build a flat tree with one node
        // per mesh
        warn!("no hierarchy information found, building a flat node tree");

        let mut root = Node::new("<3DSRoot>");
        for (mesh_idx, _) in carriers.iter().enumerate() {
            let mut node = Node::new(format!("UNNAMED[{}]", mesh_idx));
            node.meshes.push(mesh_idx);
            root.children.push(node);
        }

        return root;
    }

    let mut root = Node::new("<3DSRoot>");
    for child in root_children {
        root.children.push(attach_node(scratch, carriers, child));
    }

    root
}

fn attach_node(scratch: &Intermediate, carriers: &mut [MeshCarrier], node_idx: usize) -> Node {
    let raw = &scratch.nodes[node_idx];
    let mut node = Node::new(raw.name.clone());

    if !raw.name.starts_with(DUMMY_PREFIX) {
        for (mesh_idx, carrier) in carriers.iter_mut().enumerate() {
            if carrier.owner.eq_ignore_ascii_case(&raw.name) {
                node.meshes.push(mesh_idx);
                if let Some(transform) = carrier.transform.take() {
                    node.transform = transform;
                }
            }
        }
    }

    for child in 0..scratch.nodes.len() {
        if scratch.nodes[child].parent == Some(node_idx) {
            node.children.push(attach_node(scratch, carriers, child));
        }
    }

    node
}

// some broken exporters write a master scale of zero; treat it as one
fn apply_master_scale(scene: &mut Scene, master_scale: f32) {
    let scale = if master_scale == 0.0 {
        1.0
    } else {
        1.0 / master_scale
    };

    scene.root.transform = scene.root.transform * Mat4::from_scale(vec3(scale, scale, scale));
}
