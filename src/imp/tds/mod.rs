//! Decoder for 3D Studio `.3ds` files.
//!
//! The format is a tree of size-prefixed chunks (see [`chunks`]). Parsing
//! fills a format-specific intermediate model which [`convert`] then turns
//! into the canonical scene: meshes split per material, vertices duplicated
//! into the verbose layout, the keyframer hierarchy turned into nodes.

pub(crate) mod chunks;
pub(crate) mod convert;

use {
    crate::{
        config::Config,
        iff::{for_each_chunk_within, ChunkLayout},
        imp::{Decoder, RawAsset},
        math::{vec2, vec3, vec4, Mat4, Vec2, Vec3},
        scene::{mesh::DEFAULT_MATERIAL_SENTINEL, Scene},
        ByteReader, Error, ErrorKind,
    },
    std::mem::swap,
};

const NAN: f32 = f32::NAN;

const MIN_FILE_SIZE: usize = 16;

/// One texture slot of a 3DS material, including its UV transformation.
pub(crate) struct RawTexture {
    pub blend: f32,
    pub offset_u: f32,
    pub offset_v: f32,
    pub path: String,
    pub rotation: f32,
    pub scale_u: f32,
    pub scale_v: f32,
}

impl Default for RawTexture {
    fn default() -> Self {
        Self {
            blend: NAN,
            offset_u: 0.0,
            offset_v: 0.0,
            path: String::new(),
            rotation: 0.0,
            scale_u: 1.0,
            scale_v: 1.0,
        }
    }
}

pub(crate) struct RawMaterial {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub emissive: Vec3,
    pub name: String,
    pub opacity: f32,
    pub shading: u16,
    pub shininess: f32,
    pub shininess_strength: f32,
    pub specular: Vec3,
    pub tex_bump: RawTexture,
    pub tex_diffuse: RawTexture,
    pub tex_emissive: RawTexture,
    pub tex_opacity: RawTexture,
    pub tex_shininess: RawTexture,
    pub tex_specular: RawTexture,
    pub two_sided: bool,
}

impl Default for RawMaterial {
    fn default() -> Self {
        Self {
            ambient: Vec3::ZERO,
            diffuse: vec3(0.6, 0.6, 0.6),
            emissive: Vec3::ZERO,
            name: String::new(),
            opacity: 1.0,
            shading: chunks::SHADE_GOURAUD,
            shininess: 0.0,
            shininess_strength: 0.0,
            specular: Vec3::ZERO,
            tex_bump: Default::default(),
            tex_diffuse: Default::default(),
            tex_emissive: Default::default(),
            tex_opacity: Default::default(),
            tex_shininess: Default::default(),
            tex_specular: Default::default(),
            two_sided: false,
        }
    }
}

#[derive(Default)]
pub(crate) struct RawMesh {
    /// Per-face index into the material list, or the sentinel for faces no
    /// FACEMAT chunk claimed.
    pub face_materials: Vec<u32>,
    pub faces: Vec<[u32; 3]>,
    pub name: String,
    pub positions: Vec<Vec3>,
    pub smoothing: Vec<u32>,
    pub texcoords: Vec<Vec2>,
    pub transform: Option<Mat4>,
}

/// One keyframer hierarchy entry; the tree is rebuilt from parent indices
/// after parsing.
pub(crate) struct RawNode {
    pub hierarchy_pos: i32,
    pub name: String,
    pub parent: Option<usize>,
}

#[derive(Default)]
pub(crate) struct Intermediate {
    pub ambient: Vec3,
    pub background: String,
    pub current_node: usize,
    pub has_background: bool,
    pub last_node_index: i32,
    pub master_scale: f32,
    pub materials: Vec<RawMaterial>,
    pub meshes: Vec<RawMesh>,
    pub nodes: Vec<RawNode>,
}

pub struct TdsDecoder;

impl Decoder for TdsDecoder {
    fn name(&self) -> &'static str {
        "3DS"
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "3ds"
    }

    fn read(&self, asset: &RawAsset<'_>, config: &Config) -> Result<Scene, Error> {
        if asset.bytes.len() < MIN_FILE_SIZE {
            return Err(Error::new(
                ErrorKind::FileTooSmall,
                "the file is too small to contain a single chunk",
            ));
        }

        let mut reader = ByteReader::new(asset.bytes);
        if reader.peek(0) != Some((chunks::MAIN & 0xff) as u8)
            || reader.peek(1) != Some((chunks::MAIN >> 8) as u8)
        {
            return Err(Error::new(
                ErrorKind::InvalidMagic,
                "the root chunk is not MAIN (0x4D4D)",
            ));
        }

        let mut scratch = Intermediate {
            master_scale: 1.0,
            // the implicit hierarchy root; keyframer nodes attach below it
            nodes: vec![RawNode {
                hierarchy_pos: -1,
                name: String::new(),
                parent: None,
            }],
            ..Default::default()
        };
        scratch.last_node_index = -1;

        let len = reader.remaining();
        for_each_chunk_within(&mut reader, len, ChunkLayout::TagU16SizeTotal, |tag, payload| {
            if tag == chunks::MAIN {
                parse_main(&mut scratch, payload)?;
            }

            Ok(())
        })
        .map_err(|err| err.with_format("3DS"))?;

        convert::build_scene(scratch, config).map_err(|err| err.with_format("3DS"))
    }
}

fn chunk_scope(
    payload: &mut ByteReader<'_>,
    handler: impl FnMut(u32, &mut ByteReader<'_>) -> Result<(), Error>,
) -> Result<(), Error> {
    let len = payload.remaining();
    for_each_chunk_within(payload, len, ChunkLayout::TagU16SizeTotal, handler)
}

fn parse_main(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        match tag {
            chunks::OBJMESH => parse_editor(scratch, payload)?,

            // this chunk appears at different positions depending on the
            // exporter
            chunks::KEYFRAMER => parse_keyframer(scratch, payload)?,
            _ => (),
        }

        Ok(())
    })
}

fn parse_editor(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        match tag {
            chunks::OBJBLOCK => {
                let (name, _) = payload.read_cstr_bounded(payload.remaining())?;
                scratch.meshes.push(RawMesh {
                    name,
                    ..Default::default()
                });
                parse_object(scratch, payload)?;
            }
            chunks::MAT_MATERIAL => {
                scratch.materials.push(RawMaterial::default());
                parse_material(scratch, payload)?;
            }
            chunks::AMBCOLOR => {
                // base ambient of the scene, added to all materials later
                let mut color = parse_color(payload, true)?;
                if color.x.is_nan() {
                    color = Vec3::ZERO;
                }
                scratch.ambient = color;
            }
            chunks::BIT_MAP => {
                let (path, _) = payload.read_cstr_bounded(payload.remaining())?;
                scratch.background = path;
            }
            chunks::BIT_MAP_EXISTS => scratch.has_background = true,
            chunks::MASTER_SCALE => scratch.master_scale = payload.read_f32()?,
            chunks::KEYFRAMER => parse_keyframer(scratch, payload)?,
            _ => (),
        }

        Ok(())
    })
}

fn parse_object(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        if tag == chunks::TRIMESH {
            parse_trimesh(scratch, payload)?;
        }

        Ok(())
    })
}

fn parse_trimesh(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        let mesh = scratch.meshes.last_mut().unwrap();
        match tag {
            chunks::VERTLIST => {
                let count = payload.read_u16()? as usize;
                mesh.positions.reserve(count);
                for _ in 0..count {
                    let x = payload.read_f32()?;
                    let y = payload.read_f32()?;
                    let z = payload.read_f32()?;

                    // 3DS is right-handed with z up, the output is y up
                    mesh.positions.push(vec3(x, y, -z));
                }
            }
            chunks::MAPLIST => {
                let count = payload.read_u16()? as usize;
                mesh.texcoords.reserve(count);
                for _ in 0..count {
                    let u = payload.read_f32()?;
                    let v = payload.read_f32()?;
                    mesh.texcoords.push(vec2(u, v));
                }
            }
            chunks::FACELIST => {
                let count = payload.read_u16()? as usize;
                mesh.faces.reserve(count);
                for _ in 0..count {
                    let a = payload.read_u16()? as u32;
                    let b = payload.read_u16()? as u32;
                    let c = payload.read_u16()? as u32;

                    // the fourth value carries edge visibility flags
                    payload.skip(2)?;
                    mesh.faces.push([a, b, c]);
                }

                mesh.smoothing.resize(mesh.faces.len(), 0);
                mesh.face_materials
                    .resize(mesh.faces.len(), DEFAULT_MATERIAL_SENTINEL);

                // FACEMAT and SMOOLIST trail the face array inside this chunk
                parse_face_extra(scratch, payload)?;
            }
            chunks::TRMATRIX => {
                let mut f = [0.0f32; 12];
                for val in &mut f {
                    *val = payload.read_f32()?;
                }

                apply_mesh_matrix(mesh, f);
            }
            _ => (),
        }

        Ok(())
    })
}

// converts the 3DS column-major z-up transform into row-major y-up; the
// swap sequence comes from lib3ds
fn apply_mesh_matrix(mesh: &mut RawMesh, f: [f32; 12]) {
    let a1 = f[0];
    let (mut a2, mut a3) = (f[1], f[2]);
    let (mut b1, mut b2, mut b3) = (f[3], f[4], f[5]);
    let (mut c1, mut c2, mut c3) = (f[6], f[7], f[8]);
    let d1 = f[9];
    let (mut d2, mut d3) = (f[10], f[11]);

    swap(&mut d2, &mut d3);
    swap(&mut a2, &mut a3);
    swap(&mut b1, &mut c1);
    swap(&mut c2, &mut b3);
    swap(&mut b2, &mut c3);

    let mat = Mat4::from_cols(
        vec4(a1, a2, a3, 0.0),
        vec4(b1, b2, b3, 0.0),
        vec4(c1, c2, c3, 0.0),
        vec4(d1, d2, d3, 1.0),
    );

    // a mirrored transform would flip the winding of every face; undo it by
    // pushing the mirror into the vertices
    if mat.determinant() < 0.0 {
        let mut mirrored = mat;
        mirrored.x_axis.x *= -1.0;
        mirrored.y_axis.x *= -1.0;
        mirrored.z_axis.x *= -1.0;
        mirrored.w_axis.x *= -1.0;
        let fix = mirrored * mat.inverse();
        for position in &mut mesh.positions {
            *position = fix.transform_point3(*position);
        }
    }

    mesh.transform = Some(mat);
}

fn parse_face_extra(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        match tag {
            chunks::SMOOLIST => {
                let mesh = scratch.meshes.last_mut().unwrap();
                for group in mesh.smoothing.iter_mut() {
                    // nth bit set selects the nth smoothing group
                    *group = payload.read_u32()?;
                }
            }
            chunks::FACEMAT => {
                let (name, _) = payload.read_cstr_bounded(payload.remaining())?;
                let material = scratch
                    .materials
                    .iter()
                    .position(|mat| mat.name.eq_ignore_ascii_case(&name))
                    .map(|idx| idx as u32)
                    .unwrap_or_else(|| {
                        // unknown material; the default-material step will
                        // pick these faces up through the sentinel
                        warn!("FACEMAT references unknown material {:?}", name);

                        DEFAULT_MATERIAL_SENTINEL
                    });

                let mesh = scratch.meshes.last_mut().unwrap();
                let count = payload.read_u16()? as usize;
                for _ in 0..count {
                    let face = payload.read_u16()? as usize;
                    if face >= mesh.face_materials.len() {
                        warn!("FACEMAT face index {} is out of range, ignored", face);
                        continue;
                    }

                    mesh.face_materials[face] = material;
                }
            }
            _ => (),
        }

        Ok(())
    })
}

fn parse_keyframer(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        if tag == chunks::TRACKINFO {
            parse_trackinfo(scratch, payload)?;
        }

        Ok(())
    })
}

fn parse_trackinfo(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        if tag == chunks::TRACKOBJNAME {
            let (name, _) = payload.read_cstr_bounded(payload.remaining())?;

            // two flag words nobody needs, then the hierarchy position;
            // 0xffff marks a root-level node and wraps to zero
            payload.skip(4)?;
            let hierarchy = payload.read_u16()?.wrapping_add(1) as i32;

            let parent = if hierarchy > scratch.last_node_index {
                scratch.current_node
            } else {
                inverse_node_search(scratch, hierarchy)
            };

            scratch.nodes.push(RawNode {
                hierarchy_pos: hierarchy,
                name,
                parent: Some(parent),
            });
            scratch.last_node_index += 1;
            scratch.current_node = scratch.nodes.len() - 1;
        }

        Ok(())
    })
}

// walk the parent chain until a node at the same hierarchy position is
// found; the new node becomes its sibling
fn inverse_node_search(scratch: &Intermediate, hierarchy_pos: i32) -> usize {
    let mut cur = scratch.current_node;
    loop {
        if scratch.nodes[cur].hierarchy_pos == hierarchy_pos {
            return scratch.nodes[cur].parent.unwrap_or(cur);
        }

        match scratch.nodes[cur].parent {
            Some(parent) => cur = parent,
            None => return 0,
        }
    }
}

fn parse_material(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        match tag {
            chunks::MAT_MATNAME => {
                let (name, _) = payload.read_cstr_bounded(payload.remaining())?;
                scratch.materials.last_mut().unwrap().name = name;
            }
            chunks::MAT_DIFFUSE => {
                let color = parse_color(payload, false)?;
                scratch.materials.last_mut().unwrap().diffuse = if color.x.is_nan() {
                    Vec3::ONE
                } else {
                    color
                };
            }
            chunks::MAT_SPECULAR => {
                let color = parse_color(payload, false)?;
                scratch.materials.last_mut().unwrap().specular = if color.x.is_nan() {
                    Vec3::ONE
                } else {
                    color
                };
            }
            chunks::MAT_AMBIENT => {
                let color = parse_color(payload, false)?;
                scratch.materials.last_mut().unwrap().ambient = if color.x.is_nan() {
                    Vec3::ONE
                } else {
                    color
                };
            }
            chunks::MAT_SELF_ILLUM => {
                let color = parse_color(payload, false)?;
                scratch.materials.last_mut().unwrap().emissive = if color.x.is_nan() {
                    Vec3::ZERO
                } else {
                    color
                };
            }
            chunks::MAT_TRANSPARENCY => {
                let percent = parse_percent(payload)?;

                // the chunk stores transparency, the output wants opacity
                scratch.materials.last_mut().unwrap().opacity = if percent.is_nan() {
                    1.0
                } else {
                    1.0 - percent
                };
            }
            chunks::MAT_SHADING => {
                scratch.materials.last_mut().unwrap().shading = payload.read_u16()?;
            }
            chunks::MAT_TWO_SIDE => scratch.materials.last_mut().unwrap().two_sided = true,
            chunks::MAT_SHININESS => {
                let percent = parse_percent(payload)?;
                scratch.materials.last_mut().unwrap().shininess = if percent.is_nan() {
                    0.0
                } else {
                    percent * 0xffff as f32
                };
            }
            chunks::MAT_SHININESS_PERCENT => {
                let percent = parse_percent(payload)?;
                scratch.materials.last_mut().unwrap().shininess_strength =
                    if percent.is_nan() { 0.0 } else { percent };
            }
            chunks::MAT_SELF_ILPCT => {
                let percent = parse_percent(payload)?;
                scratch.materials.last_mut().unwrap().tex_emissive.blend =
                    if percent.is_nan() { 1.0 } else { percent };
            }
            chunks::MAT_TEXTURE => {
                parse_texture(payload, &mut scratch.materials.last_mut().unwrap().tex_diffuse)?
            }
            chunks::MAT_SPECMAP => {
                parse_texture(payload, &mut scratch.materials.last_mut().unwrap().tex_specular)?
            }
            chunks::MAT_OPACMAP => {
                parse_texture(payload, &mut scratch.materials.last_mut().unwrap().tex_opacity)?
            }
            chunks::MAT_BUMPMAP => {
                parse_texture(payload, &mut scratch.materials.last_mut().unwrap().tex_bump)?
            }
            chunks::MAT_SHINMAP => {
                parse_texture(payload, &mut scratch.materials.last_mut().unwrap().tex_shininess)?
            }
            chunks::MAT_SELFIMAP => {
                parse_texture(payload, &mut scratch.materials.last_mut().unwrap().tex_emissive)?
            }
            _ => (),
        }

        Ok(())
    })
}

fn parse_texture(payload: &mut ByteReader<'_>, out: &mut RawTexture) -> Result<(), Error> {
    chunk_scope(payload, |tag, payload| {
        match tag {
            chunks::MAPFILE => {
                let (path, _) = payload.read_cstr_bounded(payload.remaining())?;
                out.path = path;
            }
            chunks::PERCENTF => out.blend = payload.read_f32()?,
            chunks::PERCENTW => out.blend = payload.read_i16()? as f32 / 100.0,
            chunks::MAT_MAP_USCALE => out.scale_u = payload.read_f32()?,
            chunks::MAT_MAP_VSCALE => out.scale_v = payload.read_f32()?,
            chunks::MAT_MAP_UOFFSET => out.offset_u = payload.read_f32()?,
            chunks::MAT_MAP_VOFFSET => out.offset_v = payload.read_f32()?,
            chunks::MAT_MAP_ANG => out.rotation = payload.read_f32()?,
            _ => (),
        }

        Ok(())
    })
}

/// Reads the first recognized color sub-chunk within `payload`.
///
/// Four forms exist in the wild: float RGB, byte RGB, and their gamma
/// variants which are corrected to gamma 2.2 here. Percent chunks are only
/// accepted where the caller says so; some exporters write them in place of
/// the ambient color. Returns a NaN triple when nothing usable was found.
fn parse_color(payload: &mut ByteReader<'_>, accept_percent: bool) -> Result<Vec3, Error> {
    let mut res = vec3(NAN, NAN, NAN);
    let mut gamma = false;
    chunk_scope(payload, |tag, payload| {
        if !res.x.is_nan() {
            return Ok(());
        }

        match tag {
            chunks::RGBF | chunks::LINRGBF => {
                if payload.remaining() >= 12 {
                    gamma = tag == chunks::LINRGBF;
                    res = vec3(
                        payload.read_f32()?,
                        payload.read_f32()?,
                        payload.read_f32()?,
                    );
                }
            }
            chunks::RGBB | chunks::LINRGBB => {
                if payload.remaining() >= 3 {
                    gamma = tag == chunks::LINRGBB;
                    res = vec3(
                        payload.read_u8()? as f32 / 255.0,
                        payload.read_u8()? as f32 / 255.0,
                        payload.read_u8()? as f32 / 255.0,
                    );
                }
            }
            chunks::PERCENTF if accept_percent => {
                if payload.remaining() >= 4 {
                    let val = payload.read_f32()?;
                    res = vec3(val, val, val);
                }
            }
            chunks::PERCENTW if accept_percent => {
                if payload.remaining() >= 1 {
                    let val = payload.read_u8()? as f32 / 255.0;
                    res = vec3(val, val, val);
                }
            }
            _ => (),
        }

        Ok(())
    })?;

    if gamma && !res.x.is_nan() {
        res = vec3(
            res.x.powf(1.0 / 2.2),
            res.y.powf(1.0 / 2.2),
            res.z.powf(1.0 / 2.2),
        );
    }

    Ok(res)
}

/// Reads a percentage sub-chunk; float and word-scaled forms exist.
fn parse_percent(payload: &mut ByteReader<'_>) -> Result<f32, Error> {
    let mut res = NAN;
    chunk_scope(payload, |tag, payload| {
        if !res.is_nan() {
            return Ok(());
        }

        match tag {
            chunks::PERCENTF if payload.remaining() >= 4 => res = payload.read_f32()?,
            chunks::PERCENTW if payload.remaining() >= 2 => {
                res = payload.read_i16()? as f32 / 0xffff as f32
            }
            _ => (),
        }

        Ok(())
    })?;

    Ok(res)
}
