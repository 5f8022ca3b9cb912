//! Decoder for LightWave `.lwo` objects, both the legacy LWOB layout and
//! the layered LWO2 layout.
//!
//! Everything in the file is big-endian. Geometry arrives per layer; faces
//! reference surfaces indirectly through the tag list, and LWO2 vertex data
//! beyond positions travels in named vertex-map channels.

pub(crate) mod chunks;
pub(crate) mod surface;

use {
    self::surface::{convert_surface, Surface},
    crate::{
        config::Config,
        iff::{for_each_chunk_within, ChunkLayout},
        imp::{Decoder, RawAsset},
        math::{vec3, Vec3},
        scene::{Face, Mesh, Node, Scene},
        ByteReader, Error, ErrorKind,
    },
};

const MIN_FILE_SIZE: usize = 12;

/// One named per-point data channel from a VMAP/VMAD chunk.
pub(crate) struct VmapChannel {
    /// Components per point as declared in the file.
    pub dims: usize,
    /// Dense `point count × dims` storage; unreferenced points stay zero.
    pub data: Vec<f32>,
    pub name: String,
}

#[derive(Default)]
pub(crate) struct RawFace {
    pub indices: Vec<u32>,
    pub smoothing: u32,
    /// Index into the tag list; resolved to a surface after parsing.
    pub surface: Option<u32>,
}

pub(crate) struct Layer {
    pub color_channels: Vec<VmapChannel>,
    pub face_ofs: usize,
    pub faces: Vec<RawFace>,
    /// The layer number from LAYR; parents reference it.
    pub index: u16,
    pub name: String,
    pub parent: Option<u16>,
    pub point_ofs: usize,
    pub points: Vec<Vec3>,
    pub uv_channels: Vec<VmapChannel>,
    pub weight_channels: Vec<VmapChannel>,
}

impl Layer {
    fn new<N: Into<String>>(name: N, index: u16) -> Self {
        Self {
            color_channels: vec![],
            face_ofs: 0,
            faces: vec![],
            index,
            name: name.into(),
            parent: None,
            point_ofs: 0,
            points: vec![],
            uv_channels: vec![],
            weight_channels: vec![],
        }
    }
}

/// A shared image reference addressed by a small integer from IMAP blocks.
pub(crate) struct Clip {
    pub index: u32,
    pub negate: bool,
    pub path: String,
    pub supported: bool,
}

#[derive(Default)]
pub(crate) struct Intermediate {
    pub clips: Vec<Clip>,
    pub is_lwo2: bool,
    pub layers: Vec<Layer>,
    pub surfaces: Vec<Surface>,
    pub tags: Vec<String>,
}

impl Intermediate {
    fn layer(&mut self) -> &mut Layer {
        self.layers.last_mut().unwrap()
    }
}

pub struct LwoDecoder;

impl Decoder for LwoDecoder {
    fn name(&self) -> &'static str {
        "LWO"
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "lwo"
    }

    fn read(&self, asset: &RawAsset<'_>, config: &Config) -> Result<Scene, Error> {
        if asset.bytes.len() < MIN_FILE_SIZE {
            return Err(Error::new(
                ErrorKind::FileTooSmall,
                "the file is too small to contain the IFF header",
            )
            .with_format("LWO"));
        }

        let mut reader = ByteReader::new(asset.bytes);
        if reader.read_u32_be()? != chunks::FORM {
            return Err(
                Error::new(ErrorKind::InvalidMagic, "no FORM header found").with_format("LWO")
            );
        }

        let declared = reader.read_u32_be()? as usize;
        if declared > reader.remaining() {
            warn!(
                "FORM declares {} bytes but only {} are present",
                declared,
                reader.remaining()
            );
        }

        let flavor = reader.read_u32_be()?;
        let mut scratch = Intermediate::default();
        scratch.layers.push(Layer::new("<LWODefault>", 0));
        match flavor {
            chunks::LWOB => scratch.is_lwo2 = false,
            chunks::LWO2 => scratch.is_lwo2 = true,
            _ => {
                let name = flavor.to_be_bytes();
                return Err(Error::new(
                    ErrorKind::InvalidMagic,
                    format!("unknown sub format: {}", String::from_utf8_lossy(&name)),
                )
                .with_format("LWO"));
            }
        }

        parse_chunks(&mut scratch, &mut reader).map_err(|err| err.with_format("LWO"))?;
        build_scene(scratch, config).map_err(|err| err.with_format("LWO"))
    }
}

/// Reads a NUL-terminated string padded so that an even number of bytes is
/// consumed.
pub(crate) fn read_padded_string(reader: &mut ByteReader<'_>) -> Result<String, Error> {
    let (res, found_nul) = reader.read_cstr_bounded(reader.remaining())?;
    if !found_nul {
        warn!("string is not terminated within its chunk");
    } else if (res.len() + 1) % 2 == 1 && reader.remaining() > 0 {
        reader.skip(1)?;
    }

    Ok(res)
}

/// Variable-sized vertex index: two big-endian bytes unless the first byte
/// is 0xFF, which escapes to a three-byte form.
pub(crate) fn read_vsized_index(reader: &mut ByteReader<'_>) -> Result<u32, Error> {
    let first = reader.read_u8()? as u32;
    Ok(if first != 0xff {
        first << 8 | reader.read_u8()? as u32
    } else {
        (reader.read_u8()? as u32) << 16
            | (reader.read_u8()? as u32) << 8
            | reader.read_u8()? as u32
    })
}

fn parse_chunks(scratch: &mut Intermediate, reader: &mut ByteReader<'_>) -> Result<(), Error> {
    let len = reader.remaining();
    for_each_chunk_within(reader, len, ChunkLayout::TagU32LenU32, |tag, payload| {
        match tag {
            chunks::LAYR if scratch.is_lwo2 => parse_layer(scratch, payload)?,
            chunks::PNTS => {
                let old = scratch.layer().points.len();
                parse_points(scratch, payload)?;
                scratch.layer().point_ofs = old;
            }
            chunks::POLS => {
                let old = scratch.layer().faces.len();
                parse_polygons(scratch, payload)?;
                scratch.layer().face_ofs = old;
            }
            chunks::VMAP | chunks::VMAD => {
                if scratch.layer().points.is_empty() {
                    warn!("unexpected VMAP/VMAD chunk");
                } else {
                    parse_vertex_map(scratch, payload)?;
                }
            }
            chunks::PTAG => {
                if scratch.layer().faces.is_empty() {
                    warn!("unexpected PTAG chunk");
                } else {
                    parse_polygon_tags(scratch, payload)?;
                }
            }
            chunks::SRFS | chunks::TAGS => parse_tags(scratch, payload)?,
            chunks::CLIP => parse_clip(scratch, payload)?,
            chunks::SURF => {
                if scratch.is_lwo2 {
                    surface::parse_lwo2_surface(scratch, payload)?;
                } else {
                    surface::parse_lwob_surface(scratch, payload)?;
                }
            }
            _ => (),
        }

        Ok(())
    })
}

fn parse_layer(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    let index = payload.read_u16_be()?;

    // flags and pivot point, nothing we keep
    payload.skip(14)?;

    let mut name = read_padded_string(payload)?;
    if name.is_empty() {
        name = format!("Layer_{}", scratch.layers.len());
    }

    let mut layer = Layer::new(name, index);
    if payload.remaining() >= 2 {
        layer.parent = Some(payload.read_u16_be()?);
    }

    scratch.layers.push(layer);

    Ok(())
}

fn parse_points(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    let count = payload.remaining() / 12;
    let layer = scratch.layer();
    layer.points.reserve(count);
    for _ in 0..count {
        let x = payload.read_f32_be()?;
        let y = payload.read_f32_be()?;
        let z = payload.read_f32_be()?;
        layer.points.push(vec3(x, y, z));
    }

    Ok(())
}

fn parse_polygons(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    if scratch.is_lwo2 {
        let sub_type = payload.read_u32_be()?;
        if sub_type != chunks::FACE {
            warn!("only POLS.FACE chunks are supported");
            return Ok(());
        }

        let point_count = scratch.layer().points.len();
        let point_ofs = scratch.layer().point_ofs;
        while payload.remaining() >= 2 {
            // the high six bits of the count are flags
            let count = (payload.read_u16_be()? & 0x03ff) as usize;
            if count == 0 {
                warn!("face has 0 indices");
            }

            let mut face = RawFace::default();

            // untagged faces fall back to the first tag
            face.surface = Some(0);
            face.indices.reserve(count);
            for _ in 0..count {
                let mut index = read_vsized_index(payload)? as usize + point_ofs;
                if index >= point_count {
                    warn!("face index is out of range");
                    index = point_count.saturating_sub(1);
                }

                face.indices.push(index as u32);
            }

            scratch.layer().faces.push(face);
        }
    } else {
        parse_lwob_polygons(scratch, payload, usize::MAX)?;
    }

    Ok(())
}

// LWOB polygons: u16 count, u16 indices, signed surface; a negative surface
// introduces a counted list of detail polygons
fn parse_lwob_polygons(
    scratch: &mut Intermediate,
    payload: &mut ByteReader<'_>,
    max: usize,
) -> Result<(), Error> {
    let mut remaining = max;
    while payload.remaining() >= 4 && remaining > 0 {
        remaining -= 1;

        let count = payload.read_u16_be()? as usize;
        if count == 0 {
            warn!("face has 0 indices");
        }

        let point_count = scratch.layer().points.len();
        let mut face = RawFace::default();
        face.indices.reserve(count);
        for _ in 0..count {
            let mut index = payload.read_u16_be()? as usize;
            if index >= point_count {
                warn!("face index is out of range");
                index = point_count.saturating_sub(1);
            }

            face.indices.push(index as u32);
        }

        let mut surface = payload.read_i16_be()?;
        if surface < 0 {
            surface = -surface;

            // detail polygons follow, counted rather than sized
            let details = payload.read_u16_be()? as usize;
            scratch.layer().faces.push(with_surface(face, surface as u32));
            parse_lwob_polygons(scratch, payload, details)?;
            continue;
        }

        scratch
            .layer()
            .faces
            .push(with_surface(face, surface as u32));
    }

    Ok(())
}

// LWOB surface numbers are one-based
fn with_surface(mut face: RawFace, surface: u32) -> RawFace {
    face.surface = Some(surface.saturating_sub(1));
    face
}

fn parse_polygon_tags(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    let kind = payload.read_u32_be()?;
    if kind != chunks::SURF && kind != chunks::SMGP {
        return Ok(());
    }

    let face_ofs = scratch.layer().face_ofs;
    while payload.remaining() >= 2 {
        let face = read_vsized_index(payload)? as usize + face_ofs;
        let value = read_vsized_index(payload)?;

        let layer = scratch.layer();
        match layer.faces.get_mut(face) {
            Some(face) if kind == chunks::SURF => face.surface = Some(value),
            Some(face) => face.smoothing = value,
            None => warn!("face index in PTAG list is out of range"),
        }
    }

    Ok(())
}

fn parse_vertex_map(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    let kind = payload.read_u32_be()?;
    let dims = payload.read_u16_be()? as usize;
    let name = read_padded_string(payload)?;

    let point_count = scratch.layer().points.len();
    let point_ofs = scratch.layer().point_ofs;
    let mut channel = VmapChannel {
        dims,
        data: vec![0.0; point_count * dims],
        name,
    };

    let expected = match kind {
        chunks::TXUV => 2,
        chunks::WGHT => 1,
        chunks::RGB => 3,
        chunks::RGBA => 4,
        _ => return Ok(()),
    };
    if dims != expected && !(kind == chunks::RGB && dims == 4 || kind == chunks::RGBA && dims == 3)
    {
        warn!(
            "vertex map {:?} declares {} components where {} are expected",
            channel.name, dims, expected
        );
    }

    while payload.remaining() > 0 {
        let index = read_vsized_index(payload)? as usize + point_ofs;
        if index >= point_count {
            warn!("vertex index in vmap/vmad is out of range");

            // still consume this entry's floats to stay aligned
            for _ in 0..dims {
                if payload.remaining() >= 4 {
                    payload.read_f32_be()?;
                }
            }
            continue;
        }

        for comp in 0..dims {
            if payload.remaining() < 4 {
                break;
            }

            channel.data[index * dims + comp] = payload.read_f32_be()?;
        }
    }

    let layer = scratch.layer();
    match kind {
        chunks::TXUV => layer.uv_channels.push(channel),
        chunks::WGHT => layer.weight_channels.push(channel),
        chunks::RGB | chunks::RGBA => layer.color_channels.push(channel),
        _ => (),
    }

    Ok(())
}

fn parse_tags(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    if !scratch.tags.is_empty() {
        warn!("tag list chunk encountered twice");
        return Ok(());
    }

    while payload.remaining() > 0 {
        let (tag, found_nul) = payload.read_cstr_bounded(payload.remaining())?;
        if (tag.len() + 1) % 2 == 1 && payload.remaining() > 0 {
            payload.skip(1)?;
        }

        scratch.tags.push(tag);

        if !found_nul {
            break;
        }
    }

    Ok(())
}

fn parse_clip(scratch: &mut Intermediate, payload: &mut ByteReader<'_>) -> Result<(), Error> {
    let index = payload.read_u32_be()?;
    let mut clip = Clip {
        index,
        negate: false,
        path: String::new(),
        supported: false,
    };

    let len = payload.remaining();
    for_each_chunk_within(payload, len, ChunkLayout::TagU32LenU16, |tag, payload| {
        match tag {
            chunks::STIL => {
                clip.path = read_padded_string(payload)?;
                clip.supported = true;
            }
            _ => {
                // animated and referenced clips are not supported
            }
        }

        Ok(())
    })?;

    if !clip.supported {
        warn!("clip {} has an unsupported type", index);
    }

    scratch.clips.push(clip);

    Ok(())
}

/// Maps each tag index to the surface with the same name, case-insensitive.
fn resolve_tags(scratch: &Intermediate) -> Vec<Option<usize>> {
    scratch
        .tags
        .iter()
        .map(|tag| {
            scratch
                .surfaces
                .iter()
                .position(|surf| surf.name.eq_ignore_ascii_case(tag))
        })
        .collect()
}

fn build_scene(mut scratch: Intermediate, config: &Config) -> Result<Scene, Error> {
    let mapping = resolve_tags(&scratch);
    let mut default_surface = None;
    let tag_count = scratch.tags.len();
    let surface_count = scratch.surfaces.len();

    // resolve every face to a surface index, appending a grey default
    // surface for faces whose tag cannot be resolved
    let layer_filter = config.lwo_layer().map(|s| s.to_owned());
    let surfaces = &mut scratch.surfaces;
    for layer in &mut scratch.layers {
        for face in &mut layer.faces {
            let resolved = match face.surface {
                Some(tag) => {
                    let tag = tag as usize;
                    if tag_count == 0 {
                        // files without a tag list index surfaces directly
                        if tag < surface_count {
                            Some(tag)
                        } else {
                            None
                        }
                    } else if tag >= tag_count {
                        warn!("invalid face surface index");
                        None
                    } else {
                        mapping[tag]
                    }
                }
                None => None,
            };

            face.surface = Some(match resolved {
                Some(idx) => idx as u32,
                None => {
                    if default_surface.is_none() {
                        let mut surf = Surface::default();
                        surf.color = vec3(0.6, 0.6, 0.6);
                        surfaces.push(surf);
                        default_surface = Some(surfaces.len() - 1);
                    }

                    default_surface.unwrap() as u32
                }
            });
        }
    }

    // generate meshes layer by layer; each layer becomes one node
    let mut scene = Scene::new();
    let mut nodes = vec![];
    for layer_idx in 0..scratch.layers.len() {
        let skip = match &layer_filter {
            Some(wanted) => {
                let layer = &scratch.layers[layer_idx];
                !(layer.name == *wanted || wanted.parse::<u16>() == Ok(layer.index))
            }
            None => false,
        };

        let mesh_start = scene.meshes.len();
        if !skip {
            build_layer_meshes(&mut scratch, layer_idx, &mut scene.meshes);
        }

        let layer = &scratch.layers[layer_idx];

        // the pre-allocated default layer only matters when it was used
        if layer.points.is_empty() && layer.faces.is_empty() && mesh_start == scene.meshes.len() {
            continue;
        }

        let mut node = Node::new(layer.name.clone());
        node.meshes.extend(mesh_start..scene.meshes.len());
        nodes.push((layer.index, layer.parent, node));
    }

    if scene.meshes.is_empty() {
        return Err(Error::new(ErrorKind::InvalidGeometry, "there are no meshes"));
    }

    for surf in &scratch.surfaces {
        scene
            .materials
            .push(convert_surface(surf, &scratch.clips, scratch.is_lwo2));
    }

    scene.root = build_node_graph(nodes)?;

    Ok(scene)
}

fn build_layer_meshes(scratch: &mut Intermediate, layer_idx: usize, out: &mut Vec<Mesh>) {
    let surface_count = scratch.surfaces.len();

    // sort the layer's faces by the surface assigned to them
    let mut sorted: Vec<Vec<usize>> = vec![vec![]; surface_count];
    {
        let layer = &scratch.layers[layer_idx];
        if layer.faces.is_empty() || layer.points.is_empty() {
            return;
        }

        for (face_idx, face) in layer.faces.iter().enumerate() {
            if let Some(surface) = face.surface {
                sorted[surface as usize].push(face_idx);
            }
        }
    }

    for (surface_idx, face_indices) in sorted.into_iter().enumerate() {
        if face_indices.is_empty() {
            continue;
        }

        // pick the UV and color channels the surface actually uses, in the
        // ordinal-sorted order of its texture stack
        let uv_names = surface::used_uv_channels(
            &mut scratch.surfaces[surface_idx],
            &scratch.layers[layer_idx],
        );
        let color_name = scratch.surfaces[surface_idx].vc_map.clone();

        let layer = &scratch.layers[layer_idx];
        let mut mesh = Mesh::default();
        mesh.material = surface_idx as u32;

        let uv_channels: Vec<&VmapChannel> = uv_names
            .iter()
            .filter_map(|name| layer.uv_channels.iter().find(|c| c.name == *name))
            .collect();
        let color_channel = color_name
            .as_ref()
            .and_then(|name| layer.color_channels.iter().find(|c| c.name == *name));

        let mut uv_data: Vec<Vec<crate::math::Vec3>> = vec![vec![]; uv_channels.len()];
        let mut color_data = vec![];
        for &face_idx in &face_indices {
            let face = &layer.faces[face_idx];
            let base = mesh.positions.len() as u32;
            for &index in &face.indices {
                mesh.positions.push(layer.points[index as usize]);

                for (channel_idx, channel) in uv_channels.iter().enumerate() {
                    let ofs = index as usize * channel.dims;
                    uv_data[channel_idx].push(vec3(
                        channel.data.get(ofs).copied().unwrap_or(0.0),
                        channel.data.get(ofs + 1).copied().unwrap_or(0.0),
                        0.0,
                    ));
                }

                if let Some(channel) = color_channel {
                    let ofs = index as usize * channel.dims;
                    let a = if channel.dims >= 4 {
                        channel.data.get(ofs + 3).copied().unwrap_or(1.0)
                    } else {
                        1.0
                    };
                    color_data.push(crate::math::vec4(
                        channel.data.get(ofs).copied().unwrap_or(0.0),
                        channel.data.get(ofs + 1).copied().unwrap_or(0.0),
                        channel.data.get(ofs + 2).copied().unwrap_or(0.0),
                        a,
                    ));
                }
            }

            let indices = (base..base + face.indices.len() as u32).collect();
            mesh.faces.push(Face {
                indices,
                smoothing: face.smoothing,
            });
        }

        for (channel_idx, data) in uv_data.into_iter().enumerate() {
            if channel_idx >= mesh.texcoords.len() {
                warn!("surface uses more UV channels than a mesh can carry");
                break;
            }

            mesh.texcoords[channel_idx] = Some(crate::scene::TexCoordChannel {
                components: 2,
                data,
            });
        }

        if !color_data.is_empty() {
            mesh.colors[0] = Some(color_data);
        }

        out.push(mesh);
    }
}

/// Builds the node tree from the per-layer parent indices.
///
/// Layers whose parent cannot be found become roots; a single root is
/// returned directly and several roots hang below a synthetic dummy root.
fn build_node_graph(nodes: Vec<(u16, Option<u16>, Node)>) -> Result<Node, Error> {
    if nodes.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidHierarchy,
            "unable to build a valid node graph",
        ));
    }

    let numbers: Vec<u16> = nodes.iter().map(|(number, _, _)| *number).collect();
    let mut slots: Vec<Option<Node>> = vec![];
    let mut children: Vec<Vec<usize>> = vec![vec![]; nodes.len()];
    let mut roots = vec![];
    for (slot, (number, parent, node)) in nodes.into_iter().enumerate() {
        let parent_slot = parent
            .and_then(|p| numbers.iter().position(|other| *other == p))
            .filter(|parent_slot| *parent_slot != slot && numbers[*parent_slot] != number);
        match parent_slot {
            Some(parent_slot) => children[parent_slot].push(slot),
            None => roots.push(slot),
        }

        slots.push(Some(node));
    }

    fn take(slot: usize, slots: &mut Vec<Option<Node>>, children: &[Vec<usize>]) -> Node {
        let mut node = slots[slot].take().unwrap();
        for &child in &children[slot] {
            if slots[child].is_some() {
                node.children.push(take(child, slots, children));
            }
        }

        node
    }

    let mut top: Vec<Node> = roots
        .into_iter()
        .map(|slot| take(slot, &mut slots, &children))
        .collect();

    // parent cycles leave their members unreachable; flatten them to the top
    for slot in 0..slots.len() {
        if slots[slot].is_some() {
            warn!("layer parent cycle detected, flattening");
            top.push(take(slot, &mut slots, &children));
        }
    }

    Ok(if top.len() == 1 {
        top.pop().unwrap()
    } else {
        let mut dummy = Node::new("<dummy_root>");
        dummy.children = top;
        dummy
    })
}
