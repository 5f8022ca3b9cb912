//! LWO surfaces: the material description attached to polygons by tag.
//!
//! LWOB surfaces are flat sub-chunk lists with direct texture file names;
//! LWO2 surfaces nest BLOK texture blocks whose ordinal strings decide the
//! stacking order and whose IMAP references go through the clip table.

use {
    super::{chunks, read_padded_string, read_vsized_index, Clip, Intermediate, Layer},
    crate::{
        iff::{for_each_chunk_within, ChunkLayout},
        math::{vec3, Vec3},
        scene::{
            material::{
                shading, PropertyKey, PropertyValue, TextureStack, KEY_BUMP_SCALING,
                KEY_COLOR_DIFFUSE, KEY_COLOR_EMISSIVE, KEY_COLOR_SPECULAR, KEY_NAME, KEY_OPACITY,
                KEY_REFRACTION_INDEX, KEY_SHADING_MODEL, KEY_SHININESS, KEY_SHININESS_STRENGTH,
                KEY_TWO_SIDED, KEY_WIREFRAME,
            },
            Material, TextureKind,
        },
        ByteReader, Error,
    },
};

// projection modes of an IMAP block
const PROJ_PLANAR: u16 = 0;
const PROJ_CYLINDRICAL: u16 = 1;
const PROJ_SPHERICAL: u16 = 2;
const PROJ_CUBIC: u16 = 3;
const PROJ_FRONT: u16 = 4;
const PROJ_UV: u16 = 5;

// wrap modes
const WRAP_RESET: u16 = 0;
const WRAP_REPEAT: u16 = 1;
const WRAP_MIRROR: u16 = 2;
const WRAP_EDGE: u16 = 3;

// blend types of an OPAC sub-chunk
const BLEND_NORMAL: u16 = 0;
const BLEND_SUBTRACTIVE: u16 = 1;
const BLEND_DIFFERENCE: u16 = 2;
const BLEND_MULTIPLY: u16 = 3;
const BLEND_DIVIDE: u16 = 4;
const BLEND_ADDITIVE: u16 = 7;

// texture operation codes stored in the $tex.op property
const OP_MULTIPLY: i32 = 0;
const OP_ADD: i32 = 1;
const OP_SUBTRACT: i32 = 2;
const OP_DIVIDE: i32 = 3;

// map mode codes stored in the $tex.mapmode* properties
const MODE_WRAP: i32 = 0;
const MODE_CLAMP: i32 = 1;
const MODE_MIRROR: i32 = 2;

// texture flag bits stored in the $tex.flags property
const FLAG_INVERT: i32 = 0x1;

pub(crate) struct Texture {
    pub axis: u16,
    pub blend_type: u16,
    pub clip: Option<u16>,
    pub enabled: bool,
    /// Direct file name; only the legacy LWOB layout uses it.
    pub file: String,
    pub ordinal: String,
    pub projection: u16,
    /// Mesh UV channel assigned while building meshes.
    pub real_uv_index: Option<u32>,
    pub strength: f32,
    /// Name of the vertex map carrying this texture's UVs.
    pub uv_channel: String,
    /// Cleared for procedural and gradient blocks.
    pub usable: bool,
    pub wrap_h: u16,
    pub wrap_w: u16,
}

impl Default for Texture {
    fn default() -> Self {
        Self {
            axis: 2,
            blend_type: BLEND_NORMAL,
            clip: None,
            enabled: true,
            file: String::new(),
            ordinal: String::new(),
            projection: PROJ_PLANAR,
            real_uv_index: None,
            strength: 1.0,
            uv_channel: String::new(),
            usable: true,
            wrap_h: WRAP_REPEAT,
            wrap_w: WRAP_REPEAT,
        }
    }
}

pub(crate) struct Shader {
    pub enabled: bool,
    pub function: String,
    pub ordinal: String,
}

pub(crate) struct Surface {
    pub additive_transparency: f32,
    pub bump: f32,
    pub color: Vec3,
    pub color_highlights: f32,
    pub diffuse: f32,
    pub double_sided: bool,
    pub glossiness: f32,
    pub ior: f32,
    pub luminosity: f32,
    pub max_smooth_angle: f32,
    pub name: String,
    pub shaders: Vec<Shader>,
    pub specular: f32,
    pub transparency: Option<f32>,
    pub vc_map: Option<String>,
    pub wireframe: bool,

    pub bump_textures: Vec<Texture>,
    pub color_textures: Vec<Texture>,
    pub diffuse_textures: Vec<Texture>,
    pub glossiness_textures: Vec<Texture>,
    pub opacity_textures: Vec<Texture>,
    pub reflection_textures: Vec<Texture>,
    pub specular_textures: Vec<Texture>,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            additive_transparency: 0.0,
            bump: 1.0,
            color: vec3(0.78431, 0.78431, 0.78431),
            color_highlights: 0.0,
            diffuse: 1.0,
            double_sided: false,
            glossiness: 0.0,
            ior: 1.0,
            luminosity: 0.0,
            max_smooth_angle: 0.0,
            name: String::new(),
            shaders: vec![],
            specular: 0.0,
            transparency: None,
            vc_map: None,
            wireframe: false,

            bump_textures: vec![],
            color_textures: vec![],
            diffuse_textures: vec![],
            glossiness_textures: vec![],
            opacity_textures: vec![],
            reflection_textures: vec![],
            specular_textures: vec![],
        }
    }
}

impl Surface {
    fn texture_list(&mut self, channel: u32) -> Option<&mut Vec<Texture>> {
        Some(match channel {
            chunks::COLR => &mut self.color_textures,
            chunks::DIFF => &mut self.diffuse_textures,
            chunks::SPEC => &mut self.specular_textures,
            chunks::GLOS => &mut self.glossiness_textures,
            chunks::BUMP => &mut self.bump_textures,
            chunks::TRAN => &mut self.opacity_textures,
            chunks::REFL => &mut self.reflection_textures,
            _ => return None,
        })
    }
}

fn sub_chunks(
    payload: &mut ByteReader<'_>,
    handler: impl FnMut(u32, &mut ByteReader<'_>) -> Result<(), Error>,
) -> Result<(), Error> {
    let len = payload.remaining();
    for_each_chunk_within(payload, len, ChunkLayout::TagU32LenU16, handler)
}

pub(crate) fn parse_lwob_surface(
    scratch: &mut Intermediate,
    payload: &mut ByteReader<'_>,
) -> Result<(), Error> {
    let mut surf = Surface::default();
    surf.name = read_padded_string(payload)?;

    // legacy surfaces have no smoothing chunk; keep them smooth-shaded
    surf.max_smooth_angle = 90.0;

    // which texture the next TIMG/TVAL applies to
    let mut pending: Option<u32> = None;

    sub_chunks(payload, |tag, payload| {
        match tag {
            chunks::COLR if payload.remaining() >= 3 => {
                surf.color = vec3(
                    payload.read_u8()? as f32 / 255.0,
                    payload.read_u8()? as f32 / 255.0,
                    payload.read_u8()? as f32 / 255.0,
                );
            }
            chunks::DIFF if payload.remaining() >= 2 => {
                surf.diffuse = payload.read_i16_be()? as f32 / 255.0;
            }
            chunks::SPEC if payload.remaining() >= 2 => {
                surf.specular = payload.read_i16_be()? as f32 / 255.0;
            }
            chunks::LUMI if payload.remaining() >= 2 => {
                surf.luminosity = payload.read_i16_be()? as f32 / 255.0;
            }
            chunks::TRAN if payload.remaining() >= 2 => {
                surf.transparency = Some(payload.read_i16_be()? as f32 / 255.0);
            }
            chunks::GLOS if payload.remaining() >= 2 => {
                surf.glossiness = payload.read_i16_be()? as f32;
            }
            chunks::CTEX | chunks::DTEX | chunks::STEX | chunks::BTEX | chunks::TTEX => {
                let channel = match tag {
                    chunks::CTEX => chunks::COLR,
                    chunks::DTEX => chunks::DIFF,
                    chunks::STEX => chunks::SPEC,
                    chunks::BTEX => chunks::BUMP,
                    _ => chunks::TRAN,
                };
                surf.texture_list(channel).unwrap().push(Texture::default());
                pending = Some(channel);
            }
            chunks::TIMG => match pending {
                Some(channel) => {
                    let tex = surf.texture_list(channel).unwrap().last_mut().unwrap();
                    tex.file = adjust_texture_path(read_padded_string(payload)?);
                }
                None => warn!("TIMG tag without a preceding xTEX tag"),
            },
            chunks::TVAL if payload.remaining() >= 1 => match pending {
                Some(channel) => {
                    let tex = surf.texture_list(channel).unwrap().last_mut().unwrap();
                    tex.strength = payload.read_u8()? as f32 / 255.0;
                }
                None => warn!("TVAL tag without a preceding xTEX tag"),
            },
            _ => (),
        }

        Ok(())
    })?;

    scratch.surfaces.push(surf);

    Ok(())
}

pub(crate) fn parse_lwo2_surface(
    scratch: &mut Intermediate,
    payload: &mut ByteReader<'_>,
) -> Result<(), Error> {
    let name = read_padded_string(payload)?;

    // a second name marks a surface derived from an existing one
    let source = read_padded_string(payload)?;
    let mut surf = Surface::default();
    if !source.is_empty() {
        match scratch.surfaces.iter().find(|other| other.name == source) {
            Some(base) => {
                surf.additive_transparency = base.additive_transparency;
                surf.bump = base.bump;
                surf.color = base.color;
                surf.color_highlights = base.color_highlights;
                surf.diffuse = base.diffuse;
                surf.double_sided = base.double_sided;
                surf.glossiness = base.glossiness;
                surf.ior = base.ior;
                surf.luminosity = base.luminosity;
                surf.max_smooth_angle = base.max_smooth_angle;
                surf.specular = base.specular;
                surf.transparency = base.transparency;
                surf.wireframe = base.wireframe;
            }
            None => warn!("unable to find source surface: {:?}", source),
        }
    }
    surf.name = name;

    sub_chunks(payload, |tag, payload| {
        match tag {
            chunks::COLR if payload.remaining() >= 12 => {
                surf.color = vec3(
                    payload.read_f32_be()?,
                    payload.read_f32_be()?,
                    payload.read_f32_be()?,
                );
            }
            chunks::DIFF if payload.remaining() >= 4 => surf.diffuse = payload.read_f32_be()?,
            chunks::SPEC if payload.remaining() >= 4 => surf.specular = payload.read_f32_be()?,
            chunks::LUMI if payload.remaining() >= 4 => surf.luminosity = payload.read_f32_be()?,
            chunks::TRAN if payload.remaining() >= 4 => {
                surf.transparency = Some(payload.read_f32_be()?);
            }
            chunks::ADTR if payload.remaining() >= 4 => {
                surf.additive_transparency = payload.read_f32_be()?;
            }
            chunks::LINE if payload.remaining() >= 2 => {
                if payload.read_u16_be()? & 0x1 != 0 {
                    surf.wireframe = true;
                }
            }
            chunks::GLOS if payload.remaining() >= 4 => surf.glossiness = payload.read_f32_be()?,
            chunks::BUMP if payload.remaining() >= 4 => surf.bump = payload.read_f32_be()?,
            chunks::CLRH if payload.remaining() >= 4 => {
                surf.color_highlights = payload.read_f32_be()?;
            }
            chunks::RIND if payload.remaining() >= 4 => surf.ior = payload.read_f32_be()?,
            chunks::SIDE if payload.remaining() >= 2 => {
                surf.double_sided = payload.read_u16_be()? == 3;
            }
            chunks::SMAN if payload.remaining() >= 4 => {
                surf.max_smooth_angle = payload.read_f32_be()?.abs();
            }
            chunks::VCOL if payload.remaining() >= 12 => {
                surf.diffuse *= payload.read_f32_be()?;
                read_vsized_index(payload)?; // envelope
                payload.read_u32_be()?; // channel type
                surf.vc_map = Some(read_padded_string(payload)?);
            }
            chunks::BLOK if payload.remaining() >= 6 => {
                let (block_type, header_len) = ChunkLayout::TagU32LenU16.read_header(payload)?;
                match block_type {
                    chunks::PROC | chunks::GRAD | chunks::IMAP => {
                        parse_texture_block(&mut surf, block_type, header_len, payload)?;
                    }
                    chunks::SHDR => parse_shader_block(&mut surf, header_len, payload)?,
                    _ => warn!("unsupported surface BLOK"),
                }
            }
            _ => (),
        }

        Ok(())
    })?;

    scratch.surfaces.push(surf);

    Ok(())
}

// the block's first sub-chunk holds the ordinal string plus channel, enable
// and opacity settings; its type decides how the rest is read
fn parse_texture_block(
    surf: &mut Surface,
    block_type: u32,
    header_len: usize,
    payload: &mut ByteReader<'_>,
) -> Result<(), Error> {
    let mut tex = Texture::default();
    let mut channel = 0;
    payload.with_limit(header_len, |header| {
        tex.ordinal = read_padded_string(header)?;
        if tex.ordinal.is_empty() {
            error!("ill-formed SURF.BLOK ordinal string");
            tex.ordinal = "\u{0}".to_owned();
        }

        sub_chunks(header, |tag, payload| {
            match tag {
                chunks::CHAN if payload.remaining() >= 4 => channel = payload.read_u32_be()?,
                chunks::ENAB if payload.remaining() >= 2 => {
                    tex.enabled = payload.read_u16_be()? != 0;
                }
                chunks::OPAC if payload.remaining() >= 6 => {
                    tex.blend_type = payload.read_u16_be()?;
                    tex.strength = payload.read_f32_be()?;
                }
                _ => (),
            }

            Ok(())
        })
    })?;

    match block_type {
        chunks::PROC => {
            error!("found procedural texture, this is not supported");
            tex.usable = false;
        }
        chunks::GRAD => {
            error!("found gradient texture, this is not supported");
            tex.usable = false;
        }
        _ => {
            sub_chunks(payload, |tag, payload| {
                match tag {
                    chunks::PROJ if payload.remaining() >= 2 => {
                        tex.projection = payload.read_u16_be()?;
                    }
                    chunks::WRAP if payload.remaining() >= 4 => {
                        tex.wrap_w = payload.read_u16_be()?;
                        tex.wrap_h = payload.read_u16_be()?;
                    }
                    chunks::AXIS if payload.remaining() >= 2 => {
                        tex.axis = payload.read_u16_be()?;
                    }
                    chunks::IMAG if payload.remaining() >= 2 => {
                        tex.clip = Some(payload.read_u16_be()?);
                    }
                    chunks::VMAP => tex.uv_channel = read_padded_string(payload)?,
                    chunks::WRPH | chunks::WRPW => (),
                    _ => (),
                }

                Ok(())
            })?;
        }
    }

    match surf.texture_list(channel) {
        Some(list) => insert_by_ordinal(list, tex),
        None => warn!("encountered unknown texture channel"),
    }

    Ok(())
}

fn parse_shader_block(
    surf: &mut Surface,
    header_len: usize,
    payload: &mut ByteReader<'_>,
) -> Result<(), Error> {
    let mut shader = Shader {
        enabled: true,
        function: String::new(),
        ordinal: String::new(),
    };
    payload.with_limit(header_len, |header| {
        shader.ordinal = read_padded_string(header)?;
        if shader.ordinal.is_empty() {
            error!("ill-formed SURF.BLOK ordinal string");
            shader.ordinal = "\u{0}".to_owned();
        }

        sub_chunks(header, |tag, payload| {
            if tag == chunks::ENAB && payload.remaining() >= 2 {
                shader.enabled = payload.read_u16_be()? != 0;
            }

            Ok(())
        })
    })?;

    sub_chunks(payload, |tag, payload| {
        if tag == chunks::FUNC {
            shader.function = read_padded_string(payload)?;
        }

        Ok(())
    })?;

    let at = surf
        .shaders
        .iter()
        .position(|other| shader.ordinal < other.ordinal)
        .unwrap_or(surf.shaders.len());
    surf.shaders.insert(at, shader);

    Ok(())
}

// textures on one channel stack in the order of their ordinal strings
fn insert_by_ordinal(list: &mut Vec<Texture>, tex: Texture) {
    let at = list
        .iter()
        .position(|other| tex.ordinal < other.ordinal)
        .unwrap_or(list.len());
    list.insert(at, tex);
}

fn adjust_texture_path(mut path: String) -> String {
    if path.contains("(sequence)") {
        // keep the base name and pretend the first frame was meant
        info!("sequence of animated texture found, using the first frame");
        let len = path.len() - 10;
        path.truncate(len);
        path.push_str("000");
    }

    path
}

/// Collects the UV channel names the surface's textures reference, in stack
/// order, and assigns each texture its final mesh channel index.
pub(crate) fn used_uv_channels(surf: &mut Surface, layer: &Layer) -> Vec<String> {
    let mut res: Vec<String> = vec![];
    let lists = [
        &mut surf.color_textures,
        &mut surf.diffuse_textures,
        &mut surf.specular_textures,
        &mut surf.glossiness_textures,
        &mut surf.bump_textures,
        &mut surf.opacity_textures,
        &mut surf.reflection_textures,
    ];
    for list in lists {
        for tex in list.iter_mut() {
            if !tex.enabled || !tex.usable || tex.projection != PROJ_UV {
                continue;
            }

            if !layer
                .uv_channels
                .iter()
                .any(|channel| channel.name == tex.uv_channel)
            {
                continue;
            }

            let index = match res.iter().position(|name| *name == tex.uv_channel) {
                Some(index) => index,
                None => {
                    res.push(tex.uv_channel.clone());
                    res.len() - 1
                }
            };
            tex.real_uv_index = Some(index as u32);
        }
    }

    res
}

pub(crate) fn convert_surface(surf: &Surface, clips: &[Clip], is_lwo2: bool) -> Material {
    let mut mat = Material::new();
    mat.add_str(PropertyKey::scalar(KEY_NAME), surf.name.clone());
    mat.add_i32(PropertyKey::scalar(KEY_TWO_SIDED), surf.double_sided as i32);
    mat.add_f32(PropertyKey::scalar(KEY_REFRACTION_INDEX), surf.ior);
    mat.add_f32(PropertyKey::scalar(KEY_BUMP_SCALING), surf.bump);

    let mut shading_model = shading::GOURAUD;
    if surf.specular != 0.0 && surf.glossiness != 0.0 {
        // LWO2 stores glossiness normalized; the legacy format stores the
        // raw exponent, bucketed here the way LightWave renders it
        let gloss = if is_lwo2 {
            (surf.glossiness * 10.0 + 2.0).powf(2.0)
        } else if surf.glossiness <= 16.0 {
            6.0
        } else if surf.glossiness <= 64.0 {
            20.0
        } else if surf.glossiness <= 256.0 {
            50.0
        } else {
            80.0
        };

        mat.add_f32(PropertyKey::scalar(KEY_SHININESS), gloss);
        mat.add_f32(PropertyKey::scalar(KEY_SHININESS_STRENGTH), surf.specular);
        shading_model = shading::PHONG;
    }

    let specular = Vec3::ONE + (surf.color - Vec3::ONE) * surf.color_highlights;
    mat.add_color(PropertyKey::scalar(KEY_COLOR_SPECULAR), specular);

    // luminosity is not quite emission but affects the surface similarly
    let emissive = surf.luminosity * 0.8;
    mat.add_color(
        PropertyKey::scalar(KEY_COLOR_EMISSIVE),
        vec3(emissive, emissive, emissive),
    );

    if surf.additive_transparency != 0.0 {
        mat.add_f32(PropertyKey::scalar(KEY_OPACITY), surf.additive_transparency);
    } else if let Some(transparency) = surf.transparency {
        mat.add_f32(PropertyKey::scalar(KEY_OPACITY), 1.0 - transparency);
    }

    handle_textures(&mut mat, &surf.color_textures, TextureKind::Diffuse, clips, is_lwo2);
    handle_textures(&mut mat, &surf.diffuse_textures, TextureKind::Diffuse, clips, is_lwo2);
    handle_textures(&mut mat, &surf.specular_textures, TextureKind::Specular, clips, is_lwo2);
    handle_textures(&mut mat, &surf.glossiness_textures, TextureKind::Shininess, clips, is_lwo2);
    handle_textures(&mut mat, &surf.bump_textures, TextureKind::Height, clips, is_lwo2);
    handle_textures(&mut mat, &surf.opacity_textures, TextureKind::Opacity, clips, is_lwo2);
    handle_textures(&mut mat, &surf.reflection_textures, TextureKind::Reflection, clips, is_lwo2);

    for shader in &surf.shaders {
        match shader.function.as_str() {
            "LW_SuperCelShader" | "AH_CelShader" => {
                info!("mapping {} to toon shading", shader.function);
                shading_model = shading::TOON;
                break;
            }
            "LW_RealFresnel" | "LW_FastFresnel" => {
                info!("mapping {} to fresnel shading", shader.function);
                shading_model = shading::FRESNEL;
                break;
            }
            _ => warn!("unknown surface shader: {:?}", shader.function),
        }
    }

    if surf.max_smooth_angle <= 0.0 {
        shading_model = shading::FLAT;
    }
    mat.add_i32(PropertyKey::scalar(KEY_SHADING_MODEL), shading_model);

    if surf.wireframe {
        mat.add_i32(PropertyKey::scalar(KEY_WIREFRAME), 1);
    }

    // the diffuse value is a plain scaling factor on the base color
    mat.add_color(
        PropertyKey::scalar(KEY_COLOR_DIFFUSE),
        surf.color * surf.diffuse,
    );

    mat
}

fn handle_textures(
    mat: &mut Material,
    list: &[Texture],
    kind: TextureKind,
    clips: &[Clip],
    is_lwo2: bool,
) {
    let mut cur = 0;
    for tex in list {
        if !tex.enabled || !tex.usable {
            continue;
        }

        if tex.projection == PROJ_UV {
            let index = match tex.real_uv_index {
                Some(index) => index,
                None => {
                    // no UV data for this texture, nothing to sample with
                    error!("UV-mapped texture references a missing vertex map");
                    continue;
                }
            };
            mat.add_i32(PropertyKey::texture(TextureStack::UvwSrc, kind, cur), index as i32);
        } else {
            let axis = match tex.axis {
                0 => vec3(1.0, 0.0, 0.0),
                1 => vec3(0.0, 1.0, 0.0),
                _ => vec3(0.0, 0.0, 1.0),
            };
            mat.add(
                PropertyKey::texture(TextureStack::Axis, kind, cur),
                PropertyValue::Floats(vec![axis.x, axis.y, axis.z]),
            );

            if matches!(tex.projection, PROJ_CYLINDRICAL | PROJ_SPHERICAL | PROJ_CUBIC) {
                debug!("setting up non-UV projection");
            } else if matches!(tex.projection, PROJ_FRONT) {
                error!("unsupported texture projection: front projection");
            } else if tex.projection != PROJ_PLANAR {
                warn!("unknown texture projection {}", tex.projection);
            }
        }

        let file = if is_lwo2 {
            match tex.clip.and_then(|idx| clips.iter().find(|clip| clip.index == idx as u32)) {
                Some(clip) if clip.supported => {
                    if clip.negate {
                        mat.add_i32(
                            PropertyKey::texture(TextureStack::Flags, kind, cur),
                            FLAG_INVERT,
                        );
                    }

                    clip.path.clone()
                }
                Some(_) => {
                    error!("clip type is not supported");
                    continue;
                }
                None => {
                    // some files in the wild carry no clips at all
                    error!("clip index is out of bounds");
                    "$texture.png".to_owned()
                }
            }
        } else {
            if tex.file.is_empty() {
                error!("empty texture file name");
                continue;
            }

            tex.file.clone()
        };
        mat.add_str(PropertyKey::texture(TextureStack::File, kind, cur), file);

        mat.add_f32(PropertyKey::texture(TextureStack::Blend, kind, cur), tex.strength);

        let op = match tex.blend_type {
            BLEND_NORMAL | BLEND_MULTIPLY => OP_MULTIPLY,
            BLEND_SUBTRACTIVE | BLEND_DIFFERENCE => OP_SUBTRACT,
            BLEND_DIVIDE => OP_DIVIDE,
            BLEND_ADDITIVE => OP_ADD,
            _ => {
                warn!("unsupported texture blend mode: alpha or displacement");
                OP_MULTIPLY
            }
        };
        mat.add_i32(PropertyKey::texture(TextureStack::Op, kind, cur), op);

        mat.add_i32(
            PropertyKey::texture(TextureStack::MapModeU, kind, cur),
            map_mode(tex.wrap_w),
        );
        mat.add_i32(
            PropertyKey::texture(TextureStack::MapModeV, kind, cur),
            map_mode(tex.wrap_h),
        );

        cur += 1;
    }
}

fn map_mode(wrap: u16) -> i32 {
    match wrap {
        WRAP_REPEAT => MODE_WRAP,
        WRAP_MIRROR => MODE_MIRROR,
        WRAP_RESET => {
            warn!("unsupported texture map mode: reset");
            MODE_CLAMP
        }
        _ => MODE_CLAMP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture_with_ordinal(ordinal: &str) -> Texture {
        Texture {
            ordinal: ordinal.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    pub fn textures_stack_by_ordinal() {
        let mut list = vec![];
        insert_by_ordinal(&mut list, texture_with_ordinal("\u{90}"));
        insert_by_ordinal(&mut list, texture_with_ordinal("\u{80}"));
        insert_by_ordinal(&mut list, texture_with_ordinal("\u{88}"));

        let order: Vec<&str> = list.iter().map(|tex| tex.ordinal.as_str()).collect();
        assert_eq!(order, vec!["\u{80}", "\u{88}", "\u{90}"]);
    }

    #[test]
    pub fn sequence_paths_use_the_first_frame() {
        assert_eq!(
            adjust_texture_path("walls(sequence)".to_owned()),
            "walls000"
        );
        assert_eq!(adjust_texture_path("plain.png".to_owned()), "plain.png");
    }

    #[test]
    pub fn legacy_glossiness_is_bucketed() {
        let mut surf = Surface::default();
        surf.name = "test".to_owned();
        surf.specular = 0.5;
        surf.max_smooth_angle = 90.0;

        for (gloss, expected) in [(10.0, 6.0), (40.0, 20.0), (200.0, 50.0), (900.0, 80.0)] {
            surf.glossiness = gloss;
            let mat = convert_surface(&surf, &[], false);
            assert_eq!(
                mat.get::<f32>(&PropertyKey::scalar(KEY_SHININESS)),
                Some(expected)
            );
        }

        // LWO2 computes the exponent instead
        surf.glossiness = 0.4;
        let mat = convert_surface(&surf, &[], true);
        let gloss = mat
            .get::<f32>(&PropertyKey::scalar(KEY_SHININESS))
            .unwrap();
        assert!((gloss - 36.0).abs() < 1e-3);
    }

    #[test]
    pub fn flat_shading_below_zero_smoothing_angle() {
        let mut surf = Surface::default();
        surf.name = "flat".to_owned();

        let mat = convert_surface(&surf, &[], true);
        assert_eq!(
            mat.get::<i32>(&PropertyKey::scalar(KEY_SHADING_MODEL)),
            Some(shading::FLAT)
        );
    }

    #[test]
    pub fn disabled_and_unusable_textures_are_dropped() {
        let mut surf = Surface::default();
        surf.name = "tex".to_owned();
        surf.max_smooth_angle = 45.0;

        let mut enabled = texture_with_ordinal("\u{80}");
        enabled.file = "a.png".to_owned();
        let mut disabled = texture_with_ordinal("\u{81}");
        disabled.file = "b.png".to_owned();
        disabled.enabled = false;
        let mut procedural = texture_with_ordinal("\u{82}");
        procedural.file = "c.png".to_owned();
        procedural.usable = false;
        surf.color_textures = vec![enabled, disabled, procedural];

        let mat = convert_surface(&surf, &[], false);
        assert_eq!(mat.texture_count(crate::scene::TextureKind::Diffuse), 1);
    }

    #[test]
    pub fn map_mode_codes() {
        assert_eq!(map_mode(WRAP_REPEAT), MODE_WRAP);
        assert_eq!(map_mode(WRAP_MIRROR), MODE_MIRROR);
        assert_eq!(map_mode(WRAP_EDGE), MODE_CLAMP);
        assert_eq!(map_mode(WRAP_RESET), MODE_CLAMP);
    }
}
