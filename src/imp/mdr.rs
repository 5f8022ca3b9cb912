//! Decoder for Raven `.mdr` (and `.md4`) models.
//!
//! The decoder validates the header, every LOD and every surface so that
//! corrupt files are reported, but produces no geometry: the skeletal
//! compression of this format has no consumers here, so the result is an
//! empty scene flagged as incomplete.

use {
    crate::{
        config::Config,
        imp::{Decoder, RawAsset},
        scene::{Node, Scene, SceneFlags},
        ByteReader, Error, ErrorKind,
    },
};

const HEADER_SIZE: usize = 100;
const MAGIC_LE: u32 = u32::from_le_bytes(*b"5MDR");
const MAGIC_BE: u32 = u32::from_be_bytes(*b"5MDR");
const VERSION: u32 = 2;

const LOD_SIZE: usize = 12;
const SURFACE_HEADER_SIZE: usize = 180;
const TRIANGLE_SIZE: usize = 12;
const VERTEX_SIZE: usize = 32;

pub struct MdrDecoder;

impl Decoder for MdrDecoder {
    fn name(&self) -> &'static str {
        "MDR"
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "mdr" || extension == "md4"
    }

    fn read(&self, asset: &RawAsset<'_>, config: &Config) -> Result<Scene, Error> {
        read_mdr(asset.bytes, config).map_err(|err| err.with_format("MDR"))
    }
}

fn read_mdr(bytes: &[u8], config: &Config) -> Result<Scene, Error> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::new(
            ErrorKind::FileTooSmall,
            "the file is too small to contain the header",
        ));
    }

    let mut reader = ByteReader::new(bytes);
    let ident = reader.read_u32()?;
    if ident != MAGIC_LE && ident != MAGIC_BE {
        let found = ident.to_le_bytes();
        return Err(Error::new(
            ErrorKind::InvalidMagic,
            format!(
                "invalid magic word: should be 5MDR, found {}",
                String::from_utf8_lossy(&found)
            ),
        ));
    }

    let version = reader.read_u32()?;
    if version != VERSION {
        warn!("unsupported file version {} (2 was expected)", version);
    }

    reader.skip(64)?; // model name

    let num_frames = reader.read_i32()?.max(0) as u32;
    let num_bones = reader.read_i32()?.max(0) as u32;
    let ofs_frames = reader.read_i32()?.max(0) as usize;
    let num_lods = reader.read_i32()?.max(0) as u32;
    let ofs_lods = reader.read_i32()?.max(0) as usize;
    let _num_tags = reader.read_i32()?;
    let _ofs_tags = reader.read_i32()?;
    let _ofs_end = reader.read_i32()?;

    if num_bones == 0 {
        warn!("at least one bone must be there");
    }

    if ofs_frames > bytes.len() {
        return Err(Error::new(
            ErrorKind::UnexpectedEof,
            "header is invalid, frames are out of range",
        ));
    }

    // walk every LOD; each validates its surfaces in turn
    let mut cursor = ofs_lods;
    for _ in 0..num_lods {
        if cursor + LOD_SIZE > bytes.len() {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "header is invalid, LOD is out of range",
            ));
        }

        let mut lod = ByteReader::new(bytes);
        lod.seek(cursor)?;
        let num_surfaces = lod.read_u32()?;
        let ofs_surfaces = lod.read_u32()? as usize;
        let ofs_end = lod.read_u32()? as usize;

        let mut surface = cursor + ofs_surfaces;
        for _ in 0..num_surfaces {
            surface = validate_surface(bytes, surface)?;
        }

        if ofs_end == 0 {
            break;
        }

        cursor += ofs_end;
    }

    if config.global_keyframe() >= num_frames && num_frames > 0 {
        return Err(Error::new(
            ErrorKind::InvalidGeometry,
            "the requested frame is not available",
        ));
    }

    // the header checked out; no mesh data is produced for this format
    let mut scene = Scene::new();
    scene.root = Node::new("<MDR>");
    scene.flags |= SceneFlags::INCOMPLETE;

    Ok(scene)
}

fn validate_surface(bytes: &[u8], offset: usize) -> Result<usize, Error> {
    if offset + SURFACE_HEADER_SIZE > bytes.len() {
        return Err(Error::new(
            ErrorKind::UnexpectedEof,
            "LOD header is invalid, surface is out of range",
        ));
    }

    let mut reader = ByteReader::new(bytes);
    reader.seek(offset)?;
    let _ident = reader.read_u32()?;
    reader.skip(64)?; // surface name
    reader.skip(64)?; // shader name
    let _shader_index = reader.read_u32()?;
    let _ofs_header = reader.read_i32()?;
    let num_verts = reader.read_u32()? as usize;
    let ofs_verts = reader.read_u32()? as usize;
    let num_triangles = reader.read_u32()? as usize;
    let ofs_triangles = reader.read_u32()? as usize;
    let _num_bone_refs = reader.read_u32()?;
    let _ofs_bone_refs = reader.read_u32()?;
    let ofs_end = reader.read_u32()? as usize;

    let max = bytes.len() - offset;

    // not exact, the vertices may carry extra weights
    if ofs_triangles + num_triangles * TRIANGLE_SIZE > max
        || ofs_verts + num_verts * VERTEX_SIZE > max
    {
        return Err(Error::new(
            ErrorKind::UnexpectedEof,
            "surface header is invalid",
        ));
    }

    Ok(offset + ofs_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: &[u8; 4], version: u32, frames: u32) -> Vec<u8> {
        let mut buf = vec![];
        buf.extend_from_slice(magic);
        buf.extend_from_slice(&version.to_le_bytes());
        buf.extend_from_slice(&[0u8; 64]);
        for val in [frames as i32, 1, HEADER_SIZE as i32, 0, HEADER_SIZE as i32, 0, 0, 0] {
            buf.extend_from_slice(&val.to_le_bytes());
        }

        buf
    }

    #[test]
    pub fn valid_header_yields_incomplete_scene() {
        let buf = header(b"5MDR", VERSION, 1);
        let scene = read_mdr(&buf, &Config::new()).unwrap();

        assert!(scene.flags.contains(SceneFlags::INCOMPLETE));
        assert!(scene.meshes.is_empty());
    }

    #[test]
    pub fn bad_magic_is_rejected() {
        let buf = header(b"XXXX", VERSION, 1);
        assert!(matches!(
            read_mdr(&buf, &Config::new()).unwrap_err().kind(),
            ErrorKind::InvalidMagic
        ));
    }

    #[test]
    pub fn missing_frame_is_rejected() {
        let buf = header(b"5MDR", VERSION, 1);
        let mut config = Config::new();
        config.set("imp.global.kf", 4i64);

        assert!(read_mdr(&buf, &config).is_err());
    }
}
