//! The import façade: open, decode, post-process, validate, hand over.

use {
    crate::{
        config::Config,
        imp::{registry, Decoder, RawAsset},
        post::{self, PostProcessFlags},
        scene::Scene,
        Error, ErrorKind,
    },
    std::{fs::File, io::Read, path::Path},
};

/// Loads model files into [`Scene`] values.
///
/// An importer owns its configuration and decoder set; separate instances
/// are fully independent and hold no shared state, so every thread can have
/// its own. The returned scene is owned by the caller.
pub struct Importer {
    config: Config,
    decoders: Vec<Box<dyn Decoder>>,
    post_process: PostProcessFlags,
}

impl Default for Importer {
    fn default() -> Self {
        Self::new()
    }
}

impl Importer {
    pub fn new() -> Self {
        Self::with_config(Config::new())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            decoders: registry(),
            post_process: PostProcessFlags::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Replaces the post-processing step selection.
    pub fn set_post_process(&mut self, flags: PostProcessFlags) {
        self.post_process = flags;
    }

    /// Registers an additional decoder, tried after the built-in ones.
    pub fn add_decoder(&mut self, decoder: Box<dyn Decoder>) {
        self.decoders.push(decoder);
    }

    /// Reads the whole file into memory and decodes it; the decoder is
    /// picked by the file extension, case-insensitive.
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<Scene, Error> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut bytes = vec![];
        file.read_to_end(&mut bytes)?;

        self.import(RawAsset::from_path(&bytes, path))
    }

    /// Decodes an in-memory buffer; `hint` is the extension that would have
    /// carried the data on disk (`"3ds"`, `"lwo"`, …).
    pub fn read_from_memory(&self, bytes: &[u8], hint: &str) -> Result<Scene, Error> {
        self.import(RawAsset::new(bytes, hint))
    }

    fn import(&self, asset: RawAsset<'_>) -> Result<Scene, Error> {
        if asset.bytes.is_empty() {
            return Err(Error::new(ErrorKind::FileTooSmall, "the file is empty"));
        }

        let decoder = self
            .decoders
            .iter()
            .find(|decoder| decoder.can_read(&asset.extension))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::UnknownExtension,
                    format!("no decoder accepts the extension {:?}", asset.extension),
                )
            })?;

        debug!("importing with the {} decoder", decoder.name());
        let mut scene = decoder.read(&asset, &self.config)?;
        post::run(&mut scene, &self.config, self.post_process)?;

        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            iff::fourcc,
            math::{vec3, Vec3},
            post::ComponentFlags,
            scene::{
                material::{PropertyKey, TextureStack, KEY_COLOR_DIFFUSE},
                SceneFlags, TextureKind,
            },
        },
    };

    // ~~~ 3DS fixture helpers ~~~

    fn tds_chunk(tag: u16, payload: &[u8]) -> Vec<u8> {
        let mut res = tag.to_le_bytes().to_vec();
        res.extend_from_slice(&(payload.len() as u32 + 6).to_le_bytes());
        res.extend_from_slice(payload);
        res
    }

    fn cstr(text: &str) -> Vec<u8> {
        let mut res = text.as_bytes().to_vec();
        res.push(0);
        res
    }

    /// One OBJBLOCK "Cube" with 8 vertices, 12 triangles and one red
    /// material the FACEMAT chunk points every face at.
    fn cube_3ds(material_name: &str, facemat_name: &str) -> Vec<u8> {
        cube_3ds_scaled(material_name, facemat_name, 1.0)
    }

    fn cube_3ds_scaled(material_name: &str, facemat_name: &str, master_scale: f32) -> Vec<u8> {
        let mut verts = 8u16.to_le_bytes().to_vec();
        for z in [0.0f32, 1.0] {
            for y in [0.0f32, 1.0] {
                for x in [0.0f32, 1.0] {
                    for val in [x, y, z] {
                        verts.extend_from_slice(&val.to_le_bytes());
                    }
                }
            }
        }

        const TRIS: [[u16; 3]; 12] = [
            [0, 2, 1],
            [1, 2, 3],
            [4, 5, 6],
            [5, 7, 6],
            [0, 1, 4],
            [1, 5, 4],
            [2, 6, 3],
            [3, 6, 7],
            [0, 4, 2],
            [2, 4, 6],
            [1, 3, 5],
            [3, 7, 5],
        ];
        let mut faces = 12u16.to_le_bytes().to_vec();
        for tri in TRIS {
            for index in tri {
                faces.extend_from_slice(&index.to_le_bytes());
            }
            faces.extend_from_slice(&0u16.to_le_bytes());
        }

        // FACEMAT: material name, face count, face indices
        let mut facemat = cstr(facemat_name);
        facemat.extend_from_slice(&12u16.to_le_bytes());
        for face in 0u16..12 {
            facemat.extend_from_slice(&face.to_le_bytes());
        }
        faces.extend(tds_chunk(0x4130, &facemat));

        let facelist = tds_chunk(0x4120, &faces);
        let vertlist = tds_chunk(0x4110, &verts);

        let mut trimesh_payload = vertlist;
        trimesh_payload.extend(facelist);
        let trimesh = tds_chunk(0x4100, &trimesh_payload);

        let mut objblock_payload = cstr("Cube");
        objblock_payload.extend(trimesh);
        let objblock = tds_chunk(0x4000, &objblock_payload);

        // red diffuse material
        let mut diffuse = [0u8; 12];
        diffuse[0..4].copy_from_slice(&1.0f32.to_le_bytes());
        let color = tds_chunk(0x0010, &diffuse);
        let mut material_payload = tds_chunk(0xA000, &cstr(material_name));
        material_payload.extend(tds_chunk(0xA020, &color));
        let material = tds_chunk(0xAFFF, &material_payload);

        let master_scale = tds_chunk(0x0100, &master_scale.to_le_bytes());

        let mut editor_payload = material;
        editor_payload.extend(master_scale);
        editor_payload.extend(objblock);
        let editor = tds_chunk(0x3D3D, &editor_payload);

        tds_chunk(0x4D4D, &editor)
    }

    #[test]
    pub fn minimal_3ds_cube() {
        let buf = cube_3ds("Mat0", "Mat0");
        let scene = Importer::new().read_from_memory(&buf, "3ds").unwrap();

        assert_eq!(scene.materials.len(), 1);
        let diffuse = scene.materials[0]
            .get::<Vec3>(&PropertyKey::scalar(KEY_COLOR_DIFFUSE))
            .unwrap();
        assert!((diffuse - vec3(1.0, 0.0, 0.0)).length() < 1e-5);

        assert_eq!(scene.meshes.len(), 1);
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.vertex_count(), 36);
        assert_eq!(mesh.faces.len(), 12);
        assert!(mesh.is_verbose());

        // z components are negated versus the file
        assert!(mesh.positions.iter().all(|pos| pos.z <= 0.0));
        assert!(mesh.positions.iter().any(|pos| pos.z == -1.0));

        // no keyframer data: a flat node tree
        assert_eq!(scene.root.children.len(), 1);
        assert_eq!(scene.root.children[0].meshes, vec![0]);

        // normals were generated by the pipeline
        assert_eq!(mesh.normals.as_ref().unwrap().len(), 36);

        assert!(scene.flags.contains(SceneFlags::VALIDATED));
    }

    #[test]
    pub fn unknown_material_reference_gets_the_default() {
        let buf = cube_3ds("Mat0", "Nonexistent");
        let scene = Importer::new().read_from_memory(&buf, "3ds").unwrap();

        // the default material was appended and every face reassigned
        assert_eq!(scene.materials.len(), 2);
        assert_eq!(scene.materials[1].name().as_deref(), Some("%%%DEFAULT"));
        assert_eq!(
            scene.materials[1].get::<Vec3>(&PropertyKey::scalar(KEY_COLOR_DIFFUSE)),
            Some(vec3(0.3, 0.3, 0.3))
        );

        let cube_mesh = scene
            .meshes
            .iter()
            .find(|mesh| !mesh.faces.is_empty())
            .unwrap();
        assert_eq!(cube_mesh.material, 1);
    }

    #[test]
    pub fn short_3ds_is_too_small() {
        let err = Importer::new()
            .read_from_memory(&[0u8; 15], "3ds")
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::FileTooSmall));
    }

    #[test]
    pub fn sixteen_byte_3ds_does_not_crash() {
        // a bare MAIN chunk with ten junk payload bytes: decodes to nothing,
        // reported as an error rather than a crash
        let mut buf = tds_chunk(0x4D4D, &[0u8; 4]);
        buf.extend_from_slice(&[0u8; 6]);
        buf.truncate(16);

        assert!(Importer::new().read_from_memory(&buf, "3ds").is_err());
    }

    #[test]
    pub fn master_scale_zero_is_coerced() {
        let buf = cube_3ds_scaled("Mat0", "Mat0", 0.0);

        let scene = Importer::new().read_from_memory(&buf, "3ds").unwrap();
        assert_eq!(scene.meshes.len(), 1);
        assert!(scene.flags.contains(SceneFlags::VALIDATED));
    }

    // ~~~ LWO fixture helpers ~~~

    fn lwo_chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut res = fourcc(tag).to_be_bytes().to_vec();
        res.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        res.extend_from_slice(payload);
        res
    }

    fn lwo_subchunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut res = fourcc(tag).to_be_bytes().to_vec();
        res.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        res.extend_from_slice(payload);
        res
    }

    fn padded(text: &str) -> Vec<u8> {
        let mut res = text.as_bytes().to_vec();
        res.push(0);
        if res.len() % 2 == 1 {
            res.push(0);
        }
        res
    }

    fn lwo2_with_surf(surf_payload: &[u8]) -> Vec<u8> {
        let mut layr = vec![];
        layr.extend_from_slice(&0u16.to_be_bytes());
        layr.extend_from_slice(&[0u8; 14]);
        layr.extend(padded("Layer_1"));

        let mut pnts = vec![];
        for vert in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for val in vert {
                pnts.extend_from_slice(&val.to_be_bytes());
            }
        }

        // one POLS.FACE triangle, two-byte vertex indices
        let mut pols = fourcc(b"FACE").to_be_bytes().to_vec();
        pols.extend_from_slice(&3u16.to_be_bytes());
        for index in [0u16, 1, 2] {
            pols.extend_from_slice(&index.to_be_bytes());
        }

        // VMAP TXUV "uv": per-point UVs
        let mut vmap = fourcc(b"TXUV").to_be_bytes().to_vec();
        vmap.extend_from_slice(&2u16.to_be_bytes());
        vmap.extend(padded("uv"));
        for (index, uv) in [(0u16, [0.0f32, 0.0]), (1, [1.0, 0.0]), (2, [0.0, 1.0])] {
            vmap.extend_from_slice(&index.to_be_bytes());
            for val in uv {
                vmap.extend_from_slice(&val.to_be_bytes());
            }
        }

        let tags = padded("Surf1");

        // PTAG SURF: face 0 uses tag 0
        let mut ptag = fourcc(b"SURF").to_be_bytes().to_vec();
        ptag.extend_from_slice(&0u16.to_be_bytes());
        ptag.extend_from_slice(&0u16.to_be_bytes());

        // CLIP 1: a still image
        let mut clip = 1u32.to_be_bytes().to_vec();
        clip.extend(lwo_subchunk(b"STIL", &padded("tex.png")));

        let mut body = lwo_chunk(b"LAYR", &layr);
        body.extend(lwo_chunk(b"PNTS", &pnts));
        body.extend(lwo_chunk(b"POLS", &pols));
        body.extend(lwo_chunk(b"VMAP", &vmap));
        body.extend(lwo_chunk(b"TAGS", &tags));
        body.extend(lwo_chunk(b"PTAG", &ptag));
        body.extend(lwo_chunk(b"CLIP", &clip));
        body.extend(lwo_chunk(b"SURF", surf_payload));

        let mut form_payload = fourcc(b"LWO2").to_be_bytes().to_vec();
        form_payload.extend_from_slice(&body);

        let mut res = fourcc(b"FORM").to_be_bytes().to_vec();
        res.extend_from_slice(&(form_payload.len() as u32).to_be_bytes());
        res.extend_from_slice(&form_payload);
        res
    }

    fn uv_textured_surf() -> Vec<u8> {
        // BLOK: an IMAP header naming channel COLR, then projection UV,
        // the vertex map name and the clip reference
        let mut imap_header = padded("\u{80}");
        imap_header.extend(lwo_subchunk(b"CHAN", &fourcc(b"COLR").to_be_bytes()));
        imap_header.extend(lwo_subchunk(b"ENAB", &1u16.to_be_bytes()));

        let mut blok = lwo_subchunk(b"IMAP", &imap_header);
        blok.extend(lwo_subchunk(b"PROJ", &5u16.to_be_bytes()));
        blok.extend(lwo_subchunk(b"VMAP", &padded("uv")));
        blok.extend(lwo_subchunk(b"IMAG", &1u16.to_be_bytes()));

        let mut surf = padded("Surf1");
        surf.extend(padded(""));
        let mut colr = vec![];
        for val in [0.8f32, 0.8, 0.8] {
            colr.extend_from_slice(&val.to_be_bytes());
        }
        surf.extend(lwo_subchunk(b"COLR", &colr));
        surf.extend(lwo_subchunk(b"SMAN", &0.5f32.to_be_bytes()));
        surf.extend(lwo_subchunk(b"BLOK", &blok));
        surf
    }

    #[test]
    pub fn lwo2_uv_mapped_texture() {
        let buf = lwo2_with_surf(&uv_textured_surf());
        let scene = Importer::new().read_from_memory(&buf, "lwo").unwrap();

        assert_eq!(scene.meshes.len(), 1);
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.faces.len(), 1);

        let uv = &mesh.texcoords[0].as_ref().unwrap().data;
        assert_eq!(uv[0], vec3(0.0, 0.0, 0.0));
        assert_eq!(uv[1], vec3(1.0, 0.0, 0.0));
        assert_eq!(uv[2], vec3(0.0, 1.0, 0.0));

        let material = &scene.materials[mesh.material as usize];
        assert_eq!(
            material.get::<String>(&PropertyKey::texture(
                TextureStack::File,
                TextureKind::Diffuse,
                0
            )),
            Some("tex.png".to_owned())
        );
        assert_eq!(
            material.get::<i32>(&PropertyKey::texture(
                TextureStack::UvwSrc,
                TextureKind::Diffuse,
                0
            )),
            Some(0)
        );

        // a single layer becomes the scene root directly
        assert_eq!(scene.root.name, "Layer_1");
    }

    #[test]
    pub fn lwo2_chunk_overflow_is_clamped() {
        // a SURF sub-chunk declaring 8 bytes more than the container holds
        let mut surf = padded("Surf1");
        surf.extend(padded(""));
        let mut colr = fourcc(b"COLR").to_be_bytes().to_vec();
        colr.extend_from_slice(&20u16.to_be_bytes());
        for val in [0.8f32, 0.8, 0.8] {
            colr.extend_from_slice(&val.to_be_bytes());
        }
        surf.extend(colr);

        let buf = lwo2_with_surf(&surf);
        let scene = Importer::new().read_from_memory(&buf, "lwo").unwrap();

        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].faces.len(), 1);
    }

    #[test]
    pub fn lwo_face_with_unresolved_tag_gets_grey_surface() {
        // tag list names a surface that does not exist
        let mut surf = padded("SomethingElse");
        surf.extend(padded(""));

        let buf = lwo2_with_surf(&surf);
        let scene = Importer::new().read_from_memory(&buf, "lwo").unwrap();

        // the grey default surface was appended and the face uses it
        let mesh = &scene.meshes[0];
        let material = &scene.materials[mesh.material as usize];
        let diffuse = material
            .get::<Vec3>(&PropertyKey::scalar(KEY_COLOR_DIFFUSE))
            .unwrap();
        assert!((diffuse - vec3(0.6, 0.6, 0.6)).length() < 1e-5);
    }

    #[test]
    pub fn lwob_legacy_format() {
        // LWOB: PNTS, POLS with one-based surface numbers, SRFS, SURF
        let mut pnts = vec![];
        for vert in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for val in vert {
                pnts.extend_from_slice(&val.to_be_bytes());
            }
        }

        let mut pols = vec![];
        pols.extend_from_slice(&3u16.to_be_bytes());
        for index in [0u16, 1, 2] {
            pols.extend_from_slice(&index.to_be_bytes());
        }
        pols.extend_from_slice(&1i16.to_be_bytes());

        let srfs = padded("Default");

        let mut surf = padded("Default");
        let mut colr = lwo_subchunk(b"COLR", &[255, 128, 0, 0]);
        surf.append(&mut colr);

        let mut body = lwo_chunk(b"PNTS", &pnts);
        body.extend(lwo_chunk(b"POLS", &pols));
        body.extend(lwo_chunk(b"SRFS", &srfs));
        body.extend(lwo_chunk(b"SURF", &surf));

        let mut form_payload = fourcc(b"LWOB").to_be_bytes().to_vec();
        form_payload.extend_from_slice(&body);
        let mut buf = fourcc(b"FORM").to_be_bytes().to_vec();
        buf.extend_from_slice(&(form_payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&form_payload);

        let scene = Importer::new().read_from_memory(&buf, "lwo").unwrap();
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.meshes[0].faces.len(), 1);

        let diffuse = scene.materials[scene.meshes[0].material as usize]
            .get::<Vec3>(&PropertyKey::scalar(KEY_COLOR_DIFFUSE))
            .unwrap();
        assert!((diffuse.x - 1.0).abs() < 1e-5);
        assert!((diffuse.y - 128.0 / 255.0).abs() < 1e-5);
    }

    #[test]
    pub fn smd_end_to_end() {
        let text = "version 1\nnodes\n0 \"root\" -1\nend\nskeleton\ntime 0\n0 0 0 0 0 0 0\nend\ntriangles\nskin.bmp\n0 0 0 0 0 0 1 0 0\n0 1 0 0 0 0 1 1 0\n0 0 1 0 0 0 1 0 1\nend\n";
        let scene = Importer::new()
            .read_from_memory(text.as_bytes(), "smd")
            .unwrap();

        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.materials.len(), 1);
        assert_eq!(scene.animations.len(), 1);
        assert_eq!(scene.animations[0].channels[0].name, "root");
        assert_eq!(scene.animations[0].channels[0].position_keys.len(), 1);
        assert_eq!(
            scene.materials[0].get::<String>(&PropertyKey::texture(
                TextureStack::File,
                TextureKind::Diffuse,
                0
            )),
            Some("skin.bmp".to_owned())
        );
        assert!(scene.flags.contains(SceneFlags::VALIDATED));
    }

    #[test]
    pub fn md5_anim_only_end_to_end() {
        let text = "MD5Version 10\ncommandline \"\"\n\nnumFrames 1\nnumJoints 1\nframeRate 24\n\nhierarchy {\n\t\"root\" -1 63 0\n}\n\nbaseframe {\n\t( 0 0 0 ) ( 0 0 0 )\n}\n\nframe 0 {\n\t0 0 0 0 0 0\n}\n";
        let scene = Importer::new()
            .read_from_memory(text.as_bytes(), "md5anim")
            .unwrap();

        assert!(scene.flags.contains(SceneFlags::ANIM_SKELETON_ONLY));
        assert_eq!(scene.animations.len(), 1);
        assert!(scene.meshes.is_empty());
    }

    #[test]
    pub fn component_removal_runs_in_the_pipeline() {
        let buf = cube_3ds("Mat0", "Mat0");
        let mut importer = Importer::new();
        importer
            .config_mut()
            .set("pp.rvc.flags", ComponentFlags::NORMALS.bits() as i64);

        let scene = importer.read_from_memory(&buf, "3ds").unwrap();

        // the pipeline generated normals and then removed them again
        assert!(scene.meshes[0].normals.is_none());
    }

    #[test]
    pub fn unknown_extension_is_reported() {
        let err = Importer::new()
            .read_from_memory(&[1, 2, 3], "docx")
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownExtension));
    }

    #[test]
    pub fn empty_buffer_is_too_small() {
        let err = Importer::new().read_from_memory(&[], "3ds").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::FileTooSmall));
    }
}
