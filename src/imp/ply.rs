//! Decoder for Stanford `.ply` files.
//!
//! The header declares elements and their properties; the body follows in
//! ascii or either-endian binary. Vertex position, normal, color and UV
//! properties are recognized by name; faces come from an index-list
//! property and are fanned into triangles in the verbose layout.

use {
    crate::{
        config::Config,
        imp::{Decoder, RawAsset},
        math::{vec3, vec4},
        scene::{
            material::{shading, PropertyKey, KEY_COLOR_DIFFUSE, KEY_NAME, KEY_SHADING_MODEL},
            Face, Material, Mesh, Node, Scene, TexCoordChannel,
        },
        ByteReader, Error, ErrorKind,
    },
};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Format {
    Ascii,
    BinaryBig,
    BinaryLittle,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Scalar {
    F32,
    F64,
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
}

impl Scalar {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            _ => return None,
        })
    }

    fn read(self, reader: &mut ByteReader<'_>, big_endian: bool) -> Result<f64, Error> {
        Ok(match self {
            Self::I8 => reader.read_u8()? as i8 as f64,
            Self::U8 => reader.read_u8()? as f64,
            Self::I16 if big_endian => reader.read_i16_be()? as f64,
            Self::I16 => reader.read_i16()? as f64,
            Self::U16 if big_endian => reader.read_u16_be()? as f64,
            Self::U16 => reader.read_u16()? as f64,
            Self::I32 if big_endian => reader.read_u32_be()? as i32 as f64,
            Self::I32 => reader.read_i32()? as f64,
            Self::U32 if big_endian => reader.read_u32_be()? as f64,
            Self::U32 => reader.read_u32()? as f64,
            Self::F32 if big_endian => reader.read_f32_be()? as f64,
            Self::F32 => reader.read_f32()? as f64,
            Self::F64 if big_endian => f64::from_bits(
                (reader.read_u32_be()? as u64) << 32 | reader.read_u32_be()? as u64,
            ),
            Self::F64 => reader.read_f64()?,
        })
    }

    /// Colors stored in integer types are normalized to [0, 1].
    fn normalize(self, val: f64) -> f32 {
        match self {
            Self::U8 => (val / 255.0) as f32,
            Self::U16 => (val / 65535.0) as f32,
            _ => val as f32,
        }
    }
}

struct Property {
    list: Option<Scalar>,
    name: String,
    scalar: Scalar,
}

struct Element {
    count: usize,
    name: String,
    properties: Vec<Property>,
}

pub struct PlyDecoder;

impl Decoder for PlyDecoder {
    fn name(&self) -> &'static str {
        "PLY"
    }

    fn can_read(&self, extension: &str) -> bool {
        extension == "ply"
    }

    fn read(&self, asset: &RawAsset<'_>, _config: &Config) -> Result<Scene, Error> {
        decode(asset.bytes).map_err(|err| err.with_format("PLY"))
    }
}

fn decode(bytes: &[u8]) -> Result<Scene, Error> {
    if bytes.len() < 10 {
        return Err(Error::new(ErrorKind::FileTooSmall, "missing ply header"));
    }

    if &bytes[0..3] != b"ply" {
        return Err(Error::new(ErrorKind::InvalidMagic, "magic bytes ply not found"));
    }

    // the header is always text, terminated by end_header
    let header_end = find_header_end(bytes).ok_or_else(|| {
        Error::new(ErrorKind::UnexpectedEof, "end_header was not found")
    })?;
    let header = String::from_utf8_lossy(&bytes[..header_end.0]);

    let mut format = None;
    let mut elements: Vec<Element> = vec![];
    for line in header.lines().skip(1) {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("format") => {
                format = Some(match tokens.next() {
                    Some("ascii") => Format::Ascii,
                    Some("binary_little_endian") => Format::BinaryLittle,
                    Some("binary_big_endian") => Format::BinaryBig,
                    other => {
                        return Err(Error::new(
                            ErrorKind::UnsupportedVersion,
                            format!("unknown format {:?}", other.unwrap_or("")),
                        ))
                    }
                });
            }
            Some("element") => {
                let name = tokens.next().unwrap_or("").to_owned();
                let count = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);
                elements.push(Element {
                    count,
                    name,
                    properties: vec![],
                });
            }
            Some("property") => {
                let element = match elements.last_mut() {
                    Some(element) => element,
                    None => {
                        warn!("property declared before any element");
                        continue;
                    }
                };

                let first = tokens.next().unwrap_or("");
                if first == "list" {
                    let count_type = Scalar::parse(tokens.next().unwrap_or(""));
                    let value_type = Scalar::parse(tokens.next().unwrap_or(""));
                    let name = tokens.next().unwrap_or("").to_owned();
                    if let (Some(count_type), Some(value_type)) = (count_type, value_type) {
                        element.properties.push(Property {
                            list: Some(count_type),
                            name,
                            scalar: value_type,
                        });
                    }
                } else if let Some(scalar) = Scalar::parse(first) {
                    let name = tokens.next().unwrap_or("").to_owned();
                    element.properties.push(Property {
                        list: None,
                        name,
                        scalar,
                    });
                }
            }
            Some("comment") | Some("obj_info") => (),
            _ => (),
        }
    }

    let format = format.ok_or_else(|| {
        Error::new(ErrorKind::UnsupportedVersion, "the header names no format")
    })?;

    // parse the element bodies into generic rows
    let mut rows: Vec<Vec<Vec<(f64, Scalar)>>> = vec![];
    match format {
        Format::Ascii => {
            let body = String::from_utf8_lossy(&bytes[header_end.1..]);
            let mut tokens = body.split_whitespace();
            for element in &elements {
                let mut element_rows = vec![];
                for _ in 0..element.count {
                    let mut row = vec![];
                    for property in &element.properties {
                        let count = if property.list.is_some() {
                            tokens
                                .next()
                                .and_then(|t| t.parse::<usize>().ok())
                                .unwrap_or(0)
                        } else {
                            1
                        };
                        for _ in 0..count {
                            let val: f64 =
                                tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0.0);
                            row.push((val, property.scalar));
                        }
                    }
                    element_rows.push(row);
                }
                rows.push(element_rows);
            }
        }
        Format::BinaryLittle | Format::BinaryBig => {
            let big = format == Format::BinaryBig;
            let mut reader = ByteReader::new(bytes);
            reader.seek(header_end.1)?;
            for element in &elements {
                let mut element_rows = vec![];
                for _ in 0..element.count {
                    let mut row = vec![];
                    for property in &element.properties {
                        let count = match property.list {
                            Some(count_type) => count_type.read(&mut reader, big)? as usize,
                            None => 1,
                        };
                        for _ in 0..count {
                            row.push((property.scalar.read(&mut reader, big)?, property.scalar));
                        }
                    }
                    element_rows.push(row);
                }
                rows.push(element_rows);
            }
        }
    }

    build_scene(&elements, &rows)
}

// locates end_header, returning (start of that line, offset after its \n)
fn find_header_end(bytes: &[u8]) -> Option<(usize, usize)> {
    let needle = b"end_header";
    if bytes.len() < needle.len() {
        return None;
    }

    for start in 0..=bytes.len() - needle.len() {
        if &bytes[start..start + needle.len()] == needle {
            let mut end = start + needle.len();
            while end < bytes.len() && bytes[end] != b'\n' {
                end += 1;
            }
            return Some((start, (end + 1).min(bytes.len())));
        }
    }

    None
}

fn build_scene(elements: &[Element], rows: &[Vec<Vec<(f64, Scalar)>>]) -> Result<Scene, Error> {
    let find = |name: &str| elements.iter().position(|element| element.name == name);

    let vertex_element = find("vertex").ok_or_else(|| {
        Error::new(ErrorKind::InvalidGeometry, "no vertex element found")
    })?;

    // map recognized property names to value offsets within a row; scalar
    // properties occupy exactly one slot each
    let offset_of = |name: &str| -> Option<usize> {
        let mut offset = 0;
        for property in &elements[vertex_element].properties {
            if property.list.is_some() {
                return None;
            }
            if property.name == name {
                return Some(offset);
            }
            offset += 1;
        }

        None
    };

    let px = offset_of("x");
    let py = offset_of("y");
    let pz = offset_of("z");
    if px.is_none() || py.is_none() || pz.is_none() {
        return Err(Error::new(
            ErrorKind::InvalidGeometry,
            "the vertex element has no x/y/z properties",
        ));
    }

    let normal = (offset_of("nx"), offset_of("ny"), offset_of("nz"));
    let uv = (
        offset_of("s").or_else(|| offset_of("u")),
        offset_of("t").or_else(|| offset_of("v")),
    );
    let color = (offset_of("red"), offset_of("green"), offset_of("blue"));
    let alpha = offset_of("alpha");

    let vertex_rows = &rows[vertex_element];
    let fetch = |row: &Vec<(f64, Scalar)>, offset: Option<usize>, fallback: f64| -> f32 {
        match offset.and_then(|ofs| row.get(ofs)) {
            Some((val, scalar)) => scalar.normalize(*val),
            None => fallback as f32,
        }
    };

    let mut mesh = Mesh::default();
    let mut shared_positions = vec![];
    let mut shared_normals = vec![];
    let mut shared_uv = vec![];
    let mut shared_colors = vec![];
    let has_normals = normal.0.is_some() && normal.1.is_some() && normal.2.is_some();
    let has_uv = uv.0.is_some() && uv.1.is_some();
    let has_colors = color.0.is_some() && color.1.is_some() && color.2.is_some();
    for row in vertex_rows {
        shared_positions.push(vec3(
            fetch(row, px, 0.0),
            fetch(row, py, 0.0),
            fetch(row, pz, 0.0),
        ));
        if has_normals {
            shared_normals.push(vec3(
                fetch(row, normal.0, 0.0),
                fetch(row, normal.1, 0.0),
                fetch(row, normal.2, 0.0),
            ));
        }
        if has_uv {
            shared_uv.push(vec3(fetch(row, uv.0, 0.0), fetch(row, uv.1, 0.0), 0.0));
        }
        if has_colors {
            shared_colors.push(vec4(
                fetch(row, color.0, 0.0),
                fetch(row, color.1, 0.0),
                fetch(row, color.2, 0.0),
                fetch(row, alpha, 1.0),
            ));
        }
    }

    // fan every polygon into triangles, duplicating vertices so no face
    // shares them
    let mut normals = vec![];
    let mut uv_data = vec![];
    let mut colors = vec![];
    if let Some(face_element) = find("face") {
        for row in &rows[face_element] {
            let indices: Vec<usize> = row.iter().map(|(val, _)| *val as usize).collect();
            if indices.len() < 3 {
                warn!("face with fewer than 3 indices ignored");
                continue;
            }

            if indices
                .iter()
                .any(|index| *index >= shared_positions.len())
            {
                warn!("face index is out of range, face dropped");
                continue;
            }

            for tri in 1..indices.len() - 1 {
                let corners = [indices[0], indices[tri], indices[tri + 1]];
                let base = mesh.positions.len() as u32;
                for &corner in &corners {
                    mesh.positions.push(shared_positions[corner]);
                    if has_normals {
                        normals.push(shared_normals[corner]);
                    }
                    if has_uv {
                        uv_data.push(shared_uv[corner]);
                    }
                    if has_colors {
                        colors.push(shared_colors[corner]);
                    }
                }

                mesh.faces.push(Face::triangle(base, base + 1, base + 2));
            }
        }
    }

    if mesh.faces.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidGeometry,
            "the file contains no faces",
        ));
    }

    if has_normals {
        mesh.normals = Some(normals);
    }
    if has_uv {
        mesh.texcoords[0] = Some(TexCoordChannel {
            components: 2,
            data: uv_data,
        });
    }
    if has_colors {
        mesh.colors[0] = Some(colors);
    }

    let mut material = Material::new();
    material.add_str(PropertyKey::scalar(KEY_NAME), "ply_material");
    material.add_color(PropertyKey::scalar(KEY_COLOR_DIFFUSE), vec3(0.6, 0.6, 0.6));
    material.add_i32(PropertyKey::scalar(KEY_SHADING_MODEL), shading::GOURAUD);

    let mut scene = Scene::new();
    scene.materials.push(material);
    scene.meshes.push(mesh);
    scene.root = Node::new("<PLY>");
    scene.root.meshes.push(0);

    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII_QUAD: &str = "ply\nformat ascii 1.0\nelement vertex 4\nproperty float x\nproperty float y\nproperty float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0 255 0 0\n1 0 0 255 0 0\n1 1 0 255 0 0\n0 1 0 255 0 0\n4 0 1 2 3\n";

    #[test]
    pub fn ascii_quad_is_fanned_into_triangles() {
        let scene = decode(ASCII_QUAD.as_bytes()).unwrap();
        let mesh = &scene.meshes[0];

        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.vertex_count(), 6);
        assert!(mesh.is_verbose());

        let colors = mesh.colors[0].as_ref().unwrap();
        assert!((colors[0].x - 1.0).abs() < 1e-6);
        assert!((colors[0].y - 0.0).abs() < 1e-6);
    }

    #[test]
    pub fn binary_little_endian_triangle() {
        let mut buf = b"ply\nformat binary_little_endian 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n".to_vec();
        for vert in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for val in vert {
                buf.extend_from_slice(&val.to_le_bytes());
            }
        }
        buf.push(3);
        for index in [0i32, 1, 2] {
            buf.extend_from_slice(&index.to_le_bytes());
        }

        let scene = decode(&buf).unwrap();
        assert_eq!(scene.meshes[0].faces.len(), 1);
        assert_eq!(scene.meshes[0].positions[1], vec3(1.0, 0.0, 0.0));
    }

    #[test]
    pub fn missing_magic_is_rejected() {
        assert!(matches!(
            decode(b"not a ply file").unwrap_err().kind(),
            ErrorKind::InvalidMagic
        ));
    }

    #[test]
    pub fn out_of_range_face_is_dropped() {
        let text = "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nelement face 2\nproperty list uchar int vertex_indices\nend_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n3 0 1 9\n";
        let scene = decode(text.as_bytes()).unwrap();

        assert_eq!(scene.meshes[0].faces.len(), 1);
    }
}
