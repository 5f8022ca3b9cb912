//! Chunk tags of the 3D Studio mesh format.
//!
//! A 3DS file is a tree of `{tag: u16, size: u32}` records where `size`
//! covers the six header bytes, the payload and every nested chunk. Tags not
//! listed here are skipped wholesale by seeking to `chunk_start + size`.

// top level
pub const MAIN: u32 = 0x4D4D;

// inside MAIN
pub const OBJMESH: u32 = 0x3D3D;
pub const KEYFRAMER: u32 = 0xB000;

// inside OBJMESH
pub const OBJBLOCK: u32 = 0x4000;
pub const MAT_MATERIAL: u32 = 0xAFFF;
pub const AMBCOLOR: u32 = 0x2100;
pub const BIT_MAP: u32 = 0x1100;
pub const BIT_MAP_EXISTS: u32 = 0x1101;
pub const MASTER_SCALE: u32 = 0x0100;

// inside OBJBLOCK
pub const TRIMESH: u32 = 0x4100;

// inside TRIMESH
pub const VERTLIST: u32 = 0x4110;
pub const FACELIST: u32 = 0x4120;
pub const MAPLIST: u32 = 0x4140;
pub const TRMATRIX: u32 = 0x4160;

// inside FACELIST
pub const FACEMAT: u32 = 0x4130;
pub const SMOOLIST: u32 = 0x4150;

// inside MAT_MATERIAL
pub const MAT_MATNAME: u32 = 0xA000;
pub const MAT_AMBIENT: u32 = 0xA010;
pub const MAT_DIFFUSE: u32 = 0xA020;
pub const MAT_SPECULAR: u32 = 0xA030;
pub const MAT_SHININESS: u32 = 0xA040;
pub const MAT_SHININESS_PERCENT: u32 = 0xA041;
pub const MAT_TRANSPARENCY: u32 = 0xA050;
pub const MAT_SELF_ILLUM: u32 = 0xA080;
pub const MAT_TWO_SIDE: u32 = 0xA081;
pub const MAT_SELF_ILPCT: u32 = 0xA084;
pub const MAT_SHADING: u32 = 0xA100;

// texture chunks inside MAT_MATERIAL
pub const MAT_TEXTURE: u32 = 0xA200;
pub const MAT_SPECMAP: u32 = 0xA204;
pub const MAT_OPACMAP: u32 = 0xA210;
pub const MAT_BUMPMAP: u32 = 0xA230;
pub const MAT_SHINMAP: u32 = 0xA33C;
pub const MAT_SELFIMAP: u32 = 0xA33D;

// inside the texture chunks
pub const MAPFILE: u32 = 0xA300;
pub const MAT_MAP_USCALE: u32 = 0xA354;
pub const MAT_MAP_VSCALE: u32 = 0xA356;
pub const MAT_MAP_UOFFSET: u32 = 0xA358;
pub const MAT_MAP_VOFFSET: u32 = 0xA35A;
pub const MAT_MAP_ANG: u32 = 0xA35C;

// color and percentage sub-chunks, shared by several parents
pub const RGBF: u32 = 0x0010;
pub const RGBB: u32 = 0x0011;
pub const LINRGBB: u32 = 0x0012;
pub const LINRGBF: u32 = 0x0013;
pub const PERCENTW: u32 = 0x0030;
pub const PERCENTF: u32 = 0x0031;

// inside KEYFRAMER
pub const TRACKINFO: u32 = 0xB002;

// inside TRACKINFO
pub const TRACKOBJNAME: u32 = 0xB010;
pub const TRACKPIVOT: u32 = 0xB013;
pub const TRACKPOS: u32 = 0xB020;
pub const TRACKROTATE: u32 = 0xB021;
pub const TRACKSCALE: u32 = 0xB022;

/// Shading values stored by the MAT_SHADING chunk.
pub const SHADE_WIRE: u16 = 0;
pub const SHADE_FLAT: u16 = 1;
pub const SHADE_GOURAUD: u16 = 2;
pub const SHADE_PHONG: u16 = 3;
pub const SHADE_METAL: u16 = 4;
