//! Four-character chunk tags of the LightWave object formats.
//!
//! LWO files are IFF: big-endian `{tag: u32, length: u32}` chunks below a
//! `FORM` header that names the flavor (`LWOB` before LightWave 6, `LWO2`
//! afterwards). Surface sub-chunks shorten the length field to a u16.

use crate::iff::fourcc;

pub const FORM: u32 = fourcc(b"FORM");
pub const LWOB: u32 = fourcc(b"LWOB");
pub const LWO2: u32 = fourcc(b"LWO2");

// top-level chunks
pub const LAYR: u32 = fourcc(b"LAYR");
pub const PNTS: u32 = fourcc(b"PNTS");
pub const POLS: u32 = fourcc(b"POLS");
pub const SRFS: u32 = fourcc(b"SRFS");
pub const TAGS: u32 = fourcc(b"TAGS");
pub const SURF: u32 = fourcc(b"SURF");
pub const PTAG: u32 = fourcc(b"PTAG");
pub const VMAP: u32 = fourcc(b"VMAP");
pub const VMAD: u32 = fourcc(b"VMAD");
pub const CLIP: u32 = fourcc(b"CLIP");

// POLS sub-types
pub const FACE: u32 = fourcc(b"FACE");

// PTAG sub-types
pub const SMGP: u32 = fourcc(b"SMGP");

// VMAP/VMAD channel types
pub const TXUV: u32 = fourcc(b"TXUV");
pub const WGHT: u32 = fourcc(b"WGHT");
pub const RGB: u32 = fourcc(b"RGB ");
pub const RGBA: u32 = fourcc(b"RGBA");

// CLIP sub-chunks
pub const STIL: u32 = fourcc(b"STIL");

// LWOB surface sub-chunks
pub const COLR: u32 = fourcc(b"COLR");
pub const DIFF: u32 = fourcc(b"DIFF");
pub const SPEC: u32 = fourcc(b"SPEC");
pub const LUMI: u32 = fourcc(b"LUMI");
pub const TRAN: u32 = fourcc(b"TRAN");
pub const GLOS: u32 = fourcc(b"GLOS");
pub const CTEX: u32 = fourcc(b"CTEX");
pub const DTEX: u32 = fourcc(b"DTEX");
pub const STEX: u32 = fourcc(b"STEX");
pub const BTEX: u32 = fourcc(b"BTEX");
pub const TTEX: u32 = fourcc(b"TTEX");
pub const TIMG: u32 = fourcc(b"TIMG");
pub const TVAL: u32 = fourcc(b"TVAL");

// additional LWO2 surface sub-chunks
pub const ADTR: u32 = fourcc(b"ADTR");
pub const LINE: u32 = fourcc(b"LINE");
pub const BUMP: u32 = fourcc(b"BUMP");
pub const CLRH: u32 = fourcc(b"CLRH");
pub const RIND: u32 = fourcc(b"RIND");
pub const SIDE: u32 = fourcc(b"SIDE");
pub const SMAN: u32 = fourcc(b"SMAN");
pub const VCOL: u32 = fourcc(b"VCOL");
pub const REFL: u32 = fourcc(b"REFL");
pub const BLOK: u32 = fourcc(b"BLOK");

// BLOK block types
pub const IMAP: u32 = fourcc(b"IMAP");
pub const PROC: u32 = fourcc(b"PROC");
pub const GRAD: u32 = fourcc(b"GRAD");
pub const SHDR: u32 = fourcc(b"SHDR");

// BLOK header sub-chunks
pub const CHAN: u32 = fourcc(b"CHAN");
pub const ENAB: u32 = fourcc(b"ENAB");
pub const OPAC: u32 = fourcc(b"OPAC");

// IMAP sub-chunks
pub const PROJ: u32 = fourcc(b"PROJ");
pub const WRAP: u32 = fourcc(b"WRAP");
pub const AXIS: u32 = fourcc(b"AXIS");
pub const IMAG: u32 = fourcc(b"IMAG");
pub const WRPH: u32 = fourcc(b"WRPH");
pub const WRPW: u32 = fourcc(b"WRPW");

// SHDR sub-chunks
pub const FUNC: u32 = fourcc(b"FUNC");
