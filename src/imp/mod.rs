//! The format decoders and their shared contract.
//!
//! A decoder claims files by extension through [`Decoder::can_read`] and
//! turns a fully loaded buffer into a canonical [`Scene`]. Decoders never
//! perform I/O themselves and accumulate warnings through the logger for
//! everything recoverable; only unusable input surfaces as an error.

pub(crate) mod ase;
pub(crate) mod lwo;
pub(crate) mod md2;
pub(crate) mod md5;
pub(crate) mod mdr;
pub(crate) mod nff;
pub(crate) mod ply;
pub(crate) mod shapes;
pub(crate) mod smd;
pub(crate) mod tds;

pub use self::{
    ase::AseDecoder, lwo::LwoDecoder, md2::Md2Decoder, md5::Md5Decoder, mdr::MdrDecoder,
    nff::NffDecoder, ply::PlyDecoder, smd::SmdDecoder, tds::TdsDecoder,
};

use {
    crate::{config::Config, scene::Scene, Error},
    std::path::Path,
};

/// A file handed to a decoder: the whole buffer plus the lowercased
/// extension it was dispatched on.
pub struct RawAsset<'a> {
    pub bytes: &'a [u8],
    pub extension: String,
}

impl<'a> RawAsset<'a> {
    pub fn new(bytes: &'a [u8], extension: &str) -> Self {
        Self {
            bytes,
            extension: extension.to_lowercase(),
        }
    }

    pub fn from_path(bytes: &'a [u8], path: &Path) -> Self {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self { bytes, extension }
    }
}

pub trait Decoder {
    /// Short format name used in log and error messages.
    fn name(&self) -> &'static str;

    /// Whether this decoder handles files with the given lowercased
    /// extension.
    fn can_read(&self, extension: &str) -> bool;

    fn read(&self, asset: &RawAsset<'_>, config: &Config) -> Result<Scene, Error>;
}

/// All built-in decoders, in dispatch order.
pub fn registry() -> Vec<Box<dyn Decoder>> {
    vec![
        Box::new(TdsDecoder),
        Box::new(AseDecoder),
        Box::new(LwoDecoder),
        Box::new(Md2Decoder),
        Box::new(Md5Decoder),
        Box::new(MdrDecoder),
        Box::new(NffDecoder),
        Box::new(PlyDecoder),
        Box::new(SmdDecoder),
    ]
}
