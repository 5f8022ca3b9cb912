#![deny(warnings)]
#![allow(dead_code)]

extern crate pretty_env_logger;

#[macro_use]
extern crate log as log_crate;

#[macro_use]
extern crate bitflags;

pub mod config;
pub mod imp;
pub mod math;
pub mod post;
pub mod scene;

/// Things which are used by almost every program that imports a model file.
pub mod prelude {
    pub use {
        super::{
            config::Config,
            scene::{Animation, Material, Mesh, Node, Scene},
            Error, ErrorKind, Importer,
        },
        log_crate::{debug, error, info, trace, warn},
    };
}

mod error;
mod iff;
mod importer;
mod stream;

pub use self::{
    error::{Error, ErrorKind},
    importer::Importer,
    stream::ByteReader,
};

/// Only required when you are not running an importer instance but still using other
/// library types and you want debugging setup.
pub fn init_debug() {
    pretty_env_logger::init();

    info!("Meshport v0.1.0");
}
