//! Opslaan en inlezen van scenes, inclusief de slot-toestand van instancers.

pub mod scene_xml;

use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::instancing::ParamError;
use crate::scene::{Scene, SceneError};

pub use scene_xml::{FORMAT_VERSION, read_scene, write_scene};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("xml kon niet gelezen of geschreven worden: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("ongeldig getal: {0}")]
    Number(#[from] ParseFloatError),
    #[error("ongeldige index: {0}")]
    Index(#[from] ParseIntError),
    #[error("ongeldige parameter: {0}")]
    Param(#[from] ParamError),
    #[error("scene is inconsistent: {0}")]
    Scene(#[from] SceneError),
    #[error("bestandsversie {0} wordt niet ondersteund")]
    Version(u32),
    #[error("{0}")]
    Invalid(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Schrijf een scene naar XML.
pub fn save_scene(scene: &Scene) -> PersistResult<String> {
    write_scene(scene)
}

/// Lees een scene uit XML.
pub fn load_scene(input: &str) -> PersistResult<Scene> {
    read_scene(input)
}
