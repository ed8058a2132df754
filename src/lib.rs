pub mod access;
pub mod archives;
pub mod config;
pub mod error;
pub mod game;
pub mod locks;
pub mod logging;
pub mod mod_info;
pub mod mod_loader;
pub mod model;
pub mod staging;
pub mod version_checker;
pub mod vram;

pub use access::Access;
pub use error::{ModError, Result};
pub use model::{Mod, ModListUpdate, ModVariant};
