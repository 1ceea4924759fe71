//! # Adapters Layer
//!
//! - `directory` - export directories on disk
//! - `controller` - JSON transport bridge implementing `ControllerPort`
//! - `memory` - in-memory providers and ordered store

pub mod controller;
pub mod directory;
pub mod memory;

pub use controller::JsonControllerBridge;
pub use directory::{
    open_swing_store_export_directory, write_swing_store_export_to_directory,
    write_swing_store_export_to_directory_with_mode, DirectoryExportProvider, EXPORTED_FILES_MODE,
};
pub use memory::{MemoryExportProvider, MemoryIterator, MemoryKVStore};
