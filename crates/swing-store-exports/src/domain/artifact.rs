//! Named opaque blob forming part of a store export.

use serde::{Deserialize, Serialize};

use super::errors::ExportError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwingStoreArtifact {
    pub name: String,
    pub data: Vec<u8>,
}

impl SwingStoreArtifact {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Encode as a snapshot extension payload.
    pub fn to_payload(&self) -> Result<Vec<u8>, ExportError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a snapshot extension payload.
    pub fn from_payload(bytes: &[u8]) -> Result<Self, ExportError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
