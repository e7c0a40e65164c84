use serde::Deserialize;
use serde::Serialize;

use crate::DualWriterMode;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DualWriterConfig {
    /// Integer mode 1..=4; anything else fails deserialization
    #[serde(default)]
    pub mode: DualWriterMode,
}

impl DualWriterConfig {
    pub fn validate(&self) -> Result<()> {
        // The mode enum only admits known values once deserialized.
        Ok(())
    }
}
