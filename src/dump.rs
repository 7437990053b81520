//! On-disk record of a grid of probe results, CBOR-encoded.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const PROBE_DUMP_VERSION: u32 = 1;

/// Results of probing a regular grid of locations: one column of packed
/// answers per requested item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeDump {
    pub version: u32,
    /// Raster size of the probed volume.
    pub volume_size: [u32; 3],
    /// Resolution of the probe grid.
    pub grid_size: [u32; 3],
    pub items: Vec<ItemColumn>,
}

impl ProbeDump {
    pub fn new(volume_size: [u32; 3], grid_size: [u32; 3]) -> Self {
        Self {
            version: PROBE_DUMP_VERSION,
            volume_size,
            grid_size,
            items: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read probe dump: {}", path.display()))?;
        let dump: ProbeDump =
            serde_cbor::from_slice(&data).context("Failed to decode probe dump CBOR")?;
        Ok(dump)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_cbor::to_vec(self).context("Failed to encode probe dump CBOR")?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write probe dump: {}", path.display()))
    }

    pub fn add_item(&mut self, item: ItemColumn) {
        self.items.push(item);
    }
}

/// One item's answers over the whole grid, x fastest, z slowest,
/// `answer_length` values per location.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemColumn {
    pub name: String,
    pub answer_length: u32,
    pub values: Vec<f64>,
}

impl ItemColumn {
    pub fn new(name: impl Into<String>, answer_length: u32) -> Self {
        Self {
            name: name.into(),
            answer_length,
            values: Vec::new(),
        }
    }
}
