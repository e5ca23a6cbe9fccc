//! Flash manifest as consumed by the device programmer.
//!
//! ```json
//! {
//!   "name": "FPVGate v1.2.0",
//!   "version": "v1.2.0",
//!   "chipFamily": "ESP32-S3",
//!   "new_install_prompt_erase": true,
//!   "builds": [
//!     { "chipFamily": "ESP32-S3", "parts": [ { "path": "https://...", "offset": 0 } ] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::{ChipFamily, Result};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(rename = "chipFamily")]
    pub chip_family: ChipFamily,
    pub new_install_prompt_erase: bool,
    pub builds: Vec<Build>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Build {
    #[serde(rename = "chipFamily")]
    pub chip_family: ChipFamily,
    pub parts: Vec<Part>,
}

/// `path` is either a URL or an in-memory blob reference.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub path: String,
    pub offset: u32,
}

impl Manifest {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}
