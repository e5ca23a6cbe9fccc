//! Board definitions and the `boards.json` wire format.

use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{VecSkipError, serde_as};

use crate::{Error, Result};

/// Chip families supported by the device programmer.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChipFamily {
    #[serde(rename = "ESP32")]
    Esp32,
    #[serde(rename = "ESP32-S2")]
    Esp32S2,
    #[serde(rename = "ESP32-S3")]
    Esp32S3,
    #[serde(rename = "ESP32-C2")]
    Esp32C2,
    #[serde(rename = "ESP32-C3")]
    Esp32C3,
    #[serde(rename = "ESP32-C6")]
    Esp32C6,
    #[serde(rename = "ESP32-H2")]
    Esp32H2,
}

impl ChipFamily {
    const ALL: [Self; 7] = [
        Self::Esp32,
        Self::Esp32S2,
        Self::Esp32S3,
        Self::Esp32C2,
        Self::Esp32C3,
        Self::Esp32C6,
        Self::Esp32H2,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Esp32 => "ESP32",
            Self::Esp32S2 => "ESP32-S2",
            Self::Esp32S3 => "ESP32-S3",
            Self::Esp32C2 => "ESP32-C2",
            Self::Esp32C3 => "ESP32-C3",
            Self::Esp32C6 => "ESP32-C6",
            Self::Esp32H2 => "ESP32-H2",
        }
    }
}

impl FromStr for ChipFamily {
    type Err = String;

    /// Accepts both the canonical name (`ESP32-S3`) and the compact one (`esp32s3`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();

        Self::ALL
            .into_iter()
            .find(|x| x.as_str().replace('-', "") == compact)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controls which boards are offered for selection.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityTier {
    #[default]
    Standard,
    Expert,
}

impl VisibilityTier {
    /// Standard boards are always visible. Expert boards only in expert mode.
    pub const fn includes(self, board: VisibilityTier) -> bool {
        matches!(
            (self, board),
            (Self::Expert, _) | (Self::Standard, Self::Standard)
        )
    }

    const fn from_expert_mode(flag: u8) -> Self {
        if flag == 0 {
            Self::Standard
        } else {
            Self::Expert
        }
    }
}

impl fmt::Display for VisibilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Expert => f.write_str("expert"),
        }
    }
}

/// A binary written at a fixed offset in device flash.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Segment {
    role: String,
    offset: u32,
}

impl Segment {
    pub fn new(role: impl Into<String>, offset: u32) -> Self {
        Self {
            role: role.into(),
            offset,
        }
    }

    /// Create from a catalog part path such as `partitions.bin`.
    pub fn from_path(path: &str, offset: u32) -> Self {
        Self::new(path.strip_suffix(".bin").unwrap_or(path), offset)
    }

    /// Role of the binary, e.g. `bootloader` or `firmware`.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Absolute byte offset in device flash.
    pub const fn offset(&self) -> u32 {
        self.offset
    }
}

/// A validated board.
///
/// Segments are never empty, start at offset `0x0` with the bootloader and have strictly
/// increasing offsets.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BoardDefinition {
    id: String,
    display_name: String,
    chip_family: ChipFamily,
    prefix: String,
    segments: Vec<Segment>,
    tier: VisibilityTier,
}

impl BoardDefinition {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        chip_family: ChipFamily,
        prefix: impl Into<String>,
        segments: Vec<Segment>,
        tier: VisibilityTier,
    ) -> Result<Self> {
        let id = id.into();
        validate_segments(&id, &segments)?;

        Ok(Self {
            id,
            display_name: display_name.into(),
            chip_family,
            prefix: prefix.into(),
            segments,
            tier,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub const fn chip_family(&self) -> ChipFamily {
        self.chip_family
    }

    /// Prefix used in release asset names, e.g. `ESP32S3-8MB`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub const fn tier(&self) -> VisibilityTier {
        self.tier
    }

    /// Release asset name for a segment: `<prefix>-<role>.bin`.
    pub fn expected_file_name(&self, segment: &Segment) -> String {
        format!("{}-{}.bin", self.prefix, segment.role)
    }
}

fn validate_segments(board: &str, segments: &[Segment]) -> Result<()> {
    let first = segments.first().ok_or_else(|| Error::NoSegments {
        board: board.to_string(),
    })?;

    if first.offset != 0 {
        return Err(Error::MissingBootloader {
            board: board.to_string(),
        });
    }

    for pair in segments.windows(2) {
        if pair[1].offset <= pair[0].offset {
            return Err(Error::UnorderedSegment {
                board: board.to_string(),
                role: pair[1].role.clone(),
                offset: pair[1].offset,
            });
        }
    }

    Ok(())
}

struct BuiltinBoard {
    id: &'static str,
    label: &'static str,
    prefix: &'static str,
    chip_family: ChipFamily,
    tier: VisibilityTier,
    parts: &'static [(&'static str, u32)],
}

impl BuiltinBoard {
    fn segments(&self) -> Vec<Segment> {
        self.parts
            .iter()
            .map(|(path, offset)| Segment::from_path(path, *offset))
            .collect()
    }

    fn definition(&self) -> BoardDefinition {
        BoardDefinition {
            id: self.id.to_string(),
            display_name: self.label.to_string(),
            chip_family: self.chip_family,
            prefix: self.prefix.to_string(),
            segments: self.segments(),
            tier: self.tier,
        }
    }
}

const LAYOUT_8MB: &[(&str, u32)] = &[
    ("bootloader.bin", 0x0),
    ("partitions.bin", 0x8000),
    ("firmware.bin", 0x10000),
    ("littlefs.bin", 0x410000),
];

const LAYOUT_4MB: &[(&str, u32)] = &[
    ("bootloader.bin", 0x0),
    ("partitions.bin", 0x8000),
    ("firmware.bin", 0x10000),
    ("littlefs.bin", 0x210000),
];

const LAYOUT_NO_FS: &[(&str, u32)] = &[
    ("bootloader.bin", 0x0),
    ("partitions.bin", 0x8000),
    ("firmware.bin", 0x10000),
];

static BUILTIN_BOARDS: [BuiltinBoard; 5] = [
    BuiltinBoard {
        id: "esp32s3",
        label: "ESP32-S3 DevKitC-1 (8MB Flash) - Recommended",
        prefix: "ESP32S3-8MB",
        chip_family: ChipFamily::Esp32S3,
        tier: VisibilityTier::Standard,
        parts: LAYOUT_8MB,
    },
    BuiltinBoard {
        id: "esp32s3supermini",
        label: "ESP32-S3 Super Mini (4MB Flash)",
        prefix: "ESP32S3-SuperMini-4MB",
        chip_family: ChipFamily::Esp32S3,
        tier: VisibilityTier::Standard,
        parts: LAYOUT_4MB,
    },
    BuiltinBoard {
        id: "esp32c3",
        label: "ESP32-C3",
        prefix: "ESP32C3",
        chip_family: ChipFamily::Esp32C3,
        tier: VisibilityTier::Expert,
        parts: LAYOUT_NO_FS,
    },
    BuiltinBoard {
        id: "esp32c6",
        label: "ESP32-C6",
        prefix: "ESP32C6",
        chip_family: ChipFamily::Esp32C6,
        tier: VisibilityTier::Expert,
        parts: LAYOUT_NO_FS,
    },
    BuiltinBoard {
        id: "lilygo",
        label: "LilyGO T-Energy S3",
        prefix: "LilyGO-T-Energy-S3",
        chip_family: ChipFamily::Esp32S3,
        tier: VisibilityTier::Expert,
        parts: LAYOUT_8MB,
    },
];

fn builtin(id: &str) -> Option<&'static BuiltinBoard> {
    BUILTIN_BOARDS.iter().find(|x| x.id == id)
}

/// Boards to use when the remote catalog cannot be loaded.
pub fn fallback_boards() -> Vec<BoardDefinition> {
    BUILTIN_BOARDS.iter().map(BuiltinBoard::definition).collect()
}

/// Raw `boards.json` document.
#[serde_as]
#[derive(Deserialize, Debug, Default, Clone)]
pub struct BoardCatalogJson {
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub boards: Vec<BoardEntry>,
}

/// Raw board entry. Only `value` and `label` are mandatory, everything else can be filled in
/// from the built-in layouts.
#[derive(Deserialize, Debug, Clone)]
pub struct BoardEntry {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub expert_mode: u8,
    #[serde(rename = "chipFamily", default)]
    pub chip_family: Option<String>,
    #[serde(default)]
    pub parts: Option<Vec<PartEntry>>,
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PartEntry {
    pub path: String,
    pub offset: OffsetJson,
}

/// Offsets are written either as JSON numbers or as hex strings like `"0x8000"`.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum OffsetJson {
    Number(u32),
    Text(String),
}

impl OffsetJson {
    fn value(&self) -> Option<u32> {
        match self {
            Self::Number(x) => Some(*x),
            Self::Text(s) => {
                let s = s.trim();
                match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => s.parse().ok(),
                }
            }
        }
    }
}

impl BoardCatalogJson {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(Into::into)
    }

    /// Validate all entries. Returns the accepted boards in catalog order along with the reason
    /// each rejected entry was dropped.
    pub fn into_boards(self) -> (Vec<BoardDefinition>, Vec<Error>) {
        let mut seen = HashSet::new();
        let mut boards = Vec::with_capacity(self.boards.len());
        let mut rejected = Vec::new();

        for entry in self.boards {
            if !seen.insert(entry.value.clone()) {
                rejected.push(Error::DuplicateBoard { board: entry.value });
                continue;
            }

            match BoardDefinition::try_from(entry) {
                Ok(x) => boards.push(x),
                Err(e) => rejected.push(e),
            }
        }

        (boards, rejected)
    }
}

impl TryFrom<BoardEntry> for BoardDefinition {
    type Error = Error;

    fn try_from(value: BoardEntry) -> Result<Self> {
        let known = builtin(&value.value);

        let chip_family = match (value.chip_family, known) {
            (Some(chip), _) => chip.parse::<ChipFamily>().map_err(|chip| Error::UnknownChipFamily {
                board: value.value.clone(),
                chip,
            })?,
            (None, Some(b)) => b.chip_family,
            (None, None) => {
                return Err(Error::UnknownLayout {
                    board: value.value,
                });
            }
        };

        let segments = match (value.parts, known) {
            (Some(parts), _) => parts
                .into_iter()
                .map(|p| match p.offset.value() {
                    Some(offset) => Ok(Segment::from_path(&p.path, offset)),
                    None => Err(Error::InvalidOffset {
                        board: value.value.clone(),
                        offset: format!("{:?}", p.offset),
                    }),
                })
                .collect::<Result<Vec<_>>>()?,
            (None, Some(b)) => b.segments(),
            (None, None) => {
                return Err(Error::UnknownLayout {
                    board: value.value,
                });
            }
        };

        let prefix = value
            .prefix
            .or_else(|| known.map(|b| b.prefix.to_string()))
            .unwrap_or_else(|| value.value.clone());

        Self::new(
            value.value,
            value.label,
            chip_family,
            prefix,
            segments,
            VisibilityTier::from_expert_mode(value.expert_mode),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_valid() {
        let boards = fallback_boards();

        assert!(boards.iter().any(|x| x.tier() == VisibilityTier::Standard));
        assert!(
            boards
                .iter()
                .filter(|x| x.tier() == VisibilityTier::Expert)
                .count()
                >= 2
        );

        for b in boards {
            validate_segments(b.id(), b.segments()).unwrap();
        }
    }

    #[test]
    fn sparse_entries_use_builtin_layout() {
        let data = br#"{
            "boards": [
                { "value": "esp32s3", "label": "ESP32-S3 DevKitC-1 (8MB Flash)", "expert_mode": 0 },
                { "value": "lilygo", "label": "LilyGO T-Energy S3", "expert_mode": 1 }
            ]
        }"#;

        let (boards, rejected) = BoardCatalogJson::from_json(data).unwrap().into_boards();
        assert!(rejected.is_empty());

        assert_eq!(boards[0].prefix(), "ESP32S3-8MB");
        assert_eq!(boards[0].chip_family(), ChipFamily::Esp32S3);
        assert_eq!(boards[0].segments().len(), 4);
        assert_eq!(boards[1].tier(), VisibilityTier::Expert);
    }

    #[test]
    fn explicit_layout_with_hex_offsets() {
        let data = br#"{
            "boards": [
                {
                    "value": "custom",
                    "label": "Custom C3",
                    "expert_mode": 1,
                    "chipFamily": "esp32c3",
                    "parts": [
                        { "path": "bootloader.bin", "offset": 0 },
                        { "path": "partitions.bin", "offset": "0x8000" },
                        { "path": "firmware.bin", "offset": 65536 }
                    ]
                }
            ]
        }"#;

        let (boards, rejected) = BoardCatalogJson::from_json(data).unwrap().into_boards();
        assert!(rejected.is_empty());

        let board = &boards[0];
        assert_eq!(board.prefix(), "custom");
        assert_eq!(board.chip_family(), ChipFamily::Esp32C3);
        let offsets: Vec<u32> = board.segments().iter().map(Segment::offset).collect();
        assert_eq!(offsets, [0x0, 0x8000, 0x10000]);
        assert_eq!(
            board.expected_file_name(&board.segments()[2]),
            "custom-firmware.bin"
        );
    }

    #[test]
    fn malformed_entries_are_rejected() {
        let data = br#"{
            "boards": [
                { "value": "mystery", "label": "No layout" },
                { "value": "nobootloader", "label": "Bad", "chipFamily": "ESP32-S3",
                  "parts": [ { "path": "firmware.bin", "offset": 65536 } ] },
                { "value": "unordered", "label": "Bad", "chipFamily": "ESP32-S3",
                  "parts": [ { "path": "bootloader.bin", "offset": 0 },
                             { "path": "firmware.bin", "offset": 65536 },
                             { "path": "partitions.bin", "offset": 32768 } ] },
                { "value": "weird", "label": "Bad", "chipFamily": "RP2040",
                  "parts": [ { "path": "bootloader.bin", "offset": 0 } ] },
                { "label": "missing value" },
                { "value": "esp32c6", "label": "ESP32-C6", "expert_mode": 1 },
                { "value": "esp32c6", "label": "ESP32-C6 again", "expert_mode": 1 }
            ]
        }"#;

        let (boards, rejected) = BoardCatalogJson::from_json(data).unwrap().into_boards();

        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id(), "esp32c6");
        assert!(matches!(rejected[0], Error::UnknownLayout { .. }));
        assert!(matches!(rejected[1], Error::MissingBootloader { .. }));
        assert!(matches!(rejected[2], Error::UnorderedSegment { offset: 0x8000, .. }));
        assert!(matches!(rejected[3], Error::UnknownChipFamily { .. }));
        assert!(matches!(rejected[4], Error::DuplicateBoard { .. }));
    }

    #[test]
    fn chip_family_names() {
        assert_eq!("ESP32-S3".parse::<ChipFamily>(), Ok(ChipFamily::Esp32S3));
        assert_eq!("esp32c6".parse::<ChipFamily>(), Ok(ChipFamily::Esp32C6));
        assert_eq!("esp32".parse::<ChipFamily>(), Ok(ChipFamily::Esp32));
        assert!("stm32".parse::<ChipFamily>().is_err());
    }

    #[test]
    fn tier_scope() {
        assert!(VisibilityTier::Standard.includes(VisibilityTier::Standard));
        assert!(!VisibilityTier::Standard.includes(VisibilityTier::Expert));
        assert!(VisibilityTier::Expert.includes(VisibilityTier::Standard));
        assert!(VisibilityTier::Expert.includes(VisibilityTier::Expert));
    }
}
