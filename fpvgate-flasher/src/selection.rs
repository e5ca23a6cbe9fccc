//! User choices feeding manifest resolution.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    str::FromStr,
    sync::Arc,
};

use fpvgate_config::{BoardDefinition, VisibilityTier};
use thiserror::Error;
use tokio::sync::watch;

use crate::FlashOptions;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Unknown board {0}")]
    UnknownBoard(String),
    #[error("Board {0} is only available in expert mode")]
    BoardOutOfScope(String),
    #[error("Unknown firmware version {0}")]
    UnknownRelease(String),
}

/// Segments which can be replaced by a user supplied binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CustomRole {
    Firmware,
    Filesystem,
}

impl CustomRole {
    /// Check if this role overrides the board segment `role`.
    pub fn matches(self, role: &str) -> bool {
        match self {
            Self::Firmware => role == "firmware",
            Self::Filesystem => matches!(role, "littlefs" | "spiffs" | "fatfs"),
        }
    }

    pub fn for_segment(role: &str) -> Option<Self> {
        [Self::Firmware, Self::Filesystem]
            .into_iter()
            .find(|x| x.matches(role))
    }
}

impl fmt::Display for CustomRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firmware => f.write_str("firmware"),
            Self::Filesystem => f.write_str("filesystem"),
        }
    }
}

impl FromStr for CustomRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firmware" => Ok(Self::Firmware),
            "filesystem" => Ok(Self::Filesystem),
            _ => Err(format!("unknown binary role {s}")),
        }
    }
}

/// A binary uploaded by the user. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomBinary {
    name: String,
    data: Arc<[u8]>,
}

impl CustomBinary {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }
}

/// Current board, release and flash option choices.
///
/// All mutation goes through the named operations, each of which re-evaluates the ready
/// predicate. Interested parties can observe it through [`SelectionState::subscribe_ready`].
#[derive(Debug)]
pub struct SelectionState {
    boards: HashMap<String, VisibilityTier>,
    releases: HashSet<String>,
    board_id: Option<String>,
    release_tag: Option<String>,
    tier: VisibilityTier,
    options: FlashOptions,
    custom: BTreeMap<CustomRole, CustomBinary>,
    ready: watch::Sender<bool>,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self {
            boards: HashMap::new(),
            releases: HashSet::new(),
            board_id: None,
            release_tag: None,
            tier: VisibilityTier::default(),
            options: FlashOptions::default(),
            custom: BTreeMap::new(),
            ready: watch::Sender::new(false),
        }
    }
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of selectable boards. A selected board which is no longer known, or no
    /// longer visible in the current tier, is cleared.
    pub fn set_known_boards<'a>(&mut self, boards: impl IntoIterator<Item = &'a BoardDefinition>) {
        self.boards = boards
            .into_iter()
            .map(|x| (x.id().to_string(), x.tier()))
            .collect();

        if let Some(id) = self.board_id.take() {
            if self.board_in_scope(&id) {
                self.board_id = Some(id);
            } else {
                tracing::info!("Board {id} is no longer available in {} mode", self.tier);
            }
        }
        self.refresh();
    }

    /// Replace the set of selectable release tags. A selected tag which is no longer known is
    /// cleared.
    pub fn set_known_releases<'a>(&mut self, tags: impl IntoIterator<Item = &'a str>) {
        self.releases = tags.into_iter().map(str::to_string).collect();

        if self
            .release_tag
            .as_ref()
            .is_some_and(|tag| !self.releases.contains(tag))
        {
            self.release_tag = None;
        }
        self.refresh();
    }

    pub fn select_board(&mut self, id: &str) -> Result<(), SelectionError> {
        let tier = self
            .boards
            .get(id)
            .ok_or_else(|| SelectionError::UnknownBoard(id.to_string()))?;

        if !self.tier.includes(*tier) {
            return Err(SelectionError::BoardOutOfScope(id.to_string()));
        }

        self.board_id = Some(id.to_string());
        self.refresh();
        Ok(())
    }

    pub fn clear_board(&mut self) {
        self.board_id = None;
        self.refresh();
    }

    pub fn select_release(&mut self, tag: &str) -> Result<(), SelectionError> {
        if !self.releases.contains(tag) {
            return Err(SelectionError::UnknownRelease(tag.to_string()));
        }

        self.release_tag = Some(tag.to_string());
        self.refresh();
        Ok(())
    }

    /// Leaving expert mode drops a selected expert-only board.
    pub fn set_visibility_tier(&mut self, tier: VisibilityTier) {
        self.tier = tier;

        if let Some(id) = self.board_id.take() {
            if self.board_in_scope(&id) {
                self.board_id = Some(id);
            } else {
                tracing::info!("Board {id} is not available in {tier} mode, clearing selection");
            }
        }
        self.refresh();
    }

    pub fn set_erase_before_flash(&mut self, erase: bool) {
        self.options.erase_before_flash = erase;
        self.refresh();
    }

    pub fn set_verify_after_flash(&mut self, verify: bool) {
        self.options.verify_after_flash = verify;
        self.refresh();
    }

    pub fn set_custom_binary(
        &mut self,
        role: CustomRole,
        name: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) {
        self.custom.insert(role, CustomBinary::new(name, data));
        self.refresh();
    }

    pub fn clear_custom_binary(&mut self, role: CustomRole) {
        self.custom.remove(&role);
        self.refresh();
    }

    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    pub fn release_tag(&self) -> Option<&str> {
        self.release_tag.as_deref()
    }

    pub const fn visibility_tier(&self) -> VisibilityTier {
        self.tier
    }

    pub const fn flash_options(&self) -> FlashOptions {
        self.options
    }

    pub fn custom_binaries(&self) -> &BTreeMap<CustomRole, CustomBinary> {
        &self.custom
    }

    /// Board and release are selected, and the board is in scope for the current tier.
    pub fn is_ready(&self) -> bool {
        match (&self.board_id, &self.release_tag) {
            (Some(board), Some(_)) => self.board_in_scope(board),
            _ => false,
        }
    }

    /// Watch the ready predicate. The receiver only wakes when the value changes.
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    fn board_in_scope(&self, id: &str) -> bool {
        self.boards
            .get(id)
            .is_some_and(|tier| self.tier.includes(*tier))
    }

    fn refresh(&mut self) {
        let ready = self.is_ready();
        self.ready.send_if_modified(|x| {
            if *x == ready {
                false
            } else {
                *x = ready;
                true
            }
        });
    }
}
