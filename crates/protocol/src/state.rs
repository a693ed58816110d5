use std::{collections::HashMap, path::PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version-control state of a single path inside a repository.
///
/// The discriminants are the wire encoding and must never change: the file
/// manager side decodes the raw integers it receives over the bus with
/// [`FileState::from_wire`], and third parties (badge themes) key off them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FileState {
    /// The file is not under version control.
    #[default]
    Unversioned,
    /// Under version control and identical to the committed version.
    Normal,
    /// A newer version exists on the main branch.
    UpdateRequired,
    /// Locally modified; the modification is staged for the next commit.
    LocallyModified,
    /// Marked to be added with the next commit.
    Added,
    /// Marked to be removed with the next commit.
    Removed,
    /// Conflicting modification on both sides of a merge.
    Conflicting,
    /// Locally modified without being staged ("unstaged" in git jargon).
    LocallyModifiedUnstaged,
    /// Listed in the version control system's ignore list.
    Ignored,
    /// Tracked, but missing from the working tree (deleted without git).
    Missing,
}

/// Absolute path to `FileState` mapping; the payload shape of status
/// snapshots and change events.
pub type StatusMap = HashMap<PathBuf, FileState>;

impl FileState {
    /// Stable integer this state is encoded as on the wire.
    pub fn to_wire(self) -> u8 {
        match self {
            FileState::Unversioned => 0,
            FileState::Normal => 1,
            FileState::UpdateRequired => 2,
            FileState::LocallyModified => 3,
            FileState::Added => 4,
            FileState::Removed => 5,
            FileState::Conflicting => 6,
            FileState::LocallyModifiedUnstaged => 7,
            FileState::Ignored => 8,
            FileState::Missing => 9,
        }
    }

    /// Decode a wire integer. Unknown values yield `None`; callers on the
    /// receiving side fall back to [`FileState::Unversioned`].
    pub fn from_wire(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => FileState::Unversioned,
            1 => FileState::Normal,
            2 => FileState::UpdateRequired,
            3 => FileState::LocallyModified,
            4 => FileState::Added,
            5 => FileState::Removed,
            6 => FileState::Conflicting,
            7 => FileState::LocallyModifiedUnstaged,
            8 => FileState::Ignored,
            9 => FileState::Missing,
            _ => return None,
        })
    }

    /// Badge icon the file manager composes onto the item's icon, or `None`
    /// when the state carries no badge.
    pub fn emblem_icon(self) -> Option<&'static str> {
        match self {
            FileState::LocallyModified => Some("vcs-locally-modified"),
            FileState::LocallyModifiedUnstaged => Some("vcs-locally-modified-unstaged"),
            FileState::Added => Some("vcs-added"),
            FileState::Removed => Some("vcs-removed"),
            FileState::Conflicting => Some("vcs-conflicting"),
            FileState::UpdateRequired => Some("vcs-update-required"),
            FileState::Missing => Some("vcs-missing"),
            FileState::Normal | FileState::Unversioned | FileState::Ignored => None,
        }
    }

    /// Human-readable description, used for tooltips.
    pub fn description(self) -> &'static str {
        match self {
            FileState::Unversioned => "Untracked",
            FileState::Normal => "Up to date",
            FileState::UpdateRequired => "Update required",
            FileState::LocallyModified => "Modified (staged)",
            FileState::LocallyModifiedUnstaged => "Modified",
            FileState::Added => "Added",
            FileState::Removed => "Removed",
            FileState::Conflicting => "Conflicted",
            FileState::Ignored => "Ignored",
            FileState::Missing => "Missing",
        }
    }
}

impl Serialize for FileState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for FileState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Lenient on purpose: a daemon newer than the client may emit states
        // this build does not know, and the contract maps those to "no badge".
        let raw = u8::deserialize(deserializer)?;
        Ok(FileState::from_wire(raw).unwrap_or(FileState::Unversioned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_encoding_is_stable() {
        let expected = [
            (FileState::Unversioned, 0),
            (FileState::Normal, 1),
            (FileState::UpdateRequired, 2),
            (FileState::LocallyModified, 3),
            (FileState::Added, 4),
            (FileState::Removed, 5),
            (FileState::Conflicting, 6),
            (FileState::LocallyModifiedUnstaged, 7),
            (FileState::Ignored, 8),
            (FileState::Missing, 9),
        ];
        for (state, wire) in expected {
            assert_eq!(state.to_wire(), wire);
            assert_eq!(FileState::from_wire(wire), Some(state));
        }
        assert_eq!(FileState::from_wire(10), None);
    }

    #[test]
    fn serializes_as_integer() {
        let json = serde_json::to_string(&FileState::LocallyModifiedUnstaged).unwrap();
        assert_eq!(json, "7");
        let state: FileState = serde_json::from_str("6").unwrap();
        assert_eq!(state, FileState::Conflicting);
    }

    #[test]
    fn unknown_wire_value_decodes_as_unversioned() {
        let state: FileState = serde_json::from_str("42").unwrap();
        assert_eq!(state, FileState::Unversioned);
    }

    #[test]
    fn status_map_round_trips_with_integer_values() {
        let mut map = StatusMap::new();
        map.insert(PathBuf::from("/repo/a.txt"), FileState::Added);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"/repo/a.txt\":4"));
        let back: StatusMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn normal_and_ignored_carry_no_badge() {
        assert_eq!(FileState::Normal.emblem_icon(), None);
        assert_eq!(FileState::Ignored.emblem_icon(), None);
        assert_eq!(FileState::Unversioned.emblem_icon(), None);
        assert_eq!(FileState::Conflicting.emblem_icon(), Some("vcs-conflicting"));
    }
}
