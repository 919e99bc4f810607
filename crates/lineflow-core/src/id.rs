use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a single production unit. Assigned monotonically by the line,
/// starting at 1. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Identifies a machine by its configured key (e.g. `"M1"`). Distinct from
/// the human-readable machine name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_ordering_follows_assignment() {
        assert!(ItemId(1) < ItemId(2));
        assert_eq!(ItemId(7).to_string(), "item-7");
    }

    #[test]
    fn machine_id_serializes_as_plain_string() {
        let id = MachineId::new("press");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"press\"");
        let back: MachineId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(MachineId::from("cut"), 0usize);
        map.insert(MachineId::from("weld"), 1usize);
        assert_eq!(map[&MachineId::from("weld")], 1);
    }
}
