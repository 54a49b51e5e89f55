//! Hold-state bookkeeping.
//!
//! A `HoldTable` entry exists exactly while its device input is engaged.
//! `engage` reports whether the caller must issue the device hold and
//! `disengage`/`drain` hand back each entry once, so every hold is matched by
//! one release.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(anyhow!("invalid direction `{}` (expected up, down, left or right)", s)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engaged inputs keyed by `K`, each carrying what is needed to undo it.
#[derive(Clone, Debug)]
pub struct HoldTable<K: Ord, V = ()> {
    held: BTreeMap<K, V>,
}

impl<K: Ord + Clone, V> HoldTable<K, V> {
    pub fn new() -> Self {
        Self {
            held: BTreeMap::new(),
        }
    }

    /// Record `key` as engaged. Returns `false` if it already was, in which
    /// case the caller must not issue another device hold.
    pub fn engage(&mut self, key: K, value: V) -> bool {
        if self.held.contains_key(&key) {
            return false;
        }
        self.held.insert(key, value);
        true
    }

    /// Remove `key`, returning its release token if it was engaged.
    pub fn disengage(&mut self, key: &K) -> Option<V> {
        self.held.remove(key)
    }

    pub fn is_held(&self, key: &K) -> bool {
        self.held.contains_key(key)
    }

    pub fn held(&self) -> impl Iterator<Item = &K> {
        self.held.keys()
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Remove every entry.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        std::mem::take(&mut self.held).into_iter().collect()
    }
}

impl<K: Ord + Clone, V> Default for HoldTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engage_and_release_pair_exactly_once() {
        let mut table: HoldTable<Direction, &str> = HoldTable::new();
        assert!(table.engage(Direction::Left, "a"));
        assert!(!table.engage(Direction::Left, "a"));
        assert!(table.engage(Direction::Up, "w"));
        assert_eq!(table.disengage(&Direction::Left), Some("a"));
        assert_eq!(table.disengage(&Direction::Left), None);
        assert_eq!(table.drain(), vec![(Direction::Up, "w")]);
        assert!(table.drain().is_empty());
    }

    #[test]
    fn direction_names_round_trip() {
        for d in Direction::ALL {
            assert_eq!(d.as_str().parse::<Direction>().unwrap(), d);
        }
        assert!("north".parse::<Direction>().is_err());
    }
}
