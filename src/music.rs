use std::fmt;
use std::str::FromStr;

use strum::IntoEnumIterator;

const KEY_LABELS: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Pitch class of a track's tonal center, 0 (C) through 11 (B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(u8);

impl Key {
    pub fn new(id: u8) -> Option<Self> {
        (usize::from(id) < KEY_LABELS.len()).then_some(Self(id))
    }

    /// Spotify reports an undetected key as -1.
    pub fn from_analysis(raw: i64) -> Option<Self> {
        u8::try_from(raw).ok().and_then(Self::new)
    }

    pub fn id(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> &'static str {
        KEY_LABELS[usize::from(self.0)]
    }

    pub fn all() -> Vec<Self> {
        (0..KEY_LABELS.len() as u8).map(Self).collect()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Ok(id) = value.parse::<u8>() {
            return Self::new(id).ok_or_else(|| format!("key id {} is out of range 0-11", id));
        }
        KEY_LABELS
            .iter()
            .position(|label| label.eq_ignore_ascii_case(value))
            .map(|position| Self(position as u8))
            .ok_or_else(|| format!("unknown key '{}', expected one of {}", value, KEY_LABELS.join(", ")))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumIter,
    strum_macros::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Mode {
    Minor,
    Major,
}

impl Mode {
    pub fn id(&self) -> u8 {
        match self {
            Mode::Minor => 0,
            Mode::Major => 1,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Mode::Minor),
            1 => Some(Mode::Major),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        Self::iter().collect()
    }
}

/// Key, mode and tempo of a track, either fetched from Spotify or served from the cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Analysis {
    pub key: Option<Key>,
    pub mode: Option<Mode>,
    pub tempo: f64,
}

impl Analysis {
    pub fn matches(&self, key: Key, mode: Mode) -> bool {
        self.key == Some(key) && self.mode == Some(mode)
    }
}

/// Seed rows for the reference `keys` table.
pub fn key_seed() -> Vec<(u8, &'static str)> {
    Key::all().into_iter().map(|key| (key.id(), key.label())).collect()
}

/// Seed rows for the reference `modes` table.
pub fn mode_seed() -> Vec<(u8, String)> {
    Mode::all()
        .into_iter()
        .map(|mode| (mode.id(), mode.to_string()))
        .collect()
}
