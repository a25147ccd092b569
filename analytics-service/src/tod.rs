//! Time-of-day slot normalization.
//!
//! The store records slot names as free text and several spellings are in
//! use for the same window. Everything downstream aggregates on the four
//! canonical [`TodSlot`]s; a name that matches no alias is kept verbatim as
//! [`NormalizedSlot::Unrecognized`] so it can be reported instead of being
//! folded into a real slot.

use std::{cmp::Ordering, fmt};

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TodSlot {
    MorningPeak,
    DayNormal,
    EveningPeak,
    NightOffPeak,
}

struct SlotMetadata {
    label: &'static str,
    aliases: &'static [&'static str],
    color: &'static str,
    order: u8,
    time: &'static str,
}

const MORNING_PEAK: SlotMetadata = SlotMetadata {
    label: "Morning Peak",
    aliases: &["Morning Peak"],
    color: "#FB8C00",
    order: 0,
    time: "6am to 9am",
};

const DAY_NORMAL: SlotMetadata = SlotMetadata {
    label: "Day (Normal)",
    aliases: &["Day (Normal)"],
    color: "#0288D1",
    order: 1,
    time: "9am to 6pm",
};

const EVENING_PEAK: SlotMetadata = SlotMetadata {
    label: "Evening Peak",
    aliases: &["Evening Peak"],
    color: "#C62828",
    order: 2,
    time: "6pm to 10pm",
};

const NIGHT_OFF_PEAK: SlotMetadata = SlotMetadata {
    label: "Night Off-Peak",
    aliases: &["Off-Peak", "off-Peak", "Night Off-Peak"],
    color: "#6A1B9A",
    order: 3,
    time: "10pm to 6am",
};

impl TodSlot {
    /// Alias-table order; first match wins in [`normalize`].
    pub const ALL: [TodSlot; 4] = [
        TodSlot::MorningPeak,
        TodSlot::DayNormal,
        TodSlot::EveningPeak,
        TodSlot::NightOffPeak,
    ];

    fn metadata(self) -> &'static SlotMetadata {
        match self {
            TodSlot::MorningPeak => &MORNING_PEAK,
            TodSlot::DayNormal => &DAY_NORMAL,
            TodSlot::EveningPeak => &EVENING_PEAK,
            TodSlot::NightOffPeak => &NIGHT_OFF_PEAK,
        }
    }

    pub fn label(self) -> &'static str {
        self.metadata().label
    }

    pub fn order(self) -> u8 {
        self.metadata().order
    }

    pub fn color(self) -> &'static str {
        self.metadata().color
    }

    pub fn time_range(self) -> &'static str {
        self.metadata().time
    }

    pub fn label_with_time(self) -> String {
        format!("{} ({})", self.label(), self.time_range())
    }

    /// Position in [`slot_order`], usable as an array index.
    pub fn index(self) -> usize {
        usize::from(self.order())
    }
}

impl PartialOrd for TodSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TodSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order().cmp(&other.order())
    }
}

impl fmt::Display for TodSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for TodSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Result of [`normalize`]: a canonical slot, or the raw name untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NormalizedSlot {
    Known(TodSlot),
    Unrecognized(String),
}

impl NormalizedSlot {
    pub fn label(&self) -> &str {
        match self {
            NormalizedSlot::Known(slot) => slot.label(),
            NormalizedSlot::Unrecognized(raw) => raw,
        }
    }

    pub fn known(&self) -> Option<TodSlot> {
        match self {
            NormalizedSlot::Known(slot) => Some(*slot),
            NormalizedSlot::Unrecognized(_) => None,
        }
    }
}

/// Canonical slots first in their fixed order, unrecognized names after them.
impl Ord for NormalizedSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NormalizedSlot::Known(a), NormalizedSlot::Known(b)) => a.cmp(b),
            (NormalizedSlot::Known(_), NormalizedSlot::Unrecognized(_)) => Ordering::Less,
            (NormalizedSlot::Unrecognized(_), NormalizedSlot::Known(_)) => Ordering::Greater,
            (NormalizedSlot::Unrecognized(a), NormalizedSlot::Unrecognized(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for NormalizedSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<TodSlot> for NormalizedSlot {
    fn from(slot: TodSlot) -> Self {
        NormalizedSlot::Known(slot)
    }
}

impl fmt::Display for NormalizedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for NormalizedSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Case-insensitive, whitespace-trimmed match against the alias table.
pub fn normalize(raw: &str) -> NormalizedSlot {
    let needle = raw.trim().to_lowercase();
    TodSlot::ALL
        .into_iter()
        .find(|slot| {
            slot.metadata()
                .aliases
                .iter()
                .any(|alias| alias.trim().to_lowercase() == needle)
        })
        .map_or_else(|| NormalizedSlot::Unrecognized(raw.to_string()), NormalizedSlot::Known)
}

/// The four canonical slots, ascending by their `order` field.
pub fn slot_order() -> [TodSlot; 4] {
    let mut slots = TodSlot::ALL;
    slots.sort();
    slots
}

pub fn slot_color(slot: TodSlot) -> &'static str {
    slot.color()
}

pub fn slot_label_with_time(slot: TodSlot) -> String {
    slot.label_with_time()
}
