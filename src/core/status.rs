//! Game-server status bitmask carried in ping responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named bits, bit 0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusBit {
    Protected = 1 << 0,
    Dedicated = 1 << 1,
    AllowOldClients = 1 << 2,
    Started = 1 << 3,
    Dynamix = 1 << 4,
    Won = 1 << 5,
    Reserved1 = 1 << 6,
    Reserved2 = 1 << 7,
}

impl StatusBit {
    /// Bit-scan order used for rendering.
    pub const ALL: [StatusBit; 8] = [
        StatusBit::Protected,
        StatusBit::Dedicated,
        StatusBit::AllowOldClients,
        StatusBit::Started,
        StatusBit::Dynamix,
        StatusBit::Won,
        StatusBit::Reserved1,
        StatusBit::Reserved2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StatusBit::Protected => "Protected",
            StatusBit::Dedicated => "Dedicated",
            StatusBit::AllowOldClients => "AllowOldClients",
            StatusBit::Started => "Started",
            StatusBit::Dynamix => "Dynamix",
            StatusBit::Won => "WON",
            StatusBit::Reserved1 => "Reserved1",
            StatusBit::Reserved2 => "Reserved2",
        }
    }
}

/// Raw status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusByte(pub u8);

impl StatusByte {
    #[inline]
    pub fn contains(self, bit: StatusBit) -> bool {
        self.0 & bit as u8 != 0
    }

    pub fn names(self) -> Vec<&'static str> {
        StatusBit::ALL
            .iter()
            .filter(|bit| self.contains(**bit))
            .map(|bit| bit.name())
            .collect()
    }

    pub fn flags(self) -> StatusFlags {
        StatusFlags {
            protected: self.contains(StatusBit::Protected),
            dedicated: self.contains(StatusBit::Dedicated),
            allow_old_clients: self.contains(StatusBit::AllowOldClients),
            started: self.contains(StatusBit::Started),
            dynamix: self.contains(StatusBit::Dynamix),
            won: self.contains(StatusBit::Won),
            reserved1: self.contains(StatusBit::Reserved1),
            reserved2: self.contains(StatusBit::Reserved2),
        }
    }
}

impl fmt::Display for StatusByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(" | "))
    }
}

/// Structured view of [`StatusByte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusFlags {
    pub protected: bool,
    pub dedicated: bool,
    pub allow_old_clients: bool,
    pub started: bool,
    pub dynamix: bool,
    pub won: bool,
    pub reserved1: bool,
    pub reserved2: bool,
}

impl From<StatusFlags> for StatusByte {
    fn from(flags: StatusFlags) -> Self {
        let pairs = [
            (flags.protected, StatusBit::Protected),
            (flags.dedicated, StatusBit::Dedicated),
            (flags.allow_old_clients, StatusBit::AllowOldClients),
            (flags.started, StatusBit::Started),
            (flags.dynamix, StatusBit::Dynamix),
            (flags.won, StatusBit::Won),
            (flags.reserved1, StatusBit::Reserved1),
            (flags.reserved2, StatusBit::Reserved2),
        ];
        StatusByte(
            pairs
                .iter()
                .filter(|(set, _)| *set)
                .fold(0u8, |acc, (_, bit)| acc | *bit as u8),
        )
    }
}
