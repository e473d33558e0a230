use std::{fmt, str::FromStr};

use crate::Error;

/// Canned connection layouts for `RoutingMatrix::load_preset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingPreset {
    /// Every source to the destination with the same index
    AllChannels,
    /// 0 → 0, 1 → 1
    FirstStereo,
    /// 2 → 2, 3 → 3
    SecondStereo,
    /// 4 → 4, 5 → 5
    ThirdStereo,
    /// Even sources to 0, odd sources to 1
    AllChannelsToStereo,
}

impl RoutingPreset {
    pub const ALL: [RoutingPreset; 5] = [
        RoutingPreset::AllChannels,
        RoutingPreset::FirstStereo,
        RoutingPreset::SecondStereo,
        RoutingPreset::ThirdStereo,
        RoutingPreset::AllChannelsToStereo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RoutingPreset::AllChannels => "All Channels",
            RoutingPreset::FirstStereo => "First Stereo",
            RoutingPreset::SecondStereo => "Second Stereo",
            RoutingPreset::ThirdStereo => "Third Stereo",
            RoutingPreset::AllChannelsToStereo => "All Channels to Stereo",
        }
    }

    /// The `(source, destination)` connections this preset makes on a matrix
    /// with `num_source` channels.
    pub fn connections(self, num_source: usize) -> Vec<(usize, usize)> {
        match self {
            RoutingPreset::AllChannels => (0..num_source).map(|i| (i, i)).collect(),
            RoutingPreset::FirstStereo => vec![(0, 0), (1, 1)],
            RoutingPreset::SecondStereo => vec![(2, 2), (3, 3)],
            RoutingPreset::ThirdStereo => vec![(4, 4), (5, 5)],
            RoutingPreset::AllChannelsToStereo => (0..num_source).map(|i| (i, i % 2)).collect(),
        }
    }
}

impl fmt::Display for RoutingPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoutingPreset {
    type Err = Error;

    /// Accepts the display name, case-insensitive, with or without spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().replace(' ', "").to_lowercase() == key)
            .ok_or_else(|| Error::UnknownPreset(s.to_string()))
    }
}
