//! Supported sub-GHz tuning ranges

use std::ops::RangeInclusive;

/// Tunable ranges in Hz
pub const SUB_BANDS: [RangeInclusive<u32>; 3] = [
    299_999_755..=348_000_000,
    386_999_938..=464_000_000,
    778_999_847..=928_000_000,
];

pub const FREQUENCY_RANGE_STR: &str =
    "299999755...348000000 or 386999938...464000000 or 778999847...928000000";

/// True if the frequency lies inside one of the supported sub-bands
pub fn is_frequency_valid(frequency: u32) -> bool {
    SUB_BANDS.iter().any(|band| band.contains(&frequency))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        assert!(is_frequency_valid(299_999_755));
        assert!(is_frequency_valid(348_000_000));
        assert!(!is_frequency_valid(348_000_001));
        assert!(is_frequency_valid(433_920_000));
        assert!(is_frequency_valid(868_350_000));
        assert!(is_frequency_valid(928_000_000));
        assert!(!is_frequency_valid(928_000_001));
    }

    #[test]
    fn test_out_of_band() {
        assert!(!is_frequency_valid(0));
        assert!(!is_frequency_valid(1));
        assert!(!is_frequency_valid(370_000_000));
        assert!(!is_frequency_valid(1_090_000_000));
    }
}
