//! Per-frame metadata attribute table.
//!
//! Every frame carries a fixed-size table with one slot per attribute kind.
//! A slot is either absent or holds a 64-bit value.

use std::fmt;

/// Metadata attributes a capture device may report per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum MetadataAttribute {
    FrameCounter = 0,
    FrameTimestamp,
    SensorTimestamp,
    ActualExposure,
    GainLevel,
    AutoExposure,
    TimeOfArrival,
    Temperature,
    BackendTimestamp,
    ActualFps,
}

/// Number of metadata attribute kinds.
pub const METADATA_ATTRIBUTE_COUNT: usize = 10;

impl MetadataAttribute {
    pub const ALL: [MetadataAttribute; METADATA_ATTRIBUTE_COUNT] = [
        MetadataAttribute::FrameCounter,
        MetadataAttribute::FrameTimestamp,
        MetadataAttribute::SensorTimestamp,
        MetadataAttribute::ActualExposure,
        MetadataAttribute::GainLevel,
        MetadataAttribute::AutoExposure,
        MetadataAttribute::TimeOfArrival,
        MetadataAttribute::Temperature,
        MetadataAttribute::BackendTimestamp,
        MetadataAttribute::ActualFps,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Fixed-size table of `(present, value)` pairs, one per attribute kind.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataTable {
    slots: [(bool, i64); METADATA_ATTRIBUTE_COUNT],
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style set.
    pub fn with(mut self, attribute: MetadataAttribute, value: i64) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn set(&mut self, attribute: MetadataAttribute, value: i64) {
        self.slots[attribute.index()] = (true, value);
    }

    pub fn get(&self, attribute: MetadataAttribute) -> Option<i64> {
        let (present, value) = self.slots[attribute.index()];
        present.then_some(value)
    }

    pub fn supports(&self, attribute: MetadataAttribute) -> bool {
        self.slots[attribute.index()].0
    }

    /// Iterate over present attributes.
    pub fn iter(&self) -> impl Iterator<Item = (MetadataAttribute, i64)> + '_ {
        MetadataAttribute::ALL
            .iter()
            .filter_map(|&attr| self.get(attr).map(|v| (attr, v)))
    }
}

impl fmt::Debug for MetadataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_by_default() {
        let table = MetadataTable::new();
        for attr in MetadataAttribute::ALL {
            assert!(!table.supports(attr));
            assert_eq!(table.get(attr), None);
        }
    }

    #[test]
    fn test_set_and_iter() {
        let table = MetadataTable::new()
            .with(MetadataAttribute::FrameCounter, 42)
            .with(MetadataAttribute::ActualExposure, 8500);

        assert_eq!(table.get(MetadataAttribute::FrameCounter), Some(42));
        assert_eq!(table.iter().count(), 2);
        assert_eq!(MetadataAttribute::ALL.len(), METADATA_ATTRIBUTE_COUNT);
    }
}
