//! Validated numeric parameters for processing blocks.

use crate::error::{DepthVisError, Result};
use serde::{Deserialize, Serialize};

/// Valid range of a numeric option.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionRange {
    pub min: f32,
    pub max: f32,
    /// Granularity. Values are snapped to `min + k * step`; 0 = continuous.
    pub step: f32,
    pub default: f32,
}

impl OptionRange {
    pub const fn new(min: f32, max: f32, step: f32, default: f32) -> Self {
        Self {
            min,
            max,
            step,
            default,
        }
    }

    /// Inclusive range check. Non-finite values are never contained.
    pub fn contains(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Snap `value` to the step grid, staying inside the range.
    pub fn snap(&self, value: f32) -> f32 {
        if self.step <= 0.0 {
            return value;
        }
        let steps = ((value - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }

    pub fn is_integer(&self) -> bool {
        self.step >= 1.0 && self.step.fract() == 0.0 && self.min.fract() == 0.0
    }
}

/// One named option with its declared range and current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockOption {
    pub name: String,
    pub description: String,
    pub range: OptionRange,
    pub value: f32,
}

impl BlockOption {
    pub fn new(name: &str, description: &str, range: OptionRange) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            range,
            value: range.default,
        }
    }
}

/// The option table of one processing block.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSet {
    block: &'static str,
    options: Vec<BlockOption>,
}

impl OptionSet {
    pub fn new(block: &'static str, options: Vec<BlockOption>) -> Self {
        Self { block, options }
    }

    pub fn block(&self) -> &'static str {
        self.block
    }

    fn find(&self, name: &str) -> Result<&BlockOption> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| DepthVisError::UnknownParameter {
                block: self.block,
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Result<f32> {
        self.find(name).map(|o| o.value)
    }

    /// Current value of an option this block is known to declare. Falls
    /// back to 0 for undeclared names, which kernels never ask for.
    pub(crate) fn value(&self, name: &str) -> f32 {
        self.get(name).unwrap_or_default()
    }

    pub fn range(&self, name: &str) -> Result<OptionRange> {
        self.find(name).map(|o| o.range)
    }

    /// Validate and store. On error the previous value is kept.
    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        let block = self.block;
        let option = self
            .options
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| DepthVisError::UnknownParameter {
                block,
                name: name.to_string(),
            })?;
        if !option.range.contains(value) {
            return Err(DepthVisError::ParameterOutOfRange {
                block,
                name: name.to_string(),
                value,
                min: option.range.min,
                max: option.range.max,
            });
        }
        option.value = option.range.snap(value);
        Ok(())
    }

    /// Restore every option to its declared default.
    pub fn reset_to_defaults(&mut self) {
        for option in &mut self.options {
            option.value = option.range.default;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockOption> {
        self.options.iter()
    }

    pub fn to_vec(&self) -> Vec<BlockOption> {
        self.options.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OptionSet {
        OptionSet::new(
            "Test",
            vec![
                BlockOption::new("magnitude", "", OptionRange::new(1.0, 8.0, 1.0, 2.0)),
                BlockOption::new("alpha", "", OptionRange::new(0.25, 1.0, 0.0, 0.5)),
            ],
        )
    }

    #[test]
    fn test_defaults() {
        let set = sample();
        assert_eq!(set.get("magnitude").unwrap(), 2.0);
        assert_eq!(set.get("alpha").unwrap(), 0.5);
    }

    #[test]
    fn test_boundaries_accepted() {
        let mut set = sample();
        set.set("magnitude", 1.0).unwrap();
        assert_eq!(set.get("magnitude").unwrap(), 1.0);
        set.set("magnitude", 8.0).unwrap();
        assert_eq!(set.get("magnitude").unwrap(), 8.0);
        set.set("alpha", 0.25).unwrap();
        assert_eq!(set.get("alpha").unwrap(), 0.25);
    }

    #[test]
    fn test_out_of_range_keeps_prior() {
        let mut set = sample();
        set.set("magnitude", 4.0).unwrap();
        let err = set.set("magnitude", 9.0).unwrap_err();
        assert!(matches!(err, DepthVisError::ParameterOutOfRange { .. }));
        assert_eq!(set.get("magnitude").unwrap(), 4.0);

        assert!(set.set("alpha", f32::NAN).is_err());
        assert_eq!(set.get("alpha").unwrap(), 0.5);
    }

    #[test]
    fn test_unknown_parameter() {
        let mut set = sample();
        assert!(matches!(
            set.set("bogus", 1.0),
            Err(DepthVisError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_integer_snap() {
        let mut set = sample();
        set.set("magnitude", 3.4).unwrap();
        assert_eq!(set.get("magnitude").unwrap(), 3.0);
        assert!(set.range("magnitude").unwrap().is_integer());
        assert!(!set.range("alpha").unwrap().is_integer());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_value_always_in_range(values in prop::collection::vec(-20.0f32..20.0, 1..40)) {
            let mut set = sample();
            for v in values {
                let before = set.get("magnitude").unwrap();
                match set.set("magnitude", v) {
                    Ok(()) => prop_assert!((1.0..=8.0).contains(&v)),
                    Err(_) => prop_assert_eq!(set.get("magnitude").unwrap(), before),
                }
                let now = set.get("magnitude").unwrap();
                prop_assert!((1.0..=8.0).contains(&now));
            }
        }
    }
}
