//! Filter configuration: the serde form and the shared runtime store.
//!
//! [`FilterSettings`] is what external callers write to. Every write is
//! validated under a short lock and bumps a generation counter; the worker
//! compares generations once per cycle and copies the whole
//! [`ChainSettings`] into its own [`FilterChain`](super::FilterChain) when
//! it changed. No setter ever touches a block that is mid-apply.

use crate::error::Result;
use crate::processing::block::BlockKind;
use crate::processing::options::{BlockOption, OptionSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Serialized configuration of one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub enabled: bool,
    /// Option overrides by name. Missing options keep their defaults.
    pub parameters: BTreeMap<String, f32>,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parameters: BTreeMap::new(),
        }
    }
}

/// Serialized configuration of the whole chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Master switch. When off the chain passes frames through untouched.
    pub post_processing_enabled: bool,
    pub decimation: BlockConfig,
    pub spatial: BlockConfig,
    pub temporal: BlockConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            post_processing_enabled: true,
            decimation: BlockConfig::default(),
            spatial: BlockConfig::default(),
            temporal: BlockConfig::default(),
        }
    }
}

impl FilterConfig {
    pub fn block(&self, kind: BlockKind) -> &BlockConfig {
        match kind {
            BlockKind::Decimation => &self.decimation,
            BlockKind::Spatial => &self.spatial,
            BlockKind::Temporal => &self.temporal,
        }
    }

    pub fn block_mut(&mut self, kind: BlockKind) -> &mut BlockConfig {
        match kind {
            BlockKind::Decimation => &mut self.decimation,
            BlockKind::Spatial => &mut self.spatial,
            BlockKind::Temporal => &mut self.temporal,
        }
    }

    /// Check every override against its block's option table.
    pub fn validate(&self) -> Result<()> {
        ChainSettings::from_config(self).map(|_| ())
    }
}

/// Enable state and option values of one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSettings {
    pub kind: BlockKind,
    pub enabled: bool,
    pub options: OptionSet,
}

impl BlockSettings {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            enabled: true,
            options: kind.default_options(),
        }
    }
}

/// Complete parameter state of a filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSettings {
    pub post_processing_enabled: bool,
    pub blocks: [BlockSettings; 3],
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            post_processing_enabled: true,
            blocks: BlockKind::ORDER.map(BlockSettings::new),
        }
    }
}

impl ChainSettings {
    pub fn block(&self, kind: BlockKind) -> &BlockSettings {
        &self.blocks[kind.index()]
    }

    pub fn block_mut(&mut self, kind: BlockKind) -> &mut BlockSettings {
        &mut self.blocks[kind.index()]
    }

    /// Build validated settings from configuration.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let mut settings = Self {
            post_processing_enabled: config.post_processing_enabled,
            ..Self::default()
        };
        for kind in BlockKind::ORDER {
            let block_config = config.block(kind);
            let block = settings.block_mut(kind);
            block.enabled = block_config.enabled;
            for (name, value) in &block_config.parameters {
                block
                    .options
                    .set(name, *value)
                    .map_err(|e| e.with_context(format!("filter config for {}", kind)))?;
            }
        }
        Ok(settings)
    }

    pub fn to_config(&self) -> FilterConfig {
        let mut config = FilterConfig {
            post_processing_enabled: self.post_processing_enabled,
            ..FilterConfig::default()
        };
        for block in &self.blocks {
            let out = config.block_mut(block.kind);
            out.enabled = block.enabled;
            out.parameters = block
                .options
                .iter()
                .map(|o| (o.name.clone(), o.value))
                .collect();
        }
        config
    }
}

/// Shared, lock-guarded parameter store for one pipeline.
#[derive(Debug)]
pub struct FilterSettings {
    inner: Mutex<ChainSettings>,
    generation: AtomicU64,
}

impl FilterSettings {
    pub fn new(settings: ChainSettings) -> Self {
        Self {
            inner: Mutex::new(settings),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        Ok(Self::new(ChainSettings::from_config(config)?))
    }

    fn lock(&self) -> MutexGuard<'_, ChainSettings> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `update` under the lock and bump the generation if it succeeded.
    fn update<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut ChainSettings) -> Result<()>,
    {
        let mut settings = self.lock();
        update(&mut settings)?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn write<F>(&self, update: F)
    where
        F: FnOnce(&mut ChainSettings),
    {
        update(&mut self.lock());
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Incremented by every successful write.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Consistent copy of the settings together with their generation.
    pub fn snapshot(&self) -> (u64, ChainSettings) {
        let settings = self.lock();
        (self.generation(), settings.clone())
    }

    pub fn set_post_processing(&self, enabled: bool) {
        self.write(|s| s.post_processing_enabled = enabled);
    }

    pub fn post_processing_enabled(&self) -> bool {
        self.lock().post_processing_enabled
    }

    pub fn set_block_enabled(&self, kind: BlockKind, enabled: bool) {
        self.write(|s| s.block_mut(kind).enabled = enabled);
    }

    pub fn block_enabled(&self, kind: BlockKind) -> bool {
        self.lock().block(kind).enabled
    }

    pub fn set_parameter(&self, kind: BlockKind, name: &str, value: f32) -> Result<()> {
        self.update(|s| s.block_mut(kind).options.set(name, value))?;
        tracing::debug!("{} option {} = {}", kind, name, value);
        Ok(())
    }

    pub fn get_parameter(&self, kind: BlockKind, name: &str) -> Result<f32> {
        self.lock().block(kind).options.get(name)
    }

    pub fn options(&self, kind: BlockKind) -> Vec<BlockOption> {
        self.lock().block(kind).options.to_vec()
    }

    /// Restore every option of `kind` to its default.
    pub fn reset_block(&self, kind: BlockKind) {
        self.write(|s| s.block_mut(kind).options.reset_to_defaults());
    }

    pub fn to_config(&self) -> FilterConfig {
        self.lock().to_config()
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self::new(ChainSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepthVisError;
    use crate::processing::{decimation, temporal};

    #[test]
    fn test_defaults_all_enabled() {
        let settings = ChainSettings::default();
        assert!(settings.post_processing_enabled);
        assert!(settings.blocks.iter().all(|b| b.enabled));
        assert_eq!(settings.blocks.map(|b| b.kind), BlockKind::ORDER);
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = FilterConfig::default();
        config.decimation.parameters.insert(decimation::MAGNITUDE.into(), 4.0);
        config.temporal.enabled = false;
        let settings = ChainSettings::from_config(&config).unwrap();
        assert_eq!(settings.block(BlockKind::Decimation).options.get("magnitude").unwrap(), 4.0);
        assert!(!settings.block(BlockKind::Temporal).enabled);

        let back = ChainSettings::from_config(&settings.to_config()).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = FilterConfig::default();
        config.spatial.parameters.insert("bogus".into(), 1.0);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.root(),
            DepthVisError::UnknownParameter { block: "Spatial", .. }
        ));
    }

    #[test]
    fn test_generation_only_moves_on_success() {
        let settings = FilterSettings::default();
        let g0 = settings.generation();
        settings
            .set_parameter(BlockKind::Temporal, temporal::PERSISTENCE, 5.0)
            .unwrap();
        assert_eq!(settings.generation(), g0 + 1);

        assert!(settings
            .set_parameter(BlockKind::Temporal, temporal::PERSISTENCE, 9.0)
            .is_err());
        assert_eq!(settings.generation(), g0 + 1);
        assert_eq!(
            settings.get_parameter(BlockKind::Temporal, temporal::PERSISTENCE).unwrap(),
            5.0
        );

        settings.set_block_enabled(BlockKind::Spatial, false);
        assert!(!settings.block_enabled(BlockKind::Spatial));
        let (generation, snapshot) = settings.snapshot();
        assert_eq!(generation, g0 + 2);
        assert!(!snapshot.block(BlockKind::Spatial).enabled);
    }

    #[test]
    fn test_reset_block() {
        let settings = FilterSettings::default();
        settings
            .set_parameter(BlockKind::Decimation, decimation::MAGNITUDE, 6.0)
            .unwrap();
        settings.reset_block(BlockKind::Decimation);
        assert_eq!(
            settings.get_parameter(BlockKind::Decimation, decimation::MAGNITUDE).unwrap(),
            2.0
        );
    }
}
