//! Fixed-order post-processing chain applied to the depth member of a set.

use crate::error::DepthVisError;
use crate::frame::{Frame, FrameSet};
use crate::processing::block::{BlockKind, ProcessingBlock};
use crate::processing::settings::ChainSettings;

/// A stage that failed during [`FilterChain::process`]. The chain went on
/// with the frame as it was before that stage.
#[derive(Debug)]
pub struct FilterFailure {
    pub block: BlockKind,
    pub error: DepthVisError,
}

/// Decimation, spatial and temporal blocks in that order.
#[derive(Debug, Clone)]
pub struct FilterChain {
    post_processing_enabled: bool,
    blocks: [ProcessingBlock; 3],
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            post_processing_enabled: true,
            blocks: BlockKind::ORDER.map(ProcessingBlock::new),
        }
    }

    pub fn from_settings(settings: &ChainSettings) -> Self {
        let mut chain = Self::new();
        chain.apply_settings(settings);
        chain
    }

    /// Copy enable flags and option values. Kernel state (temporal history)
    /// is kept.
    pub fn apply_settings(&mut self, settings: &ChainSettings) {
        self.post_processing_enabled = settings.post_processing_enabled;
        for (block, block_settings) in self.blocks.iter_mut().zip(&settings.blocks) {
            block.load_settings(block_settings.enabled, &block_settings.options);
        }
    }

    /// Master post-processing switch.
    pub fn is_enabled(&self) -> bool {
        self.post_processing_enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.post_processing_enabled = enabled;
    }

    pub fn block(&self, kind: BlockKind) -> &ProcessingBlock {
        &self.blocks[kind.index()]
    }

    pub fn block_mut(&mut self, kind: BlockKind) -> &mut ProcessingBlock {
        &mut self.blocks[kind.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ProcessingBlock> {
        self.blocks.iter()
    }

    /// Run every enabled block over the depth member. Other members pass
    /// through untouched. A failing stage is skipped and reported.
    pub fn process(&mut self, mut frames: FrameSet) -> (FrameSet, Vec<FilterFailure>) {
        let mut failures = Vec::new();
        if !self.post_processing_enabled {
            return (frames, failures);
        }
        let Some(input) = frames.depth().cloned() else {
            return (frames, failures);
        };

        let mut current = input.clone();
        for block in &mut self.blocks {
            match block.apply(&current) {
                Ok(next) => current = next,
                Err(error) => {
                    tracing::warn!("{} stage skipped on frame {}: {}", block.name(), current.number(), error);
                    failures.push(FilterFailure {
                        block: block.kind(),
                        error,
                    });
                }
            }
        }

        if !Frame::ptr_eq(&input, &current) {
            frames.replace(current);
        }
        (frames, failures)
    }

    /// Drop state carried between frames.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.reset();
        }
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FramePayload, StreamId, StreamKind, StreamProfile};
    use crate::processing::decimation;

    fn depth(width: u32, height: u32, data: Vec<u16>) -> Frame {
        Frame::builder(StreamId::new(0, StreamKind::Depth), 1)
            .profile(StreamProfile::new(width, height, 30))
            .payload(FramePayload::Depth16(data))
            .build()
    }

    fn color() -> Frame {
        Frame::builder(StreamId::new(0, StreamKind::Color), 1)
            .payload(FramePayload::Rgb8(vec![0; 12]))
            .build()
    }

    #[test]
    fn test_master_switch_off_is_identity() {
        let mut chain = FilterChain::new();
        chain.set_enabled(false);
        let frame = depth(4, 4, vec![100; 16]);
        let (out, failures) = chain.process(FrameSet::single(frame.clone()));
        assert!(failures.is_empty());
        assert!(Frame::ptr_eq(out.depth().unwrap(), &frame));
    }

    #[test]
    fn test_all_blocks_disabled_is_identity() {
        let mut chain = FilterChain::new();
        for kind in BlockKind::ORDER {
            chain.block_mut(kind).set_enabled(false);
        }
        let frame = depth(4, 4, vec![100; 16]);
        let (out, _) = chain.process(FrameSet::single(frame.clone()));
        assert!(Frame::ptr_eq(out.depth().unwrap(), &frame));
    }

    #[test]
    fn test_decimation_only() {
        let mut chain = FilterChain::new();
        chain.block_mut(BlockKind::Spatial).set_enabled(false);
        chain.block_mut(BlockKind::Temporal).set_enabled(false);
        let (out, failures) = chain.process(FrameSet::single(depth(4, 4, vec![100; 16])));
        assert!(failures.is_empty());
        let d = out.depth().unwrap();
        assert_eq!((d.profile().width, d.profile().height), (2, 2));
    }

    #[test]
    fn test_non_depth_members_untouched() {
        let mut chain = FilterChain::new();
        let c = color();
        let mut set = FrameSet::single(depth(4, 4, vec![100; 16]));
        set.replace(c.clone());
        let (out, _) = chain.process(set);
        assert!(Frame::ptr_eq(out.color().unwrap(), &c));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_no_depth_member() {
        let mut chain = FilterChain::new();
        let (out, failures) = chain.process(FrameSet::single(color()));
        assert_eq!(out.len(), 1);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_malformed_payload_reported_and_skipped() {
        let mut chain = FilterChain::new();
        // Declares 4x4 but carries 3 samples.
        let frame = depth(4, 4, vec![1, 2, 3]);
        let (out, failures) = chain.process(FrameSet::single(frame.clone()));
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].block, BlockKind::Decimation);
        assert!(matches!(failures[0].error, DepthVisError::FilterStageFailed { .. }));
        assert!(Frame::ptr_eq(out.depth().unwrap(), &frame));
    }

    #[test]
    fn test_apply_settings() {
        let mut settings = ChainSettings::default();
        settings
            .block_mut(BlockKind::Decimation)
            .options
            .set(decimation::MAGNITUDE, 4.0)
            .unwrap();
        settings.block_mut(BlockKind::Temporal).enabled = false;
        let chain = FilterChain::from_settings(&settings);
        assert_eq!(
            chain.block(BlockKind::Decimation).get_parameter(decimation::MAGNITUDE).unwrap(),
            4.0
        );
        assert!(!chain.block(BlockKind::Temporal).is_enabled());
    }
}
