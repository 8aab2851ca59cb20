//! Test data builders for creating test objects

use vpu_runtime::config::{HalConfig, RuntimeConfig};
use vpu_runtime::media::{CodecType, FrameFormat, Packet};

/// Builder for creating test RuntimeConfigs
pub struct ConfigBuilder {
    config: RuntimeConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = RuntimeConfig::default();
        // Small frames keep synthetic buffers cheap.
        config.frame.width = 320;
        config.frame.height = 240;
        Self { config }
    }

    pub fn codec(mut self, codec: CodecType) -> Self {
        self.config.codec = codec;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.config.task_queue_depth = depth;
        self
    }

    pub fn slots(mut self, capacity: usize) -> Self {
        self.config.slot_capacity = capacity;
        self
    }

    pub fn format(mut self, format: FrameFormat) -> Self {
        self.config.frame.format = format;
        self
    }

    pub fn hal(mut self, hal: HalConfig) -> Self {
        self.config.hal = hal;
        self
    }

    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Packets with increasing pts and a payload derived from the pts
pub fn packets(count: usize) -> Vec<Packet> {
    (0..count as i64)
        .map(|pts| Packet::new(vec![(pts & 0xff) as u8; 64], pts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .codec(CodecType::Vp9)
            .depth(1)
            .slots(3)
            .build();

        assert_eq!(config.codec, CodecType::Vp9);
        assert_eq!(config.task_queue_depth, 1);
        assert_eq!(config.slot_capacity, 3);
        assert!(config.validate().is_ok());
    }
}
