//! Codec to HAL backend lookup.
//!
//! Backends are registered once at startup under the codec they serve. A
//! pipeline then asks the registry for a fresh backend instance by codec.

use crate::config::HalConfig;
use crate::media::CodecType;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::stage::HalBackend;
use crate::pipeline::synthetic::SyntheticHal;
use std::collections::HashMap;

/// Constructor for a HAL backend instance.
pub type HalFactory = Box<dyn Fn(&HalConfig) -> PipelineResult<Box<dyn HalBackend>> + Send + Sync>;

struct HalEntry {
    name: &'static str,
    factory: HalFactory,
}

/// Registered HAL backends keyed by codec.
#[derive(Default)]
pub struct HalRegistry {
    entries: HashMap<CodecType, HalEntry>,
}

impl HalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the synthetic backend serving every codec.
    pub fn with_synthetic() -> Self {
        let mut registry = Self::new();
        for &codec in CodecType::ALL {
            registry.register(
                codec,
                "synthetic",
                Box::new(move |config: &HalConfig| {
                    Ok(Box::new(SyntheticHal::new(codec, config.clone())) as Box<dyn HalBackend>)
                }),
            );
        }
        registry
    }

    /// Register `factory` for `codec`. A previous registration is replaced and
    /// its name returned.
    pub fn register(
        &mut self,
        codec: CodecType,
        name: &'static str,
        factory: HalFactory,
    ) -> Option<&'static str> {
        let previous = self.entries.insert(codec, HalEntry { name, factory });
        match previous {
            Some(entry) => {
                tracing::warn!(
                    "HAL backend '{}' for {} replaced by '{}'",
                    entry.name,
                    codec.name(),
                    name
                );
                Some(entry.name)
            }
            None => {
                tracing::debug!("HAL backend '{}' registered for {}", name, codec.name());
                None
            }
        }
    }

    /// Build a backend for `codec`.
    pub fn create(&self, codec: CodecType, config: &HalConfig) -> PipelineResult<Box<dyn HalBackend>> {
        let entry = self
            .entries
            .get(&codec)
            .ok_or(PipelineError::UnsupportedCodec(codec))?;
        let backend = (entry.factory)(config)?;
        tracing::info!("Created HAL backend '{}' for {}", entry.name, codec.name());
        Ok(backend)
    }

    pub fn supports(&self, codec: CodecType) -> bool {
        self.entries.contains_key(&codec)
    }

    pub fn backend_name(&self, codec: CodecType) -> Option<&'static str> {
        self.entries.get(&codec).map(|entry| entry.name)
    }

    /// Registered codecs in declaration order.
    pub fn codecs(&self) -> Vec<CodecType> {
        CodecType::ALL
            .iter()
            .copied()
            .filter(|codec| self.supports(*codec))
            .collect()
    }
}

impl std::fmt::Debug for HalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HalRegistry")
            .field("codecs", &self.codecs())
            .finish()
    }
}
