//! Per-configuration cache so models are loaded once per session, not once per request.

use crate::error::Result;
use crate::pipelines::sentiment_generator::ModelConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// One loaded value per [`ModelConfig`], created on first use.
///
/// Owned by the caller. Entries hold strong references, so a configuration loads its
/// models once and keeps them until [`clear`](Self::clear) or drop.
pub struct ModelCache<V> {
    entries: HashMap<ModelConfig, Arc<V>>,
}

impl<V> ModelCache<V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return the cached value for `config`, or build it with `loader` and remember it.
    ///
    /// A failing loader leaves the cache untouched.
    pub fn get_or_create<F>(&mut self, config: &ModelConfig, loader: F) -> Result<Arc<V>>
    where
        F: FnOnce(&ModelConfig) -> Result<V>,
    {
        if let Some(value) = self.entries.get(config) {
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(loader(config)?);
        self.entries.insert(config.clone(), Arc::clone(&value));
        Ok(value)
    }

    /// Whether `config` has already been loaded.
    pub fn contains(&self, config: &ModelConfig) -> bool {
        self.entries.contains_key(config)
    }

    /// Drop every cached entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached configurations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for ModelCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[derive(Clone)]
    struct TestModel {
        id: String,
    }

    #[test]
    fn test_cache_returns_same_instance() {
        let mut cache = ModelCache::new();
        let config = ModelConfig::default();

        let model1 = cache
            .get_or_create(&config, |_| {
                Ok(TestModel {
                    id: "original".into(),
                })
            })
            .unwrap();
        let model2 = cache
            .get_or_create(&config, |_| Ok(TestModel { id: "new".into() }))
            .unwrap();

        assert_eq!(model1.id, model2.id);
        assert!(Arc::ptr_eq(&model1, &model2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_different_configs_independent() {
        let mut cache = ModelCache::new();
        let gpt2 = ModelConfig::default();
        let distil = ModelConfig::default().gen_model("distilgpt2");

        let model1 = cache
            .get_or_create(&gpt2, |c| Ok(TestModel { id: c.gen_model.clone() }))
            .unwrap();
        let model2 = cache
            .get_or_create(&distil, |c| Ok(TestModel { id: c.gen_model.clone() }))
            .unwrap();

        assert_eq!(model1.id, "gpt2");
        assert_eq!(model2.id, "distilgpt2");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_device_is_part_of_the_key() {
        let mut cache = ModelCache::new();
        let cpu = ModelConfig::default();
        let gpu = ModelConfig::default().cuda(0);

        cache.get_or_create(&cpu, |_| Ok(1u8)).unwrap();
        assert!(cache.contains(&cpu));
        assert!(!cache.contains(&gpu));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let mut cache: ModelCache<TestModel> = ModelCache::new();
        let config = ModelConfig::default();

        let result = cache.get_or_create(&config, |_| {
            Err(PipelineError::ModelLoad("both tiers failed".into()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = ModelCache::new();
        cache
            .get_or_create(&ModelConfig::default(), |_| Ok(()))
            .unwrap();
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
