use crate::cache::{CacheValue, ResultArtifact, ResultCache};
use crate::models::{ImagePredictions, PairPrediction};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A V-COCO action: a verb and, unless the verb is agent-only, the role it scores
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Action {
    pub verb: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl Action {
    pub fn new(verb: &str, role: Option<&str>) -> Self {
        Self {
            verb: verb.to_string(),
            role: role.map(str::to_string),
        }
    }

    /// Key holding the person's confidence for this verb
    pub fn agent_key(&self) -> String {
        format!("{}_agent", self.verb)
    }

    /// Key holding the role target's box and confidence
    pub fn role_key(&self) -> Option<String> {
        self.role
            .as_ref()
            .map(|role| format!("{}_{}", self.verb, role))
    }
}

/// Builds per-image result caches from box-pair predictions
pub struct CacheBuilder<'a> {
    actions: &'a [Action],
}

impl<'a> CacheBuilder<'a> {
    /// `actions` is indexed by the predicted verb index
    pub fn new(actions: &'a [Action]) -> Self {
        Self { actions }
    }

    /// Fold a single pair into the cache.
    ///
    /// The agent score keeps the maximum over pairs; the role record keeps the
    /// object box of the best scoring pair. Unset keys read as their defaults.
    pub fn record(&self, cache: &mut ResultCache, pair: &PairPrediction) -> Result<()> {
        let Some(action) = self.actions.get(pair.verb) else {
            anyhow::bail!(
                "Verb index {} out of range for {} actions",
                pair.verb,
                self.actions.len()
            );
        };

        let agent_key = action.agent_key();
        let agent = cache.get(&agent_key).confidence().max(pair.score);
        cache.set(agent_key, CacheValue::Score(agent));

        if let Some(role_key) = action.role_key() {
            if cache.get(&role_key).confidence() < pair.score {
                cache.set(role_key, CacheValue::record(pair.box_o, pair.score));
            }
        }

        Ok(())
    }

    /// Cache of a single image
    pub fn build_image(&self, predictions: &ImagePredictions) -> Result<ResultCache> {
        let mut cache = ResultCache::new();
        for pair in &predictions.pairs {
            self.record(&mut cache, pair)?;
        }
        Ok(cache)
    }

    /// Artifact covering every image. Repeated image ids accumulate into one cache
    pub fn build(&self, predictions: &[ImagePredictions]) -> Result<ResultArtifact> {
        let mut artifact = ResultArtifact::new();
        for image in predictions {
            let cache = artifact.entry(image.image_id);
            for pair in &image.pairs {
                self.record(cache, pair)?;
            }
            tracing::debug!(
                "Cached {} pairs for image {}",
                image.pairs.len(),
                image.image_id
            );
        }
        Ok(artifact)
    }
}
