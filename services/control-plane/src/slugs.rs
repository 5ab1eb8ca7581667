//! Slugs: images paired with the process types they declare.
//!
//! How process types are read from an image is up to an [`Extractor`]. A slug
//! is extracted once per image and reused afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use armada_id::SlugId;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::db::Store;
use crate::error::{Error, Result};
use crate::formation::validate_process_type;
use crate::model::{Image, ProcessCommands, Slug};

/// Reads the process types an image declares.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, image: &Image) -> Result<ProcessCommands>;
}

/// [`Extractor`] answering from process types known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    default: ProcessCommands,
    by_image: BTreeMap<Image, ProcessCommands>,
}

impl StaticExtractor {
    /// Extractor that gives every image `process_types`.
    pub fn new(process_types: ProcessCommands) -> Self {
        Self {
            default: process_types,
            by_image: BTreeMap::new(),
        }
    }

    /// Overrides the process types of one image.
    pub fn with_image(mut self, image: Image, process_types: ProcessCommands) -> Self {
        self.by_image.insert(image, process_types);
        self
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    async fn extract(&self, image: &Image) -> Result<ProcessCommands> {
        Ok(self
            .by_image
            .get(image)
            .unwrap_or(&self.default)
            .clone())
    }
}

/// Creates and looks up slugs.
pub struct SlugsService {
    store: Arc<dyn Store>,
    extractor: Arc<dyn Extractor>,
}

impl SlugsService {
    pub fn new(store: Arc<dyn Store>, extractor: Arc<dyn Extractor>) -> Self {
        Self { store, extractor }
    }

    /// Returns the slug for `image`, extracting it on first use.
    #[instrument(skip(self, image), fields(image = %image))]
    pub async fn create_by_image(&self, image: &Image) -> Result<Slug> {
        if let Some(slug) = self.store.slugs_find_by_image(image).await? {
            debug!(slug_id = %slug.id, "Reusing slug");
            return Ok(slug);
        }

        let process_types = self.extractor.extract(image).await?;
        if process_types.is_empty() {
            return Err(Error::Validation(format!(
                "image {image} declares no process types"
            )));
        }
        for (process_type, command) in &process_types {
            validate_process_type(process_type)?;
            if command.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "process type '{process_type}' has an empty command"
                )));
            }
        }

        let slug = Slug::new(image.clone(), process_types);
        match self.store.slugs_create(&slug).await {
            Ok(()) => {
                info!(slug_id = %slug.id, process_types = slug.process_types.len(), "Created slug");
                Ok(slug)
            }
            // Lost a race with another extraction of the same image.
            Err(crate::db::DbError::Conflict(_)) => self
                .store
                .slugs_find_by_image(image)
                .await?
                .ok_or_else(|| Error::not_found("slug", image)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find(&self, id: &SlugId) -> Result<Slug> {
        self.store
            .slugs_find(id)
            .await?
            .ok_or_else(|| Error::not_found("slug", id))
    }
}
