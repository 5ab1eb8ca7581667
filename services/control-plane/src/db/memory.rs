//! In-memory [`Store`] for tests and local development.

use std::collections::BTreeMap;

use armada_id::{AppName, ConfigId, FormationSeq, ReleaseVersion, SlugId};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DbError, DbResult, Store};
use crate::formation::{ActiveFormation, StampedFormation};
use crate::model::{App, AppConfig, Image, Release, Slug};

#[derive(Default)]
struct Tables {
    apps: BTreeMap<AppName, App>,
    /// Insertion order doubles as creation order.
    configs: Vec<AppConfig>,
    slugs: BTreeMap<SlugId, Slug>,
    releases: BTreeMap<(AppName, ReleaseVersion), Release>,
    formations: BTreeMap<AppName, StampedFormation>,
}

impl Tables {
    fn require_app(&self, name: &AppName) -> DbResult<()> {
        if self.apps.contains_key(name) {
            Ok(())
        } else {
            Err(DbError::Integrity(format!("app '{name}' does not exist")))
        }
    }
}

/// [`Store`] that keeps everything behind a single mutex.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn apps_create(&self, app: &App) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.apps.contains_key(&app.name) {
            return Err(DbError::Conflict(format!("app '{}' already exists", app.name)));
        }
        tables.apps.insert(app.name.clone(), app.clone());
        Ok(())
    }

    async fn apps_find(&self, name: &AppName) -> DbResult<Option<App>> {
        Ok(self.tables.lock().await.apps.get(name).cloned())
    }

    async fn apps_all(&self) -> DbResult<Vec<App>> {
        Ok(self.tables.lock().await.apps.values().cloned().collect())
    }

    async fn apps_destroy(&self, name: &AppName) -> DbResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.apps.remove(name).is_none() {
            return Ok(false);
        }
        tables.configs.retain(|config| &config.app != name);
        tables.releases.retain(|(app, _), _| app != name);
        tables.formations.remove(name);
        Ok(true)
    }

    async fn configs_create(&self, config: &AppConfig) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        tables.require_app(&config.app)?;
        if tables.configs.iter().any(|c| c.id == config.id) {
            return Err(DbError::Conflict(format!("config {} already exists", config.id)));
        }
        tables.configs.push(config.clone());
        Ok(())
    }

    async fn configs_find(&self, id: &ConfigId) -> DbResult<Option<AppConfig>> {
        let tables = self.tables.lock().await;
        Ok(tables.configs.iter().find(|c| &c.id == id).cloned())
    }

    async fn configs_latest(&self, app: &AppName) -> DbResult<Option<AppConfig>> {
        let tables = self.tables.lock().await;
        Ok(tables.configs.iter().rev().find(|c| &c.app == app).cloned())
    }

    async fn slugs_create(&self, slug: &Slug) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.slugs.values().any(|s| s.image == slug.image) {
            return Err(DbError::Conflict(format!(
                "slug for image {} already exists",
                slug.image
            )));
        }
        tables.slugs.insert(slug.id, slug.clone());
        Ok(())
    }

    async fn slugs_find(&self, id: &SlugId) -> DbResult<Option<Slug>> {
        Ok(self.tables.lock().await.slugs.get(id).cloned())
    }

    async fn slugs_find_by_image(&self, image: &Image) -> DbResult<Option<Slug>> {
        let tables = self.tables.lock().await;
        Ok(tables.slugs.values().find(|s| &s.image == image).cloned())
    }

    async fn releases_create(&self, release: &Release) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        tables.require_app(&release.app)?;

        let key = (release.app.clone(), release.version);
        if tables.releases.contains_key(&key) {
            return Err(DbError::Conflict(format!(
                "release {} of '{}' already exists",
                release.version, release.app
            )));
        }
        tables.releases.insert(key, release.clone());
        Ok(())
    }

    async fn releases_find_by_app(&self, app: &AppName) -> DbResult<Vec<Release>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .releases
            .values()
            .rev()
            .filter(|r| &r.app == app)
            .cloned()
            .collect())
    }

    async fn releases_find_by_app_and_version(
        &self,
        app: &AppName,
        version: ReleaseVersion,
    ) -> DbResult<Option<Release>> {
        let tables = self.tables.lock().await;
        Ok(tables.releases.get(&(app.clone(), version)).cloned())
    }

    async fn releases_last(&self, app: &AppName) -> DbResult<Option<Release>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .releases
            .values()
            .rev()
            .find(|r| &r.app == app)
            .cloned())
    }

    async fn formation_find(&self, app: &AppName) -> DbResult<Option<StampedFormation>> {
        Ok(self.tables.lock().await.formations.get(app).cloned())
    }

    async fn formation_update(
        &self,
        active: &ActiveFormation,
        expected: Option<FormationSeq>,
    ) -> DbResult<FormationSeq> {
        let mut tables = self.tables.lock().await;
        tables.require_app(&active.app)?;

        let stored = tables.formations.get(&active.app).map(|f| f.seq);
        if stored != expected {
            return Err(DbError::Conflict(format!(
                "formation of '{}' changed concurrently",
                active.app
            )));
        }

        let seq = stored.map_or(FormationSeq::FIRST, |seq| seq.next());
        tables.formations.insert(
            active.app.clone(),
            StampedFormation {
                active: active.clone(),
                seq,
            },
        );
        Ok(seq)
    }

    async fn reset(&self) -> DbResult<()> {
        *self.tables.lock().await = Tables::default();
        Ok(())
    }
}
