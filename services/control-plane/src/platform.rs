//! The platform context: one handle bundling the store, the scheduler and
//! every service built on them.

use std::sync::Arc;

use armada_id::{AppName, ConfigId, ReleaseVersion, SlugId};
use tracing::{info, warn};

use crate::apps::AppsService;
use crate::config::Config;
use crate::configs::ConfigsService;
use crate::db::{PgStore, Store};
use crate::error::Result;
use crate::formation::{Formation, ProcessQuantityMap};
use crate::job_states::{JobState, JobStatesService};
use crate::manager::{Manager, ManagerConfig, ScaleOutcome};
use crate::model::{App, AppConfig, Image, Release, Slug, VarsUpdate};
use crate::releases::ReleasesService;
use crate::scheduler::Scheduler;
use crate::slugs::{Extractor, SlugsService};

/// Entry point for every operation of the control plane.
pub struct Platform {
    store: Arc<dyn Store>,
    apps: AppsService,
    configs: ConfigsService,
    slugs: SlugsService,
    releases: ReleasesService,
    manager: Arc<Manager>,
    job_states: JobStatesService,
}

impl Platform {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn Scheduler>,
        extractor: Arc<dyn Extractor>,
        config: ManagerConfig,
    ) -> Self {
        let call_timeout = config.call_timeout;
        let manager = Arc::new(Manager::new(store.clone(), scheduler.clone(), config));

        Self {
            apps: AppsService::new(store.clone(), manager.clone()),
            configs: ConfigsService::new(store.clone()),
            slugs: SlugsService::new(store.clone(), extractor),
            releases: ReleasesService::new(store.clone()),
            job_states: JobStatesService::new(store.clone(), scheduler, call_timeout),
            manager,
            store,
        }
    }

    /// Connects to Postgres and builds the configured scheduler backend.
    ///
    /// In dev mode pending migrations are applied first.
    pub async fn connect(config: &Config, extractor: Arc<dyn Extractor>) -> anyhow::Result<Self> {
        let store = PgStore::connect(&config.database).await?;
        if config.dev_mode {
            warn!("Dev mode: applying migrations on start");
            store.run_migrations().await?;
        }

        let scheduler = config
            .scheduler
            .build(config.retry_policy(), config.scheduler_timeout)?;
        Ok(Self::new(Arc::new(store), scheduler, extractor, config.manager()))
    }

    pub async fn apps_create(&self, name: AppName) -> Result<App> {
        self.apps.create(name).await
    }

    pub async fn apps_find(&self, name: &AppName) -> Result<App> {
        self.apps.find(name).await
    }

    pub async fn apps_all(&self) -> Result<Vec<App>> {
        self.apps.all().await
    }

    pub async fn apps_destroy(&self, name: &AppName) -> Result<()> {
        self.apps.destroy(name).await
    }

    pub async fn configs_current(&self, app: &App) -> Result<AppConfig> {
        self.configs.current(app).await
    }

    pub async fn configs_find(&self, id: &ConfigId) -> Result<AppConfig> {
        self.configs.find(id).await
    }

    pub async fn configs_apply(&self, app: &App, update: &VarsUpdate) -> Result<AppConfig> {
        self.configs.apply(app, update).await
    }

    pub async fn slugs_create_by_image(&self, image: &Image) -> Result<Slug> {
        self.slugs.create_by_image(image).await
    }

    pub async fn slugs_find(&self, id: &SlugId) -> Result<Slug> {
        self.slugs.find(id).await
    }

    /// Creates a release of `app` from `image` and the app's current config.
    pub async fn releases_create_from_image(
        &self,
        app: &App,
        image: &Image,
        description: &str,
    ) -> Result<Release> {
        let config = self.configs.current(app).await?;
        let slug = self.slugs.create_by_image(image).await?;
        self.releases.create(app, &config, &slug, description).await
    }

    pub async fn releases_create(
        &self,
        app: &App,
        config: &AppConfig,
        slug: &Slug,
        description: &str,
    ) -> Result<Release> {
        self.releases.create(app, config, slug, description).await
    }

    pub async fn releases_find_by_app(&self, app: &AppName) -> Result<Vec<Release>> {
        self.releases.find_by_app(app).await
    }

    pub async fn releases_find_by_app_and_version(
        &self,
        app: &AppName,
        version: ReleaseVersion,
    ) -> Result<Release> {
        self.releases.find_by_app_and_version(app, version).await
    }

    pub async fn releases_last(&self, app: &AppName) -> Result<Option<Release>> {
        self.releases.last(app).await
    }

    pub async fn scale_release(
        &self,
        release: &Release,
        config: &AppConfig,
        slug: &Slug,
        formation: &Formation,
        quantities: &ProcessQuantityMap,
    ) -> Result<ScaleOutcome> {
        self.manager
            .scale_release(release, config, slug, formation, quantities)
            .await
    }

    /// Scales `release` from its current formation, loading its config and
    /// slug from the store.
    pub async fn scale(
        &self,
        release: &Release,
        quantities: &ProcessQuantityMap,
    ) -> Result<ScaleOutcome> {
        let config = self.configs.find(&release.config_id).await?;
        let slug = self.slugs.find(&release.slug_id).await?;
        let formation = self.manager.processes_all(release).await?;
        self.manager
            .scale_release(release, &config, &slug, &formation, quantities)
            .await
    }

    pub async fn processes_all(&self, release: &Release) -> Result<Formation> {
        self.manager.processes_all(release).await
    }

    pub async fn job_states_by_app(&self, app: &AppName) -> Result<Vec<JobState>> {
        self.job_states.job_states_by_app(app).await
    }

    /// Deletes every stored record. Running jobs are not touched.
    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await?;
        info!("Store reset");
        Ok(())
    }
}
