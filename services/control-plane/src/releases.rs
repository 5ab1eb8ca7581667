//! Releases: immutable, versioned snapshots of config, slug and formation.
//!
//! Creating a release never schedules anything. The new release becomes
//! active when it is scaled.

use std::sync::Arc;

use armada_id::{AppName, ReleaseId, ReleaseVersion};
use chrono::Utc;
use tracing::{info, instrument};

use crate::db::Store;
use crate::error::{Error, Result};
use crate::formation::Formation;
use crate::model::{App, AppConfig, Release, Slug};

/// Creates and looks up releases.
pub struct ReleasesService {
    store: Arc<dyn Store>,
}

impl ReleasesService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates the next release of `app` from `config` and `slug`.
    ///
    /// The version is one past the app's last release. Two concurrent creates
    /// can compute the same version; the store accepts only one of them and
    /// the other fails with [`Error::Conflict`] and may simply be retried.
    #[instrument(skip_all, fields(app = %app.name, slug_id = %slug.id))]
    pub async fn create(
        &self,
        app: &App,
        config: &AppConfig,
        slug: &Slug,
        description: &str,
    ) -> Result<Release> {
        if config.app != app.name {
            return Err(Error::Validation(format!(
                "config {} belongs to '{}', not '{}'",
                config.id, config.app, app.name
            )));
        }

        let last = self.store.releases_last(&app.name).await?;
        let prior = match &last {
            Some(release) => Some(processes_for(self.store.as_ref(), release).await?),
            None => None,
        };

        let release = Release {
            id: ReleaseId::new(),
            app: app.name.clone(),
            version: ReleaseVersion::after(last.map(|r| r.version)),
            config_id: config.id,
            slug_id: slug.id,
            formation: Formation::from_slug(slug, prior.as_ref())?,
            description: description.to_string(),
            created_at: Utc::now(),
        };

        self.store.releases_create(&release).await?;

        info!(
            version = %release.version,
            process_types = release.formation.len(),
            "Created release"
        );
        Ok(release)
    }

    /// Releases of an app, newest first.
    pub async fn find_by_app(&self, app: &AppName) -> Result<Vec<Release>> {
        Ok(self.store.releases_find_by_app(app).await?)
    }

    pub async fn find_by_app_and_version(
        &self,
        app: &AppName,
        version: ReleaseVersion,
    ) -> Result<Release> {
        self.store
            .releases_find_by_app_and_version(app, version)
            .await?
            .ok_or_else(|| Error::not_found("release", format!("{app} {version}")))
    }

    pub async fn last(&self, app: &AppName) -> Result<Option<Release>> {
        Ok(self.store.releases_last(app).await?)
    }
}

/// The formation currently in effect for `release`.
///
/// That is the app's active formation when it belongs to this release, and the
/// release's own snapshot otherwise.
pub(crate) async fn processes_for(store: &dyn Store, release: &Release) -> Result<Formation> {
    let active = store.formation_find(&release.app).await?;
    Ok(match active {
        Some(stamped) if stamped.active.release_version == release.version => {
            stamped.active.formation
        }
        _ => release.formation.clone(),
    })
}
