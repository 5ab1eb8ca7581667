//! Apps: the named deployable units everything else hangs off.

use std::sync::Arc;

use armada_id::AppName;
use tracing::{info, instrument};

use crate::db::Store;
use crate::error::{Error, Result};
use crate::manager::Manager;
use crate::model::App;

/// Creates, looks up and destroys apps.
pub struct AppsService {
    store: Arc<dyn Store>,
    manager: Arc<Manager>,
}

impl AppsService {
    pub fn new(store: Arc<dyn Store>, manager: Arc<Manager>) -> Self {
        Self { store, manager }
    }

    #[instrument(skip(self, name), fields(app = %name))]
    pub async fn create(&self, name: AppName) -> Result<App> {
        let app = App::new(name);
        self.store.apps_create(&app).await?;
        info!("Created app");
        Ok(app)
    }

    pub async fn find(&self, name: &AppName) -> Result<App> {
        self.store
            .apps_find(name)
            .await?
            .ok_or_else(|| Error::not_found("app", name))
    }

    pub async fn all(&self) -> Result<Vec<App>> {
        Ok(self.store.apps_all().await?)
    }

    /// Stops every job of the app, then deletes it with its configs,
    /// releases and active formation.
    ///
    /// If a job cannot be stopped the app is kept.
    #[instrument(skip(self, name), fields(app = %name))]
    pub async fn destroy(&self, name: &AppName) -> Result<()> {
        let app = self.find(name).await?;
        let stopped = self.manager.unschedule_app(&app.name).await?;

        if !self.store.apps_destroy(&app.name).await? {
            return Err(Error::not_found("app", name));
        }

        info!(stopped = stopped.len(), "Destroyed app");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::manager::ManagerConfig;
    use crate::scheduler::FakeScheduler;

    fn service() -> AppsService {
        let store = Arc::new(MemoryStore::new());
        let manager = Manager::new(
            store.clone(),
            Arc::new(FakeScheduler::new()),
            ManagerConfig::default(),
        );
        AppsService::new(store, Arc::new(manager))
    }

    #[tokio::test]
    async fn test_create_find_destroy() {
        let apps = service();
        let name = AppName::parse("web-app").unwrap();

        apps.create(name.clone()).await.unwrap();
        assert!(matches!(
            apps.create(name.clone()).await,
            Err(Error::Conflict(_))
        ));
        assert_eq!(apps.all().await.unwrap().len(), 1);

        apps.destroy(&name).await.unwrap();
        assert!(matches!(
            apps.find(&name).await,
            Err(Error::NotFound { kind: "app", .. })
        ));
        assert!(apps.destroy(&name).await.is_err());
    }
}
