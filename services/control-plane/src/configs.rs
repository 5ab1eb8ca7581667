//! Configs: immutable sets of environment variables.

use std::sync::Arc;

use armada_id::ConfigId;
use tracing::{debug, info, instrument};

use crate::db::Store;
use crate::error::{Error, Result};
use crate::model::{App, AppConfig, Vars, VarsUpdate};

/// Reads and changes app configs.
pub struct ConfigsService {
    store: Arc<dyn Store>,
}

impl ConfigsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The app's latest config. An app without one gets an empty config.
    #[instrument(skip(self, app), fields(app = %app.name))]
    pub async fn current(&self, app: &App) -> Result<AppConfig> {
        if let Some(config) = self.store.configs_latest(&app.name).await? {
            return Ok(config);
        }

        let config = AppConfig::new(app.name.clone(), Vars::new());
        self.store.configs_create(&config).await?;
        debug!(config_id = %config.id, "Created initial config");
        Ok(config)
    }

    pub async fn find(&self, id: &ConfigId) -> Result<AppConfig> {
        self.store
            .configs_find(id)
            .await?
            .ok_or_else(|| Error::not_found("config", id))
    }

    /// Creates a new config with `update` applied to the current one.
    #[instrument(skip(self, app, update), fields(app = %app.name, changes = update.len()))]
    pub async fn apply(&self, app: &App, update: &VarsUpdate) -> Result<AppConfig> {
        for key in update.keys() {
            validate_var_name(key)?;
        }

        let current = self.current(app).await?;
        let config = AppConfig::new(app.name.clone(), current.apply(update));
        self.store.configs_create(&config).await?;

        info!(config_id = %config.id, vars = config.vars.len(), "Applied config change");
        Ok(config)
    }
}

fn validate_var_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('=') || name.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!("invalid variable name '{name}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use armada_id::AppName;

    async fn setup() -> (ConfigsService, App) {
        let store = Arc::new(MemoryStore::new());
        let app = App::new(AppName::parse("web-app").unwrap());
        store.apps_create(&app).await.unwrap();
        (ConfigsService::new(store), app)
    }

    #[tokio::test]
    async fn test_current_creates_empty_config_once() {
        let (configs, app) = setup().await;
        let first = configs.current(&app).await.unwrap();
        let again = configs.current(&app).await.unwrap();
        assert!(first.vars.is_empty());
        assert_eq!(first.id, again.id);
    }

    #[tokio::test]
    async fn test_apply_creates_new_config() {
        let (configs, app) = setup().await;
        let before = configs.current(&app).await.unwrap();

        let update = VarsUpdate::from([("PORT".to_string(), Some("8080".to_string()))]);
        let after = configs.apply(&app, &update).await.unwrap();
        assert_ne!(before.id, after.id);
        assert_eq!(after.vars.get("PORT").map(String::as_str), Some("8080"));

        let removed = configs
            .apply(&app, &VarsUpdate::from([("PORT".to_string(), None)]))
            .await
            .unwrap();
        assert!(removed.vars.is_empty());
        assert_eq!(configs.current(&app).await.unwrap().id, removed.id);
        // Earlier configs are untouched.
        assert_eq!(configs.find(&after.id).await.unwrap().vars.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_rejects_bad_names() {
        let (configs, app) = setup().await;
        let update = VarsUpdate::from([("A=B".to_string(), Some("1".to_string()))]);
        assert!(matches!(
            configs.apply(&app, &update).await,
            Err(Error::Validation(_))
        ));
    }
}
