//! Postgres [`Store`].

use std::fmt::Display;
use std::str::FromStr;

use armada_id::{AppName, ConfigId, FormationSeq, ReleaseVersion, SlugId};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{info, instrument};

use super::{DbConfig, DbError, DbResult, Store};
use crate::formation::{ActiveFormation, Formation, StampedFormation};
use crate::jobs::JobId;
use crate::model::{App, AppConfig, Image, ProcessCommands, Release, Slug, Vars};

const RELEASE_COLUMNS: &str =
    "id, app_name, version, config_id, slug_id, formation, description, created_at";

/// [`Store`] backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        info!("Database connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }

    /// Run pending migrations.
    ///
    /// Migrations are loaded at runtime from the first directory that exists:
    /// `./migrations`, `services/control-plane/migrations`, or the crate's own
    /// `migrations` directory.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");

        let candidates = [
            std::path::PathBuf::from("./migrations"),
            std::path::PathBuf::from("services/control-plane/migrations"),
            std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
        ];
        let mut last_error: Option<sqlx::migrate::MigrateError> = None;

        for dir in &candidates {
            match sqlx::migrate::Migrator::new(dir.clone()).await {
                Ok(migrator) => {
                    info!(migrations_dir = %dir.display(), "Loaded migrations");
                    migrator.run(&self.pool).await.map_err(DbError::Migration)?;
                    info!("Database migrations complete");
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        let tried = candidates
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        Err(DbError::MigrationDirNotFound {
            tried,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    async fn fetch_releases(&self, sql: &str, app: &AppName) -> DbResult<Vec<Release>> {
        let rows = sqlx::query(sql)
            .bind(app.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;
        rows.iter().map(release_from_row).collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn apps_create(&self, app: &App) -> DbResult<()> {
        sqlx::query("INSERT INTO apps (name, created_at) VALUES ($1, $2)")
            .bind(app.name.as_str())
            .bind(app.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from_query(e, || format!("app '{}' already exists", app.name)))?;
        Ok(())
    }

    async fn apps_find(&self, name: &AppName) -> DbResult<Option<App>> {
        let row = sqlx::query("SELECT name, created_at FROM apps WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)?;
        row.as_ref().map(app_from_row).transpose()
    }

    async fn apps_all(&self) -> DbResult<Vec<App>> {
        let rows = sqlx::query("SELECT name, created_at FROM apps ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;
        rows.iter().map(app_from_row).collect()
    }

    #[instrument(skip(self, name), fields(app = %name))]
    async fn apps_destroy(&self, name: &AppName) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM apps WHERE name = $1")
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(result.rows_affected() > 0)
    }

    async fn configs_create(&self, config: &AppConfig) -> DbResult<()> {
        sqlx::query("INSERT INTO configs (id, app_name, vars, created_at) VALUES ($1, $2, $3, $4)")
            .bind(config.id.to_string())
            .bind(config.app.as_str())
            .bind(Json(&config.vars))
            .bind(config.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from_query(e, || format!("config {} already exists", config.id)))?;
        Ok(())
    }

    async fn configs_find(&self, id: &ConfigId) -> DbResult<Option<AppConfig>> {
        let row = sqlx::query("SELECT id, app_name, vars, created_at FROM configs WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)?;
        row.as_ref().map(config_from_row).transpose()
    }

    async fn configs_latest(&self, app: &AppName) -> DbResult<Option<AppConfig>> {
        let row = sqlx::query(
            "SELECT id, app_name, vars, created_at FROM configs \
             WHERE app_name = $1 ORDER BY position DESC LIMIT 1",
        )
        .bind(app.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;
        row.as_ref().map(config_from_row).transpose()
    }

    async fn slugs_create(&self, slug: &Slug) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO slugs (id, image_repo, image_tag, process_types) VALUES ($1, $2, $3, $4)",
        )
        .bind(slug.id.to_string())
        .bind(&slug.image.repo)
        .bind(&slug.image.tag)
        .bind(Json(&slug.process_types))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::from_query(e, || format!("slug for image {} already exists", slug.image))
        })?;
        Ok(())
    }

    async fn slugs_find(&self, id: &SlugId) -> DbResult<Option<Slug>> {
        let row = sqlx::query(
            "SELECT id, image_repo, image_tag, process_types FROM slugs WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;
        row.as_ref().map(slug_from_row).transpose()
    }

    async fn slugs_find_by_image(&self, image: &Image) -> DbResult<Option<Slug>> {
        let row = sqlx::query(
            "SELECT id, image_repo, image_tag, process_types FROM slugs \
             WHERE image_repo = $1 AND image_tag = $2",
        )
        .bind(&image.repo)
        .bind(&image.tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;
        row.as_ref().map(slug_from_row).transpose()
    }

    #[instrument(skip(self, release), fields(app = %release.app, version = %release.version))]
    async fn releases_create(&self, release: &Release) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO releases \
             (id, app_name, version, config_id, slug_id, formation, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(release.id.to_string())
        .bind(release.app.as_str())
        .bind(i64::from(release.version.value()))
        .bind(release.config_id.to_string())
        .bind(release.slug_id.to_string())
        .bind(Json(&release.formation))
        .bind(&release.description)
        .bind(release.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::from_query(e, || {
                format!("release {} of '{}' already exists", release.version, release.app)
            })
        })?;
        Ok(())
    }

    async fn releases_find_by_app(&self, app: &AppName) -> DbResult<Vec<Release>> {
        let sql = format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE app_name = $1 ORDER BY version DESC"
        );
        self.fetch_releases(&sql, app).await
    }

    async fn releases_find_by_app_and_version(
        &self,
        app: &AppName,
        version: ReleaseVersion,
    ) -> DbResult<Option<Release>> {
        let sql =
            format!("SELECT {RELEASE_COLUMNS} FROM releases WHERE app_name = $1 AND version = $2");
        let row = sqlx::query(&sql)
            .bind(app.as_str())
            .bind(i64::from(version.value()))
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)?;
        row.as_ref().map(release_from_row).transpose()
    }

    async fn releases_last(&self, app: &AppName) -> DbResult<Option<Release>> {
        let sql = format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE app_name = $1 \
             ORDER BY version DESC LIMIT 1"
        );
        Ok(self.fetch_releases(&sql, app).await?.into_iter().next())
    }

    async fn formation_find(&self, app: &AppName) -> DbResult<Option<StampedFormation>> {
        let row = sqlx::query(
            "SELECT app_name, release_version, formation, jobs, seq FROM formations \
             WHERE app_name = $1",
        )
        .bind(app.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;
        row.as_ref().map(formation_from_row).transpose()
    }

    #[instrument(
        skip(self, active, expected),
        fields(app = %active.app, expected = expected.map(|s| s.value()))
    )]
    async fn formation_update(
        &self,
        active: &ActiveFormation,
        expected: Option<FormationSeq>,
    ) -> DbResult<FormationSeq> {
        let conflict = || format!("formation of '{}' changed concurrently", active.app);
        let next = expected.map_or(FormationSeq::FIRST, |seq| seq.next());

        let query = match expected {
            None => sqlx::query(
                "INSERT INTO formations (app_name, release_version, formation, jobs, seq) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (app_name) DO NOTHING",
            ),
            Some(_) => sqlx::query(
                "UPDATE formations SET release_version = $2, formation = $3, jobs = $4, \
                 seq = $5, updated_at = now() WHERE app_name = $1 AND seq = $6",
            ),
        };

        let query = query
            .bind(active.app.as_str())
            .bind(i64::from(active.release_version.value()))
            .bind(Json(&active.formation))
            .bind(Json(&active.jobs))
            .bind(next.value());
        let query = match expected {
            Some(seq) => query.bind(seq.value()),
            None => query,
        };

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from_query(e, conflict))?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(conflict()));
        }
        Ok(next)
    }

    async fn reset(&self) -> DbResult<()> {
        sqlx::query("TRUNCATE apps, configs, slugs, releases, formations CASCADE")
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(())
    }
}

fn app_from_row(row: &PgRow) -> DbResult<App> {
    Ok(App {
        name: app_name(row, "name")?,
        created_at: row.try_get("created_at").map_err(DbError::Query)?,
    })
}

fn config_from_row(row: &PgRow) -> DbResult<AppConfig> {
    let vars: Json<Vars> = row.try_get("vars").map_err(DbError::Query)?;
    Ok(AppConfig {
        id: parsed(row, "id")?,
        app: app_name(row, "app_name")?,
        vars: vars.0,
        created_at: row.try_get("created_at").map_err(DbError::Query)?,
    })
}

fn slug_from_row(row: &PgRow) -> DbResult<Slug> {
    let process_types: Json<ProcessCommands> =
        row.try_get("process_types").map_err(DbError::Query)?;
    Ok(Slug {
        id: parsed(row, "id")?,
        image: Image {
            repo: row.try_get("image_repo").map_err(DbError::Query)?,
            tag: row.try_get("image_tag").map_err(DbError::Query)?,
        },
        process_types: process_types.0,
    })
}

fn release_from_row(row: &PgRow) -> DbResult<Release> {
    let formation: Json<Formation> = row.try_get("formation").map_err(DbError::Query)?;
    Ok(Release {
        id: parsed(row, "id")?,
        app: app_name(row, "app_name")?,
        version: version(row, "version")?,
        config_id: parsed(row, "config_id")?,
        slug_id: parsed(row, "slug_id")?,
        formation: formation.0,
        description: row.try_get("description").map_err(DbError::Query)?,
        created_at: row.try_get("created_at").map_err(DbError::Query)?,
    })
}

fn formation_from_row(row: &PgRow) -> DbResult<StampedFormation> {
    let formation: Json<Formation> = row.try_get("formation").map_err(DbError::Query)?;
    let jobs: Json<std::collections::BTreeSet<JobId>> =
        row.try_get("jobs").map_err(DbError::Query)?;
    let seq: i64 = row.try_get("seq").map_err(DbError::Query)?;

    Ok(StampedFormation {
        active: ActiveFormation {
            app: app_name(row, "app_name")?,
            release_version: version(row, "release_version")?,
            formation: formation.0,
            jobs: jobs.0,
        },
        seq: FormationSeq::new(seq),
    })
}

fn app_name(row: &PgRow, column: &str) -> DbResult<AppName> {
    parsed_with(row, column, AppName::parse)
}

fn version(row: &PgRow, column: &str) -> DbResult<ReleaseVersion> {
    let raw: i64 = row.try_get(column).map_err(DbError::Query)?;
    u32::try_from(raw)
        .map(ReleaseVersion::new)
        .map_err(|_| DbError::Corrupt(format!("{column}: {raw} is out of range")))
}

fn parsed<T>(row: &PgRow, column: &str) -> DbResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    parsed_with(row, column, str::parse::<T>)
}

fn parsed_with<T, E: Display>(
    row: &PgRow,
    column: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> DbResult<T> {
    let raw: String = row.try_get(column).map_err(DbError::Query)?;
    parse(&raw).map_err(|e| DbError::Corrupt(format!("{column} '{raw}': {e}")))
}
