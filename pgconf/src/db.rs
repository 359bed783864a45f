use std::path::Path;

use bb8_postgres::PostgresConnectionManager;
use refinery::{Migration, Runner};
use tokio_postgres::NoTls;

use crate::config::ConnectionConfig;
use crate::error::DbError;

pub type Pool = bb8::Pool<PostgresConnectionManager<NoTls>>;

/// Client settings for the config. Unset fields are left to the client defaults.
pub fn pg_config(conf: &ConnectionConfig) -> tokio_postgres::Config {
    let mut pg = tokio_postgres::Config::new();
    pg.port(conf.port().get())
        .application_name(env!("CARGO_PKG_NAME"));
    if let Some(host) = conf.host() {
        pg.host(host);
    }
    if let Some(user) = conf.username() {
        pg.user(user);
    }
    if let Some(password) = conf.password() {
        pg.password(password.expose_secret());
    }
    if let Some(database) = conf.database() {
        pg.dbname(database);
    }
    pg
}

pub async fn pool(conf: &ConnectionConfig) -> Result<Pool, DbError> {
    let mgr = PostgresConnectionManager::new(pg_config(conf), NoTls);
    let pool = bb8::Pool::builder().build(mgr).await?;
    log::info!("Connection pool ready for {}", conf.connection_url());
    Ok(pool)
}

/// Open the pool the way the application does at startup.
///
/// With schema synchronization on, pending migrations under `root` are applied
/// before the pool is handed out.
pub async fn init(conf: &ConnectionConfig, root: &Path) -> Result<Pool, DbError> {
    let pool = pool(conf).await?;
    if conf.synchronize() {
        log::warn!(
            "Schema synchronization is enabled, applying migrations from {}",
            root.join(conf.migrations_dir()).display()
        );
        migrate(conf, &pool, root).await?;
    }
    Ok(pool)
}

pub async fn check(pool: &Pool) -> Result<(), DbError> {
    let conn = pool.get().await?;
    conn.simple_query("SELECT 1").await?;
    Ok(())
}

/// SQL migrations found under `dir`, ordered by version.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>, DbError> {
    let mut migrations = refinery::load_sql_migrations(dir)?;
    migrations.sort();
    Ok(migrations)
}

/// Apply pending migrations from the project at `root`, returning how many ran.
pub async fn migrate(conf: &ConnectionConfig, pool: &Pool, root: &Path) -> Result<usize, DbError> {
    let migrations = load_migrations(&root.join(conf.migrations_dir()))?;
    let mut client = pool.dedicated_connection().await?;

    log::info!("Running {} migration(s)", migrations.len());
    let report = Runner::new(&migrations).run_async(&mut client).await?;

    let applied = report.applied_migrations().len();
    for migration in report.applied_migrations() {
        log::info!("Applied {}", migration);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::build_config_from;
    use std::fs;
    use tokio_postgres::config::Host;

    fn env(pairs: &[(&str, &str)]) -> ConnectionConfig {
        build_config_from(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    fn conf() -> ConnectionConfig {
        env(&[
            ("POSTGRES_HOST", "db.internal"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_USER", "app"),
            ("POSTGRES_PASSWORD", "s3cret"),
            ("POSTGRES_DATABASE", "app_dev"),
        ])
    }

    fn write_migrations(dir: &Path, files: &[&str]) {
        for file in files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "SELECT 1;").unwrap();
        }
    }

    #[test]
    fn test_pg_config_matches_connection_config() {
        let pg = pg_config(&conf());
        assert_eq!(pg.get_hosts(), &[Host::Tcp("db.internal".to_string())]);
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(pg.get_user(), Some("app"));
        assert_eq!(pg.get_password(), Some(&b"s3cret"[..]));
        assert_eq!(pg.get_dbname(), Some("app_dev"));
    }

    #[test]
    fn test_pg_config_leaves_unset_fields_out() {
        let pg = pg_config(&env(&[("POSTGRES_PORT", "5432")]));
        assert!(pg.get_hosts().is_empty());
        assert_eq!(pg.get_ports(), &[5432]);
        assert_eq!(pg.get_user(), None);
        assert_eq!(pg.get_password(), None);
        assert_eq!(pg.get_dbname(), None);
    }

    #[test]
    fn test_load_migrations_ordered_by_version() {
        let dir = tempfile::tempdir().unwrap();
        write_migrations(
            dir.path(),
            &["V10__ten.sql", "V2__two.sql", "nested/V3__three.sql"],
        );

        let migrations = load_migrations(dir.path()).unwrap();
        let versions: Vec<_> = migrations.iter().map(|m| m.version()).collect();
        assert_eq!(versions, vec![2, 3, 10]);
        let names: Vec<&str> = migrations.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["two", "three", "ten"]);
    }

    #[test]
    fn test_load_migrations_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        write_migrations(dir.path(), &["V1__initial.sql", "initial.sql", "README.md"]);

        let migrations = load_migrations(dir.path()).unwrap();
        let names: Vec<&str> = migrations.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["initial"]);
    }

    #[test]
    fn test_load_migrations_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_migrations(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, DbError::Migration(_)));
    }

    // Building the pool opens no connection, so a missing migrations dir is
    // reported before any database is needed.
    #[tokio::test]
    async fn test_init_resolves_migrations_under_root() {
        let root = tempfile::tempdir().unwrap();
        let err = init(&conf(), root.path()).await.unwrap_err();
        assert!(matches!(err, DbError::Migration(_)));
    }

    #[tokio::test]
    #[ignore = "needs a running Postgres configured through POSTGRES_* variables"]
    async fn test_check_against_live_database() {
        let conf = crate::config::build_config().unwrap();
        let pool = pool(&conf).await.unwrap();
        check(&pool).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a running Postgres configured through POSTGRES_* variables"]
    async fn test_init_applies_migrations_once() {
        let conf = crate::config::build_config().unwrap();
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(conf.migrations_dir());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("V1__pgconf_init_check.sql"),
            "CREATE TABLE IF NOT EXISTS pgconf_init_check (id int);",
        )
        .unwrap();

        let pool = init(&conf, root.path()).await.unwrap();
        check(&pool).await.unwrap();
        assert_eq!(migrate(&conf, &pool, root.path()).await.unwrap(), 0);
    }
}
