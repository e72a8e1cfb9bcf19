//! Makes sure the attendance database exists and is migrated.

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{Connection, MySqlConnection};

#[derive(Parser)]
#[command(name = "absensi-db", about = "Create and migrate the absensi database")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    /// Only report whether the database exists.
    #[arg(long, default_value_t = false)]
    check: bool,
    #[arg(long, default_value_t = false)]
    skip_migrations: bool,
}

/// Splits `mysql://u:p@host:3306/name?opts` into the server URL and `name`.
fn split_database_url(url: &str) -> Result<(String, String)> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let authority_start = base.find("://").map(|i| i + 3).unwrap_or(0);
    let Some(slash) = base[authority_start..].rfind('/').map(|i| i + authority_start) else {
        bail!("DATABASE_URL has no database name");
    };
    let name = &base[slash + 1..];
    if name.is_empty() {
        bail!("DATABASE_URL has no database name");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("unsupported database name `{name}`");
    }

    let mut server = base[..slash].to_string();
    if let Some(query) = query {
        server.push('?');
        server.push_str(query);
    }
    Ok((server, name.to_string()))
}

async fn database_exists(conn: &mut MySqlConnection, name: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = ?",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;
    Ok(found > 0)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let (server_url, name) = split_database_url(&args.database_url)?;

    let mut conn = MySqlConnection::connect(&server_url)
        .await
        .context("Failed to connect to the database server")?;

    if database_exists(&mut conn, &name).await? {
        info!("Database `{name}` exists");
    } else if args.check {
        warn!("Database `{name}` does not exist");
        conn.close().await.ok();
        std::process::exit(1);
    } else {
        sqlx::query(&format!(
            "CREATE DATABASE IF NOT EXISTS `{name}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci"
        ))
        .execute(&mut conn)
        .await
        .with_context(|| format!("Failed to create database `{name}`"))?;
        info!("Database `{name}` created");
    }
    conn.close().await.ok();

    if args.check || args.skip_migrations {
        return Ok(());
    }

    let pool = MySqlPoolOptions::new()
        .max_connections(2)
        .connect(&args.database_url)
        .await
        .context("Failed to connect to the database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to apply migrations")?;
    info!("Migrations applied");
    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_server_and_database() {
        let (server, name) =
            split_database_url("mysql://absensi:secret@db:3306/absensi?ssl-mode=disabled").unwrap();
        assert_eq!(server, "mysql://absensi:secret@db:3306?ssl-mode=disabled");
        assert_eq!(name, "absensi");
    }

    #[test]
    fn rejects_missing_or_odd_names() {
        assert!(split_database_url("mysql://root@localhost:3306").is_err());
        assert!(split_database_url("mysql://root@localhost:3306/").is_err());
        assert!(split_database_url("mysql://root@localhost/abs`ensi").is_err());
    }
}
