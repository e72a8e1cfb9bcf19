//! Walks the attendance contract against a running server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use log::info;

use absensi::api::attendance::PunchReq;
use absensi::client::{ApiClient, ClientError, SessionStore};

/// 1x1 PNG used when no photo file is given.
const SAMPLE_PHOTO: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

#[derive(Parser)]
#[command(name = "absensi-smoke", about = "Smoke test the absensi API")]
struct Args {
    #[arg(long, env = "ABSENSI_BASE_URL", default_value = "http://127.0.0.1:8080")]
    base_url: String,
    #[arg(long, env = "ABSENSI_USERNAME")]
    username: String,
    #[arg(long, env = "ABSENSI_PASSWORD")]
    password: String,
    /// Must fall inside an outlet geofence.
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,
    /// JPEG or PNG sent as the selfie.
    #[arg(long)]
    photo: Option<PathBuf>,
    /// Stop after the duplicate check-in step.
    #[arg(long, default_value_t = false)]
    skip_check_out: bool,
}

fn load_photo(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(STANDARD.encode(bytes))
        }
        None => Ok(SAMPLE_PHOTO.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = ApiClient::new(&args.base_url, Arc::new(SessionStore::new()))?;

    let user = client.login(&args.username, &args.password).await?;
    info!("[1/6] logged in as {} (id {})", user.username, user.id);

    let today = client.today().await?;
    info!(
        "[2/6] today {}: status {}, checked in {}",
        today.date, today.status, today.has_checked_in
    );
    if today.has_checked_in {
        bail!("{} already has a check-in today; use a fresh account", user.username);
    }

    let punch = PunchReq {
        latitude: args.lat,
        longitude: args.lon,
        photo: Some(load_photo(args.photo.as_ref())?),
        outlet_id: None,
        note: Some("smoke test".to_string()),
    };

    let day = client.check_in(&punch).await?;
    info!(
        "[3/6] checked in, status {} ({} min late)",
        day.status, day.late_minutes
    );

    match client.check_in(&punch).await {
        Err(ClientError::Api { code, .. }) if code == "ALREADY_CHECKED_IN" => {
            info!("[4/6] duplicate check-in rejected with {code}");
        }
        Err(e) => bail!("duplicate check-in failed with an unexpected error: {e}"),
        Ok(_) => bail!("duplicate check-in was accepted"),
    }

    if args.skip_check_out {
        info!("[5/6] check-out skipped");
    } else {
        let day = client.check_out(&punch).await?;
        info!("[5/6] checked out after {} min", day.worked_minutes);
    }

    let unread = client.unread_count().await?;
    info!("[6/6] {unread} unread notifications");

    client.logout().await?;
    info!("smoke test passed");
    Ok(())
}
