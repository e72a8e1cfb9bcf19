//! Writes a self-signed TLS certificate for the API server.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use log::info;

use absensi::utils::tls::{generate_self_signed, server_config_from_pem};

#[derive(Parser)]
#[command(name = "absensi-cert", about = "Generate a self-signed TLS certificate")]
struct Args {
    /// Directory receiving server.crt and server.key
    #[arg(long, default_value = "certs")]
    out_dir: PathBuf,
    /// DNS name or IP address; repeat for more
    #[arg(long = "host", default_values_t = ["localhost".to_string(), "127.0.0.1".to_string()])]
    hosts: Vec<String>,
    #[arg(long, default_value_t = 825)]
    days: i64,
    /// Replace existing files
    #[arg(long, default_value_t = false)]
    force: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cert_path = args.out_dir.join("server.crt");
    let key_path = args.out_dir.join("server.key");

    if !args.force && (cert_path.exists() || key_path.exists()) {
        bail!(
            "{} already holds a certificate; pass --force to replace it",
            args.out_dir.display()
        );
    }

    let pem = generate_self_signed(&args.hosts, Utc::now().date_naive(), args.days)?;
    // the server must accept what we write
    server_config_from_pem(pem.cert.as_bytes(), pem.key.as_bytes())?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("cannot create {}", args.out_dir.display()))?;
    fs::write(&cert_path, &pem.cert)
        .with_context(|| format!("cannot write {}", cert_path.display()))?;
    fs::write(&key_path, &pem.key)
        .with_context(|| format!("cannot write {}", key_path.display()))?;

    info!(
        "Certificate for {} valid {} days written to {}",
        args.hosts.join(", "),
        args.days,
        args.out_dir.display()
    );
    info!(
        "Set TLS_CERT_PATH={} and TLS_KEY_PATH={} to serve HTTPS",
        cert_path.display(),
        key_path.display()
    );
    Ok(())
}
