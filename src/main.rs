mod authority;
mod claim;
mod distance;
mod error;
#[cfg(feature = "ip-geofence")]
mod geoip;
mod handler;
mod registry;
mod signer;
mod types;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use authority::{ApiKey, Authority};
use registry::StaticRegistry;
use signer::{AttestationSigner, SigningIdentity};
use types::AppState;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the attestation server
    Serve(ServeArgs),
    /// Print the address attestations recover to
    Address(KeyArgs),
    /// Generate a new signing key
    Generate,
}

#[derive(Args)]
struct KeyArgs {
    /// hex-encoded secp256k1 private key
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,
}

#[derive(Args)]
struct ServeArgs {
    /// shared secret expected in the x-api-key header
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    #[command(flatten)]
    key: KeyArgs,

    /// server ip
    #[arg(short, long, env = "HOST", default_value = "0.0.0.0")]
    ip: String,

    /// server port
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// log level
    #[arg(long, env = "LOG_LEVEL", default_value_t = Level::INFO)]
    log_level: Level,

    /// read the client address from Forwarded/X-Forwarded-For; only behind a proxy that sets them
    #[arg(long, env = "TRUST_FORWARDED_HEADERS")]
    trust_forwarded_headers: bool,

    /// ip geolocation endpoint, enables network screening when set
    #[cfg(feature = "ip-geofence")]
    #[arg(long, env = "IP_GEOLOCATION_URL")]
    ip_geolocation_url: Option<String>,
}

fn init_tracing(level: Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")
}

fn build_authority(args: &ServeArgs) -> Result<Authority> {
    let signer = SigningIdentity::from_hex(&args.key.private_key).context("invalid private key")?;
    let api_key = ApiKey::new(args.api_key.clone()).context("api key must not be empty")?;
    let authority = Authority::new(api_key, Arc::new(StaticRegistry), Arc::new(signer));

    #[cfg(feature = "ip-geofence")]
    let authority = match &args.ip_geolocation_url {
        Some(url) => {
            info!(url = %url, "network screening enabled");
            let screen = geoip::IpApiClient::new(url.as_str())
                .context("failed to build geolocation client")?;
            authority.with_network_screen(Arc::new(screen))
        }
        None => authority,
    };

    Ok(authority)
}

async fn serve(args: ServeArgs) -> Result<()> {
    init_tracing(args.log_level)?;

    let authority = build_authority(&args)?;
    info!(signer = %authority.signer_address(), "loaded signing identity");
    if args.trust_forwarded_headers {
        info!("client address taken from forwarding headers");
    }

    let state = web::Data::new(AppState {
        authority,
        trust_forwarded_headers: args.trust_forwarded_headers,
    });
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handler::configure)
    })
    .bind((args.ip.clone(), args.port))
    .context("unable to start the server")?
    .run();
    info!(ip = %args.ip, port = args.port, "geofence attestation server running");
    server.await.context("error while running server")?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await?,
        Commands::Address(args) => {
            let signer =
                SigningIdentity::from_hex(&args.private_key).context("invalid private key")?;
            println!("{}", signer.address());
        }
        Commands::Generate => {
            let signer = SigningIdentity::generate();
            println!("private key: {}", signer.secret_hex());
            println!("address:     {}", signer.address());
        }
    }

    Ok(())
}
