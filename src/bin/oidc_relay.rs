use oidc_relay::config::{RelayConfig, RelayConfigBuilder};
use oidc_relay::server::build_server;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "OIDC_RELAY_CONFIG";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // --- Load Configuration: argv[1], then $OIDC_RELAY_CONFIG, then defaults ---
    let config_path = std::env::args().nth(1).or_else(|| std::env::var(CONFIG_ENV).ok());
    let config = match config_path {
        Some(path) => {
            info!("Loading relay configuration from {}", path);
            RelayConfig::from_yaml_file(&path)?
        }
        None => {
            info!("No configuration file given; reading the issuer from OIDC_SERVER");
            RelayConfigBuilder::new().build()?
        }
    };

    info!(
        "Issuer source: {:?}, userinfo method: {:?}, status policy: {:?}",
        config.issuer_source, config.userinfo_method, config.status_policy
    );

    let server = build_server(config)?;
    server.run_forever();
}
