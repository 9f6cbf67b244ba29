//! restgate - PostgREST-compatible REST gateway for MySQL/MariaDB
//!
//! Usage:
//!   restgate -d classicmodels -u app -p secret
//!   restgate --database-url mysql://app:secret@db:3306/classicmodels
//!   restgate -d mydb --jwt-secret s3cret --jwt-required

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use restgate_api::{build_router, serve, AppState, DatabaseUrl, GatewayConfig};
use restgate_mysql::{Catalog, Connection, PolicyEngine, PoolConfig};

#[derive(Parser, Debug)]
#[command(name = "restgate")]
#[command(about = "REST gateway that exposes a MySQL/MariaDB database as PostgREST-compatible resources", long_about = None)]
#[command(version)]
struct Args {
    /// Database host
    #[arg(long, env = "DB_HOST")]
    host: Option<String>,

    /// Database user
    #[arg(short, long, env = "DB_USER")]
    user: Option<String>,

    /// Database password
    #[arg(short, long, env = "DB_PASSWORD")]
    password: Option<String>,

    /// Database port
    #[arg(long, env = "DB_PORT")]
    port: Option<u16>,

    /// Database name
    #[arg(short, long, env = "DB_DATABASE")]
    database: Option<String>,

    /// Single connection URL; explicit options win over its parts
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// HTTP listen port
    #[arg(long, env = "PORT_NUMBER", default_value_t = 3000)]
    port_number: u16,

    /// Maximum pool connections
    #[arg(long, env = "CONNECTION_LIMIT")]
    connection_limit: Option<u32>,

    /// Symmetric bearer-token verification key
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Reject requests without a verifiable bearer token
    #[arg(long, env = "JWT_REQUIRED", default_value_t = false)]
    jwt_required: bool,

    /// Working directory for uploads and downloads
    #[arg(long, env = "STORAGE_FOLDER")]
    storage_folder: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<GatewayConfig> {
        let mut config = GatewayConfig {
            http_port: self.port_number,
            jwt_required: self.jwt_required,
            ..Default::default()
        };

        if let Some(url) = &self.database_url {
            let url = DatabaseUrl::parse(url).context("invalid --database-url")?;
            config.apply_url(&url);
        }

        // explicit options win over URL parts
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(user) = self.user {
            config.user = user;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(limit) = self.connection_limit {
            config.connection_limit = limit;
        }
        config.jwt_secret = self.jwt_secret;
        config.storage_folder = self.storage_folder;

        if config.database.is_empty() {
            anyhow::bail!("no database configured; pass --database or --database-url");
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;

    let connection = Connection::new(
        &config.connection_uri(),
        PoolConfig::with_limit(config.connection_limit),
    )
    .await
    .context("failed to open connection pool")?;

    // catalog load is fatal; the gateway is useless without schema knowledge
    let catalog = Catalog::load(connection.pool(), &config.database)
        .await
        .context("schema introspection failed")?;

    // policy failures degrade to an unrestricted gateway rather than refusing traffic
    let policies = PolicyEngine::initialize(connection.pool()).await;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!(
        database = %config.database,
        tables = catalog.table_names().len(),
        "restgate starting"
    );

    let state = AppState {
        connection,
        catalog: Arc::new(catalog),
        policies,
        config: Arc::new(config),
    };

    serve(addr, build_router(state)).await?;
    Ok(())
}
