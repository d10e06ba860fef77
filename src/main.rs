use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dapr_automation::cache::{CacheConnectParams, LocatorCredentials};
use dapr_automation::config::{AutomationConfig, DeletePolicy, LocatorConfig};
use dapr_automation::manifest::ManifestDocument;
use dapr_automation::{Error, Orchestrator};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct GlobalArgs {
    /// Kubeconfig file; inferred from the environment when unset
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Deadline for every outbound cluster call
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 180, global = true)]
    request_timeout_secs: u64,

    /// How long discovery results are cached
    #[arg(long, env = "DISCOVERY_TTL_SECS", default_value_t = 600, global = true)]
    discovery_ttl_secs: u64,

    /// Treat deletes of missing objects as already done
    #[arg(long, env = "DELETE_IGNORE_NOT_FOUND", global = true)]
    ignore_not_found: bool,

    /// State-store backend, used as `state.<backend>`
    #[arg(long, env = "CACHE_BACKEND", default_value = "redis", global = true)]
    cache_backend: String,

    /// DCS API base URL; defaults to the regional public endpoint
    #[arg(long, env = "DCS_ENDPOINT", global = true)]
    dcs_endpoint: Option<String>,

    #[arg(long, env = "DCS_PROJECT_ID", default_value = "", global = true)]
    dcs_project_id: String,

    #[arg(long, env = "DCS_REGION", default_value = "cn-north-4", global = true)]
    dcs_region: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the REST API
    Serve {
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
        listen: SocketAddr,
    },
    /// Create or patch one manifest (YAML or JSON)
    Apply {
        #[arg(short = 'f', long)]
        file: PathBuf,

        /// Override the manifest's namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Delete one object by kind and name
    Delete {
        #[arg(long)]
        kind: String,

        #[arg(long)]
        name: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Point the Dapr state store at a DCS instance
    ConnectCache(CacheArgs),
    /// Remove the Dapr state store component
    DisconnectCache,
    /// Show version and build information
    Version,
}

#[derive(clap::Args)]
struct CacheArgs {
    #[arg(long, env = "DCS_AK", hide_env_values = true)]
    ak: String,

    #[arg(long, env = "DCS_SK", hide_env_values = true)]
    sk: String,

    /// Cache password; ignored for passwordless instances
    #[arg(long, env = "DCS_CREDENTIAL", hide_env_values = true, default_value = "")]
    credential: String,

    /// Instance name; the first listed instance when omitted
    #[arg(long)]
    dcs_name: Option<String>,
}

impl std::fmt::Debug for CacheArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheArgs")
            .field("dcs_name", &self.dcs_name)
            .finish_non_exhaustive()
    }
}

impl From<CacheArgs> for CacheConnectParams {
    fn from(args: CacheArgs) -> Self {
        CacheConnectParams {
            credentials: LocatorCredentials {
                access_key: args.ak.into_bytes(),
                secret_key: args.sk.into_bytes(),
            },
            password: args.credential.into_bytes(),
            instance_name: args.dcs_name.filter(|n| !n.is_empty()),
        }
    }
}

impl GlobalArgs {
    fn config(&self) -> AutomationConfig {
        AutomationConfig {
            kubeconfig: self.kubeconfig.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            discovery_ttl: Duration::from_secs(self.discovery_ttl_secs),
            delete_policy: if self.ignore_not_found {
                DeletePolicy::IgnoreNotFound
            } else {
                DeletePolicy::Strict
            },
            cache_backend: self.cache_backend.clone(),
            locator: LocatorConfig {
                endpoint: self
                    .dcs_endpoint
                    .clone()
                    .unwrap_or_else(|| LocatorConfig::regional_endpoint(&self.dcs_region)),
                project_id: self.dcs_project_id.clone(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    if let Commands::Version = args.command {
        println!("Dapr-Automation v{}", env!("CARGO_PKG_VERSION"));
        println!("Build Date: {}", env!("BUILD_DATE"));
        println!("Git SHA: {}", env!("GIT_SHA"));
        return Ok(());
    }

    init_tracing();
    let result = run(args).await;
    dapr_automation::telemetry::shutdown_telemetry();
    result
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    // Logs go to stderr so command output on stdout stays machine-readable
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let text_layer = (!json).then(|| fmt::layer().with_target(true).with_writer(std::io::stderr));
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer);

    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let otel_layer = dapr_automation::telemetry::init_telemetry();
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let config = args.global.config();
    info!(
        "Starting Dapr-Automation v{} ({:?} request timeout, {:?} discovery TTL)",
        env!("CARGO_PKG_VERSION"),
        config.request_timeout,
        config.discovery_ttl
    );
    let orchestrator = Orchestrator::connect(&config).await?;

    match args.command {
        Commands::Serve { listen } => serve(Arc::new(orchestrator), listen).await,
        Commands::Apply { file, namespace } => {
            let raw = tokio::fs::read_to_string(&file).await.map_err(|e| {
                Error::ConfigError(format!("failed to read {}: {}", file.display(), e))
            })?;
            let doc = ManifestDocument::parse(&raw)?;
            let applied = orchestrator
                .reconciler()
                .apply(&doc, namespace.as_deref())
                .await?;
            print_json(&applied)
        }
        Commands::Delete {
            kind,
            name,
            namespace,
        } => {
            orchestrator.deleter().delete(&kind, &name, &namespace).await?;
            print_json(&serde_json::json!({
                "kind": kind,
                "name": name,
                "namespace": namespace,
                "deleted": true
            }))
        }
        Commands::ConnectCache(cache) => {
            let summary = orchestrator.connect_cache(cache.into()).await?;
            print_json(&summary)
        }
        Commands::DisconnectCache => {
            let summary = orchestrator.disconnect_cache().await?;
            print_json(&summary)
        }
        Commands::Version => Ok(()),
    }
}

#[cfg(feature = "rest-api")]
async fn serve(orchestrator: Arc<Orchestrator>, listen: SocketAddr) -> Result<(), Error> {
    dapr_automation::rest_api::run_server(orchestrator, listen).await
}

#[cfg(not(feature = "rest-api"))]
async fn serve(_orchestrator: Arc<Orchestrator>, _listen: SocketAddr) -> Result<(), Error> {
    Err(Error::ConfigError(
        "this binary was built without the rest-api feature".to_string(),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
