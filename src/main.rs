use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use courier::{
    ClientConfiguration, ClientFactory, CodecRegistry, FileConfigSource, HttpTransportBuilder,
    Invocation, LoggingInterceptor, StaticInterceptorRegistry,
    config::{ClientConfigValidator, client::DEFAULT_PROPERTY_PREFIX, loader::load_properties},
    metrics,
    ports::config_source::ConfigurationSource,
    tracing_setup,
    utils::refresh::{DEFAULT_DEBOUNCE, spawn_config_refresh},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Commands,

    /// Log filter, e.g. `info` or `courier=debug`; `RUST_LOG` applies when omitted
    #[clap(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON logs instead of console output
    #[clap(long, global = true)]
    json_logs: bool,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate every client block of a property file
    Validate {
        /// Property file to validate
        #[clap(short, long, default_value = "clients.toml")]
        config: String,
    },
    /// Initialize a new property file
    Init {
        /// Output path for the new property file
        #[clap(short, long, default_value = "clients.toml")]
        config: String,
    },
    /// Print the effective settings of one client
    Show {
        #[clap(short, long, default_value = "clients.toml")]
        config: String,
        /// Client identifier
        client: String,
    },
    /// Send one message through a client and print the reply
    Invoke {
        #[clap(short, long, default_value = "clients.toml")]
        config: String,
        /// Client identifier
        client: String,
        /// JSON payload placed in the message body
        #[clap(short, long, default_value = "{}")]
        payload: String,
        /// SOAP action sent with the request
        #[clap(short, long)]
        action: Option<String>,
        /// Target URI, overriding the configured endpoint
        #[clap(short, long)]
        uri: Option<String>,
    },
    /// Build every configured client and keep them in step with the file until Ctrl-C
    Watch {
        #[clap(short, long, default_value = "clients.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Commands::Validate { config } => validate_config_command(&config).await,
        Commands::Init { config } => init_config_command(&config).await,
        Commands::Show { config, client } => show_client_command(&config, &client).await,
        Commands::Invoke {
            config,
            client,
            payload,
            action,
            uri,
        } => {
            init_logging(args.log_level.as_deref(), args.json_logs, false)?;
            invoke_command(&config, &client, &payload, action, uri).await
        }
        Commands::Watch { config } => {
            init_logging(args.log_level.as_deref(), args.json_logs, true)?;
            metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;
            watch_command(&config).await
        }
    }
}

fn init_logging(level: Option<&str>, json_logs: bool, include_spans: bool) -> Result<()> {
    match (level, json_logs) {
        (Some(level), _) => tracing_setup::init_tracing_with_config(level, json_logs, include_spans),
        (None, true) => tracing_setup::init_tracing(),
        (None, false) => tracing_setup::init_console_tracing(),
    }
}

fn create_factory(source: Arc<FileConfigSource>) -> ClientFactory {
    let interceptors =
        StaticInterceptorRegistry::default().with(Arc::new(LoggingInterceptor::new()));
    ClientFactory::new(
        source,
        Arc::new(CodecRegistry::with_builtin()),
        Arc::new(interceptors),
        Arc::new(HttpTransportBuilder::new()),
    )
}

/// Client identifiers declared under the default property prefix.
fn configured_clients(source: &FileConfigSource) -> Vec<String> {
    source
        .group(DEFAULT_PROPERTY_PREFIX)
        .map(|group| group.sections())
        .unwrap_or_default()
}

/// Validate every client block in a property file
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating property file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Property file '{config_path}' not found");
        std::process::exit(1);
    }

    let root = match load_properties(config_path).await {
        Ok(root) => {
            println!("✅ Property parsing: OK ({} keys)", root.len());
            root
        }
        Err(e) => {
            eprintln!("❌ Property parsing failed:");
            eprintln!("   {e:?}");
            std::process::exit(1);
        }
    };

    let Some(clients) = root.break_out(DEFAULT_PROPERTY_PREFIX) else {
        println!("⚠️  No client blocks found under '{DEFAULT_PROPERTY_PREFIX}'");
        return Ok(());
    };

    let mut failures = 0;
    for id in clients.sections() {
        let group = clients.break_out(&id);
        let config = match ClientConfiguration::from_group(group.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ {id}: {e}");
                failures += 1;
                continue;
            }
        };
        let errors = ClientConfigValidator::collect_errors(&config);
        if errors.is_empty() {
            println!(
                "✅ {id}: endpoint={}, security={}, proxy={}",
                config.endpoint().unwrap_or("-"),
                config.is_security_enabled(),
                config.is_proxy_enabled()
            );
        } else {
            eprintln!("❌ {id}:");
            eprintln!("{}", ClientConfigValidator::format_multiple_errors(&errors));
            failures += 1;
        }
    }

    if failures > 0 {
        println!();
        println!("💡 Common fixes:");
        println!("   • Ensure endpoints start with http:// or https://");
        println!("   • Give proxy.port whenever proxy.host is set");
        println!("   • Use millisecond integers for timeouts");
        println!("   • password_type must be one of None, Text, Digest");
        std::process::exit(1);
    }

    println!();
    println!("🎉 Property file is valid and ready to use!");
    Ok(())
}

/// Initialize a new property file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Property file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Courier client properties
# Every client reads the keys below soapclient.def.<client id>.

[soapclient.def.billing]
endpoint = "http://localhost:8080/billing"
connect_timeout = 1000
connect_request_timeout = 1000
read_timeout = 10000
disable_cookies = false

[soapclient.def.billing.pool]
max_total_connections = 80
max_route_connections = 20
idle_timeout = 10000

# [soapclient.def.billing.security]
# actions = "UsernameToken Timestamp"
# username = "svc-billing"
# password = "change-me"
# password_type = "Digest"
# must_understand = true
# time_to_live = 300

# [soapclient.def.billing.proxy]
# host = "proxy.internal"
# port = 3128
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write property file")?;
    println!("✅ Created default property file at: {config_path}");
    println!("   Run 'courier validate --config {config_path}' to check it");
    Ok(())
}

async fn show_client_command(config_path: &str, client: &str) -> Result<()> {
    let source = Arc::new(
        FileConfigSource::without_watch(config_path)
            .with_context(|| format!("Failed to load {config_path}"))?,
    );
    let factory = create_factory(source);
    let (config, group) = factory
        .resolve_configuration(client)
        .await
        .with_context(|| format!("Failed to resolve client '{client}'"))?;

    if group.is_none() {
        eprintln!("⚠️  No properties found for '{client}', showing defaults");
    }
    let rendered = serde_json::to_string_pretty(&config.effective())
        .context("Failed to render settings")?;
    println!("{rendered}");
    Ok(())
}

async fn invoke_command(
    config_path: &str,
    client: &str,
    payload: &str,
    action: Option<String>,
    uri: Option<String>,
) -> Result<()> {
    let source = Arc::new(
        FileConfigSource::without_watch(config_path)
            .with_context(|| format!("Failed to load {config_path}"))?,
    );
    let factory = create_factory(source);

    let body: serde_json::Value =
        serde_json::from_str(payload).context("Payload is not valid JSON")?;
    let mut invocation = Invocation::new(body);
    if let Some(action) = action {
        invocation = invocation.with_soap_action(action);
    }
    if let Some(uri) = uri {
        invocation = invocation.to(uri);
    }

    let reply = factory
        .invoke_with(client, invocation)
        .await
        .with_context(|| format!("Call through client '{client}' failed"))?;
    let rendered = serde_json::to_string_pretty(&reply).context("Failed to render reply")?;
    println!("{rendered}");
    Ok(())
}

async fn watch_command(config_path: &str) -> Result<()> {
    tracing::info!("Loading client properties from {config_path}");
    let source = Arc::new(
        FileConfigSource::new(config_path)
            .with_context(|| format!("Failed to load {config_path}"))?,
    );
    let factory = Arc::new(create_factory(source.clone()));

    for id in configured_clients(&source) {
        if let Err(e) = factory.get_client(&id).await {
            tracing::error!("Client '{}' could not be built: {}", id, e);
        }
    }
    tracing::info!(clients = ?factory.cached_ids().await, "Clients ready");

    let refresh_handle = spawn_config_refresh(source, factory.clone(), DEFAULT_DEBOUNCE)
        .ok_or_else(|| eyre!("Change notifications already consumed"))?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested, stopping config refresh");
    refresh_handle.abort();
    let dropped = factory.invalidate_all().await;
    tracing::info!("Released {} clients", dropped);
    Ok(())
}
