use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use garage_core::provider::{Provider, ResourceKind};
use garage_core::resource::{Resource, ResourceId, State, Value};
use garage_core::schema::ResourceSchema;
use garage_provider::GarageProvider;
use garage_provider::config::{ProviderConfig, provider_schema};
use garage_provider::schemas;

#[derive(Parser)]
#[command(name = "garage")]
#[command(about = "Manage Garage buckets, keys, permissions and objects", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: Connection,

    /// Print sensitive attributes instead of redacting them
    #[arg(long, global = true)]
    show_sensitive: bool,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Connection {
    /// Provider block as a JSON file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Admin API endpoint (e.g. http://localhost:3903)
    #[arg(long, env = "GARAGE_ADMIN_ENDPOINT", global = true)]
    admin_endpoint: Option<String>,

    /// S3 API endpoint (e.g. http://localhost:3900), needed for objects
    #[arg(long, env = "GARAGE_S3_ENDPOINT", global = true)]
    s3_endpoint: Option<String>,

    /// Admin API bearer token
    #[arg(long, env = "GARAGE_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// S3 access key ID
    #[arg(long, env = "GARAGE_ACCESS_KEY", global = true)]
    access_key: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "GARAGE_SECRET_KEY", hide_env_values = true, global = true)]
    secret_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show resource and data source schemas
    Schema {
        /// Resource type (e.g. garage_bucket, or garage for the provider block);
        /// lists all types when omitted
        resource_type: Option<String>,
    },
    #[command(flatten)]
    Operation(Operation),
}

/// Lifecycle operations; each needs a cluster connection
#[derive(Subcommand)]
enum Operation {
    /// Refresh a resource from its cluster-side identifier
    Read {
        resource_type: String,
        identifier: String,
    },
    /// Read a data source
    Data {
        resource_type: String,
        /// Query attribute as key=value
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Create a resource
    Create {
        resource_type: String,
        /// Local name used in messages
        #[arg(long, default_value = "cli")]
        name: String,
        /// Desired attribute as key=value
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Update a resource in place
    Update {
        resource_type: String,
        identifier: String,
        /// Desired attribute as key=value
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Delete a resource
    Delete {
        resource_type: String,
        identifier: String,
    },
    /// Bring an existing object under management
    Import {
        resource_type: String,
        import_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
        Commands::Operation(operation) => {
            run_operation(operation, &cli.connection, cli.show_sensitive).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn provider_config(connection: &Connection) -> Result<ProviderConfig, String> {
    let mut config = match &connection.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            ProviderConfig::from_json(&json).map_err(|e| e.to_string())?
        }
        None => ProviderConfig::default(),
    };

    let endpoints = config.endpoints.get_or_insert_with(Default::default);
    if let Some(admin) = &connection.admin_endpoint {
        endpoints.admin = Some(admin.clone());
    }
    if let Some(s3) = &connection.s3_endpoint {
        endpoints.s3 = Some(s3.clone());
    }
    if let Some(token) = &connection.token {
        config.token = Some(token.clone());
    }
    if let Some(access_key) = &connection.access_key {
        config.access_key = Some(access_key.clone());
    }
    if let Some(secret_key) = &connection.secret_key {
        config.secret_key = Some(secret_key.clone());
    }
    Ok(config)
}

async fn connect(connection: &Connection) -> Result<GarageProvider, String> {
    let config = provider_config(connection)?
        .resolve()
        .map_err(|e| e.to_string())?;
    GarageProvider::new(&config)
        .await
        .map_err(|e| e.to_string())
}

async fn run_operation(
    operation: Operation,
    connection: &Connection,
    show_sensitive: bool,
) -> Result<(), String> {
    let provider = connect(connection).await?;
    let (state, kind) = match operation {
        Operation::Read {
            resource_type,
            identifier,
        } => {
            let state = provider
                .read(&tracked(&resource_type, &identifier))
                .await
                .map_err(|e| e.to_string())?;
            if !state.exists {
                return Err(format!("{} {} not found", resource_type, identifier));
            }
            (state, ResourceKind::Resource)
        }
        Operation::Data {
            resource_type,
            attrs,
        } => {
            let query = desired(&resource_type, "cli", &attrs)?.with_read_only(true);
            let state = provider
                .read_data_source(&query)
                .await
                .map_err(|e| e.to_string())?;
            (state, ResourceKind::DataSource)
        }
        Operation::Create {
            resource_type,
            name,
            attrs,
        } => {
            let resource = desired(&resource_type, &name, &attrs)?;
            let state = provider
                .create(&resource)
                .await
                .map_err(|e| e.to_string())?;
            (state, ResourceKind::Resource)
        }
        Operation::Update {
            resource_type,
            identifier,
            attrs,
        } => {
            let state = run_update(&provider, &resource_type, &identifier, &attrs).await?;
            (state, ResourceKind::Resource)
        }
        Operation::Delete {
            resource_type,
            identifier,
        } => {
            let prior = provider
                .read(&tracked(&resource_type, &identifier))
                .await
                .map_err(|e| e.to_string())?;
            if !prior.exists {
                println!(
                    "{}",
                    format!("{} {} already deleted.", resource_type, identifier).yellow()
                );
                return Ok(());
            }
            provider
                .delete(&prior.id, &identifier, &prior)
                .await
                .map_err(|e| e.to_string())?;
            println!(
                "{} {} {}",
                "Deleted".green().bold(),
                resource_type,
                identifier
            );
            return Ok(());
        }
        Operation::Import {
            resource_type,
            import_id,
        } => {
            let state = provider
                .import(&ResourceId::new(&resource_type, "cli"), &import_id)
                .await
                .map_err(|e| e.to_string())?;
            (state, ResourceKind::Resource)
        }
    };

    let sensitive = if show_sensitive {
        Vec::new()
    } else {
        sensitive_attributes(&state.id.resource_type, kind)
    };
    let rendered = serde_json::to_string_pretty(&render(&state, &sensitive))
        .map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

/// Placeholder state carrying only the cluster-side identifier
fn tracked(resource_type: &str, identifier: &str) -> State {
    State::existing(ResourceId::new(resource_type, "cli"), HashMap::new())
        .with_identifier(identifier)
}

async fn existing(
    provider: &impl Provider,
    resource_type: &str,
    identifier: &str,
) -> Result<State, String> {
    let state = provider
        .read(&tracked(resource_type, identifier))
        .await
        .map_err(|e| e.to_string())?;
    if state.exists {
        Ok(state)
    } else {
        Err(format!("{} {} not found", resource_type, identifier))
    }
}

/// Update from the current settings with `attrs` applied on top, so attributes
/// not named on the command line keep their values
async fn run_update(
    provider: &impl Provider,
    resource_type: &str,
    identifier: &str,
    attrs: &[String],
) -> Result<State, String> {
    let prior = existing(provider, resource_type, identifier).await?;
    let resource = attrs
        .iter()
        .try_fold(configurable(&prior), |resource, attr| {
            let (key, value) = parse_attr(attr)?;
            Ok::<_, String>(resource.with_attribute(key, value))
        })?;
    provider
        .update(&resource.id, identifier, &prior, &resource)
        .await
        .map_err(|e| e.to_string())
}

/// Caller-settable attributes of a state as a desired resource
///
/// Computed attributes that force replacement (generated key IDs and secrets)
/// stay unset so they are not compared.
fn configurable(prior: &State) -> Resource {
    let schema = schema_for(&prior.id.resource_type, ResourceKind::Resource);
    let settable = |name: &str| {
        schema
            .as_ref()
            .and_then(|s| s.attributes.get(name))
            .is_some_and(|a| !a.read_only && !(a.computed && a.requires_replace))
    };
    prior
        .attributes
        .iter()
        .filter(|(name, _)| settable(name))
        .fold(
            Resource::new(&prior.id.resource_type, &prior.id.name),
            |resource, (name, value)| resource.with_attribute(name.clone(), value.clone()),
        )
}

fn desired(resource_type: &str, name: &str, attrs: &[String]) -> Result<Resource, String> {
    attrs
        .iter()
        .try_fold(Resource::new(resource_type, name), |resource, attr| {
            let (key, value) = parse_attr(attr)?;
            Ok(resource.with_attribute(key, value))
        })
}

/// Parse `key=value`; the value is read as JSON when it is valid JSON
fn parse_attr(attr: &str) -> Result<(String, Value), String> {
    let (key, raw) = attr
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("Expected KEY=VALUE, got: {}", attr))?;
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn schema_for(resource_type: &str, kind: ResourceKind) -> Option<ResourceSchema> {
    let all = match kind {
        ResourceKind::Resource => schemas::resource_schemas(),
        ResourceKind::DataSource => schemas::data_source_schemas(),
    };
    all.into_iter().find(|s| s.resource_type == resource_type)
}

fn sensitive_attributes(resource_type: &str, kind: ResourceKind) -> Vec<String> {
    schema_for(resource_type, kind)
        .map(|schema| {
            schema
                .sensitive_attributes()
                .into_iter()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn render(state: &State, sensitive: &[String]) -> serde_json::Value {
    let attributes: serde_json::Map<String, serde_json::Value> = state
        .attributes
        .iter()
        .map(|(name, value)| {
            let value = if sensitive.iter().any(|s| s == name) {
                serde_json::Value::String("(sensitive)".to_string())
            } else {
                serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
            };
            (name.clone(), value)
        })
        .collect();

    serde_json::json!({
        "resource": state.id.to_string(),
        "identifier": state.identifier,
        "exists": state.exists,
        "attributes": attributes,
    })
}

fn run_schema(resource_type: Option<&str>) -> Result<(), String> {
    let Some(resource_type) = resource_type else {
        println!("{}", "Provider:".bold());
        print_summary(&provider_schema());
        println!("{}", "Resources:".bold());
        for schema in schemas::resource_schemas() {
            print_summary(&schema);
        }
        println!("{}", "Data sources:".bold());
        for schema in schemas::data_source_schemas() {
            print_summary(&schema);
        }
        return Ok(());
    };

    if resource_type == provider_schema().resource_type {
        print_schema(&provider_schema(), "provider block");
        return Ok(());
    }

    let mut found = false;
    for (kind, label) in [
        (ResourceKind::Resource, "resource"),
        (ResourceKind::DataSource, "data source"),
    ] {
        if let Some(schema) = schema_for(resource_type, kind) {
            print_schema(&schema, label);
            found = true;
        }
    }
    if found {
        Ok(())
    } else {
        Err(format!("Unknown resource type: {}", resource_type))
    }
}

fn print_summary(schema: &ResourceSchema) {
    println!(
        "  {:<28} {}",
        schema.resource_type.cyan(),
        schema.description.as_deref().unwrap_or("")
    );
}

fn print_schema(schema: &ResourceSchema, label: &str) {
    println!("{} ({})", schema.resource_type.cyan().bold(), label);
    if let Some(description) = &schema.description {
        println!("  {}", description);
    }

    let mut attributes: Vec<_> = schema.attributes.values().collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    for attr in attributes {
        let mut flags = Vec::new();
        if attr.required {
            flags.push("required");
        }
        if attr.read_only {
            flags.push("read-only");
        } else if attr.computed {
            flags.push("computed");
        }
        if attr.sensitive {
            flags.push("sensitive");
        }
        if attr.requires_replace {
            flags.push("forces replacement");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "  {} {}{}",
            attr.name.bold(),
            attr.attr_type.to_string().dimmed(),
            flags.yellow()
        );
        if let Some(description) = &attr.description {
            println!("      {}", description);
        }
    }
    println!();
}
