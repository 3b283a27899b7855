use anyhow::{bail, Context, Result};
use clap::{builder::ValueHint, Args, Parser, Subcommand};
use riaklite_core::models::{DEFAULT_BUCKET_TYPE, DEFAULT_N_VAL, DEFAULT_SCHEMA};
use riaklite_core::query::{escape_value, Connector, Query, SearchValue};
use riaklite_core::Config;
use riaklite_rs::Client;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "riaklite", version, about = "Riak KV command-line client")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Directory for rolling log files
    #[arg(long, global = true, default_value = "./logs", value_hint = ValueHint::DirPath)]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// JSON config file; flags below override its fields
    #[arg(long, global = true, env = "RIAKLITE_CONFIG", default_value = "riaklite.json")]
    pub config: PathBuf,

    /// Base URL of the Riak HTTP interface
    #[arg(long, global = true, env = "RIAKLITE_URL")]
    pub url: Option<String>,

    /// Client certificate (PEM, or PKCS#12 with --cert-pass)
    #[arg(long, global = true, env = "RIAKLITE_CERT", value_hint = ValueHint::FilePath)]
    pub cert: Option<String>,

    #[arg(long, global = true, env = "RIAKLITE_CERT_PASS")]
    pub cert_pass: Option<String>,

    #[arg(long, global = true, env = "RIAKLITE_USER")]
    pub user: Option<String>,

    #[arg(long, global = true, env = "RIAKLITE_PASSWORD")]
    pub password: Option<String>,

    /// Skip TLS certificate and hostname verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Request timeout in seconds, 0 for none
    #[arg(long, global = true, env = "RIAKLITE_TIMEOUT")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(flatten)]
    Store(StoreCommand),
    /// Escape a value for use in a search query
    Escape { value: String },
}

/// Commands that talk to the store
#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// Fetch a JSON object
    Get {
        bucket: String,
        key: String,
        #[arg(long = "type", default_value = DEFAULT_BUCKET_TYPE)]
        bucket_type: String,
    },
    /// Store a JSON object (literal JSON, or @file)
    Set {
        bucket: String,
        key: String,
        value: String,
        #[arg(long = "type", default_value = DEFAULT_BUCKET_TYPE)]
        bucket_type: String,
    },
    /// Delete an object
    Delete {
        bucket: String,
        key: String,
        #[arg(long = "type", default_value = DEFAULT_BUCKET_TYPE)]
        bucket_type: String,
    },
    /// Run a search query.
    ///
    /// Clauses are `field=value`, joined with AND, or `or:field=value`.
    /// `field=low..high` is an inclusive range.
    Search {
        bucket: String,
        #[arg(value_parser = parse_clause)]
        clauses: Vec<Clause>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print the undecoded response object
        #[arg(long)]
        raw: bool,
    },
    /// Read a counter
    Counter { bucket: String, key: String },
    /// Increment a counter, creating it if needed
    Incr {
        bucket: String,
        key: String,
        #[arg(long, default_value_t = 1)]
        by: u64,
    },
    /// Decrement a counter, creating it if needed
    Decr {
        bucket: String,
        key: String,
        #[arg(long, default_value_t = 1)]
        by: u64,
    },
    /// Upload a file (at most 2 MiB) as a binary object
    Upload {
        bucket: String,
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download a binary object into a file
    Download {
        bucket: String,
        key: String,
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    /// Print a search schema
    SchemaFetch { name: String },
    /// Create a search schema from an XML file
    SchemaCreate {
        name: String,
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    /// Create a search index
    IndexCreate {
        name: String,
        #[arg(long, default_value = DEFAULT_SCHEMA)]
        schema: String,
        #[arg(long, default_value_t = DEFAULT_N_VAL)]
        n_val: u32,
    },
    /// Set one bucket property (value is JSON, bare words are strings)
    BucketProp {
        bucket: String,
        name: String,
        value: String,
    },
    /// Attach a search index to a bucket
    AssociateIndex { bucket: String, index: String },
}

/// One search clause given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub connector: Connector,
    pub field: String,
    pub value: SearchValue,
}

fn parse_clause(s: &str) -> std::result::Result<Clause, String> {
    let (connector, rest) = match s.strip_prefix("or:") {
        Some(rest) => (Connector::Or, rest),
        None => (Connector::And, s.strip_prefix("and:").unwrap_or(s)),
    };

    let (field, value) = rest
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{}'", s))?;
    if field.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }

    let value = match value.split_once("..") {
        Some((low, high)) => SearchValue::from((low, high)),
        None => SearchValue::from(value),
    };

    Ok(Clause {
        connector,
        field: field.to_string(),
        value,
    })
}

/// Merge the config file with command line overrides
pub fn resolve_config(args: &ConnectionArgs) -> Result<Config> {
    let mut config = if args.config.exists() {
        Config::load(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else if let Some(url) = &args.url {
        Config::new(url.clone())
    } else {
        bail!(
            "no config file at {} and no --url given",
            args.config.display()
        );
    };

    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if let Some(cert) = &args.cert {
        config.cert_path = Some(cert.clone());
    }
    if let Some(pass) = &args.cert_pass {
        config.cert_passphrase = Some(pass.clone());
    }
    if let Some(user) = &args.user {
        config.username = Some(user.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if args.insecure {
        config.insecure_skip_verify = true;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_ms = Some(timeout.saturating_mul(1000));
    }

    Ok(config)
}

pub fn build_query(bucket: &str, clauses: &[Clause], offset: usize, limit: usize) -> Result<Query> {
    let mut query = Query::new(bucket);
    for clause in clauses {
        match clause.connector {
            Connector::And => query.and_where(clause.field.as_str(), clause.value.clone())?,
            Connector::Or => query.or_where(clause.field.as_str(), clause.value.clone())?,
        };
    }
    query.offset(offset).limit(limit);
    Ok(query)
}

/// Parse JSON, falling back to a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn read_value(raw: &str) -> Result<Value> {
    match raw.strip_prefix('@') {
        Some(path) => {
            let contents = std::fs::read_to_string(Path::new(path))
                .with_context(|| format!("Failed to read {}", path))?;
            Ok(parse_value(&contents))
        }
        None => Ok(parse_value(raw)),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(command: Commands, connection: &ConnectionArgs) -> Result<()> {
    match command {
        Commands::Escape { value } => {
            println!("{}", escape_value(&value));
            Ok(())
        }
        Commands::Store(command) => {
            let config = resolve_config(connection)?;
            let client = Client::new(config).context("Failed to create client")?;
            execute(&client, command).await
        }
    }
}

async fn execute(client: &Client, command: StoreCommand) -> Result<()> {
    match command {
        StoreCommand::Get {
            bucket,
            key,
            bucket_type,
        } => print_json(&client.get_in(&bucket_type, &bucket, &key).await?)?,
        StoreCommand::Set {
            bucket,
            key,
            value,
            bucket_type,
        } => {
            let value = read_value(&value)?;
            client.set_in(&bucket_type, &bucket, &key, &value).await?;
            tracing::info!("Stored {}/{}", bucket, key);
        }
        StoreCommand::Delete {
            bucket,
            key,
            bucket_type,
        } => {
            client.delete_in(&bucket_type, &bucket, &key).await?;
            tracing::info!("Deleted {}/{}", bucket, key);
        }
        StoreCommand::Search {
            bucket,
            clauses,
            offset,
            limit,
            raw,
        } => {
            let query = build_query(&bucket, &clauses, offset, limit)?;
            tracing::debug!(q = %query.build_query(), "Searching {}", bucket);
            if raw {
                print_json(&client.search_raw(&query).await?)?;
            } else {
                print_json(&client.search(&query).await?)?;
            }
        }
        StoreCommand::Counter { bucket, key } => {
            print_json(&client.get_counter(&bucket, &key).await?)?
        }
        StoreCommand::Incr { bucket, key, by } => {
            client.increment(&bucket, &key, by).await?;
            tracing::info!("Incremented {}/{} by {}", bucket, key, by);
        }
        StoreCommand::Decr { bucket, key, by } => {
            client.decrement(&bucket, &key, by).await?;
            tracing::info!("Decremented {}/{} by {}", bucket, key, by);
        }
        StoreCommand::Upload {
            bucket,
            file,
            key,
            content_type,
        } => {
            let key = client
                .upload_binary(&bucket, &file, key.as_deref(), content_type.as_deref())
                .await?;
            println!("{}", key);
        }
        StoreCommand::Download { bucket, key, file } => {
            let written = client.download_binary(&bucket, &key, &file).await?;
            tracing::info!("Wrote {} bytes to {}", written, file.display());
        }
        StoreCommand::SchemaFetch { name } => match client.fetch_schema(&name).await? {
            Some(schema) => println!("{}", schema),
            None => bail!("schema '{}' not found", name),
        },
        StoreCommand::SchemaCreate { name, file } => {
            client.create_schema(&name, &file).await?;
            tracing::info!("Created schema {}", name);
        }
        StoreCommand::IndexCreate {
            name,
            schema,
            n_val,
        } => {
            client.create_index(&name, &schema, n_val).await?;
            tracing::info!("Created index {} (schema={}, n_val={})", name, schema, n_val);
        }
        StoreCommand::BucketProp {
            bucket,
            name,
            value,
        } => {
            client
                .set_bucket_property(&bucket, &name, parse_value(&value))
                .await?;
            tracing::info!("Set {} on bucket {}", name, bucket);
        }
        StoreCommand::AssociateIndex { bucket, index } => {
            client.associate_index(&bucket, &index).await?;
            tracing::info!("Associated index {} with bucket {}", index, bucket);
        }
    }

    Ok(())
}
