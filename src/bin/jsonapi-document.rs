//! JSON:API document CLI
//!
//! Command-line interface for rendering object graphs as JSON:API
//! documents, planning query application and checking documents.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jsonapi_document::{
    apply_model_query, apply_query, json_type_name, load_json_auto, paginate_query,
    validate_document, AllowListOverrides, Entity, JsonApi, JsonApiConfig, PageInfo, Payload,
    QueryParams, RecordingQuery, Registry, Request, ValidateError,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jsonapi-document")]
#[command(about = "Render and check JSON:API documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an object graph as a JSON:API document
    Render {
        /// Object graph source: file path or URL (http:// or https://)
        graph: String,

        /// Client query string, e.g. "include=author&max_include[comments]=2"
        #[arg(long, short)]
        query: Option<String>,

        /// Resource type for primary data (default: inferred from kind)
        #[arg(long = "type", short = 't')]
        resource_type: Option<String>,

        /// Configuration file or URL
        #[arg(long)]
        config: Option<String>,

        /// Model registry file or URL (enables links-only relationships)
        #[arg(long)]
        registry: Option<String>,

        /// Request URL for self and pagination links
        #[arg(long)]
        url: Option<String>,

        /// Response status; 204 renders no body
        #[arg(long, default_value_t = 200)]
        status: u16,

        /// Render the graph as this page number
        #[arg(long, requires = "per_page")]
        page: Option<u64>,

        /// Page size when rendering a page
        #[arg(long, requires = "page")]
        per_page: Option<u64>,

        /// Total item count, when known
        #[arg(long, requires = "page")]
        total: Option<u64>,

        /// Another page follows (used when the total is unknown)
        #[arg(long, requires = "page", conflicts_with = "total")]
        has_more: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Show the data-source calls a query string turns into
    Plan {
        /// Client query string
        query: String,

        /// Resource type whose fields[type] entry applies
        #[arg(long = "type", short = 't')]
        resource_type: Option<String>,

        /// Configuration file or URL
        #[arg(long)]
        config: Option<String>,

        /// Model registry file or URL
        #[arg(long, requires = "kind")]
        registry: Option<String>,

        /// Derive allow-lists from this kind's registry schema
        #[arg(long, requires = "registry")]
        kind: Option<String>,

        /// Also paginate using page[size]
        #[arg(long)]
        paginate: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Normalize error objects into an errors document
    Errors {
        /// Errors file: an array of error objects, or an object of field messages
        file: String,

        /// Response status
        #[arg(long, default_value_t = 400)]
        status: u16,

        /// Configuration file or URL
        #[arg(long)]
        config: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Check a document's JSON:API top-level structure
    Validate {
        /// Document file or URL
        document: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render {
            graph,
            query,
            resource_type,
            config,
            registry,
            url,
            status,
            page,
            per_page,
            total,
            has_more,
            pretty,
        } => run_render(RenderArgs {
            graph,
            query,
            resource_type,
            config,
            registry,
            url,
            status,
            page: page.zip(per_page),
            total,
            has_more,
            pretty,
        }),

        Commands::Plan {
            query,
            resource_type,
            config,
            registry,
            kind,
            paginate,
            pretty,
        } => run_plan(PlanArgs {
            query,
            resource_type,
            config,
            registry,
            kind,
            paginate,
            pretty,
        }),

        Commands::Errors {
            file,
            status,
            config,
            pretty,
        } => run_errors(&file, status, config.as_deref(), pretty),

        Commands::Validate { document, json } => run_validate(&document, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Logs go to stderr so stdout stays a clean JSON document.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct RenderArgs {
    graph: String,
    query: Option<String>,
    resource_type: Option<String>,
    config: Option<String>,
    registry: Option<String>,
    url: Option<String>,
    status: u16,
    page: Option<(u64, u64)>,
    total: Option<u64>,
    has_more: bool,
    pretty: bool,
}

fn run_render(args: RenderArgs) -> Result<(), u8> {
    let config = load_config(args.config.as_deref())?;
    let registry = match &args.registry {
        Some(source) => Some(load_registry(source)?),
        None => None,
    };

    let graph = load_json_auto(&args.graph).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    let mut models = match &graph {
        Value::Array(_) => Entity::list_from_value(&graph),
        _ => Entity::from_value(&graph).map(|entity| vec![entity]),
    }
    .map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let request = build_request(&config, args.url.as_deref(), args.query.as_deref())?;

    let mut api = JsonApi::new(&config);
    if let Some(registry) = &registry {
        api = api.with_registry(registry);
    }

    let payload = match args.page {
        Some((current, per_page)) => {
            let count = models.len() as u64;
            let info = PageInfo::new(current, per_page, count);
            let info = match args.total {
                Some(total) => info.with_total(total),
                None => info.with_more(args.has_more),
            };
            Payload::page(&mut models, info)
        }
        None if graph.is_array() => Payload::collection(&mut models),
        None => match models.first_mut() {
            Some(model) => Payload::resource(model),
            None => Payload::Raw(Value::Null),
        },
    };

    let response = api.response(
        payload,
        args.resource_type.as_deref(),
        request.as_ref(),
        args.status,
        Vec::new(),
    );
    for (name, value) in &response.headers {
        tracing::debug!(header = %name, value = %value, "response header");
    }

    match response.body {
        Some(body) => print_json(&body, args.pretty),
        None => Ok(()),
    }
}

struct PlanArgs {
    query: String,
    resource_type: Option<String>,
    config: Option<String>,
    registry: Option<String>,
    kind: Option<String>,
    paginate: bool,
    pretty: bool,
}

fn run_plan(args: PlanArgs) -> Result<(), u8> {
    let config = load_config(args.config.as_deref())?;
    let params = QueryParams::parse(&args.query);
    let ty = args.resource_type.as_deref();

    let mut surface = match (&args.registry, &args.kind) {
        (Some(source), Some(kind)) => {
            let registry = load_registry(source)?;
            let Some(schema) = registry.get(kind) else {
                eprintln!("Error: kind \"{}\" is not declared in {}", kind, source);
                return Err(2);
            };
            let mut surface = RecordingQuery::new(schema.key_name.clone());
            apply_model_query(
                &mut surface,
                &params,
                ty,
                schema,
                &AllowListOverrides::default(),
                &config.query,
            );
            surface
        }
        _ => {
            let mut surface = RecordingQuery::default();
            apply_query(&mut surface, &params, ty, &config.query);
            surface
        }
    };

    if args.paginate {
        paginate_query(&mut surface, &params, &config.pagination);
    }

    let calls = serde_json::to_value(surface.calls()).map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    print_json(&calls, args.pretty)
}

fn run_errors(source: &str, status: u16, config: Option<&str>, pretty: bool) -> Result<(), u8> {
    let config = load_config(config)?;
    let input = load_json_auto(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let api = JsonApi::new(&config);
    let response = match input {
        Value::Array(errors) => api.error_response(errors, status, Vec::new()),
        Value::Object(mut map) => match map.remove("errors") {
            Some(Value::Array(errors)) => api.error_response(errors, status, Vec::new()),
            Some(_) => {
                eprintln!("Error: \"errors\" must be an array");
                return Err(2);
            }
            None => api.validation_response(&map, status),
        },
        other => {
            eprintln!(
                "Error: expected an array of errors or an object of field messages, got {}",
                json_type_name(&other)
            );
            return Err(2);
        }
    };

    match response.body {
        Some(body) => print_json(&body, pretty),
        None => Ok(()),
    }
}

fn run_validate(source: &str, json_output: bool) -> Result<(), u8> {
    let document = load_json_auto(source).map_err(|e| {
        report_error(json_output, &format!("loading document: {}", e));
        e.exit_code() as u8
    })?;

    match validate_document(&document) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = serde_json::json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(e) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

fn load_config(source: Option<&str>) -> Result<JsonApiConfig, u8> {
    match source {
        Some(source) => JsonApiConfig::load(source).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        }),
        None => Ok(JsonApiConfig::default()),
    }
}

fn load_registry(source: &str) -> Result<Registry, u8> {
    let value = load_json_auto(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    Registry::from_value(value).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

/// Request from `--url` and/or `--query`; the base URL stands in for a
/// missing `--url`.
fn build_request(
    config: &JsonApiConfig,
    url: Option<&str>,
    query: Option<&str>,
) -> Result<Option<Request>, u8> {
    let full = match (url, query) {
        (None, None) => return Ok(None),
        (Some(url), None) => url.to_string(),
        (url, Some(query)) => {
            let base = url.unwrap_or(&config.base_url);
            let query = query.trim_start_matches('?');
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{}{}{}", base, separator, query)
        }
    };
    Request::from_url(&full).map(Some).map_err(|e| {
        eprintln!("Error: invalid request URL {}: {}", full, e);
        2u8
    })
}

fn print_json(value: &Value, pretty: bool) -> Result<(), u8> {
    let output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", output);
    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
