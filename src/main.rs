//! Purpose: `datacat` CLI entry point: catalog search/lookup/mutation and offline decode.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: stdout carries only JSON (one document or JSON Lines per command).
//! Invariants: Errors are emitted as JSON on stderr; logs also go to stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use datacat::api::{
    CatalogClient, CatalogNode, ClientConfig, Codec, Container, ContainerKind, Dataset,
    DatasetLocation, Entity, EntityKind, Error, ErrorKind, Metadata, Scalar,
    SearchOptions, View, to_exit_code,
};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "DATACAT_LOG";

#[derive(Parser)]
#[command(
    name = "datacat",
    version,
    about = "Query and edit a remote data catalog",
    long_about = "Query and edit a remote data catalog.\n\nResults are printed as JSON (one entry per line for searches). Set DATACAT_LOG=debug to trace requests on stderr."
)]
struct Cli {
    #[arg(long, global = true, help = "Catalog base URL (overrides DATACAT_URL)")]
    url: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Experiment used to build the base URL when no URL is given"
    )]
    experiment: Option<String>,
    #[arg(long, global = true, help = "Service mode used with --experiment: prod|dev")]
    mode: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Search datasets under a path pattern")]
    Search {
        #[arg(help = "Path pattern, e.g. /EXO/Data/Raw/*")]
        target: String,
        #[arg(long, help = "Filter expression, e.g. 'nRun gt 6200'")]
        filter: Option<String>,
        #[arg(long, help = "Sort key (repeatable); suffix '-' for descending")]
        sort: Vec<String>,
        #[arg(long, help = "Extra metadata field to retrieve (repeatable)")]
        show: Vec<String>,
        #[arg(long)]
        offset: Option<u64>,
        #[arg(long)]
        max: Option<u64>,
        #[command(flatten)]
        view: ViewArgs,
    },
    #[command(about = "Show a single catalog entry")]
    Path {
        path: String,
        #[command(flatten)]
        view: ViewArgs,
    },
    #[command(about = "Create a folder or group")]
    Mkdir {
        #[arg(help = "Parent container path")]
        parent: String,
        name: String,
        #[arg(long, help = "Create a group instead of a folder")]
        group: bool,
        #[arg(long = "metadata", value_name = "KEY=VALUE", help = "Metadata entry (repeatable)")]
        metadata: Vec<String>,
        #[arg(long = "field", value_name = "KEY=VALUE", help = "Extra field (repeatable)")]
        fields: Vec<String>,
    },
    #[command(about = "Register a dataset in a container")]
    Mkds {
        #[arg(help = "Parent container path")]
        parent: String,
        name: String,
        #[arg(long)]
        data_type: Option<String>,
        #[arg(long)]
        file_format: Option<String>,
        #[arg(long)]
        version_id: Option<i64>,
        #[arg(long = "metadata", value_name = "KEY=VALUE", help = "Dataset metadata (repeatable)")]
        metadata: Vec<String>,
        #[arg(
            long = "version-metadata",
            value_name = "KEY=VALUE",
            help = "Version metadata (repeatable)"
        )]
        version_metadata: Vec<String>,
        #[arg(
            long = "location",
            value_name = "SITE=RESOURCE",
            help = "Physical location (repeatable)"
        )]
        locations: Vec<String>,
    },
    #[command(about = "Delete a folder, group or dataset")]
    Rm {
        path: String,
        #[arg(long, value_enum)]
        kind: RemoveKind,
    },
    #[command(about = "Decode a catalog JSON document offline and print it in canonical form")]
    Unpack {
        #[arg(help = "JSON file to read (stdin when omitted)")]
        file: Option<PathBuf>,
        #[arg(long, value_enum, help = "Kind used for objects without a _type tag")]
        default_type: Option<KindArg>,
    },
}

#[derive(Args)]
struct ViewArgs {
    #[arg(long, help = "Dataset version view, e.g. current")]
    version: Option<String>,
    #[arg(long, help = "Location site view, e.g. master")]
    site: Option<String>,
}

impl ViewArgs {
    fn into_view(self) -> View {
        View {
            version: self.version,
            site: self.site,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RemoveKind {
    Folder,
    Group,
    Dataset,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Dataset,
    Folder,
    Group,
    Location,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Dataset => EntityKind::Dataset,
            KindArg::Folder => EntityKind::Folder,
            KindArg::Group => EntityKind::Group,
            KindArg::Location => EntityKind::Location,
        }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            err.print().map_err(|io_err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write help")
                    .with_source(io_err)
            })?;
            return Ok(());
        }
        Err(err) => {
            let rendered = err.render().to_string();
            let message = rendered
                .lines()
                .next()
                .unwrap_or("invalid arguments")
                .trim_start_matches("error: ")
                .to_string();
            return Err(Error::new(ErrorKind::Usage)
                .with_message(message)
                .with_hint("run `datacat --help` for usage"));
        }
    };
    init_tracing();

    let Cli {
        url,
        experiment,
        mode,
        command,
    } = cli;
    let connect = || -> Result<CatalogClient, Error> {
        let config =
            ClientConfig::resolve(url.as_deref(), experiment.as_deref(), mode.as_deref())?;
        tracing::debug!(base_url = %config.base_url, "resolved catalog base url");
        Ok(CatalogClient::new(config))
    };

    match command {
        Command::Search {
            target,
            filter,
            sort,
            show,
            offset,
            max,
            view,
        } => {
            let options = SearchOptions {
                filter,
                sort,
                show,
                offset,
                max,
                view: view.into_view(),
            };
            let entities = connect()?.search(&target, &options)?;
            for entity in &entities {
                emit_json(entity)?;
            }
        }
        Command::Path { path, view } => {
            let entity = connect()?.path(&path, &view.into_view())?;
            emit_json(&entity)?;
        }
        Command::Mkdir {
            parent,
            name,
            group,
            metadata,
            fields,
        } => {
            let mut container = Container::new()
                .with_name(name)
                .with_metadata(parse_metadata(&metadata)?);
            for raw in &fields {
                let (key, value) = split_assignment(raw, "--field")?;
                container = container.with_field(key, field_value(value));
            }
            let kind = if group {
                ContainerKind::Group
            } else {
                ContainerKind::Folder
            };
            let created = connect()?.mkdir(&parent, &container, kind)?;
            emit_json(&created)?;
        }
        Command::Mkds {
            parent,
            name,
            data_type,
            file_format,
            version_id,
            metadata,
            version_metadata,
            locations,
        } => {
            let mut dataset = Dataset::new()
                .with_name(name)
                .with_metadata(parse_metadata(&metadata)?)
                .with_version_metadata(parse_metadata(&version_metadata)?);
            if let Some(data_type) = data_type {
                dataset = dataset.with_data_type(data_type);
            }
            if let Some(file_format) = file_format {
                dataset = dataset.with_file_format(file_format);
            }
            if let Some(version_id) = version_id {
                dataset = dataset.with_version_id(version_id);
            }
            for raw in &locations {
                let (site, resource) = split_assignment(raw, "--location")?;
                dataset = dataset.with_location(
                    DatasetLocation::new()
                        .with_site(site)
                        .with_resource(resource),
                );
            }
            let created = connect()?.mkds(&parent, &dataset)?;
            emit_json(&created)?;
        }
        Command::Rm { path, kind } => {
            let client = connect()?;
            match kind {
                RemoveKind::Folder => client.rmdir(&path, ContainerKind::Folder)?,
                RemoveKind::Group => client.rmdir(&path, ContainerKind::Group)?,
                RemoveKind::Dataset => client.rmds(&path)?,
            }
            emit_value(&json!({ "deleted": path }))?;
        }
        Command::Unpack { file, default_type } => {
            let content = read_input(file.as_ref())?;
            let codec = Codec::new().with_default_kind(default_type.map(EntityKind::from));
            let decoded = codec.unpack(&content)?;
            emit_value(&codec.encode(&decoded)?)?;
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn read_input(file: Option<&PathBuf>) -> Result<String, Error> {
    match file {
        Some(path) => std::fs::read_to_string(path).map_err(|err| {
            let kind = match err.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::PermissionDenied => ErrorKind::Permission,
                _ => ErrorKind::Io,
            };
            Error::new(kind)
                .with_message(format!("failed to read {}", path.display()))
                .with_source(err)
        }),
        None => {
            let mut content = String::new();
            io::stdin().read_to_string(&mut content).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            Ok(content)
        }
    }
}

fn split_assignment<'a>(raw: &'a str, flag: &str) -> Result<(&'a str, &'a str), Error> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{flag} expects KEY=VALUE, got {raw:?}"))),
    }
}

/// Numbers stay numbers; everything else is text.
fn scalar_from_arg(raw: &str) -> Scalar {
    if let Ok(value) = raw.parse::<i64>() {
        return Scalar::Integer(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Scalar::Decimal(value),
        _ => Scalar::String(raw.to_string()),
    }
}

fn parse_metadata(raw: &[String]) -> Result<Metadata, Error> {
    let mut metadata = Metadata::new();
    for entry in raw {
        let (key, value) = split_assignment(entry, "--metadata")?;
        metadata.insert(key, scalar_from_arg(value));
    }
    Ok(metadata)
}

/// Extra fields accept inline JSON, falling back to a plain string.
fn field_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn emit_json(entity: &Entity) -> Result<(), Error> {
    emit_value(&Codec::new().encode(entity)?)
}

fn emit_value(value: &Value) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write output")
                .with_source(err)
        })
        .and_then(|()| {
            writeln!(stdout).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write output")
                    .with_source(err)
            })
        })
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().unwrap_or("unexpected failure")),
    );
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}
