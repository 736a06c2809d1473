//! rebuild-cli
//!
//! Herramientas de operación sobre el plano de control:
//!
//! - `key artifact|source`: claves deterministas de identidad.
//! - `filter build|check`: construir o consultar el filtro de rebuilt.
//! - `request`, `rebuild`, `show`: operar sobre el object store
//!   (Postgres, vía `DATABASE_URL`).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rebuild_core::constants::{REBUILD_ANNOTATION, REBUILD_FAILED_ONLY, REBUILD_PLAIN, TTL_ANNOTATION};
use rebuild_core::filter::{create_filter, might_contain};
use rebuild_core::{artifact_key, source_build_key, ArtifactRequest, ObjectStore, SourceBuild, StoreError, TypedStore};

#[derive(Debug, Parser)]
#[command(name = "rebuild-cli", version, about = "Operación del plano de control de rebuilds")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Claves deterministas de identidad.
    #[command(subcommand)]
    Key(KeyCommand),
    /// Filtro de coordenadas reconstruidas.
    #[command(subcommand)]
    Filter(FilterCommand),
    /// Crea (si falta) la ArtifactRequest de un GAV.
    Request(RequestArgs),
    /// Pide un rebuild de la request (y de su grupo de owners).
    Rebuild(RebuildArgs),
    /// Muestra la request y su SourceBuild.
    Show(ShowArgs),
}

#[derive(Debug, Subcommand)]
pub enum KeyCommand {
    Artifact { gav: String },
    Source {
        #[arg(long)]
        url: String,
        #[arg(long)]
        tag: String,
        #[arg(long, default_value = "")]
        path: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum FilterCommand {
    /// Construye el filtro con las coordenadas de `input` (una por línea, `-` = stdin).
    Build {
        input: String,
        /// Archivo binario de salida; sin él se imprime en hex.
        #[arg(long)]
        out: Option<String>,
    },
    /// Consulta coordenadas contra un filtro binario.
    Check {
        #[arg(long)]
        filter: String,
        gavs: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    pub gav: String,
    /// TTL en segundos tras alcanzar estado terminal.
    #[arg(long)]
    pub ttl: Option<u64>,
}

#[derive(Debug, Args)]
pub struct RebuildArgs {
    /// GAV o nombre de la request.
    pub target: String,
    /// Sólo si la request está Failed.
    #[arg(long)]
    pub failed_only: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// GAV o nombre de la request.
    pub target: String,
}

impl Commands {
    /// ¿El comando necesita object store?
    pub fn needs_store(&self) -> bool { matches!(self, Self::Request(_) | Self::Rebuild(_) | Self::Show(_)) }
}

pub fn run_key(cmd: &KeyCommand) -> String {
    match cmd {
        KeyCommand::Artifact { gav } => artifact_key(gav),
        KeyCommand::Source { url, tag, path } => source_build_key(url, tag, path),
    }
}

/// Coordenadas no vacías, una por línea; `#` inicia comentario.
pub fn parse_coordinates(raw: &str) -> Vec<String> {
    raw.lines()
       .map(|l| l.split('#').next().unwrap_or_default().trim())
       .filter(|l| !l.is_empty())
       .map(str::to_string)
       .collect()
}

pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

pub fn build_filter_from(raw: &str) -> Vec<u8> { create_filter(parse_coordinates(raw)) }

pub fn check_filter(filter: &[u8], gavs: &[String]) -> String {
    gavs.iter()
        .map(|g| format!("{g}\t{}", if might_contain(filter, g) { "possibly-present" } else { "absent" }))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Acepta tanto el GAV como el nombre ya derivado.
fn request_name(target: &str) -> String { if target.contains(':') { artifact_key(target) } else { target.to_string() } }

pub fn run_request<S: ObjectStore>(store: &S, args: &RequestArgs) -> Result<String> {
    let mut req = ArtifactRequest::new(args.gav.clone());
    if let Some(ttl) = args.ttl {
        req.meta.annotations.insert(TTL_ANNOTATION.to_string(), ttl.to_string());
    }
    match store.create(&mut req) {
        Ok(()) => Ok(format!("created {}", req.name())),
        Err(StoreError::AlreadyExists(_)) => Ok(format!("exists {}", req.name())),
        Err(e) => Err(e).context("creating request"),
    }
}

pub fn run_rebuild<S: ObjectStore>(store: &S, args: &RebuildArgs) -> Result<String> {
    let name = request_name(&args.target);
    let value = if args.failed_only { REBUILD_FAILED_ONLY } else { REBUILD_PLAIN };
    // Conflicto: otro escritor ganó; se relee y se reintenta.
    for _ in 0..5 {
        let Some(mut req) = store.get::<ArtifactRequest>(&name)? else {
            bail!("request {name} not found");
        };
        req.meta.annotations.insert(REBUILD_ANNOTATION.to_string(), value.to_string());
        match store.update(&mut req) {
            Ok(()) => return Ok(format!("rebuild requested for {name} ({value})")),
            Err(StoreError::Conflict { .. }) => continue,
            Err(e) => return Err(e).context("annotating request"),
        }
    }
    bail!("request {name} kept changing; try again")
}

pub fn run_show<S: ObjectStore>(store: &S, args: &ShowArgs) -> Result<String> {
    let name = request_name(&args.target);
    let Some(req) = store.get::<ArtifactRequest>(&name)? else {
        bail!("request {name} not found");
    };
    let sb = match req.scm.as_ref() {
        Some(scm) => store.get::<SourceBuild>(&scm.source_build_key())?,
        None => None,
    };
    let mut view = BTreeMap::new();
    view.insert("request", serde_json::to_value(&req)?);
    if let Some(sb) = sb {
        view.insert("sourceBuild", serde_json::to_value(&sb)?);
    }
    Ok(serde_json::to_string_pretty(&view)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebuild_core::InMemoryObjectStore;

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::parse_from(["rebuild-cli", "key", "source", "--url", "https://x", "--tag", "v1"]);
        match cli.command {
            Commands::Key(cmd @ KeyCommand::Source { .. }) => assert_eq!(run_key(&cmd), source_build_key("https://x", "v1", "")),
            other => panic!("unexpected {other:?}"),
        }
        let cli = Cli::parse_from(["rebuild-cli", "rebuild", "com.acme:foo:1.0", "--failed-only"]);
        assert!(cli.command.needs_store());
    }

    #[test]
    fn coordinates_skip_blanks_and_comments() {
        let coords = parse_coordinates("a:b:1\n\n# header\n c:d:2 # trailing\n");
        assert_eq!(coords, vec!["a:b:1".to_string(), "c:d:2".to_string()]);
        let filter = build_filter_from("a:b:1\nc:d:2\n");
        let report = check_filter(&filter, &["a:b:1".to_string()]);
        assert_eq!(report, "a:b:1\tpossibly-present");
        assert_eq!(to_hex(&[0x0f, 0xa0]), "0fa0");
    }

    #[test]
    fn request_rebuild_and_show_against_store() {
        let store = InMemoryObjectStore::new();
        let args = RequestArgs { gav: "com.acme:foo:1.0".into(), ttl: Some(3600) };
        assert!(run_request(&store, &args).expect("create").starts_with("created"));
        assert!(run_request(&store, &args).expect("again").starts_with("exists"));

        let out = run_rebuild(&store, &RebuildArgs { target: "com.acme:foo:1.0".into(), failed_only: true }).expect("rebuild");
        assert!(out.ends_with("(failed)"));
        let req = store.get::<ArtifactRequest>(&artifact_key("com.acme:foo:1.0")).expect("get").expect("exists");
        assert_eq!(req.meta.annotation(REBUILD_ANNOTATION), Some(REBUILD_FAILED_ONLY));
        assert_eq!(req.meta.annotation(TTL_ANNOTATION), Some("3600"));

        let shown = run_show(&store, &ShowArgs { target: req.name().to_string() }).expect("show");
        assert!(shown.contains("com.acme:foo:1.0"));
        assert!(!shown.contains("sourceBuild"));
        assert!(run_show(&store, &ShowArgs { target: "nope".into() }).is_err());
    }
}
