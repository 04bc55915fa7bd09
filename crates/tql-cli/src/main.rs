//! TQL CLI - Command-line interface
//!
//! Usage:
//!   tql render --template <query> [--param name=value]...
//!   tql run --endpoint <path> [--param name=value]...
//!   tql search [--field label] <text>

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tql_core::config::AppConfig;
use tql_core::ParameterMap;
use tql_graph::{EngineSubsumption, MemoryGraph};
use tql_inflector::{CurieMap, CypherInflector};

#[derive(Parser)]
#[command(name = "tql")]
#[command(about = "Templated graph query CLI")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $TQL_CONFIG, then environment only)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Graph fixture, overriding the configured one
    #[arg(long, global = true)]
    graph: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the final query for a template
    Render(TemplateArgs),
    /// Execute a template and print the result graph as JSON
    Run(TemplateArgs),
    /// Search node properties of the graph
    Search {
        /// Node property to search
        #[arg(long, default_value = "label")]
        field: String,
        /// Maximum number of hits
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Text to match
        text: String,
    },
    /// List the configured endpoints
    Endpoints,
}

#[derive(Args)]
struct TemplateArgs {
    /// Query template text
    #[arg(long, conflicts_with = "endpoint", required_unless_present = "endpoint")]
    template: Option<String>,

    /// Use the template of a configured endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Parameter as name=value; repeat a name to pass a list
    #[arg(long = "param", short = 'p', value_parser = parse_param)]
    params: Vec<(String, String)>,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

impl TemplateArgs {
    fn template(&self, config: &AppConfig) -> anyhow::Result<String> {
        if let Some(template) = &self.template {
            return Ok(template.clone());
        }
        let wanted = self.endpoint.as_deref().unwrap_or_default().trim_matches('/');
        config
            .endpoints
            .iter()
            .find(|e| e.path.trim_matches('/') == wanted)
            .map(|e| e.query.clone())
            .ok_or_else(|| anyhow!("No endpoint configured at '{wanted}'"))
    }

    fn parameters(&self) -> ParameterMap {
        let mut params = ParameterMap::new();
        for (name, value) in &self.params {
            params.insert(name.clone(), value.clone());
        }
        params
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::load()?,
    };
    if let Some(graph) = &cli.graph {
        config.graph.fixture_path = Some(graph.clone());
    }
    Ok(config)
}

fn load_graph(config: &AppConfig) -> anyhow::Result<MemoryGraph> {
    let graph = match &config.graph.fixture_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading graph fixture");
            MemoryGraph::from_fixture_file(path)
                .with_context(|| format!("Failed to load graph from {}", path.display()))?
        }
        None => MemoryGraph::new(),
    };
    Ok(graph.with_traversal_budget(config.graph.traversal_budget))
}

fn build_inflector(config: &AppConfig, graph: &MemoryGraph) -> CypherInflector {
    let subsumption = EngineSubsumption::new(graph.clone()).with_schema(
        config.graph.subsumption_type.clone(),
        config.graph.fragment_property.clone(),
    );
    CypherInflector::new(
        Arc::new(CurieMap::new(config.curies.clone())),
        Arc::new(subsumption),
        Arc::new(graph.clone()),
    )
    .with_policy(config.graph.entailment)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let graph = load_graph(&config)?;
    tracing::debug!(
        endpoints = config.endpoints.len(),
        traversal_budget = graph.traversal_budget(),
        "Configuration loaded"
    );

    match &cli.command {
        Commands::Render(args) => {
            let inflector = build_inflector(&config, &graph);
            let query = inflector
                .render(&args.template(&config)?, &args.parameters())
                .await?;
            println!("{}", query);
        }
        Commands::Run(args) => {
            let inflector = build_inflector(&config, &graph);
            let result = inflector
                .inflate(&args.template(&config)?, &args.parameters())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result.to_document())?);
        }
        Commands::Search { field, limit, text } => {
            if text.trim().is_empty() {
                bail!("Search text is empty");
            }
            let curies = CurieMap::new(config.curies.clone());
            for node in graph.search(field, text, *limit).await {
                let curie = node
                    .property(tql_graph::IRI_PROPERTY)
                    .and_then(|v| v.as_str())
                    .and_then(|iri| curies.get_curie(iri));
                let value = node
                    .property(field)
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                println!(
                    "{}\t{}\t{}",
                    node.id,
                    curie.unwrap_or_else(|| "-".to_string()),
                    value
                );
            }
        }
        Commands::Endpoints => {
            for endpoint in &config.endpoints {
                println!(
                    "/api/v1/dynamic/{}\t{}",
                    endpoint.path.trim_matches('/'),
                    endpoint.summary.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("id=X:foo").unwrap(),
            ("id".to_string(), "X:foo".to_string())
        );
        assert_eq!(
            parse_param("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_repeated_params_form_a_list() {
        let cli = Cli::parse_from([
            "tql", "render", "--template", "MATCH ()-[:${r}]-() RETURN 1", "-p", "r=a", "-p",
            "r=b",
        ]);
        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        let params = args.parameters();
        assert_eq!(params.get("r").unwrap(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_endpoint_template_lookup() {
        let config =
            AppConfig::from_toml_str(include_str!("../../../fixtures/tql.toml")).unwrap();
        let args = TemplateArgs {
            template: None,
            endpoint: Some("/neighbours/:id".to_string()),
            params: Vec::new(),
        };
        assert!(args.template(&config).unwrap().contains("${id}"));

        let args = TemplateArgs {
            template: None,
            endpoint: Some("missing".to_string()),
            params: Vec::new(),
        };
        assert!(args.template(&config).is_err());
    }

    #[test]
    fn test_load_graph_applies_traversal_budget() {
        let mut config = AppConfig::default();
        config.graph.traversal_budget = 42;
        let graph = load_graph(&config).unwrap();
        assert_eq!(graph.traversal_budget(), 42);
    }
}
