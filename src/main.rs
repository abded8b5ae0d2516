use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docgraph::connector::http;
use docgraph::{Commands, Container, ContainerConfig, MirrorPolicy, Router};

#[derive(Parser)]
#[command(name = "docgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true, env = "DOCGRAPH_DATA_DIR", default_value = "~/.docgraph")]
    data_dir: String,

    /// Vector store location: a DuckDB file path or `:memory:`
    #[arg(long, global = true, env = "DOCGRAPH_VECTOR_URI")]
    vector_uri: Option<String>,

    /// Graph store location: a DuckDB file path or `:memory:`
    #[arg(long, global = true, env = "DOCGRAPH_GRAPH_URI")]
    graph_uri: Option<String>,

    #[arg(long, global = true, env = "DOCGRAPH_GRAPH_USER")]
    graph_user: Option<String>,

    #[arg(long, global = true, env = "DOCGRAPH_GRAPH_PASSWORD", hide_env_values = true)]
    graph_password: Option<String>,

    #[arg(long, global = true)]
    memory_storage: bool,

    #[arg(long, global = true)]
    mock_embeddings: bool,

    /// What to do when the graph half of a write fails
    #[arg(long, global = true, env = "DOCGRAPH_MIRROR_POLICY", default_value = "fail-open")]
    mirror_policy: MirrorPolicy,

    /// Attach full documents to related-document results
    #[arg(long, global = true)]
    enrich_related: bool,

    /// Build an HNSW index for similarity search (DuckDB vss extension)
    #[arg(long, global = true)]
    hnsw_index: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = expand_tilde(&cli.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let container = Container::new(ContainerConfig {
        data_dir,
        vector_uri: cli.vector_uri,
        graph_uri: cli.graph_uri,
        graph_user: cli.graph_user,
        graph_password: cli.graph_password,
        memory_storage: cli.memory_storage,
        mock_embeddings: cli.mock_embeddings,
        mirror_policy: cli.mirror_policy,
        enrich_related: cli.enrich_related,
        hnsw_index: cli.hnsw_index,
    })
    .await?;

    if let Commands::Serve { host, port } = &cli.command {
        return http::serve(&container, host, *port).await;
    }

    let output = Router::new(&container).route(cli.command).await;
    container.shutdown().await?;
    println!("{}", output?);

    Ok(())
}

fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            if path == "~" {
                return home.to_string_lossy().to_string();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
