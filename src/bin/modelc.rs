use clap::{Parser, Subcommand};
use model_compiler::{
    CompilerConfig, GqlEmitter, Manifest, MetadataRegistry, ModelId, SchemaEmitter,
};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modelc")]
#[command(about = "Compile declarative entity manifests into wire and persistence schemas")]
#[command(version)]
struct Cli {
    /// Path to the entity manifest
    #[arg(short, long, global = true, default_value = "models.json")]
    manifest: PathBuf,
    /// Optional compiler configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the GraphQL SDL for every entity
    Sdl,
    /// Print persistence schemas as JSON
    Schema {
        /// Only this entity
        #[arg(short, long)]
        entity: Option<String>,
    },
    /// Print default trees for every variant of an entity
    Defaults {
        /// Entity name
        entity: String,
    },
    /// List entities, their variants, queries and child class refs
    Inspect,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CompilerConfig::from_json_file(path)?,
        None => CompilerConfig::default(),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = Arc::new(MetadataRegistry::with_config(config));
    let manifest = Manifest::from_json_file(&cli.manifest)?;
    let constants = manifest.compile(&registry)?;
    tracing::info!(
        "Compiled {} entities from {}",
        constants.len(),
        cli.manifest.display()
    );

    match cli.command {
        Commands::Sdl => {
            let emitter = GqlEmitter::new(Arc::clone(&registry));
            for constant in &constants {
                emitter.generate_gql(constant.full())?;
                emitter.generate_gql_input(constant.input())?;
                emitter.generate_gql(constant.insight())?;
            }
            print!("{}", emitter.to_sdl());
        }
        Commands::Schema { entity } => {
            let emitter = SchemaEmitter::new(Arc::clone(&registry));
            let mut out = Map::new();
            for constant in &constants {
                if entity.as_deref().is_some_and(|name| name != constant.ref_name()) {
                    continue;
                }
                let schema = emitter.build_schema(constant.full())?;
                out.insert(constant.ref_name().to_string(), schema.describe());
            }
            println!("{}", serde_json::to_string_pretty(&Value::Object(out))?);
        }
        Commands::Defaults { entity } => {
            let constant = registry.get_constant(&entity)?;
            let out = json!({
                "input": constant.get_default_input()?,
                "full": constant.get_default()?,
                "insight": constant.get_default_insight()?
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Inspect => {
            for name in registry.database_names() {
                let database = registry.get_database(&name)?;
                let full = database.constant.full();
                let children: Vec<String> = registry
                    .get_child_class_refs(full)?
                    .iter()
                    .map(ModelId::key)
                    .collect();
                println!("{}", name);
                println!(
                    "  variants: {}",
                    registry
                        .models()
                        .iter()
                        .filter(|id| id.ref_name() == name)
                        .map(|id| id.kind().as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                println!("  queries:  {}", database.filter.query_keys().join(", "));
                println!("  sorts:    {}", database.filter.sort_keys().join(", "));
                println!("  children: {}", children.join(", "));
            }
        }
    }

    Ok(())
}
