//! previewbox CLI
//!
//! Provisions a local sandbox from a project-tree JSON file and starts its
//! dev server, streaming progress to stdout.

use std::sync::Arc;

use previewbox::{
    LocalFactory, ProjectTree, SandboxManager, SetupConfig, SetupOrchestrator, StdoutSink,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <project-tree.json> [previewbox.toml]", args[0]);
        eprintln!("\nProvisions a local sandbox from the given project tree");
        eprintln!("and starts its dev server.");
        std::process::exit(1);
    }

    let tree_text = match std::fs::read_to_string(&args[1]) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", args[1]);
            std::process::exit(1);
        }
    };
    let tree: ProjectTree = match serde_json::from_str(&tree_text) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("Failed to parse project tree: {e}");
            std::process::exit(1);
        }
    };

    let config = match args.get(2) {
        Some(path) => match SetupConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {path}: {e}");
                std::process::exit(1);
            }
        },
        None => SetupConfig::default(),
    };
    match config.validate().into_result() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!(warning = %warning, "config warning");
            }
        }
        Err(e) => {
            eprintln!("Invalid config: {e}");
            std::process::exit(1);
        }
    }

    let manager = SandboxManager::new(Arc::new(LocalFactory::in_temp_dir()));
    let runtime = match manager.acquire().await {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to boot sandbox: {e}");
            std::process::exit(1);
        }
    };

    let orchestrator = SetupOrchestrator::new(runtime, Arc::new(StdoutSink), config);

    match orchestrator.run(&tree).await {
        Ok(_) => {
            if let Some(url) = orchestrator.server_url() {
                println!("\nServer ready at {url}");
                println!("Press Ctrl-C to stop.");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        Err(e) => {
            eprintln!("Setup failed: {e}");
            eprintln!("Reload the environment to try again.");
            std::process::exit(1);
        }
    }
}
