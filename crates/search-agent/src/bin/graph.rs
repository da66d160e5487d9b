//! Writes the decision loop diagram to `graph.mermaid`, and a rendering of
//! it to `graph.png` when the renderer is reachable.

#[macro_use]
extern crate tracing;

use std::process::ExitCode;

use reqwest::Client;
use search_agent::core::graph::topology;
use search_agent::diagram::{MERMAID_INK_URL, render_png};
use tokio::fs;

const MERMAID_FILE: &str = "graph.mermaid";
const PNG_FILE: &str = "graph.png";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mermaid = topology().to_mermaid();
    if let Err(err) = fs::write(MERMAID_FILE, &mermaid).await {
        eprintln!("Error generating graph visualization: {err}");
        return ExitCode::FAILURE;
    }
    println!("Graph visualization saved to {MERMAID_FILE}");

    let png = match render_png(&Client::new(), MERMAID_INK_URL, &mermaid).await
    {
        Ok(png) => png,
        Err(err) => {
            warn!("failed to render the diagram: {err}");
            println!(
                "Could not generate PNG visualization. Mermaid code is still \
                 available."
            );
            return ExitCode::SUCCESS;
        }
    };
    match fs::write(PNG_FILE, png).await {
        Ok(()) => println!("Graph PNG visualization saved to {PNG_FILE}"),
        Err(err) => {
            warn!("failed to write {PNG_FILE}: {err}");
            println!(
                "Could not generate PNG visualization. Mermaid code is still \
                 available."
            );
        }
    }
    ExitCode::SUCCESS
}
