//! `feedloom digest`: HTML digest of the top recommended items.

use std::path::PathBuf;

pub async fn run(
    model_type: Option<String>,
    limit: Option<usize>,
    date: Option<String>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::load_state().await?;
    let limit = limit.unwrap_or(state.config.recommendation.default_limit);

    eprint!("  Writing digest...");
    let digest = state
        .digester
        .digest(model_type.as_deref(), limit, date.as_deref())
        .await?;
    eprint!("\r                  \r");

    match output {
        Some(path) => {
            tokio::fs::write(&path, &digest.html).await?;
            println!("✅ Digest for {} ({} items) written to {}", digest.date, digest.item_count, path.display());
        }
        None => println!("{}", digest.html),
    }
    Ok(())
}
