//! `feedloom serve`: start the HTTP API server.

pub async fn run(port: Option<u16>, host: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;

    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(host) = host {
        config.gateway.host = host;
    }

    println!("📰 feedloom gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:      {}", config.default_model_type);
    match config.tools.mcp_url.as_deref() {
        Some(url) => println!("   Tools:      MCP at {url}"),
        None => println!("   Tools:      built-in"),
    }

    feedloom_gateway::start(config).await?;

    Ok(())
}
