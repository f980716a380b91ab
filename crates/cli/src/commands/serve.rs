//! `statecraft serve` — Start the A2A gateway.

use statecraft_config::AppConfig;
use tracing::info;

pub async fn run(mut config: AppConfig, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        info!(port, "Port overridden from the command line");
        config.gateway.port = port;
    }

    println!("Statecraft Gateway");
    println!("   Environment: {}", config.environment);
    println!(
        "   Agent:       http://{}:{}/{}/",
        config.gateway.host, config.gateway.port, config.agent.id
    );
    println!("   Model:       {}", config.llm.model);

    statecraft_gateway::start(config).await?;

    Ok(())
}
