//! `ragstream models` — list configured and endpoint models.

use ragstream_core::transport::ChatTransport;
use ragstream_providers::OllamaTransport;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let transport = OllamaTransport::from_config(&config)?;

    let default = config.default_model.as_deref();
    let marker = |name: &str| if Some(name) == default { "*" } else { " " };

    println!("Endpoint: {}", transport.base_url());
    if !config.models.is_empty() {
        println!("Configured:");
        for model in &config.models {
            println!("  {} {model}", marker(model));
        }
    }

    match transport.list_models().await {
        Ok(models) => {
            println!("Available:");
            for model in &models {
                println!("  {} {model}", marker(model));
            }
        }
        Err(e) => eprintln!("Could not list endpoint models: {e}"),
    }
    Ok(())
}
