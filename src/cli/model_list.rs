//! Model listing functionality
//!
//! Prints what the configured server reports from `GET /v1/models`.

use std::error::Error;

use crate::api::models::{fetch_models, sort_models};
use crate::core::config::Config;

pub async fn list_models(config: &Config) -> Result<(), Box<dyn Error>> {
    let base_url = config.base_url();

    println!("🤖 Models on {base_url}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if let Some(model) = &config.model {
        println!("🎯 Pinned model: {model} (server discovery is skipped in chat)");
        println!();
    }

    let client = reqwest::Client::new();
    let models_response = fetch_models(
        &client,
        &base_url,
        config.transport_options().models_timeout,
    )
    .await?;

    let loaded = models_response.loaded_model().map(str::to_string);
    let mut models = models_response.data;
    if models.is_empty() {
        println!("The server is up but reports no loaded models.");
        return Ok(());
    }

    println!("Found {} models:", models.len());
    println!();
    sort_models(&mut models);
    for model in models {
        let marker = if loaded.as_deref() == Some(model.id.as_str()) {
            " (loaded)"
        } else {
            ""
        };
        match model.owned_by.as_deref().filter(|owner| !owner.is_empty()) {
            Some(owner) => println!("  • {}{marker}  [{owner}]", model.id),
            None => println!("  • {}{marker}", model.id),
        }
    }

    Ok(())
}
