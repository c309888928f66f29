//! Dumps the relay's HTTP API description.
//!
//! Only `/health` and its response schema are described here; speech
//! requests and audio travel over the `/ws` WebSocket, which OpenAPI
//! does not model.
//!
//! Usage: `openapi [PATH]` (defaults to `openapi.json`).

use chorus_api::router::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_PATH: &str = "openapi.json";

/// Renders the relay's OpenAPI document as pretty-printed JSON.
fn render(api_doc: &utoipa::openapi::OpenApi) -> Result<String, serde_json::Error> {
    api_doc.to_pretty_json()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PATH.to_string());
    std::fs::write(&path, render(&ApiDoc::openapi())?)?;
    println!("Wrote the relay API document to {path}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_describes_health_endpoint() {
        let json: serde_json::Value = serde_json::from_str(&render(&ApiDoc::openapi()).unwrap()).unwrap();
        assert!(json["paths"]["/health"]["get"].is_object());
        assert!(json["components"]["schemas"]["HealthResponse"].is_object());
    }
}
