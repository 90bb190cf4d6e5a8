//! `atelier request`: send one authenticated request

use colored::Colorize;

use crate::api::{ApiClient, ApiRequest};
use crate::auth::SessionEvent;
use crate::error::{AtelierError, Result};

/// Arguments of the `request` command.
#[derive(Debug, Clone)]
pub struct RequestArgs {
    /// HTTP method name
    pub method: String,
    /// Path relative to the base URL
    pub path: String,
    /// Raw JSON body
    pub data: Option<String>,
    /// `Name: value` header strings
    pub headers: Vec<String>,
}

/// Builds the request described by `args`.
///
/// # Errors
///
/// Returns [`AtelierError::InvalidRequest`] for an unknown method, a body
/// that is not JSON, or a header without a `:` separator.
pub fn build_request(args: &RequestArgs) -> Result<ApiRequest> {
    let mut request = ApiRequest::parse(&args.method, args.path.clone())?;

    if let Some(data) = &args.data {
        let body: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| AtelierError::InvalidRequest(format!("--data is not valid JSON: {e}")))?;
        request = request.with_body(body);
    }

    for raw in &args.headers {
        let (name, value) = raw.split_once(':').ok_or_else(|| {
            AtelierError::InvalidRequest(format!("header must look like 'Name: value': {raw}"))
        })?;
        request = request.header(name.trim(), value.trim());
    }

    Ok(request)
}

/// Sends the request and prints the body, pretty-printing JSON.
pub async fn run_request(client: &ApiClient, args: RequestArgs) -> Result<()> {
    let request = build_request(&args)?;
    let mut events = client.subscribe();

    match client.send(&request).await {
        Ok(response) => {
            tracing::info!(status = response.status().as_u16(), "request succeeded");
            match response.json::<serde_json::Value>() {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{}", response.text()),
            }
            Ok(())
        }
        Err(e) => {
            if let Ok(SessionEvent::ForcedLogout { reason }) = events.try_recv() {
                eprintln!(
                    "{} session expired ({}); run `atelier login` to sign in again",
                    "!".red().bold(),
                    reason
                );
            }
            Err(e)
        }
    }
}
