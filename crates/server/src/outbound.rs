//! Outbound call trigger
//!
//! POST /api/calls places a call through the carrier's REST API and points
//! its media stream at this server's WebSocket path. Missing configuration
//! is a 400 enumerating the absent keys; nothing is retried.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OutboundCallRequest {
    pub to: String,
    #[serde(default)]
    pub from: Option<String>,
}

/// Derive the advertised media-stream URL from the public base URL
fn stream_url(public_base_url: &str, ws_path: &str) -> String {
    let ws_base = public_base_url
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!("{}{}", ws_base.trim_end_matches('/'), ws_path)
}

/// POST /api/calls
pub async fn trigger_call(
    State(state): State<AppState>,
    Json(request): Json<OutboundCallRequest>,
) -> (StatusCode, Json<Value>) {
    let carrier = &state.settings.carrier;

    let missing = carrier.missing_keys();
    if !missing.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "missing carrier configuration",
                "missing": missing,
            })),
        );
    }

    if !request.to.starts_with('+') {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "`to` must be an E.164 number starting with +",
            })),
        );
    }

    // missing_keys() was empty, so every credential is present
    let account_sid = carrier.account_sid.clone().unwrap_or_default();
    let auth_token = carrier.auth_token.clone().unwrap_or_default();
    let subdomain = carrier.subdomain.clone().unwrap_or_default();
    let caller_id = carrier.caller_id.clone().unwrap_or_default();
    let app_id = carrier.app_id.clone().unwrap_or_default();

    let url = format!(
        "https://{}/v1/Accounts/{}/Calls/connect",
        subdomain, account_sid
    );

    let from = request.from.clone().unwrap_or_else(|| caller_id.clone());
    let mut form = vec![
        ("From", from),
        ("To", request.to.clone()),
        ("CallerId", caller_id),
        ("AppId", app_id),
    ];
    if let Some(ref base_url) = state.settings.server.public_base_url {
        form.push((
            "StreamUrl",
            stream_url(base_url, &state.settings.server.ws_path),
        ));
    }

    let response = state
        .http
        .post(&url)
        .basic_auth(&account_sid, Some(&auth_token))
        .form(&form)
        .send()
        .await;

    match response {
        Ok(response) if response.status().is_success() => {
            let body: Value = response.json().await.unwrap_or_else(|_| json!({}));
            let call_sid = body
                .pointer("/Call/Sid")
                .or_else(|| body.get("sid"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            tracing::info!(to = %request.to, call_sid = %call_sid, "Outbound call placed");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "callSid": call_sid })),
            )
        }
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Carrier rejected outbound call");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "success": false,
                    "error": format!("carrier returned {}", status),
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Carrier request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}
