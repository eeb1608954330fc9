//! Provider call control
//!
//! Thin REST client for placing outbound calls plus TwiML generation for
//! the voice webhook. Both directions end up at the same place: the
//! provider opens a media-stream WebSocket back to this server.

use serde::Deserialize;
use tracing::{debug, info};
use voice_bridge_config::TelephonyConfig;

use crate::TransportError;

/// Build the TwiML document that connects a call to the media stream
///
/// `public_host` may carry an `https://` scheme or be bare; the stream URL
/// is always `wss://`.
pub fn connect_stream_twiml(public_host: &str) -> String {
    let host = public_host
        .trim_end_matches('/')
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response><Connect>",
            r#"<Stream url="wss://{}/media-stream"/>"#,
            "</Connect></Response>"
        ),
        host
    )
}

/// Call status callback payload (form-encoded by the provider)
#[derive(Debug, Clone, Deserialize)]
pub struct CallStatusUpdate {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
    #[serde(rename = "CallDuration", default)]
    pub call_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallCreated {
    sid: String,
}

/// REST client for the provider's call API
pub struct CallControl {
    http: reqwest::Client,
    config: TelephonyConfig,
}

impl CallControl {
    pub fn new(config: TelephonyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Place an outbound call; the answered call fetches TwiML from
    /// `/incoming-call` and status transitions post to `/call-status`.
    pub async fn place_call(
        &self,
        to: &str,
        public_host: &str,
    ) -> Result<String, TransportError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base, self.config.account_sid
        );
        let base = public_host.trim_end_matches('/');
        let voice_url = format!("{base}/incoming-call");
        let status_callback = format!("{base}/call-status");

        debug!(to, "Placing outbound call");
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.caller_id.as_str()),
                ("Url", voice_url.as_str()),
                ("StatusCallback", status_callback.as_str()),
                ("StatusCallbackEvent", "initiated ringing answered completed"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: CallCreated = response.json().await?;
        info!(call_sid = %created.sid, to, "Outbound call placed");
        Ok(created.sid)
    }
}
