//! Remote mode: submit the favorite toggle to a live wiki's `api.php`
//! over HTTP. The module is write-mode, so the request always goes out as
//! a POST.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde_json::Value;

use crate::api::MODULE_NAME;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Interpreted module payload from a successful remote toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutcome {
    pub title: String,
    pub action_label: String,
    pub message: Option<String>,
}

/// POST `action=favorite` for `title` against `api_url` and interpret the
/// response. API-level errors (the `error` envelope) surface with their
/// code and info text.
pub fn submit_toggle(
    api_url: &str,
    user_agent: &str,
    title: &str,
    unfavorite: bool,
) -> Result<RemoteOutcome> {
    let client = remote_client(user_agent)?;

    let mut form = vec![
        ("action", MODULE_NAME),
        ("format", "json"),
        ("title", title),
    ];
    if unfavorite {
        form.push(("unfavorite", "1"));
    }

    let response = client
        .post(api_url)
        .form(&form)
        .send()
        .with_context(|| format!("failed to reach {api_url}"))?;
    let status = response.status();
    let body: Value = response
        .json()
        .with_context(|| format!("response from {api_url} is not JSON"))?;

    if let Some(outcome) = interpret_response(&body)? {
        return Ok(outcome);
    }
    if !status.is_success() {
        bail!("{api_url} answered HTTP {status} without a module payload");
    }
    bail!("response from {api_url} carries no `{MODULE_NAME}` payload")
}

/// Interpret an API response body: `Err` for an error envelope, `Ok(Some)`
/// for a module payload, `Ok(None)` when neither is present.
pub fn interpret_response(body: &Value) -> Result<Option<RemoteOutcome>> {
    if let Some(error) = body.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("no further information");
        bail!("remote api error {code}: {info}");
    }

    let Some(payload) = body.get(MODULE_NAME) else {
        return Ok(None);
    };
    let title = payload
        .get("title")
        .and_then(Value::as_str)
        .context("module payload is missing `title`")?
        .to_string();
    let action_label = ["favorited", "unfavorited"]
        .into_iter()
        .find(|label| payload.get(*label).is_some())
        .context("module payload carries no action label")?
        .to_string();
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Some(RemoteOutcome {
        title,
        action_label,
        message,
    }))
}

fn remote_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
        .cookie_store(true)
        .build()
        .context("failed to construct http client")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::interpret_response;

    #[test]
    fn interpret_favorited_payload() {
        let body = json!({
            "favorite": {
                "title": "Main Page",
                "favorited": "",
                "message": "<p>The page \"Main Page\" has been added to your favorites.\n</p>"
            }
        });
        let outcome = interpret_response(&body)
            .expect("interpret")
            .expect("payload present");
        assert_eq!(outcome.title, "Main Page");
        assert_eq!(outcome.action_label, "favorited");
        assert!(outcome.message.expect("message").starts_with("<p>"));
    }

    #[test]
    fn interpret_unfavorited_payload_without_message() {
        let body = json!({ "favorite": { "title": "Main Page", "unfavorited": "" } });
        let outcome = interpret_response(&body)
            .expect("interpret")
            .expect("payload present");
        assert_eq!(outcome.action_label, "unfavorited");
        assert!(outcome.message.is_none());
    }

    #[test]
    fn interpret_error_envelope_surfaces_code_and_info() {
        let body = json!({
            "error": { "code": "notloggedin", "info": "You must be logged in." }
        });
        let error = interpret_response(&body).expect_err("must fail");
        let text = error.to_string();
        assert!(text.contains("notloggedin"));
        assert!(text.contains("You must be logged in."));
    }

    #[test]
    fn interpret_unrelated_body_is_none() {
        let body = json!({ "query": {} });
        assert!(interpret_response(&body).expect("interpret").is_none());
    }

    #[test]
    fn interpret_rejects_payload_without_label() {
        let body = json!({ "favorite": { "title": "Main Page" } });
        assert!(interpret_response(&body).is_err());
    }
}
