//! The planner client and its fail-safe validation pipeline.
//!
//! Whatever the planner returns, the caller receives a proposal that
//! validates against the intent contract: raw text is tolerantly parsed,
//! shape-checked, and fully validated, and every failure path collapses to
//! the safe clarification-only proposal.

use std::time::Duration;

use serde_json::json;

use wd_domain::config::AdvisoryConfig;
use wd_domain::error::Result;
use wd_domain::intent::IntentProposal;

use crate::contract::Contract;
use crate::extract::{extract_json_object, ParseMode};
use crate::fallback::safe_no_action;

/// Test seam: a synchronous raw-text generator standing in for the planner.
pub type RawGenerator = dyn Fn(&str) -> std::result::Result<String, String> + Send + Sync;

/// How the proposal was produced, for audit payloads and responses.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AdvisoryMeta {
    pub provider: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// `"ok"` or `"safe_fallback"`.
    pub validation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum Mode {
    Stub,
    Planner,
}

/// Client for the external LLM planner.
pub struct AdvisoryClient {
    mode: Mode,
    mode_name: String,
    url: String,
    model: String,
    http: reqwest::Client,
    contract: Contract,
    generator: Option<Box<RawGenerator>>,
}

impl AdvisoryClient {
    pub fn new(config: &AdvisoryConfig) -> Self {
        let mode = match config.mode.as_str() {
            "planner" => Mode::Planner,
            _ => Mode::Stub,
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_sec.max(0.1)))
            .build()
            .unwrap_or_default();
        Self {
            mode,
            mode_name: config.mode.clone(),
            url: config.url.clone(),
            model: config.model.clone(),
            http,
            contract: Contract::load(&config.contract_path),
            generator: None,
        }
    }

    /// Build a client whose raw output comes from an injected generator.
    pub fn with_generator(
        contract: Contract,
        generator: Box<RawGenerator>,
    ) -> Self {
        Self {
            mode: Mode::Stub,
            mode_name: "custom".into(),
            url: String::new(),
            model: String::new(),
            http: reqwest::Client::new(),
            contract,
            generator: Some(generator),
        }
    }

    async fn generate_raw(
        &self,
        prompt: &str,
        fallback: &IntentProposal,
    ) -> std::result::Result<(String, AdvisoryMeta), String> {
        if let Some(generator) = &self.generator {
            let raw = generator(prompt)?;
            return Ok((
                raw,
                self.meta("test_raw_generator", None),
            ));
        }

        match self.mode {
            Mode::Stub => {
                let raw = serde_json::to_string(fallback).map_err(|e| e.to_string())?;
                Ok((raw, self.meta("stub_local", None)))
            }
            Mode::Planner => {
                let payload = json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": false,
                    "format": "json",
                });
                let response = self
                    .http
                    .post(&self.url)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| format!("planner request failed: {e}"))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| format!("planner response unreadable: {e}"))?;
                if !status.is_success() {
                    return Err(format!("planner HTTP {status}: {body}"));
                }
                // The endpoint wraps the generation in {response|output: "..."}.
                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&body) {
                    for key in ["response", "output"] {
                        if let Some(text) = parsed.get(key).and_then(|v| v.as_str()) {
                            return Ok((
                                text.to_owned(),
                                self.meta("planner", Some(self.model.clone())),
                            ));
                        }
                    }
                }
                Ok((body, self.meta("planner", Some(self.model.clone()))))
            }
        }
    }

    fn meta(&self, provider: &str, model: Option<String>) -> AdvisoryMeta {
        AdvisoryMeta {
            provider: provider.to_owned(),
            mode: self.mode_name.clone(),
            model,
            validation: "ok".into(),
            parse_mode: None,
            error: None,
        }
    }

    /// Produce a validated intent proposal for `prompt`, falling back to the
    /// safe clarification-only shape on transport or validation failure.
    ///
    /// Errors only when even the fallback proposal cannot be made safe.
    pub async fn generate_intent_proposal(
        &self,
        prompt: &str,
        fallback: &IntentProposal,
    ) -> Result<(IntentProposal, AdvisoryMeta)> {
        let (raw_text, mut meta) = match self.generate_raw(prompt, fallback).await {
            Ok(ok) => ok,
            Err(message) => {
                tracing::warn!(error = %message, "planner transport failure, falling back");
                let safe = safe_no_action(fallback, &format!("llm_request_error:{message}"))?;
                return Ok((
                    safe,
                    AdvisoryMeta {
                        provider: "fail_safe".into(),
                        mode: self.mode_name.clone(),
                        model: None,
                        validation: "safe_fallback".into(),
                        parse_mode: None,
                        error: Some(message),
                    },
                ));
            }
        };

        let (parsed, parse_mode) = extract_json_object(&raw_text);
        meta.parse_mode = Some(parse_mode.as_str().to_owned());
        let Some(parsed) = parsed else {
            tracing::warn!(parse_mode = parse_mode.as_str(), "planner output not JSON");
            let safe = safe_no_action(fallback, "invalid_json")?;
            meta.validation = "safe_fallback".into();
            return Ok((safe, meta));
        };
        debug_assert!(parse_mode == ParseMode::Full || parse_mode == ParseMode::Extracted);

        if let Err(error) = self
            .contract
            .check_shape(&parsed)
            .and_then(|_| IntentProposal::from_value(parsed.clone()).map(drop))
        {
            tracing::warn!(%error, "planner proposal failed validation");
            let safe = safe_no_action(fallback, &format!("schema_validation_error:{error}"))?;
            meta.validation = "safe_fallback".into();
            meta.error = Some(error.to_string());
            return Ok((safe, meta));
        }

        // Parse again into the typed form; the check above proved it valid.
        let proposal = IntentProposal::from_value(parsed)?;
        Ok((proposal, meta))
    }
}
