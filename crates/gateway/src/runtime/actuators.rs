//! Tool dispatch: the actuator seam the executor drives.
//!
//! The executor is oblivious to actuator semantics; it hands over
//! `(tool, parameters, request_id, action_id, dry_run)` and records whatever
//! comes back. The shipped dispatcher covers the lights webhook, media keys,
//! and gated keypress injection; everything else is an execution error.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use wd_domain::config::ActuatorConfig;
use wd_domain::error::{Error, Result};
use wd_domain::time::utc_now_iso;
use wd_policy::canonical_tool_name;

use crate::runtime::keys::{
    key_to_vk, KeyInjector, UnsupportedKeyInjector, VK_MEDIA_NEXT_TRACK, VK_MEDIA_PLAY_PAUSE,
};

/// Longest webhook response body kept in action output.
const MAX_WEBHOOK_BODY_CHARS: usize = 500;

/// The actuator interface. Implementations must be cancel-safe; the executor
/// wraps calls in the per-action timeout budget.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: &Map<String, Value>,
        request_id: &str,
        action_id: &str,
        dry_run: bool,
    ) -> Result<Value>;
}

/// Lists processes running on the host, for the keypress safety gate. The
/// real enumeration is platform-adapter work.
pub trait ProcessList: Send + Sync {
    fn running_processes(&self) -> Vec<String>;
}

/// Host-neutral process list: reports nothing running, which keeps the
/// keypress gate closed until a platform adapter supplies a real one.
#[derive(Debug, Default)]
pub struct EmptyProcessList;

impl ProcessList for EmptyProcessList {
    fn running_processes(&self) -> Vec<String> {
        Vec::new()
    }
}

fn stub_output(tool_name: &str, action_id: &str, parameters: &Map<String, Value>, reason: &str) -> Value {
    json!({
        "stub_execution": true,
        "dry_run": true,
        "tool_name": tool_name,
        "action_id": action_id,
        "parameters": parameters,
        "result": reason,
    })
}

/// The shipped actuator dispatcher.
pub struct Actuators {
    config: ActuatorConfig,
    http: reqwest::Client,
    keys: Box<dyn KeyInjector>,
    processes: Box<dyn ProcessList>,
}

impl Actuators {
    pub fn new(config: ActuatorConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(
                config.lights_webhook_timeout_sec.max(0.1),
            ))
            .build()
            .unwrap_or_default();
        Self {
            config,
            http,
            keys: Box::new(UnsupportedKeyInjector),
            processes: Box::new(EmptyProcessList),
        }
    }

    /// Swap the key injector (platform adapters, tests).
    pub fn with_key_injector(mut self, keys: Box<dyn KeyInjector>) -> Self {
        self.keys = keys;
        self
    }

    /// Swap the process list (platform adapters, tests).
    pub fn with_process_list(mut self, processes: Box<dyn ProcessList>) -> Self {
        self.processes = processes;
        self
    }

    fn lights_url(&self, scene: &str) -> Result<String> {
        if let Some(template) = &self.config.lights_webhook_url_template {
            // Scene names are single words from a closed set, but encode
            // anyway since the value rides in a URL.
            let encoded: String = scene
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                        c.to_string()
                    } else {
                        format!("%{:02X}", c as u32)
                    }
                })
                .collect();
            return Ok(template.replace("{scene}", &encoded));
        }
        if let Some(url) = &self.config.lights_webhook_url {
            return Ok(url.clone());
        }
        Err(Error::validation(
            "set_lights is not configured (set LIGHTS_WEBHOOK_URL or LIGHTS_WEBHOOK_URL_TEMPLATE)",
        ))
    }

    async fn execute_set_lights(
        &self,
        parameters: &Map<String, Value>,
        request_id: &str,
        action_id: &str,
    ) -> Result<Value> {
        let scene = parameters
            .get("scene")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("default");
        let url = self.lights_url(scene)?;
        let payload = json!({
            "scene": scene,
            "request_id": request_id,
            "action_id": action_id,
            "timestamp_utc": utc_now_iso(),
        });
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Http(format!("set_lights webhook request failed: {e}")))?;
        let status = response.status();
        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(MAX_WEBHOOK_BODY_CHARS)
            .collect();
        if !status.is_success() {
            return Err(Error::Http(format!(
                "set_lights webhook HTTP {status}: {body}"
            )));
        }
        Ok(json!({
            "scene": scene,
            "webhook_url": url,
            "http_status": status.as_u16(),
            "response_body": body,
        }))
    }

    fn execute_music(&self, tool_key: &str) -> Result<Value> {
        let (vk_code, vk_name) = match tool_key {
            "sammi.music_next" => (VK_MEDIA_NEXT_TRACK, "VK_MEDIA_NEXT_TRACK"),
            "sammi.music_pause" | "sammi.music_resume" => {
                (VK_MEDIA_PLAY_PAUSE, "VK_MEDIA_PLAY_PAUSE")
            }
            other => return Err(Error::validation(format!("unsupported music tool: {other}"))),
        };
        self.keys.send_virtual_key(vk_code)?;
        Ok(json!({"virtual_key": vk_name, "vk_code": vk_code}))
    }

    fn execute_keypress(&self, parameters: &Map<String, Value>) -> Result<Value> {
        if !self.config.enable_keypress {
            return Err(Error::validation(
                "keypress actuator is disabled (set ENABLE_KEYPRESS=1)",
            ));
        }
        let allowed = &self.config.keypress_allowed_processes;
        if !allowed.is_empty() {
            let running: Vec<String> = self
                .processes
                .running_processes()
                .iter()
                .map(|p| p.to_lowercase())
                .collect();
            if !allowed.iter().any(|p| running.contains(p)) {
                return Err(Error::validation(
                    "keypress denied: no allowed process is currently running",
                ));
            }
        }
        let key_name = parameters
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        let vk_code = key_to_vk(key_name)?;
        self.keys.send_virtual_key(vk_code)?;
        Ok(json!({"key": key_name, "vk_code": vk_code}))
    }
}

#[async_trait]
impl ToolDispatcher for Actuators {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: &Map<String, Value>,
        request_id: &str,
        action_id: &str,
        dry_run: bool,
    ) -> Result<Value> {
        if !self.config.enable_actuators {
            return Ok(stub_output(
                tool_name,
                action_id,
                parameters,
                "Actuators disabled by configuration (ENABLE_ACTUATORS=0).",
            ));
        }
        if dry_run {
            return Ok(stub_output(
                tool_name,
                action_id,
                parameters,
                "Dry run only. No actuator call executed.",
            ));
        }

        let tool_key = canonical_tool_name(tool_name);
        let details = match tool_key.as_str() {
            "sammi.set_lights" => {
                self.execute_set_lights(parameters, request_id, action_id)
                    .await?
            }
            "sammi.music_next" | "sammi.music_pause" | "sammi.music_resume" => {
                self.execute_music(&tool_key)?
            }
            "input.keypress" => self.execute_keypress(parameters)?,
            other => {
                return Err(Error::validation(format!("unsupported tool: {other}")));
            }
        };

        Ok(json!({
            "stub_execution": false,
            "dry_run": false,
            "tool_name": tool_name,
            "action_id": action_id,
            "parameters": parameters,
            "result": "Actuator executed.",
            "details": details,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingKeys(std::sync::Mutex<Vec<u16>>);

    impl KeyInjector for RecordingKeys {
        fn send_virtual_key(&self, vk_code: u16) -> Result<()> {
            self.0.lock().unwrap().push(vk_code);
            Ok(())
        }
    }

    struct StaticProcesses(Vec<String>);

    impl ProcessList for StaticProcesses {
        fn running_processes(&self) -> Vec<String> {
            self.0.clone()
        }
    }

    fn config() -> ActuatorConfig {
        ActuatorConfig {
            enable_actuators: true,
            enable_keypress: true,
            ..ActuatorConfig::default()
        }
    }

    fn params(key: &str, value: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(key.into(), json!(value));
        map
    }

    #[tokio::test]
    async fn dry_run_returns_stub_output() {
        let actuators = Actuators::new(config());
        let output = actuators
            .execute("set_lights", &params("scene", "combat"), "req-1", "a1", true)
            .await
            .unwrap();
        assert_eq!(output["stub_execution"], json!(true));
        assert_eq!(output["dry_run"], json!(true));
    }

    #[tokio::test]
    async fn disabled_actuators_stub_even_live_runs() {
        let actuators = Actuators::new(ActuatorConfig {
            enable_actuators: false,
            ..config()
        });
        let output = actuators
            .execute("music_next", &Map::new(), "req-1", "a1", false)
            .await
            .unwrap();
        assert_eq!(output["stub_execution"], json!(true));
    }

    #[tokio::test]
    async fn music_sends_media_key() {
        let keys = Box::new(RecordingKeys(std::sync::Mutex::new(Vec::new())));
        let actuators = Actuators::new(config()).with_key_injector(keys);
        let output = actuators
            .execute("music_next", &Map::new(), "req-1", "a1", false)
            .await
            .unwrap();
        assert_eq!(output["details"]["virtual_key"], json!("VK_MEDIA_NEXT_TRACK"));
    }

    #[tokio::test]
    async fn keypress_requires_enabled_flag() {
        let actuators = Actuators::new(ActuatorConfig {
            enable_keypress: false,
            ..config()
        });
        let err = actuators
            .execute("keypress", &params("key", "space"), "req-1", "a1", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[tokio::test]
    async fn keypress_requires_allowed_process_running() {
        let actuators = Actuators::new(config())
            .with_key_injector(Box::new(RecordingKeys(std::sync::Mutex::new(Vec::new()))));
        let err = actuators
            .execute("keypress", &params("key", "space"), "req-1", "a1", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no allowed process"));

        let actuators = Actuators::new(config())
            .with_key_injector(Box::new(RecordingKeys(std::sync::Mutex::new(Vec::new()))))
            .with_process_list(Box::new(StaticProcesses(vec![
                "EliteDangerous64.exe".into()
            ])));
        let output = actuators
            .execute("keypress", &params("key", "space"), "req-1", "a1", false)
            .await
            .unwrap();
        assert_eq!(output["details"]["vk_code"], json!(0x20));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let actuators = Actuators::new(config());
        let err = actuators
            .execute("teleport", &Map::new(), "req-1", "a1", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported tool"));
    }

    #[tokio::test]
    async fn set_lights_requires_configuration() {
        let actuators = Actuators::new(config());
        let err = actuators
            .execute("set_lights", &params("scene", "combat"), "req-1", "a1", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn lights_template_substitutes_scene() {
        let actuators = Actuators::new(ActuatorConfig {
            lights_webhook_url_template: Some("http://lights.local/hook/{scene}".into()),
            ..config()
        });
        assert_eq!(
            actuators.lights_url("combat").unwrap(),
            "http://lights.local/hook/combat"
        );
        assert_eq!(
            actuators.lights_url("night ops").unwrap(),
            "http://lights.local/hook/night%20ops"
        );
    }
}
