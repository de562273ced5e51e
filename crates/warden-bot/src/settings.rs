//! Feature-flag lookups consulted by the command router.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::SettingsError;

/// Who is asking, and the backend token to ask with.
pub struct SettingsRequest<'a> {
    pub user_id: &'a str,
    pub bearer: Option<&'a str>,
}

#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Boolean value of `key` for this user. Unknown keys are `false`.
    async fn flag(&self, key: &str, req: &SettingsRequest<'_>) -> Result<bool, SettingsError>;
}

/// Fixed in-process flags.
#[derive(Debug, Default, Clone)]
pub struct StaticSettings {
    flags: HashMap<String, bool>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: bool) -> Self {
        self.flags.insert(key.into(), value);
        self
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn flag(&self, key: &str, _req: &SettingsRequest<'_>) -> Result<bool, SettingsError> {
        Ok(self.flags.get(key).copied().unwrap_or(false))
    }
}

/// Settings service behind the backend: `POST {"settingName": [key]}` with
/// the user's backend token, answered by `[{"name", "value"}]`.
pub struct HttpSettingsSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSettingsSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SettingsError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SettingsSource for HttpSettingsSource {
    async fn flag(&self, key: &str, req: &SettingsRequest<'_>) -> Result<bool, SettingsError> {
        let bearer = req.bearer.ok_or(SettingsError::NoToken)?;
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(bearer)
            .json(&json!({ "settingName": [key] }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SettingsError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        let settings: Vec<Setting> = resp
            .json()
            .await
            .map_err(|e| SettingsError::Parse(e.to_string()))?;
        let value = settings
            .iter()
            .find(|s| s.name == key)
            .or_else(|| settings.first())
            .map(|s| truthy(&s.value))
            .unwrap_or(false);
        debug!(key, value, user = req.user_id, "setting resolved");
        Ok(value)
    }
}

#[derive(Deserialize)]
struct Setting {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: Value,
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!("True")));
        assert!(truthy(&json!(1)));
        assert!(!truthy(&json!("yes")));
        assert!(!truthy(&Value::Null));
    }

    #[tokio::test]
    async fn static_settings_default_false() {
        let s = StaticSettings::new().with("on", true);
        let req = SettingsRequest { user_id: "u", bearer: None };
        assert!(s.flag("on", &req).await.unwrap());
        assert!(!s.flag("off", &req).await.unwrap());
    }
}
