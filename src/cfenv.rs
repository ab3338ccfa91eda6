//! Cloud Foundry service bindings.
//!
//! The platform injects bound service credentials as JSON through
//! `VCAP_SERVICES` (`{"<label>": [<service>, ...]}`) and describes the running
//! application through `VCAP_APPLICATION`. This module parses both and knows
//! how to turn a Redis/Valkey binding into a connection URL.
use std::collections::BTreeMap;
use std::env::VarError;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub const VCAP_SERVICES: &str = "VCAP_SERVICES";
pub const VCAP_APPLICATION: &str = "VCAP_APPLICATION";

const REDIS_TAGS: &[&str] = &["redis", "valkey"];
const REDIS_LABEL_PREFIXES: &[&str] = &["redis", "valkey"];
const DEFAULT_REDIS_PORT: u16 = 6379;

#[derive(Clone, Debug, Default)]
pub struct CfEnv {
    services: BTreeMap<String, Vec<CfService>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CfService {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub binding_name: Option<String>,
    #[serde(default)]
    pub credentials: CfCredentials,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct CfCredentials(Map<String, Value>);

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CfApplication {
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub instance_index: Option<u32>,
    #[serde(default)]
    pub space_name: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub application_uris: Vec<String>,
}

impl CfEnv {
    /// Reads `VCAP_SERVICES`; `None` when the variable is unset (not running on
    /// the platform).
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(VCAP_SERVICES) {
            Ok(raw) => Self::parse(&raw).map(Some),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                bail!("{VCAP_SERVICES} contains invalid unicode characters")
            }
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let services = serde_json::from_str(raw)
            .with_context(|| format!("{VCAP_SERVICES} must contain valid service JSON"))?;
        Ok(Self { services })
    }

    pub fn services(&self) -> impl Iterator<Item = &CfService> {
        self.services.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.services().next().is_none()
    }

    pub fn find_service_by_name(&self, name: &str) -> Option<&CfService> {
        self.services()
            .find(|s| s.name == name || s.instance_name.as_deref() == Some(name))
    }

    pub fn find_services_by_tag<'a>(&'a self, tags: &'a [&'a str]) -> impl Iterator<Item = &'a CfService> {
        self.services().filter(move |s| s.has_any_tag(tags))
    }

    pub fn find_services_by_label<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a CfService> {
        self.services().filter(move |s| s.label_starts_with(prefix))
    }

    /// The binding to connect to: `name` when given, otherwise the first
    /// service that looks like Redis or Valkey.
    pub fn redis_service(&self, name: Option<&str>) -> Result<Option<&CfService>> {
        if let Some(name) = name {
            return self
                .find_service_by_name(name)
                .map(Some)
                .with_context(|| format!("no bound service named '{name}' in {VCAP_SERVICES}"));
        }
        Ok(self.services().find(|s| s.is_redis()))
    }
}

impl CfService {
    fn has_any_tag(&self, wanted: &[&str]) -> bool {
        self.tags
            .iter()
            .any(|tag| wanted.iter().any(|w| tag.eq_ignore_ascii_case(w)))
    }

    fn label_starts_with(&self, prefix: &str) -> bool {
        self.label
            .as_deref()
            .is_some_and(|label| {
                label
                    .to_ascii_lowercase()
                    .starts_with(&prefix.to_ascii_lowercase())
            })
    }

    pub fn is_redis(&self) -> bool {
        self.has_any_tag(REDIS_TAGS)
            || REDIS_LABEL_PREFIXES
                .iter()
                .any(|prefix| self.label_starts_with(prefix))
            || self.credentials.redis_uri().is_some()
    }

    /// Connection URL assembled from the binding's credentials.
    pub fn redis_url(&self) -> Result<String> {
        if let Some(uri) = self.credentials.redis_uri() {
            return Ok(uri);
        }

        let host = self
            .credentials
            .host()
            .with_context(|| format!("service '{}' has no host in its credentials", self.name))?;
        let (scheme, port) = match self.credentials.port_of("tls_port")? {
            Some(port) => ("rediss", port),
            None => (
                "redis",
                self.credentials.port_of("port")?.unwrap_or(DEFAULT_REDIS_PORT),
            ),
        };

        build_redis_url(
            scheme,
            host,
            port,
            self.credentials.string("username"),
            self.credentials.string("password"),
        )
        .with_context(|| format!("service '{}' has unusable credentials", self.name))
    }
}

impl CfCredentials {
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn host(&self) -> Option<&str> {
        self.string("host").or_else(|| self.string("hostname"))
    }

    /// Ports arrive as numbers or strings depending on the broker.
    pub fn port_of(&self, key: &str) -> Result<Option<u16>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(Some)
                .with_context(|| format!("credential '{key}' is not a valid port: {n}")),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u16>()
                .map(Some)
                .with_context(|| format!("credential '{key}' is not a valid port: {s}")),
            Some(other) => bail!("credential '{key}' has unexpected type: {other}"),
        }
    }

    /// `uri` or `url` when it uses a Redis-compatible scheme.
    pub fn redis_uri(&self) -> Option<String> {
        ["uri", "url"]
            .into_iter()
            .filter_map(|key| self.string(key))
            .find_map(normalize_redis_uri)
    }
}

impl CfApplication {
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(VCAP_APPLICATION) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Self::parse(&raw).map(Some),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                bail!("{VCAP_APPLICATION} contains invalid unicode characters")
            }
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .with_context(|| format!("{VCAP_APPLICATION} must contain valid application JSON"))
    }
}

/// Accepts `redis`, `rediss`, `valkey` and `valkeys` URLs, rewriting the Valkey
/// schemes to the ones the client understands.
pub fn normalize_redis_uri(raw: &str) -> Option<String> {
    let (scheme, rest) = raw.split_once("://")?;
    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "redis" | "valkey" => "redis",
        "rediss" | "valkeys" => "rediss",
        _ => return None,
    };
    Some(format!("{scheme}://{rest}"))
}

pub fn build_redis_url(
    scheme: &str,
    host: &str,
    port: u16,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<String> {
    let mut url = Url::parse(&format!("{scheme}://{host}"))
        .with_context(|| format!("invalid Redis host '{host}'"))?;
    url.set_port(Some(port))
        .map_err(|()| anyhow::anyhow!("cannot set port on Redis URL"))?;
    if let Some(username) = username {
        url.set_username(username)
            .map_err(|()| anyhow::anyhow!("cannot set username on Redis URL"))?;
    }
    if let Some(password) = password {
        url.set_password(Some(password))
            .map_err(|()| anyhow::anyhow!("cannot set password on Redis URL"))?;
    }
    Ok(url.to_string())
}

/// Replaces the password of a URL for logging.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparseable url>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINDINGS: &str = r#"{
        "p.redis": [{
            "name": "items-cache",
            "label": "p.redis",
            "plan": "cache-small",
            "tags": ["redis", "pivotal"],
            "instance_name": "items-cache",
            "binding_name": null,
            "credentials": {"host": "10.0.0.5", "port": 6379, "password": "s3cr/t"}
        }],
        "user-provided": [{
            "name": "audit-log",
            "label": "user-provided",
            "tags": [],
            "credentials": {"url": "https://audit.example.com"}
        }]
    }"#;

    #[test]
    fn parses_bindings_and_finds_redis() {
        let env = CfEnv::parse(BINDINGS).unwrap();
        assert_eq!(env.services().count(), 2);

        let svc = env.redis_service(None).unwrap().expect("redis binding");
        assert_eq!(svc.name, "items-cache");
        assert_eq!(svc.plan.as_deref(), Some("cache-small"));
        assert_eq!(svc.redis_url().unwrap(), "redis://:s3cr%2Ft@10.0.0.5:6379");
    }

    #[test]
    fn lookups_by_tag_label_and_name() {
        let env = CfEnv::parse(BINDINGS).unwrap();
        assert_eq!(env.find_services_by_tag(&["REDIS"]).count(), 1);
        assert_eq!(env.find_services_by_label("user").count(), 1);
        assert_eq!(env.find_services_by_label("User-Provided").count(), 1);
        assert!(env.find_service_by_name("audit-log").is_some());
        assert!(env.find_service_by_name("missing").is_none());
    }

    #[test]
    fn named_binding_must_exist() {
        let env = CfEnv::parse(BINDINGS).unwrap();
        let err = env.redis_service(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("no bound service named 'nope'"));
    }

    #[test]
    fn prefers_uri_credentials_and_normalizes_valkey() {
        let raw = r#"{"valkey": [{"name": "vk", "label": "valkey", "credentials": {"uri": "valkeys://default:pw@vk.internal:6380"}}]}"#;
        let env = CfEnv::parse(raw).unwrap();
        let svc = env.redis_service(None).unwrap().unwrap();
        assert_eq!(svc.redis_url().unwrap(), "rediss://default:pw@vk.internal:6380");
    }

    #[test]
    fn tls_port_switches_scheme() {
        let raw = r#"{"redis": [{"name": "r", "tags": ["Redis"], "credentials": {"hostname": "cache.local", "port": "6379", "tls_port": "6380", "password": "pw"}}]}"#;
        let env = CfEnv::parse(raw).unwrap();
        let svc = env.redis_service(None).unwrap().unwrap();
        assert_eq!(svc.redis_url().unwrap(), "rediss://:pw@cache.local:6380");
    }

    #[test]
    fn detects_redis_by_credentials_only() {
        let raw = r#"{"user-provided": [{"name": "ups", "credentials": {"uri": "redis://h:1"}}]}"#;
        let env = CfEnv::parse(raw).unwrap();
        assert!(env.redis_service(None).unwrap().is_some());
    }

    #[test]
    fn missing_host_is_an_error() {
        let raw = r#"{"redis": [{"name": "r", "tags": ["redis"], "credentials": {"port": 6379}}]}"#;
        let env = CfEnv::parse(raw).unwrap();
        let svc = env.redis_service(None).unwrap().unwrap();
        let err = svc.redis_url().unwrap_err();
        assert!(err.to_string().contains("service 'r' has no host"));
    }

    #[test]
    fn rejects_bad_ports() {
        let raw = r#"{"redis": [{"name": "r", "tags": ["redis"], "credentials": {"host": "h", "port": 70000}}]}"#;
        let env = CfEnv::parse(raw).unwrap();
        let svc = env.redis_service(None).unwrap().unwrap();
        assert!(svc.redis_url().is_err());
    }

    #[test]
    fn malformed_json_names_the_variable() {
        let err = CfEnv::parse("{not json").unwrap_err();
        assert!(err.to_string().contains(VCAP_SERVICES));
    }

    #[test]
    fn empty_bindings_are_allowed() {
        assert!(CfEnv::parse("").unwrap().is_empty());
        assert!(CfEnv::parse("{}").unwrap().is_empty());
    }

    #[test]
    fn parses_application_metadata() {
        let raw = r#"{"application_name": "items", "application_id": "abc", "instance_index": 2, "space_name": "dev", "organization_name": "acme", "application_uris": ["items.apps.example.com"], "limits": {"mem": 512}}"#;
        let app = CfApplication::parse(raw).unwrap();
        assert_eq!(app.application_name.as_deref(), Some("items"));
        assert_eq!(app.instance_index, Some(2));
        assert_eq!(app.application_uris, ["items.apps.example.com"]);
    }

    #[test]
    fn redacts_passwords() {
        assert_eq!(
            redact_url("redis://user:hunter2@h:6379"),
            "redis://user:****@h:6379"
        );
        assert_eq!(redact_url("redis://h:6379"), "redis://h:6379");
    }
}
