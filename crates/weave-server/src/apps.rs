use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use weave_core::ServiceError;

use crate::collaborators::AppProvider;

/// Lowercase DNS-label-ish app names, max 63 chars.
static APP_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new("^[a-z0-9][a-z0-9-]{0,62}$").expect("app name regex is valid")
});

/// Names that collide with HTTP routes the server already owns.
static RESERVED_APP_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from(["component-types", "index", "health", "static", "api"])
});

/// Fixed CSP served with every app HTML response.
pub const APP_CSP: &str = "default-src 'self'; script-src 'self' 'unsafe-inline' \
https://cdn.jsdelivr.net; style-src 'self' 'unsafe-inline'; img-src 'self' data:; \
connect-src 'self'; frame-ancestors 'self'";

pub fn validate_app_name(name: &str) -> Result<(), ServiceError> {
    if !APP_NAME_RE.is_match(name) {
        return Err(ServiceError::invalid_argument(format!(
            "invalid app name: {}",
            name
        )));
    }
    if RESERVED_APP_NAMES.contains(name) {
        return Err(ServiceError::invalid_argument(format!(
            "app name is reserved: {}",
            name
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub uri: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub mime_type: String,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub prefers_border: bool,
}

/// Declarative input accepted by create/update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub prefers_border: bool,
    #[serde(default)]
    pub spec: serde_json::Value,
}

struct StoredApp {
    info: AppInfo,
    html: String,
}

/// Provider backed by process memory with a minimal spec-to-HTML compiler.
/// Stands in where no external compiler is wired.
#[derive(Default)]
pub struct InMemoryAppProvider {
    apps: RwLock<HashMap<String, StoredApp>>,
}

impl InMemoryAppProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(spec: &AppSpec) -> String {
        let title = if spec.display_name.is_empty() {
            &spec.name
        } else {
            &spec.display_name
        };
        let body = serde_json::to_string_pretty(&spec.spec).unwrap_or_else(|_| "{}".to_string());
        format!(
            "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
             <body>\n<h1>{}</h1>\n<script type=\"application/json\" id=\"app-spec\">{}</script>\n\
             </body>\n</html>\n",
            title, title, body
        )
    }

    fn info_for(spec: &AppSpec) -> AppInfo {
        AppInfo {
            name: spec.name.clone(),
            uri: format!("/apps/{}", spec.name),
            display_name: if spec.display_name.is_empty() {
                spec.name.clone()
            } else {
                spec.display_name.clone()
            },
            description: spec.description.clone(),
            mime_type: "text/html".to_string(),
            dynamic: spec.dynamic,
            prefers_border: spec.prefers_border,
        }
    }
}

#[async_trait]
impl AppProvider for InMemoryAppProvider {
    async fn list_app_info(&self) -> Vec<AppInfo> {
        let apps = self.apps.read().unwrap_or_else(|e| e.into_inner());
        let mut infos: Vec<AppInfo> = apps.values().map(|app| app.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    async fn get_app_html(&self, name: &str) -> Option<String> {
        let apps = self.apps.read().unwrap_or_else(|e| e.into_inner());
        apps.get(name).map(|app| app.html.clone())
    }

    async fn create_app(&self, spec: AppSpec) -> Result<AppInfo, ServiceError> {
        validate_app_name(&spec.name)?;
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());
        if apps.contains_key(&spec.name) {
            return Err(ServiceError::already_exists(format!(
                "app already exists: {}",
                spec.name
            )));
        }
        let info = Self::info_for(&spec);
        let html = Self::compile(&spec);
        apps.insert(spec.name.clone(), StoredApp { info: info.clone(), html });
        Ok(info)
    }

    async fn update_app(&self, name: &str, spec: AppSpec) -> Result<AppInfo, ServiceError> {
        validate_app_name(name)?;
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());
        if !apps.contains_key(name) {
            return Err(ServiceError::not_found(format!("app not found: {}", name)));
        }
        let mut spec = spec;
        spec.name = name.to_string();
        let info = Self::info_for(&spec);
        let html = Self::compile(&spec);
        apps.insert(name.to_string(), StoredApp { info: info.clone(), html });
        Ok(info)
    }

    async fn delete_app(&self, name: &str) -> Result<(), ServiceError> {
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());
        apps.remove(name)
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found(format!("app not found: {}", name)))
    }

    async fn list_component_types(&self) -> Vec<String> {
        vec![
            "chart".to_string(),
            "form".to_string(),
            "markdown".to_string(),
            "table".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation_matches_pattern() {
        assert!(validate_app_name("dashboard").is_ok());
        assert!(validate_app_name("a").is_ok());
        assert!(validate_app_name("report-7").is_ok());
        assert!(validate_app_name(&"a".repeat(63)).is_ok());

        assert!(validate_app_name("").is_err());
        assert!(validate_app_name("-lead-dash").is_err());
        assert!(validate_app_name("Upper").is_err());
        assert!(validate_app_name("has space").is_err());
        assert!(validate_app_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn reserved_names_are_rejected() {
        assert!(validate_app_name("component-types").is_err());
        assert!(validate_app_name("health").is_err());
    }

    #[tokio::test]
    async fn crud_roundtrip() {
        let provider = InMemoryAppProvider::new();
        let spec = AppSpec {
            name: "dash".to_string(),
            display_name: "Dashboard".to_string(),
            description: "metrics".to_string(),
            dynamic: false,
            prefers_border: true,
            spec: serde_json::json!({"layout": "grid"}),
        };

        let info = provider.create_app(spec.clone()).await.expect("create");
        assert_eq!(info.uri, "/apps/dash");
        assert!(provider.create_app(spec.clone()).await.is_err());

        let html = provider.get_app_html("dash").await.expect("html");
        assert!(html.contains("Dashboard"));

        provider.delete_app("dash").await.expect("delete");
        assert!(provider.get_app_html("dash").await.is_none());
        assert!(provider.delete_app("dash").await.is_err());
    }
}
