//! Ruler and alertmanager operations of [`MimirClient`].

use super::MimirClient;
use crate::backend::{
    AlertmanagerConfig, BackendClient, BackendError, RuleGroup, RuleNamespaces,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use std::collections::BTreeMap;
use tracing::{debug, info};

const YAML_CONTENT_TYPE: &str = "application/yaml";

async fn read_body(response: reqwest::Response) -> Result<String, BackendError> {
    response
        .text()
        .await
        .map_err(|e| BackendError::Decode(format!("failed to read response body: {e}")))
}

#[async_trait]
impl BackendClient for MimirClient {
    async fn create_rule_group(
        &self,
        namespace: &str,
        group: &RuleGroup,
        tenant: Option<&str>,
    ) -> Result<(), BackendError> {
        let body = serde_yaml::to_string(group)
            .map_err(|e| BackendError::Decode(format!("failed to encode rule group: {e}")))?;
        let url = self.ruler_url(&[namespace])?;
        debug!(namespace, group = %group.name, "Creating rule group");

        self.execute(
            "create_rule_group",
            self.request(Method::POST, url, tenant)
                .header(CONTENT_TYPE, YAML_CONTENT_TYPE)
                .body(body),
        )
        .await?;

        info!(
            namespace,
            group = %group.name,
            tenant = self.effective_tenant(tenant),
            "✅ Rule group stored"
        );
        Ok(())
    }

    async fn get_rule_group(
        &self,
        namespace: &str,
        group_name: &str,
        tenant: Option<&str>,
    ) -> Result<RuleGroup, BackendError> {
        let url = self.ruler_url(&[namespace, group_name])?;
        let response = self
            .execute("get_rule_group", self.request(Method::GET, url, tenant))
            .await?;
        let body = read_body(response).await?;
        serde_yaml::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("failed to decode rule group: {e}")))
    }

    async fn list_rules(
        &self,
        namespace: Option<&str>,
        tenant: Option<&str>,
    ) -> Result<RuleNamespaces, BackendError> {
        let url = match namespace {
            Some(ns) => self.ruler_url(&[ns])?,
            None => self.ruler_url(&[])?,
        };
        let response = match self
            .execute("list_rules", self.request(Method::GET, url, tenant))
            .await
        {
            Ok(response) => response,
            // The ruler answers 404 when a tenant or namespace holds no groups
            Err(BackendError::NotFound(_)) => return Ok(RuleNamespaces::new()),
            Err(e) => return Err(e),
        };
        let body = read_body(response).await?;
        if body.trim().is_empty() {
            return Ok(RuleNamespaces::new());
        }
        serde_yaml::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("failed to decode rule listing: {e}")))
    }

    async fn delete_rule_group(
        &self,
        namespace: &str,
        group_name: &str,
        tenant: Option<&str>,
    ) -> Result<(), BackendError> {
        let url = self.ruler_url(&[namespace, group_name])?;
        self.execute("delete_rule_group", self.request(Method::DELETE, url, tenant))
            .await?;
        info!(namespace, group = group_name, "🗑️ Rule group deleted");
        Ok(())
    }

    async fn delete_namespace(
        &self,
        namespace: &str,
        tenant: Option<&str>,
    ) -> Result<(), BackendError> {
        let url = self.ruler_url(&[namespace])?;
        self.execute("delete_namespace", self.request(Method::DELETE, url, tenant))
            .await?;
        info!(namespace, "🗑️ Ruler namespace deleted");
        Ok(())
    }

    async fn create_alertmanager_config(
        &self,
        config: &str,
        templates: &BTreeMap<String, String>,
        tenant: Option<&str>,
    ) -> Result<(), BackendError> {
        let payload = AlertmanagerConfig {
            template_files: templates.clone(),
            alertmanager_config: config.to_string(),
        };
        let body = serde_yaml::to_string(&payload).map_err(|e| {
            BackendError::Decode(format!("failed to encode alertmanager config: {e}"))
        })?;
        let url = self.endpoint(&["api", "v1", "alerts"])?;

        self.execute(
            "create_alertmanager_config",
            self.request(Method::POST, url, tenant)
                .header(CONTENT_TYPE, YAML_CONTENT_TYPE)
                .body(body),
        )
        .await?;

        info!(
            tenant = self.effective_tenant(tenant),
            templates = templates.len(),
            "✅ Alertmanager configuration stored"
        );
        Ok(())
    }

    async fn get_alertmanager_config(
        &self,
        tenant: Option<&str>,
    ) -> Result<AlertmanagerConfig, BackendError> {
        let url = self.endpoint(&["api", "v1", "alerts"])?;
        let response = self
            .execute(
                "get_alertmanager_config",
                self.request(Method::GET, url, tenant),
            )
            .await?;
        let body = read_body(response).await?;
        serde_yaml::from_str(&body).map_err(|e| {
            BackendError::Decode(format!("failed to decode alertmanager config: {e}"))
        })
    }

    async fn delete_alertmanager_config(&self, tenant: Option<&str>) -> Result<(), BackendError> {
        let url = self.endpoint(&["api", "v1", "alerts"])?;
        self.execute(
            "delete_alertmanager_config",
            self.request(Method::DELETE, url, tenant),
        )
        .await?;
        info!(
            tenant = self.effective_tenant(tenant),
            "🗑️ Alertmanager configuration deleted"
        );
        Ok(())
    }

    async fn get_alertmanager_status(
        &self,
        tenant: Option<&str>,
    ) -> Result<serde_json::Value, BackendError> {
        let url = self.endpoint(&["alertmanager", "api", "v2", "status"])?;
        let response = self
            .execute(
                "get_alertmanager_status",
                self.request(Method::GET, url, tenant),
            )
            .await?;
        let body = read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            BackendError::Decode(format!("failed to decode alertmanager status: {e}"))
        })
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let url = self.ruler_url(&[])?;
        self.execute("health_check", self.request(Method::GET, url, None))
            .await?;
        Ok(())
    }

    fn tenant(&self) -> &str {
        &self.tenant
    }
}
