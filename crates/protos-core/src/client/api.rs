//! Resource, provider, info and user operations
//!
//! Each operation is a single round trip through [`ProtosClient::execute`].

use super::{Method, ProtosClient};
use crate::error::{Error, Result};
use crate::resource::{Resource, ResourceStatus, ResourceValue, Resources};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// Information about the requesting app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// App name
    #[serde(alias = "Name")]
    pub name: String,
}

/// Information about an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, rename = "isadmin", alias = "IsAdmin")]
    pub is_admin: bool,
}

#[derive(Deserialize)]
struct DomainInfo {
    #[serde(alias = "Domain")]
    domain: String,
}

#[derive(Serialize)]
struct Login<'a> {
    username: &'a str,
    password: &'a str,
}

impl ProtosClient {
    /// Create a resource and return it as stored by the host
    pub async fn create_resource(&self, resource: &Resource) -> Result<Resource> {
        debug!("Creating {} resource", resource.resource_type());
        self.execute_json(Method::POST, "resource", Some(resource))
            .await
    }

    /// Retrieve a resource by id
    pub async fn get_resource(&self, resource_id: &str) -> Result<Resource> {
        self.execute_json::<(), _>(Method::GET, &format!("resource/{}", resource_id), None)
            .await
    }

    /// Delete a resource by id
    pub async fn delete_resource(&self, resource_id: &str) -> Result<()> {
        self.execute(Method::DELETE, &format!("resource/{}", resource_id), None)
            .await?;
        Ok(())
    }

    /// Replace the value of a resource
    ///
    /// The host exposes this under the non-standard `UPDATE` verb.
    pub async fn update_resource_value(
        &self,
        resource_id: &str,
        value: &ResourceValue,
    ) -> Result<()> {
        let method = Method::from_bytes(b"UPDATE")
            .map_err(|e| Error::invalid_input(format!("Invalid HTTP method: {}", e)))?;
        let body = serde_json::to_vec(&value.to_json()?)?;
        self.execute(method, &format!("resource/{}", resource_id), Some(body))
            .await?;
        Ok(())
    }

    /// Set the status of a resource
    pub async fn set_resource_status(
        &self,
        resource_id: &str,
        status: ResourceStatus,
    ) -> Result<()> {
        let body = serde_json::to_vec(&json!({ "status": status }))?;
        self.execute(Method::POST, &format!("resource/{}", resource_id), Some(body))
            .await?;
        debug!("Resource {} is now {}", resource_id, status);
        Ok(())
    }

    /// Apply the same status to every given resource
    ///
    /// Stops at the first failure; resources before it keep their new status.
    pub async fn set_status_batch<'a, I>(&self, resources: I, status: ResourceStatus) -> Result<()>
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        for resource in resources {
            self.set_resource_status(&resource.id, status)
                .await
                .map_err(|e| {
                    Error::Other(format!(
                        "Could not set status for resource {}: {}",
                        resource.id, e
                    ))
                })?;
        }
        Ok(())
    }

    /// List the resources this provider is responsible for
    pub async fn get_resources(&self) -> Result<Resources> {
        self.execute_json::<(), _>(Method::GET, "resource/provider", None)
            .await
    }

    /// Register this app as the provider of a resource type
    pub async fn register_provider(&self, resource_type: &str) -> Result<()> {
        self.execute(
            Method::POST,
            &format!("provider/{}", resource_type),
            Some(Vec::new()),
        )
        .await?;
        info!("Registered as {} provider", resource_type);
        Ok(())
    }

    /// Stop providing a resource type
    pub async fn deregister_provider(&self, resource_type: &str) -> Result<()> {
        self.execute(
            Method::DELETE,
            &format!("provider/{}", resource_type),
            Some(Vec::new()),
        )
        .await?;
        info!("Deregistered as {} provider", resource_type);
        Ok(())
    }

    /// Domain name of the host instance
    pub async fn get_domain(&self) -> Result<String> {
        let info: DomainInfo = self
            .execute_json::<(), _>(Method::GET, "info/domain", None)
            .await?;
        Ok(info.domain)
    }

    /// Information about the requesting app
    pub async fn get_app_info(&self) -> Result<AppInfo> {
        self.execute_json::<(), _>(Method::GET, "info/app", None)
            .await
    }

    /// Authenticate a user
    ///
    /// The password is sent in the request body and never logged.
    pub async fn auth_user(&self, username: &str, password: &str) -> Result<UserInfo> {
        let login = Login { username, password };
        self.execute_json(Method::GET, "user/auth", Some(&login))
            .await
    }
}
