//! Registrar collaborator: the service of record for indexable data products.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::RegistrarConfig;
use crate::http_client::HttpClient;
use crate::models::RegistrarRecord;

/// Lists every data-product record known to the registrar.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn list_records(&self) -> Result<Vec<RegistrarRecord>>;
}

/// Registrar reached over HTTP at `http://{host}:{port}{service}`.
pub struct HttpRegistrar {
    client: HttpClient,
    config: RegistrarConfig,
}

impl HttpRegistrar {
    pub fn new(client: HttpClient, config: RegistrarConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn list_records(&self) -> Result<Vec<RegistrarRecord>> {
        self.client
            .request(
                &self.config.host,
                self.config.port,
                &self.config.service,
                &self.config.method,
                &[],
            )
            .await
    }
}
