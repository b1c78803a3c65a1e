use crrmon_common::{
    ProvisioningResponse,
    error::{CrrError, Result},
};
use reqwest::header::CONTENT_TYPE;
use tracing::info;
use url::Url;

/// Delivers the outcome document to the pre-signed URL of the provisioning
/// engine.
#[derive(Clone, Default)]
pub struct Responder {
    client: reqwest::Client,
}

impl Responder {
    pub async fn send(&self, response_url: &str, response: &ProvisioningResponse) -> Result<()> {
        let url = Url::parse(response_url).map_err(|err| {
            CrrError::InvalidArgument(format!("invalid response url {response_url}: {err}"))
        })?;
        let body = serde_json::to_vec(response)?;

        // The pre-signed URL is signed without a content type.
        let reply = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .map_err(|err| CrrError::service("http", "PutResponse", err))?;

        if !reply.status().is_success() {
            return Err(CrrError::service(
                "http",
                "PutResponse",
                format!("response endpoint returned status {}", reply.status()),
            ));
        }

        info!(
            request_id = %response.request_id,
            status = ?response.status,
            "response delivered"
        );
        Ok(())
    }
}
