//! Object storage adapter for diary media.
//!
//! Speaks the Supabase-storage-style REST surface: objects are addressed as
//! `{base}/storage/v1/object/{bucket}/{path}` and served publicly from
//! `{base}/storage/v1/object/public/{bucket}/{path}`. The service never
//! proxies downloads; it hands public URLs to the client.

use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct MediaStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl MediaStorage {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build storage HTTP client");

        Self {
            client,
            base_url: config.storage_url.trim_end_matches('/').to_string(),
            service_key: config.storage_service_key.clone(),
            bucket: config.storage_bucket.clone(),
        }
    }

    fn object_endpoint(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    /// Extract the object path out of a public URL for this bucket.
    pub fn object_path_from_url(&self, url: &str) -> Option<String> {
        let marker = format!("/{}/", self.bucket);
        url.split_once(&marker).map(|(_, path)| path.to_string())
    }

    /// Upload an object and return its public URL.
    pub async fn upload(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        let response = self
            .client
            .post(self.object_endpoint(path))
            .bearer_auth(&self.service_key)
            .header("content-type", content_type.to_string())
            .header("cache-control", "max-age=3600")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(anyhow::anyhow!(
                "Object upload failed ({}): {}",
                status,
                body
            )));
        }

        Ok(self.public_url(path))
    }

    /// Delete a single object by its public URL. Returns false when the URL
    /// does not belong to this bucket.
    pub async fn delete_by_url(&self, url: &str) -> AppResult<bool> {
        let Some(path) = self.object_path_from_url(url) else {
            return Ok(false);
        };

        let response = self
            .client
            .delete(self.object_endpoint(&path))
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    /// Best-effort removal of a set of objects. Failures are logged and
    /// swallowed so the caller's primary delete still goes through.
    pub async fn delete_all_by_url(&self, urls: &[String]) {
        for url in urls {
            match self.delete_by_url(url).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(url = %url, "Media URL not in configured bucket, skipping delete");
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Failed to delete media object");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> MediaStorage {
        let config = Config {
            database_url: "postgres://localhost/test".into(),
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            jwt_secret: "secret".into(),
            jwt_access_ttl_secs: 900,
            jwt_refresh_ttl_secs: 604800,
            storage_url: "https://project.example.co/".into(),
            storage_service_key: "service-key".into(),
            storage_bucket: "diary-media".into(),
            media_max_bytes: 100 * 1024 * 1024,
        };
        MediaStorage::new(&config)
    }

    #[test]
    fn public_url_shape() {
        let s = storage();
        assert_eq!(
            s.public_url("abc/1_x.png"),
            "https://project.example.co/storage/v1/object/public/diary-media/abc/1_x.png"
        );
    }

    #[test]
    fn object_path_round_trips_through_public_url() {
        let s = storage();
        let url = s.public_url("entry-1/123_abc.jpg");
        assert_eq!(
            s.object_path_from_url(&url).as_deref(),
            Some("entry-1/123_abc.jpg")
        );
    }

    #[test]
    fn foreign_bucket_url_is_rejected() {
        let s = storage();
        assert_eq!(
            s.object_path_from_url("https://other.example/storage/v1/object/public/avatars/x.png"),
            None
        );
    }
}
