use super::BlobStore;
use crate::models::S3Config;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, types::ObjectCannedAcl, Client as S3Client};

/// S3-compatible object store. Keys are namespaced under a fixed prefix.
pub struct S3Store {
    client: S3Client,
    key_prefix: String,
}

impl S3Store {
    pub async fn new(config: &S3Config) -> Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "image-compressor",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .load()
            .await;

        // Most S3-compatible services only support path-style addressing.
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            key_prefix: config.key_prefix.trim_matches('/').to_string(),
        })
    }

    fn object_key(&self, key: &str) -> String {
        object_key(&self.key_prefix, key)
    }
}

fn object_key(prefix: &str, key: &str) -> String {
    let key = key.trim_start_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let object_key = self.object_key(key);
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => {
                    Error::NotFound(format!("s3://{}/{}", bucket, object_key))
                }
                _ => Error::Storage(format!("Failed to get object: {}", e)),
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Read(format!("Failed to read body: {}", e)))?;

        Ok(bytes.to_vec())
    }

    async fn put(&self, bucket: &str, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        let body = ByteStream::from(data.to_vec());

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(self.object_key(key))
            .body(body)
            .acl(ObjectCannedAcl::PublicRead);
        if !content_type.is_empty() {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Failed to upload file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::object_key;

    #[test]
    fn test_object_key_is_prefixed() {
        assert_eq!(object_key("storage", "comp/a.jpeg"), "storage/comp/a.jpeg");
        assert_eq!(object_key("storage", "/comp/a.jpeg"), "storage/comp/a.jpeg");
        assert_eq!(object_key("", "comp/a.jpeg"), "comp/a.jpeg");
    }
}
