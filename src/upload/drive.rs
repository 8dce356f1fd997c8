//! OneDrive uploader
//!
//! Walks the data directory and PUTs every file into the project's drive
//! folder. A file is deleted locally only when the drive confirmed the
//! upload (200 for an overwrite, 201 for a new item); anything else leaves
//! the file in place so the next scheduled run picks it up again.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::types::{AccessToken, UploadError, UploadReport};

/// Uploader for a single drive folder endpoint
pub struct DriveUploader {
    client: Client,
    endpoint: String,
    token: AccessToken,
}

impl DriveUploader {
    /// Create an uploader for the given drive folder endpoint
    pub fn new(endpoint: String, token: AccessToken) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Upload every file under `dir` (recursively), deleting each local copy
    /// once the drive confirmed it.
    pub async fn sync_directory(&self, dir: &Path) -> Result<UploadReport, UploadError> {
        info!("Uploading files from {}", dir.display());
        let mut report = UploadReport::default();

        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(|e| UploadError::IoError(std::io::Error::from(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let filename = entry.file_name().to_string_lossy().to_string();
            info!("Uploading {}", filename);

            if self.upload_file(entry.path(), &filename).await? {
                std::fs::remove_file(entry.path())?;
                info!("Original file deleted: {}", filename);
                report.uploaded += 1;
            } else {
                report.skipped += 1;
            }
        }

        Ok(report)
    }

    /// PUT one file's bytes to `{endpoint}/{filename}:/content`.
    /// Returns whether the drive confirmed the upload.
    async fn upload_file(&self, path: &Path, filename: &str) -> Result<bool, UploadError> {
        let bytes = tokio::fs::read(path).await?;
        let url = format!(
            "{}/{}:/content",
            self.endpoint,
            urlencoding::encode(filename)
        );

        let response = self
            .client
            .put(&url)
            .bearer_auth(self.token.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(true),
            status => {
                warn!(
                    "Upload of {} returned HTTP {}, leaving file for the next run",
                    filename, status
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn uploader_for(server: &MockServer) -> DriveUploader {
        let endpoint = format!("{}/v1.0/users/me/drive/root:/Harmony_csv", server.uri());
        DriveUploader::new(endpoint, AccessToken::new("tok-abc")).unwrap()
    }

    #[tokio::test]
    async fn test_upload_deletes_file_on_created() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1.0/users/me/drive/root:/Harmony_csv/report.csv:/content"))
            .and(header("Authorization", "Bearer tok-abc"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.csv");
        std::fs::write(&file, "a,b\n1,2\n").unwrap();

        let report = uploader_for(&server).sync_directory(dir.path()).await.unwrap();

        assert_eq!(report, UploadReport { uploaded: 1, skipped: 0 });
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_upload_keeps_file_on_non_success() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(507))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.csv");
        std::fs::write(&file, "a,b\n").unwrap();

        let report = uploader_for(&server).sync_directory(dir.path()).await.unwrap();

        assert_eq!(report, UploadReport { uploaded: 0, skipped: 1 });
        assert!(file.exists(), "file must stay for the next run");
    }

    #[tokio::test]
    async fn test_sync_walks_subdirectories() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.csv"), "x\n").unwrap();
        let nested = dir.path().join("2024").join("06");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("deep.csv"), "y\n").unwrap();

        let report = uploader_for(&server).sync_directory(dir.path()).await.unwrap();

        assert_eq!(report.uploaded, 2);
        assert!(!dir.path().join("top.csv").exists());
        assert!(!nested.join("deep.csv").exists());
    }

    #[tokio::test]
    async fn test_sync_empty_directory_is_a_no_op() {
        let server = MockServer::start().await;

        let dir = tempfile::tempdir().unwrap();
        let report = uploader_for(&server).sync_directory(dir.path()).await.unwrap();

        assert_eq!(report, UploadReport::default());
    }
}
