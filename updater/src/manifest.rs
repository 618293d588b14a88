//! 업데이트 매니페스트 조회 및 검증
//!
//! 매니페스트 엔드포인트는 다음 형식의 JSON을 반환해야 합니다:
//! ```json
//! {
//!   "DownloadURL": "https://example.com/releases/app.zip",
//!   "NewestVersionVersion": "2.0.0.0",
//!   "Checksum": "CF83E1357EEFB8BD...",
//!   "Size": 1048576
//! }
//! ```
//! `Checksum`은 SHA-512 hex 다이제스트이며 대소문자를 구분하지 않습니다.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::UpdaterError;
use crate::transport::{build_client, HttpSettings};
use crate::version::AppVersion;

/// 원격 업데이트 정보: 세션 하나 동안만 사용된다
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    #[serde(rename = "DownloadURL", default)]
    pub download_url: String,
    #[serde(rename = "NewestVersionVersion", default)]
    pub newest_version: String,
    #[serde(rename = "Checksum", default)]
    pub checksum: String,
    /// 선택: 페이로드 크기 (bytes)
    #[serde(rename = "Size", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl UpdateManifest {
    /// 필수 필드 검증. 다운로드 전에 반드시 통과해야 한다.
    pub fn check(&self) -> Result<(), UpdaterError> {
        if self.download_url.trim().is_empty() {
            return Err(UpdaterError::missing("DownloadURL"));
        }
        if self.newest_version.trim().is_empty() {
            return Err(UpdaterError::missing("NewestVersionVersion"));
        }
        if self.checksum.trim().is_empty() {
            return Err(UpdaterError::missing("Checksum"));
        }

        self.version()?;
        self.url()?;
        Ok(())
    }

    /// 파싱된 최신 버전
    pub fn version(&self) -> Result<AppVersion, UpdaterError> {
        AppVersion::parse(&self.newest_version).ok_or_else(|| {
            UpdaterError::validation(
                "NewestVersionVersion",
                format!("'{}' is not a valid version", self.newest_version),
            )
        })
    }

    /// 파싱된 다운로드 URL (http/https만 허용)
    pub fn url(&self) -> Result<Url, UpdaterError> {
        let url = Url::parse(self.download_url.trim()).map_err(|e| {
            UpdaterError::validation("DownloadURL", format!("'{}': {}", self.download_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(UpdaterError::validation(
                "DownloadURL",
                format!("unsupported scheme '{}'", other),
            )),
        }
    }

    /// 설치된 최대 버전보다 엄격하게 새로우면 true.
    /// 설치된 버전이 없으면 0.0.0.0과 비교한다.
    pub fn is_update_available(&self, installed: Option<&AppVersion>) -> bool {
        let installed = installed.copied().unwrap_or(AppVersion::ZERO);
        match self.version() {
            Ok(newest) => newest.is_newer_than(&installed),
            Err(_) => false,
        }
    }
}

/// 매니페스트 조회기: 호출 사이에 상태를 갖지 않는다
#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    endpoint: String,
    http: reqwest::Client,
}

impl ManifestFetcher {
    pub fn new(endpoint: &str, settings: &HttpSettings) -> Result<Self, UpdaterError> {
        Ok(Self::with_client(endpoint, build_client(settings)?))
    }

    pub fn with_client(endpoint: &str, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.trim().to_string(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 매니페스트를 한 번 요청해 파싱하고 검증한다
    pub async fn fetch(&self) -> Result<UpdateManifest, UpdaterError> {
        if self.endpoint.is_empty() {
            return Err(UpdaterError::missing("manifest_url"));
        }

        tracing::info!("[Manifest] Fetching update manifest from {}", self.endpoint);

        let response = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "fetch manifest"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpdaterError::Transport {
                operation: "fetch manifest".to_string(),
                status_code: Some(status.as_u16()),
                message: format!("server returned {}: {}", status, body.trim()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "read manifest body"))?;
        if body.trim().is_empty() {
            return Err(UpdaterError::Transport {
                operation: "read manifest body".to_string(),
                status_code: Some(status.as_u16()),
                message: "empty response body".to_string(),
            });
        }

        let manifest: UpdateManifest = serde_json::from_str(&body)
            .map_err(|e| UpdaterError::validation("manifest", format!("malformed JSON: {}", e)))?;
        manifest.check()?;

        tracing::info!(
            "[Manifest] Newest version {} at {}",
            manifest.newest_version,
            manifest.download_url
        );
        Ok(manifest)
    }
}
