//! HTTP 클라이언트 생성: 매니페스트 조회와 페이로드 다운로드가 공유한다

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};

use crate::error::UpdaterError;

/// 전송 설정 (호출자가 지정, 하드코딩하지 않음)
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("versync-updater/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// 캐시를 끝까지 비활성화하는 요청 헤더
pub fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, max-age=0"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

/// 매니페스트용 reqwest 클라이언트 (요청 전체에 타임아웃 적용)
pub fn build_client(settings: &HttpSettings) -> Result<reqwest::Client, UpdaterError> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout)
        .default_headers(no_cache_headers())
        .build()
        .map_err(|e| UpdaterError::from_reqwest(&e, "build HTTP client"))
}

/// 페이로드 다운로드용 클라이언트.
/// 연결 단계에만 타임아웃을 둔다. 본문 수신 중 멈춤은 `PayloadDownloader`가 청크 단위로 감시한다.
pub fn build_download_client(settings: &HttpSettings) -> Result<reqwest::Client, UpdaterError> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .connect_timeout(settings.timeout)
        .default_headers(no_cache_headers())
        .build()
        .map_err(|e| UpdaterError::from_reqwest(&e, "build HTTP client"))
}
