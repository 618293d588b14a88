//! # versync 업데이터 라이브러리
//!
//! 로컬에 설치된 앱을 버전별 폴더(`<prefix><version>`)로 나란히 설치하고,
//! 새 버전이 준비되면 실행 중인 구버전을 종료한 뒤 새 버전을 실행합니다.
//!
//! ## 업데이트 파이프라인
//! 1. **VersionSet(version_set.rs)**: 설치 루트에서 설치된 최대 버전 확인
//! 2. **매니페스트(manifest.rs)**: 원격 매니페스트 조회 및 검증 (캐시 비활성화)
//! 3. **다운로드(download.rs)**: 아카이브 다운로드, 확장자/크기/SHA-512 검증
//! 4. **설치(installer.rs)**: 스테이징 폴더에 압축 해제 후 rename으로 확정
//! 5. **핸드오프(handoff.rs)**: 구버전 프로세스 종료, 새 버전 실행
//!
//! **세션(session.rs)**이 위 단계를 순서대로 실행하며, 한 번에 하나의
//! 세션만 실행됩니다. 단계 전이 규칙은 phase.rs에 있습니다.
//!
//! ## 매니페스트 형식
//! ```json
//! {
//!   "DownloadURL": "https://example.com/releases/app.zip",
//!   "NewestVersionVersion": "2.0.0.0",
//!   "Checksum": "CF83E1357EEFB8BD..."
//! }
//! ```

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod app_info;
pub mod diagnostics;
pub mod download;
pub mod error;
pub mod handoff;
pub mod installer;
pub mod manifest;
pub mod phase;
pub mod session;
pub mod transport;
pub mod version;
pub mod version_set;

#[cfg(test)]
mod tests;

pub use app_info::AppInformation;
pub use diagnostics::DiagnosticLog;
pub use download::{compute_sha512, sha512_hex, PayloadDownloader};
pub use error::{IntegrityFailure, UpdaterError};
pub use handoff::{Handoff, ProcessHandoff, TerminationReport};
pub use installer::{EntryWriter, FsEntryWriter, Installer, RetryPolicy};
pub use manifest::{ManifestFetcher, UpdateManifest};
pub use phase::{SessionPhase, TransitionError};
pub use session::{SessionEvent, SessionOutcome, SessionSettings, SessionStatus, Startup, UpdateSession};
pub use transport::HttpSettings;
pub use version::AppVersion;
pub use version_set::{InstalledVersion, VersionSet};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ══════════════════════════════════════════════════════
// 설정
// ══════════════════════════════════════════════════════

/// 업데이터 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// 버전 폴더 안의 실행 파일 이름 (예: "app.exe")
    pub executable_name: String,
    /// 버전 폴더 접두사 (예: "App" → "App_2.0.0.0")
    pub version_prefix: String,
    /// 버전 폴더들이 놓이는 디렉터리 (기본값: 런처 실행 파일 경로)
    pub install_root: Option<String>,
    /// 매니페스트 JSON URL
    pub manifest_url: String,
    pub http_timeout_secs: u64,
    /// 기본값: "versync-updater/<버전>"
    pub user_agent: Option<String>,
    /// 아카이브 다운로드 디렉터리 (기본값: OS 임시 디렉터리)
    pub download_dir: Option<PathBuf>,
    /// 앱 실행 시 넘길 인자
    pub launch_args: Vec<String>,
    /// 구버전 정상 종료 대기 시간
    pub graceful_exit_timeout_secs: u64,
    /// 엔트리별 압축 해제 시도 횟수 (첫 시도 포함)
    pub extraction_attempts: u32,
    pub extraction_retry_delay_ms: u64,
    /// `await_completion` 폴링 간격
    pub poll_interval_secs: u64,
    /// `await_completion_default` 타임아웃
    pub await_timeout_secs: u64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            executable_name: String::new(),
            version_prefix: String::new(),
            install_root: None,
            manifest_url: String::new(),
            http_timeout_secs: 30,
            user_agent: None,
            download_dir: None,
            launch_args: Vec::new(),
            graceful_exit_timeout_secs: 10,
            extraction_attempts: 10,
            extraction_retry_delay_ms: 2000,
            poll_interval_secs: 2,
            await_timeout_secs: 600,
        }
    }
}

impl UpdaterConfig {
    /// 세션을 만들기 전에 필수 값 확인
    pub fn validate(&self) -> Result<(), UpdaterError> {
        if self.executable_name.trim().is_empty() {
            return Err(UpdaterError::missing("executable_name"));
        }
        if self.version_prefix.trim().is_empty() {
            return Err(UpdaterError::missing("version_prefix"));
        }
        if self.manifest_url.trim().is_empty() {
            return Err(UpdaterError::missing("manifest_url"));
        }
        if self.extraction_attempts == 0 {
            return Err(UpdaterError::validation(
                "extraction_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// 설치 루트 결정: 설정값이 없으면 실행 파일이 있는 디렉터리
    pub fn install_root_path(&self) -> PathBuf {
        if let Some(root) = self.install_root.as_deref().filter(|r| !r.trim().is_empty()) {
            return PathBuf::from(root.trim());
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn app_information(&self) -> Result<AppInformation, UpdaterError> {
        AppInformation::new(
            &self.executable_name,
            self.install_root_path(),
            &self.version_prefix,
        )
    }

    pub fn http_settings(&self) -> HttpSettings {
        let mut settings = HttpSettings {
            timeout: Duration::from_secs(self.http_timeout_secs.max(1)),
            ..HttpSettings::default()
        };
        if let Some(agent) = self.user_agent.as_deref().filter(|a| !a.trim().is_empty()) {
            settings.user_agent = agent.trim().to_string();
        }
        settings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.extraction_attempts.max(1),
            delay: Duration::from_millis(self.extraction_retry_delay_ms),
        }
    }

    pub fn graceful_exit_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_exit_timeout_secs)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            launch_args: self.launch_args.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            await_timeout: Duration::from_secs(self.await_timeout_secs),
        }
    }
}
