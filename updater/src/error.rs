//! 에러 분류 및 변환 로직
//!
//! ## 에러 종류
//! - `Validation`: 매니페스트/앱 설정 누락·형식 오류 (재시도하지 않음)
//! - `Transport`: 매니페스트 조회, 페이로드 다운로드 중 네트워크 실패
//! - `DownloadIntegrity`: 파일 누락, 확장자, 크기, 체크섬 불일치
//! - `Extraction`: 엔트리별 재시도 한도를 모두 소진한 압축 해제 실패
//! - `Launch`: 새 버전 실행 파일이 없거나 실행 불가 (가장 심각)
//! - `FileSystem`: 그 밖의 로컬 I/O 실패

use std::fmt;

use serde::{Deserialize, Serialize};

/// 다운로드 무결성 검사에서 실패한 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum IntegrityFailure {
    /// 다운로드 후 파일이 존재하지 않음
    Missing,
    /// 파일 크기가 0
    Empty,
    /// zip 이외의 확장자
    WrongExtension { extension: String },
    /// 매니페스트의 Size와 실제 크기가 다름
    SizeMismatch { expected: u64, actual: u64 },
    /// SHA-512 다이제스트 불일치
    ChecksumMismatch { expected: String, actual: String },
}

impl fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityFailure::Missing => write!(f, "file does not exist"),
            IntegrityFailure::Empty => write!(f, "file is empty"),
            IntegrityFailure::WrongExtension { extension } => {
                write!(f, "wrong file type [{}], expected a .zip archive", extension)
            }
            IntegrityFailure::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch, expected {} bytes, got {}", expected, actual)
            }
            IntegrityFailure::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch [{}/{}]", expected, actual)
            }
        }
    }
}

/// 업데이터 에러 타입
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", content = "details")]
pub enum UpdaterError {
    /// 매니페스트 또는 앱 설정의 필수 값 누락/형식 오류
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    /// 네트워크 호출 자체의 실패 (DNS, TLS, 타임아웃, non-2xx, 빈 응답)
    #[error("Transport error during {operation}: {message}")]
    Transport {
        operation: String,
        status_code: Option<u16>,
        message: String,
    },

    /// 다운로드한 아카이브가 무결성 검사를 통과하지 못함
    #[error("Integrity check failed for '{path}': {failure}")]
    DownloadIntegrity { path: String, failure: IntegrityFailure },

    /// 엔트리 쓰기 재시도 한도 초과
    #[error("Extraction of '{entry}' failed after {attempts} attempt(s): {message}")]
    Extraction {
        entry: String,
        attempts: u32,
        message: String,
    },

    /// 실행 파일이 없거나 프로세스를 시작할 수 없음
    #[error("Cannot launch '{path}': {message}")]
    Launch { path: String, message: String },

    /// 압축 해제 이외의 로컬 파일 시스템 오류
    #[error("File system error during {operation} on '{path}': {message}")]
    FileSystem {
        operation: String,
        path: String,
        message: String,
    },
}

impl UpdaterError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        UpdaterError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::validation(field, "missing")
    }

    pub fn launch(path: &std::path::Path, message: impl Into<String>) -> Self {
        UpdaterError::Launch {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// 머신 리더블 에러 코드
    pub fn kind(&self) -> &'static str {
        match self {
            UpdaterError::Validation { .. } => "VALIDATION_ERROR",
            UpdaterError::Transport { .. } => "TRANSPORT_ERROR",
            UpdaterError::DownloadIntegrity { .. } => "DOWNLOAD_INTEGRITY_ERROR",
            UpdaterError::Extraction { .. } => "EXTRACTION_ERROR",
            UpdaterError::Launch { .. } => "LAUNCH_ERROR",
            UpdaterError::FileSystem { .. } => "FILE_SYSTEM_ERROR",
        }
    }

    /// 세션 전체를 다시 실행하면 해결될 가능성이 있는지.
    /// 세션 내부에서 자동 재시도에 쓰이지 않으며 호출자 판단용이다.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpdaterError::Transport { status_code, .. } => match status_code {
                // 4xx는 재시도해도 같은 결과, 408/429만 예외
                Some(code) if (400..500).contains(code) => *code == 408 || *code == 429,
                _ => true,
            },
            UpdaterError::Extraction { .. } => true,
            UpdaterError::FileSystem { .. } => true,
            UpdaterError::Validation { .. } => false,
            UpdaterError::DownloadIntegrity { .. } => false,
            UpdaterError::Launch { .. } => false,
        }
    }

    /// reqwest 에러를 UpdaterError로 변환
    pub fn from_reqwest(err: &reqwest::Error, operation: &str) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        UpdaterError::Transport {
            operation: operation.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// IO 에러를 UpdaterError로 변환
    pub fn from_io(err: &std::io::Error, operation: &str, path: &std::path::Path) -> Self {
        UpdaterError::FileSystem {
            operation: operation.to_string(),
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
