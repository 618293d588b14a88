//! 페이로드 다운로드 및 무결성 검증
//!
//! 1. 매번 새 경로로 받는다: 같은 경로에 남은 이전 파일은 먼저 삭제
//! 2. 받은 뒤 존재 여부 → 크기 0 여부 → 확장자 → (Size가 있으면) 크기 → SHA-512 순으로 검사
//! 3. 검사에 실패한 아카이브는 즉시 삭제한다 (압축 해제로 넘어가지 않음)
//!
//! 내부 재시도는 없다. 실패하면 호출자가 세션 전체를 다시 실행할지 결정한다.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use sha2::{Digest, Sha512};
use tokio::io::AsyncWriteExt;

use crate::error::{IntegrityFailure, UpdaterError};
use crate::manifest::UpdateManifest;
use crate::transport::{build_download_client, HttpSettings};

/// URL에서 파일 이름을 얻지 못했을 때 쓰는 이름
const FALLBACK_ARCHIVE_NAME: &str = "update.zip";

/// 페이로드 다운로더
#[derive(Debug, Clone)]
pub struct PayloadDownloader {
    http: reqwest::Client,
    download_dir: PathBuf,
    /// 청크 사이 최대 대기 시간. 넘으면 다운로드를 중단한다.
    stall_timeout: Duration,
}

impl PayloadDownloader {
    /// `download_dir`가 없으면 OS 임시 디렉터리를 쓴다
    pub fn new(download_dir: Option<PathBuf>, settings: &HttpSettings) -> Result<Self, UpdaterError> {
        Ok(Self::with_client(build_download_client(settings)?, download_dir).with_stall_timeout(settings.timeout))
    }

    pub fn with_client(http: reqwest::Client, download_dir: Option<PathBuf>) -> Self {
        Self {
            http,
            download_dir: download_dir.unwrap_or_else(std::env::temp_dir),
            stall_timeout: HttpSettings::default().timeout,
        }
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// 매니페스트 URL의 마지막 경로 조각을 파일 이름으로 쓴다
    pub fn archive_path_for(&self, manifest: &UpdateManifest) -> Result<PathBuf, UpdaterError> {
        let url = manifest.url()?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
            .unwrap_or(FALLBACK_ARCHIVE_NAME)
            .to_string();
        Ok(self.download_dir.join(file_name))
    }

    /// 아카이브를 받아 로컬 경로를 반환한다 (검증은 하지 않음)
    ///
    /// `on_progress`는 청크마다 `(받은 바이트, 전체 바이트)`로 호출된다.
    pub async fn download<F>(&self, manifest: &UpdateManifest, mut on_progress: F) -> Result<PathBuf, UpdaterError>
    where
        F: FnMut(u64, Option<u64>),
    {
        let url = manifest.url()?;
        let dest = self.archive_path_for(manifest)?;

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| UpdaterError::from_io(&e, "create download directory", &self.download_dir))?;

        // 재시도가 이전 시도 위에 겹쳐 쓰지 않도록
        remove_stale(&dest).await?;

        tracing::info!("[Download] Downloading {} -> {}", url, dest.display());

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "download payload"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::Transport {
                operation: "download payload".to_string(),
                status_code: Some(status.as_u16()),
                message: format!("server returned {} for {}", status, url),
            });
        }

        let total = response.content_length().or(manifest.size);
        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| UpdaterError::from_io(&e, "create archive file", &dest))?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        loop {
            // 연결만 열어 두고 데이터를 보내지 않는 서버에 묶이지 않도록 청크마다 타임아웃
            let next = match tokio::time::timeout(self.stall_timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    drop(file);
                    discard_archive(&dest).await;
                    tracing::warn!(
                        "[Download] Stalled after {} bytes (no data for {:?})",
                        downloaded,
                        self.stall_timeout
                    );
                    return Err(UpdaterError::Transport {
                        operation: "download payload".to_string(),
                        status_code: None,
                        message: format!(
                            "no data received for {:?} after {} bytes",
                            self.stall_timeout, downloaded
                        ),
                    });
                }
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    drop(file);
                    discard_archive(&dest).await;
                    tracing::warn!("[Download] Interrupted after {} bytes: {}", downloaded, e);
                    return Err(UpdaterError::from_reqwest(&e, "download payload"));
                }
                None => break,
            };
            if let Err(e) = file.write_all(&chunk).await {
                drop(file);
                discard_archive(&dest).await;
                return Err(UpdaterError::from_io(&e, "write archive file", &dest));
            }
            downloaded += chunk.len() as u64;
            on_progress(downloaded, total);
        }

        file.flush()
            .await
            .map_err(|e| UpdaterError::from_io(&e, "flush archive file", &dest))?;

        tracing::info!("[Download] Downloaded {} bytes", downloaded);
        Ok(dest)
    }

    /// 받은 아카이브를 검증한다. 실패하면 파일을 지우고 `DownloadIntegrity`를 반환한다.
    /// 해시 계산 중 I/O 에러는 `FileSystem`으로 전달된다.
    pub async fn verify(&self, archive: &Path, manifest: &UpdateManifest) -> Result<PathBuf, UpdaterError> {
        match check_integrity(archive, manifest).await {
            Ok(()) => {
                tracing::info!("[Download] Integrity verified for {}", archive.display());
                Ok(archive.to_path_buf())
            }
            Err(e) => {
                tracing::warn!("[Download] Discarding {}: {}", archive.display(), e);
                discard_archive(archive).await;
                Err(e)
            }
        }
    }
}

/// 아카이브 삭제. 이미 없으면 조용히 넘어가고, 그 밖의 실패는 기록만 한다.
async fn discard_archive(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("[Download] Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("[Download] Failed to remove {}: {}", path.display(), e),
    }
}

async fn remove_stale(path: &Path) -> Result<(), UpdaterError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!("[Download] Removed stale archive {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdaterError::from_io(&e, "remove stale archive", path)),
    }
}

fn integrity(archive: &Path, failure: IntegrityFailure) -> UpdaterError {
    UpdaterError::DownloadIntegrity {
        path: archive.display().to_string(),
        failure,
    }
}

async fn check_integrity(archive: &Path, manifest: &UpdateManifest) -> Result<(), UpdaterError> {
    let metadata = match tokio::fs::metadata(archive).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(integrity(archive, IntegrityFailure::Missing)),
    };
    if metadata.len() == 0 {
        return Err(integrity(archive, IntegrityFailure::Empty));
    }

    let extension = archive
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    if !extension.eq_ignore_ascii_case("zip") {
        let extension = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };
        return Err(integrity(archive, IntegrityFailure::WrongExtension { extension }));
    }

    if let Some(expected) = manifest.size {
        if expected != metadata.len() {
            return Err(integrity(
                archive,
                IntegrityFailure::SizeMismatch {
                    expected,
                    actual: metadata.len(),
                },
            ));
        }
    }

    let actual = compute_sha512(archive).await?;
    let expected = manifest.checksum.trim();
    if !expected.eq_ignore_ascii_case(&actual) {
        return Err(integrity(
            archive,
            IntegrityFailure::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            },
        ));
    }
    Ok(())
}

/// 파일의 SHA-512 다이제스트 (대문자 hex)
pub fn sha512_hex(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha512::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode_upper(hasher.finalize()))
}

/// `sha512_hex`의 비동기 래퍼: 해시 계산은 블로킹 스레드풀에서 실행
pub async fn compute_sha512(path: &Path) -> Result<String, UpdaterError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha512_hex(&owned))
        .await
        .map_err(|e| UpdaterError::FileSystem {
            operation: "hash archive".to_string(),
            path: path.display().to_string(),
            message: e.to_string(),
        })?
        .map_err(|e| UpdaterError::from_io(&e, "hash archive", path))
}
