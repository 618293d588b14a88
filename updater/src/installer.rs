//! 검증된 아카이브를 버전 폴더로 설치
//!
//! ## 설치 순서
//! 1. 설치 루트 아래 숨김 스테이징 폴더 `.<prefix><version>.staging-<uuid>`에 압축 해제
//! 2. 엔트리마다 쓰기를 재시도 (백신 검사, 인덱싱 등 일시적인 파일 잠금 대응)
//! 3. 모든 엔트리가 성공한 경우에만 기존 `<prefix><version>`을 지우고 스테이징 폴더를 rename
//!
//! 실패하면 스테이징 폴더를 삭제하므로 VersionSet이 반쯤 풀린 폴더를
//! 최신 버전으로 보는 일은 없다.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::app_info::AppInformation;
use crate::error::UpdaterError;
use crate::version::AppVersion;

/// 엔트리별 재시도 정책 (고정 간격)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 첫 시도를 포함한 총 시도 횟수
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(2),
        }
    }
}

/// 엔트리 하나를 디스크에 쓰는 주체.
/// 기본 구현은 파일 시스템이며, 테스트에서 일시적 실패를 주입할 때 교체한다.
pub trait EntryWriter: Send + Sync {
    fn write_file(&self, reader: &mut dyn Read, dest: &Path, unix_mode: Option<u32>) -> io::Result<()>;

    fn create_dir(&self, dest: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dest)
    }
}

/// 파일 시스템 기본 구현
#[derive(Debug, Default, Clone, Copy)]
pub struct FsEntryWriter;

impl EntryWriter for FsEntryWriter {
    fn write_file(&self, reader: &mut dyn Read, dest: &Path, unix_mode: Option<u32>) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = std::fs::File::create(dest)?;
        io::copy(reader, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = unix_mode {
            use std::os::unix::fs::PermissionsExt;
            if mode & 0o777 != 0 {
                std::fs::set_permissions(dest, std::fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
        #[cfg(not(unix))]
        let _ = unix_mode;

        Ok(())
    }
}

/// 버전 폴더 설치기
#[derive(Clone)]
pub struct Installer {
    app: AppInformation,
    retry: RetryPolicy,
    writer: Arc<dyn EntryWriter>,
}

impl std::fmt::Debug for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("app", &self.app)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Installer {
    pub fn new(app: AppInformation, retry: RetryPolicy) -> Self {
        Self::with_writer(app, retry, Arc::new(FsEntryWriter))
    }

    pub fn with_writer(app: AppInformation, retry: RetryPolicy, writer: Arc<dyn EntryWriter>) -> Self {
        Self { app, retry, writer }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// 설치: 압축 해제는 블로킹 스레드풀에서 실행된다
    pub async fn install(&self, archive: &Path, version: &str) -> Result<PathBuf, UpdaterError> {
        let this = self.clone();
        let archive = archive.to_path_buf();
        let version = version.to_string();
        tokio::task::spawn_blocking(move || this.install_blocking(&archive, &version))
            .await
            .map_err(|e| UpdaterError::Extraction {
                entry: String::new(),
                attempts: 0,
                message: format!("extraction task aborted: {}", e),
            })?
    }

    /// 동기 버전. 성공하면 최종 버전 폴더 경로를 반환한다.
    pub fn install_blocking(&self, archive: &Path, version: &str) -> Result<PathBuf, UpdaterError> {
        let version = version.trim();
        if AppVersion::parse(version).is_none() {
            return Err(UpdaterError::validation(
                "version",
                format!("'{}' is not a valid version", version),
            ));
        }

        let root = self.app.install_root();
        std::fs::create_dir_all(root).map_err(|e| UpdaterError::from_io(&e, "create install root", root))?;

        let folder_name = self.app.version_folder_name(version);
        let dest = root.join(&folder_name);
        let staging = root.join(format!(
            ".{}.staging-{}",
            folder_name,
            uuid::Uuid::new_v4().simple()
        ));

        tracing::info!(
            "[Installer] Extracting {} -> {} (staging: {})",
            archive.display(),
            dest.display(),
            staging.display()
        );

        if let Err(e) = self.extract_into(archive, &staging) {
            tracing::error!("[Installer] Extraction failed, discarding staging directory: {}", e);
            remove_dir_if_exists(&staging);
            return Err(e);
        }

        if dest.exists() {
            tracing::warn!("[Installer] Replacing existing directory {}", dest.display());
            if let Err(e) = std::fs::remove_dir_all(&dest) {
                remove_dir_if_exists(&staging);
                return Err(UpdaterError::from_io(&e, "remove existing version directory", &dest));
            }
        }

        if let Err(e) = rename_with_retry(&staging, &dest, 4) {
            remove_dir_if_exists(&staging);
            return Err(UpdaterError::from_io(&e, "finalize version directory", &dest));
        }

        tracing::info!("[Installer] Installed version {} at {}", version, dest.display());
        Ok(dest)
    }

    fn extract_into(&self, archive_path: &Path, staging: &Path) -> Result<(), UpdaterError> {
        let corrupt = |message: String| UpdaterError::Extraction {
            entry: archive_path.display().to_string(),
            attempts: 1,
            message,
        };

        let file = std::fs::File::open(archive_path).map_err(|e| corrupt(format!("cannot open archive: {}", e)))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| corrupt(format!("invalid zip archive: {}", e)))?;

        std::fs::create_dir_all(staging)
            .map_err(|e| UpdaterError::from_io(&e, "create staging directory", staging))?;

        for i in 0..archive.len() {
            self.extract_entry(&mut archive, i, staging)?;
        }

        tracing::info!("[Installer] Extracted {} entries", archive.len());
        Ok(())
    }

    /// 엔트리 하나를 재시도 정책에 따라 기록한다.
    /// 시도마다 엔트리를 다시 열어 처음부터 읽는다.
    fn extract_entry(
        &self,
        archive: &mut zip::ZipArchive<std::fs::File>,
        index: usize,
        staging: &Path,
    ) -> Result<(), UpdaterError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut entry = archive.by_index(index).map_err(|e| UpdaterError::Extraction {
                entry: format!("#{}", index),
                attempts: attempt,
                message: format!("unreadable entry header: {}", e),
            })?;
            let name = entry.name().to_string();

            let relative = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    return Err(UpdaterError::Extraction {
                        entry: name,
                        attempts: attempt,
                        message: "entry path escapes the install directory".to_string(),
                    })
                }
            };
            let out_path = staging.join(&relative);

            let result = if entry.is_dir() {
                self.writer.create_dir(&out_path)
            } else {
                let mode = entry.unix_mode();
                self.writer.write_file(&mut entry, &out_path, mode)
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        "[Installer] Writing '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                        name,
                        attempt,
                        max_attempts,
                        self.retry.delay,
                        e
                    );
                    drop(entry);
                    std::thread::sleep(self.retry.delay);
                }
                Err(e) => {
                    return Err(UpdaterError::Extraction {
                        entry: name,
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

fn remove_dir_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(path) {
            tracing::warn!("[Installer] Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// 폴더 rename 재시도: 잠금이 풀릴 때까지 지수 백오프 (200ms · 2^n)
fn rename_with_retry(from: &Path, to: &Path, max_retries: u32) -> io::Result<()> {
    let mut attempt = 0;
    loop {
        match std::fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < max_retries => {
                let delay = Duration::from_millis(200 * 2u64.pow(attempt));
                tracing::warn!(
                    "[Installer] rename {} -> {} failed (attempt {}/{}), retrying in {:?}: {}",
                    from.display(),
                    to.display(),
                    attempt + 1,
                    max_retries + 1,
                    delay,
                    e
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
