//! 설치된 버전 폴더 탐색
//!
//! 설치 루트 바로 아래에서 `<prefix><version>` 형식의 디렉터리를 찾는다.
//! 버전으로 해석되지 않는 이름은 건너뛴다 (외부 도구가 만든 폴더 때문에
//! 업데이트 감지가 깨지지 않도록). `.`으로 시작하는 스테이징 폴더는 무시한다.

use std::path::PathBuf;

use serde::Serialize;

use crate::app_info::AppInformation;
use crate::error::UpdaterError;
use crate::version::AppVersion;

/// 설치된 버전 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledVersion {
    pub version: AppVersion,
    pub directory: PathBuf,
}

/// 하나의 앱에 대해 설치된 버전 목록을 조회한다
#[derive(Debug, Clone)]
pub struct VersionSet {
    app: AppInformation,
}

impl VersionSet {
    pub fn new(app: AppInformation) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &AppInformation {
        &self.app
    }

    /// 설치된 버전 목록 (버전 오름차순)
    ///
    /// 설치 루트가 없으면 빈 목록: 첫 실행인 경우다.
    pub fn installed_versions(&self) -> Result<Vec<InstalledVersion>, UpdaterError> {
        let root = self.app.install_root();
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(UpdaterError::from_io(&e, "scan installed versions", root)),
        };

        let prefix = self.app.version_prefix();
        let mut versions = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let Some(suffix) = name.strip_prefix(prefix) else {
                continue;
            };
            match AppVersion::parse(suffix) {
                Some(version) => versions.push(InstalledVersion {
                    version,
                    directory: path,
                }),
                None => {
                    tracing::debug!("[VersionSet] Skipping '{}': not a version folder", name);
                }
            }
        }

        // 같은 버전이 다른 표기로 두 번 있으면 이름순으로 안정 정렬
        versions.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.directory.cmp(&b.directory)));
        Ok(versions)
    }

    /// 가장 높은 설치 버전 (없으면 None)
    pub fn max_installed_version(&self) -> Result<Option<AppVersion>, UpdaterError> {
        Ok(self.max_installed()?.map(|v| v.version))
    }

    pub fn max_installed(&self) -> Result<Option<InstalledVersion>, UpdaterError> {
        Ok(self.installed_versions()?.pop())
    }

    /// 특정 버전의 실행 파일 경로.
    /// 설치되어 있으면 실제 폴더 이름을 따르고, 아니면 `<prefix><version>`으로 조합한다.
    pub fn executable_path_for(&self, version: &AppVersion) -> PathBuf {
        let installed = match self.installed_versions() {
            Ok(list) => list.into_iter().rev().find(|v| &v.version == version),
            Err(e) => {
                tracing::warn!(
                    "[VersionSet] Could not scan {} ({}), composing path for {}",
                    self.app.install_root().display(),
                    e,
                    version
                );
                None
            }
        };

        match installed {
            Some(v) => v.directory.join(self.app.executable_name()),
            None => self
                .app
                .version_folder_path(&version.to_string())
                .join(self.app.executable_name()),
        }
    }

    /// 최신 설치 버전의 실행 파일: 실행 가능한 파일이 있어야 한다
    pub fn newest_executable(&self) -> Result<PathBuf, UpdaterError> {
        let newest = self.max_installed()?.ok_or_else(|| UpdaterError::Launch {
            path: self.app.install_root().display().to_string(),
            message: "no installed version found".to_string(),
        })?;

        let exe = newest.directory.join(self.app.executable_name());
        if !exe.is_file() {
            return Err(UpdaterError::launch(&exe, "executable not found"));
        }
        Ok(exe)
    }
}
