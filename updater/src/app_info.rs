//! 업데이트 대상 앱 식별 정보

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::UpdaterError;

/// 버전 폴더 접두사가 이미 구분자로 끝나는지 판단할 때 쓰는 문자들
const PREFIX_SEPARATORS: [char; 3] = ['_', '-', '.'];

/// 업데이트 대상 앱: 세션 시작 시 한 번 만들어지고 이후 변경되지 않는다
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInformation {
    executable_name: String,
    install_root: PathBuf,
    version_prefix: String,
}

impl AppInformation {
    /// 값을 정리하고 검증한다.
    /// 접두사가 구분자로 끝나지 않으면 `_`를 붙인다 (`App` → `App_`).
    pub fn new(
        executable_name: &str,
        install_root: impl Into<PathBuf>,
        version_prefix: &str,
    ) -> Result<Self, UpdaterError> {
        let executable_name = executable_name.trim();
        if executable_name.is_empty() {
            return Err(UpdaterError::missing("executable_name"));
        }
        if Path::new(executable_name).components().count() != 1 {
            return Err(UpdaterError::validation(
                "executable_name",
                format!("'{}' must be a bare file name", executable_name),
            ));
        }

        let mut version_prefix = version_prefix.trim().to_string();
        if version_prefix.is_empty() {
            return Err(UpdaterError::missing("version_prefix"));
        }
        if !version_prefix.ends_with(PREFIX_SEPARATORS) {
            version_prefix.push('_');
        }

        let install_root = install_root.into();
        if install_root.as_os_str().is_empty() {
            return Err(UpdaterError::missing("install_root"));
        }

        Ok(Self {
            executable_name: executable_name.to_string(),
            install_root,
            version_prefix,
        })
    }

    pub fn executable_name(&self) -> &str {
        &self.executable_name
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn version_prefix(&self) -> &str {
        &self.version_prefix
    }

    /// `<prefix><version>` 폴더 이름
    pub fn version_folder_name(&self, version: &str) -> String {
        format!("{}{}", self.version_prefix, version.trim())
    }

    /// 설치 루트 아래 버전 폴더 경로
    pub fn version_folder_path(&self, version: &str) -> PathBuf {
        self.install_root.join(self.version_folder_name(version))
    }
}
