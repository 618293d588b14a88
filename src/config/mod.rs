//! 업데이터 설정 파일 로드
//!
//! ## 탐색 순서
//! 1. `VERSYNC_CONFIG` 환경 변수가 가리키는 파일
//! 2. 실행 파일 옆 `config/updater.toml`
//! 3. 실행 파일 옆 `updater.toml`
//! 4. 작업 디렉터리의 `config/updater.toml`
//!
//! 어느 것도 없으면 `config/global.toml`의 `[updater]` 테이블을 찾고,
//! 그것도 없으면 기본값을 쓴다 (세션 생성 시 검증에서 실패한다).

use std::path::{Path, PathBuf};

use thiserror::Error;
use versync_updater_lib::UpdaterConfig;

pub const CONFIG_ENV_VAR: &str = "VERSYNC_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config file '{}' given by VERSYNC_CONFIG does not exist", .0.display())]
    MissingOverride(PathBuf),
}

/// 로드된 설정과 그 출처
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: UpdaterConfig,
    /// 기본값을 쓴 경우 None
    pub source: Option<PathBuf>,
}

/// 존재하는 첫 번째 후보 경로
fn find_config_in(exe_dir: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(dir) = exe_dir {
        let cfg = dir.join("config").join("updater.toml");
        if cfg.exists() {
            return Some(cfg);
        }
        let cfg = dir.join("updater.toml");
        if cfg.exists() {
            return Some(cfg);
        }
    }

    let cwd_cfg = cwd.join("config").join("updater.toml");
    if cwd_cfg.exists() {
        return Some(cwd_cfg);
    }
    None
}

fn find_global_toml_in(exe_dir: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(dir) = exe_dir {
        let p = dir.join("config").join("global.toml");
        if p.exists() {
            return Some(p);
        }
    }
    let p = cwd.join("config").join("global.toml");
    if p.exists() {
        return Some(p);
    }
    None
}

/// TOML 문자열 파싱. 최상위 키 또는 `[updater]` 테이블 모두 허용한다.
pub fn parse_config(content: &str, path: &Path) -> Result<UpdaterConfig, ConfigError> {
    let parse_err = |source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let value: toml::Value = content.parse().map_err(parse_err)?;
    match value.get("updater") {
        Some(section) => section.clone().try_into().map_err(parse_err),
        None => value.try_into().map_err(parse_err),
    }
}

pub fn load_from_path(path: &Path) -> Result<UpdaterConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, path)
}

/// 환경 변수 → 탐색 경로 → global.toml → 기본값 순으로 설정을 로드한다
pub fn load_updater_config() -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(ConfigError::MissingOverride(path));
        }
        return Ok(LoadedConfig {
            config: load_from_path(&path)?,
            source: Some(path),
        });
    }

    load_with_dirs(exe_dir().as_deref(), Path::new("."))
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
}

fn load_with_dirs(exe_dir: Option<&Path>, cwd: &Path) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = find_config_in(exe_dir, cwd) {
        return Ok(LoadedConfig {
            config: load_from_path(&path)?,
            source: Some(path),
        });
    }

    // global.toml에서 [updater] 섹션 읽기 시도
    if let Some(path) = find_global_toml_in(exe_dir, cwd) {
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let value: toml::Value = content.parse().map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        if let Some(section) = value.get("updater") {
            let config = section.clone().try_into().map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
            return Ok(LoadedConfig {
                config,
                source: Some(path),
            });
        }
    }

    Ok(LoadedConfig {
        config: UpdaterConfig::default(),
        source: None,
    })
}
