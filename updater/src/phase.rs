use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 업데이트 세션 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    CheckingManifest,
    NoUpdateAvailable,
    Downloading,
    Verifying,
    Extracting,
    InstallComplete,
    Relaunching,
    Failed,
}

impl SessionPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionPhase::Idle)
    }

    /// 유효한 단계 전이인지
    pub fn can_transition(&self, to: &SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, to),
            (Idle, CheckingManifest)
                | (CheckingManifest, NoUpdateAvailable)
                | (CheckingManifest, Downloading)
                | (CheckingManifest, Failed)
                | (NoUpdateAvailable, Idle)
                | (Downloading, Verifying)
                | (Downloading, Failed)
                | (Verifying, Extracting)
                | (Verifying, Failed)
                | (Extracting, InstallComplete)
                | (Extracting, Failed)
                | (InstallComplete, Relaunching)
                | (Relaunching, Idle)
                | (Relaunching, Failed)
                | (Failed, Idle)
        )
    }

    pub fn transition(&self, to: SessionPhase) -> Result<SessionPhase, TransitionError> {
        if self.can_transition(&to) {
            Ok(to)
        } else {
            Err(TransitionError::InvalidTransition(*self, to))
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::CheckingManifest => "checking_manifest",
            SessionPhase::NoUpdateAvailable => "no_update_available",
            SessionPhase::Downloading => "downloading",
            SessionPhase::Verifying => "verifying",
            SessionPhase::Extracting => "extracting",
            SessionPhase::InstallComplete => "install_complete",
            SessionPhase::Relaunching => "relaunching",
            SessionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition: {0} -> {1}")]
    InvalidTransition(SessionPhase, SessionPhase),
}
