//! 런처 흐름
//!
//! 1. 설치된 버전이 없으면 포그라운드에서 설치 후 실행
//! 2. 있으면 최신 설치 버전을 바로 실행하고, 업데이트 확인은 백그라운드에서
//! 3. 어느 쪽이든 세션이 끝날 때까지(기본 10분) 기다린다

use versync_updater_lib::{SessionOutcome, Startup, UpdateSession, UpdaterError};

/// 런처 실행 결과
#[derive(Debug, Clone)]
pub struct LaunchReport {
    /// 업데이트 확인 전에 실행한 설치 버전의 PID
    pub launched_pid: Option<u32>,
    /// 세션 결과. 대기 시간 안에 끝나지 않았으면 None
    pub outcome: Option<SessionOutcome>,
}

impl LaunchReport {
    pub fn failed(&self) -> bool {
        self.outcome.as_ref().map(|o| o.is_failed()).unwrap_or(false)
    }
}

pub async fn run(session: &UpdateSession) -> Result<LaunchReport, UpdaterError> {
    match session.launch_or_install().await? {
        Startup::FirstInstall(outcome) => Ok(LaunchReport {
            launched_pid: None,
            outcome: Some(outcome),
        }),
        Startup::LaunchedInstalled { pid, update } => {
            tracing::info!("[Launcher] Started installed version (PID {})", pid);

            let Some(update) = update else {
                // 다른 세션이 이미 실행 중
                let finished = session.await_completion_default().await;
                return Ok(LaunchReport {
                    launched_pid: Some(pid),
                    outcome: finished.then(|| session.status().last_outcome).flatten(),
                });
            };

            if !session.await_completion_default().await {
                tracing::warn!("[Launcher] Update session still running, leaving it in the background");
                return Ok(LaunchReport {
                    launched_pid: Some(pid),
                    outcome: None,
                });
            }

            let outcome = match update.await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!("[Launcher] Update task ended abnormally: {}", e);
                    session.status().last_outcome
                }
            };
            Ok(LaunchReport {
                launched_pid: Some(pid),
                outcome,
            })
        }
    }
}
