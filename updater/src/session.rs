//! 업데이트 세션 컨트롤러
//!
//! ## 단계
//! `Idle → CheckingManifest → {NoUpdateAvailable → Idle | Downloading} → Verifying
//!  → {Failed → Idle | Extracting} → {Failed → Idle | InstallComplete} → Relaunching → Idle`
//!
//! ## 동시성
//! - 세션은 호출자가 직접 만들어 넘겨주는 핸들이다 (`Clone`은 같은 세션을 공유)
//! - 실행 중인 세션이 있으면 새 `start()`/`run()`은 아무것도 하지 않는다 (single-flight)
//! - 단계 변화는 `subscribe()` 브로드캐스트 채널 또는 `status()` 폴링으로 관찰한다
//! - 압축 해제와 프로세스 교체는 한 번 시작되면 중단되지 않는다.
//!   `await_completion`의 타임아웃은 기다리기를 포기할 뿐 세션을 취소하지 않는다.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::app_info::AppInformation;
use crate::diagnostics::DiagnosticLog;
use crate::download::PayloadDownloader;
use crate::error::UpdaterError;
use crate::handoff::{Handoff, ProcessHandoff, TerminationReport};
use crate::installer::Installer;
use crate::manifest::ManifestFetcher;
use crate::phase::SessionPhase;
use crate::version::AppVersion;
use crate::version_set::{InstalledVersion, VersionSet};
use crate::UpdaterConfig;

// ═══════════════════════════════════════════════════════
// 공개 타입
// ═══════════════════════════════════════════════════════

/// 세션 한 번의 최종 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "details", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// 다른 세션이 이미 실행 중이라 무시됨
    Skipped,
    NoUpdateAvailable {
        installed: Option<AppVersion>,
        offered: AppVersion,
    },
    Updated {
        previous: Option<AppVersion>,
        installed: AppVersion,
        install_dir: PathBuf,
        terminated: TerminationReport,
        launched_pid: u32,
    },
    Failed(UpdaterError),
}

impl SessionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SessionOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&UpdaterError> {
        match self {
            SessionOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// 구독자에게 전달되는 세션 이벤트
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    DownloadProgress { downloaded: u64, total: Option<u64> },
    Finished(SessionOutcome),
}

/// `status()` 스냅샷
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub running: bool,
    /// 마지막 세션 시작 시각 (RFC 3339)
    pub started_at: Option<String>,
    pub last_outcome: Option<SessionOutcome>,
}

/// `launch_or_install()` 결과
#[derive(Debug)]
pub enum Startup {
    /// 설치된 버전이 없어 포그라운드에서 전체 세션을 실행함
    FirstInstall(SessionOutcome),
    /// 설치된 최신 버전을 먼저 실행하고 업데이트 확인은 백그라운드에서 진행
    LaunchedInstalled {
        pid: u32,
        update: Option<JoinHandle<SessionOutcome>>,
    },
}

/// 세션 동작 설정
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// 새 버전 실행 시 넘길 인자
    pub launch_args: Vec<String>,
    pub poll_interval: Duration,
    pub await_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            launch_args: Vec::new(),
            poll_interval: Duration::from_secs(2),
            await_timeout: Duration::from_secs(600),
        }
    }
}

// ═══════════════════════════════════════════════════════
// UpdateSession
// ═══════════════════════════════════════════════════════

#[derive(Clone)]
pub struct UpdateSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    versions: VersionSet,
    fetcher: ManifestFetcher,
    downloader: PayloadDownloader,
    installer: Installer,
    handoff: Arc<dyn Handoff>,
    settings: SessionSettings,
    running: AtomicBool,
    status: Mutex<SessionStatus>,
    diagnostics: Mutex<DiagnosticLog>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for UpdateSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateSession")
            .field("app", self.inner.versions.app())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl UpdateSession {
    /// 설정으로부터 세션 생성 (시스템 프로세스 핸드오프 사용)
    pub fn from_config(config: &UpdaterConfig) -> Result<Self, UpdaterError> {
        let handoff = Arc::new(ProcessHandoff::new(config.graceful_exit_timeout()));
        Self::from_config_with_handoff(config, handoff)
    }

    pub fn from_config_with_handoff(
        config: &UpdaterConfig,
        handoff: Arc<dyn Handoff>,
    ) -> Result<Self, UpdaterError> {
        config.validate()?;
        let app = config.app_information()?;
        let http = config.http_settings();

        let fetcher = ManifestFetcher::new(&config.manifest_url, &http)?;
        let downloader = PayloadDownloader::new(config.download_dir.clone(), &http)?;
        let installer = Installer::new(app.clone(), config.retry_policy());

        Ok(Self::with_components(
            app,
            fetcher,
            downloader,
            installer,
            handoff,
            config.session_settings(),
        ))
    }

    /// 구성 요소를 직접 주입해 생성
    pub fn with_components(
        app: AppInformation,
        fetcher: ManifestFetcher,
        downloader: PayloadDownloader,
        installer: Installer,
        handoff: Arc<dyn Handoff>,
        settings: SessionSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(SessionInner {
                versions: VersionSet::new(app),
                fetcher,
                downloader,
                installer,
                handoff,
                settings,
                running: AtomicBool::new(false),
                status: Mutex::new(SessionStatus::default()),
                diagnostics: Mutex::new(DiagnosticLog::new()),
                events,
            }),
        }
    }

    pub fn app(&self) -> &AppInformation {
        self.inner.versions.app()
    }

    pub fn version_set(&self) -> &VersionSet {
        &self.inner.versions
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status_lock().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.status_lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// 누적된 진단 기록
    pub fn diagnostics(&self) -> String {
        self.inner.diagnostics_lock().text().to_string()
    }

    /// 백그라운드에서 세션을 시작한다. 이미 실행 중이면 None.
    pub fn start(&self) -> Option<JoinHandle<SessionOutcome>> {
        if !self.inner.try_claim() {
            tracing::info!("[Session] Update session already running, start request ignored");
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move { this.run_claimed().await }))
    }

    /// 호출한 태스크에서 세션을 실행한다. 이미 실행 중이면 `Skipped`.
    pub async fn run(&self) -> SessionOutcome {
        if !self.inner.try_claim() {
            tracing::info!("[Session] Update session already running, run request ignored");
            return SessionOutcome::Skipped;
        }
        self.run_claimed().await
    }

    async fn run_claimed(&self) -> SessionOutcome {
        let guard = RunGuard { inner: &self.inner };
        self.inner.begin();

        let outcome = match self.inner.execute().await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.inner.fail(&err);
                SessionOutcome::Failed(err)
            }
        };

        self.inner.finish(&outcome);
        drop(guard);

        let _ = self.inner.events.send(SessionEvent::Finished(outcome.clone()));
        outcome
    }

    /// 세션이 Idle로 돌아올 때까지 `poll_interval` 간격으로 확인한다.
    /// 타임아웃 안에 끝나면 true. 타임아웃이 지나도 세션은 계속 진행된다.
    pub async fn await_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let interval = self.inner.settings.poll_interval;
        loop {
            if !self.is_running() && self.phase().is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!("[Session] Gave up waiting for update session after {:?}", timeout);
                return false;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    pub async fn await_completion_default(&self) -> bool {
        self.await_completion(self.inner.settings.await_timeout).await
    }

    /// 설치된 최신 버전을 실행한다
    pub async fn launch_installed(&self, args: &[String]) -> Result<u32, UpdaterError> {
        let exe = self.inner.versions.newest_executable()?;
        let handoff = self.inner.handoff.clone();
        let args = args.to_vec();
        let launch_target = exe.clone();
        tokio::task::spawn_blocking(move || handoff.launch(&launch_target, &args))
            .await
            .map_err(|e| UpdaterError::launch(&exe, format!("launch task aborted: {}", e)))?
    }

    /// 런처 흐름
    ///
    /// - 설치된 버전이 없으면: 세션 전체를 포그라운드에서 실행 (설치 후 실행까지)
    /// - 있으면: 최신 설치 버전을 즉시 실행하고 업데이트 세션은 백그라운드로
    pub async fn launch_or_install(&self) -> Result<Startup, UpdaterError> {
        if self.inner.versions.max_installed()?.is_none() {
            tracing::info!("[Session] No installed version, running first install in the foreground");
            return Ok(Startup::FirstInstall(self.run().await));
        }

        let pid = self.launch_installed(&self.inner.settings.launch_args).await?;
        let update = self.start();
        Ok(Startup::LaunchedInstalled { pid, update })
    }
}

// ═══════════════════════════════════════════════════════
// 내부 구현
// ═══════════════════════════════════════════════════════

/// 실행 플래그 해제 가드: 패닉이나 취소로 빠져나가도 Idle로 복귀시킨다
struct RunGuard<'a> {
    inner: &'a SessionInner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        {
            let mut status = self.inner.status_lock();
            if !status.phase.is_idle() {
                tracing::warn!("[Session] Session ended in phase {}, resetting to idle", status.phase);
                status.phase = SessionPhase::Idle;
            }
            status.running = false;
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

impl SessionInner {
    fn try_claim(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn status_lock(&self) -> MutexGuard<'_, SessionStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn diagnostics_lock(&self) -> MutexGuard<'_, DiagnosticLog> {
        self.diagnostics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self) {
        {
            let mut status = self.status_lock();
            status.running = true;
            status.started_at = Some(chrono::Local::now().to_rfc3339());
        }
        self.diagnostics_lock()
            .begin_session(self.versions.app().executable_name());
        tracing::info!(
            "[Session] Update session started for {}",
            self.versions.app().executable_name()
        );
    }

    fn finish(&self, outcome: &SessionOutcome) {
        let message = match outcome {
            SessionOutcome::Skipped => "skipped".to_string(),
            SessionOutcome::NoUpdateAvailable { offered, .. } => {
                format!("no update available (offered {})", offered)
            }
            SessionOutcome::Updated { installed, launched_pid, .. } => {
                format!("updated to {} (PID {})", installed, launched_pid)
            }
            SessionOutcome::Failed(err) => format!("failed: {}", err.kind()),
        };
        self.diagnostics_lock().track_event("Session", &format!("Finished: {}", message));
        tracing::info!("[Session] Update session finished: {}", message);

        self.set_phase(SessionPhase::Idle);
        self.status_lock().last_outcome = Some(outcome.clone());
    }

    /// 단계 전이. 전이표에 없는 전이는 프로그래밍 오류로 기록하고 그대로 적용한다.
    fn set_phase(&self, to: SessionPhase) {
        let from = {
            let mut status = self.status_lock();
            let from = status.phase;
            if from == to {
                return;
            }
            if let Err(e) = from.transition(to) {
                tracing::error!("[Session] {}", e);
            }
            status.phase = to;
            from
        };

        tracing::debug!("[Session] Phase {} -> {}", from, to);
        self.diagnostics_lock()
            .track_event("Session", &format!("{} -> {}", from, to));
        let _ = self.events.send(SessionEvent::PhaseChanged { from, to });
    }

    fn fail(&self, err: &UpdaterError) {
        tracing::error!("[Session] Update failed ({}): {}", err.kind(), err);
        self.diagnostics_lock().track_error("Session", err);
        self.set_phase(SessionPhase::Failed);
    }

    fn note(&self, tag: &str, message: &str) {
        self.diagnostics_lock().track_event(tag, message);
    }

    async fn execute(&self) -> Result<SessionOutcome, UpdaterError> {
        self.set_phase(SessionPhase::CheckingManifest);

        let previous = self.versions.max_installed()?;
        let installed = previous.as_ref().map(|v| v.version);
        self.note(
            "VersionSet",
            &match installed {
                Some(v) => format!("Installed maximum: {}", v),
                None => "No installed version".to_string(),
            },
        );

        let manifest = self.fetcher.fetch().await?;
        let offered = manifest.version()?;
        self.note(
            "Manifest",
            &format!("Offered {} at {}", offered, manifest.download_url),
        );

        if !manifest.is_update_available(installed.as_ref()) {
            tracing::info!(
                "[Session] Installed {} is up to date (offered {})",
                installed.unwrap_or(AppVersion::ZERO),
                offered
            );
            self.set_phase(SessionPhase::NoUpdateAvailable);
            return Ok(SessionOutcome::NoUpdateAvailable { installed, offered });
        }

        self.set_phase(SessionPhase::Downloading);
        let events = self.events.clone();
        let archive = self
            .downloader
            .download(&manifest, move |downloaded, total| {
                let _ = events.send(SessionEvent::DownloadProgress { downloaded, total });
            })
            .await?;
        self.note("Download", &format!("Saved to {}", archive.display()));

        self.set_phase(SessionPhase::Verifying);
        let archive = self.downloader.verify(&archive, &manifest).await?;

        self.set_phase(SessionPhase::Extracting);
        let installed_dir = self.installer.install(&archive, &manifest.newest_version).await;
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            tracing::warn!("[Session] Could not delete archive {}: {}", archive.display(), e);
        }
        let install_dir = installed_dir?;
        self.note("Installer", &format!("Installed into {}", install_dir.display()));

        self.set_phase(SessionPhase::InstallComplete);
        self.set_phase(SessionPhase::Relaunching);

        let new_exe = install_dir.join(self.versions.app().executable_name());
        let (terminated, launched_pid) = self.relaunch(previous.as_ref(), new_exe).await?;
        self.note(
            "Handoff",
            &format!(
                "Terminated {:?} (forced {:?}), launched PID {}",
                terminated.matched, terminated.force_killed, launched_pid
            ),
        );

        Ok(SessionOutcome::Updated {
            previous: installed,
            installed: offered,
            install_dir,
            terminated,
            launched_pid,
        })
    }

    /// 구버전 종료 후 새 버전 실행.
    /// 새 버전 실행에 실패하면 종료했던 구버전을 다시 띄우고 `Launch` 에러를 반환한다.
    async fn relaunch(
        &self,
        previous: Option<&InstalledVersion>,
        new_exe: PathBuf,
    ) -> Result<(TerminationReport, u32), UpdaterError> {
        // 실행 파일이 없으면 구버전을 건드리지 않고 실패
        if !new_exe.is_file() {
            return Err(UpdaterError::launch(&new_exe, "executable missing from installed version"));
        }

        let old_exe = previous.map(|v| v.directory.join(self.versions.app().executable_name()));
        let handoff = self.handoff.clone();
        let args = self.settings.launch_args.clone();
        let target = new_exe.clone();

        tokio::task::spawn_blocking(move || {
            let report = match &old_exe {
                Some(old) => handoff.terminate(old),
                None => TerminationReport::default(),
            };
            for failure in &report.failures {
                tracing::warn!("[Handoff] {}", failure);
            }

            match handoff.launch(&target, &args) {
                Ok(pid) => Ok((report, pid)),
                Err(err) => {
                    if let Some(old) = old_exe.as_ref().filter(|_| !report.matched.is_empty()) {
                        tracing::warn!(
                            "[Handoff] Relaunching previous version {} after failed launch",
                            old.display()
                        );
                        if let Err(e) = handoff.launch(old, &args) {
                            tracing::error!("[Handoff] Previous version could not be relaunched: {}", e);
                        }
                    }
                    Err(err)
                }
            }
        })
        .await
        .map_err(|e| UpdaterError::launch(&new_exe, format!("handoff task aborted: {}", e)))?
    }
}
