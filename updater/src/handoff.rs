//! 실행 중인 구버전 종료 및 새 버전 실행
//!
//! ## 종료 절차
//! 1. 실행 파일 전체 경로가 일치하는 프로세스를 찾는다 (자기 자신은 제외)
//! 2. 정상 종료 요청: Unix는 SIGTERM, Windows는 `taskkill /PID` (`/F` 없이)
//! 3. 최대 `graceful_timeout` 동안 종료를 기다린다
//! 4. 그래도 살아 있으면 강제 종료
//!
//! 실행 경로를 읽을 수 없는 프로세스(권한 부족 등)는 에러가 아니라 건너뛴다.
//! 프로세스 하나의 종료 실패는 기록만 하고 나머지 프로세스 처리를 계속한다.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use sysinfo::{Pid, ProcessStatus, System};

use crate::error::UpdaterError;

/// 종료 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TerminationReport {
    /// 경로가 일치한 PID 목록
    pub matched: Vec<u32>,
    pub exited_gracefully: Vec<u32>,
    pub force_killed: Vec<u32>,
    /// PID별 실패 사유
    pub failures: Vec<String>,
}

impl TerminationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 프로세스 교체 동작. 세션은 이 trait을 통해서만 프로세스를 다룬다.
///
/// 두 메서드 모두 블로킹이며 세션이 `spawn_blocking`에서 호출한다.
pub trait Handoff: Send + Sync {
    /// 해당 실행 파일로 실행 중인 모든 프로세스를 종료한다
    fn terminate(&self, executable: &Path) -> TerminationReport;

    /// 실행 파일을 새 프로세스로 시작하고 PID를 반환한다
    fn launch(&self, executable: &Path, args: &[String]) -> Result<u32, UpdaterError>;
}

/// sysinfo 기반 기본 구현
#[derive(Debug, Clone)]
pub struct ProcessHandoff {
    graceful_timeout: Duration,
    poll_interval: Duration,
}

impl Default for ProcessHandoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ProcessHandoff {
    pub fn new(graceful_timeout: Duration) -> Self {
        Self {
            graceful_timeout,
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn graceful_timeout(&self) -> Duration {
        self.graceful_timeout
    }

    /// 정상 종료 대기: 타임아웃 안에 종료되면 true
    fn wait_for_exit(&self, pid: u32) -> bool {
        let deadline = Instant::now() + self.graceful_timeout;
        loop {
            if !is_running(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn terminate_one(&self, pid: u32, report: &mut TerminationReport) {
        if let Err(e) = request_close(pid) {
            // 정상 종료 요청이 거부돼도 강제 종료는 시도한다
            tracing::warn!("[Handoff] Graceful close request for PID {} failed: {}", pid, e);
        }

        if self.wait_for_exit(pid) {
            tracing::info!("[Handoff] PID {} exited gracefully", pid);
            report.exited_gracefully.push(pid);
            return;
        }

        tracing::warn!(
            "[Handoff] PID {} still running after {:?}, force killing",
            pid,
            self.graceful_timeout
        );
        match force_kill(pid) {
            Ok(()) => report.force_killed.push(pid),
            Err(e) => {
                tracing::error!("[Handoff] Failed to kill PID {}: {}", pid, e);
                report.failures.push(format!("PID {}: {}", pid, e));
            }
        }
    }
}

impl Handoff for ProcessHandoff {
    fn terminate(&self, executable: &Path) -> TerminationReport {
        let mut report = TerminationReport {
            matched: find_processes_by_path(executable),
            ..Default::default()
        };

        if report.matched.is_empty() {
            tracing::info!("[Handoff] No running process for {}", executable.display());
            return report;
        }

        tracing::info!(
            "[Handoff] Terminating {} process(es) running {}",
            report.matched.len(),
            executable.display()
        );
        for pid in report.matched.clone() {
            self.terminate_one(pid, &mut report);
        }
        report
    }

    fn launch(&self, executable: &Path, args: &[String]) -> Result<u32, UpdaterError> {
        if !executable.is_file() {
            return Err(UpdaterError::launch(executable, "executable does not exist"));
        }

        let mut cmd = Command::new(executable);
        cmd.args(args);
        if let Some(dir) = executable.parent() {
            cmd.current_dir(dir);
        }

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // DETACHED_PROCESS | CREATE_BREAKAWAY_FROM_JOB | CREATE_NEW_PROCESS_GROUP
            cmd.creation_flags(0x00000008 | 0x01000000 | 0x00000200);
        }

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| UpdaterError::launch(executable, e.to_string()))?;

        let pid = child.id();
        tracing::info!("[Handoff] Launched {} (PID {})", executable.display(), pid);
        Ok(pid)
    }
}

/// 실행 파일 경로가 일치하는 프로세스 PID 목록 (현재 프로세스 제외)
pub fn find_processes_by_path(executable: &Path) -> Vec<u32> {
    let target = normalize(executable);
    let own_pid = std::process::id();

    let mut sys = System::new_all();
    sys.refresh_all();

    let mut pids: Vec<u32> = sys
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            // 경로를 읽을 수 없는 프로세스는 건너뜀
            let exe = process.exe()?;
            (normalize(exe) == target).then(|| pid.as_u32())
        })
        .filter(|pid| *pid != own_pid)
        .collect();
    pids.sort_unstable();
    pids
}

/// 특정 PID가 실행 중인지 (좀비는 종료된 것으로 본다)
pub fn is_running(pid: u32) -> bool {
    let mut sys = System::new();
    let pid = Pid::from_u32(pid);
    if !sys.refresh_process(pid) {
        return false;
    }
    sys.process(pid)
        .map(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
        .unwrap_or(false)
}

fn normalize(path: &Path) -> PathBuf {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    #[cfg(target_os = "windows")]
    {
        PathBuf::from(resolved.to_string_lossy().to_lowercase())
    }
    #[cfg(not(target_os = "windows"))]
    {
        resolved
    }
}

#[cfg(unix)]
fn request_close(pid: u32) -> Result<(), String> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;

    signal::kill(NixPid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| format!("Failed to send SIGTERM: {}", e))
}

#[cfg(windows)]
fn request_close(pid: u32) -> Result<(), String> {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| format!("Failed to run taskkill: {}", e))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("taskkill exited with {}", status))
    }
}

#[cfg(unix)]
fn force_kill(pid: u32) -> Result<(), String> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;

    match signal::kill(NixPid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        // 그 사이에 종료됨
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(format!("Failed to send SIGKILL: {}", e)),
    }
}

#[cfg(windows)]
fn force_kill(pid: u32) -> Result<(), String> {
    let status = Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| format!("Failed to run taskkill: {}", e))?;
    if status.success() || !is_running(pid) {
        Ok(())
    } else {
        Err(format!("taskkill /F exited with {}", status))
    }
}
