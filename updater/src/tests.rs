//! 업데이트 세션 통합 테스트
//!
//! ## 테스트 시나리오
//! 1. 업데이트: 매니페스트 → 다운로드 → 검증 → 설치 → 핸드오프
//! 2. 최신 상태: 다운로드 없이 종료
//! 3. 검증 실패: 설치 폴더를 만들지 않음
//! 4. single-flight: 동시에 시작해도 설치/실행은 한 번
//! 5. 압축 해제 재시도, 실행 실패 시 구버전 복구, 런처 흐름

use crate::{
    AppInformation, EntryWriter, FsEntryWriter, Handoff, HttpSettings, Installer, ManifestFetcher,
    PayloadDownloader, RetryPolicy, SessionEvent, SessionOutcome, SessionPhase, SessionSettings,
    Startup, TerminationReport, UpdateSession, UpdaterError,
};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use sha2::{Digest, Sha512};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ═══════════════════════════════════════════════════════
// 테스트 헬퍼
// ═══════════════════════════════════════════════════════

fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let buf = std::io::Cursor::new(Vec::new());
    let mut zip_writer = zip::ZipWriter::new(buf);
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        zip_writer.start_file(*name, options).unwrap();
        zip_writer.write_all(content).unwrap();
    }
    zip_writer.finish().unwrap().into_inner()
}

fn sha512_upper(data: &[u8]) -> String {
    hex::encode_upper(Sha512::digest(data))
}

#[derive(Clone)]
struct MockState {
    manifest: Arc<String>,
    archive: Arc<Vec<u8>>,
    delay: Duration,
    downloads: Arc<AtomicUsize>,
}

struct MockServer {
    base: String,
    downloads: Arc<AtomicUsize>,
}

/// 매니페스트(`/manifest.json`)와 아카이브(`/download/:file`)를 제공하는 mock 서버.
/// `manifest`는 서버 주소를 받아 매니페스트 JSON을 만든다.
async fn spawn_mock(
    manifest: impl FnOnce(&str) -> serde_json::Value,
    archive: Vec<u8>,
    delay: Duration,
) -> MockServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let downloads = Arc::new(AtomicUsize::new(0));

    let state = MockState {
        manifest: Arc::new(manifest(&base).to_string()),
        archive: Arc::new(archive),
        delay,
        downloads: downloads.clone(),
    };

    let app = Router::new()
        .route(
            "/manifest.json",
            get(|State(s): State<MockState>| async move {
                ([("content-type", "application/json")], s.manifest.as_str().to_string())
            }),
        )
        .route(
            "/download/:file",
            get(|State(s): State<MockState>| async move {
                s.downloads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(s.delay).await;
                ([("content-type", "application/octet-stream")], s.archive.as_ref().clone())
            }),
        )
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer { base, downloads }
}

fn manifest_json(base: &str, version: &str, checksum: &str) -> serde_json::Value {
    serde_json::json!({
        "DownloadURL": format!("{}/download/app.zip", base),
        "NewestVersionVersion": version,
        "Checksum": checksum,
    })
}

/// 프로세스를 실제로 건드리지 않고 호출만 기록하는 핸드오프
#[derive(Default)]
struct RecordingHandoff {
    terminated: Mutex<Vec<PathBuf>>,
    launched: Mutex<Vec<(PathBuf, Vec<String>)>>,
    fail_launch_of: Option<PathBuf>,
}

impl RecordingHandoff {
    fn terminated(&self) -> Vec<PathBuf> {
        self.terminated.lock().unwrap().clone()
    }

    fn launched_paths(&self) -> Vec<PathBuf> {
        self.launched.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }
}

impl Handoff for RecordingHandoff {
    fn terminate(&self, executable: &Path) -> TerminationReport {
        self.terminated.lock().unwrap().push(executable.to_path_buf());
        TerminationReport {
            matched: vec![4242],
            exited_gracefully: vec![4242],
            ..Default::default()
        }
    }

    fn launch(&self, executable: &Path, args: &[String]) -> Result<u32, UpdaterError> {
        if self.fail_launch_of.as_deref() == Some(executable) {
            return Err(UpdaterError::launch(executable, "simulated launch failure"));
        }
        let mut launched = self.launched.lock().unwrap();
        launched.push((executable.to_path_buf(), args.to_vec()));
        Ok(5000 + launched.len() as u32)
    }
}

/// 처음 `failures`번은 잠금 에러를 내는 writer
struct FlakyWriter {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyWriter {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

impl EntryWriter for FlakyWriter {
    fn write_file(&self, reader: &mut dyn Read, dest: &Path, unix_mode: Option<u32>) -> std::io::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "being used by another process",
            ));
        }
        FsEntryWriter.write_file(reader, dest, unix_mode)
    }
}

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    download_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("install");
        let download_dir = tmp.path().join("downloads");
        std::fs::create_dir_all(&root).unwrap();
        Self {
            _tmp: tmp,
            root,
            download_dir,
        }
    }

    fn install_version(&self, folder: &str) -> PathBuf {
        let dir = self.root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("app.exe"), b"old binary").unwrap();
        dir.join("app.exe")
    }

    fn session(&self, base: &str, handoff: Arc<RecordingHandoff>, writer: Arc<dyn EntryWriter>) -> UpdateSession {
        self.session_with_http(base, HttpSettings::default(), handoff, writer)
    }

    fn session_with_http(
        &self,
        base: &str,
        http: HttpSettings,
        handoff: Arc<RecordingHandoff>,
        writer: Arc<dyn EntryWriter>,
    ) -> UpdateSession {
        let app = AppInformation::new("app.exe", &self.root, "App").unwrap();
        let fetcher = ManifestFetcher::new(&format!("{}/manifest.json", base), &http).unwrap();
        let downloader = PayloadDownloader::new(Some(self.download_dir.clone()), &http).unwrap();
        let installer = Installer::with_writer(
            app.clone(),
            RetryPolicy {
                max_attempts: 10,
                delay: Duration::from_millis(1),
            },
            writer,
        );
        UpdateSession::with_components(
            app,
            fetcher,
            downloader,
            installer,
            handoff,
            SessionSettings {
                launch_args: vec!["--after-update".to_string()],
                poll_interval: Duration::from_millis(20),
                await_timeout: Duration::from_secs(10),
            },
        )
    }

    fn download_dir_is_empty(&self) -> bool {
        match std::fs::read_dir(&self.download_dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }
}

fn app_zip() -> Vec<u8> {
    build_zip(&[("app.exe", b"new binary"), ("readme.txt", b"v2")])
}

// ═══════════════════════════════════════════════════════
// 테스트 1: 업데이트 시나리오
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_update_installs_new_version_and_hands_off() {
    let fx = Fixture::new();
    let old_exe = fx.install_version("App_1.0.0.0");
    let archive = app_zip();
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(|b| manifest_json(b, "2.0.0.0", &checksum), archive, Duration::ZERO).await;

    let handoff = Arc::new(RecordingHandoff::default());
    let session = fx.session(&mock.base, handoff.clone(), Arc::new(FsEntryWriter));

    let outcome = session.run().await;
    let new_dir = fx.root.join("App_2.0.0.0");
    match &outcome {
        SessionOutcome::Updated {
            previous,
            installed,
            install_dir,
            launched_pid,
            ..
        } => {
            assert_eq!(previous.map(|v| v.to_string()), Some("1.0.0.0".to_string()));
            assert_eq!(installed.to_string(), "2.0.0.0");
            assert_eq!(install_dir, &new_dir);
            assert_eq!(*launched_pid, 5001);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(std::fs::read(new_dir.join("app.exe")).unwrap(), b"new binary");
    assert_eq!(handoff.terminated(), vec![old_exe]);
    assert_eq!(handoff.launched_paths(), vec![new_dir.join("app.exe")]);
    assert_eq!(
        handoff.launched.lock().unwrap()[0].1,
        vec!["--after-update".to_string()]
    );

    // 세션 종료 후 상태
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(!session.is_running());
    assert_eq!(session.status().last_outcome, Some(outcome));
    assert!(fx.download_dir_is_empty(), "archive must be deleted after extraction");
    assert_eq!(
        session.version_set().max_installed_version().unwrap().map(|v| v.to_string()),
        Some("2.0.0.0".to_string())
    );
}

#[tokio::test]
async fn test_same_version_means_no_update() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let mock = spawn_mock(|b| manifest_json(b, "1.0.0.0", "ABCD"), app_zip(), Duration::ZERO).await;

    let handoff = Arc::new(RecordingHandoff::default());
    let session = fx.session(&mock.base, handoff.clone(), Arc::new(FsEntryWriter));

    let outcome = session.run().await;
    assert!(matches!(outcome, SessionOutcome::NoUpdateAvailable { .. }));
    assert_eq!(mock.downloads.load(Ordering::SeqCst), 0, "no download attempted");
    assert!(handoff.terminated().is_empty());
    assert!(handoff.launched_paths().is_empty());
    assert_eq!(session.phase(), SessionPhase::Idle);
}

// ═══════════════════════════════════════════════════════
// 테스트 2: 실패 처리
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_checksum_mismatch_leaves_install_untouched() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let mock = spawn_mock(|b| manifest_json(b, "2.0.0.0", "ABCD"), app_zip(), Duration::ZERO).await;

    let handoff = Arc::new(RecordingHandoff::default());
    let session = fx.session(&mock.base, handoff.clone(), Arc::new(FsEntryWriter));

    let outcome = session.run().await;
    match outcome.error() {
        Some(UpdaterError::DownloadIntegrity { .. }) => {}
        other => panic!("expected integrity error, got {:?}", other),
    }
    assert!(!fx.root.join("App_2.0.0.0").exists());
    assert!(handoff.terminated().is_empty());
    assert!(handoff.launched_paths().is_empty());
    assert!(fx.download_dir_is_empty());
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(session.diagnostics().contains("checksum mismatch"));
}

#[tokio::test]
async fn test_incomplete_manifest_fails_before_download() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let mock = spawn_mock(
        |b| {
            serde_json::json!({
                "DownloadURL": format!("{}/download/app.zip", b),
                "NewestVersionVersion": "2.0.0.0",
            })
        },
        app_zip(),
        Duration::ZERO,
    )
    .await;

    let session = fx.session(&mock.base, Arc::new(RecordingHandoff::default()), Arc::new(FsEntryWriter));
    let outcome = session.run().await;
    assert!(matches!(
        outcome.error(),
        Some(UpdaterError::Validation { field, .. }) if field == "Checksum"
    ));
    assert_eq!(mock.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_manifest_is_transport_error() {
    let fx = Fixture::new();
    // 바인딩 후 즉시 닫아 연결이 거부되는 주소 확보
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let session = fx.session(
        &format!("http://{}", addr),
        Arc::new(RecordingHandoff::default()),
        Arc::new(FsEntryWriter),
    );
    let outcome = session.run().await;
    assert!(matches!(outcome.error(), Some(UpdaterError::Transport { .. })));
    assert_eq!(session.phase(), SessionPhase::Idle);
}

/// 헤더와 본문 10바이트만 보내고 멈추는 페이로드 서버
async fn spawn_stalling_payload() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\n0123456789")
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });
    base
}

#[tokio::test]
async fn test_stalled_download_fails_and_releases_session() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let payload_base = spawn_stalling_payload().await;
    let mock = spawn_mock(
        |_| serde_json::json!({
            "DownloadURL": format!("{}/download/app.zip", payload_base),
            "NewestVersionVersion": "2.0.0.0",
            "Checksum": "ABCD",
        }),
        Vec::new(),
        Duration::ZERO,
    )
    .await;

    let http = HttpSettings {
        timeout: Duration::from_secs(1),
        ..HttpSettings::default()
    };
    let handoff = Arc::new(RecordingHandoff::default());
    let session = fx.session_with_http(&mock.base, http, handoff.clone(), Arc::new(FsEntryWriter));

    assert!(session.start().is_some());
    assert!(session.await_completion(Duration::from_secs(8)).await);
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert!(!session.is_running());
    assert!(matches!(
        session.status().last_outcome.as_ref().and_then(|o| o.error()),
        Some(UpdaterError::Transport { .. })
    ));
    assert!(fx.download_dir_is_empty());
    assert!(!fx.root.join("App_2.0.0.0").exists());
    assert!(handoff.terminated().is_empty());

    // 다음 세션은 다시 받아들여진다
    assert!(session.start().is_some());
    assert!(session.await_completion(Duration::from_secs(8)).await);
}

// ═══════════════════════════════════════════════════════
// 테스트 3: single-flight / 완료 대기
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_second_start_while_downloading_is_ignored() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let archive = app_zip();
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(
        |b| manifest_json(b, "2.0.0.0", &checksum),
        archive,
        Duration::from_millis(300),
    )
    .await;

    let handoff = Arc::new(RecordingHandoff::default());
    let writer = Arc::new(FlakyWriter::new(0));
    let session = fx.session(&mock.base, handoff.clone(), writer.clone());

    let first = session.start().expect("first start must run");
    assert!(session.start().is_none());
    assert_eq!(session.clone().run().await, SessionOutcome::Skipped);

    let outcome = first.await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Updated { .. }));
    assert_eq!(mock.downloads.load(Ordering::SeqCst), 1);
    // 아카이브 엔트리 2개가 한 번씩만 기록됨
    assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(handoff.launched_paths().len(), 1);
    assert_eq!(handoff.terminated().len(), 1);

    // 끝난 뒤에는 다시 시작할 수 있다
    let again = session.run().await;
    assert!(matches!(again, SessionOutcome::NoUpdateAvailable { .. }));
}

#[tokio::test]
async fn test_await_completion_times_out_without_cancelling() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let archive = app_zip();
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(
        |b| manifest_json(b, "2.0.0.0", &checksum),
        archive,
        Duration::from_millis(500),
    )
    .await;

    let session = fx.session(&mock.base, Arc::new(RecordingHandoff::default()), Arc::new(FsEntryWriter));
    let _handle = session.start().unwrap();

    assert!(!session.await_completion(Duration::from_millis(50)).await);
    assert!(session.is_running());

    assert!(session.await_completion_default().await);
    assert!(matches!(
        session.status().last_outcome,
        Some(SessionOutcome::Updated { .. })
    ));
    assert!(fx.root.join("App_2.0.0.0").join("app.exe").exists());
}

#[tokio::test]
async fn test_await_completion_when_idle_returns_immediately() {
    let fx = Fixture::new();
    let session = fx.session("http://127.0.0.1:9", Arc::new(RecordingHandoff::default()), Arc::new(FsEntryWriter));
    assert!(session.await_completion(Duration::ZERO).await);
}

#[tokio::test]
async fn test_events_follow_phase_order() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let archive = app_zip();
    let archive_len = archive.len() as u64;
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(|b| manifest_json(b, "2.0.0.0", &checksum), archive, Duration::ZERO).await;

    let session = fx.session(&mock.base, Arc::new(RecordingHandoff::default()), Arc::new(FsEntryWriter));
    let mut rx = session.subscribe();
    session.run().await;

    let mut phases = Vec::new();
    let mut last_progress = None;
    let mut finished = false;
    loop {
        match rx.try_recv() {
            Ok(SessionEvent::PhaseChanged { to, .. }) => phases.push(to),
            Ok(SessionEvent::DownloadProgress { downloaded, .. }) => last_progress = Some(downloaded),
            Ok(SessionEvent::Finished(outcome)) => {
                assert!(matches!(outcome, SessionOutcome::Updated { .. }));
                finished = true;
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    assert_eq!(
        phases,
        vec![
            SessionPhase::CheckingManifest,
            SessionPhase::Downloading,
            SessionPhase::Verifying,
            SessionPhase::Extracting,
            SessionPhase::InstallComplete,
            SessionPhase::Relaunching,
            SessionPhase::Idle,
        ]
    );
    assert_eq!(last_progress, Some(archive_len));
    assert!(finished);
}

// ═══════════════════════════════════════════════════════
// 테스트 4: 압축 해제 재시도
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_transient_write_failures_are_absorbed() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let archive = build_zip(&[("app.exe", b"new binary")]);
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(|b| manifest_json(b, "2.0.0.0", &checksum), archive, Duration::ZERO).await;

    let writer = Arc::new(FlakyWriter::new(9));
    let session = fx.session(&mock.base, Arc::new(RecordingHandoff::default()), writer.clone());

    let outcome = session.run().await;
    assert!(matches!(outcome, SessionOutcome::Updated { .. }), "{:?}", outcome);
    assert_eq!(writer.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_exhausted_write_retries_fail_the_session() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let archive = build_zip(&[("app.exe", b"new binary")]);
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(|b| manifest_json(b, "2.0.0.0", &checksum), archive, Duration::ZERO).await;

    let handoff = Arc::new(RecordingHandoff::default());
    let session = fx.session(&mock.base, handoff.clone(), Arc::new(FlakyWriter::new(11)));

    let outcome = session.run().await;
    assert!(matches!(
        outcome.error(),
        Some(UpdaterError::Extraction { attempts: 10, .. })
    ));
    assert_eq!(
        session.version_set().max_installed_version().unwrap().map(|v| v.to_string()),
        Some("1.0.0.0".to_string())
    );
    assert!(!fx.root.join("App_2.0.0.0").exists());
    assert!(handoff.terminated().is_empty());
    assert!(fx.download_dir_is_empty());
}

// ═══════════════════════════════════════════════════════
// 테스트 5: 핸드오프 / 런처 흐름
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_failed_launch_restores_previous_version() {
    let fx = Fixture::new();
    let old_exe = fx.install_version("App_1.0.0.0");
    let archive = app_zip();
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(|b| manifest_json(b, "2.0.0.0", &checksum), archive, Duration::ZERO).await;

    let new_exe = fx.root.join("App_2.0.0.0").join("app.exe");
    let handoff = Arc::new(RecordingHandoff {
        fail_launch_of: Some(new_exe.clone()),
        ..Default::default()
    });
    let session = fx.session(&mock.base, handoff.clone(), Arc::new(FsEntryWriter));

    let outcome = session.run().await;
    assert!(matches!(outcome.error(), Some(UpdaterError::Launch { .. })));
    assert!(new_exe.exists(), "install itself succeeded");
    assert_eq!(handoff.terminated(), vec![old_exe.clone()]);
    assert_eq!(handoff.launched_paths(), vec![old_exe]);
}

#[tokio::test]
async fn test_archive_without_executable_does_not_touch_running_app() {
    let fx = Fixture::new();
    fx.install_version("App_1.0.0.0");
    let archive = build_zip(&[("other.bin", b"x")]);
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(|b| manifest_json(b, "2.0.0.0", &checksum), archive, Duration::ZERO).await;

    let handoff = Arc::new(RecordingHandoff::default());
    let session = fx.session(&mock.base, handoff.clone(), Arc::new(FsEntryWriter));

    let outcome = session.run().await;
    assert!(matches!(outcome.error(), Some(UpdaterError::Launch { .. })));
    assert!(handoff.terminated().is_empty());
    assert!(handoff.launched_paths().is_empty());
}

#[tokio::test]
async fn test_first_run_installs_in_foreground() {
    let fx = Fixture::new();
    let archive = app_zip();
    let checksum = sha512_upper(&archive);
    let mock = spawn_mock(|b| manifest_json(b, "1.5.0.0", &checksum), archive, Duration::ZERO).await;

    let handoff = Arc::new(RecordingHandoff::default());
    let session = fx.session(&mock.base, handoff.clone(), Arc::new(FsEntryWriter));

    match session.launch_or_install().await.unwrap() {
        Startup::FirstInstall(SessionOutcome::Updated { previous, .. }) => assert!(previous.is_none()),
        other => panic!("unexpected startup: {:?}", other),
    }
    assert!(handoff.terminated().is_empty(), "nothing to terminate on first run");
    assert_eq!(
        handoff.launched_paths(),
        vec![fx.root.join("App_1.5.0.0").join("app.exe")]
    );
}

#[tokio::test]
async fn test_installed_app_launches_before_background_check() {
    let fx = Fixture::new();
    let old_exe = fx.install_version("App_1.0.0.0");
    let mock = spawn_mock(|b| manifest_json(b, "1.0.0.0", "ABCD"), app_zip(), Duration::ZERO).await;

    let handoff = Arc::new(RecordingHandoff::default());
    let session = fx.session(&mock.base, handoff.clone(), Arc::new(FsEntryWriter));

    match session.launch_or_install().await.unwrap() {
        Startup::LaunchedInstalled { pid, update } => {
            assert_eq!(pid, 5001);
            let outcome = update.expect("background session").await.unwrap();
            assert!(matches!(outcome, SessionOutcome::NoUpdateAvailable { .. }));
        }
        other => panic!("unexpected startup: {:?}", other),
    }
    assert_eq!(handoff.launched_paths(), vec![old_exe]);
}

#[tokio::test]
async fn test_launch_installed_without_versions_fails() {
    let fx = Fixture::new();
    let session = fx.session("http://127.0.0.1:9", Arc::new(RecordingHandoff::default()), Arc::new(FsEntryWriter));
    let err = session.launch_installed(&[]).await.unwrap_err();
    assert_eq!(err.kind(), "LAUNCH_ERROR");
}

// ═══════════════════════════════════════════════════════
// 테스트 6: 설정
// ═══════════════════════════════════════════════════════

#[test]
fn test_config_defaults_and_validation() {
    let config = crate::UpdaterConfig::default();
    assert_eq!(config.extraction_attempts, 10);
    assert_eq!(config.retry_policy().delay, Duration::from_millis(2000));
    assert_eq!(config.graceful_exit_timeout(), Duration::from_secs(10));
    assert_eq!(config.session_settings().await_timeout, Duration::from_secs(600));
    assert!(matches!(
        config.validate(),
        Err(UpdaterError::Validation { ref field, .. }) if field == "executable_name"
    ));

    let config = crate::UpdaterConfig {
        executable_name: "app.exe".into(),
        version_prefix: "App".into(),
        manifest_url: "https://example.com/manifest.json".into(),
        install_root: Some("/opt/app".into()),
        ..Default::default()
    };
    assert!(config.validate().is_ok());
    let app = config.app_information().unwrap();
    assert_eq!(app.version_prefix(), "App_");
    assert_eq!(app.install_root(), Path::new("/opt/app"));
}

#[tokio::test]
async fn test_session_from_config() {
    let config = crate::UpdaterConfig {
        executable_name: "app.exe".into(),
        version_prefix: "App".into(),
        manifest_url: "https://example.com/manifest.json".into(),
        install_root: Some("/opt/app".into()),
        ..Default::default()
    };
    let session = UpdateSession::from_config(&config).unwrap();
    assert_eq!(session.app().executable_name(), "app.exe");
    assert_eq!(session.phase(), SessionPhase::Idle);

    let missing = crate::UpdaterConfig::default();
    assert!(UpdateSession::from_config(&missing).is_err());
}
