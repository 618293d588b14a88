//! 로깅 초기화

/// stderr로 출력하는 fmt 구독자 설치 (stdout은 결과 JSON 전용).
/// 기본 레벨은 info, `RUST_LOG`로 변경 가능.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}
