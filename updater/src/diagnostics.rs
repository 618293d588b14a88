//! 세션 진단 기록
//!
//! tracing 로그와 별개로, 세션마다 사람이 읽을 수 있는 기록을 누적한다.
//! 어디에 저장할지는 호출자가 정한다 (`text()`로 꺼내 간다).

use std::fmt::Write as _;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    text: String,
    started_at: Option<DateTime<Local>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 세션 헤더를 남긴다
    pub fn begin_session(&mut self, app_label: &str) {
        let now = Local::now();
        self.started_at = Some(now);
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        let _ = writeln!(
            self.text,
            "=== Update session for {} started at {} ===",
            app_label,
            now.format("%Y-%m-%d %H:%M:%S%.3f %:z")
        );
    }

    /// 원문 그대로 한 줄 추가
    pub fn append(&mut self, text: &str) {
        self.text.push_str(text.trim_end());
        self.text.push('\n');
    }

    pub fn track_event(&mut self, tag: &str, message: &str) {
        let _ = writeln!(self.text, "{} [{}] {}", self.elapsed_stamp(), tag, message);
    }

    /// 에러와 `source()` 체인 전체를 기록한다
    pub fn track_error(&mut self, tag: &str, err: &(dyn std::error::Error + 'static)) {
        let _ = writeln!(self.text, "{} [{}] ERROR: {}", self.elapsed_stamp(), tag, err);
        let mut source = err.source();
        while let Some(cause) = source {
            let _ = writeln!(self.text, "    caused by: {}", cause);
            source = cause.source();
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn elapsed_stamp(&self) -> String {
        match self.started_at {
            Some(start) => {
                let elapsed = Local::now().signed_duration_since(start);
                format!("+{:>6}ms", elapsed.num_milliseconds())
            }
            None => Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }
}
