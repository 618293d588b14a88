//! 앱 버전 비교 유틸리티 (외부 크레이트 없이)
//!
//! 설치 디렉터리 이름(`<prefix><version>`)과 매니페스트의 버전 문자열이
//! 같은 규칙으로 해석되어야 하므로 `major.minor[.patch[.build]]` 형식만 허용한다.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 4단계 앱 버전 (major.minor.patch.build)
#[derive(Debug, Clone, Copy)]
pub struct AppVersion {
    parts: [u64; 4],
    /// 파싱할 때 주어진 구성 요소 수 (표시용, 2..=4)
    len: usize,
}

impl AppVersion {
    /// 설치된 버전이 없을 때 비교 기준으로 쓰는 0.0.0.0
    pub const ZERO: AppVersion = AppVersion { parts: [0; 4], len: 4 };

    pub fn new(major: u64, minor: u64, patch: u64, build: u64) -> Self {
        Self {
            parts: [major, minor, patch, build],
            len: 4,
        }
    }

    /// "1.2", "1.2.3", "v1.2.3.4" 형식을 파싱
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);

        let pieces: Vec<&str> = s.split('.').collect();
        if !(2..=4).contains(&pieces.len()) {
            return None;
        }

        let mut parts = [0u64; 4];
        for (slot, piece) in parts.iter_mut().zip(&pieces) {
            if piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            *slot = piece.parse().ok()?;
        }

        Some(Self { parts, len: pieces.len() })
    }

    pub fn major(&self) -> u64 {
        self.parts[0]
    }

    pub fn minor(&self) -> u64 {
        self.parts[1]
    }

    pub fn patch(&self) -> u64 {
        self.parts[2]
    }

    pub fn build(&self) -> u64 {
        self.parts[3]
    }

    /// 다른 버전보다 엄격하게 새로운지 확인
    pub fn is_newer_than(&self, other: &AppVersion) -> bool {
        self > other
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: Vec<String> = self.parts[..self.len].iter().map(|p| p.to_string()).collect();
        write!(f, "{}", shown.join("."))
    }
}

// 비교는 항상 4단계로 정규화된 값 기준 ("1.0" == "1.0.0.0")
impl PartialEq for AppVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for AppVersion {}

impl Hash for AppVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AppVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AppVersion::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid version '{}'", raw)))
    }
}
