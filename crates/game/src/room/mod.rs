use rand::Rng;
use serde::{Deserialize, Serialize};

/// Leading segment of every full room identifier. Keeps our ids apart from
/// unrelated peers sharing the same signaling namespace.
pub const NAMESPACE: &str = "toonks";
pub const DEFAULT_CODE_LENGTH: usize = 6;

const SEPARATOR: char = '-';

#[derive(Debug, Clone, Default)]
pub struct RoomOptions {
    pub length: Option<usize>,
    pub prefix: Option<String>,
    pub value: Option<String>,
}

impl RoomOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Default::default()
        }
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId {
    full: String,
    code: String,
}

impl RoomId {
    pub fn from_code(prefix: &str, code: &str) -> Self {
        let full = if prefix.is_empty() {
            format!("{NAMESPACE}{SEPARATOR}{code}")
        } else {
            format!("{NAMESPACE}{SEPARATOR}{prefix}{SEPARATOR}{code}")
        };

        Self {
            full,
            code: code.to_string(),
        }
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

pub fn create_room_id(options: &RoomOptions) -> RoomId {
    let code = match &options.value {
        Some(value) => value.clone(),
        None => random_code(options.length.unwrap_or(DEFAULT_CODE_LENGTH)),
    };

    RoomId::from_code(options.prefix.as_deref().unwrap_or_default(), &code)
}

/// Extracts the bare code from a full identifier. Anything outside our
/// namespace, or under a different prefix when one is requested, is rejected.
pub fn parse_room_id(full: &str, prefix: Option<&str>) -> Option<String> {
    let segments: Vec<&str> = full.split(SEPARATOR).collect();

    if segments.len() < 2 || segments[0] != NAMESPACE {
        return None;
    }

    if let Some(prefix) = prefix {
        if segments[1] != prefix {
            return None;
        }
    }

    segments
        .last()
        .filter(|code| !code.is_empty())
        .map(|code| code.to_string())
}

fn random_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.gen_range(b'A'..=b'Z') as char)
        .collect()
}
