#![forbid(unsafe_code)]

//! Shared test harness pieces: a JSON test log per run, fixture digests and
//! the environment knobs that size property tests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const TEST_LOG_SCHEMA_VERSION: &str = "frankenarray.test-log.v1";

/// Which Force path a test exercised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    Inline,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Pass,
    Fail,
}

/// One JSON record per logged test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestLog {
    pub schema_version: String,
    pub test_id: String,
    pub fixture_id: String,
    pub mode: TestMode,
    /// Seed the property runner was pinned to, if any.
    pub seed: Option<u64>,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
    pub details: Option<String>,
}

impl TestLog {
    #[must_use]
    pub fn new(test_id: impl Into<String>, fixture_id: impl Into<String>, mode: TestMode) -> Self {
        Self {
            schema_version: TEST_LOG_SCHEMA_VERSION.to_owned(),
            test_id: test_id.into(),
            fixture_id: fixture_id.into(),
            mode,
            seed: proptest_seed(),
            outcome: TestOutcome::Fail,
            duration_ms: 0,
            details: None,
        }
    }
}

/// SHA-256 hex digest of a fixture's JSON encoding.
pub fn fixture_digest<T: Serialize>(fixture: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(fixture)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[must_use]
pub fn property_test_case_count() -> u32 {
    if let Ok(raw) = std::env::var("FA_PROPTEST_CASES")
        && let Ok(parsed) = raw.parse::<u32>()
        && parsed > 0
    {
        return parsed;
    }

    if std::env::var_os("CI").is_some() {
        1024
    } else {
        256
    }
}

fn proptest_seed() -> Option<u64> {
    ["FA_PROPTEST_SEED", "PROPTEST_RNG_SEED"]
        .into_iter()
        .find_map(|key| std::env::var(key).ok()?.parse().ok())
}

#[must_use]
pub fn test_id(module_path: &str, test_name: &str) -> String {
    format!("{module_path}::{test_name}")
}

/// Directory logs are written to, if `FA_TEST_LOG_DIR` is set.
#[must_use]
pub fn test_log_dir() -> Option<PathBuf> {
    std::env::var_os("FA_TEST_LOG_DIR").map(PathBuf::from)
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return (*msg).to_owned();
    }
    "non-string panic payload".to_owned()
}

pub fn write_log(dir: &Path, log: &TestLog) -> Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|err| format!("log dir create failed: {err}"))?;
    let path = dir.join(format!("{}.json", log.test_id.replace("::", "__")));
    let payload =
        serde_json::to_string_pretty(log).map_err(|err| format!("log serialize failed: {err}"))?;
    fs::write(&path, payload).map_err(|err| format!("log write failed: {err}"))?;
    Ok(path)
}

/// Run `body`, record a [`TestLog`] for it and re-raise any failure.
///
/// The log is written to [`test_log_dir`] when configured and returned either
/// way so callers can attach extra details.
pub fn run_logged_test<Fixture, F>(
    test_id: &str,
    fixture: &Fixture,
    mode: TestMode,
    body: F,
) -> TestLog
where
    Fixture: Serialize,
    F: FnOnce() -> Result<(), String>,
{
    let fixture_id = fixture_digest(fixture).unwrap_or_else(|err| format!("unhashable: {err}"));
    let mut log = TestLog::new(test_id, fixture_id, mode);

    let started = Instant::now();
    let failure = match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => {
            log.outcome = TestOutcome::Pass;
            None
        }
        Ok(Err(detail)) => Some(detail),
        Err(payload) => Some(panic_payload_to_string(payload.as_ref())),
    };
    log.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    log.details.clone_from(&failure);

    if let Some(dir) = test_log_dir()
        && let Err(err) = write_log(&dir, &log)
    {
        panic!("{err}");
    }
    if let Some(detail) = failure {
        panic!("{test_id}: {detail}");
    }
    log
}

#[cfg(test)]
mod tests {
    use super::{
        TEST_LOG_SCHEMA_VERSION, TestLog, TestMode, TestOutcome, fixture_digest,
        property_test_case_count, run_logged_test, test_id, write_log,
    };
    use tempfile::tempdir;

    #[test]
    fn fixture_digest_is_deterministic() {
        let fixture = serde_json::json!({
            "shape": [2, 3],
            "axes": [0]
        });
        let digest_a = fixture_digest(&fixture).expect("digest should build");
        let digest_b = fixture_digest(&fixture).expect("digest should build");
        assert_eq!(digest_a, digest_b);
        assert_eq!(digest_a.len(), 64);
    }

    #[test]
    fn property_case_count_has_default_floor() {
        assert!(property_test_case_count() >= 1);
    }

    #[test]
    fn new_logs_start_failed_under_the_current_schema() {
        let log = TestLog::new("t", "fixture-id", TestMode::Inline);
        assert_eq!(log.schema_version, TEST_LOG_SCHEMA_VERSION);
        assert_eq!(log.outcome, TestOutcome::Fail);
    }

    #[test]
    fn logs_are_written_under_a_flattened_name() {
        let dir = tempdir().expect("temp dir");
        let log = TestLog::new(
            test_id("fa_reduce::engine::tests", "keepdims"),
            "fixture-id",
            TestMode::Inline,
        );
        let path = write_log(dir.path(), &log).expect("log written");
        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("fa_reduce__engine__tests__keepdims.json")
        );
        let raw = std::fs::read_to_string(&path).expect("readable");
        let decoded: TestLog = serde_json::from_str(&raw).expect("valid log");
        assert_eq!(decoded, log);
    }

    #[test]
    fn passing_body_produces_a_pass_log() {
        let log = run_logged_test(
            &test_id(module_path!(), "passing_body_produces_a_pass_log"),
            &("fixture", 1_u32),
            TestMode::Scheduled,
            || Ok(()),
        );
        assert_eq!(log.outcome, TestOutcome::Pass);
        assert_eq!(log.mode, TestMode::Scheduled);
        assert!(log.details.is_none());
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn failing_body_is_re_raised() {
        let _ = run_logged_test("failing", &0_u8, TestMode::Inline, || Err("boom".to_owned()));
    }
}
