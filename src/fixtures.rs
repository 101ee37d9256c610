//! Local fixture acquisition.
//!
//! Downloads land in a temp file next to their destination and are persisted
//! only after the digest (when configured) checks out, so an interrupted or
//! corrupt transfer never leaves a partial fixture behind.
use crate::config::{BatchConfig, ScenarioConfig};
use crate::dataset::DatasetError;
use crate::error::RegressError;
use crate::util::sha256_hex;
use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Scenarios whose local file does not exist yet.
pub fn missing_fixtures(config: &BatchConfig) -> Vec<&ScenarioConfig> {
    config
        .scenarios
        .iter()
        .filter(|scenario| !scenario.local_file.is_file())
        .collect()
}

/// Makes sure every local file is present, downloading when allowed.
///
/// Returns the paths that were downloaded.
pub fn ensure_fixtures(config: &BatchConfig, download: bool) -> Result<Vec<PathBuf>> {
    let missing = missing_fixtures(config);
    if missing.is_empty() {
        return Ok(Vec::new());
    }
    if !download {
        return Err(missing_error(&missing, "enable auto_download or pass --download").into());
    }
    let without_url: Vec<&ScenarioConfig> = missing
        .iter()
        .copied()
        .filter(|scenario| scenario.fixture_url.is_none())
        .collect();
    if !without_url.is_empty() {
        return Err(missing_error(&without_url, "no fixture_url configured").into());
    }

    let agent = ureq::Agent::new_with_defaults();
    let mut downloaded = Vec::with_capacity(missing.len());
    for scenario in missing {
        let Some(url) = scenario.fixture_url.as_deref() else {
            continue;
        };
        download_fixture(&agent, url, &scenario.local_file, scenario.sha256.as_deref())
            .with_context(|| format!("fetch fixture for {}", scenario.dataset_id))?;
        downloaded.push(scenario.local_file.clone());
    }
    Ok(downloaded)
}

/// Re-checks configured digests of fixtures already on disk.
///
/// Returns how many files were verified.
pub fn verify_present(config: &BatchConfig) -> Result<usize> {
    let mut verified = 0;
    for scenario in &config.scenarios {
        let Some(expected) = scenario.sha256.as_deref() else {
            continue;
        };
        if !scenario.local_file.is_file() {
            continue;
        }
        let bytes = fs::read(&scenario.local_file)
            .with_context(|| format!("read {}", scenario.local_file.display()))?;
        let digest = sha256_hex(&bytes);
        if !digest.eq_ignore_ascii_case(expected) {
            return Err(anyhow!(
                "sha256 mismatch for {}: expected {expected}, got {digest}",
                scenario.local_file.display()
            ));
        }
        verified += 1;
    }
    Ok(verified)
}

fn missing_error(missing: &[&ScenarioConfig], hint: &str) -> RegressError {
    let paths: Vec<String> = missing
        .iter()
        .map(|scenario| scenario.local_file.display().to_string())
        .collect();
    RegressError::Dataset(DatasetError::Open {
        dataset: "local fixtures".to_string(),
        reason: format!("missing {} ({hint})", paths.join(", ")),
    })
}

/// Streams `url` into `dest`, verifying `expected_sha256` when given.
pub fn download_fixture(
    agent: &ureq::Agent,
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
) -> Result<u64> {
    let start = Instant::now();
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("GET {url}"))?;
    let mut reader = response.into_body().into_reader();

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    let mut writer = HashingWriter::new(temp.as_file_mut());
    io::copy(&mut reader, &mut writer).with_context(|| format!("download {url}"))?;
    writer.flush().context("flush fixture")?;
    let (bytes, digest) = writer.finish();

    if let Some(expected) = expected_sha256 {
        if !digest.eq_ignore_ascii_case(expected) {
            return Err(anyhow!(
                "sha256 mismatch for {url}: expected {expected}, got {digest}"
            ));
        }
    }

    temp.persist(dest)
        .map_err(|err| err.error)
        .with_context(|| format!("persist {}", dest.display()))?;
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        bytes,
        dest = %dest.display(),
        "fixture downloaded"
    );
    Ok(bytes)
}

struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (u64, String) {
        (self.bytes, format!("{:x}", self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::gate::Thresholds;
    use crate::locator::Locator;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    // Answers a single GET with `body` and returns the URL it listens on.
    fn serve_once(body: &'static [u8]) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/granule.nc", listener.local_addr().expect("addr"));
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut line = String::new();
            while reader.read_line(&mut line).expect("read request") > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .expect("write head");
            stream.write_all(body).expect("write body");
        });
        (url, handle)
    }

    fn direct_agent() -> ureq::Agent {
        ureq::Agent::config_builder().proxy(None).build().into()
    }

    fn config_for(scenarios: Vec<ScenarioConfig>) -> BatchConfig {
        BatchConfig {
            schema_version: 1,
            endpoint: "host".to_string(),
            auto_download: false,
            thresholds: Thresholds::default(),
            locator: Locator::default(),
            scenarios,
        }
    }

    fn scenario(local_file: PathBuf, fixture_url: Option<&str>) -> ScenarioConfig {
        ScenarioConfig {
            local_file,
            dataset_id: "ds".to_string(),
            reference_time_seconds: 1.0,
            fixture_url: fixture_url.map(str::to_string),
            sha256: None,
        }
    }

    #[test]
    fn present_fixtures_need_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.nc");
        fs::write(&path, b"granule").expect("write");
        let config = config_for(vec![scenario(path, None)]);
        assert!(missing_fixtures(&config).is_empty());
        assert!(ensure_fixtures(&config, false).expect("ensure").is_empty());
    }

    #[test]
    fn missing_fixtures_without_download_list_every_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("a.nc");
        let second = dir.path().join("b.nc");
        let config = config_for(vec![
            scenario(first.clone(), Some("https://host/a.nc")),
            scenario(second.clone(), None),
        ]);
        assert_eq!(missing_fixtures(&config).len(), 2);

        let err = ensure_fixtures(&config, false).expect_err("missing");
        let regress = err.downcast_ref::<RegressError>().expect("typed error");
        assert_eq!(regress.kind(), FailureKind::OpenError);
        let message = regress.to_string();
        assert!(message.contains(&first.display().to_string()), "{message}");
        assert!(message.contains(&second.display().to_string()), "{message}");
    }

    #[test]
    fn download_without_url_is_refused_before_any_transfer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_for(vec![scenario(dir.path().join("a.nc"), None)]);
        let err = ensure_fixtures(&config, true).expect_err("no url");
        assert!(err.to_string().contains("no fixture_url"), "{err}");
    }

    #[test]
    fn present_fixture_digest_is_verified() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.nc");
        fs::write(&path, b"granule").expect("write");

        let mut good = scenario(path.clone(), None);
        good.sha256 = Some(sha256_hex(b"granule"));
        assert_eq!(verify_present(&config_for(vec![good])).expect("verify"), 1);

        let mut bad = scenario(path, None);
        bad.sha256 = Some(sha256_hex(b"other"));
        let err = verify_present(&config_for(vec![bad])).expect_err("mismatch");
        assert!(err.to_string().contains("sha256 mismatch"), "{err}");
    }

    #[test]
    fn hashing_writer_matches_util_digest() {
        let mut sink = Vec::new();
        let mut writer = HashingWriter::new(&mut sink);
        writer.write_all(b"precip").expect("write");
        let (bytes, digest) = writer.finish();
        assert_eq!(bytes, 6);
        assert_eq!(digest, sha256_hex(b"precip"));
        assert_eq!(sink, b"precip");
    }

    #[test]
    fn download_with_matching_digest_persists_file() {
        let (url, server) = serve_once(b"granule bytes");
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("fixtures").join("a.nc");

        let digest = sha256_hex(b"granule bytes");
        let bytes = download_fixture(&direct_agent(), &url, &dest, Some(&digest)).expect("download");
        server.join().expect("server");

        assert_eq!(bytes, 13);
        assert_eq!(fs::read(&dest).expect("read fixture"), b"granule bytes");
    }

    #[test]
    fn download_with_wrong_digest_leaves_nothing_behind() {
        let (url, server) = serve_once(b"truncated");
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().join("fixtures");
        let dest = parent.join("a.nc");

        let err = download_fixture(&direct_agent(), &url, &dest, Some(&sha256_hex(b"granule")))
            .expect_err("digest mismatch");
        server.join().expect("server");

        assert!(err.to_string().contains("sha256 mismatch"), "{err}");
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(&parent).expect("list").count(), 0);
    }
}
