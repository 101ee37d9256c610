use sha2::Digest;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Formats a duration in seconds with millisecond precision.
pub fn format_seconds(seconds: f64) -> String {
    format!("{seconds:.3}s")
}
