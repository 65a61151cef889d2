use serde::Serialize;
use std::path::Path;

/// Compute Blake3 hash of file content
/// Blake3 is faster than SHA-256 while maintaining cryptographic security
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(hash_bytes(&content))
}

/// Compute Blake3 hash of a byte slice
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Hash a job's resolution-relevant configuration to detect config changes
/// Any change in search paths, macros or toolchain flags invalidates the state
pub fn hash_config<T: Serialize>(config: &T) -> String {
    // Serialize config to JSON for stable hashing
    let json = serde_json::to_string(config).expect("Failed to serialize config");
    hash_bytes(json.as_bytes())
}
