//! Component filter (spec §4.4 step 4): reject requests whose client
//! identity header matches a deny list of known scanner signatures.

const SCANNER_SIGNATURES: &[&str] = &["sqlmap", "nikto", "nmap", "masscan", "acunetix"];

/// Whether a `User-Agent` (or other client-identity header) value matches
/// a known scanner signature, case-insensitively.
pub fn is_known_scanner(client_identity: &str) -> bool {
    let lower = client_identity.to_ascii_lowercase();
    SCANNER_SIGNATURES.iter().any(|sig| lower.contains(sig))
}
