use ingestor_model::{Indicator, IndicatorKind, Result};
use ipnetwork::Ipv4Network;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use walkdir::WalkDir;

use crate::policy::Policy;

/// URLs with an explicit scheme (spec §4.G).
static URL_WITH_PROTO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https?://[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,}(/[^\s"'<>)]*)?"#).unwrap()
});

/// URLs missing a scheme but carrying a path or port, e.g. `df.gov.br/api`.
static URL_WITHOUT_PROTO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,}[:/][^\s"'<>)]+"#).unwrap()
});

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\b(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.",
        r"(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.",
        r"(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.",
        r"(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b",
    ))
    .unwrap()
});

const MAX_VALUE_LEN: usize = 255;

/// Compiled scanner over a [`Policy`]. Compiling the per-domain patterns
/// once up front (spec §4.G: "compiled once") is why this is a struct
/// rather than a free function.
pub struct IocScanner {
    policy: Policy,
    domain_patterns: Vec<(String, Regex)>,
    cidrs: Vec<Ipv4Network>,
}

impl IocScanner {
    pub fn new(policy: Policy) -> Result<Self> {
        let domain_patterns = policy.compiled_domain_patterns()?;
        let cidrs = policy.compiled_cidrs()?;
        Ok(Self {
            policy,
            domain_patterns,
            cidrs,
        })
    }

    /// Recursively scans every `.txt` file under `root` (spec §4.G "File
    /// input"). File read errors are logged and skipped rather than
    /// aborting the whole scan.
    pub fn scan_directory(
        &self,
        root: &Path,
        source_fingerprint: &str,
        channel_id: i64,
    ) -> Result<Vec<Indicator>> {
        let mut indicators = Vec::new();

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }

            let relative_path = match path.strip_prefix(root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };

            let text = match read_text_lossy(path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not read file, skipping");
                    continue;
                }
            };

            indicators.extend(self.scan_text(&text, &relative_path, source_fingerprint, channel_id));
        }

        Ok(indicators)
    }

    /// Scans already-loaded text, one source (spec §4.G "Per-line
    /// procedure"). Split out from [`IocScanner::scan_directory`] so a
    /// scan can be exercised directly against a string in tests.
    pub fn scan_text(
        &self,
        text: &str,
        relative_path: &str,
        source_fingerprint: &str,
        channel_id: i64,
    ) -> Vec<Indicator> {
        let mut indicators = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line_num = (idx + 1) as i64;
            self.scan_url_hostnames(line, relative_path, source_fingerprint, line_num, channel_id, &mut indicators);
            self.scan_bare_domains(line, relative_path, source_fingerprint, line_num, channel_id, &mut indicators);
            self.scan_emails(line, relative_path, source_fingerprint, line_num, channel_id, &mut indicators);
            self.scan_ipv4(line, relative_path, source_fingerprint, line_num, channel_id, &mut indicators);
        }

        indicators
    }

    fn scan_url_hostnames(
        &self,
        line: &str,
        relative_path: &str,
        fingerprint: &str,
        line_num: i64,
        channel_id: i64,
        out: &mut Vec<Indicator>,
    ) {
        if self.policy.domains.is_empty() {
            return;
        }

        for m in URL_WITH_PROTO.find_iter(line) {
            if let Some(hostname) = extract_hostname(m.as_str()) {
                self.emit_if_watched_hostname(&hostname, relative_path, fingerprint, line_num, channel_id, out);
            }
        }

        for m in URL_WITHOUT_PROTO.find_iter(line) {
            let candidate = m.as_str();
            if candidate.starts_with('.') || candidate.starts_with('/') {
                continue;
            }
            let prefixed = format!("http://{candidate}");
            if let Some(hostname) = extract_hostname(&prefixed) {
                self.emit_if_watched_hostname(&hostname, relative_path, fingerprint, line_num, channel_id, out);
            }
        }
    }

    fn emit_if_watched_hostname(
        &self,
        hostname: &str,
        relative_path: &str,
        fingerprint: &str,
        line_num: i64,
        channel_id: i64,
        out: &mut Vec<Indicator>,
    ) {
        for target in &self.policy.domains {
            if hostname.contains(target.as_str()) {
                out.push(Indicator::new(
                    IndicatorKind::Domain,
                    hostname,
                    fingerprint,
                    relative_path,
                    line_num,
                    channel_id,
                ));
                break;
            }
        }
    }

    fn scan_bare_domains(
        &self,
        line: &str,
        relative_path: &str,
        fingerprint: &str,
        line_num: i64,
        channel_id: i64,
        out: &mut Vec<Indicator>,
    ) {
        for (_, pattern) in &self.domain_patterns {
            for caps in pattern.captures_iter(line) {
                let Some(m) = caps.get(1) else { continue };
                let value = m.as_str().to_lowercase();
                let value = value.trim_end_matches('.');
                if value.is_empty() || value.len() > MAX_VALUE_LEN {
                    continue;
                }
                out.push(Indicator::new(
                    IndicatorKind::Domain,
                    value,
                    fingerprint,
                    relative_path,
                    line_num,
                    channel_id,
                ));
            }
        }
    }

    fn scan_emails(
        &self,
        line: &str,
        relative_path: &str,
        fingerprint: &str,
        line_num: i64,
        channel_id: i64,
        out: &mut Vec<Indicator>,
    ) {
        if self.policy.emails.is_empty() {
            return;
        }

        for m in EMAIL.find_iter(line) {
            let email = m.as_str().to_lowercase();
            if email.len() > MAX_VALUE_LEN {
                continue;
            }
            let watched = self
                .policy
                .emails
                .iter()
                .any(|domain| email.ends_with(&format!("@{domain}")));
            if watched {
                out.push(Indicator::new(
                    IndicatorKind::Email,
                    email,
                    fingerprint,
                    relative_path,
                    line_num,
                    channel_id,
                ));
            }
        }
    }

    fn scan_ipv4(
        &self,
        line: &str,
        relative_path: &str,
        fingerprint: &str,
        line_num: i64,
        channel_id: i64,
        out: &mut Vec<Indicator>,
    ) {
        if self.cidrs.is_empty() {
            return;
        }

        for m in IPV4.find_iter(line) {
            let Ok(addr) = Ipv4Addr::from_str(m.as_str()) else {
                continue;
            };
            if self.cidrs.iter().any(|net| net.contains(addr)) {
                out.push(Indicator::new(
                    IndicatorKind::Ipv4,
                    addr.to_string(),
                    fingerprint,
                    relative_path,
                    line_num,
                    channel_id,
                ));
            }
        }
    }
}

/// Reads a file as UTF-8, falling back to lossy Latin-1 decoding on
/// failure (spec §4.G "File input"). Latin-1 maps byte values 0x00-0xFF
/// directly onto the first 256 Unicode scalars, so this never fails.
fn read_text_lossy(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => Ok(e.into_bytes().iter().map(|&b| b as char).collect()),
    }
}

/// Extracts a lowercase hostname from a URL that is known to start with
/// `http://` or `https://`. Hand-rolled rather than a full URL parser
/// since only the authority's host part (no userinfo, no port) is needed.
fn extract_hostname(url: &str) -> Option<String> {
    let after_scheme = url.splitn(2, "://").nth(1)?;
    let authority_end = after_scheme.find(['/', '?', '#']).unwrap_or(after_scheme.len());
    let authority = &after_scheme[..authority_end];
    let host_and_port = authority.rsplit('@').next().unwrap_or(authority);
    let host = host_and_port.split(':').next().unwrap_or(host_and_port);
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner(domains: &[&str], emails: &[&str], cidrs: &[&str]) -> IocScanner {
        let policy = Policy::new(
            domains.iter().map(|s| s.to_string()).collect(),
            emails.iter().map(|s| s.to_string()).collect(),
            cidrs.iter().map(|s| s.to_string()).collect(),
        );
        IocScanner::new(policy).unwrap()
    }

    #[test]
    fn url_with_protocol_matches_substring_hostname() {
        // The protocol and protocol-less URL regexes both match this line
        // (the latter against the `api.watched.org/v1/x` substring after the
        // scheme), and scan_url_hostnames doesn't dedup across the two
        // loops, so the same hostname is emitted twice. That is the
        // original scanner's behavior, preserved here rather than papered
        // over.
        let scanner = scanner(&["watched.org"], &[], &[]);
        let indicators = scanner.scan_text(
            "see https://api.watched.org/v1/x for details",
            "hits.txt",
            "fp",
            1,
        );
        assert_eq!(indicators.len(), 2);
        for indicator in &indicators {
            assert_eq!(indicator.kind, IndicatorKind::Domain);
            assert_eq!(indicator.value, "api.watched.org");
            assert_eq!(indicator.source_line, 1);
        }
    }

    #[test]
    fn url_hostname_substring_match_is_asymmetric_with_bare_domain() {
        // Open Question #1 (spec §9): substring match on URL hostnames can
        // spuriously fire on a suffix collision the anchored bare-domain
        // regex would not. Preserved intentionally, not "fixed".
        let scanner = scanner(&["watched.org"], &[], &[]);
        let indicators = scanner.scan_text(
            "http://notwatched.org.evil.com/path",
            "hits.txt",
            "fp",
            1,
        );
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].value, "notwatched.org.evil.com");
    }

    #[test]
    fn url_without_protocol_is_parsed_with_http_prefix() {
        let scanner = scanner(&["gov.br"], &[], &[]);
        let indicators = scanner.scan_text("see df.gov.br/api for the feed", "a.txt", "fp", 4);
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].value, "df.gov.br");
    }

    #[test]
    fn bare_domain_match_requires_word_boundary_and_strips_trailing_dot() {
        let scanner = scanner(&["watched.org"], &[], &[]);
        let indicators = scanner.scan_text("reach out via foo.watched.org.", "a.txt", "fp", 2);
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].value, "foo.watched.org");
    }

    #[test]
    fn email_on_watched_domain_is_emitted_lowercased() {
        let scanner = scanner(&[], &["watched.org"], &[]);
        let indicators = scanner.scan_text("contact Bar@Watched.org now", "a.txt", "fp", 3);
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].kind, IndicatorKind::Email);
        assert_eq!(indicators[0].value, "bar@watched.org");
    }

    #[test]
    fn email_on_unwatched_domain_is_not_emitted() {
        let scanner = scanner(&[], &["watched.org"], &[]);
        let indicators = scanner.scan_text("contact me@other.org now", "a.txt", "fp", 1);
        assert!(indicators.is_empty());
    }

    #[test]
    fn ipv4_inside_cidr_is_emitted_outside_is_not() {
        let scanner = scanner(&[], &[], &["10.0.0.0/24"]);
        let indicators = scanner.scan_text("hosts: 10.0.0.5 and 8.8.8.8", "a.txt", "fp", 2);
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].value, "10.0.0.5");
    }

    #[test]
    fn line_with_domain_and_email_produces_one_of_each_with_stable_line_number() {
        let scanner = scanner(&["watched.org"], &["watched.org"], &[]);
        let indicators =
            scanner.scan_text("line one\nfoo.watched.org and bar@watched.org", "a.txt", "fp", 1);
        assert_eq!(indicators.len(), 2);
        assert!(indicators.iter().all(|i| i.source_line == 2));
        assert!(indicators.iter().any(|i| i.kind == IndicatorKind::Domain));
        assert!(indicators.iter().any(|i| i.kind == IndicatorKind::Email));
    }

    #[test]
    fn empty_policy_lists_disable_their_scanner_stage() {
        let scanner = scanner(&[], &[], &[]);
        let indicators = scanner.scan_text(
            "https://watched.org me@watched.org 10.0.0.5",
            "a.txt",
            "fp",
            1,
        );
        assert!(indicators.is_empty());
    }

    #[test]
    fn scan_directory_only_considers_txt_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("hit.txt"), "10.0.0.5").unwrap();
        std::fs::write(dir.path().join("skip.bin"), "10.0.0.5").unwrap();

        let scanner = scanner(&[], &[], &["10.0.0.0/24"]);
        let indicators = scanner.scan_directory(dir.path(), "fp", 1).unwrap();

        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].source_relative_path, "nested/hit.txt");
    }
}
