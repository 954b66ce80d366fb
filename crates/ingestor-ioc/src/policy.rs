use ingestor_model::{IngestError, Result};
use ipnetwork::Ipv4Network;
use regex::Regex;

/// Indicator-of-compromise watchlist (spec §4.G, §6). Any list may be
/// empty, which disables the corresponding scanner stage.
#[derive(Clone, Debug, Default)]
pub struct Policy {
    pub domains: Vec<String>,
    pub emails: Vec<String>,
    pub ipv4_cidrs: Vec<String>,
}

impl Policy {
    pub fn new(domains: Vec<String>, emails: Vec<String>, ipv4_cidrs: Vec<String>) -> Self {
        Self {
            domains: domains.into_iter().map(|d| d.to_lowercase()).collect(),
            emails: emails
                .into_iter()
                .map(|e| e.to_lowercase().trim_start_matches('@').to_string())
                .collect(),
            ipv4_cidrs,
        }
    }

    pub(crate) fn compiled_cidrs(&self) -> Result<Vec<Ipv4Network>> {
        self.ipv4_cidrs
            .iter()
            .map(|cidr| {
                cidr.parse::<Ipv4Network>()
                    .map_err(|e| IngestError::Config(format!("invalid ipv4 cidr '{cidr}': {e}")))
            })
            .collect()
    }

    pub(crate) fn compiled_domain_patterns(&self) -> Result<Vec<(String, Regex)>> {
        self.domains
            .iter()
            .map(|domain| {
                let pattern = format!(r"(?i)\b([A-Za-z0-9][A-Za-z0-9.-]*{})\b", regex::escape(domain));
                Regex::new(&pattern)
                    .map(|re| (domain.clone(), re))
                    .map_err(|e| IngestError::Config(format!("bad domain pattern for '{domain}': {e}")))
            })
            .collect()
    }
}
