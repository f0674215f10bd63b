//! Domain firewall rule entity

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::account::CompanyId;

/// What to do with a request to a matching domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleAction {
    Allow,
    Block,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("ALLOW"),
            Self::Block => f.write_str("BLOCK"),
        }
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALLOW" => Ok(Self::Allow),
            "BLOCK" => Ok(Self::Block),
            other => Err(format!("unknown rule action: {}", other)),
        }
    }
}

/// A single `<company> <ALLOW|BLOCK> <domain>` rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub company_id: CompanyId,
    pub action: RuleAction,
    pub domain: String,
}

impl DomainRule {
    /// Parse rules text
    ///
    /// One rule per line, or several joined with `|` on a single line. Blank
    /// lines and `#` comments are skipped, as is any line that does not have
    /// exactly three whitespace-separated tokens or has an unknown action.
    pub fn parse_all(rules: &str) -> Vec<DomainRule> {
        rules
            .split(['\n', '|'])
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                let [company, action, domain] = parts.as_slice() else {
                    return None;
                };
                let action = action.parse().ok()?;
                Some(DomainRule {
                    company_id: CompanyId::new(*company),
                    action,
                    domain: domain.trim_end_matches('.').to_ascii_lowercase(),
                })
            })
            .collect()
    }
}

impl fmt::Display for DomainRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.company_id, self.action, self.domain)
    }
}
