//! Account domain model

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a financial institution (e.g. "hapoalim", "mizrahi")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(String);

impl CompanyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CompanyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CompanyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A configured account to scrape
///
/// Credentials are an opaque bag handed to the scraper as-is. The account is
/// immutable for the duration of a run.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub company_id: CompanyId,
    #[serde(flatten)]
    pub credentials: BTreeMap<String, serde_json::Value>,
}

impl AccountConfig {
    /// Create an account with no credentials
    pub fn new(company_id: impl Into<CompanyId>) -> Self {
        Self {
            company_id: company_id.into(),
            credentials: BTreeMap::new(),
        }
    }

    /// Add a credential field
    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }
}

// Credentials must never reach the logs
impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("company_id", &self.company_id)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_deserializes_credentials_flat() {
        let json = r#"{"companyId": "hapoalim", "userCode": "abc", "password": "secret"}"#;
        let account: AccountConfig = serde_json::from_str(json).unwrap();
        assert_eq!(account.company_id.as_str(), "hapoalim");
        assert_eq!(account.credentials.len(), 2);
        assert_eq!(account.credentials["userCode"], "abc");
    }

    #[test]
    fn test_debug_redacts_credential_values() {
        let account = AccountConfig::new("max").with_credential("password", "hunter2");
        let debug = format!("{:?}", account);
        assert!(debug.contains("password"));
        assert!(!debug.contains("hunter2"));
    }
}
