//! Domain firewall - per-company allow/block rules for outgoing requests
//!
//! Rules are stored in a trie keyed by reversed hostname labels, so
//! `api.example.com` lives at `com -> example -> api`. A lookup walks the
//! query hostname's labels as deep as the trie goes; the deepest node on
//! that path holding a rule for the company wins, otherwise the nearest
//! ancestor's rule applies, otherwise the engine default.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{CompanyId, DomainRule, RuleAction};
use crate::ports::RequestFilter;

#[derive(Debug, Default)]
struct TrieNode {
    rules: HashMap<CompanyId, RuleAction>,
    children: HashMap<String, TrieNode>,
}

/// Compiled domain rules
///
/// Read-only after construction apart from the per-(hostname, company)
/// memo, which only ever grows.
#[derive(Debug)]
pub struct DomainRuleEngine {
    root: TrieNode,
    rules: Vec<DomainRule>,
    companies: HashSet<CompanyId>,
    block_by_default: bool,
    memo: RwLock<HashMap<(String, CompanyId), RuleAction>>,
}

impl DomainRuleEngine {
    /// Parse and compile rules text (see [`DomainRule::parse_all`])
    pub fn load(rules_text: &str, block_by_default: bool) -> Self {
        Self::from_rules(DomainRule::parse_all(rules_text), block_by_default)
    }

    pub fn from_rules(rules: Vec<DomainRule>, block_by_default: bool) -> Self {
        let mut engine = Self {
            root: TrieNode::default(),
            rules: Vec::with_capacity(rules.len()),
            companies: HashSet::new(),
            block_by_default,
            memo: RwLock::new(HashMap::new()),
        };
        for rule in rules {
            engine.insert(rule);
        }
        engine
    }

    fn insert(&mut self, rule: DomainRule) {
        let mut node = &mut self.root;
        for label in rule.domain.split('.').rev() {
            node = node.children.entry(label.to_string()).or_default();
        }
        node.rules.insert(rule.company_id.clone(), rule.action);
        self.companies.insert(rule.company_id.clone());
        debug!(rule = %rule, "Inserted domain rule");
        self.rules.push(rule);
    }

    /// The action for `url` when scraping `company_id`
    ///
    /// URLs without a host resolve to the default action.
    pub fn get_rule(&self, url: &str, company_id: &CompanyId) -> RuleAction {
        match Url::parse(url) {
            Ok(parsed) => self.rule_for_host(parsed.host_str().unwrap_or_default(), company_id),
            Err(_) => self.default_action(),
        }
    }

    /// The action for a bare hostname, memoized per (hostname, company)
    pub fn rule_for_host(&self, hostname: &str, company_id: &CompanyId) -> RuleAction {
        let key = (hostname.to_ascii_lowercase(), company_id.clone());
        if let Some(action) = self.memo.read().ok().and_then(|m| m.get(&key).copied()) {
            return action;
        }

        let action = self.lookup(&key.0, company_id).unwrap_or(self.default_action());
        // A racing writer computes the same value, so last write wins harmlessly
        if let Ok(mut memo) = self.memo.write() {
            memo.insert(key, action);
        }
        action
    }

    fn lookup(&self, hostname: &str, company_id: &CompanyId) -> Option<RuleAction> {
        let mut node = &self.root;
        let mut found = node.rules.get(company_id).copied();
        for label in hostname.trim_end_matches('.').split('.').rev() {
            match node.children.get(label) {
                Some(child) => {
                    node = child;
                    if let Some(action) = node.rules.get(company_id) {
                        found = Some(*action);
                    }
                }
                None => break,
            }
        }
        found
    }

    /// Whether any rule anywhere in the trie targets `company_id`
    pub fn has_any_rule(&self, company_id: &CompanyId) -> bool {
        self.companies.contains(company_id)
    }

    pub fn default_action(&self) -> RuleAction {
        if self.block_by_default {
            RuleAction::Block
        } else {
            RuleAction::Allow
        }
    }

    /// Rules in insertion order
    pub fn rules(&self) -> &[DomainRule] {
        &self.rules
    }
}

/// Domains a single company touched during a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompanyDomains {
    pub pages: BTreeSet<String>,
    pub allowed: BTreeSet<String>,
    pub blocked: BTreeSet<String>,
}

/// Collects which domains each company's scrape requested
#[derive(Debug, Default)]
pub struct DomainTracker {
    by_company: Mutex<BTreeMap<CompanyId, CompanyDomains>>,
}

impl DomainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, company_id: &CompanyId, update: impl FnOnce(&mut CompanyDomains)) {
        if let Ok(mut map) = self.by_company.lock() {
            update(map.entry(company_id.clone()).or_default());
        }
    }

    /// Snapshot of everything recorded so far
    pub fn report(&self) -> BTreeMap<CompanyId, CompanyDomains> {
        self.by_company
            .lock()
            .map(|map| map.clone())
            .unwrap_or_default()
    }
}

/// [`RequestFilter`] that enforces the rule engine for one company
pub struct DomainGuard {
    engine: Arc<DomainRuleEngine>,
    company_id: CompanyId,
    tracker: Option<Arc<DomainTracker>>,
    intercepts: bool,
}

impl DomainGuard {
    pub fn new(
        engine: Arc<DomainRuleEngine>,
        company_id: CompanyId,
        tracker: Option<Arc<DomainTracker>>,
    ) -> Self {
        let intercepts = engine.has_any_rule(&company_id);
        Self {
            engine,
            company_id,
            tracker,
            intercepts,
        }
    }

    pub fn company_id(&self) -> &CompanyId {
        &self.company_id
    }
}

fn is_ignored_host(hostname: &str) -> bool {
    hostname.is_empty() || hostname == "about:blank" || hostname == "invalid"
}

impl RequestFilter for DomainGuard {
    fn intercepts(&self) -> bool {
        self.intercepts
    }

    fn is_blocked(&self, method: &str, url: &str) -> bool {
        let hostname = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let request_key = format!("{} {}", method, hostname);

        let blocked = self.intercepts
            && !is_ignored_host(&hostname)
            && self.engine.rule_for_host(&hostname, &self.company_id) == RuleAction::Block;

        if blocked {
            warn!(company = %self.company_id, request = %request_key, "Blocking request");
        }
        if let Some(tracker) = &self.tracker {
            tracker.record(&self.company_id, |domains| {
                if blocked {
                    domains.blocked.insert(request_key);
                } else {
                    domains.allowed.insert(request_key);
                }
            });
        }
        blocked
    }

    fn page_navigated(&self, url: &str) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        if let Ok(parsed) = Url::parse(url) {
            let page = format!("{}{}", parsed.host_str().unwrap_or_default(), parsed.path());
            tracker.record(&self.company_id, |domains| {
                domains.pages.insert(page);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(id: &str) -> CompanyId {
        CompanyId::new(id)
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let engine = DomainRuleEngine::load("x ALLOW a.b.c\nx BLOCK b.c", false);
        assert_eq!(engine.get_rule("https://a.b.c", &company("x")), RuleAction::Allow);
        assert_eq!(engine.get_rule("https://other.b.c", &company("x")), RuleAction::Block);
        assert_eq!(engine.get_rule("https://b.c/path", &company("x")), RuleAction::Block);
    }

    #[test]
    fn test_ancestor_rule_applies_below_unruled_child() {
        // d.a.b.c has a node (from another company's rule) but no rule for x
        let engine = DomainRuleEngine::load("x BLOCK b.c\ny ALLOW d.a.b.c", false);
        assert_eq!(engine.get_rule("https://d.a.b.c", &company("x")), RuleAction::Block);
        assert_eq!(engine.get_rule("https://d.a.b.c", &company("y")), RuleAction::Allow);
        assert_eq!(engine.get_rule("https://a.b.c", &company("y")), RuleAction::Allow);
    }

    #[test]
    fn test_default_action() {
        let allow = DomainRuleEngine::load("x BLOCK tracker.io", false);
        assert_eq!(allow.get_rule("https://bank.co.il", &company("x")), RuleAction::Allow);
        assert_eq!(allow.get_rule("https://tracker.io", &company("other")), RuleAction::Allow);

        let block = DomainRuleEngine::load("x ALLOW bank.co.il", true);
        assert_eq!(block.get_rule("https://evil.com", &company("x")), RuleAction::Block);
        assert_eq!(block.get_rule("https://www.bank.co.il", &company("x")), RuleAction::Allow);
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let engine = DomainRuleEngine::load("x ALLOW a.b.c\nx BLOCK b.c", false);
        let first = engine.get_rule("https://z.a.b.c", &company("x"));
        for _ in 0..5 {
            assert_eq!(engine.get_rule("https://z.a.b.c", &company("x")), first);
        }
        assert_eq!(first, RuleAction::Allow);
    }

    #[test]
    fn test_has_any_rule() {
        let empty = DomainRuleEngine::load("", false);
        assert!(!empty.has_any_rule(&company("x")));

        let engine = DomainRuleEngine::load("x BLOCK deep.nested.example.com", false);
        assert!(engine.has_any_rule(&company("x")));
        assert!(!engine.has_any_rule(&company("y")));
    }

    #[test]
    fn test_hostname_matching_is_case_insensitive() {
        let engine = DomainRuleEngine::load("x BLOCK Tracker.IO", false);
        assert_eq!(engine.rule_for_host("cdn.tracker.io", &company("x")), RuleAction::Block);
        assert_eq!(engine.get_rule("https://CDN.TRACKER.IO", &company("x")), RuleAction::Block);
    }

    #[test]
    fn test_guard_blocks_and_tracks() {
        let engine = Arc::new(DomainRuleEngine::load("x BLOCK tracker.io", false));
        let tracker = Arc::new(DomainTracker::new());
        let guard = DomainGuard::new(engine, company("x"), Some(tracker.clone()));

        assert!(guard.intercepts());
        assert!(guard.is_blocked("GET", "https://cdn.tracker.io/a.js"));
        assert!(!guard.is_blocked("POST", "https://bank.co.il/login"));
        assert!(!guard.is_blocked("GET", "about:blank"));
        guard.page_navigated("https://bank.co.il/home?x=1");

        let report = tracker.report();
        let domains = &report[&company("x")];
        assert!(domains.blocked.contains("GET cdn.tracker.io"));
        assert!(domains.allowed.contains("POST bank.co.il"));
        assert!(domains.pages.contains("bank.co.il/home"));
    }

    #[test]
    fn test_guard_without_rules_never_blocks() {
        let engine = Arc::new(DomainRuleEngine::load("x BLOCK tracker.io", false));
        let guard = DomainGuard::new(engine, company("y"), None);
        assert!(!guard.intercepts());
        assert!(!guard.is_blocked("GET", "https://tracker.io"));
    }

    #[test]
    fn test_block_by_default_skips_companies_without_rules() {
        let engine = Arc::new(DomainRuleEngine::load("other ALLOW x.com", true));
        let guard = DomainGuard::new(engine.clone(), company("hapoalim"), None);

        assert!(!guard.intercepts());
        assert!(!guard.is_blocked("GET", "https://login.bankhapoalim.co.il/"));

        let other = DomainGuard::new(engine, company("other"), None);
        assert!(other.intercepts());
        assert!(!other.is_blocked("GET", "https://x.com/"));
        assert!(other.is_blocked("GET", "https://login.bankhapoalim.co.il/"));
    }
}
