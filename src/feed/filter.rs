use crate::models::{Content, ContentKind, FilterRule, NewFilterRule, RuleKind};

/// Outcome of evaluating one content item against the enabled rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub passed: bool,
    pub reason: Option<String>,
}

impl FilterOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    fn reject(reason: String) -> Self {
        Self {
            passed: false,
            reason: Some(reason),
        }
    }
}

/// A stored rule parsed into its typed form. Parsing happens once at filter
/// construction; a rule whose value does not fit its kind's grammar (e.g. a
/// non-numeric word-count threshold) is dropped as not applicable.
#[derive(Debug, Clone)]
enum ParsedRule {
    /// Lowercased keywords matched as substrings of `title + " " + excerpt`.
    KeywordBlacklist(Vec<String>),
    MinWordCount(u32),
    /// Union of allowed kinds across all enabled rules of this kind.
    ContentTypeAllow(Vec<ContentKind>),
    /// Lowercased author display names, exact match only.
    AuthorBlacklist(Vec<String>),
}

impl ParsedRule {
    fn parse(rule: &FilterRule) -> Option<Self> {
        match rule.kind {
            RuleKind::KeywordBlacklist => {
                Some(ParsedRule::KeywordBlacklist(split_lowered(&rule.value)))
            }
            RuleKind::MinWordCount => rule
                .value
                .trim()
                .parse::<u32>()
                .ok()
                .map(ParsedRule::MinWordCount),
            RuleKind::ContentTypeAllow => Some(ParsedRule::ContentTypeAllow(
                rule.value
                    .split(',')
                    .filter_map(|s| ContentKind::parse(s.trim()))
                    .collect(),
            )),
            RuleKind::AuthorBlacklist => {
                Some(ParsedRule::AuthorBlacklist(split_lowered(&rule.value)))
            }
        }
    }

    /// Category priority; evaluation short-circuits on the first failing
    /// category in this order.
    fn priority(&self) -> u8 {
        match self {
            ParsedRule::KeywordBlacklist(_) => 0,
            ParsedRule::MinWordCount(_) => 1,
            ParsedRule::ContentTypeAllow(_) => 2,
            ParsedRule::AuthorBlacklist(_) => 3,
        }
    }

    /// `Some(reason)` rejects the content.
    fn evaluate(&self, content: &Content) -> Option<String> {
        match self {
            ParsedRule::KeywordBlacklist(keywords) => {
                let haystack =
                    format!("{} {}", content.title, content.excerpt).to_lowercase();
                keywords
                    .iter()
                    .find(|kw| haystack.contains(kw.as_str()))
                    .map(|kw| format!("blocked keyword: {kw}"))
            }
            ParsedRule::MinWordCount(min) => (content.word_count < *min).then(|| {
                format!("word count {} below minimum {}", content.word_count, min)
            }),
            ParsedRule::ContentTypeAllow(allowed) => (!allowed.contains(&content.kind))
                .then(|| format!("content kind not allowed: {}", content.kind.as_str())),
            ParsedRule::AuthorBlacklist(authors) => {
                let name = content.author_name.to_lowercase();
                authors
                    .contains(&name)
                    .then(|| format!("author blacklisted: {}", content.author_name))
            }
        }
    }
}

fn split_lowered(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Stateless rule engine deciding which content enters the feed.
///
/// Rules are evaluated per category in a fixed priority order (keyword,
/// word count, type allow-list, author), short-circuiting on the first
/// failure. A category with no enabled rules trivially passes; the type
/// allow-list is opt-in and its allow-set is the union of all enabled
/// rules of that kind.
pub struct ContentFilter {
    rules: Vec<ParsedRule>,
}

impl ContentFilter {
    pub fn new(rules: &[FilterRule]) -> Self {
        let mut allowed_kinds: Vec<ContentKind> = Vec::new();
        let mut parsed: Vec<ParsedRule> = Vec::new();

        for rule in rules.iter().filter(|r| r.enabled) {
            match ParsedRule::parse(rule) {
                Some(ParsedRule::ContentTypeAllow(kinds)) => {
                    for kind in kinds {
                        if !allowed_kinds.contains(&kind) {
                            allowed_kinds.push(kind);
                        }
                    }
                }
                Some(parsed_rule) => parsed.push(parsed_rule),
                None => {
                    tracing::debug!("Ignoring unparsable {} rule: {}", rule.kind.as_str(), rule.value);
                }
            }
        }

        // The allow-list is enforced only when at least one such rule is
        // enabled, even if none of its values parsed to a known kind.
        if rules
            .iter()
            .any(|r| r.enabled && r.kind == RuleKind::ContentTypeAllow)
        {
            parsed.push(ParsedRule::ContentTypeAllow(allowed_kinds));
        }

        parsed.sort_by_key(ParsedRule::priority);
        Self { rules: parsed }
    }

    pub fn evaluate(&self, content: &Content) -> FilterOutcome {
        for rule in &self.rules {
            if let Some(reason) = rule.evaluate(content) {
                return FilterOutcome::reject(reason);
            }
        }
        FilterOutcome::pass()
    }

    /// Partition a collection into passed contents and (content, reason)
    /// rejections.
    pub fn filter_batch(&self, contents: &[Content]) -> (Vec<Content>, Vec<(Content, String)>) {
        let mut passed = Vec::new();
        let mut rejected = Vec::new();
        for content in contents {
            match self.evaluate(content) {
                FilterOutcome { passed: true, .. } => passed.push(content.clone()),
                FilterOutcome { reason, .. } => {
                    rejected.push((content.clone(), reason.unwrap_or_default()))
                }
            }
        }
        (passed, rejected)
    }
}

/// Rule set seeded after the first followee sync when no rules exist yet.
pub fn default_rules() -> Vec<NewFilterRule> {
    vec![
        NewFilterRule {
            kind: RuleKind::KeywordBlacklist,
            value: "广告,推广,优惠券,点击领取,限时特价,带货,种草,测评,开箱".to_string(),
            enabled: true,
        },
        NewFilterRule {
            kind: RuleKind::MinWordCount,
            value: "100".to_string(),
            enabled: true,
        },
        // Opt-in: shortform posts are excluded once this rule is enabled.
        NewFilterRule {
            kind: RuleKind::ContentTypeAllow,
            value: "article,answer".to_string(),
            enabled: false,
        },
    ]
}
