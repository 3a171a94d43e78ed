//! Minimal robots.txt parsing and evaluation.
//!
//! Supports user-agent groups with `Allow`/`Disallow` prefix rules and the
//! `*` wildcard agent. Rule matching is longest-prefix-wins with `Allow`
//! winning ties, per the original REP convention. Crawl-delay and sitemap
//! lines are ignored.

/// A parsed robots.txt document.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    prefix: String,
}

impl RobotsTxt {
    /// Parses robots.txt text. Never fails; unparseable lines are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut saw_rule = false;

        for raw_line in text.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if saw_rule {
                        if !current.agents.is_empty() {
                            groups.push(std::mem::take(&mut current));
                        }
                        saw_rule = false;
                    }
                    current.agents.push(value.to_ascii_lowercase());
                }
                "disallow" | "allow" => {
                    if current.agents.is_empty() {
                        continue;
                    }
                    saw_rule = true;
                    // An empty Disallow means "allow everything": no rule.
                    if !value.is_empty() {
                        current.rules.push(Rule {
                            allow: key == "allow",
                            prefix: value.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        Self { groups }
    }

    /// Whether `path` may be fetched by `user_agent`.
    ///
    /// The most specific matching group applies: the longest agent token
    /// contained in the user agent, with `*` as fallback. Within the
    /// group, the longest matching prefix rule decides; `Allow` wins
    /// length ties; no matching rule means allowed.
    #[must_use]
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        let mut verdict = true;
        let mut best_len = 0;
        for rule in &group.rules {
            if path.starts_with(rule.prefix.as_str()) {
                let len = rule.prefix.len();
                if len > best_len || (len == best_len && rule.allow) {
                    best_len = len;
                    verdict = rule.allow;
                }
            }
        }
        verdict
    }

    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let ua = user_agent.to_ascii_lowercase();
        let mut best: Option<(&Group, usize)> = None;
        for group in &self.groups {
            for agent in &group.agents {
                let specificity = if agent == "*" {
                    Some(0)
                } else if ua.contains(agent.as_str()) {
                    Some(agent.len())
                } else {
                    None
                };
                if let Some(score) = specificity
                    && best.is_none_or(|(_, s)| score > s)
                {
                    best = Some((group, score));
                }
            }
        }
        best.map(|(group, _)| group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# robots for example.com
User-agent: *
Disallow: /private/
Allow: /private/press/

User-agent: badbot
Disallow: /
";

    #[test]
    fn test_wildcard_group_rules() {
        let robots = RobotsTxt::parse(SAMPLE);
        assert!(robots.is_allowed("groundwork/0.4", "/public/page"));
        assert!(!robots.is_allowed("groundwork/0.4", "/private/data"));
        assert!(robots.is_allowed("groundwork/0.4", "/private/press/release"));
    }

    #[test]
    fn test_specific_agent_beats_wildcard() {
        let robots = RobotsTxt::parse(SAMPLE);
        assert!(!robots.is_allowed("BadBot/2.0", "/anything"));
        assert!(robots.is_allowed("goodbot", "/anything"));
    }

    #[test]
    fn test_empty_disallow_allows_everything() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow:\n");
        assert!(robots.is_allowed("any", "/"));
        assert!(robots.is_allowed("any", "/deep/path"));
    }

    #[test]
    fn test_empty_or_garbage_input_allows() {
        assert!(RobotsTxt::parse("").is_allowed("any", "/x"));
        assert!(RobotsTxt::parse("not a robots file at all").is_allowed("any", "/x"));
    }

    #[test]
    fn test_multiple_agents_share_a_group() {
        let robots = RobotsTxt::parse("User-agent: a\nUser-agent: b\nDisallow: /x\n");
        assert!(!robots.is_allowed("a", "/x/1"));
        assert!(!robots.is_allowed("b", "/x/1"));
        assert!(robots.is_allowed("c", "/x/1"));
    }

    #[test]
    fn test_allow_wins_length_ties() {
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /a/\nAllow: /a/\n");
        assert!(robots.is_allowed("any", "/a/page"));
    }

    #[test]
    fn test_comments_stripped() {
        let robots = RobotsTxt::parse("User-agent: * # everyone\nDisallow: /secret # hidden\n");
        assert!(!robots.is_allowed("any", "/secret/x"));
    }
}
