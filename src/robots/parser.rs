//! Robots.txt parser implementation
//!
//! Allow/deny decisions are delegated to the robotstxt crate, which applies
//! longest-match precedence with ties going to Allow. The group walk below
//! extracts the directives robotstxt does not expose: the selected rule list,
//! `Crawl-delay` and `Sitemap`.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// A single Allow or Disallow directive from the selected group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsRule {
    pub allow: bool,
    pub path: String,
}

/// Parsed robots.txt data for one crawler user agent
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Product token the rules were selected for
    agent: String,
    allow_all: bool,
    rules: Vec<RobotsRule>,
    crawl_delay: Option<Duration>,
    sitemaps: Vec<String>,
}

#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<RobotsRule>,
    crawl_delay: Option<Duration>,
}

impl ParsedRobots {
    /// Parses robots.txt content for the given product token
    ///
    /// Directives come from the groups naming `agent` (case-insensitive);
    /// if none do, from the `*` groups.
    pub fn parse(content: &str, agent: &str) -> Self {
        let (groups, sitemaps) = split_groups(content);
        let agent_lower = agent.to_lowercase();

        let specific: Vec<&Group> = groups
            .iter()
            .filter(|g| g.agents.iter().any(|ua| *ua == agent_lower))
            .collect();
        let selected = if specific.is_empty() {
            groups
                .iter()
                .filter(|g| g.agents.iter().any(|ua| ua == "*"))
                .collect()
        } else {
            specific
        };

        let rules = selected
            .iter()
            .flat_map(|g| g.rules.iter().cloned())
            .collect();
        let crawl_delay = selected.iter().find_map(|g| g.crawl_delay);

        Self {
            content: content.to_string(),
            agent: agent.to_string(),
            allow_all: false,
            rules,
            crawl_delay,
            sitemaps,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// This is used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            agent: String::new(),
            allow_all: true,
            rules: Vec::new(),
            crawl_delay: None,
            sitemaps: Vec::new(),
        }
    }

    /// Checks if a full URL is allowed for the parsed agent
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, &self.agent, url)
    }

    pub fn is_allow_all(&self) -> bool {
        self.allow_all
    }

    pub fn rules(&self) -> &[RobotsRule] {
        &self.rules
    }

    /// Crawl delay of the selected group, if any and non-zero
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }

    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Splits robots.txt into user-agent groups plus the global sitemap list
///
/// Consecutive `User-agent` lines share a group; the first rule line closes
/// the agent list so a following `User-agent` starts a new group.
fn split_groups(content: &str) -> (Vec<Group>, Vec<String>) {
    let mut groups: Vec<Group> = Vec::new();
    let mut sitemaps = Vec::new();
    let mut current: Option<Group> = None;
    let mut collecting_agents = false;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if !collecting_agents {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    current = Some(Group::default());
                    collecting_agents = true;
                }
                if let Some(group) = current.as_mut() {
                    group.agents.push(value.to_lowercase());
                }
            }
            "allow" | "disallow" => {
                collecting_agents = false;
                // An empty Disallow allows everything; an empty Allow is a no-op
                if let (Some(group), false) = (current.as_mut(), value.is_empty()) {
                    group.rules.push(RobotsRule {
                        allow: key == "allow",
                        path: value.to_string(),
                    });
                }
            }
            "crawl-delay" => {
                collecting_agents = false;
                if let (Some(group), Ok(secs)) = (current.as_mut(), value.parse::<f64>()) {
                    if secs.is_finite() && secs > 0.0 && group.crawl_delay.is_none() {
                        group.crawl_delay = Some(Duration::from_secs_f64(secs));
                    }
                }
            }
            "sitemap" => {
                if !value.is_empty() {
                    sitemaps.push(value.to_string());
                }
            }
            _ => {
                collecting_agents = false;
            }
        }
    }

    if let Some(group) = current {
        groups.push(group);
    }

    (groups, sitemaps)
}
