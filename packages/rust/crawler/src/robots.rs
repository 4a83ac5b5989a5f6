//! Minimal robots.txt gate.
//!
//! Only a full `Disallow: /` for our agent (or the wildcard agent) blocks a
//! domain; every other rule is treated as a no-op. Absence of robots.txt or
//! a fetch failure means crawling is allowed. This is a deliberate
//! simplification: partial path rules are ignored.

use reqwest::Client;
use tracing::debug;
use url::Url;

/// Outcome of the robots.txt check for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsVerdict {
    Allowed,
    FullyDisallowed,
}

/// Fetch `robots.txt` from the site root and evaluate it for `user_agent`.
pub async fn check(client: &Client, base: &Url, user_agent: &str) -> RobotsVerdict {
    let robots_url = match base.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return RobotsVerdict::Allowed,
    };

    let body = match client.get(robots_url.as_str()).send().await {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(text) => text,
            Err(_) => return RobotsVerdict::Allowed,
        },
        // Missing or unreachable robots.txt means crawling is allowed.
        _ => return RobotsVerdict::Allowed,
    };

    if is_fully_disallowed(&body, user_agent) {
        debug!(%base, "robots.txt fully disallows crawling");
        RobotsVerdict::FullyDisallowed
    } else {
        RobotsVerdict::Allowed
    }
}

/// True when a group applying to `user_agent` (or `*`) contains `Disallow: /`.
pub fn is_fully_disallowed(body: &str, user_agent: &str) -> bool {
    let agent_lower = user_agent.to_lowercase();

    let mut group_applies = false;
    let mut in_agent_lines = false;

    for line in body.lines() {
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
                // A run of user-agent lines starts a new group.
                if !in_agent_lines {
                    group_applies = false;
                    in_agent_lines = true;
                }
                let token = value.to_lowercase();
                if token == "*" || agent_lower.contains(&token) {
                    group_applies = true;
                }
            }
            "disallow" => {
                in_agent_lines = false;
                if group_applies && value == "/" {
                    return true;
                }
            }
            _ => {
                in_agent_lines = false;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "firmfacts/0.1.0 (enrichment bot)";

    #[test]
    fn wildcard_full_disallow_blocks() {
        let body = "User-agent: *\nDisallow: /\n";
        assert!(is_fully_disallowed(body, AGENT));
    }

    #[test]
    fn agent_specific_full_disallow_blocks() {
        let body = "User-agent: googlebot\nDisallow: /\n\nUser-agent: firmfacts\nDisallow: /\n";
        assert!(is_fully_disallowed(body, AGENT));
    }

    #[test]
    fn other_agent_disallow_ignored() {
        let body = "User-agent: googlebot\nDisallow: /\n";
        assert!(!is_fully_disallowed(body, AGENT));
    }

    #[test]
    fn partial_disallow_is_a_noop() {
        let body = "User-agent: *\nDisallow: /private\nDisallow: /admin/\n";
        assert!(!is_fully_disallowed(body, AGENT));
    }

    #[test]
    fn empty_disallow_allows() {
        let body = "User-agent: *\nDisallow:\n";
        assert!(!is_fully_disallowed(body, AGENT));
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let body = "# global rules\nUser-agent: * # everyone\n\nDisallow: / # block all\n";
        assert!(is_fully_disallowed(body, AGENT));
    }

    #[test]
    fn grouped_agents_share_rules() {
        let body = "User-agent: googlebot\nUser-agent: *\nDisallow: /\n";
        assert!(is_fully_disallowed(body, AGENT));
    }
}
