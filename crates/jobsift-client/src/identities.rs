use jobsift_core::traits::IdentityProfile;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Desktop browser header profiles used for identity rotation.
pub fn default_identities() -> Vec<IdentityProfile> {
    vec![
        browser_profile(
            "chrome-windows",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            "en-US,en;q=0.9",
        ),
        browser_profile(
            "firefox-linux",
            "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
            "en-US,en;q=0.5",
        ),
        browser_profile(
            "safari-macos",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
            "en-GB,en;q=0.9",
        ),
        browser_profile(
            "edge-windows",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
            "en-US,en;q=0.8",
        ),
    ]
}

fn browser_profile(name: &str, user_agent: &str, language: &str) -> IdentityProfile {
    IdentityProfile::new(name, user_agent)
        .with_header("Accept", ACCEPT_HTML)
        .with_header("Accept-Language", language)
        .with_header("Upgrade-Insecure-Requests", "1")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn profiles_are_distinct() {
        let profiles = default_identities();
        let names: HashSet<_> = profiles.iter().map(|p| p.name.as_str()).collect();
        let agents: HashSet<_> = profiles.iter().map(|p| p.user_agent.as_str()).collect();
        assert_eq!(names.len(), profiles.len());
        assert_eq!(agents.len(), profiles.len());
        assert!(profiles.iter().all(|p| p.headers.iter().any(|(k, _)| k == "Accept")));
    }
}
