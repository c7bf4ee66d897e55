//! Origin gating for cross-origin config requests.

/// Lowercased host of `url` with a leading `www.` removed.
pub fn normalize_host(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(match host.strip_prefix("www.") {
        Some(bare) => bare.to_string(),
        None => host,
    })
}

/// True when the request origin names the same site as the company's
/// registered website. A missing or unparsable side never matches.
pub fn origin_allowed(origin: Option<&str>, website_url: Option<&str>) -> bool {
    match (origin.and_then(normalize_host), website_url.and_then(normalize_host)) {
        (Some(origin), Some(site)) => origin == site,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn www_prefix_and_case_are_ignored() {
        assert!(origin_allowed(
            Some("https://WWW.Acme.com"),
            Some("https://acme.com/careers/")
        ));
        assert!(origin_allowed(
            Some("http://acme.com:8080"),
            Some("https://www.acme.com")
        ));
    }

    #[test]
    fn other_hosts_are_rejected() {
        assert!(!origin_allowed(
            Some("https://careers.acme.com"),
            Some("https://acme.com")
        ));
        assert!(!origin_allowed(Some("https://evil.example"), Some("https://acme.com")));
    }

    #[test]
    fn missing_sides_never_match() {
        assert!(!origin_allowed(None, Some("https://acme.com")));
        assert!(!origin_allowed(Some("https://acme.com"), None));
        assert!(!origin_allowed(None, None));
        assert!(!origin_allowed(Some("null"), Some("https://acme.com")));
    }

    #[test]
    fn only_the_first_www_label_is_stripped() {
        assert_eq!(normalize_host("https://www.www.acme.com").as_deref(), Some("www.acme.com"));
    }
}
