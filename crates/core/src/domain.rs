//! Registrable-domain extraction. All learned state (patterns, failures,
//! anti-patterns, discovery cache) partitions on this key.

use url::Url;

/// Registrable origin per the public-suffix rule: `a.b.example.co.uk` and
/// `example.co.uk` both map to `example.co.uk`. IP hosts and unlisted
/// suffixes fall back to the raw host, lowercased.
pub fn registrable_domain(url: &Url) -> String {
    let host = match url.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return "unknown".to_string(),
    };
    match psl::domain_str(&host) {
        Some(d) => d.to_string(),
        None => host,
    }
}

/// Same rule applied to a bare host string.
pub fn registrable_domain_of_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    psl::domain_str(&host).map(str::to_string).unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomains_collapse() {
        let url = Url::parse("https://api.news.example.com/v1/items").unwrap();
        assert_eq!(registrable_domain(&url), "example.com");
    }

    #[test]
    fn multi_label_suffix() {
        let url = Url::parse("https://shop.example.co.uk/").unwrap();
        assert_eq!(registrable_domain(&url), "example.co.uk");
    }

    #[test]
    fn ip_hosts_pass_through() {
        let url = Url::parse("http://127.0.0.1:8080/x").unwrap();
        assert_eq!(registrable_domain(&url), "127.0.0.1");
    }
}
