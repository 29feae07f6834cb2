//! Bot-protection page heuristics. Two classes matter to the orchestrator:
//! auto-resolving JS challenges (Cloudflare-style waiting screens, handled by
//! polling) and interactive challenges (CAPTCHAs, routed to a caller
//! callback).

/// Auto-resolving waiting screen: short page telling the visitor to hold on.
pub fn is_waiting_screen(body_text: &str, html_size: usize) -> bool {
    let body_lower = body_text.to_lowercase();

    if html_size < 500
        && (body_lower.contains("wait")
            || body_lower.contains("loading")
            || body_lower.contains("redirect"))
    {
        return true;
    }

    let waiting_keywords = [
        "please wait",
        "just a moment",
        "checking your browser",
        "verifying your browser",
        "ddos protection",
        "cloudflare",
        "enable javascript and cookies",
        "browser check",
        "redirecting you",
    ];
    if waiting_keywords.iter().any(|k| body_lower.contains(k)) {
        return true;
    }

    html_size < 1000 && body_lower.contains("redirect")
}

/// Interactive challenge: something a human (or external callback) has to
/// answer. Distinct from waiting screens, which resolve on their own.
pub fn is_interactive_challenge(html: &str) -> bool {
    let html_lower = html.to_lowercase();
    let markers = [
        "g-recaptcha",
        "grecaptcha",
        "h-captcha",
        "hcaptcha",
        "cf-turnstile",
        "turnstile",
        "captcha.png",
        "captcha.jpg",
        "/captcha/",
        "verify you are human",
        "prove you're human",
        "select all images",
    ];
    markers.iter().any(|m| html_lower.contains(m))
}

/// How long to let an auto-resolving challenge run before retrying.
pub fn estimate_wait_secs(body_text: &str) -> u64 {
    let body_lower = body_text.to_lowercase();

    if body_lower.contains("redirecting in") || body_lower.contains("wait") {
        for i in 1..=60u64 {
            if body_lower.contains(&i.to_string()) {
                return i + 10;
            }
        }
    }
    if body_lower.contains("ddos") || body_lower.contains("cloudflare") {
        return 30;
    }
    if body_lower.contains("verifying") || body_lower.contains("checking") {
        return 60;
    }
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_screens() {
        assert!(is_waiting_screen("Please wait...", 14));
        assert!(is_waiting_screen("Checking your browser before accessing", 800));
        assert!(is_waiting_screen("Redirecting now", 300));
        assert!(!is_waiting_screen("A normal article with plenty of content", 50_000));
    }

    #[test]
    fn interactive_challenges() {
        assert!(is_interactive_challenge(r#"<div class="g-recaptcha" data-sitekey="x"></div>"#));
        assert!(is_interactive_challenge(r#"<div class="cf-turnstile"></div>"#));
        assert!(!is_interactive_challenge("<p>recap of the game</p>"));
    }

    #[test]
    fn wait_estimates() {
        assert_eq!(estimate_wait_secs("Redirecting in 5 seconds"), 15);
        assert_eq!(estimate_wait_secs("DDoS protection by example"), 30);
        assert_eq!(estimate_wait_secs("Verifying your browser"), 60);
    }
}
