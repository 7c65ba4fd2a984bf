/// Markers the legacy server embeds in alerts and response bodies when the
/// session is gone. `Login.aspx` covers redirect-to-login HTML; `parsererror`
/// covers the client-side parse failure caused by receiving a login page
/// where JSON was expected.
const DEFAULT_MARKERS: [&str; 5] = [
    "FAIL:登陆信息已过期",
    "没有用户状态",
    "Login.aspx",
    "parsererror",
    "用户已过期",
];

/// Phrase the server renders into the page body when it has no user state.
const DEFAULT_DOM_PHRASE: &str = "没有用户状态";

/// Structural marker: a reference to the login page in the markup.
const DEFAULT_LOGIN_MARKER: &str = "Login.aspx";

/// The fixed set of substrings that identify an expired session in server
/// output, plus the pair of markers the DOM detector requires to co-occur.
#[derive(Debug, Clone)]
pub struct ExpirySignatures {
    markers: Vec<String>,
    dom_phrase: String,
    login_marker: String,
}

impl Default for ExpirySignatures {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS)
    }
}

impl ExpirySignatures {
    /// Build a signature set from custom markers, keeping the default DOM
    /// detector pair.
    #[must_use]
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
            dom_phrase: DEFAULT_DOM_PHRASE.into(),
            login_marker: DEFAULT_LOGIN_MARKER.into(),
        }
    }

    /// True if `text` contains any expiry marker. Empty text never matches.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        self.markers.iter().any(|marker| text.contains(marker.as_str()))
    }

    /// The rendered-text phrase the DOM detector looks for.
    #[must_use]
    pub fn dom_phrase(&self) -> &str {
        &self.dom_phrase
    }

    /// The structural login-page marker the DOM detector requires alongside
    /// the phrase.
    #[must_use]
    pub fn login_marker(&self) -> &str {
        &self.login_marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_markers_match() {
        let sigs = ExpirySignatures::default();
        assert!(sigs.matches("FAIL:登陆信息已过期"));
        assert!(sigs.matches("<html>…redirecting to Login.aspx…</html>"));
        assert!(sigs.matches("jQuery error: parsererror"));
        assert!(sigs.matches("当前没有用户状态，请重新登录"));
    }

    #[test]
    fn ordinary_text_does_not_match() {
        let sigs = ExpirySignatures::default();
        assert!(!sigs.matches("{\"results\":{\"result\":\"OK\"}}"));
        assert!(!sigs.matches("login required soon"));
    }

    #[test]
    fn empty_text_never_matches() {
        assert!(!ExpirySignatures::default().matches(""));
    }

    #[test]
    fn custom_markers_replace_defaults() {
        let sigs = ExpirySignatures::new(["SESSION_GONE"]);
        assert!(sigs.matches("error: SESSION_GONE"));
        assert!(!sigs.matches("Login.aspx"));
    }
}
