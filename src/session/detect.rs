use crate::signature::ExpirySignatures;

/// Text of the application's logout anchor.
const LOGOUT_LABEL: &str = "退出";

/// Href marker of a logout anchor.
const LOGIN_PAGE_HREF: &str = "Login.aspx";

/// DOM-based expiry detection, for episodes that present purely as rendered
/// HTML with no intercepted network call (e.g. direct navigation to a page
/// the server rendered as "session not found").
///
/// Both conditions must hold: the expiry phrase in the rendered text AND a
/// login-page reference in the markup. Requiring the structural marker keeps
/// the phrase appearing in unrelated help text from triggering a false
/// positive.
#[must_use]
pub fn document_expired(text: &str, markup: &str, signatures: &ExpirySignatures) -> bool {
    text.contains(signatures.dom_phrase()) && markup.contains(signatures.login_marker())
}

/// Classify an anchor as the application's logout link: it carries the
/// logout label, or its href points at the login page. Hosts wire a click on
/// one of these to the privileged cookie sweep before the navigation runs.
#[must_use]
pub fn is_logout_link(text: &str, href: &str) -> bool {
    text.contains(LOGOUT_LABEL) || href.contains(LOGIN_PAGE_HREF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_page_needs_both_markers() {
        let signatures = ExpirySignatures::default();
        let text = "错误：没有用户状态，请重新登录。";
        let markup = r#"<a href="Login.aspx">登录</a>"#;

        assert!(document_expired(text, markup, &signatures));
    }

    #[test]
    fn phrase_alone_is_not_enough() {
        let signatures = ExpirySignatures::default();
        // Help text quoting the phrase, on a page without a login reference.
        assert!(!document_expired(
            "说明：出现 没有用户状态 时请联系管理员",
            "<div>帮助</div>",
            &signatures
        ));
    }

    #[test]
    fn login_reference_alone_is_not_enough() {
        let signatures = ExpirySignatures::default();
        assert!(!document_expired(
            "欢迎使用查询系统",
            r#"<a href="Login.aspx">退出</a>"#,
            &signatures
        ));
    }

    #[test]
    fn logout_links_by_label_or_href() {
        assert!(is_logout_link("退出", "#"));
        assert!(is_logout_link("Sign out", "Login.aspx"));
        assert!(is_logout_link("", "./Login.aspx?from=menu"));
        assert!(!is_logout_link("首页", "Index.aspx?isTest=N"));
    }
}
