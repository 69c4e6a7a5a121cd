//! crates/memowave_core/src/callback.rs
//!
//! Token extraction for login callback URLs.
//!
//! Two strategies run in sequence: a regex scan over the raw string, which
//! tolerates URLs the parser rejects, and a structured parse of the URL
//! fragment. A value from the structured parse overrides the regex value.

use crate::domain::{AuthFailure, CallbackPayload};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Host part of every login callback URL: `<scheme>://login-callback`.
pub const LOGIN_CALLBACK_HOST: &str = "login-callback";

/// Tokens found by a single extraction strategy.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenScan {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenScan {
    /// Lays `other` on top of `self`; values present in `other` win.
    fn overridden_by(self, other: TokenScan) -> TokenScan {
        TokenScan {
            access_token: other.access_token.or(self.access_token),
            refresh_token: other.refresh_token.or(self.refresh_token),
        }
    }
}

fn access_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"access_token=([^&]+)").expect("valid access_token regex"))
}

fn refresh_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"refresh_token=([^&]+)").expect("valid refresh_token regex"))
}

/// Scans the raw string without requiring any URL structure.
pub fn scan_tokens(raw: &str) -> TokenScan {
    let capture = |re: &Regex| {
        re.captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    TokenScan {
        access_token: capture(access_token_regex()),
        refresh_token: capture(refresh_token_regex()),
    }
}

/// Parses `raw` as a URL and reads the tokens from its fragment.
/// Returns an empty scan when the string is not a URL or has no fragment.
pub fn parse_fragment_tokens(raw: &str) -> TokenScan {
    let Ok(url) = Url::parse(raw) else {
        return TokenScan::default();
    };
    let Some(fragment) = url.fragment() else {
        return TokenScan::default();
    };

    let mut scan = TokenScan::default();
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "access_token" if scan.access_token.is_none() => {
                scan.access_token = Some(value.into_owned())
            }
            "refresh_token" if scan.refresh_token.is_none() => {
                scan.refresh_token = Some(value.into_owned())
            }
            _ => {}
        }
    }
    scan
}

/// Turns a callback URL into a payload. Fails closed on a missing access token;
/// a missing refresh token becomes an empty string.
pub fn extract_tokens(raw: &str) -> Result<CallbackPayload, AuthFailure> {
    let scan = scan_tokens(raw).overridden_by(parse_fragment_tokens(raw));
    let access_token = scan
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthFailure::MissingAccessToken)?;
    Ok(CallbackPayload {
        access_token,
        refresh_token: scan.refresh_token.unwrap_or_default(),
    })
}

/// Reads the `code` query parameter of a `<scheme>://login-callback?code=...` URL.
pub fn authorization_code(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.query_pairs()
        .find_map(|(k, v)| (k == "code" && !v.is_empty()).then(|| v.into_owned()))
}

/// `memowave` -> `memowave://`.
pub fn scheme_prefix(scheme: &str) -> String {
    format!("{}://", scheme)
}

/// Wraps a bare fragment into a synthetic callback URL.
pub fn wrap_fragment(scheme: &str, fragment: &str) -> String {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    format!("{}{}#{}", scheme_prefix(scheme), LOGIN_CALLBACK_HOST, fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_fragment_yields_both_tokens() {
        let url = wrap_fragment("memowave", "access_token=A&refresh_token=R");
        assert_eq!(url, "memowave://login-callback#access_token=A&refresh_token=R");
        let payload = extract_tokens(&url).unwrap();
        assert_eq!(payload.access_token, "A");
        assert_eq!(payload.refresh_token, "R");
    }

    #[test]
    fn wrapping_tolerates_a_leading_hash() {
        assert_eq!(
            wrap_fragment("memowave", "#access_token=A"),
            "memowave://login-callback#access_token=A"
        );
    }

    #[test]
    fn fragment_value_beats_regex_decoy() {
        let url = "memowave://login-callback?access_token=DECOY#access_token=REAL&refresh_token=R";
        assert_eq!(scan_tokens(url).access_token.as_deref(), Some("DECOY"));
        let payload = extract_tokens(url).unwrap();
        assert_eq!(payload.access_token, "REAL");
        assert_eq!(payload.refresh_token, "R");
    }

    #[test]
    fn strategies_agree_on_well_formed_urls() {
        let url = "memowave://login-callback#access_token=eyJ.abc.def&expires_in=3600&refresh_token=rt";
        assert_eq!(
            scan_tokens(url).access_token,
            parse_fragment_tokens(url).access_token
        );
    }

    #[test]
    fn regex_rescues_unparseable_input() {
        let raw = "not a url at all access_token=A&refresh_token=R";
        assert_eq!(parse_fragment_tokens(raw), TokenScan::default());
        let payload = extract_tokens(raw).unwrap();
        assert_eq!(payload.access_token, "A");
        assert_eq!(payload.refresh_token, "R");
    }

    #[test]
    fn missing_access_token_fails_closed() {
        let err = extract_tokens("memowave://login-callback#refresh_token=R").unwrap_err();
        assert_eq!(err, AuthFailure::MissingAccessToken);
        assert_eq!(
            extract_tokens("memowave://login-callback#access_token=").unwrap_err(),
            AuthFailure::MissingAccessToken
        );
    }

    #[test]
    fn missing_refresh_token_becomes_empty() {
        let payload = extract_tokens("memowave://login-callback#access_token=A").unwrap();
        assert_eq!(payload.refresh_token, "");
    }

    #[test]
    fn fragment_values_are_percent_decoded() {
        let payload =
            extract_tokens("memowave://login-callback#access_token=a%2Bb&refresh_token=r").unwrap();
        assert_eq!(payload.access_token, "a+b");
    }

    #[test]
    fn code_is_read_from_query() {
        assert_eq!(
            authorization_code("memowave://login-callback?code=xyz").as_deref(),
            Some("xyz")
        );
        assert_eq!(authorization_code("memowave://login-callback#access_token=A"), None);
    }
}
