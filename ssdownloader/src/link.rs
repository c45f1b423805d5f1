//! Share link parsing.
//!
//! A SendSafely share link carries the package code as a query parameter
//! and the client-held key code in the fragment:
//!
//! ```text
//! https://sendsafely.example.com/receive/?thread=T&packageCode=PKG#keyCode=KEY
//! ```
//!
//! Links pasted out of Gmail are often wrapped in a Google redirect whose
//! `q` parameter holds the escaped real link. Terminals on macOS also
//! backslash-escape the query characters on paste; both are undone here.

use thiserror::Error;
use url::Url;

/// Prefix of the redirect wrapper Gmail puts around outbound links.
const GOOGLE_WRAPPER_PREFIX: &str = "https://www.google.com/url";

/// Fragment prefix holding the key code, matched case-insensitively.
const KEY_CODE_PREFIX: &str = "keycode=";

/// Query parameter holding the package code, matched case-insensitively.
const PACKAGE_CODE_PARAM: &str = "packagecode";

/// Result type for link parsing.
pub type LinkResult<T> = Result<T, LinkError>;

/// Errors produced while parsing a share link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The Google wrapper had no `q` parameter.
    #[error("Google wrapped url '{url}' is missing the q= query string which should contain the sendsafely url")]
    QIsMissing { url: String },

    /// No `packageCode` query parameter.
    #[error("expected to have packageCode in url '{url}' but it is not present")]
    PackageCodeIsMissing { url: String },

    /// The fragment does not start with `keyCode=`.
    #[error("expected to have fragment keyCode= in url '{url}' but it is not present, the fragment detected is '{fragment}'")]
    KeyCodeIsMissing { url: String, fragment: String },

    /// The input is not a valid absolute URL.
    #[error("unable to parse url '{url}': {source}")]
    UrlParse {
        url: String,
        #[source]
        source: UrlParseSource,
    },
}

/// Underlying cause of a [`LinkError::UrlParse`].
#[derive(Debug, Error)]
pub enum UrlParseSource {
    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error("escaped q parameter is not valid UTF-8: {0}")]
    Escape(#[from] std::string::FromUtf8Error),
}

/// The two secrets a share link carries.
///
/// `Debug` redacts the key code so the value never reaches a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkParts {
    pub package_code: String,
    pub key_code: String,
}

impl std::fmt::Debug for LinkParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkParts")
            .field("package_code", &self.package_code)
            .field("key_code", &"<redacted>")
            .finish()
    }
}

/// Split a share link into its package code and key code.
pub fn parse_link(input: &str) -> LinkResult<LinkParts> {
    let link = if input.starts_with(GOOGLE_WRAPPER_PREFIX) {
        unwrap_google_link(input)?
    } else {
        input.to_string()
    };

    let url = Url::parse(&link).map_err(|e| LinkError::UrlParse {
        url: link.clone(),
        source: e.into(),
    })?;

    let package_code = url
        .query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case(PACKAGE_CODE_PARAM))
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LinkError::PackageCodeIsMissing { url: link.clone() })?;

    let fragment = url.fragment().unwrap_or_default();
    let key_code = match fragment.get(..KEY_CODE_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(KEY_CODE_PREFIX) => {
            fragment[KEY_CODE_PREFIX.len()..].to_string()
        }
        _ => {
            return Err(LinkError::KeyCodeIsMissing {
                url: link.clone(),
                fragment: fragment.to_string(),
            })
        }
    };

    Ok(LinkParts {
        package_code,
        key_code,
    })
}

/// Recover the real link from a Google redirect wrapper.
fn unwrap_google_link(input: &str) -> LinkResult<String> {
    let unescaped = input.replace('\\', "");
    let wrapper = Url::parse(&unescaped).map_err(|e| LinkError::UrlParse {
        url: unescaped.clone(),
        source: e.into(),
    })?;

    let q = wrapper
        .query_pairs()
        .find(|(key, _)| key == "q")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| LinkError::QIsMissing {
            url: unescaped.clone(),
        })?;

    // query_pairs already decoded once; the wrapper may escape twice
    urlencoding::decode(&q)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| LinkError::UrlParse {
            url: unescaped,
            source: e.into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECT: &str =
        "https://sendsafely.tester.com/receive/?thread=MYTHREAD&packageCode=MYPKGCODE#keyCode=MYKEYCODE";

    #[test]
    fn test_parse_direct_link() {
        let parts = parse_link(DIRECT).unwrap();
        assert_eq!(parts.package_code, "MYPKGCODE");
        assert_eq!(parts.key_code, "MYKEYCODE");
    }

    #[test]
    fn test_parse_lower_case_keys() {
        let parts = parse_link(
            "https://sendsafely.tester.com/receive/?thread=MYTHREAD&packagecode=MYPKGCODE#keycode=MYKEYCODE",
        )
        .unwrap();
        assert_eq!(parts, parse_link(DIRECT).unwrap());
    }

    #[test]
    fn test_parse_simple_values() {
        let parts =
            parse_link("https://sendsafely.example.com/receive/?packageCode=ABC#keyCode=XYZ").unwrap();
        assert_eq!(parts.package_code, "ABC");
        assert_eq!(parts.key_code, "XYZ");
    }

    #[test]
    fn test_parse_google_wrapped_link() {
        let wrapped = "https://www.google.com/url?q=https%3A%2F%2Fsendsafely.tester.com%2Freceive%2F%3Fthread%3DMYTHREAD%26packageCode%3DMYPKGCODE%23keyCode%3DMYKEYCODE&sa=D&ust=11111111&usg=JJJJJJJJJ";
        assert_eq!(parse_link(wrapped).unwrap(), parse_link(DIRECT).unwrap());
    }

    #[test]
    fn test_parse_google_wrapped_link_pasted_in_terminal() {
        let wrapped = "https://www.google.com/url\\?q\\=https%3A%2F%2Fsendsafely.tester.com%2Freceive%2F%3Fthread%3DMYTHREAD%26packageCode%3DMYPKGCODE%23keyCode%3DMYKEYCODE\\&sa\\=D\\&ust\\=11111111\\&usg\\=JJJJJJJJJ";
        assert_eq!(parse_link(wrapped).unwrap(), parse_link(DIRECT).unwrap());
    }

    #[test]
    fn test_google_wrapped_link_missing_q() {
        let wrapped = "https://www.google.com/url?wrong=https%3A%2F%2Fsendsafely.tester.com%2Freceive%2F%3FpackageCode%3DMYPKGCODE%23keyCode%3DMYKEYCODE&sa=D";
        let err = parse_link(wrapped).unwrap_err();
        assert!(matches!(err, LinkError::QIsMissing { .. }));
        assert!(err.to_string().contains("q="));
    }

    #[test]
    fn test_key_code_missing() {
        let url = "https://sendsafely.tester.com/receive/?thread=MYTHREAD&packageCode=MYPKGCODE";
        let err = parse_link(url).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "expected to have fragment keyCode= in url '{}' but it is not present, the fragment detected is ''",
                url
            )
        );
    }

    #[test]
    fn test_key_code_wrong_fragment() {
        let url = "https://sendsafely.tester.com/receive/?packageCode=MYPKGCODE#other=1";
        match parse_link(url).unwrap_err() {
            LinkError::KeyCodeIsMissing { fragment, .. } => assert_eq!(fragment, "other=1"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_package_code_missing() {
        let url = "https://sendsafely.tester.com/receive/?thread=MYTHREAD#keyCode=MYKEYCODE";
        let err = parse_link(url).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("expected to have packageCode in url '{}' but it is not present", url)
        );
    }

    #[test]
    fn test_invalid_url() {
        let err = parse_link("sendsafely.tester.com/receive/?packageCode=A#keyCode=B").unwrap_err();
        assert!(matches!(err, LinkError::UrlParse { .. }));
    }

    #[test]
    fn test_debug_redacts_key_code() {
        let parts = parse_link(DIRECT).unwrap();
        let debug = format!("{parts:?}");
        assert!(debug.contains("MYPKGCODE"));
        assert!(!debug.contains("MYKEYCODE"));
    }
}
