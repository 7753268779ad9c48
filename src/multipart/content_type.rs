//! Media type parsing and reply-body classification.

use super::{Boundary, FrameError};

/// A parsed `type/subtype; name=value` header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    params: Vec<(String, String)>,
}

impl MediaType {
    /// Parse a `Content-Type` value.
    ///
    /// The essence is lowercased; parameter names are matched
    /// case-insensitively and quoted values are unquoted.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidContentType`] when the essence is not of
    /// the form `type/subtype`.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let (essence, rest) = raw.split_once(';').unwrap_or((raw, ""));
        let essence = essence.trim().to_ascii_lowercase();
        let well_formed = essence
            .split_once('/')
            .is_some_and(|(kind, subtype)| !kind.is_empty() && !subtype.is_empty());
        if !well_formed {
            return Err(FrameError::InvalidContentType(raw.to_owned()));
        }
        Ok(Self {
            essence,
            params: parse_params(rest),
        })
    }

    /// Lowercased `type/subtype`.
    #[must_use]
    pub fn essence(&self) -> &str { &self.essence }

    /// Value of the named parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether this is `application/json`.
    #[must_use]
    pub fn is_json(&self) -> bool { self.essence == "application/json" }

    /// Whether this names binary attachment content.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(
            self.essence.as_str(),
            "application/pdf" | "application/octet-stream"
        ) || self.essence.starts_with("image/")
    }
}

/// How a reply body must be consumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyFormat {
    /// A single UTF-8 JSON document.
    Json,
    /// A multipart/mixed stream split on the given boundary.
    Multipart(Boundary),
}

/// Decide how to read a reply from its `Content-Type` header.
///
/// JSON is accepted only with an explicit UTF-8 charset. `multipart/mixed`
/// requires a boundary parameter.
///
/// # Errors
///
/// Returns a protocol-class [`FrameError`] for a missing or malformed header,
/// a missing or non-UTF-8 charset, a multipart type without boundary, or any other media
/// type.
pub fn classify_reply(content_type: Option<&str>) -> Result<ReplyFormat, FrameError> {
    let raw = content_type.ok_or_else(|| FrameError::InvalidContentType(String::new()))?;
    let media = MediaType::parse(raw)?;
    match media.essence() {
        "application/json" => match media.param("charset") {
            Some(charset) if is_utf8(charset) => Ok(ReplyFormat::Json),
            charset => Err(FrameError::UnsupportedCharset(
                charset.unwrap_or_default().to_owned(),
            )),
        },
        "multipart/mixed" => {
            let token = media
                .param("boundary")
                .filter(|token| !token.is_empty())
                .ok_or(FrameError::MissingBoundary)?;
            Ok(ReplyFormat::Multipart(Boundary::new(token)?))
        }
        other => Err(FrameError::UnsupportedMediaType(other.to_owned())),
    }
}

fn is_utf8(charset: &str) -> bool {
    charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8")
}

/// Split `; name=value; name="value"` parameter lists.
pub(crate) fn parse_params(rest: &str) -> Vec<(String, String)> {
    rest.split(';')
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.to_ascii_lowercase(), unquoted.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::utf8("application/json; charset=UTF-8")]
    #[case::utf8_lower("Application/JSON;charset=utf-8")]
    #[case::quoted("application/json; charset=\"utf-8\"")]
    fn accepts_json(#[case] raw: &str) {
        assert_eq!(classify_reply(Some(raw)).ok(), Some(ReplyFormat::Json));
    }

    #[rstest]
    fn accepts_multipart_with_boundary() {
        let format = classify_reply(Some("multipart/mixed; boundary=\"WaFfLeSaReTaStY\""))
            .expect("multipart accepted");
        let ReplyFormat::Multipart(boundary) = format else {
            panic!("expected multipart, got {format:?}");
        };
        assert_eq!(boundary.token(), "WaFfLeSaReTaStY");
    }

    #[rstest]
    #[case::absent(None, "invalidContentType")]
    #[case::garbage(Some("nonsense"), "invalidContentType")]
    #[case::no_charset(Some("application/json"), "unsupportedCharset")]
    #[case::latin1(Some("application/json; charset=ISO-8859-1"), "unsupportedCharset")]
    #[case::no_boundary(Some("multipart/mixed"), "missingBoundary")]
    #[case::empty_boundary(Some("multipart/mixed; boundary=\"\""), "missingBoundary")]
    #[case::text(Some("text/plain"), "unsupportedMediaType")]
    fn rejects_other_types(#[case] raw: Option<&str>, #[case] code: &str) {
        let err = classify_reply(raw).expect_err("must reject");
        assert_eq!(err.code(), code);
        assert!(err.is_protocol());
    }

    #[rstest]
    fn parses_disposition_params() {
        let params = parse_params(" filename=\"thumbnail.pdf\"; size=10");
        assert_eq!(
            params,
            vec![
                ("filename".to_owned(), "thumbnail.pdf".to_owned()),
                ("size".to_owned(), "10".to_owned()),
            ]
        );
    }

    #[rstest]
    #[case::pdf("application/pdf", true)]
    #[case::octet("application/octet-stream", true)]
    #[case::jpeg("image/jpeg", true)]
    #[case::json("application/json", false)]
    fn binary_media_types(#[case] raw: &str, #[case] expected: bool) {
        let media = MediaType::parse(raw).expect("parse");
        assert_eq!(media.is_binary(), expected);
    }
}
