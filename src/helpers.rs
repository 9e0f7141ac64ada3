use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use httparse::Header;
use std::convert::TryFrom;

/// Parses a decoded header section, blank line included. Every line can
/// hold at most one header, so the section size bounds the header count.
pub(crate) fn parse_headers(raw: &str) -> crate::Result<HeaderMap> {
    let mut headers = vec![httparse::EMPTY_HEADER; raw.matches('\n').count().max(1)];

    match httparse::parse_headers(raw.as_bytes(), &mut headers) {
        Ok(httparse::Status::Complete((_, raw_headers))) => convert_raw_headers_to_header_map(raw_headers),
        Ok(httparse::Status::Partial) => Err(crate::Error::IncompleteHeaders),
        Err(err) => Err(crate::Error::ReadHeaderFailed(err)),
    }
}

pub(crate) fn convert_raw_headers_to_header_map(raw_headers: &[Header]) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = HeaderName::try_from(raw_header.name).map_err(|err| crate::Error::DecodeHeaderName {
            name: raw_header.name.to_owned(),
            cause: err.into(),
        })?;

        let value = HeaderValue::try_from(raw_header.value).map_err(|err| crate::Error::DecodeHeaderValue {
            value: raw_header.value.to_owned(),
            cause: err.into(),
        })?;

        headers.append(name, value);
    }

    Ok(headers)
}

/// Returns the first value of `name` as text. Header sections are decoded
/// before parsing, so non-ASCII values are valid UTF-8.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, &header::CONTENT_LENGTH).and_then(|value| value.trim().parse().ok())
}

pub(crate) fn content_type(headers: &HeaderMap) -> Option<mime::Mime> {
    header_str(headers, &header::CONTENT_TYPE).and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let raw = "Content-Disposition: form-data; name=\"pics\"\r\nX-Tag: a\r\nx-tag: b\r\nContent-Length: 12\r\n\r\n";
        let headers = parse_headers(raw).unwrap();

        assert_eq!(
            header_str(&headers, &header::CONTENT_DISPOSITION),
            Some("form-data; name=\"pics\"")
        );
        let tags: Vec<_> = headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert_eq!(content_length(&headers), Some(12));
        assert_eq!(content_type(&headers), None);
    }

    #[test]
    fn test_parse_many_headers() {
        let mut raw = String::from("Content-Disposition: form-data; name=\"wide\"\r\n");
        for idx in 0..40 {
            raw.push_str(&format!("X-Extra-{}: {}\r\n", idx, idx));
        }
        raw.push_str("\r\n");

        let headers = parse_headers(&raw).unwrap();
        assert_eq!(headers.len(), 41);
        assert_eq!(headers.get("x-extra-39").unwrap(), "39");
    }

    #[test]
    fn test_parse_empty_header_section() {
        let headers = parse_headers("\r\n").unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_non_ascii_header_values() {
        let raw = "Content-Disposition: form-data; name=\"f\"; filename=\"\u{4f60}\u{597d}.txt\"\r\n\r\n";
        let headers = parse_headers(raw).unwrap();
        assert_eq!(
            header_str(&headers, &header::CONTENT_DISPOSITION),
            Some("form-data; name=\"f\"; filename=\"\u{4f60}\u{597d}.txt\"")
        );
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(parse_headers("Content-Type: text/plain\r\n"), Err(crate::Error::IncompleteHeaders));
        assert!(matches!(
            parse_headers("No colon here\r\n\r\n"),
            Err(crate::Error::ReadHeaderFailed(_))
        ));
    }
}
