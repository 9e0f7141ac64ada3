use crate::{constants, helpers};
use http::header::{self, HeaderMap};

pub(crate) struct ContentDisposition {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
}

impl ContentDisposition {
    /// Extracts the field name (`form-data` only) and the file name
    /// (`form-data` or `attachment`) from the `Content-Disposition` header.
    pub fn parse(headers: &HeaderMap) -> ContentDisposition {
        let content_disposition = helpers::header_str(headers, &header::CONTENT_DISPOSITION);

        let disposition_type = content_disposition
            .map(|val| val.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .unwrap_or_default();
        let params = content_disposition.map(parse_params).unwrap_or_default();

        let field_name = if disposition_type == constants::FORM_DATA {
            find_param(&params, "name").map(|name| name.trim().to_owned())
        } else {
            None
        };

        let file_name = if disposition_type == constants::FORM_DATA || disposition_type == constants::ATTACHMENT {
            find_param(&params, "filename").map(|name| name.trim().to_owned())
        } else {
            None
        };

        ContentDisposition { field_name, file_name }
    }
}

fn find_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Splits the `; key=value` parameters of a header value. Quoted values may
/// contain `;` and escaped quotes; backslashes are kept as sent, since
/// browsers put unescaped Windows paths in file names.
fn parse_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = match value.find(';') {
        Some(idx) => &value[idx + 1..],
        None => return params,
    };

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let idx = match rest.find(|ch: char| ch == '=' || ch == ';') {
            Some(idx) => idx,
            None => break,
        };
        if rest.as_bytes()[idx] == b';' {
            rest = &rest[idx + 1..];
            continue;
        }

        let key = rest[..idx].trim().to_ascii_lowercase();
        let after = rest[idx + 1..].trim_start();

        let (value, remaining) = match after.strip_prefix('"') {
            Some(quoted) => split_quoted(quoted),
            None => match after.find(';') {
                Some(end) => (after[..end].trim().to_owned(), &after[end..]),
                None => (after.trim().to_owned(), ""),
            },
        };
        params.push((key, value));

        rest = match remaining.find(';') {
            Some(idx) => &remaining[idx + 1..],
            None => "",
        };
    }

    params
}

fn split_quoted(quoted: &str) -> (String, &str) {
    let mut escaped = false;

    for (idx, ch) in quoted.char_indices() {
        match ch {
            '"' if !escaped => return (quoted[..idx].to_owned(), &quoted[idx + 1..]),
            '\\' => escaped = !escaped,
            _ => escaped = false,
        }
    }

    (quoted.to_owned(), "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn parse(value: &str) -> ContentDisposition {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_str(value).unwrap());
        ContentDisposition::parse(&headers)
    }

    #[test]
    fn test_content_disposition_field_name() {
        assert_eq!(parse(r#"form-data; name="my_field""#).field_name.as_deref(), Some("my_field"));
        assert_eq!(parse(r#"form-data; name="my field""#).field_name.as_deref(), Some("my field"));
        assert_eq!(
            parse(r#"form-data; name="my_field"; filename="file abc.txt""#).field_name.as_deref(),
            Some("my_field")
        );
        assert_eq!(parse("Form-Data; NAME=plain").field_name.as_deref(), Some("plain"));
        assert_eq!(parse(r#"form-data; name="a;b""#).field_name.as_deref(), Some("a;b"));
        assert_eq!(parse(r#"attachment; name="x""#).field_name, None);
        assert_eq!(parse(r#"inline; name="x""#).field_name, None);
    }

    #[test]
    fn test_content_disposition_file_name() {
        let cd = parse(r#"form-data; name="my_field"; filename="file_name.txt""#);
        assert_eq!(cd.file_name.as_deref(), Some("file_name.txt"));

        let cd = parse(r#"form-data; filename="file name.txt""#);
        assert_eq!(cd.field_name, None);
        assert_eq!(cd.file_name.as_deref(), Some("file name.txt"));

        let cd = parse(r#"attachment; filename="C:\docs\a.txt""#);
        assert_eq!(cd.file_name.as_deref(), Some(r"C:\docs\a.txt"));

        let cd = parse(r#"form-data; name="f"; filename="""#);
        assert_eq!(cd.file_name.as_deref(), Some(""));

        let cd = parse(r#"form-data; name="f"; filename="say \"hi\".txt""#);
        assert_eq!(cd.file_name.as_deref(), Some(r#"say \"hi\".txt"#));

        assert_eq!(parse(r#"form-data; name="f""#).file_name, None);
    }

    #[test]
    fn test_missing_header() {
        let cd = ContentDisposition::parse(&HeaderMap::new());
        assert_eq!(cd.field_name, None);
        assert_eq!(cd.file_name, None);
    }
}
