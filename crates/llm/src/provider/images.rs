//! Image payload handling shared by the Anthropic and Google translators.
//!
//! Only `data:<mime>;base64,<payload>` URIs translate; these upstreams do
//! not fetch remote URLs, so http(s) references are dropped by the callers.

/// A decoded `data:` URI: the detected media type and the base64 payload.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct InlineImage {
    pub media_type: &'static str,
    pub data: String,
}

/// Parse a `data:` URI into its media type and base64 payload.
///
/// The media type defaults to `image/png`; jpeg, webp and gif are
/// recognized from the URI header.
pub(super) fn parse_data_url(url: &str) -> Option<InlineImage> {
    if !url.starts_with("data:") {
        return None;
    }

    let (header, payload) = url.split_once(',')?;

    let media_type = if header.contains("image/jpeg") || header.contains("image/jpg") {
        "image/jpeg"
    } else if header.contains("image/webp") {
        "image/webp"
    } else if header.contains("image/gif") {
        "image/gif"
    } else {
        "image/png"
    };

    Some(InlineImage {
        media_type,
        data: payload.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_png_data_url() {
        let image = parse_data_url("data:image/png;base64,aGVsbG8=").unwrap();

        assert_eq!(image.media_type, "image/png");
        assert_eq!(image.data, "aGVsbG8=");
    }

    #[test]
    fn detects_jpeg_and_webp_and_gif() {
        assert_eq!(
            parse_data_url("data:image/jpeg;base64,eA==").unwrap().media_type,
            "image/jpeg"
        );
        assert_eq!(
            parse_data_url("data:image/jpg;base64,eA==").unwrap().media_type,
            "image/jpeg"
        );
        assert_eq!(
            parse_data_url("data:image/webp;base64,eA==").unwrap().media_type,
            "image/webp"
        );
        assert_eq!(
            parse_data_url("data:image/gif;base64,eA==").unwrap().media_type,
            "image/gif"
        );
    }

    #[test]
    fn unknown_mime_defaults_to_png() {
        let image = parse_data_url("data:application/octet-stream;base64,eA==").unwrap();
        assert_eq!(image.media_type, "image/png");
    }

    #[test]
    fn remote_urls_are_not_inline_images() {
        assert!(parse_data_url("https://example.com/cat.png").is_none());
    }

    #[test]
    fn malformed_data_url_is_rejected() {
        assert!(parse_data_url("data:image/png;base64").is_none());
    }
}
