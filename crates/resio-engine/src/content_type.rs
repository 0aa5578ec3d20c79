//! # Content Type Classification
//!
//! Infers a streaming content type from a playback URI. Classification is a
//! pure function of the URI string: no network access, no process state.

use url::Url;

use crate::error::ResolveError;

/// Content type of a playback URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// MPEG-DASH manifest
    Dash,
    /// HLS playlist
    Hls,
    /// RTMP live stream
    Rtmp,
    /// RTSP session
    Rtsp,
    /// Progressive or other container
    Other,
}

impl ContentType {
    /// Classify a parsed URL. The scheme wins first; otherwise the
    /// lower-cased path decides. Same input, same answer.
    pub fn classify(url: &Url) -> ContentType {
        match url.scheme() {
            "rtmp" => return ContentType::Rtmp,
            "rtsp" => return ContentType::Rtsp,
            _ => {}
        }

        let path = url.path().to_lowercase();
        if path.contains(".mpd") {
            ContentType::Dash
        } else if path.contains(".m3u8") {
            ContentType::Hls
        } else {
            ContentType::Other
        }
    }

    /// Classify a raw URI string, failing only on a parse error.
    pub fn from_uri(uri: &str) -> Result<ContentType, ResolveError> {
        let url = Url::parse(uri).map_err(|e| ResolveError::UriParse(format!("{uri}: {e}")))?;
        Ok(Self::classify(&url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(uri: &str) -> ContentType {
        ContentType::from_uri(uri).expect("uri should parse")
    }

    #[test]
    fn test_classify_by_path_extension() {
        assert_eq!(classify("https://cdn.example.com/live/main.mpd"), ContentType::Dash);
        assert_eq!(classify("https://cdn.example.com/live/main.m3u8"), ContentType::Hls);
        assert_eq!(classify("https://cdn.example.com/movie.mp4"), ContentType::Other);
        assert_eq!(classify("https://cdn.example.com/"), ContentType::Other);
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify("https://cdn.example.com/Live/MAIN.MPD"), ContentType::Dash);
        assert_eq!(classify("HTTPS://cdn.example.com/a/B.M3U8"), ContentType::Hls);
        assert_eq!(classify("RTMP://host/live"), ContentType::Rtmp);
    }

    #[test]
    fn test_scheme_wins_over_path() {
        assert_eq!(classify("rtmp://host/stream.m3u8"), ContentType::Rtmp);
        assert_eq!(classify("rtsp://host/stream.mpd"), ContentType::Rtsp);
    }

    #[test]
    fn test_query_does_not_affect_classification() {
        assert_eq!(
            classify("https://cdn.example.com/video?fmt=.m3u8"),
            ContentType::Other
        );
    }

    #[test]
    fn test_parse_failure_is_reported() {
        assert!(matches!(
            ContentType::from_uri("not a uri"),
            Err(ResolveError::UriParse(_))
        ));
    }
}
