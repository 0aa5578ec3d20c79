//! # Extractor Configuration
//!
//! Flags controlling how the container demuxer parses a stream's internal
//! structure. Pure configuration, no state; the same configuration is shared
//! across DASH/HLS/progressive sources.

/// Size of a single MPEG-TS packet in bytes.
pub const TS_PACKET_SIZE: u32 = 188;

/// Number of TS packets the demuxer scans for a timestamp by default.
const DEFAULT_TIMESTAMP_SEARCH_PACKETS: u32 = 600;

/// The search window is widened over the demuxer default so streams with
/// sparse timestamps still synchronize.
const TIMESTAMP_SEARCH_FACTOR: u32 = 3;

/// Demuxer flags handed to the playback engine with every resolved source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// How many bytes of an MPEG-TS stream to scan when searching for the
    /// first timestamp.
    pub ts_timestamp_search_bytes: u32,
    /// Whether to expose HDMV DTS audio streams found in TS containers.
    pub hdmv_dts_audio_streams: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ts_timestamp_search_bytes: TS_PACKET_SIZE
                * DEFAULT_TIMESTAMP_SEARCH_PACKETS
                * TIMESTAMP_SEARCH_FACTOR,
            hdmv_dts_audio_streams: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_search_window_is_widened() {
        let config = ExtractorConfig::default();
        assert_eq!(config.ts_timestamp_search_bytes, 188 * 600 * 3);
        assert!(config.hdmv_dts_audio_streams);
    }
}
