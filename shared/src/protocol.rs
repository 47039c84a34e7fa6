/// Marker that turns a line of the group text format into a group header
pub const GENRE_MARKER: &str = "#genre#";

/// Token a live playlist body must carry within its first bytes
pub const PLAYLIST_SIGNATURE: &str = "#EXTM3U";

/// Port assumed when a header or URL omits one
pub const DEFAULT_PORT: u16 = 80;

/// Several origins only answer requests that look like a media player
pub const DEFAULT_USER_AGENT: &str = "VLC/3.0.11";

/// Channel family that sorts ahead of everything else, by number
pub const PRIORITY_PREFIX: &str = "CCTV";

/// Label probed first when a group carries it
pub const DEFAULT_CANARY_LABEL: &str = "CCTV-1";
