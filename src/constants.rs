use std::time::Duration;

/// Plaintext WebSocket / HTTP port
pub const DEFAULT_PORT: u16 = 8001;
/// TLS WebSocket / HTTPS port, the only port that accepts a pairing token
pub const SECURE_PORT: u16 = 8002;

pub const DEFAULT_NAME: &str = "SamsungTvRemote";
pub const DEFAULT_KEY_PRESS_DELAY: Duration = Duration::from_secs(1);

pub const ART_ENDPOINT: &str = "com.samsung.art-app";
pub const REMOTE_ENDPOINT: &str = "samsung.remote.control";

/// Correlated art request wait in the cooperative client
pub const DEFAULT_ART_TIMEOUT: Duration = Duration::from_secs(2);
/// Socket timeout used on D2D transfers
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the blocking listener holds the socket before letting senders in
pub const LISTEN_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Bound on joining the receive loop during `close()`
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);
/// REST request timeout
pub const DEFAULT_REST_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a D2D JSON header
pub const MAX_D2D_HEADER_LEN: usize = 1024 * 1024;
/// Upper bound on one D2D file, well above any artwork the TV stores
pub const MAX_D2D_FILE_LEN: u64 = 256 * 1024 * 1024;
pub const D2D_VERSION: &str = "0.0.1";

pub const DEFAULT_MATTE: &str = "shadowbox_polar";
pub const NO_MATTE: &str = "none";
pub const UPLOAD_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub const BROWSER_APP_ID: &str = "org.tizen.browser";

/// Wait for the installed app list while a listener owns the socket
pub const APP_LIST_TIMEOUT: Duration = Duration::from_secs(10);
