//! Relay endpoint normalisation.
//!
//! The relay is configured with a plain base URL such as
//! `https://chat.example.com`. The WebSocket transport needs the Engine.IO
//! socket URL instead, e.g.
//! `wss://chat.example.com/socket.io/?EIO=4&transport=websocket`.

use url::Url;

use crate::error::ClientError;

/// Default Engine.IO mount path on the relay.
pub const DEFAULT_PATH: &str = "/socket.io/";

/// Engine.IO protocol revision spoken by the client.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Turns a relay base URL into the WebSocket URL the transport dials.
///
/// `http`/`https` map to `ws`/`wss`; `ws`/`wss` are kept. An empty path or
/// `/` becomes [`DEFAULT_PATH`]; any other path is kept and given a trailing
/// slash. Existing query strings and fragments are discarded.
///
/// # Errors
///
/// Returns [`ClientError::InvalidEndpoint`] if `base` does not parse as a
/// URL, has an unknown scheme, an empty or malformed host or port, or asks
/// for `https`/`wss` in a build without the `tls` feature.
pub fn socket_url(base: &str) -> Result<String, ClientError> {
    let base = base.trim();
    let invalid = |why: &str| ClientError::InvalidEndpoint(format!("{base:?}: {why}"));

    // The URL parser would read these as path separators.
    if base.contains('\\') {
        return Err(invalid("backslash in URL"));
    }
    let mut url = Url::parse(base).map_err(|err| invalid(&err.to_string()))?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" if cfg!(feature = "tls") => "wss",
        "https" | "wss" => return Err(invalid("wss requires the tls feature")),
        other => return Err(invalid(&format!("unsupported scheme {other:?}"))),
    };

    let authority_missing = base
        .split_once("://")
        .is_none_or(|(_, rest)| rest.starts_with('/'));
    if authority_missing || url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }

    url.set_scheme(ws_scheme)
        .map_err(|()| invalid("cannot switch to a websocket scheme"))?;

    let path = match url.path().trim_end_matches('/') {
        "" => DEFAULT_PATH.to_string(),
        custom => format!("{custom}/"),
    };
    url.set_path(&path);
    url.set_query(Some(&format!(
        "EIO={ENGINE_IO_VERSION}&transport=websocket"
    )));
    url.set_fragment(None);

    Ok(url.into())
}
