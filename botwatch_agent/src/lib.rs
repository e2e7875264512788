//! Library surface of the mock bot backend, exposed for integration tests.

pub mod http;
pub mod sampler;
pub mod state;
pub mod ws;

pub use http::router;
pub use state::AppState;

pub const DEFAULT_PORT: u16 = 5050;

/// `--port N`, `-p N` or `--port=N`; the long form wins. Falls back to `default_port`.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut long: Option<String> = None;
    let mut short: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" => long = it.next(),
            "-p" => short = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    long = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    long.or(short)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}
