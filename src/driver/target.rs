use std::fmt;
use std::time::Duration;

/// Rows per fetch requested from the backend. Currently ignored by it.
pub const PAGE_SIZE: usize = 10_000;
pub const PROTOCOL_VERSION: &str = "1.1.0";

/// Everything a driver needs to open a connection.
#[derive(Clone, PartialEq)]
pub struct ConnectTarget {
    pub server: String,
    pub port: u16,
    pub table: String,
    pub username: String,
    pub password: String,
    pub tls: bool,
    pub tls_insecure_skip_verify: bool,
    pub timeout: Duration,
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

impl ConnectTarget {
    /// Full connection URL, password included. Never log this.
    pub fn url(&self) -> String {
        self.render(&self.password)
    }

    pub fn redacted(&self) -> String {
        self.render("****")
    }

    fn render(&self, password: &str) -> String {
        format!(
            "tcp://{}:{}/{}?version={}&username={}&password={}&tls={}&tls-insecure-skip-verify={}&page-size={}&timeout={}",
            self.server,
            self.port,
            self.table,
            PROTOCOL_VERSION,
            self.username,
            password,
            yes_no(self.tls),
            yes_no(self.tls_insecure_skip_verify),
            PAGE_SIZE,
            self.timeout.as_millis(),
        )
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
