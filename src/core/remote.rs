//! Remote repository address parsing

use regex::Regex;
use std::sync::OnceLock;

/// Hosts whose ssh endpoint answers an authentication-only handshake
pub const KNOWN_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org", "codeberg.org"];

/// Transport used to reach a remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ssh,
    Http,
    Local,
}

/// A parsed remote repository address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddress {
    pub transport: Transport,

    /// Login user, `git` for most forges
    pub user: Option<String>,

    pub host: Option<String>,

    pub port: Option<u16>,

    /// Repository path on the host (`org/app.git`)
    pub path: String,
}

fn url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<scheme>ssh|git\+ssh|https?|git)://(?:(?P<user>[^@/]+)@)?(?P<host>[^:/]+)(?::(?P<port>\d+))?/(?P<path>.+)$").ok()
    })
    .as_ref()
}

fn scp_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:(?P<user>[^@/]+)@)?(?P<host>[^:/]+):(?P<path>[^/].*)$").ok())
        .as_ref()
}

impl RemoteAddress {
    /// Parse a remote address as git accepts it
    ///
    /// Anything that is neither a URL nor scp-like syntax is treated as a
    /// local path.
    pub fn parse(address: &str) -> Self {
        let address = address.trim();

        if let Some(caps) = url_regex().and_then(|re| re.captures(address)) {
            let transport = match &caps["scheme"] {
                "ssh" | "git+ssh" => Transport::Ssh,
                _ => Transport::Http,
            };
            return Self {
                transport,
                user: caps.name("user").map(|m| m.as_str().to_string()),
                host: Some(caps["host"].to_string()),
                port: caps.name("port").and_then(|m| m.as_str().parse().ok()),
                path: caps["path"].to_string(),
            };
        }

        if !address.starts_with('/') && !address.starts_with('.') {
            if let Some(caps) = scp_regex().and_then(|re| re.captures(address)) {
                return Self {
                    transport: Transport::Ssh,
                    user: caps.name("user").map(|m| m.as_str().to_string()),
                    host: Some(caps["host"].to_string()),
                    port: None,
                    path: caps["path"].to_string(),
                };
            }
        }

        Self {
            transport: Transport::Local,
            user: None,
            host: None,
            port: None,
            path: address.trim_start_matches("file://").to_string(),
        }
    }

    /// Whether an authentication-only ssh handshake can verify this remote
    pub fn is_probeable(&self) -> bool {
        self.transport == Transport::Ssh
            && self
                .host
                .as_deref()
                .is_some_and(|host| KNOWN_HOSTS.iter().any(|known| host.eq_ignore_ascii_case(known)))
    }

    /// `user@host` destination for ssh
    pub fn ssh_destination(&self) -> Option<String> {
        let host = self.host.as_ref()?;
        let user = self.user.as_deref().unwrap_or("git");
        Some(format!("{}@{}", user, host))
    }
}
