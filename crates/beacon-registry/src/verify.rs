//! Claimed-address checks.
//!
//! Two independent phases: a pure syntactic screen that runs before the
//! HTTP response, and a resolution check against the IP the announce
//! actually came from, which runs in the async worker.

use std::net::{IpAddr, SocketAddr};

/// Why a claimed address failed the syntactic screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScreenError {
    #[error("address is private or local")]
    Private,
    #[error("address is invalid")]
    Invalid,
    #[error("address must not include a port")]
    EmbeddedPort,
    #[error("address contains unicode")]
    Unicode,
    #[error("address is an example value")]
    Example,
}

impl ScreenError {
    /// Operator-facing help text, returned verbatim in the 400 body.
    pub fn help_text(self) -> &'static str {
        match self {
            ScreenError::Private => {
                "The server_address you provided is private or local. \
                 It is only reachable in your local network.\n\
                 If you meant to host a public server, adjust the setting and make sure your \
                 firewall is permitting connections (e.g. port forwarding)."
            }
            ScreenError::Invalid => {
                "The server_address you provided is invalid.\n\
                 If you don't have a domain name, try removing the setting from your configuration."
            }
            ScreenError::EmbeddedPort => {
                "The server_address you provided is invalid.\n\
                 Note that the value must not include a port number."
            }
            ScreenError::Unicode => {
                "The server_address you provided includes Unicode characters.\n\
                 For domain names you have to use the punycode notation."
            }
            ScreenError::Example => "The server_address you provided is an example value.",
        }
    }
}

/// Placeholder values shipped in the game's default configuration.
const EXAMPLE_HOST: &str = "game.minetest.net";
const EXAMPLE_TLDS: &[&str] = &[".example.com", ".example.net", ".example.org"];

/// Private IPv4 prefixes worth catching. Not exhaustive, but these are
/// nearly all of what shows up in practice.
const PRIVATE_NETS: &[&str] = &["10.", "192.168.", "127.", "0."];

/// TLDs reserved for local use; the wider internet cannot resolve them.
const RESERVED_TLDS: &[&str] = &[".localhost", ".local", ".internal"];

/// Characters never valid in a DNS name or IP literal.
const INVALID_CHARS: &[char] = &[' ', '@', '#', '/', '*', '"', '\''];

/// Syntactic screen of a claimed address. Pure; no resolution happens here.
pub fn screen_address(address: &str, reject_private: bool) -> Result<(), ScreenError> {
    let name = address.to_lowercase();

    if name == EXAMPLE_HOST || EXAMPLE_TLDS.iter().any(|s| name.ends_with(s)) {
        return Err(ScreenError::Example);
    }

    if name.len() > 255 {
        return Err(ScreenError::Invalid);
    }
    if name.contains(INVALID_CHARS) || name.chars().any(char::is_control) {
        return Err(ScreenError::Invalid);
    }
    if name.starts_with('-') {
        return Err(ScreenError::Invalid);
    }
    // Anything that is neither IPv6 nor dotted is not going to resolve for
    // game clients. Bare TLDs and integer-form IPs land here on purpose.
    if !name.contains(':') && !name.contains('.') {
        return Err(ScreenError::Invalid);
    }

    if reject_private {
        if PRIVATE_NETS.iter().any(|s| name.starts_with(s)) {
            return Err(ScreenError::Private);
        }
        if name == "localhost" || RESERVED_TLDS.iter().any(|s| name.ends_with(s)) {
            return Err(ScreenError::Private);
        }
    }

    // Dotted name with a colon smells like host:port; so does a bracketed
    // IPv6. Ports have their own field.
    if (name.contains('.') && name.contains(':')) || (name.contains(':') && name.contains('[')) {
        return Err(ScreenError::EmbeddedPort);
    }

    if !name.is_ascii() {
        return Err(ScreenError::Unicode);
    }

    Ok(())
}

/// Approximate domain-name test: has a dot and the top label starts with a
/// letter. Distinguishes "play.example.me" from "198.51.100.9".
pub fn is_domain(s: &str) -> bool {
    match s.rsplit_once('.') {
        Some((_, tld)) => tld.chars().next().is_some_and(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

/// Result of checking the claimed address against what it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The announcing IP is among the resolved addresses.
    Verified,
    /// The resolved set only carries the other address family, so the
    /// check is structurally impossible; accepted without complaint.
    Tolerated,
    /// Domain does not (yet) resolve to the announcer. Accepted, but the
    /// record must carry the sticky warning flag.
    Warned(String),
    /// A claimed IP literal that is not the announcing IP. Refused.
    Rejected(String),
}

/// Decide whether the claimed address plausibly denotes the announcer.
///
/// Domains get leniency because DNS setups break transiently; raw IP
/// literals do not, since there is no propagation delay to excuse them.
pub fn verify_resolved(
    resolved: &[SocketAddr],
    address: &str,
    announce_ip: IpAddr,
) -> Verification {
    if address == announce_ip.to_string() {
        return Verification::Verified;
    }

    if resolved.iter().any(|a| a.ip() == announce_ip) {
        return Verification::Verified;
    }

    let have_v4 = resolved.iter().any(|a| a.is_ipv4());
    let have_v6 = resolved.iter().any(|a| a.is_ipv6());
    if (announce_ip.is_ipv6() && !have_v6) || (announce_ip.is_ipv4() && !have_v4) {
        return Verification::Tolerated;
    }

    let mut msg = format!("Requester IP {announce_ip} does not match host {address}");
    if is_domain(address) {
        let valid: Vec<String> = resolved.iter().map(|a| a.ip().to_string()).collect();
        msg.push_str(&format!(" (valid: {})", valid.join(" ")));
        msg.push_str("\nYou may have to set a bind address.");
        Verification::Warned(msg)
    } else {
        Verification::Rejected(msg)
    }
}
