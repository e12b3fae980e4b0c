//! Parsers for the remote tools queried by health checks.

use super::Protocol;

/// Status `dpkg-query` reports for a fully installed package.
const DPKG_INSTALLED: &str = "install ok installed";

/// Width of the kernel `comm` field reported by `ps`.
const COMM_WIDTH: usize = 15;

/// Returns `true` when any line of `dpkg-query -f '${Status}\n'` output
/// denotes an installed package. Multi-arch packages print one line per
/// architecture.
#[must_use]
pub fn dpkg_status_installed(output: &str) -> bool {
    output.lines().any(|line| line.trim() == DPKG_INSTALLED)
}

/// Returns `true` when `ss -l` output lists a socket bound to `port`.
///
/// The local address is the fourth column of `ss` output for both TCP and
/// UDP listings; header lines never parse as a port number.
#[must_use]
pub fn ss_lists_port(output: &str, port: u16) -> bool {
    output.lines().any(|line| {
        line.split_whitespace()
            .nth(3)
            .and_then(|local| local.rsplit_once(':'))
            .and_then(|(_, candidate)| candidate.parse::<u16>().ok())
            == Some(port)
    })
}

/// Returns the `ss` invocation listing listening sockets for `protocol`.
#[must_use]
pub const fn ss_command(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "ss -ltn",
        Protocol::Udp => "ss -lun",
    }
}

/// Returns `true` when `ps -A -o comm=` output contains `name`.
///
/// Names longer than the kernel's `comm` width match on their truncated
/// prefix.
#[must_use]
pub fn ps_lists_process(output: &str, name: &str) -> bool {
    output.lines().map(str::trim).any(|comm| {
        comm == name
            || (name.len() > COMM_WIDTH && comm.len() == COMM_WIDTH && name.starts_with(comm))
    })
}
