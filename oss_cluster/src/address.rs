// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Canonical node addresses.
//!
//! Every address entering the cluster (registrations, removals, the configured
//! master list and the process' own identity) goes through [normalize] so that two
//! addresses are equal iff they designate the same `scheme://host:port`.

use std::borrow::Cow;

use reqwest::Url;

use crate::ClusterErr;

/// Scheme assumed when an address doesn't carry one
pub const DEFAULT_SCHEME: &str = "http";

/// Normalize a user supplied address or hostname into the canonical
/// `scheme://host:port` form.
///
/// * `address` - The address, e.g. `Node-1:9090`, `https://node-1` or `//node-1:9090`
/// * `default_port` - The port to use when `address` doesn't specify one. When [None]
/// the scheme's well-known port is used
///
/// The scheme and host are lowercased, any path, query or credentials are dropped.
///
/// Returns [Ok(String)] with the canonical address, [Err(ClusterErr::MalformedAddress)]
/// if the address has no host, an invalid port, or can't be parsed at all
pub fn normalize(address: &str, default_port: Option<u16>) -> Result<String, ClusterErr> {
    let malformed = || ClusterErr::MalformedAddress(address.to_string());

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(malformed());
    }
    let with_scheme: Cow<'_, str> = if trimmed.contains("://") {
        Cow::Borrowed(trimmed)
    } else {
        let bare = trimmed.trim_start_matches("//");
        Cow::Owned(format!("{DEFAULT_SCHEME}://{bare}"))
    };

    let url = Url::parse(&with_scheme).map_err(|_| malformed())?;
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
        _ => return Err(malformed()),
    };

    // `Url` hides a port equal to the scheme's default, so look at the raw
    // authority to tell "http://host:80" apart from "http://host"
    let port = match url.port() {
        Some(port) => Some(port),
        None if has_explicit_port(&with_scheme) => url.port_or_known_default(),
        None => default_port.or_else(|| url.port_or_known_default()),
    };
    let port = port.ok_or_else(malformed)?;

    Ok(format!("{}://{}:{}", url.scheme(), host, port))
}

fn has_explicit_port(address: &str) -> bool {
    let rest = match address.split_once("://") {
        Some((_, rest)) => rest,
        None => address,
    };
    let authority = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let host_port = match authority.rsplit_once('@') {
        Some((_, host_port)) => host_port,
        None => authority,
    };
    if host_port.ends_with(']') {
        // bare IPv6 literal
        return false;
    }
    match host_port.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}
