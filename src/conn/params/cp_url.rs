//! Connection string parsing.
//!
//! Accepted forms:
//!
//! * `inet://host:port/path`, `inet4://…`, `inet6://…`, `wnet://…`,
//!   `xnet://service`
//! * legacy TCP `host:path` and `host/port:path`
//! * UNC `\\host\path`
//!
//! The port defaults to the `gds_db` service, numerically 3050.

use super::{ConnectParamsBuilder, TransportKind};
use crate::{util, FbError, FbResult, DEFAULT_PORT};

pub(crate) fn parse(s: &str) -> FbResult<ConnectParamsBuilder> {
    let mut builder = ConnectParamsBuilder::new();

    if let Some(rest) = s.strip_prefix("\\\\") {
        // UNC form
        let (host, path) = rest
            .split_once('\\')
            .ok_or_else(|| FbError::ConnParams(format!("malformed UNC string {s}")))?;
        builder.kind(TransportKind::Wnet).host(host).database(path);
        return Ok(builder);
    }

    if s.contains("://") {
        return parse_url(s, builder);
    }

    // legacy `host:path` or `host/port:path`; a one-letter prefix is a
    // windows drive, which would be a local attach
    let (endpoint, path) = s
        .split_once(':')
        .filter(|(h, _)| h.len() > 1)
        .ok_or_else(|| {
            FbError::ConnParams(format!("{s} does not name a remote database"))
        })?;
    let (host, port) = match endpoint.split_once('/') {
        Some((host, service)) => (host, resolve_service(service)),
        None => (endpoint, DEFAULT_PORT),
    };
    builder
        .kind(TransportKind::Inet)
        .host(host)
        .port(port)
        .database(path);
    Ok(builder)
}

fn parse_url(s: &str, mut builder: ConnectParamsBuilder) -> FbResult<ConnectParamsBuilder> {
    let url = url::Url::parse(s).map_err(|e| FbError::ConnParams(e.to_string()))?;
    let kind = match url.scheme() {
        "inet" => TransportKind::Inet,
        "inet4" => TransportKind::Inet4,
        "inet6" => TransportKind::Inet6,
        "wnet" => TransportKind::Wnet,
        "xnet" => TransportKind::Xnet,
        other => {
            return Err(FbError::ConnParams(format!(
                "unknown transport scheme {other}"
            )));
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| FbError::ConnParams("no host in connection string".to_owned()))?
        .to_owned();
    builder
        .kind(kind)
        .host(host)
        .port(url.port().unwrap_or(DEFAULT_PORT))
        .database(url.path().trim_start_matches('/'));
    if !url.username().is_empty() {
        builder.user(url.username());
    }
    if let Some(password) = url.password() {
        builder.password(password);
    }
    Ok(builder)
}

fn resolve_service(service: &str) -> u16 {
    match util::scan_number(service) {
        0 => DEFAULT_PORT,
        n => u16::try_from(n).unwrap_or(DEFAULT_PORT),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn url_forms() {
        let b = parse("inet://db.example.com:3051/data/employee.fdb").unwrap();
        let p = b.build().unwrap();
        assert_eq!(p.kind(), TransportKind::Inet);
        assert_eq!(p.host(), "db.example.com");
        assert_eq!(p.port(), 3051);
        assert_eq!(p.database(), "data/employee.fdb");

        let p = parse("inet6://localhost/employee").unwrap().build().unwrap();
        assert_eq!(p.kind(), TransportKind::Inet6);
        assert_eq!(p.port(), crate::DEFAULT_PORT);
    }

    #[test]
    fn legacy_forms() {
        let p = parse("dbhost:/srv/db.fdb").unwrap().build().unwrap();
        assert_eq!(p.kind(), TransportKind::Inet);
        assert_eq!(p.host(), "dbhost");
        assert_eq!(p.port(), crate::DEFAULT_PORT);
        assert_eq!(p.database(), "/srv/db.fdb");

        let p = parse("dbhost/3060:employee").unwrap().build().unwrap();
        assert_eq!(p.port(), 3060);
        assert_eq!(p.database(), "employee");
    }

    #[test]
    fn unc_form() {
        let p = parse("\\\\winhost\\C:\\db.fdb").unwrap().build().unwrap();
        assert_eq!(p.kind(), TransportKind::Wnet);
        assert_eq!(p.host(), "winhost");
        assert_eq!(p.database(), "C:\\db.fdb");
    }

    #[test]
    fn local_paths_are_rejected() {
        assert!(parse("C:\\db.fdb").is_err());
        assert!(parse("/plain/path.fdb").is_err());
    }
}
