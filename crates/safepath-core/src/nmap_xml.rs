//! Parser for nmap XML output (`nmap -oX`).
//!
//! Only the parts of the document that become findings are read:
//!
//! ```text
//! <nmaprun>
//!   <host>
//!     <address addr="10.0.0.5" addrtype="ipv4"/>
//!     <hostnames><hostname name="srv1"/></hostnames>
//!     <ports>
//!       <port protocol="tcp" portid="22">
//!         <state state="open"/>
//!         <service name="ssh" product="OpenSSH" version="8.9"/>
//!       </port>
//!     </ports>
//!   </host>
//! </nmaprun>
//! ```
//!
//! Everything else (runstats, hosthints, scripts, extraports...) is skipped.

use crate::error::{Error, Result};
use crate::finding::{describe, evidence_text, FindingCandidate};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::path::Path;
use tracing::{debug, warn};

/// The only port state that produces a finding.
pub const OPEN_STATE: &str = "open";

/// One `<port>` element as observed, before filtering on state.
#[derive(Debug, Default)]
struct RawPortRecord {
    portid: Option<String>,
    protocol: Option<String>,
    state: Option<String>,
    state_seen: bool,
    service: Option<String>,
    product: Option<String>,
    version: Option<String>,
    service_seen: bool,
}

impl RawPortRecord {
    fn is_open(&self) -> bool {
        self.state.as_deref() == Some(OPEN_STATE)
    }
}

#[derive(Debug, Default)]
struct HostRecord {
    ip: Option<String>,
    address_seen: bool,
    hostname: Option<String>,
    hostname_seen: bool,
    open_ports: Vec<RawPortRecord>,
}

/// Parser for nmap XML scan documents.
pub struct NmapXmlParser;

impl NmapXmlParser {
    /// Parse a saved nmap XML file.
    pub fn parse_file(path: &Path, target: &str) -> Result<Vec<FindingCandidate>> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, target)
    }

    /// Parse nmap XML into finding candidates, in document order.
    ///
    /// `target` stands in for the host name and address when the document
    /// does not carry them. Empty input is an empty result, not an error;
    /// whitespace alone is a document without a root.
    pub fn parse(xml: &str, target: &str) -> Result<Vec<FindingCandidate>> {
        let mut candidates = Vec::new();
        if xml.is_empty() {
            return Ok(candidates);
        }

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        // Names of the currently open elements; index 0 is the document root.
        let mut stack: Vec<String> = Vec::new();
        let mut root_closed = false;
        let mut host: Option<HostRecord> = None;
        let mut port: Option<RawPortRecord> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = local_name(&e);
                    if root_closed {
                        return Err(Error::MalformedDocument(format!(
                            "unexpected element <{}> after the document root",
                            name
                        )));
                    }
                    Self::open_element(&stack, &name, &e, &mut host, &mut port)?;
                    stack.push(name);
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    if root_closed {
                        return Err(Error::MalformedDocument(format!(
                            "unexpected element <{}> after the document root",
                            name
                        )));
                    }
                    if stack.is_empty() {
                        // `<nmaprun/>` is a complete, host-less document.
                        root_closed = true;
                        continue;
                    }
                    Self::open_element(&stack, &name, &e, &mut host, &mut port)?;
                    Self::close_element(&stack, &name, target, &mut host, &mut port, &mut candidates);
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if stack.pop().is_none() {
                        return Err(Error::MalformedDocument(format!(
                            "closing tag </{}> without an open element",
                            name
                        )));
                    }
                    Self::close_element(&stack, &name, target, &mut host, &mut port, &mut candidates);
                    if stack.is_empty() {
                        root_closed = true;
                    }
                }
                Event::Text(t) if stack.is_empty() => {
                    let text = t.unescape()?;
                    if !text.trim().is_empty() {
                        return Err(Error::MalformedDocument(
                            "text content outside the document root".to_string(),
                        ));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::MalformedDocument(format!(
                "unexpected end of document inside <{}>",
                open
            )));
        }
        if !root_closed {
            return Err(Error::MalformedDocument("no root element".to_string()));
        }

        Ok(candidates)
    }

    /// Parse, logging and discarding any failure.
    ///
    /// A target whose scan output cannot be read simply contributes no
    /// findings to the run.
    pub fn parse_or_empty(xml: &str, target: &str) -> Vec<FindingCandidate> {
        match Self::parse(xml, target) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(scan_target = %target, error = %e, "could not parse scan output");
                Vec::new()
            }
        }
    }

    fn open_element(
        stack: &[String],
        name: &str,
        e: &BytesStart<'_>,
        host: &mut Option<HostRecord>,
        port: &mut Option<RawPortRecord>,
    ) -> Result<()> {
        match name {
            "host" if at(stack, &[]) => {
                *host = Some(HostRecord::default());
            }
            "address" if at(stack, &["host"]) => {
                if let Some(h) = host.as_mut().filter(|h| !h.address_seen) {
                    h.address_seen = true;
                    h.ip = attribute(e, "addr")?;
                }
            }
            "hostname" if at(stack, &["host", "hostnames"]) => {
                if let Some(h) = host.as_mut().filter(|h| !h.hostname_seen) {
                    h.hostname_seen = true;
                    h.hostname = attribute(e, "name")?;
                }
            }
            "port" if at(stack, &["host", "ports"]) => {
                *port = Some(RawPortRecord {
                    portid: attribute(e, "portid")?,
                    protocol: attribute(e, "protocol")?,
                    ..Default::default()
                });
            }
            "state" if at(stack, &["host", "ports", "port"]) => {
                if let Some(p) = port.as_mut().filter(|p| !p.state_seen) {
                    p.state_seen = true;
                    p.state = attribute(e, "state")?;
                }
            }
            "service" if at(stack, &["host", "ports", "port"]) => {
                if let Some(p) = port.as_mut().filter(|p| !p.service_seen) {
                    p.service_seen = true;
                    p.service = attribute(e, "name")?;
                    p.product = attribute(e, "product")?;
                    p.version = attribute(e, "version")?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// `stack` no longer contains `name` when this runs.
    fn close_element(
        stack: &[String],
        name: &str,
        target: &str,
        host: &mut Option<HostRecord>,
        port: &mut Option<RawPortRecord>,
        candidates: &mut Vec<FindingCandidate>,
    ) {
        match name {
            "port" if at(stack, &["host", "ports"]) => {
                let (Some(record), Some(h)) = (port.take(), host.as_mut()) else {
                    return;
                };
                if record.is_open() {
                    h.open_ports.push(record);
                }
            }
            "host" if at(stack, &[]) => {
                if let Some(h) = host.take() {
                    candidates.extend(Self::host_candidates(h, target));
                }
            }
            _ => {}
        }
    }

    fn host_candidates(host: HostRecord, target: &str) -> Vec<FindingCandidate> {
        let host_name = host.hostname.unwrap_or_else(|| target.to_string());
        let ip = host.ip.unwrap_or_else(|| target.to_string());

        host.open_ports
            .into_iter()
            .filter_map(|record| {
                let (Some(port), Some(protocol)) = (record.portid, record.protocol) else {
                    debug!(scan_target = %target, host = %host_name, "skipping open port without portid/protocol");
                    return None;
                };
                let evidence = evidence_text(record.product.as_deref(), record.version.as_deref());
                let description = describe(&port, &protocol, record.service.as_deref(), &evidence);
                Some(FindingCandidate {
                    host: host_name.clone(),
                    ip: ip.clone(),
                    port,
                    protocol,
                    service: record.service,
                    product: record.product,
                    version: record.version,
                    description,
                    evidence,
                })
            })
            .collect()
    }
}

/// True when the open elements below the root are exactly `path`.
fn at(stack: &[String], path: &[&str]) -> bool {
    stack.len() == path.len() + 1 && stack[1..].iter().zip(path).all(|(a, b)| a == b)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Unescaped attribute value; empty values count as absent.
fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    let Some(attr) = e.try_get_attribute(name).map_err(quick_xml::Error::from)? else {
        return Ok(None);
    };
    let value = attr.unescape_value()?;
    Ok(Some(value.into_owned()).filter(|v| !v.is_empty()))
}
