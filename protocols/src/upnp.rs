// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! UPnP Internet Gateway Device control: device description parsing and the SOAP actions
//! needed to list, add and remove port mappings.

use std::collections::HashMap;
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Url;
use thiserror::Error;
use xmltree::{Element, XMLNode};

use natwarden_common::models::mapping::Protocol;

const WAN_IP_CONNECTION: &str = "urn:schemas-upnp-org:service:WANIPConnection";
const WAN_PPP_CONNECTION: &str = "urn:schemas-upnp-org:service:WANPPPConnection";

/// SpecifiedArrayIndexInvalid: enumeration ran past the last entry.
const FAULT_ARRAY_INDEX_INVALID: u16 = 713;
/// NoSuchEntryInArray
const FAULT_NO_SUCH_ENTRY: u16 = 714;

/// Upper bound on `GetGenericPortMappingEntry` indices, for devices that never report the end.
pub const MAX_PORT_MAPPING_ENTRIES: u32 = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpnpError {
    #[error("UPnP fault {code}: {description}")]
    Fault { code: u16, description: String },
    #[error("malformed SOAP response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgdService {
    pub service_type: String,
    pub control_url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMappingEntry {
    pub protocol: Protocol,
    pub external_port: u16,
    pub internal_client: Ipv4Addr,
    pub internal_port: u16,
    pub description: String,
    pub lease_duration: u32,
    pub enabled: bool,
}

/// Finds the WAN connection service in a device description fetched from `location`.
///
/// `WANIPConnection` is preferred over `WANPPPConnection` when a device offers both.
pub fn parse_description(xml: &str, location: &Url) -> Result<IgdService> {
    let root: Element = Element::parse(xml.as_bytes()).context("Failed to parse device description")?;

    let base: Url = match root.get_child("URLBase").and_then(|e| e.get_text()) {
        Some(text) if !text.trim().is_empty() => Url::parse(text.trim()).unwrap_or_else(|_| location.clone()),
        _ => location.clone(),
    };

    let mut services: Vec<(String, String)> = Vec::new();
    collect_services(&root, &mut services);

    let (service_type, control_path) = services
        .iter()
        .find(|(kind, _)| kind.starts_with(WAN_IP_CONNECTION))
        .or_else(|| services.iter().find(|(kind, _)| kind.starts_with(WAN_PPP_CONNECTION)))
        .ok_or_else(|| anyhow!("Device at {location} exposes no WAN connection service"))?;

    Ok(IgdService {
        service_type: service_type.clone(),
        control_url: base
            .join(control_path)
            .with_context(|| format!("Invalid control URL {control_path}"))?,
    })
}

fn collect_services(element: &Element, out: &mut Vec<(String, String)>) {
    if element.name == "service" {
        let field = |name: &str| {
            element
                .get_child(name)
                .and_then(|e| e.get_text())
                .map(|text| text.trim().to_string())
        };
        if let (Some(kind), Some(control)) = (field("serviceType"), field("controlURL")) {
            out.push((kind, control));
        }
        return;
    }

    for child in &element.children {
        if let XMLNode::Element(child) = child {
            collect_services(child, out);
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn create_soap_envelope(service_type: &str, action: &str, args: &[(&str, String)]) -> String {
    let body: String = args
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>", escape(value)))
        .collect();

    format!(
        "<?xml version=\"1.0\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body><u:{action} xmlns:u=\"{service_type}\">{body}</u:{action}></s:Body>\
         </s:Envelope>"
    )
}

/// Returns the output arguments of an action response, or the device's fault.
pub fn parse_soap_response(xml: &str) -> Result<HashMap<String, String>, UpnpError> {
    let envelope: Element =
        Element::parse(xml.as_bytes()).map_err(|e| UpnpError::Malformed(e.to_string()))?;
    let body: &Element = envelope
        .get_child("Body")
        .ok_or_else(|| UpnpError::Malformed("missing Body".to_string()))?;
    let payload: &Element = body
        .children
        .iter()
        .find_map(XMLNode::as_element)
        .ok_or_else(|| UpnpError::Malformed("empty Body".to_string()))?;

    if payload.name == "Fault" {
        return Err(parse_fault(payload));
    }

    Ok(payload
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .map(|arg| {
            let value: String = arg.get_text().map(|t| t.trim().to_string()).unwrap_or_default();
            (arg.name.clone(), value)
        })
        .collect())
}

fn parse_fault(fault: &Element) -> UpnpError {
    let error: Option<&Element> = fault
        .get_child("detail")
        .and_then(|detail| detail.get_child("UPnPError"));

    let text_of = |name: &str| {
        error
            .and_then(|e| e.get_child(name))
            .and_then(|e| e.get_text())
            .map(|t| t.trim().to_string())
    };

    match text_of("errorCode").and_then(|code| code.parse::<u16>().ok()) {
        Some(code) => UpnpError::Fault {
            code,
            description: text_of("errorDescription").unwrap_or_default(),
        },
        None => UpnpError::Malformed("fault without UPnPError code".to_string()),
    }
}

fn parse_entry(args: &HashMap<String, String>) -> Result<Option<PortMappingEntry>> {
    let field = |name: &str| args.get(name).map(String::as_str).unwrap_or("");
    if field("NewExternalPort").is_empty() && field("NewInternalClient").is_empty() {
        return Ok(None);
    }

    Ok(Some(PortMappingEntry {
        protocol: field("NewProtocol").parse().map_err(anyhow::Error::msg)?,
        external_port: field("NewExternalPort").parse().context("NewExternalPort")?,
        internal_client: field("NewInternalClient").parse().context("NewInternalClient")?,
        internal_port: field("NewInternalPort").parse().context("NewInternalPort")?,
        description: field("NewPortMappingDescription").to_string(),
        lease_duration: field("NewLeaseDuration").parse().unwrap_or(0),
        enabled: matches!(field("NewEnabled"), "1" | "true"),
    }))
}

/// Reads entries `0, 1, ...` until `fetch` reports the end of the table.
///
/// A table that is still going at index `limit` is treated as a misbehaving device.
pub async fn enumerate_entries<F, Fut>(limit: u32, mut fetch: F) -> Result<Vec<PortMappingEntry>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<PortMappingEntry>>>,
{
    let mut entries: Vec<PortMappingEntry> = Vec::new();
    for index in 0..limit {
        match fetch(index).await? {
            Some(entry) => entries.push(entry),
            None => return Ok(entries),
        }
    }
    bail!("Port mapping table did not end within {limit} entries")
}

/// SOAP client bound to one gateway's WAN connection service.
#[derive(Debug, Clone)]
pub struct IgdClient {
    http: reqwest::Client,
    service: IgdService,
}

impl IgdClient {
    pub fn new(service: IgdService, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, service })
    }

    /// Fetches and parses the device description advertised at `location`.
    pub async fn from_location(location: &str, timeout: Duration) -> Result<Self> {
        let location: Url = Url::parse(location).with_context(|| format!("Invalid LOCATION {location}"))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let xml: String = http.get(location.clone()).send().await?.error_for_status()?.text().await?;
        let service: IgdService = parse_description(&xml, &location)?;
        Ok(Self { http, service })
    }

    pub fn service(&self) -> &IgdService {
        &self.service
    }

    /// Gateway address as written in the control URL, if it is a literal IPv4 address.
    pub fn gateway_address(&self) -> Option<Ipv4Addr> {
        self.service.control_url.host_str()?.parse().ok()
    }

    async fn call(&self, action: &str, args: &[(&str, String)]) -> Result<HashMap<String, String>> {
        let envelope: String = create_soap_envelope(&self.service.service_type, action, args);
        let response = self
            .http
            .post(self.service.control_url.clone())
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPAction", format!("\"{}#{action}\"", self.service.service_type))
            .body(envelope)
            .send()
            .await
            .with_context(|| format!("{action} request failed"))?;

        // Faults arrive with status 500, so the body is parsed whatever the status.
        let status = response.status();
        let body: String = response.text().await?;
        match parse_soap_response(&body) {
            Ok(args) => Ok(args),
            Err(UpnpError::Malformed(reason)) if !status.is_success() => {
                bail!("{action} failed with HTTP {status}: {reason}")
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn external_ip(&self) -> Result<Ipv4Addr> {
        let args = self.call("GetExternalIPAddress", &[]).await?;
        let text: &str = args
            .get("NewExternalIPAddress")
            .ok_or_else(|| anyhow!("GetExternalIPAddress returned no address"))?;
        text.parse().with_context(|| format!("Invalid external address {text}"))
    }

    /// Entry at `index`, or `None` once the index runs past the end of the table.
    pub async fn port_mapping_entry(&self, index: u32) -> Result<Option<PortMappingEntry>> {
        match self
            .call("GetGenericPortMappingEntry", &[("NewPortMappingIndex", index.to_string())])
            .await
        {
            Ok(args) => parse_entry(&args),
            Err(err) => match err.downcast_ref::<UpnpError>() {
                Some(UpnpError::Fault { code, .. })
                    if *code == FAULT_ARRAY_INDEX_INVALID || *code == FAULT_NO_SUCH_ENTRY =>
                {
                    Ok(None)
                }
                _ => Err(err),
            },
        }
    }

    pub async fn port_mappings(&self) -> Result<Vec<PortMappingEntry>> {
        enumerate_entries(MAX_PORT_MAPPING_ENTRIES, |index| self.port_mapping_entry(index)).await
    }

    pub async fn add_port_mapping(&self, entry: &PortMappingEntry) -> Result<()> {
        let args: [(&str, String); 8] = [
            ("NewRemoteHost", String::new()),
            ("NewExternalPort", entry.external_port.to_string()),
            ("NewProtocol", entry.protocol.to_string()),
            ("NewInternalPort", entry.internal_port.to_string()),
            ("NewInternalClient", entry.internal_client.to_string()),
            ("NewEnabled", if entry.enabled { "1" } else { "0" }.to_string()),
            ("NewPortMappingDescription", entry.description.clone()),
            ("NewLeaseDuration", entry.lease_duration.to_string()),
        ];
        self.call("AddPortMapping", &args).await.map(|_| ())
    }

    pub async fn delete_port_mapping(&self, protocol: Protocol, external_port: u16) -> Result<()> {
        let args: [(&str, String); 3] = [
            ("NewRemoteHost", String::new()),
            ("NewExternalPort", external_port.to_string()),
            ("NewProtocol", protocol.to_string()),
        ];
        self.call("DeletePortMapping", &args).await.map(|_| ())
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:Layer3Forwarding:1</serviceType>
        <controlURL>/ctl/L3F</controlURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceList>
          <device>
            <serviceList>
              <service>
                <serviceType>urn:schemas-upnp-org:service:WANPPPConnection:1</serviceType>
                <controlURL>/ctl/PPP</controlURL>
              </service>
              <service>
                <serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>
                <controlURL>/ctl/IPConn</controlURL>
              </service>
            </serviceList>
          </device>
        </deviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    fn location() -> Url {
        Url::parse("http://192.168.1.1:5000/rootDesc.xml").unwrap()
    }

    #[test]
    fn finds_nested_wan_ip_service() {
        let service: IgdService = parse_description(DESCRIPTION, &location()).unwrap();
        assert_eq!(service.service_type, "urn:schemas-upnp-org:service:WANIPConnection:1");
        assert_eq!(service.control_url.as_str(), "http://192.168.1.1:5000/ctl/IPConn");
    }

    #[test]
    fn url_base_overrides_location() {
        let xml: String = DESCRIPTION.replace(
            "<device>\n    <deviceType>",
            "<URLBase>http://10.0.0.1:49000/</URLBase>\n  <device>\n    <deviceType>",
        );
        let service: IgdService = parse_description(&xml, &location()).unwrap();
        assert_eq!(service.control_url.as_str(), "http://10.0.0.1:49000/ctl/IPConn");
    }

    #[test]
    fn description_without_wan_service_is_rejected() {
        let xml: &str = "<root><device><serviceList></serviceList></device></root>";
        assert!(parse_description(xml, &location()).is_err());
    }

    #[test]
    fn envelope_escapes_arguments() {
        let envelope: String = create_soap_envelope(
            "urn:schemas-upnp-org:service:WANIPConnection:1",
            "AddPortMapping",
            &[("NewPortMappingDescription", "a<b&c".to_string())],
        );
        assert!(envelope.contains("<u:AddPortMapping xmlns:u=\"urn:schemas-upnp-org:service:WANIPConnection:1\">"));
        assert!(envelope.contains("<NewPortMappingDescription>a&lt;b&amp;c</NewPortMappingDescription>"));
    }

    #[test]
    fn response_arguments_are_collected() {
        let xml: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetGenericPortMappingEntryResponse xmlns:u="urn:schemas-upnp-org:service:WANIPConnection:1">
      <NewRemoteHost></NewRemoteHost>
      <NewExternalPort>9000</NewExternalPort>
      <NewProtocol>TCP</NewProtocol>
      <NewInternalPort>8080</NewInternalPort>
      <NewInternalClient>192.168.1.50</NewInternalClient>
      <NewEnabled>1</NewEnabled>
      <NewPortMappingDescription>some text</NewPortMappingDescription>
      <NewLeaseDuration>0</NewLeaseDuration>
    </u:GetGenericPortMappingEntryResponse>
  </s:Body>
</s:Envelope>"#;

        let args = parse_soap_response(xml).unwrap();
        let entry: PortMappingEntry = parse_entry(&args).unwrap().unwrap();
        assert_eq!(entry.protocol, Protocol::Tcp);
        assert_eq!(entry.external_port, 9000);
        assert_eq!(entry.internal_port, 8080);
        assert_eq!(entry.internal_client, Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(entry.description, "some text");
        assert!(entry.enabled);
    }

    #[test]
    fn fault_carries_upnp_error_code() {
        let xml: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>UPnPError</faultstring>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>713</errorCode>
          <errorDescription>SpecifiedArrayIndexInvalid</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#;

        assert_eq!(
            parse_soap_response(xml),
            Err(UpnpError::Fault {
                code: 713,
                description: "SpecifiedArrayIndexInvalid".to_string()
            })
        );
    }

    #[test]
    fn empty_entry_reply_ends_enumeration() {
        assert_eq!(parse_entry(&HashMap::new()).unwrap(), None);
    }

    fn entry(port: u16) -> PortMappingEntry {
        PortMappingEntry {
            protocol: Protocol::Tcp,
            external_port: port,
            internal_client: Ipv4Addr::new(192, 168, 1, 50),
            internal_port: 8080,
            description: "web".into(),
            lease_duration: 0,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn enumeration_stops_at_the_end_of_the_table() {
        let entries = enumerate_entries(MAX_PORT_MAPPING_ENTRIES, |index| async move {
            Ok((index < 3).then(|| entry(9000 + index as u16)))
        })
        .await
        .unwrap();
        assert_eq!(entries.iter().map(|e| e.external_port).collect::<Vec<_>>(), vec![9000, 9001, 9002]);
    }

    #[tokio::test]
    async fn endless_table_is_cut_off() {
        let mut calls: u32 = 0;
        let result = enumerate_entries(16, |_| {
            calls += 1;
            async { Ok(Some(entry(9000))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 16);
    }
}
