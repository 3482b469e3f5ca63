//! Diagnostic report
//!
//! Everything a run found out is collected into [`Findings`] while the run
//! progresses. [`DiagnosticReport::aggregate`] turns that into the final,
//! write-once report; it never fails, whatever combination of stages
//! succeeded.

use crate::address::network_address;
use crate::connectivity::{detect_cgnat, NatMappingResult};
use crate::protocol::{ConnectBackRequest, ConnectBackResult};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of the outbound connectivity checks
///
/// Each field holds the error seen, `None` meaning the check passed or was
/// not needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpReport {
    /// Error contacting the rendezvous service on its non-standard port
    pub odd_port_connection: Option<String>,
    /// Error of the fallback HTTPS probe on port 443
    pub port_443_connection: Option<String>,
}

/// Raw per-stage results gathered during a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    /// Outbound HTTP checks
    pub outbound_http: HttpReport,
    /// Whether `/peerinfo` was fetched and decoded
    pub rendezvous_reachable: bool,
    /// Mapping outcome, `None` when mapping was disabled or never reached
    pub nat: Option<NatMappingResult>,
    /// Observed address equals one of our interface addresses
    pub have_public_ip: bool,
    /// The listener could dial out from its own listening port
    pub tcp_reuseport_working: bool,
    /// Request sent to the responder
    pub request: Option<ConnectBackRequest>,
    /// Result the responder sent back
    pub response: Option<ConnectBackResult>,
    /// Why the exchange did not produce a result
    pub exchange_error: Option<String>,
}

/// Final result of one diagnostic run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    /// Unique id of the run
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the report was assembled
    pub finished_at: DateTime<Utc>,
    /// Outbound connectivity checks
    pub outbound_http: HttpReport,
    /// Whether the rendezvous lookup succeeded
    pub rendezvous_reachable: bool,
    /// Mapping outcome, absent when not attempted
    pub nat: Option<NatMappingResult>,
    /// The mapped external address is in carrier-grade NAT space
    pub cgnat_detected: bool,
    /// The host is reachable without address translation
    pub have_public_ip: bool,
    /// Outbound dial from the listening port worked
    pub tcp_reuseport_working: bool,
    /// Connect-back request sent
    pub request: Option<ConnectBackRequest>,
    /// Connect-back result received
    pub response: Option<ConnectBackResult>,
    /// Exchange failure, when no result was received
    pub exchange_error: Option<String>,
    /// The responder got through on exactly the mapped address
    pub mapping_works: bool,
}

impl DiagnosticReport {
    /// Assemble the report from a run's findings
    pub fn aggregate(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        findings: Findings,
    ) -> Self {
        let cgnat_detected = findings
            .nat
            .as_ref()
            .and_then(NatMappingResult::mapped_addr)
            .and_then(network_address)
            .is_some_and(|(_, ip)| detect_cgnat(ip));

        let mapping_works = mapping_enabled_connect_back(
            findings.request.as_ref(),
            findings.response.as_ref(),
        );

        Self {
            run_id,
            started_at,
            finished_at,
            outbound_http: findings.outbound_http,
            rendezvous_reachable: findings.rendezvous_reachable,
            nat: findings.nat,
            cgnat_detected,
            have_public_ip: findings.have_public_ip,
            tcp_reuseport_working: findings.tcp_reuseport_working,
            request: findings.request,
            response: findings.response,
            exchange_error: findings.exchange_error,
            mapping_works,
        }
    }

    /// Whether the responder reached us on any address
    pub fn connect_back_succeeded(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.success)
    }

    /// Render as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Print as pretty JSON on stdout
    pub fn print(&self) -> Result<()> {
        println!("{}", self.to_json_pretty()?);
        Ok(())
    }

    /// One-line summary for humans
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.rendezvous_reachable {
            parts.push("rendezvous: unreachable".to_string());
            match &self.outbound_http.port_443_connection {
                None => parts.push("https: ok".to_string()),
                Some(e) => parts.push(format!("https: {}", e)),
            }
            return parts.join(" → ");
        }

        parts.push("rendezvous: ok".to_string());

        if self.have_public_ip {
            parts.push("public IP".to_string());
        } else {
            parts.push("behind NAT".to_string());
        }

        match &self.nat {
            None => parts.push("mapping: not tried".to_string()),
            Some(NatMappingResult::Mapped {
                external_addr,
                protocol,
            }) => parts.push(format!("mapping: {} ({:?})", external_addr, protocol)),
            Some(NatMappingResult::Failed { reason }) => {
                parts.push(format!("mapping: {}", reason))
            }
        }

        if self.cgnat_detected {
            parts.push("CGNAT".to_string());
        }

        match (&self.response, &self.exchange_error) {
            (Some(response), _) => match (&response.successful_addr, response.success) {
                (Some(addr), true) => parts.push(format!("connect-back: ok via {}", addr)),
                _ => parts.push(format!(
                    "connect-back: failed ({} tried)",
                    response.tried_addrs.len()
                )),
            },
            (None, Some(e)) => parts.push(format!("exchange: {}", e)),
            (None, None) => parts.push("exchange: not attempted".to_string()),
        }

        if self.mapping_works {
            parts.push("mapping works".to_string());
        }

        parts.join(" → ")
    }
}

/// True when a mapping was announced and the responder reached exactly it
fn mapping_enabled_connect_back(
    request: Option<&ConnectBackRequest>,
    response: Option<&ConnectBackResult>,
) -> bool {
    let (Some(request), Some(response)) = (request, response) else {
        return false;
    };

    match (&request.port_mapped, &response.successful_addr) {
        (Some(mapped), Some(reached)) => response.success && mapped == reached,
        _ => false,
    }
}
