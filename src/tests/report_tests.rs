use super::support::{ma, peer_id};
use crate::connectivity::{MappingProtocol, NatMappingResult};
use crate::protocol::{ConnectBackRequest, ConnectBackResult};
use crate::report::{DiagnosticReport, Findings, HttpReport};
use chrono::Utc;
use uuid::Uuid;

fn aggregate(findings: Findings) -> DiagnosticReport {
    let now = Utc::now();
    DiagnosticReport::aggregate(Uuid::new_v4(), now, now, findings)
}

fn mapped(addr: &str) -> NatMappingResult {
    NatMappingResult::Mapped {
        external_addr: ma(addr),
        protocol: MappingProtocol::NATPMP,
    }
}

#[test]
fn test_mapping_works_when_connect_back_hits_mapped_address() {
    let mut request = ConnectBackRequest::new(peer_id(), ma("/ip4/192.168.1.20/tcp/9000"));
    request.port_mapped = Some(ma("/ip4/203.0.113.5/tcp/9000"));

    let report = aggregate(Findings {
        rendezvous_reachable: true,
        nat: Some(mapped("/ip4/203.0.113.5/tcp/9000")),
        request: Some(request),
        response: Some(ConnectBackResult::success(
            ma("/ip4/203.0.113.5/tcp/51234"),
            ma("/ip4/203.0.113.5/tcp/9000"),
            vec![
                ma("/ip4/192.168.1.20/tcp/9000"),
                ma("/ip4/203.0.113.5/tcp/9000"),
            ],
        )),
        ..Findings::default()
    });

    assert!(report.mapping_works);
    assert!(report.connect_back_succeeded());
    assert!(!report.cgnat_detected);
    assert!(report.summary().contains("mapping works"));
}

#[test]
fn test_reachable_without_mapping() {
    let report = aggregate(Findings {
        rendezvous_reachable: true,
        have_public_ip: true,
        nat: Some(NatMappingResult::failed("No gateway found")),
        request: Some(ConnectBackRequest::new(
            peer_id(),
            ma("/ip4/203.0.113.5/tcp/9000"),
        )),
        response: Some(ConnectBackResult::success(
            ma("/ip4/203.0.113.5/tcp/51234"),
            ma("/ip4/203.0.113.5/tcp/9000"),
            vec![ma("/ip4/203.0.113.5/tcp/9000")],
        )),
        ..Findings::default()
    });

    assert!(!report.mapping_works);
    assert!(report.connect_back_succeeded());
    assert!(report.have_public_ip);
    assert_eq!(
        report.nat.as_ref().and_then(|n| n.failure_reason()),
        Some("No gateway found")
    );
}

#[test]
fn test_success_on_other_address_is_not_mapping() {
    let mut request = ConnectBackRequest::new(peer_id(), ma("/ip4/192.168.1.20/tcp/9000"));
    request.port_mapped = Some(ma("/ip4/203.0.113.5/tcp/40000"));

    let report = aggregate(Findings {
        rendezvous_reachable: true,
        nat: Some(mapped("/ip4/203.0.113.5/tcp/40000")),
        request: Some(request),
        response: Some(ConnectBackResult::success(
            ma("/ip4/203.0.113.5/tcp/51234"),
            ma("/ip4/192.168.1.20/tcp/9000"),
            vec![],
        )),
        ..Findings::default()
    });

    assert!(!report.mapping_works);
}

#[test]
fn test_minimal_report_when_rendezvous_unreachable() {
    let report = aggregate(Findings {
        outbound_http: HttpReport {
            odd_port_connection: Some("connection refused".to_string()),
            port_443_connection: Some("https connections appear to be MITMed".to_string()),
        },
        ..Findings::default()
    });

    assert!(!report.rendezvous_reachable);
    assert!(report.nat.is_none());
    assert!(report.request.is_none());
    assert!(report.response.is_none());
    assert!(!report.mapping_works);

    let summary = report.summary();
    assert!(summary.contains("rendezvous: unreachable"));
    assert!(summary.contains("MITMed"));
}

#[test]
fn test_cgnat_flag_from_mapped_address() {
    let report = aggregate(Findings {
        rendezvous_reachable: true,
        nat: Some(mapped("/ip4/100.64.12.34/tcp/9000")),
        ..Findings::default()
    });

    assert!(report.cgnat_detected);
    assert!(report.summary().contains("CGNAT"));
}

#[test]
fn test_exchange_error_recorded() {
    let report = aggregate(Findings {
        rendezvous_reachable: true,
        request: Some(ConnectBackRequest::new(
            peer_id(),
            ma("/ip4/192.168.1.20/tcp/9000"),
        )),
        exchange_error: Some("Exchange unreachable: no route".to_string()),
        ..Findings::default()
    });

    assert!(!report.connect_back_succeeded());
    assert!(report.summary().contains("exchange: Exchange unreachable"));
}

#[test]
fn test_report_json() {
    let report = aggregate(Findings::default());
    let json = report.to_json_pretty().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["run_id"], report.run_id.to_string());
    assert_eq!(value["rendezvous_reachable"], false);
    assert!(value["nat"].is_null());

    let decoded: DiagnosticReport = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, report);
}
