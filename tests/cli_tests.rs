//! Integration tests for the vpnsync CLI
//!
//! Each test writes a registry fixture into a temp dir and runs the binary
//! against it.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a test vpnsync command
fn vpnsync() -> Command {
    Command::cargo_bin("vpnsync").unwrap()
}

fn write_registry(dir: &TempDir) -> PathBuf {
    let registry = json!({
        "routers": [{
            "id": "router-1",
            "gw_port": {
                "id": "gw-1",
                "fixed_ips": [
                    {"ip_address": "198.51.100.1"},
                    {"ip_address": "2001:db8::1"},
                    {"ip_address": "198.51.100.2"}
                ]
            }
        }, {
            "id": "router-bad",
            "gw_port": {"id": "gw-2", "fixed_ips": [{"ip_address": "198.51.100"}]}
        }],
        "services": [{
            "id": "svc-1",
            "router_id": "router-1",
            "external_v4_ip": "198.51.100.1",
            "ipsec_site_connections": [{
                "id": "conn-1",
                "vpnservice_id": "svc-1",
                "peer_address": "203.0.113.5",
                "peer_id": "peer.example.com",
                "ikepolicy": {"id": "ike-1"},
                "ipsecpolicy": {"id": "ipsec-1"},
                "peer_cidrs": [{"cidr": "10.2.0.0/24"}]
            }]
        }, {
            "id": "svc-new",
            "router_id": "router-1",
            "ipsec_site_connections": []
        }],
        "router_hosts": {"router-1": "host-a"}
    });

    let path = dir.path().join("registry.json");
    fs::write(&path, serde_json::to_string_pretty(&registry).unwrap()).unwrap();
    path
}

fn write_json(dir: &TempDir, name: &str, value: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
    path
}

#[test]
fn test_help_command() {
    vpnsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("VPN service lifecycle tool"));
}

#[test]
fn test_snapshot_command() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);

    let output = vpnsync()
        .arg("--registry").arg(&registry)
        .args(["snapshot", "--host", "host-a"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let snapshots: Value = serde_json::from_slice(&output.stdout).unwrap();
    let snapshots = snapshots.as_array().unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0]["id"], "svc-1");
    assert_eq!(snapshots[0]["external_ip"], "198.51.100.1");

    let conn = &snapshots[0]["ipsec_site_connections"][0];
    assert_eq!(conn["peer_id"], "@peer.example.com");
    assert_eq!(conn["external_ip"], "198.51.100.1");
    assert_eq!(conn["peer_cidrs"], json!(["10.2.0.0/24"]));
}

#[test]
fn test_snapshot_other_flavor_is_empty() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);

    vpnsync()
        .arg("--registry").arg(&registry)
        .args(["snapshot", "--host", "host-a", "--flavor", "pptp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_snapshot_invalid_flavor() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);

    vpnsync()
        .arg("--registry").arg(&registry)
        .args(["snapshot", "--host", "host-a", "--flavor", "wireguard"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("wireguard"));
}

#[test]
fn test_resolve_command() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);

    let output = vpnsync()
        .arg("--registry").arg(&registry)
        .args(["resolve", "--router", "router-1"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let ips: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(ips, json!({"v4": "198.51.100.1", "v6": "2001:db8::1"}));
}

#[test]
fn test_resolve_malformed_gateway() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);

    vpnsync()
        .arg("--registry").arg(&registry)
        .args(["resolve", "--router", "router-bad"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("198.51.100"));
}

#[test]
fn test_resolve_unknown_router() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);

    vpnsync()
        .arg("--registry").arg(&registry)
        .args(["resolve", "--router", "router-missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("router-missing"));
}

#[test]
fn test_replay_prints_notifications() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);
    let saved = dir.path().join("after.json");
    let events = write_json(&dir, "events.json", &json!([
        {"resource": "vpnservice", "operation": "create",
         "current": {"id": "svc-new", "router_id": "router-1"}},
        {"resource": "ikepolicy", "operation": "create", "current": {"id": "ike-2"}},
        {"resource": "ipsec_site_connection", "operation": "create",
         "current": {"id": "conn-2", "vpnservice_id": "svc-new", "peer_address": "2001:db8:ffff::5", "peer_id": "x"}}
    ]));

    let output = vpnsync()
        .arg("--registry").arg(&registry)
        .args(["replay", "--events"]).arg(&events)
        .arg("--save-registry").arg(&saved)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["method"], "vpnservice_updated");
    assert_eq!(lines[0]["topic"], "ipsec_agent");
    assert_eq!(lines[0]["router_id"], "router-1");

    let after: Value = serde_json::from_str(&fs::read_to_string(&saved).unwrap()).unwrap();
    let svc_new = after["services"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["id"] == "svc-new")
        .unwrap();
    assert_eq!(svc_new["external_v4_ip"], "198.51.100.1");
    assert_eq!(svc_new["external_v6_ip"], "2001:db8::1");
}

#[test]
fn test_replay_with_config() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);
    let config = dir.path().join("vpnsync.toml");
    fs::write(&config, "notify_on_vpnservice_create = true\n\n[topics]\nipsec = \"q-vpn-ipsec\"\n").unwrap();
    let events = write_json(&dir, "events.json", &json!([
        {"resource": "vpnservice", "operation": "create",
         "current": {"id": "svc-new", "router_id": "router-1"}}
    ]));

    vpnsync()
        .arg("--registry").arg(&registry)
        .arg("--config").arg(&config)
        .args(["replay", "--events"]).arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("q-vpn-ipsec"));
}

#[test]
fn test_replay_stops_at_failing_event() {
    let dir = TempDir::new().unwrap();
    let registry = write_registry(&dir);
    let events = write_json(&dir, "events.json", &json!([
        {"resource": "pptpconnection", "operation": "delete",
         "current": {"id": "pptp-1", "vpnservice_id": "svc-gone"}}
    ]));

    vpnsync()
        .arg("--registry").arg(&registry)
        .args(["replay", "--events"]).arg(&events)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Event #0 (delete pptpconnection) failed"));
}

#[test]
fn test_missing_registry_file() {
    vpnsync()
        .args(["--registry", "/nonexistent/registry.json", "resolve", "--router", "router-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load registry"));
}
