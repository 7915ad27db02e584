// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::*;
use crate::common_test::{closed_addr, spawn_check_server, CheckBehavior, FakeMaster};
use crate::protocol::{RegisterRequest, ServiceHealth};

fn multi(masters: Vec<FakeMaster>) -> MultiClient<FakeMaster> {
    MultiClient::from_clients(
        masters
            .into_iter()
            .map(|m| (m.name.to_string(), m))
            .collect(),
    )
}

#[tokio::test]
async fn test_reads_fail_over_in_order() {
    let m1 = FakeMaster::new("m1", false);
    let m2 = FakeMaster::new("m2", true);
    let m3 = FakeMaster::new("m3", true);
    let (c1, c2, c3) = (m1.calls.clone(), m2.calls.clone(), m3.calls.clone());
    let client = multi(vec![m1, m2, m3]);

    let status = client.list().await.expect("m2 should answer");
    assert_eq!(vec!["m2".to_string()], status.masters);
    assert_eq!(
        vec!["m2".to_string()],
        client.get_active_nodes("search").await.expect("m2 should answer")
    );
    assert_eq!(
        ServiceHealth::Ok,
        client
            .get_services_status()
            .await
            .expect("m2 should answer")["search"]
            .status
    );
    assert_eq!(
        None,
        client
            .get_active_node_random("search")
            .await
            .expect("m2 should answer")
    );

    assert_eq!(4, c1.load(Ordering::SeqCst));
    assert_eq!(4, c2.load(Ordering::SeqCst));
    assert_eq!(0, c3.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_reads_surface_last_error_when_all_fail() {
    let client = multi(vec![FakeMaster::new("m1", false), FakeMaster::new("m2", false)]);
    match client.get_service_status("search").await {
        Err(ClientErr::AllMastersFailed(last)) => {
            assert!(matches!(*last, ClientErr::UnexpectedStatus(503)))
        }
        other => panic!("Expected AllMastersFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_masters() {
    let client = multi(vec![]);
    assert!(matches!(client.list().await, Err(ClientErr::NoMasters)));
    assert!(matches!(
        client
            .register(&RegisterRequest::new("n:1", ["search"]))
            .await,
        Err(ClientErr::NoMasters)
    ));
}

#[tokio::test]
async fn test_register_is_broadcast() {
    let m1 = FakeMaster::new("m1", false);
    let m2 = FakeMaster::new("m2-up", true);
    let m3 = FakeMaster::new("m3", true);
    let (r2, r3) = (m2.registered.clone(), m3.registered.clone());
    let c1 = m1.calls.clone();
    let client = multi(vec![m1, m2, m3]);

    let status = client
        .register(&RegisterRequest::new("http://n:1", ["search"]))
        .await
        .expect("Two masters accepted");
    // the first accepting master, in configured order, answers
    assert_eq!(5, status.latest_check);

    assert_eq!(1, c1.load(Ordering::SeqCst));
    assert!(r2.lock().contains_key("http://n:1"));
    assert!(r3.lock().contains_key("http://n:1"));
}

#[tokio::test]
async fn test_register_fails_when_no_master_accepts() {
    let client = multi(vec![FakeMaster::new("m1", false), FakeMaster::new("m2", false)]);
    assert!(matches!(
        client
            .register(&RegisterRequest::new("http://n:1", ["search"]))
            .await,
        Err(ClientErr::AllMastersFailed(_))
    ));
}

#[tokio::test]
async fn test_unregister_is_broadcast() {
    let m1 = FakeMaster::new("m1", true);
    let m2 = FakeMaster::new("m2", true);
    m2.registered
        .lock()
        .insert("http://n:1".to_string(), BTreeSet::new());
    let r2 = m2.registered.clone();
    let client = multi(vec![m1, m2]);

    assert!(client.unregister("http://n:1").await.expect("Masters are up"));
    assert!(r2.lock().is_empty());
    assert!(!client.unregister("http://n:1").await.expect("Masters are up"));
}

#[tokio::test]
async fn test_check_is_not_aggregated() {
    let client = multi(vec![FakeMaster::new("m1", true)]);
    assert!(matches!(
        client.check("token").await,
        Err(ClientErr::NotImplemented)
    ));
}

#[test]
fn test_client_urls() {
    let client =
        ClusterClient::new("Master-1:9099", Duration::from_secs(1)).expect("Valid address");
    assert_eq!("http://master-1:9099/", client.base_url().as_str());
    assert_eq!(
        "http://master-1:9099/cluster",
        client.url(&[]).expect("Valid url").as_str()
    );
    assert_eq!(
        "http://master-1:9099/cluster/services/active/random/web%20search",
        client
            .url(&["services", "active", "random", "web search"])
            .expect("Valid url")
            .as_str()
    );

    assert!(matches!(
        ClusterClient::new("http://", Duration::from_secs(1)),
        Err(ClientErr::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn test_client_check_handshake() {
    let healthy = spawn_check_server(CheckBehavior::Healthy).await;
    let client = ClusterClient::new(&healthy.to_string(), Duration::from_secs(5))
        .expect("Valid address");
    assert!(client.check("abc").await.expect("Server is up"));

    let wrong = spawn_check_server(CheckBehavior::WrongToken).await;
    let client =
        ClusterClient::new(&wrong.to_string(), Duration::from_secs(5)).expect("Valid address");
    assert!(!client.check("abc").await.expect("Server is up"));
}

#[tokio::test]
async fn test_client_transport_error() {
    let closed = closed_addr().await;
    let client =
        ClusterClient::new(&closed.to_string(), Duration::from_secs(5)).expect("Valid address");
    assert!(matches!(client.list().await, Err(ClientErr::Transport(_))));
}
