use std::time::Duration;

use anyhow::Result;
use ringwatch_manager::{ManagerConfig, RingMembership};
use ringwatch_membership::{DiscoveryConfig, DiscoveryRing, MembershipError};
use test_helper::FixtureServer;

fn state_json(instances: &[(&str, &str, i64)]) -> String {
    let services = instances
        .iter()
        .map(|(id, ip, port)| {
            format!(
                r#""{id}": {{
                    "ID": "{id}",
                    "Name": "awesome-svc",
                    "Hostname": "beowulf",
                    "Ports": [{{"Type": "tcp", "Port": {port}, "ServicePort": 8000, "IP": "{ip}"}}],
                    "Status": 0
                }}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",");

    format!(r#"{{"Servers": {{"beowulf": {{"Name": "beowulf", "Services": {{{services}}}}}}}}}"#)
}

fn pushed_event(instances: &[(&str, &str, i64)]) -> String {
    format!(
        r#"{{"State": {}, "ChangeEvent": {{"Service": {{"Name": "awesome-svc"}}, "PreviousStatus": 3}}}}"#,
        state_json(instances),
    )
}

fn config() -> DiscoveryConfig {
    DiscoveryConfig::new("awesome-svc", 8000)
        .with_bootstrap_timeout(Duration::from_secs(2))
        .with_manager_config(ManagerConfig::default().with_ping_timeout(Duration::from_secs(1)))
}

async fn wait_for_nodes(ring: &DiscoveryRing, count: usize) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while ring.manager().nodes().await?.len() != count {
        assert!(tokio::time::Instant::now() < deadline, "Ring did not reach {count} nodes.");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_from_seed_url() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let server = FixtureServer::serve(200, state_json(&[("deadbeef0001", "10.0.0.5", 32763)]));
    let ring = DiscoveryRing::connect(config().with_seed_url(server.url("/api/state.json"))).await?;

    assert_eq!(server.hits(), 1);
    assert_eq!(ring.members().await, vec!["10.0.0.5:32763"]);
    assert_eq!(ring.manager().get_node("grendel").await?, "10.0.0.5:32763");

    ring.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_failure_fails_connect() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let server = FixtureServer::serve(500, "OMG it's broken");
    let result = DiscoveryRing::connect(config().with_seed_url(server.url("/api/state.json"))).await;

    assert!(matches!(result, Err(MembershipError::Bootstrap { .. })));
    assert_eq!(server.hits(), 1);
    Ok(())
}

#[tokio::test]
async fn test_pushed_updates_are_applied() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let ring = DiscoveryRing::connect(config()).await?;
    assert!(ring.members().await.is_empty());

    let accepted = ring.receiver().enqueue_update(
        pushed_event(&[("a", "10.0.0.5", 32763), ("b", "10.0.0.6", 32763)]).as_bytes(),
    )?;
    assert!(accepted);
    wait_for_nodes(&ring, 2).await?;

    ring.receiver()
        .enqueue_update(pushed_event(&[("b", "10.0.0.6", 32763)]).as_bytes())?;
    wait_for_nodes(&ring, 1).await?;
    assert_eq!(ring.members().await, vec!["10.0.0.6:32763"]);
    assert_eq!(ring.statistics().num_nodes_removed(), 1);

    ring.shutdown();
    let error = ring
        .receiver()
        .enqueue_update(pushed_event(&[]).as_bytes())
        .unwrap_err();
    assert!(matches!(error, MembershipError::ReceiverClosed));
    assert!(ring.manager().get_node("grendel").await.is_err());
    Ok(())
}
