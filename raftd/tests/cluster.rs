//! End-to-end tests against real nodes served over loopback HTTP.

mod common;

use anyhow::Result;
use futures::future::join_all;
use raftd::bootstrap::ClusterOrigin;
use raftd::engine::Role;
use raftd::node::Node;

use common::{
    TestNode, eventually, get_bytes, get_log, test_config, wait_for_body, wait_for_log,
};

async fn post(client: &reqwest::Client, url: String, body: &'static str) -> Result<()> {
    client.post(url).body(body).send().await?.error_for_status()?;
    Ok(())
}

/// A founder plus two members that joined through it.
async fn three_nodes(dirs: &[tempfile::TempDir; 3]) -> Result<[TestNode; 3]> {
    let leader = TestNode::start(dirs[0].path(), None).await?;
    let second = TestNode::start(dirs[1].path(), Some(&leader)).await?;
    let third = TestNode::start(dirs[2].path(), Some(&leader)).await?;
    Ok([leader, second, third])
}

#[tokio::test]
async fn fresh_node_founds_a_cluster() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let node = TestNode::start(dir.path(), None).await?;
    let client = reqwest::Client::new();

    assert_eq!(node.origin, Some(ClusterOrigin::Initialized));
    assert_eq!(node.engine.state(), Role::Leader);
    assert_eq!(node.engine.leader().as_deref(), Some(node.name.as_str()));
    assert!(get_log(&client, &node).await?.is_empty());

    node.stop().await
}

#[tokio::test]
async fn second_node_joins_through_the_first() -> Result<()> {
    let leader_dir = tempfile::tempdir()?;
    let follower_dir = tempfile::tempdir()?;
    let leader = TestNode::start(leader_dir.path(), None).await?;
    let follower = TestNode::start(follower_dir.path(), Some(&leader)).await?;
    let client = reqwest::Client::new();

    assert_eq!(
        follower.origin,
        Some(ClusterOrigin::Joined {
            via: leader.name.clone()
        })
    );
    assert!(leader.engine.peers().contains(&follower.name));

    let leader_log = get_log(&client, &leader).await?;
    assert_eq!(leader_log.len(), 1);
    assert_eq!(leader_log[0].command_name, "join");

    let follower_log = wait_for_log(&client, &follower, 1).await?;
    assert_eq!(follower_log, leader_log);
    assert_eq!(follower.engine.state(), Role::Follower);

    follower.stop().await?;
    leader.stop().await
}

#[tokio::test]
async fn follower_writes_are_forwarded_and_replicated() -> Result<()> {
    let leader_dir = tempfile::tempdir()?;
    let follower_dir = tempfile::tempdir()?;
    let leader = TestNode::start(leader_dir.path(), None).await?;
    let follower = TestNode::start(follower_dir.path(), Some(&leader)).await?;
    let client = reqwest::Client::new();

    client
        .post(follower.url("/db/a"))
        .body("1")
        .send()
        .await?
        .error_for_status()?;

    wait_for_body(&client, &leader.url("/db/a"), b"1").await?;
    wait_for_body(&client, &follower.url("/db/a"), b"1").await?;
    assert_eq!(get_bytes(&client, &follower.url("/db/missing")).await?, b"");

    follower.stop().await?;
    leader.stop().await
}

#[tokio::test]
async fn files_replicate_as_raw_bytes() -> Result<()> {
    let leader_dir = tempfile::tempdir()?;
    let follower_dir = tempfile::tempdir()?;
    let leader = TestNode::start(leader_dir.path(), None).await?;
    let follower = TestNode::start(follower_dir.path(), Some(&leader)).await?;
    let client = reqwest::Client::new();
    let content = vec![0u8, 159, 146, 150, 255];

    client
        .post(follower.url("/files/blob.bin"))
        .body(content.clone())
        .send()
        .await?
        .error_for_status()?;

    wait_for_body(&client, &leader.url("/files/blob.bin"), &content).await?;
    wait_for_body(&client, &follower.url("/files/blob.bin"), &content).await?;
    assert!(follower_dir.path().join("files").join("blob.bin").exists());
    assert_eq!(get_bytes(&client, &leader.url("/files/nope")).await?, b"");

    follower.stop().await?;
    leader.stop().await
}

#[tokio::test]
async fn invalid_writes_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let node = TestNode::start(dir.path(), None).await?;
    let client = reqwest::Client::new();

    let not_utf8 = client
        .post(node.url("/db/a"))
        .body(vec![0xff, 0xfe])
        .send()
        .await?;
    assert_eq!(not_utf8.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(not_utf8.bytes().await?.is_empty());

    let nested = client
        .post(node.url("/files/..%2Finfo"))
        .body("x")
        .send()
        .await?;
    assert_eq!(nested.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    let bad_join = client.post(node.url("/join")).body("{}").send().await?;
    assert_eq!(bad_join.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    assert!(get_log(&client, &node).await?.is_empty());
    node.stop().await
}

#[tokio::test]
async fn join_is_idempotent_over_http() -> Result<()> {
    let leader_dir = tempfile::tempdir()?;
    let follower_dir = tempfile::tempdir()?;
    let leader = TestNode::start(leader_dir.path(), None).await?;
    let follower = TestNode::start(follower_dir.path(), Some(&leader)).await?;
    let client = reqwest::Client::new();

    let body = format!(r#"{{"name":"{}"}}"#, follower.name);
    client
        .post(leader.url("/join"))
        .body(body)
        .send()
        .await?
        .error_for_status()?;

    let peers = leader.engine.peers();
    assert_eq!(peers.len(), 2);
    assert_eq!(
        peers.iter().filter(|peer| **peer == follower.name).count(),
        1
    );

    follower.stop().await?;
    leader.stop().await
}

#[tokio::test]
async fn restarted_node_keeps_its_log_and_identity() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let client = reqwest::Client::new();
    let node = TestNode::start(dir.path(), None).await?;
    let name = node.name.clone();
    client
        .post(node.url("/db/k"))
        .body("v")
        .send()
        .await?
        .error_for_status()?;
    node.stop().await?;

    let reopened = Node::open(test_config(dir.path(), 1, None)).await?;
    assert_eq!(reopened.name(), name);
    assert!(!reopened.engine().is_log_empty());
    assert_eq!(reopened.bootstrap().await?, ClusterOrigin::Existing);
    assert_eq!(reopened.store().get("k"), Some("v".to_string()));
    eventually("re-election", || reopened.engine().state() == Role::Leader).await
}

#[tokio::test]
async fn join_through_a_follower_is_forwarded_to_the_leader() -> Result<()> {
    let dirs = [tempfile::tempdir()?, tempfile::tempdir()?, tempfile::tempdir()?];
    let leader = TestNode::start(dirs[0].path(), None).await?;
    let follower = TestNode::start(dirs[1].path(), Some(&leader)).await?;
    let third = TestNode::start(dirs[2].path(), Some(&follower)).await?;
    let client = reqwest::Client::new();

    assert_eq!(
        third.origin,
        Some(ClusterOrigin::Joined {
            via: follower.name.clone()
        })
    );
    assert!(leader.engine.peers().contains(&third.name));
    assert_eq!(leader.engine.state(), Role::Leader);

    let leader_log = get_log(&client, &leader).await?;
    assert_eq!(leader_log.len(), 2);
    for node in [&follower, &third] {
        assert_eq!(wait_for_log(&client, node, 2).await?, leader_log);
    }
    eventually("membership converges", || third.engine.peers().len() == 3).await?;

    third.stop().await?;
    follower.stop().await?;
    leader.stop().await
}

#[tokio::test]
async fn concurrent_writes_through_followers_converge() -> Result<()> {
    let dirs = [tempfile::tempdir()?, tempfile::tempdir()?, tempfile::tempdir()?];
    let [leader, second, third] = three_nodes(&dirs).await?;
    let client = reqwest::Client::new();

    let writes = (0..5).flat_map(|i| {
        [
            post(&client, second.url(&format!("/db/second-{i}")), "from-second"),
            post(&client, third.url(&format!("/db/third-{i}")), "from-third"),
        ]
    });
    for result in join_all(writes).await {
        result?;
    }

    for node in [&leader, &second, &third] {
        for i in 0..5 {
            wait_for_body(&client, &node.url(&format!("/db/second-{i}")), b"from-second").await?;
            wait_for_body(&client, &node.url(&format!("/db/third-{i}")), b"from-third").await?;
        }
    }
    let leader_log = wait_for_log(&client, &leader, 12).await?;
    for node in [&second, &third] {
        let log = wait_for_log(&client, node, leader_log.len()).await?;
        assert_eq!(log, leader_log);
    }

    third.stop().await?;
    second.stop().await?;
    leader.stop().await
}

#[tokio::test]
async fn writes_resume_after_the_leader_dies() -> Result<()> {
    let dirs = [tempfile::tempdir()?, tempfile::tempdir()?, tempfile::tempdir()?];
    let [leader, second, third] = three_nodes(&dirs).await?;
    let client = reqwest::Client::new();

    post(&client, second.url("/db/k"), "before").await?;
    wait_for_body(&client, &third.url("/db/k"), b"before").await?;
    eventually("all three vote", || {
        [&leader, &second, &third]
            .iter()
            .all(|node| node.engine.voters().len() == 3)
    })
    .await?;
    let old_leader = leader.name.clone();
    leader.stop().await?;

    post(&client, second.url("/db/k"), "after").await?;

    for node in [&second, &third] {
        wait_for_body(&client, &node.url("/db/k"), b"after").await?;
    }
    eventually("a survivor leads", || {
        [&second, &third]
            .iter()
            .any(|node| node.engine.state() == Role::Leader)
    })
    .await?;
    for node in [&second, &third] {
        assert_ne!(node.engine.leader(), Some(old_leader.clone()));
    }

    third.stop().await?;
    second.stop().await
}
