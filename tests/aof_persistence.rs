mod common;

use redis::AsyncCommands;
use tempfile::TempDir;

#[tokio::test]
async fn data_survives_restart_via_aof_replay() {
    let dir = TempDir::new().expect("tempdir");
    let aof_path = common::aof_path_in(&dir);

    let first = common::TestServer::start_with_aof_path(&aof_path).await;
    {
        let mut conn = first.connection().await;
        let _: () = conn.set("persisted", "value").await.unwrap();
        let _: i64 = conn.rpush("mylist", &["x", "y"]).await.unwrap();
    }
    first.shutdown_and_wait().await;

    let second = common::TestServer::start_with_aof_path(&aof_path).await;
    let mut conn = second.connection().await;
    let value: String = conn.get("persisted").await.unwrap();
    assert_eq!(value, "value");
    let items: Vec<String> = conn.lrange("mylist", 0, -1).await.unwrap();
    assert_eq!(items, vec!["x", "y"]);
}
