mod common;

use redis::AsyncCommands;

#[tokio::test]
async fn rpush_and_lrange_preserve_order() {
    let server = common::TestServer::start().await;
    let mut conn = server.connection().await;

    let _: i64 = conn.rpush("mylist", &["a", "b", "c"]).await.unwrap();
    let items: Vec<String> = conn.lrange("mylist", 0, -1).await.unwrap();
    assert_eq!(items, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn lpop_emptying_the_list_removes_the_key() {
    let server = common::TestServer::start().await;
    let mut conn = server.connection().await;

    let _: i64 = conn.rpush("mylist", "only").await.unwrap();
    let popped: String = conn.lpop("mylist", None).await.unwrap();
    assert_eq!(popped, "only");

    let exists: bool = conn.exists("mylist").await.unwrap();
    assert!(!exists);
}

#[tokio::test]
async fn sadd_dedupes_and_sinter_intersects() {
    let server = common::TestServer::start().await;
    let mut conn = server.connection().await;

    let added: i64 = conn.sadd("s1", &["a", "b", "c"]).await.unwrap();
    assert_eq!(added, 3);
    let added_again: i64 = conn.sadd("s1", "a").await.unwrap();
    assert_eq!(added_again, 0);

    let _: i64 = conn.sadd("s2", &["b", "c", "d"]).await.unwrap();
    let mut inter: Vec<String> = conn.sinter(&["s1", "s2"]).await.unwrap();
    inter.sort();
    assert_eq!(inter, vec!["b", "c"]);
}

#[tokio::test]
async fn type_error_on_wrong_kind_of_value() {
    let server = common::TestServer::start().await;
    let mut conn = server.connection().await;

    let _: () = conn.set("astring", "value").await.unwrap();
    let result: redis::RedisResult<i64> = conn.rpush("astring", "x").await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().to_uppercase().contains("WRONGTYPE"));
}
