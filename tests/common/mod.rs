use pg_cdc_sink::config::{Config, KafkaConfig, PostgresConfig, RetryConfig};
use std::env;
use tokio_postgres::{Client, NoTls};

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    let postgres = PostgresConfig {
        host: env::var("TEST_PG_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("TEST_PG_PORT")
            .unwrap_or_else(|_| "5432".to_string())
            .parse()
            .unwrap_or(5432),
        database: env::var("TEST_PG_DATABASE").unwrap_or_else(|_| "postgres".to_string()),
        username: env::var("TEST_PG_USERNAME").unwrap_or_else(|_| "postgres".to_string()),
        password: env::var("TEST_PG_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
        connect_timeout_secs: 10,
    };

    let kafka = KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        topic: format!("test_cdc_{}", std::process::id()),
        group_id: format!("test_group_{}", std::process::id()),
        prefetch: 10,
        session_timeout_ms: 10000,
        requeue_delay_ms: 100,
    };

    let retry = RetryConfig {
        max_attempts: 2,
        backoff_secs: 1,
    };

    Config {
        postgres,
        kafka,
        retry,
    }
}

/// Table name unique to this test process.
pub fn unique_table(prefix: &str) -> String {
    format!("{}_{}", prefix, std::process::id())
}

/// A plain client for verifying what the sink wrote.
pub async fn verification_client(config: &Config) -> Client {
    let (client, connection) = tokio_postgres::connect(&config.postgres_url(), NoTls)
        .await
        .expect("Failed to connect to PostgreSQL");

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("Connection error: {}", e);
        }
    });

    client
}

pub async fn drop_table(client: &Client, table: &str) {
    client
        .execute(&format!("DROP TABLE IF EXISTS \"{}\"", table), &[])
        .await
        .expect("Failed to drop table");
}
