//! Serve command implementation.

use nskv_server::{KvServer, ServerConfig};

/// Runs the server until Ctrl-C.
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Opening a durable backend connects to the store synchronously.
    let server = tokio::task::spawn_blocking(move || KvServer::new(config)).await??;
    let listener = server.bind().await?;

    server
        .serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Ctrl-C received");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nskv_server::BackendConfig;
    use std::time::Duration;

    #[tokio::test(flavor = "current_thread")]
    async fn unreachable_store_is_reported() {
        // Bind then drop to get a port that is very likely closed.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap()).with_backend(
            BackendConfig::Durable {
                store_addr: format!("127.0.0.1:{port}"),
                connect_timeout: Duration::from_millis(200),
            },
        );

        let err = run(config).await.unwrap_err();
        assert!(err.to_string().contains("cannot connect"), "{err}");
    }
}
