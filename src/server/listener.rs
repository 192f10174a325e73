use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::gateway::Gateway;
use crate::http::connection::Connection;

/// Bind the configured address and serve until the task is dropped.
pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let gateway = Arc::new(Gateway::from_config(cfg)?);
    let listener = TcpListener::bind(cfg.listen_addr()).await?;
    info!("API Gateway running on {}", cfg.listen_addr());

    serve(listener, gateway).await
}

/// Accept connections on an already bound listener, one task per connection.
pub async fn serve(listener: TcpListener, gateway: Arc<Gateway>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {}", peer);

        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, gateway);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
