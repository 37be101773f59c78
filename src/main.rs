use sessionguard::api;
use sessionguard::application_port::SessionService;
use sessionguard::domain_model::{User, UserId};
use sessionguard::logger::*;
use sessionguard::server::*;
use sessionguard::settings::*;
use std::fs;
use std::sync::Arc;
use tokio::signal;
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap()?;

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    logger.reload_from_config(&LogConfig::from(&project_settings.log))?;

    let server = Arc::new(Server::try_new(&project_settings).await?);

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(server.clone(), &project_settings.http).await,
        Command::Issue { user_id, role } => issue(&server, User::new(UserId(user_id), role)).await,
    };

    let shutdown_timeout = std::time::Duration::from_secs(100);
    match tokio::time::timeout(shutdown_timeout, server.shutdown()).await {
        Ok(_) => info!("server shutdown successfully"),
        Err(_) => error!("server shutdown timed out"),
    }

    result
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("could not register SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn serve(server: Arc<Server>, http: &Http) -> anyhow::Result<()> {
    let address: std::net::SocketAddr = http.address.parse()?;

    let api_v1 = warp::path("api")
        .and(warp::path("v1"))
        .and(api::v1::routes(server.clone()))
        .recover(api::v1::recover_error);

    match (&http.cert_path, &http.key_path) {
        (Some(cert_path), Some(key_path)) => {
            if !fs::metadata(cert_path)?.is_file() {
                return Err(anyhow::anyhow!("TLS cert is not a regular file: {:?}", cert_path));
            }
            if !fs::metadata(key_path)?.is_file() {
                return Err(anyhow::anyhow!("TLS key is not a regular file: {:?}", key_path));
            }
            let (bound, serving) = warp::serve(api_v1)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .bind_with_graceful_shutdown(address, shutdown_signal());
            info!(%bound, instance_id = server.instance_id(), "listening (tls)");
            serving.await;
        }
        _ => {
            let (bound, serving) =
                warp::serve(api_v1).try_bind_with_graceful_shutdown(address, shutdown_signal())?;
            info!(%bound, instance_id = server.instance_id(), "listening");
            serving.await;
        }
    }

    Ok(())
}

async fn issue(server: &Server, user: User) -> anyhow::Result<()> {
    let cancel = server.request_token();
    let tokens = server
        .session_service
        .issue(&user, &cancel)
        .await
        .map_err(|e| anyhow::anyhow!("failed to issue tokens: {}", e))?;
    println!("{}", serde_json::to_string_pretty(&tokens)?);
    Ok(())
}
