use tokio_util::sync::CancellationToken;

use events_api_server::signal::shutdown_signal;
use events_api_server::{api_router, metrics, serve};

use super::store::OpenedStore;
use crate::config::{ApiArgs, ApiSettings};
use crate::error::ServerError;

pub async fn run(args: ApiArgs) -> Result<(), ServerError> {
    let settings = ApiSettings::resolve(&args)?;
    let prometheus = metrics::install_recorder()?;

    let store = OpenedStore::open(&settings.store).await?;
    let token = CancellationToken::new();

    let mut server = tokio::spawn(serve(settings.port, api_router(store.reader(), prometheus), token.clone()));

    let result = tokio::select! {
        signal = shutdown_signal() => signal.map(|_| ()).map_err(ServerError::from),
        joined = &mut server => {
            store.close().await;
            return match joined {
                Ok(served) => served.map_err(ServerError::from),
                Err(e) => {
                    tracing::error!(error = %e, "api server task failed");
                    Ok(())
                }
            };
        }
    };

    token.cancel();
    match server.await {
        Ok(Err(e)) => tracing::error!(error = %e, "api server error"),
        Err(e) => tracing::error!(error = %e, "api server task failed"),
        Ok(Ok(())) => {}
    }
    store.close().await;
    tracing::info!("api server stopped");
    result
}
