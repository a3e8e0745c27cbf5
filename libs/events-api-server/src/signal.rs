//! Shutdown signal handling shared by the binaries.

/// Wait for SIGINT or SIGTERM and return the signal name.
#[cfg(unix)]
pub async fn shutdown_signal() -> Result<&'static str, std::io::Error> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    tracing::info!(signal = name, "signal received");
    Ok(name)
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> Result<&'static str, std::io::Error> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "signal received");
    Ok("ctrl-c")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_resolves_with_its_name() {
        let mut waiting = Box::pin(shutdown_signal());
        // First poll installs the handlers.
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut waiting).await.is_err());

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let name = tokio::time::timeout(Duration::from_secs(5), waiting).await.unwrap().unwrap();
        assert_eq!(name, "SIGTERM");
    }
}
