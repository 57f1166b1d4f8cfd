use anyhow::Result;
use tokio::signal::unix;

pub const TERMINATION_SIGNALS: [libc::c_int; 4] =
    [libc::SIGINT, libc::SIGTERM, libc::SIGQUIT, libc::SIGHUP];

/// Resolves once any of [`TERMINATION_SIGNALS`] is delivered.
pub async fn shutdown_signal() {
    match any_signal(TERMINATION_SIGNALS).await {
        Ok(signal) => tracing::info!(?signal, "received termination signal"),
        Err(e) => tracing::error!("failed to wait for termination signal: {e:?}"),
    }
}

pub async fn any_signal<I, T>(signals: I) -> Result<unix::SignalKind>
where
    I: IntoIterator<Item = T>,
    T: Into<unix::SignalKind> + Send + 'static,
{
    let mut streams = Vec::new();
    for signal in signals {
        let kind = signal.into();
        streams.push((kind, unix::signal(kind)?));
    }

    let waiters = streams.iter_mut().map(|(kind, stream)| {
        let kind = *kind;
        Box::pin(async move {
            stream.recv().await;
            kind
        })
    });

    let (kind, _, _) = futures_util::future::select_all(waiters).await;
    Ok(kind)
}
