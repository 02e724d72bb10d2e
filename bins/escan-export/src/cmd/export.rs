use escan_client::EscanClient;

use super::config::Effective;
use super::error::ExportError;
use super::writer;

/// Connect, subscribe once, save the first result, disconnect.
///
/// Order on success: unsubscribe, shutdown, then file I/O. A remote error is
/// returned as is: no unsubscribe, no file.
pub async fn run(eff: &Effective) -> Result<(), ExportError> {
    tracing::info!(endpoint = %eff.endpoint, "escan-export starting");

    let client = EscanClient::builder(&eff.endpoint)
        .on_connect(|| tracing::info!("Eulerscan client connected"))
        .on_disconnect(|| tracing::info!("Eulerscan client disconnected"))
        .build();
    client.connect().await?;

    let query = eff.query();
    let subscription = client.subscribe(&query)?;
    let id = subscription.id();
    tracing::info!(
        %id,
        topic = %query.topic,
        by = %query.by,
        health_max = query.health_max,
        limit = query.limit,
        "subscribed"
    );

    let patch = subscription.patch().await?;

    // One-shot query: release everything before touching the disk.
    client.unsubscribe(id)?;
    client.shutdown().await;

    let text = writer::render(&patch.result)?;
    if eff.echo {
        println!("{text}");
    }

    tracing::info!(path = %eff.output.display(), bytes = text.len(), "saving result");
    writer::write_result(&eff.output, &text).await?;
    tracing::info!(path = %eff.output.display(), "saved result");
    Ok(())
}
