use docdash_core::{Dashboard, DashboardEvent};

use crate::render::render_text;
use crate::Context;

const LOG_LINES: usize = 15;

/// Mount the dashboard and re-render on every change until Ctrl+C.
pub async fn run(ctx: Context, json: bool) -> anyhow::Result<()> {
    tracing::info!(base_url = %ctx.config.base_url, "Starting docdash watch");

    let (dashboard, mut events) = Dashboard::connect(ctx.config, ctx.confirm)?;

    tracing::info!("Watching. Press Ctrl+C to stop.");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        // Coalesce bursts into one render
        let mut burst = vec![event];
        while let Ok(event) = events.try_recv() {
            burst.push(event);
        }
        for event in &burst {
            match event {
                DashboardEvent::Notice(notice) => eprintln!("! {}", notice),
                DashboardEvent::ConnectionChanged(state) => {
                    tracing::info!(%state, "Log stream state changed")
                }
                _ => {}
            }
        }

        let model = dashboard.render().await;
        if json {
            println!("{}", serde_json::to_string(&model)?);
        } else {
            println!("{}", render_text(&model, LOG_LINES));
        }
    }

    tracing::info!("Shutting down...");
    dashboard.unmount().await;
    Ok(())
}
