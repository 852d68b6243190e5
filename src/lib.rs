pub mod analysis;
#[cfg(feature = "desktop")]
mod commands;
pub mod config;
pub mod events;
pub mod session;
pub mod streaming;

pub use config::ClientConfig;
pub use events::{EventSink, SourceId, UiEvent};
pub use session::{Services, Session, SessionError};

/// Default `RUST_LOG` filter
pub const DEFAULT_LOG_FILTER: &str =
    "microv=debug,microv_lib=debug,microv_capture=debug,microv_vision=debug,microv_remote=debug";

#[cfg(feature = "desktop")]
pub fn run() {
    use commands::SessionState;
    use tauri::{Emitter, Manager};
    use tokio::sync::broadcast::error::RecvError;

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(api = %config.api_url, ws = %config.ws_url, "Starting microv");

    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(move |app| {
            let session = Session::new(config.clone(), Services::from_config(&config));

            // Forward every session event to the webview
            let mut ui_events = session.subscribe();
            let app_handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                loop {
                    match ui_events.recv().await {
                        Ok(event) => {
                            let _ = app_handle.emit(events::EVENT_NAME, &event);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("UI event forwarder lagged, {} events dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            app.manage(SessionState(tokio::sync::Mutex::new(session)));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::session::load_static_image,
            commands::session::open_image_file,
            commands::session::start_camera,
            commands::session::stop_camera,
            commands::session::toggle_scan,
            commands::session::toggle_streaming,
            commands::session::toggle_region_selector,
            commands::session::handle_gesture,
            commands::session::set_surface_size,
            commands::session::quick_prompt,
            commands::session::toggle_chat_panel,
            commands::session::get_view_state,
            commands::session::get_transcript,
            commands::session::get_camera_status,
            commands::session::get_preview_frame,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| {
            if let tauri::RunEvent::Exit = event {
                let state = app_handle.state::<SessionState>();
                tauri::async_runtime::block_on(async {
                    state.0.lock().await.shutdown().await;
                });
            }
        });
}
