use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::Path;
use tauri::State;

use microv_capture::CaptureStatus;
use microv_state::prompts::QuickPrompt;
use microv_state::{Mode, TranscriptEntry, ViewFlags};
use microv_vision::{GestureEvent, GestureOutcome, SurfaceSize};

use crate::session::Session;

pub struct SessionState(pub tokio::sync::Mutex<Session>);

/// Guess the MIME type of a picked file from its extension
fn mime_for_path(path: &Path) -> String {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

/// Load an image handed over by the webview (drag and drop, file input)
#[tauri::command]
pub async fn load_static_image(
    bytes: Vec<u8>,
    mime: String,
    state: State<'_, SessionState>,
) -> Result<Mode, String> {
    let mut session = state.0.lock().await;
    session
        .load_static_image(bytes, &mime)
        .await
        .map_err(|e| e.to_string())?;
    Ok(session.mode())
}

/// Load an image from a path chosen in the native file dialog
#[tauri::command]
pub async fn open_image_file(path: String, state: State<'_, SessionState>) -> Result<Mode, String> {
    let path = Path::new(&path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let mime = mime_for_path(path);
    tracing::info!("Opening {} as {}", path.display(), mime);

    let mut session = state.0.lock().await;
    session
        .load_static_image(bytes, &mime)
        .await
        .map_err(|e| e.to_string())?;
    Ok(session.mode())
}

#[tauri::command]
pub async fn start_camera(state: State<'_, SessionState>) -> Result<Mode, String> {
    let mut session = state.0.lock().await;
    session.start_camera().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn stop_camera(state: State<'_, SessionState>) -> Result<Mode, String> {
    let mut session = state.0.lock().await;
    Ok(session.stop_camera().await)
}

#[tauri::command]
pub async fn toggle_scan(state: State<'_, SessionState>) -> Result<(), String> {
    let mut session = state.0.lock().await;
    session.toggle_scan().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn toggle_streaming(state: State<'_, SessionState>) -> Result<bool, String> {
    let mut session = state.0.lock().await;
    session.toggle_streaming().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn toggle_region_selector(
    surface: Option<SurfaceSize>,
    state: State<'_, SessionState>,
) -> Result<bool, String> {
    let mut session = state.0.lock().await;
    session
        .toggle_region_selector(surface)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn handle_gesture(
    event: GestureEvent,
    state: State<'_, SessionState>,
) -> Result<GestureOutcome, String> {
    let mut session = state.0.lock().await;
    session.handle_gesture(event).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_surface_size(
    width: f64,
    height: f64,
    state: State<'_, SessionState>,
) -> Result<bool, String> {
    let mut session = state.0.lock().await;
    Ok(session.set_surface_size(SurfaceSize::new(width, height)))
}

#[tauri::command]
pub async fn quick_prompt(kind: QuickPrompt, state: State<'_, SessionState>) -> Result<(), String> {
    let mut session = state.0.lock().await;
    session
        .quick_prompt(kind)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn toggle_chat_panel(state: State<'_, SessionState>) -> Result<bool, String> {
    let mut session = state.0.lock().await;
    Ok(session.toggle_chat_panel())
}

#[tauri::command]
pub async fn get_view_state(
    state: State<'_, SessionState>,
) -> Result<serde_json::Value, String> {
    let session = state.0.lock().await;
    let flags: ViewFlags = session.flags();
    Ok(serde_json::json!({
        "mode": session.mode(),
        "flags": flags,
        "streaming": session.streaming_active(),
    }))
}

#[tauri::command]
pub async fn get_transcript(
    state: State<'_, SessionState>,
) -> Result<Vec<TranscriptEntry>, String> {
    let session = state.0.lock().await;
    Ok(session.transcript())
}

#[tauri::command]
pub async fn get_camera_status(state: State<'_, SessionState>) -> Result<CaptureStatus, String> {
    let session = state.0.lock().await;
    Ok(session.camera_status().unwrap_or_default())
}

/// Latest camera frame as base64 JPEG, or null when no camera is running
#[tauri::command]
pub async fn get_preview_frame(
    state: State<'_, SessionState>,
) -> Result<Option<String>, String> {
    let session = state.0.lock().await;
    let frame = session.preview_frame().await.map_err(|e| e.to_string())?;
    Ok(frame.map(|jpeg| BASE64.encode(jpeg)))
}
