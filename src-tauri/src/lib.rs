use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rakshak::core::{
    config::ConfigManager,
    identity::SessionIdentity,
    model::PermissionState,
    session::{self, Route, SessionStore, LOGGED_IN_KEY},
    state::{DispatchSnapshot, ViewModel},
};
use rakshak::{AlertController, TriggerOutcome};
use serde::Serialize;
use serde_json::Value;
use tauri::{Emitter, Manager, State};

mod bridge;

use bridge::{BridgePort, DeviceBridge};

struct AppState {
    controller: Arc<AlertController>,
    bridge: Arc<DeviceBridge>,
    identity: Arc<SessionIdentity>,
    session: Mutex<SessionStore>,
}

/// Snapshot plus what the SOS screen should render for it
#[derive(Debug, Clone, Serialize)]
struct DispatchView {
    snapshot: DispatchSnapshot,
    view: ViewModel,
    /// True when the press was dropped because an attempt was in flight
    ignored: bool,
}

impl DispatchView {
    fn new(snapshot: DispatchSnapshot, ignored: bool) -> Self {
        let view = ViewModel::from(&snapshot);
        Self {
            snapshot,
            view,
            ignored,
        }
    }
}

#[tauri::command]
async fn enter_dispatch_screen(state: State<'_, AppState>) -> Result<PermissionState, String> {
    Ok(state.controller.enter_dispatch_screen().await)
}

#[tauri::command]
async fn trigger_sos(state: State<'_, AppState>) -> Result<DispatchView, String> {
    let outcome = state.controller.trigger().await;
    let ignored = outcome == TriggerOutcome::Ignored;
    Ok(DispatchView::new(state.controller.snapshot(), ignored))
}

#[tauri::command]
fn get_dispatch_state(state: State<'_, AppState>) -> DispatchView {
    DispatchView::new(state.controller.snapshot(), false)
}

#[tauri::command]
fn get_initial_route(state: State<'_, AppState>) -> Route {
    let store = state.session.lock().unwrap();
    session::initial_route(&store)
}

#[tauri::command]
fn set_logged_in(logged_in: bool, state: State<'_, AppState>) -> Result<(), String> {
    let mut store = state.session.lock().unwrap();
    let result = if logged_in {
        store.set(LOGGED_IN_KEY, "true")
    } else {
        store.remove(LOGGED_IN_KEY)
    };
    result.map_err(|e| e.to_string())
}

#[tauri::command]
fn set_current_user(email: Option<String>, state: State<'_, AppState>) {
    match email {
        Some(email) => state.identity.sign_in(email),
        None => state.identity.sign_out(),
    }
}

#[tauri::command]
fn device_response(id: u64, value: Option<Value>, error: Option<String>, state: State<'_, AppState>) -> bool {
    let reply = match error {
        Some(e) => Err(e),
        None => Ok(value.unwrap_or(Value::Null)),
    };
    state.bridge.resolve(id, reply)
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }

            // Initialize Config
            let config_dir = app.path().app_config_dir().unwrap_or(PathBuf::from("."));
            let settings = ConfigManager::new(config_dir).load();

            let data_dir = app.path().app_data_dir().unwrap_or(PathBuf::from("."));
            let session = SessionStore::open(data_dir);

            let bridge = Arc::new(DeviceBridge::new(app.handle().clone()));
            let identity = Arc::new(SessionIdentity::new());
            let controller = Arc::new(AlertController::new(
                &settings,
                Box::new(BridgePort(bridge.clone())),
                Box::new(BridgePort(bridge.clone())),
                Box::new(BridgePort(bridge.clone())),
                identity.clone(),
            ));

            // Forward every state change to the webview
            let handle = app.handle().clone();
            let mut rx = controller.subscribe();
            tauri::async_runtime::spawn(async move {
                while rx.changed().await.is_ok() {
                    let snapshot = rx.borrow_and_update().clone();
                    let _ = handle.emit("dispatch-state", DispatchView::new(snapshot, false));
                }
            });

            app.manage(AppState {
                controller,
                bridge,
                identity,
                session: Mutex::new(session),
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            enter_dispatch_screen,
            trigger_sos,
            get_dispatch_state,
            get_initial_route,
            set_logged_in,
            set_current_user,
            device_response
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
