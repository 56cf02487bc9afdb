//! ShellApi - the application context and the operations the UI calls
//!
//! One `ShellApi` is built at startup and shared by handle. Every operation
//! that touches the data dir goes through its PersistenceQueue; waited
//! operations are bounded by the configured timeouts so no caller hangs on
//! the worker.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chomkastore::{AssetPayload, PersistTask, PersistenceQueue, StateStore, StoreError, TaskKind, save_asset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::bridge::{Bridge, Notification, notify_or_log};
use crate::config::Config;
use crate::lifecycle::LifecycleController;

/// Reply shape for operations the UI awaits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            success: true,
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn queued() -> Self {
        Self {
            success: true,
            queued: Some(true),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<StoreError> for ApiResponse {
    fn from(e: StoreError) -> Self {
        Self::failed(e.to_string())
    }
}

/// Explicit application context shared by the host and the lifecycle
pub struct ShellApi {
    config: RwLock<Config>,
    config_path: PathBuf,
    store: RwLock<StateStore>,
    queue: PersistenceQueue,
    bridge: Arc<dyn Bridge>,
    lifecycle: Arc<LifecycleController>,
}

impl ShellApi {
    /// Build the context; `config.data_dir` must already be resolved
    pub fn new(
        config: Config,
        config_path: PathBuf,
        bridge: Arc<dyn Bridge>,
        lifecycle: Arc<LifecycleController>,
    ) -> Result<Self, StoreError> {
        debug!(data_dir = %config.data_dir.display(), "ShellApi::new: called");
        let store = StateStore::open(config.data_dir.clone());
        let queue = PersistenceQueue::spawn()?;
        Ok(Self {
            config: RwLock::new(config),
            config_path,
            store: RwLock::new(store),
            queue,
            bridge,
            lifecycle,
        })
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    pub fn config(&self) -> Config {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Snapshot of the store for the current data dir
    pub fn store(&self) -> StateStore {
        self.store.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.store().data_dir().to_path_buf()
    }

    /// Dispatch a UI call by method name; `params` is a JSON object
    pub async fn call(&self, method: &str, params: Value) -> Value {
        debug!(%method, "call: called");
        match method {
            "save_file" | "save_file_sync" => match parse::<SaveFileParams>(method, params) {
                Ok(p) => {
                    let sync = p.sync || method == "save_file_sync";
                    self.save_file(p.name, p.content, sync).await.into_value()
                }
                Err(r) => r.into_value(),
            },
            "read_file" => match parse::<NameParams>(method, params) {
                Ok(p) => self.read_file(p.name).await.map(Value::String).unwrap_or(Value::Null),
                Err(r) => r.into_value(),
            },
            "get_state" => match parse::<KeyParams>(method, params) {
                Ok(p) => self.get_state(p.key).await.unwrap_or(Value::Null),
                Err(r) => r.into_value(),
            },
            "save_state" => match parse::<SaveStateParams>(method, params) {
                Ok(p) => self.save_state(p.key, p.value).await.into_value(),
                Err(r) => r.into_value(),
            },
            "save_asset" => match parse::<SaveAssetParams>(method, params) {
                Ok(p) => self.save_asset(p.data, p.id).await.into_value(),
                Err(r) => r.into_value(),
            },
            "update_coords" => match parse::<CoordsParams>(method, params) {
                Ok(p) => self.update_coords(p.id, p.x, p.y).into_value(),
                Err(r) => r.into_value(),
            },
            "choose_folder" => self.choose_folder().await.into_value(),
            "pick_and_save_image" | "pick_and_import_image" => self.pick_and_import_image().await.into_value(),
            "get_data_url" => Value::String(self.get_data_url()),
            "log_js_error" => match parse::<JsErrorParams>(method, params) {
                Ok(p) => self.log_js_error(&p.message, &p.stack).into_value(),
                Err(r) => r.into_value(),
            },
            "quit" | "quit_finally" => self.quit().into_value(),
            _ => {
                warn!(%method, "Unknown API method");
                ApiResponse::failed(format!("Unknown method: {}", method)).into_value()
            }
        }
    }

    /// Write a named file in the data dir
    ///
    /// With `sync` the caller waits (bounded) for the outcome. Without it the
    /// save is queued and its outcome is reported to the UI by notification.
    pub async fn save_file(&self, name: String, content: String, sync: bool) -> ApiResponse {
        debug!(%name, sync, "save_file: called");
        let store = self.store();
        let target = name.clone();

        if sync {
            let timeout = self.config().timeouts.save();
            return match self
                .queue
                .submit_and_wait(TaskKind::SaveFile, target, move || store.write_file(&name, &content), timeout)
                .await
            {
                Ok(path) => ApiResponse::with_path(path.display().to_string()),
                Err(e) => ApiResponse::failed(format!("Save timed out or failed: {}", e)),
            };
        }

        let bridge = Arc::clone(&self.bridge);
        let notify_name = name.clone();
        let (task, handle) = PersistTask::with_completion(
            TaskKind::SaveFile,
            target,
            move || store.write_file(&name, &content),
            move |result: &Result<PathBuf, StoreError>| {
                let notification = match result {
                    Ok(_) => Notification::SaveComplete { name: notify_name },
                    Err(e) => Notification::SaveError {
                        name: notify_name,
                        message: e.to_string(),
                    },
                };
                notify_or_log(bridge.as_ref(), &notification);
            },
        );
        self.queue.enqueue(task);
        handle.detach();
        ApiResponse::queued()
    }

    /// Queued read; `desktop.json` comes back with cached positions overlaid
    pub async fn read_file(&self, name: String) -> Option<String> {
        debug!(%name, "read_file: called");
        let store = self.store();
        let timeout = self.config().timeouts.read();
        let target = name.clone();
        match self
            .queue
            .submit_and_wait(TaskKind::ReadFile, target, move || Ok(store.read_file(&name)), timeout)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "read_file: failed");
                None
            }
        }
    }

    pub async fn get_state(&self, key: String) -> Option<Value> {
        debug!(%key, "get_state: called");
        let store = self.store();
        let timeout = self.config().timeouts.read();
        let target = key.clone();
        match self
            .queue
            .submit_and_wait(TaskKind::GetState, target, move || Ok(store.get(&key)), timeout)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "get_state: failed");
                None
            }
        }
    }

    pub async fn save_state(&self, key: String, value: Value) -> ApiResponse {
        debug!(%key, "save_state: called");
        let store = self.store();
        let timeout = self.config().timeouts.save();
        let target = key.clone();
        match self
            .queue
            .submit_and_wait(TaskKind::SaveState, target, move || store.save(&key, value), timeout)
            .await
        {
            Ok(()) => ApiResponse::ok(),
            Err(e) => e.into(),
        }
    }

    /// Decode and store a base64 (optionally `data:` prefixed) asset
    pub async fn save_asset(&self, data: String, id: String) -> ApiResponse {
        debug!(%id, bytes = data.len(), "save_asset: called");
        let data_dir = self.data_dir();
        let timeout = self.config().timeouts.asset();
        let target = id.clone();
        let job = move || {
            let payload = AssetPayload::from_data_uri(&data)?;
            save_asset(&data_dir, &id, &payload)
        };
        match self.queue.submit_and_wait(TaskKind::SaveAsset, target, job, timeout).await {
            Ok(path) => ApiResponse::with_path(path),
            Err(e) => e.into(),
        }
    }

    /// Fire-and-forget drag update
    pub fn update_coords(&self, id: String, x: f64, y: f64) -> ApiResponse {
        debug!(%id, x, y, "update_coords: called");
        let store = self.store();
        let target = id.clone();
        self.queue
            .submit(TaskKind::UpdateCoords, target, move || store.update_coords(&id, x, y))
            .detach();
        ApiResponse::ok()
    }

    /// Ask the host for a new data dir and switch to it
    pub async fn choose_folder(&self) -> ApiResponse {
        debug!("choose_folder: called");
        let bridge = Arc::clone(&self.bridge);
        let chosen = match tokio::task::spawn_blocking(move || bridge.choose_folder()).await {
            Ok(chosen) => chosen,
            Err(e) => return ApiResponse::failed(e.to_string()),
        };
        let Some(dir) = chosen else {
            return ApiResponse::failed("No folder selected");
        };

        info!(dir = %dir.display(), "Data directory changed");
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = StateStore::open(dir.clone());
        let config = {
            let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
            config.data_dir = dir.clone();
            config.clone()
        };

        let config_path = self.config_path.clone();
        self.queue
            .submit(TaskKind::SaveConfig, config_path.display().to_string(), move || {
                config.save(&config_path).map_err(|e| StoreError::io(&config_path, std::io::Error::other(e.to_string())))
            })
            .detach();

        ApiResponse::with_path(dir.display().to_string())
    }

    /// Ask the host for an image and copy it in as a write-once asset
    pub async fn pick_and_import_image(&self) -> ApiResponse {
        debug!("pick_and_import_image: called");
        let bridge = Arc::clone(&self.bridge);
        let picked = match tokio::task::spawn_blocking(move || bridge.pick_image()).await {
            Ok(picked) => picked,
            Err(e) => return ApiResponse::failed(e.to_string()),
        };
        let Some(source) = picked else {
            return ApiResponse::failed("cancelled");
        };

        let data_dir = self.data_dir();
        let timeout = self.config().timeouts.asset();
        let id = image_id(&source);
        let target = source.display().to_string();
        let job = move || {
            let payload = AssetPayload::from_file(&source)?;
            save_asset(&data_dir, &id, &payload)
        };
        match self.queue.submit_and_wait(TaskKind::SaveAsset, target, job, timeout).await {
            Ok(path) => ApiResponse::with_path(path),
            Err(e) => e.into(),
        }
    }

    /// `file://` URL of the data dir, with a trailing slash
    pub fn get_data_url(&self) -> String {
        let dir = self.data_dir();
        let absolute = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir().map(|cwd| cwd.join(&dir)).unwrap_or(dir)
        };
        file_url(&absolute)
    }

    pub fn log_js_error(&self, message: &str, stack: &str) -> ApiResponse {
        error!(target: "js", %message, %stack, "JS error");
        ApiResponse::ok()
    }

    /// The UI finished its own shutdown sequence
    pub fn quit(&self) -> ApiResponse {
        info!("Quit requested by UI");
        self.lifecycle.request_quit();
        ApiResponse::ok()
    }
}

impl std::fmt::Debug for ShellApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellApi")
            .field("config_path", &self.config_path)
            .field("data_dir", &self.data_dir())
            .finish_non_exhaustive()
    }
}

fn file_url(path: &Path) -> String {
    let text = path.display().to_string().replace('\\', "/");
    let text = text.trim_end_matches('/');
    if text.starts_with('/') {
        format!("file://{}/", text)
    } else {
        format!("file:///{}/", text)
    }
}

/// Asset id for an imported image: its file stem
fn image_id(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image")
        .to_string()
}

fn parse<T: serde::de::DeserializeOwned>(method: &str, params: Value) -> Result<T, ApiResponse> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| {
        warn!(%method, error = %e, "Invalid params");
        ApiResponse::failed(format!("Invalid params for {}: {}", method, e))
    })
}

#[derive(Debug, Deserialize)]
struct SaveFileParams {
    #[serde(alias = "filename")]
    name: String,
    content: String,
    #[serde(default)]
    sync: bool,
}

#[derive(Debug, Deserialize)]
struct NameParams {
    #[serde(alias = "filename")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct KeyParams {
    key: String,
}

#[derive(Debug, Deserialize)]
struct SaveStateParams {
    key: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct SaveAssetParams {
    data: String,
    #[serde(alias = "original_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct CoordsParams {
    #[serde(alias = "item_id")]
    id: String,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct JsErrorParams {
    message: String,
    #[serde(default)]
    stack: String,
}
