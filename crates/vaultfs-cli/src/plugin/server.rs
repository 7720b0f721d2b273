//! Docker volume plugin HTTP server.
//!
//! Serves HTTP/1.1 JSON requests on a unix socket and forwards them to the
//! [`VolumeManager`]. Manager calls block on the volume table lock and on
//! kernel mounts, so they run on the blocking pool.

use super::protocol::{CONTENT_TYPE, PluginResponse, Volume, VolumeRequest};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};
use vaultfs_mount::{VolumeError, VolumeManager};

/// A bound plugin socket.
pub struct PluginServer {
    listener: UnixListener,
    socket: PathBuf,
    manager: Arc<VolumeManager>,
}

impl PluginServer {
    /// Binds the plugin socket, replacing a leftover socket file.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(socket: &Path, manager: Arc<VolumeManager>) -> io::Result<Self> {
        if let Some(parent) = socket.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(socket) {
            Ok(()) => debug!(socket = %socket.display(), "Removed stale plugin socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = UnixListener::bind(socket)?;
        info!(socket = %socket.display(), "Serving unix socket");
        Ok(Self {
            listener,
            socket: socket.to_path_buf(),
            manager,
        })
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Connections already accepted finish on their own tasks.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Received shutdown signal, no longer accepting requests");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let manager = Arc::clone(&self.manager);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req: Request<Incoming>| {
                                handle(Arc::clone(&manager), req)
                            });
                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                debug!(error = %e, "Plugin connection error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept plugin connection"),
                }
            }
        }
    }
}

impl Drop for PluginServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(socket = %self.socket.display(), error = %e, "Failed to remove plugin socket");
        }
    }
}

async fn handle(
    manager: Arc<VolumeManager>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let endpoint = req.uri().path().to_string();
    let (status, response) = match req.into_body().collect().await {
        Ok(body) => dispatch(&manager, &endpoint, &body.to_bytes()).await,
        Err(e) => (StatusCode::BAD_REQUEST, PluginResponse::error(e.to_string())),
    };
    Ok(json_response(status, &response))
}

fn json_response(status: StatusCode, response: &PluginResponse) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(response).unwrap_or_default();
    let mut reply = Response::new(Full::new(Bytes::from(body)));
    *reply.status_mut() = status;
    reply.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE),
    );
    reply
}

/// Routes one plugin request to the manager.
pub async fn dispatch(
    manager: &Arc<VolumeManager>,
    endpoint: &str,
    body: &[u8],
) -> (StatusCode, PluginResponse) {
    let request = match VolumeRequest::from_body(body) {
        Ok(request) => request,
        Err(e) => {
            warn!(endpoint, error = %e, "Malformed plugin request");
            return (StatusCode::BAD_REQUEST, PluginResponse::error(e.to_string()));
        }
    };
    let name = request.name;

    let response = match endpoint {
        "/Plugin.Activate" => PluginResponse::activate(),
        "/VolumeDriver.Capabilities" => PluginResponse::capabilities(),
        "/VolumeDriver.List" => PluginResponse::volumes(Vec::new()),
        "/VolumeDriver.Create" => {
            debug!(name = %name, "Got create request");
            match blocking(manager, move |m| m.create(&name)).await {
                Ok(()) => PluginResponse::ok(),
                Err(e) => PluginResponse::error(e),
            }
        }
        "/VolumeDriver.Path" => match manager.path(&name) {
            Ok(mountpoint) => PluginResponse::mountpoint(mountpoint),
            Err(e) => PluginResponse::error(e.to_string()),
        },
        "/VolumeDriver.Get" => match manager.path(&name) {
            Ok(mountpoint) => PluginResponse::volume(Volume { name, mountpoint }),
            Err(e) => PluginResponse::error(e.to_string()),
        },
        "/VolumeDriver.Mount" => {
            info!(name = %name, id = request.id.as_deref().unwrap_or(""), "Mounting volume");
            match blocking(manager, move |m| m.mount(&name)).await {
                Ok(mountpoint) => PluginResponse::mountpoint(mountpoint),
                Err(e) => PluginResponse::error(e),
            }
        }
        "/VolumeDriver.Unmount" => {
            info!(name = %name, id = request.id.as_deref().unwrap_or(""), "Unmounting volume");
            match blocking(manager, move |m| m.unmount(&name)).await {
                Ok(()) => PluginResponse::ok(),
                Err(e) => PluginResponse::error(e),
            }
        }
        "/VolumeDriver.Remove" => {
            debug!(name = %name, "Got remove request");
            match blocking(manager, move |m| match m.remove(&name) {
                // Docker removes volumes that were created but never used
                Err(VolumeError::NotMounted { .. }) => Ok(()),
                other => other,
            })
            .await
            {
                Ok(()) => PluginResponse::ok(),
                Err(e) => PluginResponse::error(e),
            }
        }
        other => {
            warn!(endpoint = other, "Unknown plugin endpoint");
            return (
                StatusCode::NOT_FOUND,
                PluginResponse::error(format!("unknown endpoint {other}")),
            );
        }
    };

    if response.is_error() {
        error!(endpoint, error = response.err.as_deref().unwrap_or(""), "Plugin request failed");
    }
    (StatusCode::OK, response)
}

/// Runs a manager operation on the blocking pool, flattening errors to text.
async fn blocking<T, F>(manager: &Arc<VolumeManager>, op: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&VolumeManager) -> Result<T, VolumeError> + Send + 'static,
{
    let manager = Arc::clone(manager);
    match tokio::task::spawn_blocking(move || op(&manager)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("volume operation failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;
    use vaultfs_mount::testing::RecordingBackend;

    fn setup() -> (TempDir, RecordingBackend, Arc<VolumeManager>) {
        let dir = TempDir::new().unwrap();
        let backend = RecordingBackend::new();
        let manager = VolumeManager::new(dir.path().join("volumes"), Box::new(backend.clone()));
        (dir, backend, Arc::new(manager))
    }

    async fn call(manager: &Arc<VolumeManager>, endpoint: &str, body: Value) -> (StatusCode, Value) {
        let body = serde_json::to_vec(&body).unwrap();
        let (status, response) = dispatch(manager, endpoint, &body).await;
        (status, serde_json::to_value(response).unwrap())
    }

    #[tokio::test]
    async fn test_activate_and_capabilities() {
        let (_dir, _backend, manager) = setup();

        let (status, body) = dispatch(&manager, "/Plugin.Activate", b"").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.implements, Some(vec!["VolumeDriver"]));

        let (_, body) = call(&manager, "/VolumeDriver.Capabilities", json!({})).await;
        assert_eq!(body, json!({"Capabilities": {"Scope": "local"}}));
    }

    #[tokio::test]
    async fn test_mount_lifecycle() {
        let (dir, backend, manager) = setup();
        let expected = dir.path().join("volumes").join("db");

        let (_, body) = call(&manager, "/VolumeDriver.Create", json!({"Name": "db"})).await;
        assert_eq!(body, json!({"Err": ""}));

        let (_, body) = call(&manager, "/VolumeDriver.Mount", json!({"Name": "db", "ID": "c1"})).await;
        assert_eq!(body["Mountpoint"], json!(expected));
        assert_eq!(body["Err"], "");
        call(&manager, "/VolumeDriver.Mount", json!({"Name": "db", "ID": "c2"})).await;
        assert_eq!(backend.mount_count(), 1);
        assert_eq!(manager.connections("db"), Some(2));

        let (_, body) = call(&manager, "/VolumeDriver.Path", json!({"Name": "db"})).await;
        assert_eq!(body["Mountpoint"], json!(expected));

        let (_, body) = call(&manager, "/VolumeDriver.Get", json!({"Name": "db"})).await;
        assert_eq!(body["Volume"], json!({"Name": "db", "Mountpoint": expected}));

        // Still shared: remove must be refused
        let (_, body) = call(&manager, "/VolumeDriver.Remove", json!({"Name": "db"})).await;
        assert!(body["Err"].as_str().unwrap().contains("still mounted"));

        for id in ["c1", "c2"] {
            let (_, body) = call(&manager, "/VolumeDriver.Unmount", json!({"Name": "db", "ID": id})).await;
            assert_eq!(body, json!({"Err": ""}));
        }
        assert_eq!(backend.stop_count(), 1);

        let (_, body) = call(&manager, "/VolumeDriver.Remove", json!({"Name": "db"})).await;
        assert_eq!(body, json!({"Err": ""}));
        assert_eq!(manager.connections("db"), None);
    }

    #[tokio::test]
    async fn test_remove_never_mounted_succeeds() {
        let (_dir, _backend, manager) = setup();
        call(&manager, "/VolumeDriver.Create", json!({"Name": "fresh"})).await;
        let (status, body) = call(&manager, "/VolumeDriver.Remove", json!({"Name": "fresh"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"Err": ""}));
    }

    #[tokio::test]
    async fn test_unmount_unknown_volume_reports_error() {
        let (_dir, _backend, manager) = setup();
        let (status, body) = call(&manager, "/VolumeDriver.Unmount", json!({"Name": "ghost"})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["Err"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mount_failure_reports_error() {
        let (_dir, backend, manager) = setup();
        backend.fail_mount("broken", true);

        let (_, body) = call(&manager, "/VolumeDriver.Mount", json!({"Name": "broken"})).await;
        assert!(!body["Err"].as_str().unwrap().is_empty());
        assert!(body.get("Mountpoint").is_none());
        assert_eq!(manager.connections("broken"), None);
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let (_dir, backend, manager) = setup();
        let (_, body) = call(&manager, "/VolumeDriver.Mount", json!({"Name": "../escape"})).await;
        assert!(!body["Err"].as_str().unwrap().is_empty());
        assert_eq!(backend.mount_count(), 0);

        for endpoint in ["/VolumeDriver.Path", "/VolumeDriver.Get"] {
            let (status, body) = call(&manager, endpoint, json!({"Name": "../../etc"})).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body["Err"].as_str().unwrap().contains("../../etc"), "{endpoint}");
            assert!(body.get("Mountpoint").is_none());
            assert!(body.get("Volume").is_none());
        }
    }

    #[tokio::test]
    async fn test_list_is_empty() {
        let (_dir, _backend, manager) = setup();
        call(&manager, "/VolumeDriver.Mount", json!({"Name": "db"})).await;
        let (_, body) = call(&manager, "/VolumeDriver.List", json!({})).await;
        assert_eq!(body, json!({"Volumes": [], "Err": ""}));
    }

    #[tokio::test]
    async fn test_unknown_endpoint_and_bad_body() {
        let (_dir, _backend, manager) = setup();
        let (status, _) = call(&manager, "/VolumeDriver.Snapshot", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = dispatch(&manager, "/VolumeDriver.Mount", b"{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.is_error());
    }

    #[tokio::test]
    async fn test_serves_http_over_unix_socket() {
        let (dir, backend, manager) = setup();
        let socket = dir.path().join("plugins").join("vault.sock");
        let server = PluginServer::bind(&socket, Arc::clone(&manager)).unwrap();
        assert_eq!(server.socket(), socket.as_path());

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let serving = tokio::spawn(server.serve(async {
            let _ = stop_rx.await;
        }));

        let body = r#"{"Name":"web","ID":"c1"}"#;
        let request = format!(
            "POST /VolumeDriver.Mount HTTP/1.1\r\nHost: plugin\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let mut stream = UnixStream::connect(&socket).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();

        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.contains(CONTENT_TYPE));
        assert!(reply.contains(r#""Err":"""#));
        assert_eq!(backend.mount_count(), 1);

        stop_tx.send(()).unwrap();
        serving.await.unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_file() {
        let (dir, _backend, manager) = setup();
        let socket = dir.path().join("vault.sock");
        std::fs::write(&socket, b"leftover").unwrap();

        let server = PluginServer::bind(&socket, manager).unwrap();
        drop(server);
        assert!(!socket.exists());
    }
}
