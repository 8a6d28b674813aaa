//! Saving a definition again whenever its file changes on disk.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use scxml_client::ApiClient;

use crate::commands::Definition;

/// Save `path` as `name`, then again after every change until `shutdown`
/// resolves. Only the first save is fatal; later failures are printed and
/// watching continues.
pub(crate) async fn save_on_change<F>(
    api: &ApiClient,
    name: &str,
    path: &Path,
    handlers: Option<&Path>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })
    .context("Error starting file watcher")?;

    // Editors often replace the file rather than write into it, so the
    // directory is watched and events are filtered by file name.
    let dir = watched_dir(path);
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Error watching {}", dir.display()))?;
    debug!(path = %path.display(), dir = %dir.display(), "watching definition");

    let mut last = Definition::read(path, handlers)?;
    last.upload(api, name).await?;

    tokio::pin!(shutdown);
    loop {
        let event = tokio::select! {
            () = &mut shutdown => break,
            event = rx.recv() => event,
        };
        let Some(event) = event else { break };

        match event {
            Ok(event) if touches(&event, path) => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "file watcher error");
                continue;
            }
        }

        let current = match Definition::read(path, handlers) {
            Ok(current) => current,
            Err(e) => {
                debug!(error = %e, "definition not readable, waiting for the next change");
                continue;
            }
        };
        // One write usually raises several events.
        if current == last {
            continue;
        }
        match current.upload(api, name).await {
            Ok(()) => last = current,
            Err(e) => eprintln!("ERROR: {e:#}"),
        }
    }

    debug!(path = %path.display(), "stopped watching definition");
    Ok(())
}

fn watched_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p.file_name() == path.file_name())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tokio::sync::oneshot;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn bodies(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }

    async fn wait_for_body(server: &MockServer, body: &str) {
        for _ in 0..250 {
            if bodies(server).await.iter().any(|b| b == body) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no PUT with body {body:?}, got {:?}", bodies(server).await);
    }

    #[test]
    fn bare_file_name_watches_the_current_directory() {
        assert_eq!(watched_dir(Path::new("door.scxml")), PathBuf::from("."));
        assert_eq!(watched_dir(Path::new("/tmp/x/door.scxml")), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn only_changes_to_the_watched_file_count() {
        let target = Path::new("/tmp/x/door.scxml");
        let modify = EventKind::Modify(notify::event::ModifyKind::Any);
        let hit = Event::new(modify).add_path(PathBuf::from("/tmp/x/door.scxml"));
        let other = Event::new(modify).add_path(PathBuf::from("/tmp/x/other.scxml"));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/tmp/x/door.scxml"));

        assert!(touches(&hit, target));
        assert!(!touches(&other, target));
        assert!(!touches(&access, target));
    }

    #[tokio::test]
    async fn saves_again_when_the_file_changes() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/helloworld.scxml"))
            .and(header("content-type", "application/xml"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("helloworld.scxml");
        std::fs::write(&doc, "<scxml/>").unwrap();

        let api = ApiClient::new(server.uri());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let shutdown = async {
            let _ = stop_rx.await;
        };

        let driver = async {
            wait_for_body(&server, "<scxml/>").await;
            std::fs::write(&doc, "testdone").unwrap();
            wait_for_body(&server, "testdone").await;
            let _ = stop_tx.send(());
        };

        let (result, ()) = tokio::join!(
            save_on_change(&api, "helloworld.scxml", &doc, None, shutdown),
            driver
        );
        result.unwrap();

        let bodies = bodies(&server).await;
        assert_eq!(bodies.first().map(String::as_str), Some("<scxml/>"));
        assert_eq!(bodies.last().map(String::as_str), Some("testdone"));
    }

    #[tokio::test]
    async fn first_save_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("door.scxml");
        std::fs::write(&doc, "<scxml/>").unwrap();

        let api = ApiClient::new(server.uri());
        let err = save_on_change(&api, "door.scxml", &doc, None, std::future::pending())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Error saving statechart"));
    }
}
