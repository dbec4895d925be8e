use std::collections::VecDeque;
use std::sync::Arc;

use kindling_core::hmr_payload::ClientMessage;
use kindling_core::hmr_payload::ClientOptions;
use kindling_core::hmr_payload::HmrPayload;
use kindling_core::hmr_payload::PendingUpdate;
use kindling_core::hmr_payload::UpdateKind;
use kindling_core::messenger::HmrMessenger;
use kindling_core::messenger::HmrTransportRef;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::registry::HotCallback;
use crate::registry::Registry;
use crate::ClientHost;
use crate::HotContext;
use crate::ModuleImporter;
use crate::ModuleNamespace;

/// A fetched update waiting for its turn to run the accept callbacks
pub struct FetchedUpdate {
  path: String,
  accepted_path: String,
  target: String,
  module: ModuleNamespace,
  callbacks: Vec<HotCallback>,
}

impl FetchedUpdate {
  /// The module instance that was imported
  pub fn module(&self) -> &ModuleNamespace {
    &self.module
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  fn apply(self) {
    for HotCallback { deps, callback } in &self.callbacks {
      let modules = deps
        .iter()
        .map(|dep| (*dep == self.target).then(|| self.module.clone()))
        .collect::<Vec<_>>();

      callback(&modules);
    }

    if self.path == self.accepted_path {
      tracing::debug!("Hot updated {}", self.path);
    } else {
      tracing::debug!("Hot updated {} via {}", self.path, self.accepted_path);
    }
  }
}

struct ClientInner {
  apply_lock: tokio::sync::Mutex<()>,
  host: Arc<dyn ClientHost>,
  importer: Arc<dyn ModuleImporter>,
  messenger: HmrMessenger,
  options: ClientOptions,
  queue: Mutex<VecDeque<JoinHandle<Option<FetchedUpdate>>>>,
  registry: Mutex<Registry>,
}

/// Applies the server's hot update messages inside one page.
///
/// Updates are fetched concurrently but their callbacks run in the order the server sent them.
#[derive(Clone)]
pub struct HmrClient {
  inner: Arc<ClientInner>,
}

impl HmrClient {
  pub fn new(
    transport: HmrTransportRef,
    importer: Arc<dyn ModuleImporter>,
    host: Arc<dyn ClientHost>,
  ) -> Self {
    Self::with_options(transport, importer, host, ClientOptions::default())
  }

  /// Create a client configured by the dev server that served it
  pub fn with_options(
    transport: HmrTransportRef,
    importer: Arc<dyn ModuleImporter>,
    host: Arc<dyn ClientHost>,
    options: ClientOptions,
  ) -> Self {
    Self {
      inner: Arc::new(ClientInner {
        apply_lock: tokio::sync::Mutex::new(()),
        host,
        importer,
        messenger: HmrMessenger::new(transport),
        options,
        queue: Mutex::new(VecDeque::new()),
        registry: Mutex::new(Registry::default()),
      }),
    }
  }

  /// The hot context for a freshly evaluated instance of `owner`.
  ///
  /// Callbacks and listeners registered by the previous instance are dropped, its data is kept.
  pub fn hot_context(&self, owner: &str) -> HotContext {
    self.inner.registry.lock().reset_owner(owner);
    HotContext::new(owner.to_string(), self.clone())
  }

  /// Deliver messages queued while the connection was not ready
  pub fn flush_messages(&self) {
    self.inner.messenger.flush();
  }

  pub async fn handle_text_message(&self, message: &str) {
    match HmrPayload::from_json(message) {
      Ok(payload) => self.handle_message(payload).await,
      Err(error) => tracing::warn!(%error, "Ignoring malformed server message"),
    }
  }

  pub async fn handle_message(&self, payload: HmrPayload) {
    match payload {
      HmrPayload::Connected => {
        tracing::debug!("Connected");
        self.inner.host.connected();
      }
      HmrPayload::Update { updates } => {
        self.inner.host.clear_error();

        for update in updates {
          match update.kind {
            UpdateKind::Reload => self.enqueue(update),
            UpdateKind::FullReload => self.inner.host.full_reload(Some(update.path)),
            UpdateKind::Prune => self.prune(&update.path).await,
          }
        }

        self.flush_updates().await;
      }
      HmrPayload::FullReload { path } => self.inner.host.full_reload(path),
      HmrPayload::Prune { paths } => {
        for path in paths {
          self.prune(&path).await;
        }
      }
      HmrPayload::Error { err } => {
        tracing::error!("Internal server error: {}", err.message);
        if self.inner.options.overlay {
          self.inner.host.show_error(&err);
        }
      }
      HmrPayload::Custom { event, data } => self.notify_listeners(&event, &data),
    }
  }

  /// Fetch a single update and apply it once every update queued before it was applied
  pub async fn queue_update(&self, update: PendingUpdate) {
    self.enqueue(update);
    self.flush_updates().await;
  }

  /// Dispose the module being replaced and import its new instance.
  ///
  /// Returns `None` when nothing accepts the update or the import failed.
  pub async fn fetch_update(&self, update: &PendingUpdate) -> Option<FetchedUpdate> {
    let (target, callbacks, dispose, data) = {
      let mut registry = self.inner.registry.lock();
      let owner_callbacks = registry
        .callbacks
        .get(&update.accepted_path)
        .cloned()
        .unwrap_or_default();

      let accepting = |dep: &str| {
        owner_callbacks
          .iter()
          .filter(|hot| hot.deps.iter().any(|d| d == dep))
          .cloned()
          .collect::<Vec<_>>()
      };

      let (target, callbacks) = match accepting(&update.path) {
        callbacks if !callbacks.is_empty() => (update.path.clone(), callbacks),
        _ => (
          update.accepted_path.clone(),
          accepting(&update.accepted_path),
        ),
      };

      if !update.is_self_update() && callbacks.is_empty() {
        tracing::debug!(path = %update.path, "No callback accepts the update");
        return None;
      }

      let dispose = registry.dispose_handlers.get(&target).cloned();
      let data = registry.data(&target);

      (target, callbacks, dispose, data)
    };

    if let Some(dispose) = dispose {
      dispose(data).await;
    }

    match self
      .inner
      .importer
      .import_updated_module(update, &target)
      .await
    {
      Ok(module) => Some(FetchedUpdate {
        path: update.path.clone(),
        accepted_path: update.accepted_path.clone(),
        target,
        module,
        callbacks,
      }),
      Err(error) => {
        tracing::error!(
          path = %update.path,
          "Failed to fetch update, a full reload may be needed: {error:#}"
        );
        None
      }
    }
  }

  pub(crate) fn registry(&self) -> &Mutex<Registry> {
    &self.inner.registry
  }

  pub(crate) fn send_custom(&self, event: &str, data: Value) {
    let message = ClientMessage::Custom {
      event: event.to_string(),
      data,
    };

    match message.to_json() {
      Ok(message) => self.inner.messenger.send(message),
      Err(error) => tracing::error!(%error, "Failed to encode client message"),
    }
  }

  fn enqueue(&self, update: PendingUpdate) {
    let client = self.clone();
    let fetch = tokio::spawn(async move { client.fetch_update(&update).await });

    self.inner.queue.lock().push_back(fetch);
  }

  /// Apply queued updates in arrival order, waiting for each fetch as needed
  async fn flush_updates(&self) {
    let _applying = self.inner.apply_lock.lock().await;

    loop {
      let next = self.inner.queue.lock().pop_front();
      let Some(fetch) = next else {
        break;
      };

      match fetch.await {
        Ok(Some(update)) => update.apply(),
        Ok(None) => {}
        Err(error) => tracing::error!(%error, "Update task failed"),
      }
    }
  }

  async fn prune(&self, path: &str) {
    let (dispose, prune, data) = {
      let mut registry = self.inner.registry.lock();
      (
        registry.dispose_handlers.get(path).cloned(),
        registry.prune_handlers.get(path).cloned(),
        registry.data(path),
      )
    };

    if let Some(dispose) = dispose {
      dispose(data.clone()).await;
    }

    if let Some(prune) = prune {
      prune(data).await;
    }
  }

  fn notify_listeners(&self, event: &str, data: &Value) {
    let listeners = self.inner.registry.lock().listeners_for(event);

    for listener in listeners {
      listener(data);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::time::Duration;

  use async_trait::async_trait;
  use kindling_core::hmr_payload::ErrorPayload;
  use kindling_core::hmr_payload::InvalidatePayload;
  use kindling_core::hmr_payload::INVALIDATE_EVENT;
  use kindling_core::messenger::HmrTransport;
  use kindling_core::types::with_timestamp_query;
  use mockall::predicate::eq;
  use pretty_assertions::assert_eq;
  use serde_json::json;
  use tracing_test::traced_test;

  use super::*;
  use crate::MockClientHost;
  use crate::MockModuleImporter;

  type Log = Arc<Mutex<Vec<String>>>;

  #[derive(Default)]
  struct RecordingTransport {
    messages: Mutex<Vec<String>>,
  }

  impl HmrTransport for RecordingTransport {
    fn is_ready(&self) -> bool {
      true
    }

    fn send(&self, message: String) -> anyhow::Result<()> {
      self.messages.lock().push(message);
      Ok(())
    }
  }

  #[derive(Default)]
  struct RecordingHost {
    log: Log,
  }

  impl ClientHost for RecordingHost {
    fn full_reload(&self, path: Option<String>) {
      self.log.lock().push(format!("full-reload {path:?}"));
    }

    fn show_error(&self, err: &ErrorPayload) {
      self.log.lock().push(format!("error {}", err.message));
    }

    fn clear_error(&self) {
      self.log.lock().push(String::from("clear-error"));
    }
  }

  /// Imports modules after an optional per-module delay, logging each import
  #[derive(Default)]
  struct FakeImporter {
    delays: HashMap<String, Duration>,
    log: Log,
  }

  #[async_trait]
  impl ModuleImporter for FakeImporter {
    async fn import_updated_module(
      &self,
      update: &PendingUpdate,
      target: &str,
    ) -> anyhow::Result<ModuleNamespace> {
      if let Some(delay) = self.delays.get(target) {
        tokio::time::sleep(*delay).await;
      }

      let url = with_timestamp_query(target, update.timestamp);
      self.log.lock().push(format!("import {url}"));

      Ok(ModuleNamespace {
        url,
        exports: json!({ "timestamp": update.timestamp }),
      })
    }
  }

  struct Harness {
    client: HmrClient,
    log: Log,
    transport: Arc<RecordingTransport>,
  }

  impl Harness {
    fn new(delays: &[(&str, u64)]) -> Self {
      let log = Log::default();
      let transport = Arc::new(RecordingTransport::default());
      let importer = FakeImporter {
        delays: delays
          .iter()
          .map(|(url, ms)| (url.to_string(), Duration::from_millis(*ms)))
          .collect(),
        log: log.clone(),
      };
      let host = RecordingHost { log: log.clone() };

      Harness {
        client: HmrClient::new(transport.clone(), Arc::new(importer), Arc::new(host)),
        log,
        transport,
      }
    }

    fn log(&self) -> Vec<String> {
      self.log.lock().clone()
    }

    fn recorder(&self, prefix: &str) -> impl Fn(Option<&ModuleNamespace>) + Send + Sync + 'static {
      let log = self.log.clone();
      let prefix = prefix.to_string();

      move |module| {
        let url = module.map(|module| module.url.clone()).unwrap_or_default();
        log.lock().push(format!("{prefix} {url}"));
      }
    }
  }

  fn update(updates: Vec<PendingUpdate>) -> HmrPayload {
    HmrPayload::Update { updates }
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn applies_updates_in_arrival_order() {
    let harness = Harness::new(&[("/src/a.js", 50)]);
    harness
      .client
      .hot_context("/src/a.js")
      .accept_with(harness.recorder("accepted"));
    harness
      .client
      .hot_context("/src/b.js")
      .accept_with(harness.recorder("accepted"));

    harness
      .client
      .handle_message(update(vec![
        PendingUpdate::reload("/src/a.js", "/src/a.js", 1),
        PendingUpdate::reload("/src/b.js", "/src/b.js", 1),
      ]))
      .await;

    let accepted = harness
      .log()
      .into_iter()
      .filter(|entry| entry.starts_with("accepted"))
      .collect::<Vec<_>>();

    assert_eq!(
      accepted,
      vec![
        String::from("accepted /src/a.js?t=1"),
        String::from("accepted /src/b.js?t=1")
      ]
    );
    assert_eq!(harness.log()[0], "clear-error");
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn dependency_accepts_receive_the_new_instance() {
    let harness = Harness::new(&[]);
    let received = Arc::new(Mutex::new(Vec::new()));

    harness.client.hot_context("/src/a.js").accept_deps(
      &["/src/b.js", "/src/c.js"],
      {
        let received = received.clone();
        move |modules| received.lock().push(modules.to_vec())
      },
    );

    harness
      .client
      .queue_update(PendingUpdate::reload("/src/b.js", "/src/a.js", 4))
      .await;

    assert_eq!(
      *received.lock(),
      vec![vec![
        Some(ModuleNamespace {
          url: String::from("/src/b.js?t=4"),
          exports: json!({ "timestamp": 4 }),
        }),
        None
      ]]
    );
    assert_eq!(harness.log(), vec![String::from("import /src/b.js?t=4")]);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn skips_updates_nothing_accepts() {
    let mut importer = MockModuleImporter::new();
    importer.expect_import_updated_module().never();

    let client = HmrClient::new(
      Arc::new(RecordingTransport::default()),
      Arc::new(importer),
      Arc::new(RecordingHost::default()),
    );
    client.hot_context("/src/a.js");

    let fetched = client
      .fetch_update(&PendingUpdate::reload("/src/b.js", "/src/a.js", 1))
      .await;

    assert!(fetched.is_none());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn self_updates_are_fetched_without_callbacks() {
    let harness = Harness::new(&[]);

    let fetched = harness
      .client
      .fetch_update(&PendingUpdate::reload("/src/style.css", "/src/style.css", 2))
      .await;

    assert_eq!(fetched.map(|f| f.module().url.clone()), Some(String::from("/src/style.css?t=2")));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn a_new_instance_replaces_stale_callbacks() {
    let harness = Harness::new(&[]);

    let old = harness.client.hot_context("/src/a.js");
    old.accept_with(harness.recorder("old"));
    old.on("ping", {
      let log = harness.log.clone();
      move |_| log.lock().push(String::from("old ping"))
    });

    let new = harness.client.hot_context("/src/a.js");
    new.accept_with(harness.recorder("new"));

    harness
      .client
      .queue_update(PendingUpdate::reload("/src/a.js", "/src/a.js", 3))
      .await;
    harness
      .client
      .handle_message(HmrPayload::Custom {
        event: String::from("ping"),
        data: Value::Null,
      })
      .await;

    assert_eq!(
      harness.log(),
      vec![
        String::from("import /src/a.js?t=3"),
        String::from("new /src/a.js?t=3")
      ]
    );
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn disposes_before_importing_and_keeps_data() {
    let harness = Harness::new(&[]);

    let hot = harness.client.hot_context("/src/a.js");
    hot.accept();
    hot.dispose({
      let log = harness.log.clone();
      move |data| {
        let log = log.clone();
        async move {
          data.set("count", json!(1));
          log.lock().push(String::from("dispose"));
        }
      }
    });

    harness
      .client
      .queue_update(PendingUpdate::reload("/src/a.js", "/src/a.js", 1))
      .await;

    assert_eq!(
      harness.log(),
      vec![String::from("dispose"), String::from("import /src/a.js?t=1")]
    );

    let next = harness.client.hot_context("/src/a.js");
    assert_eq!(next.data().get("count"), Some(json!(1)));
  }

  // Single threaded so the spawned fetch logs inside this test's span
  #[traced_test]
  #[tokio::test]
  async fn failed_fetches_skip_callbacks() {
    let mut importer = MockModuleImporter::new();
    importer
      .expect_import_updated_module()
      .times(1)
      .returning(|_, _| Err(anyhow::anyhow!("network down")));

    let log = Log::default();
    let client = HmrClient::new(
      Arc::new(RecordingTransport::default()),
      Arc::new(importer),
      Arc::new(RecordingHost { log: log.clone() }),
    );
    client.hot_context("/src/a.js").accept_with({
      let log = log.clone();
      move |_| log.lock().push(String::from("accepted"))
    });

    client
      .handle_message(update(vec![PendingUpdate::reload(
        "/src/a.js",
        "/src/a.js",
        1,
      )]))
      .await;

    assert_eq!(*log.lock(), vec![String::from("clear-error")]);
    assert!(logs_contain("Failed to fetch update"));
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn prunes_dispose_then_run_prune_handlers() {
    let harness = Harness::new(&[]);
    let hot = harness.client.hot_context("/src/b.js");

    hot.dispose({
      let log = harness.log.clone();
      move |_| {
        let log = log.clone();
        async move { log.lock().push(String::from("dispose")) }
      }
    });
    hot.prune({
      let log = harness.log.clone();
      move |_| {
        let log = log.clone();
        async move { log.lock().push(String::from("prune")) }
      }
    });

    harness
      .client
      .handle_message(HmrPayload::Prune {
        paths: vec![String::from("/src/b.js"), String::from("/src/unknown.js")],
      })
      .await;

    assert_eq!(
      harness.log(),
      vec![String::from("dispose"), String::from("prune")]
    );
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn forwards_reloads_and_errors_to_the_host() {
    let mut host = MockClientHost::new();
    host
      .expect_full_reload()
      .with(eq(Some(String::from("/index.html"))))
      .times(1)
      .return_const(());
    host
      .expect_show_error()
      .withf(|err| err.message == "Unexpected token")
      .times(1)
      .return_const(());

    let client = HmrClient::new(
      Arc::new(RecordingTransport::default()),
      Arc::new(MockModuleImporter::new()),
      Arc::new(host),
    );

    client
      .handle_message(HmrPayload::FullReload {
        path: Some(String::from("/index.html")),
      })
      .await;
    client
      .handle_message(HmrPayload::Error {
        err: ErrorPayload {
          message: String::from("Unexpected token"),
          ..ErrorPayload::default()
        },
      })
      .await;
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn errors_are_only_logged_without_the_overlay() {
    let log = Log::default();
    let client = HmrClient::with_options(
      Arc::new(RecordingTransport::default()),
      Arc::new(MockModuleImporter::new()),
      Arc::new(RecordingHost { log: log.clone() }),
      ClientOptions { overlay: false },
    );

    client
      .handle_message(HmrPayload::Error {
        err: ErrorPayload {
          message: String::from("Unexpected token"),
          ..ErrorPayload::default()
        },
      })
      .await;
    client.handle_message(update(Vec::new())).await;

    assert_eq!(*log.lock(), vec![String::from("clear-error")]);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn custom_listeners_can_be_removed() {
    let harness = Harness::new(&[]);
    let hot = harness.client.hot_context("/src/a.js");

    let first = hot.on("theme", {
      let log = harness.log.clone();
      move |data| log.lock().push(format!("first {data}"))
    });
    hot.on("theme", {
      let log = harness.log.clone();
      move |data| log.lock().push(format!("second {data}"))
    });
    hot.off("theme", first);

    harness
      .client
      .handle_text_message(r#"{"type":"custom","event":"theme","data":"dark"}"#)
      .await;

    assert_eq!(harness.log(), vec![String::from("second \"dark\"")]);
  }

  #[test]
  fn invalidate_asks_the_server_to_walk_importers() {
    let harness = Harness::new(&[]);

    harness
      .client
      .hot_context("/src/a.js")
      .invalidate(Some("state shape changed"));

    let messages = harness.transport.messages.lock().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(
      ClientMessage::from_json(&messages[0]).unwrap(),
      ClientMessage::Custom {
        event: String::from(INVALIDATE_EVENT),
        data: serde_json::to_value(InvalidatePayload {
          path: String::from("/src/a.js"),
          message: Some(String::from("state shape changed")),
        })
        .unwrap(),
      }
    );
  }

  #[traced_test]
  #[tokio::test(flavor = "multi_thread")]
  async fn ignores_malformed_messages() {
    let harness = Harness::new(&[]);

    harness.client.handle_text_message("{\"type\":").await;

    assert!(logs_contain("Ignoring malformed server message"));
    assert_eq!(harness.log(), Vec::<String>::new());
  }
}
