//! [`ForumDriver`]: the crate's implementation of the orchestrator's
//! [`ScrapeDriver`] seam.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use scrapeboard_core::driver::{DriverError, ScrapeDriver};
use scrapeboard_core::types::{ActivityParams, RunOutput, WorkflowKind};

use crate::client::GatewayClient;
use crate::config::{Credentials, SiteConfig};
use crate::{activity, general};

/// Drives one workflow run per call, each on a fresh proxied session.
pub struct ForumDriver {
    config: SiteConfig,
    credentials: Credentials,
    /// Held for the duration of a run when the proxy cannot multiplex
    /// circuits, serializing session acquisition across workflow kinds.
    circuit: Option<Mutex<()>>,
}

impl ForumDriver {
    pub fn new(config: SiteConfig, credentials: Credentials) -> Self {
        let circuit = config.single_circuit.then(|| Mutex::new(()));
        Self {
            config,
            credentials,
            circuit,
        }
    }

    /// Boot-time check that the proxy circuit is usable at all. An
    /// unreachable proxy is an unrecoverable initialization failure for the
    /// service.
    pub async fn probe(&self) -> Result<(), DriverError> {
        let client = GatewayClient::new(&self.config)?;
        client.probe(&self.config.index_url()).await
    }
}

#[async_trait]
impl ScrapeDriver for ForumDriver {
    async fn run(
        &self,
        kind: WorkflowKind,
        params: Option<&ActivityParams>,
    ) -> Result<RunOutput, DriverError> {
        let _circuit = match &self.circuit {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        info!(kind = %kind, "driver session starting");

        // Fresh client per run: the cookie jar is the session.
        let client = GatewayClient::new(&self.config)?;
        match kind {
            WorkflowKind::General => general::collect_topics(&client, &self.config)
                .await
                .map(RunOutput::Topics),
            WorkflowKind::ModsActivity => {
                let params = params.ok_or_else(|| {
                    DriverError::Site("mods_activity run dispatched without parameters".into())
                })?;
                activity::collect_activities(&client, &self.config, &self.credentials, params)
                    .await
                    .map(RunOutput::Activities)
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(base_url: &str) -> ForumDriver {
        let mut config = SiteConfig::for_base_url(base_url);
        config.proxy_url = String::new();
        ForumDriver::new(
            config,
            Credentials {
                username: "scraper".into(),
                password: "hunter2".into(),
            },
        )
    }

    #[tokio::test]
    async fn general_run_yields_topics() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_body(r#"<a class="forumtitle" href="/viewforum.php?f=1">Hardware</a>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/viewforum.php?f=1")
            .with_body(r#"<a class="topictitle" href="/t1">Topic</a>"#)
            .expect(2)
            .create_async()
            .await;

        let driver = driver(&server.url());
        let output = driver.run(WorkflowKind::General, None).await.unwrap();
        match output {
            RunOutput::Topics(topics) => {
                assert_eq!(topics.len(), 1);
                assert_eq!(topics[0].title, "Topic");
            }
            other => panic!("expected Topics, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mods_activity_without_params_is_a_site_error() {
        let driver = driver("https://forum.example");
        let err = driver
            .run(WorkflowKind::ModsActivity, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Site(_)));
    }

    #[tokio::test]
    async fn probe_fails_when_nothing_listens() {
        let driver = driver("http://127.0.0.1:9");
        assert!(matches!(
            driver.probe().await,
            Err(DriverError::Proxy(_))
        ));
    }
}
