//! Fans a single command out to every attached board and gathers the
//! per-board transcripts into one report.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::config::{Config, LinkConfig};
use crate::discovery::{DeviceRegistry, DiscoveryError};
use crate::link::{self, LinkError, LinkFactory, SerialLinkFactory};
use crate::metrics;
use crate::protocol;
use crate::report::{AggregateReport, DeviceResult};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Discovers boards and runs one command exchange per board.
pub struct Dispatcher {
    registry: DeviceRegistry,
    links: Arc<dyn LinkFactory>,
    config: Config,
}

impl Dispatcher {
    pub fn new(registry: DeviceRegistry, links: Arc<dyn LinkFactory>, config: Config) -> Self {
        Self {
            registry,
            links,
            config,
        }
    }

    /// Dispatcher wired to the real OS enumeration and serial stack.
    pub fn with_system_links(config: Config) -> Self {
        let links = Arc::new(SerialLinkFactory::new(config.link.clone()));
        Self::new(DeviceRegistry::system(), links, config)
    }

    /// Currently attached candidate boards, freshly enumerated.
    pub fn list_ports(&self) -> Result<Vec<String>, DispatchError> {
        Ok(self.registry.discover()?)
    }

    /// Sends `command` to every attached board concurrently and waits for
    /// all of them. Per-board failures land in the report as failure
    /// lines; only a failing discovery aborts the whole dispatch.
    pub async fn dispatch(&self, command: &str) -> Result<AggregateReport, DispatchError> {
        let ports = self.registry.discover()?;
        if ports.is_empty() {
            tracing::info!("No boards attached; nothing to dispatch");
            return Ok(AggregateReport::no_boards());
        }
        tracing::info!("Dispatching {:?} to {} board(s)", command, ports.len());

        let command: Arc<str> = Arc::from(command);
        let pool = Arc::new(Semaphore::new(self.config.dispatch.pool_size.max(1)));
        let mut tasks = JoinSet::new();
        for port in &ports {
            let port = port.clone();
            let command = Arc::clone(&command);
            let links = Arc::clone(&self.links);
            let link_config = self.config.link.clone();
            let pool = Arc::clone(&pool);
            tasks.spawn(async move {
                // The pool is never closed; a failed acquire only happens
                // during runtime shutdown.
                let _permit = pool.acquire_owned().await.ok();
                exchange(links.as_ref(), &link_config, &port, &command).await
            });
        }

        let mut results = Vec::with_capacity(ports.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("Board task aborted: {}", e),
            }
        }

        // An aborted task never produced a result; synthesize a failure so
        // every discovered port still shows up in the report.
        let missing: Vec<String> = {
            let seen: HashSet<&str> = results.iter().map(|r| r.port.as_str()).collect();
            ports
                .iter()
                .filter(|port| !seen.contains(port.as_str()))
                .cloned()
                .collect()
        };
        for port in missing {
            results.push(DeviceResult::failed(port, "board task aborted"));
        }

        let total_hs = metrics::total_hashrate(&results);
        let ok = results.iter().filter(|result| result.is_ok()).count();
        tracing::info!(
            "Dispatch complete: {} ok, {} failed, {:.1} H/s total",
            ok,
            results.len() - ok,
            total_hs
        );
        Ok(AggregateReport {
            ports,
            results,
            total_hs,
        })
    }
}

async fn exchange(
    links: &dyn LinkFactory,
    config: &LinkConfig,
    port: &str,
    command: &str,
) -> DeviceResult {
    match run_exchange(links, config, port, command).await {
        Ok(lines) => {
            for line in &lines {
                tracing::debug!("{} -> {}", port, line);
            }
            DeviceResult::completed(port, lines)
        }
        Err(e) => {
            tracing::warn!("{}: {}", port, e);
            DeviceResult::failed(port, e)
        }
    }
}

async fn run_exchange(
    links: &dyn LinkFactory,
    config: &LinkConfig,
    port: &str,
    command: &str,
) -> Result<Vec<String>, LinkError> {
    let mut link = match timeout(config.io_timeout(), links.connect(port)).await {
        Ok(opened) => opened?,
        Err(_) => return Err(LinkError::OpenTimeout),
    };
    // Opening the port toggles DTR/RTS on most bridges, which resets the
    // board; let it come back up before talking.
    tokio::time::sleep(config.settle_delay()).await;
    link.discard_input()?;
    tracing::debug!("{} <- {}", port, command);
    link::write_command(link.as_mut(), config, command).await?;
    Ok(protocol::read_response(link.as_mut(), config).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::discovery::{PortCandidate, PortEnumerator};
    use crate::link::RawLink;

    struct FixedEnumerator {
        candidates: Vec<PortCandidate>,
    }

    impl PortEnumerator for FixedEnumerator {
        fn enumerate(&self) -> Result<Vec<PortCandidate>, DiscoveryError> {
            Ok(self.candidates.clone())
        }
    }

    struct CountingFactory {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl LinkFactory for CountingFactory {
        async fn connect(&self, _port: &str) -> Result<Box<dyn RawLink>, LinkError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            panic!("no link behavior scripted");
        }
    }

    struct PanickyFactory;

    #[async_trait]
    impl LinkFactory for PanickyFactory {
        async fn connect(&self, _port: &str) -> Result<Box<dyn RawLink>, LinkError> {
            panic!("factory blew up");
        }
    }

    fn esp32_candidate(name: &str) -> PortCandidate {
        PortCandidate {
            name: name.to_string(),
            descriptor: "CP2102 USB to UART Bridge".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_boards_short_circuits_without_opening_links() {
        let factory = Arc::new(CountingFactory {
            connects: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(
            DeviceRegistry::new(Box::new(FixedEnumerator {
                candidates: Vec::new(),
            })),
            factory.clone(),
            Config::default(),
        );

        let report = dispatcher.dispatch("PING").await.unwrap();
        assert_eq!(report, AggregateReport::no_boards());
        assert_eq!(factory.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_aborted_task_is_backfilled_as_failure() {
        let dispatcher = Dispatcher::new(
            DeviceRegistry::new(Box::new(FixedEnumerator {
                candidates: vec![esp32_candidate("/dev/ttyUSB0")],
            })),
            Arc::new(PanickyFactory),
            Config::default(),
        );

        let report = dispatcher.dispatch("PING").await.unwrap();
        assert_eq!(report.ports, ["/dev/ttyUSB0"]);
        assert_eq!(report.results.len(), 1);
        assert!(!report.results[0].is_ok());
        assert_eq!(report.results[0].lines(), ["ERR board task aborted"]);
        assert_eq!(report.total_hs, 0.0);
    }
}
