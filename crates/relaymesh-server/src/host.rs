//! The Host (§2, component H): composes listeners, the DI container, and
//! the dispatcher; orchestrates startup and graceful shutdown.
//!
//! All registration — services on the container, handlers on the
//! dispatcher — happens through [`HostBuilder`] before [`HostBuilder::build`]
//! finalizes anything, per §4.3's "all registration happens before
//! listening starts".

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relaymesh_amqp::AmqpListenerConfig;
use relaymesh_core::{ContextKind, Dispatch, PredicateChain};
use relaymesh_di::{Container, ContainerBuilder, InjectionPlan};
use relaymesh_http::TlsSource;
use relaymesh_ws::SessionRegistry;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{HostOptions, RouterOption, SslOptions};
use crate::connections::ConnectionStrings;
use crate::dispatcher::DispatcherBuilder;
use crate::error::{HostError, HostResult};
use crate::registration::Handler;
use crate::router::{GlobPattern, RouterConfig};

/// Builds a [`Host`]. Owns the DI container builder and the dispatcher
/// builder so callers register services and handlers through one entry
/// point before `build()`.
pub struct HostBuilder {
    container: ContainerBuilder,
    dispatcher: DispatcherBuilder,
    options: HostOptions,
    heartbeat_interval: Duration,
}

impl HostBuilder {
    #[must_use]
    pub fn new(options: HostOptions) -> Self {
        Self {
            container: ContainerBuilder::new(),
            dispatcher: DispatcherBuilder::new(),
            options,
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    /// Register DI services before the host starts. See
    /// [`relaymesh_di::ContainerBuilder`] for the registration API.
    pub fn container(&mut self) -> &mut ContainerBuilder {
        &mut self.container
    }

    /// Register one handler for `kind`. `url_pattern` feeds the
    /// auto-detector (§4.4) when no explicit `router` host option is set.
    pub fn register(
        &mut self,
        kind: ContextKind,
        url_pattern: Option<&str>,
        predicates: PredicateChain,
        handler: impl Handler + 'static,
        plan: InjectionPlan,
    ) -> &mut Self {
        self.dispatcher.register(kind, url_pattern, predicates, handler, plan);
        self
    }

    /// Override the default WebSocket ping interval (§6.3, default 30s).
    pub fn heartbeat_interval(&mut self, interval: Duration) -> &mut Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Finalize registration and validate configuration. Building
    /// doesn't bind sockets or start hosted services; that happens in
    /// [`Host::run`].
    pub fn build(mut self) -> HostResult<Host> {
        if !self.options.settings.connections.is_empty() {
            let connections = ConnectionStrings::new(self.options.settings.connections.clone());
            self.container.add_singleton_instance(None::<&str>, connections);
        }

        if let Some(router) = self.options.router.clone() {
            self.dispatcher.router(router_config_from_option(&router)?);
        }
        self.dispatcher.log_request(self.options.log_request);
        self.dispatcher.log_error(self.options.log_error);

        let container = self.container.build();
        let dispatcher = self.dispatcher.build(container.clone());
        let dispatch: Arc<dyn Dispatch> = Arc::new(dispatcher);

        let http_addrs = self.options.http_addrs()?;
        let tcp_addrs = self.options.tcp_addrs()?;
        let rabbit_configs = self.options.rabbit_configs()?;
        let tls = self.options.ssl.clone().map(ssl_to_tls_source).transpose()?;

        if http_addrs.is_empty() && tcp_addrs.is_empty() && rabbit_configs.is_empty() {
            return Err(HostError::NoListeners);
        }

        Ok(Host {
            container,
            dispatch,
            ws_registry: SessionRegistry::new(),
            http_addrs,
            tcp_addrs,
            rabbit_configs,
            tls,
            heartbeat_interval: self.heartbeat_interval,
        })
    }
}

/// §4.4/§C.2: `router` host option resolution. `RouterOption::Map` entry
/// order isn't preserved by the underlying `HashMap`; callers that care
/// about scan order when two patterns could both match should prefer a
/// single unambiguous pattern per context kind, or let the detector
/// auto-generate from handler registrations instead (see DESIGN.md).
fn router_config_from_option(option: &RouterOption) -> HostResult<RouterConfig> {
    match option {
        RouterOption::Single(name) => {
            let kind = ContextKind::parse(name)
                .ok_or_else(|| HostError::Router(format!("unknown context kind '{name}'")))?;
            Ok(RouterConfig::Single(kind))
        }
        RouterOption::Map(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (name, patterns) in map {
                let kind = ContextKind::parse(name)
                    .ok_or_else(|| HostError::Router(format!("unknown context kind '{name}'")))?;
                let compiled = patterns.iter().map(|p| GlobPattern::compile(p)).collect();
                entries.push((kind, compiled));
            }
            Ok(RouterConfig::PatternMap(entries))
        }
    }
}

fn ssl_to_tls_source(ssl: SslOptions) -> HostResult<TlsSource> {
    match (ssl.pkcs12_path, ssl.cert_path, ssl.key_path) {
        (Some(path), _, _) => Ok(TlsSource::Pkcs12 {
            path: PathBuf::from(path),
            passphrase: ssl.passphrase.unwrap_or_default(),
        }),
        (None, Some(cert), Some(key)) => Ok(TlsSource::CertKey {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, _, _) => Err(HostError::Tls(
            "ssl option requires either pkcs12_path or both cert_path and key_path".to_string(),
        )),
    }
}

/// The assembled host: every listener this process should bind, the
/// dispatcher they share, and the DI container backing it. Built once by
/// [`HostBuilder::build`]; [`Host::run`] is the only thing left to do.
pub struct Host {
    container: Container,
    dispatch: Arc<dyn Dispatch>,
    ws_registry: Arc<SessionRegistry>,
    http_addrs: Vec<SocketAddr>,
    tcp_addrs: Vec<SocketAddr>,
    rabbit_configs: Vec<AmqpListenerConfig>,
    tls: Option<TlsSource>,
    heartbeat_interval: Duration,
}

impl Host {
    /// Start every hosted service, bind every configured listener, and
    /// run until a Ctrl-C signal (or, in a multi-process host, this
    /// process's supervisor) requests shutdown. Shutdown cancels every
    /// listener task, closes every live WebSocket session, and stops
    /// hosted services in reverse start order (§5, §8 S6).
    pub async fn run(self) -> HostResult<()> {
        self.container.initialize_hosted_services().await?;

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut tasks: JoinSet<HostResult<()>> = JoinSet::new();

        for addr in self.http_addrs.iter().copied() {
            let mut config = relaymesh_http::HttpListenerConfig::new(addr);
            config.tls = self.tls.clone();
            config.heartbeat_interval = self.heartbeat_interval;
            let dispatch = Arc::clone(&self.dispatch);
            let ws_registry = Arc::clone(&self.ws_registry);
            let rx = shutdown_tx.subscribe();
            tasks.spawn(async move { relaymesh_http::serve(config, dispatch, ws_registry, rx).await.map_err(HostError::from) });
        }

        for addr in self.tcp_addrs.iter().copied() {
            let config = relaymesh_tcp::TcpListenerConfig::new(addr);
            let dispatch = Arc::clone(&self.dispatch);
            let rx = shutdown_tx.subscribe();
            tasks.spawn(async move { relaymesh_tcp::serve(config, dispatch, rx).await.map_err(HostError::from) });
        }

        for config in self.rabbit_configs.iter().cloned() {
            let dispatch = Arc::clone(&self.dispatch);
            let rx = shutdown_tx.subscribe();
            tasks.spawn(async move { relaymesh_amqp::serve(config, dispatch, rx).await.map_err(HostError::from) });
        }

        info!(
            http = self.http_addrs.len(),
            tcp = self.tcp_addrs.len(),
            rabbit = self.rabbit_configs.len(),
            "host started"
        );

        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to await ctrl_c, shutting down immediately");
        }
        info!("shutdown signal received, stopping listeners");

        let _ = shutdown_tx.send(());
        self.ws_registry.shutdown_all().await;
        self.container.shutdown_hosted_services().await;

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "listener exited with an error"),
                Err(join_err) => warn!(error = %join_err, "listener task panicked"),
            }
        }
        Ok(())
    }

    /// The dispatcher this host routes requests through, for embedding
    /// scenarios that want to dispatch messages without a bound listener.
    #[must_use]
    pub fn dispatch(&self) -> Arc<dyn Dispatch> {
        Arc::clone(&self.dispatch)
    }

    #[must_use]
    pub fn ws_registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.ws_registry)
    }

    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn router_option_single_resolves_known_kind() {
        let option = RouterOption::Single("http-rest".to_string());
        let config = router_config_from_option(&option).unwrap();
        assert!(matches!(config, RouterConfig::Single(ContextKind::HttpRest)));
    }

    #[test]
    fn router_option_rejects_unknown_kind() {
        let option = RouterOption::Single("not-a-kind".to_string());
        assert!(router_config_from_option(&option).is_err());
    }

    #[test]
    fn router_option_map_compiles_patterns_per_kind() {
        let mut map = HashMap::new();
        map.insert("http-rest".to_string(), vec!["/api/*".to_string()]);
        let config = router_config_from_option(&RouterOption::Map(map)).unwrap();
        match config {
            RouterConfig::PatternMap(entries) => assert_eq!(entries.len(), 1),
            other => panic!("expected a pattern map, got {}", matches!(other, RouterConfig::Auto)),
        }
    }

    #[test]
    fn ssl_options_prefer_pkcs12_over_cert_key_pair() {
        let ssl = SslOptions {
            cert_path: Some("cert.pem".to_string()),
            key_path: Some("key.pem".to_string()),
            pkcs12_path: Some("bundle.p12".to_string()),
            passphrase: Some("secret".to_string()),
        };
        assert!(matches!(ssl_to_tls_source(ssl).unwrap(), TlsSource::Pkcs12 { .. }));
    }

    #[test]
    fn ssl_options_without_any_material_is_an_error() {
        assert!(ssl_to_tls_source(SslOptions::default()).is_err());
    }
}
