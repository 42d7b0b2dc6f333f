//! `BranchSearch`, the client facade.
//!
//! Builds payloads, picks the channel and endpoint for each call, parses
//! successful bodies into result types, and resolves an `Unauthorized`
//! search into `ServiceDisabled` when the availability lookup says so.

use std::sync::Arc;

use tracing::{debug, info};

use crate::availability::AvailabilityResolver;
use crate::classify::{ErrorKind, SearchError};
use crate::config::SearchConfig;
use crate::dispatch::{CancelPolicy, Channel, ChannelDispatcher, ExecutionPool};
use crate::error::AppError;
use crate::parse::{QueryResult, SearchResult, ServiceEnabledResult};
use crate::payload::{DeviceInfoSource, QueryHintRequest, RequestFields, SearchRequest, assemble};
use crate::transport::{HttpRequest, Transport};

pub struct BranchSearch {
    config: Arc<SearchConfig>,
    device: Arc<dyn DeviceInfoSource>,
    dispatcher: Arc<ChannelDispatcher>,
    availability: AvailabilityResolver,
    policy: CancelPolicy,
}

impl std::fmt::Debug for BranchSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchSearch")
            .field("dispatcher", &self.dispatcher)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BranchSearch {
    /// Build a client with its own execution pool.
    pub fn new(
        config: SearchConfig,
        device: impl DeviceInfoSource + 'static,
        transport: Transport,
    ) -> Result<Self, AppError> {
        let pool = ExecutionPool::new(&config.dispatch.pool_config())?;
        Self::with_dispatcher(config, device, ChannelDispatcher::new(transport, pool))
    }

    /// Build a client around an existing dispatcher.
    pub fn with_dispatcher(
        config: SearchConfig,
        device: impl DeviceInfoSource + 'static,
        dispatcher: ChannelDispatcher,
    ) -> Result<Self, AppError> {
        if !config.has_valid_key() {
            return Err(AppError::InvalidKey(config.branch_key));
        }
        let dispatcher = Arc::new(dispatcher);
        let availability = AvailabilityResolver::new(Arc::clone(&dispatcher), config.endpoints.clone());
        info!(pool_size = dispatcher.pool().size(), "branch search client ready");
        Ok(Self {
            config: Arc::new(config),
            device: Arc::new(device),
            dispatcher,
            availability,
            policy: CancelPolicy::default(),
        })
    }

    /// How superseded calls are canceled. Defaults to [`CancelPolicy::Deferred`].
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &ChannelDispatcher {
        &self.dispatcher
    }

    fn post(&self, url: &str, request: &dyn RequestFields) -> HttpRequest {
        let body = assemble(request, self.device.as_ref(), self.config.as_ref());
        HttpRequest::post(url, body)
    }

    /// Search for apps and content. Supersedes any search still in flight.
    pub fn query<F>(&self, request: &SearchRequest, callback: F)
    where
        F: FnOnce(Result<SearchResult, SearchError>) + Send + 'static,
    {
        let http = self.post(&self.config.endpoints.search_url, request);
        let availability = self.availability.clone();
        let branch_key = self.config.branch_key.clone();
        let request = request.clone();
        self.dispatcher.dispatch(Channel::Search, http, self.policy, move |outcome| match outcome {
            Ok(body) => callback(Ok(SearchResult::parse(&request, &body))),
            Err(e) if e.kind == ErrorKind::Unauthorized => {
                debug!("search unauthorized, checking service availability");
                availability.check(&branch_key, move |status| {
                    if status.enabled {
                        callback(Err(e));
                    } else {
                        callback(Err(SearchError::new(ErrorKind::ServiceDisabled)));
                    }
                });
            }
            Err(e) => callback(Err(e)),
        });
    }

    /// Query completions for partially typed text.
    pub fn auto_suggest<F>(&self, request: &SearchRequest, callback: F)
    where
        F: FnOnce(Result<QueryResult, SearchError>) + Send + 'static,
    {
        let http = self.post(&self.config.endpoints.autosuggest_url, request);
        self.dispatcher.dispatch(Channel::AutoSuggest, http, self.policy, move |outcome| {
            callback(outcome.map(|body| QueryResult::parse(&body)));
        });
    }

    /// Suggested queries to show before the user types anything.
    pub fn query_hint<F>(&self, request: &QueryHintRequest, callback: F)
    where
        F: FnOnce(Result<QueryResult, SearchError>) + Send + 'static,
    {
        let http = self.post(&self.config.endpoints.queryhint_url, request);
        self.dispatcher.dispatch(Channel::QueryHint, http, self.policy, move |outcome| {
            callback(outcome.map(|body| QueryResult::parse(&body)));
        });
    }

    /// Whether the search service is enabled for `branch_key`.
    pub fn is_service_enabled<F>(&self, branch_key: &str, callback: F)
    where
        F: FnOnce(ServiceEnabledResult) + Send + 'static,
    {
        self.availability.check(branch_key, callback);
    }
}
