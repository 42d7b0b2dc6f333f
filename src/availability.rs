//! Service-availability lookup.
//!
//! A GET of `{configuration_url_prefix}{branch_key}.json` on the dispatcher's
//! raw path. The service counts as disabled only when the server answers
//! successfully with `"disabled": true`; every failure reads as enabled.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Endpoints;
use crate::dispatch::ChannelDispatcher;
use crate::parse::ServiceEnabledResult;
use crate::transport::HttpRequest;

#[derive(Debug, Clone)]
pub struct AvailabilityResolver {
    dispatcher: Arc<ChannelDispatcher>,
    endpoints: Endpoints,
}

impl AvailabilityResolver {
    pub fn new(dispatcher: Arc<ChannelDispatcher>, endpoints: Endpoints) -> Self {
        Self { dispatcher, endpoints }
    }

    pub fn check<F>(&self, branch_key: &str, callback: F)
    where
        F: FnOnce(ServiceEnabledResult) + Send + 'static,
    {
        let url = self.endpoints.configuration_url(branch_key);
        self.dispatcher.execute_raw(HttpRequest::get(url), move |outcome| {
            let result = match outcome {
                Ok(body) => ServiceEnabledResult::parse(&body),
                Err(e) => {
                    debug!(kind = %e.kind, "availability lookup failed, assuming enabled");
                    ServiceEnabledResult::enabled()
                }
            };
            if !result.enabled {
                info!("search service is disabled for this key");
            }
            callback(result);
        });
    }
}
