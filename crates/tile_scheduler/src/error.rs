use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown url pattern '{0}' (expected zxy, zyx, zxy_yflip or zyx_yflip)")]
    UnknownUrlPattern(String),
    #[error("base url must not be empty")]
    EmptyBaseUrl,
    #[error("base url '{0}' uses {{s}} but no load balancing targets were given")]
    MissingLoadBalancingTargets(String),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("a scheduler named '{0}' is already registered")]
    DuplicateScheduler(String),
    #[error("no tile source configured for layer {0:?}")]
    MissingLayerSource(crate::tile_types::Layer),
    #[error("scheduler service is gone")]
    ServiceClosed,
}
