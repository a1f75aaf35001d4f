//! Metrics definitions for the HTTP adapter.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "devops.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a call to the remote service in seconds, retries included. Tagged with endpoint.",
};

pub const REQUEST_RETRIES: MetricDef = MetricDef {
    name: "devops.request.retries",
    metric_type: MetricType::Counter,
    description: "Number of retried calls to the remote service. Tagged with endpoint.",
};

pub const REQUEST_FAILED: MetricDef = MetricDef {
    name: "devops.request.failed",
    metric_type: MetricType::Counter,
    description: "Number of calls that ended in an error. Tagged with endpoint, status.",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUEST_DURATION, REQUEST_RETRIES, REQUEST_FAILED];
