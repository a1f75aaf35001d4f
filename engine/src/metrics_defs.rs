//! Metrics definitions for the engine.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PREDICATE_CACHE_HIT: MetricDef = MetricDef {
    name: "predicate.cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of filter compilations served from the predicate cache",
};

pub const PREDICATE_CACHE_MISS: MetricDef = MetricDef {
    name: "predicate.cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of filter compilations that missed the predicate cache",
};

pub const PREDICATE_COMPILE_ERRORS: MetricDef = MetricDef {
    name: "predicate.compile_errors",
    metric_type: MetricType::Counter,
    description: "Number of filters rejected by the regex compiler",
};

pub const PREDICATE_SLOW_MATCHES: MetricDef = MetricDef {
    name: "predicate.slow_matches",
    metric_type: MetricType::Counter,
    description: "Number of regex matches that exceeded the match time budget",
};

pub const GROUP_PUSH_ATTEMPTED: MetricDef = MetricDef {
    name: "variable_group.push.attempted",
    metric_type: MetricType::Counter,
    description: "Number of revised variable groups sent to the remote store. Tagged with operation.",
};

pub const GROUP_PUSH_FAILED: MetricDef = MetricDef {
    name: "variable_group.push.failed",
    metric_type: MetricType::Counter,
    description: "Number of variable group pushes rejected by the remote store. Tagged with operation.",
};

pub const OPERATION_DURATION: MetricDef = MetricDef {
    name: "operation.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a per-project operation in seconds. Tagged with operation, status.",
};

pub const AUDIT_WRITE_FAILED: MetricDef = MetricDef {
    name: "audit.write.failed",
    metric_type: MetricType::Counter,
    description: "Number of audit entries that could not be persisted",
};

pub const SECRET_OPERATION_FAILED: MetricDef = MetricDef {
    name: "secret.operation.failed",
    metric_type: MetricType::Counter,
    description: "Number of failed per-secret vault calls. Tagged with operation.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    PREDICATE_CACHE_HIT,
    PREDICATE_CACHE_MISS,
    PREDICATE_COMPILE_ERRORS,
    PREDICATE_SLOW_MATCHES,
    GROUP_PUSH_ATTEMPTED,
    GROUP_PUSH_FAILED,
    OPERATION_DURATION,
    AUDIT_WRITE_FAILED,
    SECRET_OPERATION_FAILED,
];
