//! Metrics emitted by the notifier. Every definition is listed in `ALL_METRICS`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const REPORTS_SENT: MetricDef = MetricDef {
    name: "reports.sent",
    metric_type: MetricType::Counter,
    description: "Report categories accepted by the service",
};

pub const REPORTS_ABORTED: MetricDef = MetricDef {
    name: "reports.aborted",
    metric_type: MetricType::Counter,
    description: "Report categories skipped because no file matched",
};

pub const REPORTS_FAILED: MetricDef = MetricDef {
    name: "reports.failed",
    metric_type: MetricType::Counter,
    description: "Report categories that failed to list, archive or upload",
};

pub const UPLOAD_DURATION: MetricDef = MetricDef {
    name: "reports.upload.duration",
    metric_type: MetricType::Histogram,
    description: "Time to archive and upload one category in seconds",
};

pub const REFRESH_REQUESTS: MetricDef = MetricDef {
    name: "refresh.requests",
    metric_type: MetricType::Counter,
    description: "Project refresh requests, tagged by outcome",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REPORTS_SENT,
    REPORTS_ABORTED,
    REPORTS_FAILED,
    UPLOAD_DURATION,
    REFRESH_REQUESTS,
];

/// Counter for a definition, with optional `key => value` labels.
#[macro_export]
macro_rules! counter {
    ($def:expr $(, $key:literal => $value:expr)* $(,)?) => {
        metrics::counter!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr $(, $key:literal => $value:expr)* $(,)?) => {
        metrics::histogram!($def.name $(, $key => $value)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique() {
        let names: HashSet<_> = ALL_METRICS.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), ALL_METRICS.len());
        assert!(ALL_METRICS.iter().all(|m| !m.description.is_empty()));
    }
}
