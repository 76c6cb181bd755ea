// Observability: metrics recorded through the `metrics` facade

pub mod metrics;
