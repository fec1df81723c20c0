use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "cadastre_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "cadastre_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "cadastre_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "cadastre_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "cadastre_connections_rejected_total";

/// Gauge: number of loaded registries.
pub const REGISTRIES_ACTIVE: &str = "cadastre_registries_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "cadastre_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "cadastre_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SetUnitPrice { .. } => "set_unit_price",
        Command::InsertProperty { .. } => "insert_property",
        Command::ListForSale { .. } => "list_for_sale",
        Command::ListForRent { .. } => "list_for_rent",
        Command::RequestAllocation { .. } => "request_allocation",
        Command::SelectOwner { .. } => "select_owner",
        Command::SelectPrices { .. } => "select_prices",
        Command::SelectProperties { .. } => "select_properties",
        Command::SelectSaleContracts { .. } => "select_sale_contracts",
        Command::SelectRentalContracts { .. } => "select_rental_contracts",
        Command::InsertTransfer { .. } => "insert_transfer",
        Command::InsertLease { .. } => "insert_lease",
        Command::Listen { .. } => "listen",
    }
}
