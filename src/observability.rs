use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sql::{Command, ReservationFilter};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "reservo_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "reservo_query_duration_seconds";

/// Counter: creates/updates refused because the slot was taken.
pub const CONFLICTS_TOTAL: &str = "reservo_conflicts_total";

/// Counter: unexpected persistence failures. Labels: op.
pub const STORE_FAILURES_TOTAL: &str = "reservo_store_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "reservo_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "reservo_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "reservo_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "reservo_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "reservo_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "reservo_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertRoom(_) => "insert_room",
        Command::InsertUser(_) => "insert_user",
        Command::InsertReservation(_) => "insert_reservation",
        Command::UpdateRoom { .. } => "update_room",
        Command::UpdateUser { .. } => "update_user",
        Command::UpdateReservation { .. } => "update_reservation",
        Command::DeleteRoom { .. } => "delete_room",
        Command::DeleteUser { .. } => "delete_user",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectRooms { .. } => "select_rooms",
        Command::SelectUsers { .. } => "select_users",
        Command::SelectReservations(filter) => match filter {
            ReservationFilter::All | ReservationFilter::Id(_) => "select_reservations",
            ReservationFilter::Room(_) => "select_reservations_by_room",
            ReservationFilter::Responsible(_) => "select_reservations_by_responsible",
            ReservationFilter::Period { .. } => "select_reservations_by_period",
        },
        Command::SelectAvailability { .. } => "select_availability",
    }
}
