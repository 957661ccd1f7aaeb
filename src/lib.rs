pub mod bridge;
pub mod catalog;
pub mod chart;
pub mod charting;
pub mod codes;
pub mod config;
pub mod db;
pub mod gesture;
pub mod models;
pub mod notation;
pub mod surface;
pub mod tooth;
pub mod zones;

use tracing_subscriber::EnvFilter;

pub use bridge::{assemble_bridge, reconstruct_bridges, BridgeGesture, BridgeSpan};
pub use catalog::{CodeCatalog, InMemoryCatalog};
pub use chart::{reconcile, ChartState, ProcedureTag, TagKind, ToothState};
pub use charting::{checkout_summary, ChartError, ChartService, NotationOutcome, ToggleOutcome};
pub use codes::{resolve_crown_code, resolve_filling_code, ToolOptions};
pub use db::{DatabaseError, ProcedureStore, SqliteProcedureStore};
pub use gesture::{GestureBatch, ZoneGesture};
pub use notation::{parse_all_fillings, parse_filling_notation, parse_notation, NotationIntent};
pub use surface::{normalize, MainSurface, SurfaceToken};
pub use tooth::{classify, InvalidToothError, ToothClass, ToothId};
pub use zones::{collapse, expand, Zone};

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// built-in filter. Calling it twice is harmless.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!("{} engine v{}", config::APP_NAME, config::APP_VERSION);
    }
}

/// Open the chart database at the configured location and wrap it in a
/// procedure store.
pub fn open_chart_store() -> Result<SqliteProcedureStore, DatabaseError> {
    let path = config::chart_db_path();
    let conn = db::open_database(&path)?;
    Ok(SqliteProcedureStore::new(conn))
}
