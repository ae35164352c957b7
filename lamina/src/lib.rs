//! # lamina
//!
//! In-memory, multi-resolution round-robin time-series storage.
//!
//! lamina keeps a bounded history of numeric samples per metric, at one or
//! more precisions at once. Each precision is a fixed-size circular buffer,
//! so memory use is set by configuration, not by data volume. Old data ages
//! out as the window slides forward, and reads stitch together the most
//! precise data available for each part of the requested range.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Retentions in Graphite style: `10s:1h, 1m:1d, 1h:1y`
//! - Writes fan out to every layer; no background consolidation
//! - Lazy invalidation: stale slots read as null without being wiped
//! - Configurable time unit (second, millisecond, microsecond)
//! - Eleven fixed-width codecs for values and times, from 1 bit to 8 bytes
//!
//! ## Quick Start
//!
//! ```rust
//! use lamina::{AggregateFn, Database, MetricConfig, ModifyFn, Precision};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut db = Database::new();
//!
//! // 1s resolution for 10 minutes, 1m resolution for a day
//! db.metric(&MetricConfig::new("host.cpu", "1s:10m, 1m:1d")?)?;
//!
//! // Record a value now
//! db.write("host.cpu", 42.0, None, ModifyFn::Last)?;
//!
//! // Last five minutes, one averaged point every 30 seconds
//! let result = db.read("host.cpu", "now-5m:now", &Precision::Interval("30s".into()), AggregateFn::Avg)?;
//! for row in &result.rows {
//!     println!("{}: {:?}", row.time, row.value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Database`]: facade with defaults, period strings and unknown-metric handling
//! - [`Collector`]: metrics by name, write fan-out, stitched reads
//! - [`Layer`]: one circular buffer with a sliding valid window
//! - [`Interval`]: time units, rounding and string parsing
//!
//! ## Modules
//!
//! - [`db`]: database facade
//! - [`collector`]: metric registry and cross-layer reads
//! - [`layer`]: single-resolution ring buffer
//! - [`query`]: rows, read results and layer selection
//! - [`interval`]: MTU model, interval/period/retention parsing
//! - [`storage`]: fixed-width cell codecs
//! - [`aggregate`]: aggregate and write-modify functions
//! - [`schema`]: metric and database configuration
//! - [`error`]: error types

pub mod aggregate;
pub mod collector;
pub mod db;
pub mod error;
pub mod interval;
pub mod layer;
pub mod query;
pub mod schema;
pub mod storage;

// Re-export primary API types at crate root for convenience.
pub use aggregate::{AggregateFn, ModifyFn};
pub use collector::{Collector, LayerInfo, MetricInfo};
pub use db::{Database, Precision};
pub use error::{LaminaError, Result};
pub use interval::{Interval, Period, PeriodContext, Retention, TimeUnit};
pub use layer::{Layer, LayerOptions};
pub use query::{ReadResult, Row};
pub use schema::{DatabaseConfig, MetricConfig};
pub use storage::{LayerStorage, StorageType};
