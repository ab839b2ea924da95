//! Read queries over registered datasets.

pub mod charts;
pub mod filters;

pub use charts::{build_chart, ChartConfig, ChartOptions, ChartResponse};
pub use filters::{apply_filters, FilterDefinition};
