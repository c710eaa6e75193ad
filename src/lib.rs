//! GC log analysis engine.
//!
//! Parses JVM garbage-collection logs (Serial, Parallel, CMS, G1 and ZGC in
//! both the legacy and the unified `-Xlog` formats) into a [`model::GCModel`],
//! derives per-event and whole-log metrics, serves windowed time-series views
//! and runs a rule-based diagnosis over the finished model.
//!
//! Typical usage:
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = File::open("gc.log").unwrap();
//! let mut model = rgclog::parser::parse_log(BufReader::new(file)).unwrap();
//! model.calculate_derived_info().unwrap();
//! println!("{:?}", model.kpi_summary());
//! ```

pub mod diagnoser;
pub mod event;
pub mod model;
pub mod parser;
pub mod stats;
pub mod util;
pub mod vmoptions;

pub use event::GCEvent;
pub use model::{CollectorType, GCModel, LogStyle};
