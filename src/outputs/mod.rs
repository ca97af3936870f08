//! Read-side outputs.
//!
//! The pipeline never serves records itself. [`json`] renders the stored
//! records in the shape the read API consumes:
//!
//! ```text
//! output_dir/
//! ├── news.json        # every record, newest first
//! ├── world.json       # one file per category present in the store
//! └── technology.json
//! ```

pub mod json;
