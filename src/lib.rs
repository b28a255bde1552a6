//! sieve - boolean and semantic prefix search over structured entity records.
//!
//! Records (arbitrary JSON) are flattened into `field:value` prefixes and
//! indexed as posting lists. Queries combine exact, wildcard, negated and
//! free-text terms under nested `and`/`or` groups. Wildcards resolve through
//! a [Tantivy](https://github.com/quickwit-oss/tantivy) pattern store; free
//! text resolves to the nearest indexed prefixes by embedding distance.
//!
//! # Quick start
//!
//! ```
//! use serde_json::json;
//! use sieve::{Settings, Snapshot};
//!
//! let snapshot = Snapshot::build(
//!     vec![
//!         json!({"type": "P", "name": "John Smith"}),
//!         json!({"type": "V", "name": "Sea Star"}),
//!     ],
//!     Settings::default(),
//! )
//! .unwrap();
//!
//! let outcome = snapshot
//!     .search(r#"{"and": ["type:p", "name:j*"], "select": ["name"]}"#)
//!     .unwrap();
//! assert_eq!(outcome.views, vec![json!({"name": "John Smith"})]);
//! ```
//!
//! On disk, `sieve build` publishes a generation under the [`DataDir`] and
//! [`engine::load`] reads it back:
//!
//! ```no_run
//! use sieve::{DataDir, Engine, engine, settings::Overrides};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let engine = Engine::new(engine::load(&data_dir, &Overrides::default()).unwrap());
//! let outcome = engine.search(r#"{"or": ["name:smith"]}"#).unwrap();
//! println!("{} records", outcome.count());
//! ```

pub mod catalog;
pub mod data_dir;
pub mod embedding;
pub mod embedding_db;
pub mod engine;
pub mod error;
pub mod eval;
pub mod flatten;
pub mod http;
pub mod mcp;
pub mod neighbors;
pub mod pattern;
pub mod pattern_store;
pub mod prefix_index;
pub mod projection;
pub mod query;
pub mod records;
pub mod response;
pub mod semantic;
pub mod settings;
pub mod text_util;

pub use catalog::Catalog;
pub use data_dir::DataDir;
pub use embedding::{Embedder, NgramEmbedder};
pub use embedding_db::EmbeddingDb;
pub use engine::{Engine, SearchOutcome, Snapshot};
pub use error::{Error, Result};
pub use prefix_index::PrefixIndex;
pub use query::Query;
pub use response::Response;
pub use settings::Settings;
