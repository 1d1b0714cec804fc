/// Data layer: core types, loading, cleaning, combining and filtering.
///
/// Architecture:
/// ```text
///  .csv / .parquet / .json   (one file per shard)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  read file → RawTable (text cells)
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ normalize  │  trim names, type cells, drop malformed key rows
///   └───────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ combine   │  union shards of one domain → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  apply FilterSpec → new Table
///   └──────────┘
/// ```

pub mod combine;
pub mod filter;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod schema;
