//! A single-file embedded storage engine for small, schema-declared
//! record tables.
//!
//! A dataset is one file on disk holding a fixed header, one metadata
//! slot per declared table, and each table's fixed-width records packed
//! contiguously after that. Callers describe their tables with
//! `#[derive(Entity)]` structs and a `#[derive(Context)]` struct that
//! groups the `Table<E>` handles they want open at once:
//!
//! ```ignore
//! #[derive(Entity)]
//! struct Order {
//!     id: i32,
//!     #[recordstore(max_len = 64)]
//!     customer: String,
//!     total: rust_decimal::Decimal,
//! }
//!
//! #[derive(Context)]
//! struct Store {
//!     orders: recordstore::Table<Order>,
//! }
//!
//! let store = Store::open("orders.mdb")?;
//! let handle = store.orders.add(Order { id: 0, customer: "acme".into(), total: Decimal::ZERO })?;
//! store.commit()?;
//! ```

mod change_tracker;
mod file_format;
mod table_buffer;
mod write_queue;

pub mod codec;
pub mod context;
pub mod error;
pub mod schema;
pub mod shared_cache;
pub mod storage_file;
pub mod table;

pub use change_tracker::Handle;
pub use error::{CodecError, EngineError};
pub use schema::{Entity, EntitySchema, Enum32, FieldDescriptor, FieldKind};
pub use table::Table;

pub use recordstore_derive::{Context, Entity};
