//! # opal-catalog
//!
//! The OpalDB system catalog: the subsystem that owns the on-disk
//! representation of databases, tables, schemas, indexes, users, and stored
//! procedures, and that mediates all row-level reads and writes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Catalog                               │
//! │  (databases, users, privileges, filesystem root)             │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                              │
//! │  (tables, stored procedures)                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Table                               │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐ │
//! │  │  Schema   │  │   Codec   │  │   Pager   │  │  Indexes │ │
//! │  │ (validate)│  │(tag/zstd/ │  │ (row file)│  │ (B-trees)│ │
//! │  │           │  │ chacha20) │  │           │  │          │ │
//! │  └───────────┘  └───────────┘  └───────────┘  └──────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The catalog owns databases, a database owns tables and procedures, and a
//! table owns its indexes, pager, sequence file, and key material. There are
//! no back-pointers; operations that need to cross tables (foreign-key
//! checks) receive the owning [`Database`] as an argument.
//!
//! Transactions, recovery, and query planning live above this crate. The
//! catalog provides single-row mutation primitives and at-most physical
//! durability.

#![warn(clippy::all)]

pub mod btree;
pub mod catalog;
pub mod codec;
pub mod database;
pub mod pager;
pub mod schema;
pub mod table;
pub mod users;
pub mod value;

pub use btree::{BTree, Index, IndexMeta};
pub use catalog::Catalog;
pub use database::{Database, Procedure};
pub use pager::Pager;
pub use schema::{ColumnDefinition, DataType, DefaultValue, ForeignKey, TableSchema};
pub use table::{RowIterator, SetClause, Table};
pub use users::{Privilege, PrivilegeAction, User};
pub use value::{Row, Value};

pub use opal_common::error::{Entity, OpalError, OpalResult};
