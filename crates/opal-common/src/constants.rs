//! System-wide constants for the OpalDB catalog.

// =============================================================================
// Identifier Limits
// =============================================================================

/// Maximum column name length in bytes.
pub const MAX_COLUMN_NAME_SIZE: usize = 64;

/// Maximum table name length in bytes.
pub const MAX_TABLE_NAME_SIZE: usize = 64;

/// Maximum index name length in bytes.
pub const MAX_INDEX_NAME_SIZE: usize = 64;

// =============================================================================
// On-Disk Layout
// =============================================================================

/// Directory under the catalog root holding one subdirectory per database.
pub const DATABASES_DIR: &str = "databases";

/// Table schema file extension (encoded `TableSchema`).
pub const TABLE_SCHEMA_EXTENSION: &str = "schma";

/// Table data file extension (paged row store).
pub const TABLE_DATA_EXTENSION: &str = "dat";

/// Table sequence file extension (ASCII decimal counter).
pub const TABLE_SEQ_EXTENSION: &str = "seq";

/// Index metadata file extension.
pub const INDEX_EXTENSION: &str = "idx";

/// Index B-tree backing file extension.
pub const INDEX_BTREE_EXTENSION: &str = "bt";

/// Prefix for index files (`idx_<name>.idx` / `idx_<name>.bt`).
pub const INDEX_FILE_PREFIX: &str = "idx_";

/// Users file name at the catalog root.
pub const USERS_FILE: &str = "users.usrs";

/// Stored procedures file extension (`<dbname>.proc`).
pub const PROC_EXTENSION: &str = "proc";

// =============================================================================
// Page Geometry
// =============================================================================

/// Page size of the row store in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4 * 1024;

/// Per-page header: flags (1), payload length (4), overflow link (8).
pub const PAGE_HEADER_SIZE: usize = 13;

/// Row payload capacity of a single page.
pub const PAGE_PAYLOAD_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

// =============================================================================
// Encryption Parameters
// =============================================================================

/// Derived table key length (SHA-256 digest).
pub const TABLE_KEY_SIZE: usize = 32;

/// ChaCha20 nonce length.
pub const TABLE_NONCE_SIZE: usize = 12;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_geometry() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert!(PAGE_HEADER_SIZE < PAGE_SIZE);
        assert_eq!(PAGE_PAYLOAD_SIZE, PAGE_SIZE - PAGE_HEADER_SIZE);
    }

    #[test]
    fn test_nonce_fits_key() {
        assert!(TABLE_NONCE_SIZE <= TABLE_KEY_SIZE);
    }
}
