//! Vault container constants and reference bit packing.

/// Magic bytes at the start of a vault file.
pub const VAULT_MAGIC: &[u8; 5] = b"Vault";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the root group position in the header.
pub const ROOT_POS_OFFSET: usize = 8;

/// Current container format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value when the archive is frozen (finalized).
pub const FROZEN_FLAG: u8 = 0xFF;

/// Frozen flag value while the archive is still being written.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// Type flag in child references: MSB set = data, MSB clear = group.
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

/// Mask to extract the byte offset from a child reference.
pub const OFFSET_MASK: u64 = !(1 << 63);

/// Empty-data reference: offset 0 with the data bit set. Used when array
/// dimensions can be inferred from payload size (rank <= 1, non-string).
pub const EMPTY_DATA: u64 = TYPE_FLAG_MASK;

/// Size in bytes of the content-key prefix on sample data blocks.
pub const KEY_PREFIX_SIZE: usize = 16;

/// Archive data-layout version, stored as root child 0.
pub const ARCHIVE_FORMAT_VERSION: i32 = 1;

/// Library version stored as root child 1, encoded as major * 10000 +
/// minor * 100 + patch.
pub const LIBRARY_VERSION: i32 = 100;

/// Check if a child reference points at a group (MSB clear).
#[inline]
pub const fn is_group_ref(reference: u64) -> bool {
    (reference & TYPE_FLAG_MASK) == 0
}

/// Check if a child reference points at data (MSB set).
#[inline]
pub const fn is_data_ref(reference: u64) -> bool {
    (reference & TYPE_FLAG_MASK) != 0
}

/// Extract the byte offset from a child reference.
#[inline]
pub const fn extract_offset(reference: u64) -> u64 {
    reference & OFFSET_MASK
}

/// Build a group reference (MSB clear).
#[inline]
pub const fn make_group_ref(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

/// Build a data reference (MSB set).
#[inline]
pub const fn make_data_ref(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}

/// Check if a reference is the "empty" sentinel: offset 0 means an empty
/// group or empty data, distinct from any real node (the header occupies
/// offset 0).
#[inline]
pub const fn is_empty_ref(reference: u64) -> bool {
    extract_offset(reference) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic() {
        assert_eq!(VAULT_MAGIC, b"Vault");
        assert_eq!(VAULT_MAGIC.len(), 5);
    }

    #[test]
    fn test_reference_packing() {
        let group_ref = make_group_ref(0x1234);
        assert!(is_group_ref(group_ref));
        assert!(!is_data_ref(group_ref));
        assert_eq!(extract_offset(group_ref), 0x1234);
        assert_eq!(group_ref, 0x1234);

        let data_ref = make_data_ref(0x5678);
        assert!(is_data_ref(data_ref));
        assert!(!is_group_ref(data_ref));
        assert_eq!(extract_offset(data_ref), 0x5678);
        assert_eq!(data_ref, 0x8000000000005678);
    }

    #[test]
    fn test_empty_ref() {
        assert!(is_empty_ref(0)); // empty group
        assert!(is_empty_ref(EMPTY_DATA)); // empty data
        assert!(!is_empty_ref(0x100));
        assert!(!is_empty_ref(make_data_ref(0x100)));
    }
}
