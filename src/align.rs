//! Offsets inside a message body are aligned relative to the start of the
//! body. Alignments are 1, 2, 4 or 8.

/// Number of zero bytes that must precede a value of the given alignment
/// written at `offset`.
pub(crate) fn padding(offset: usize, alignment: usize) -> usize {
    debug_assert!(
        matches!(alignment, 1 | 2 | 4 | 8),
        "{} is not a D-Bus alignment",
        alignment
    );
    offset.wrapping_neg() & (alignment - 1)
}

/// Rounds `offset` up to the next multiple of `alignment`.
pub(crate) fn align(offset: usize, alignment: usize) -> usize {
    offset + padding(offset, alignment)
}

#[cfg(test)]
mod tests {
    use crate::align::{align, padding};
    use crate::signature::TypeCode;

    #[test]
    fn alignment() {
        assert_eq!(align(23, 4), 24);
        assert_eq!(align(32, 4), 32);
        assert_eq!(align(31, 1), 31);
        assert_eq!(align(0, 8), 0);
        assert_eq!(align(9, 8), 16);
        assert_eq!(align(3, 2), 4);
    }

    #[test]
    fn padding_by_type() {
        // A struct after a byte starts at offset 8.
        assert_eq!(padding(1, TypeCode::Struct.alignment()), 7);
        assert_eq!(padding(1, TypeCode::Int16.alignment()), 1);
        assert_eq!(padding(6, TypeCode::UInt32.alignment()), 2);
        assert_eq!(padding(5, TypeCode::Signature.alignment()), 0);
        assert_eq!(padding(12, TypeCode::Double.alignment()), 4);
    }
}
