//! Contract violations reported at view-construction time.

use thiserror::Error;

/// Which extent of a view a shape error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Length,
    Capacity,
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Length => "length",
            Self::Capacity => "capacity",
        })
    }
}

/// Size or alignment contract that a reinterpretation would break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error(
        "src {extent} ({bytes} bytes) is not a multiple of dst element size ({dst_type}: {dst_elem_size} bytes)"
    )]
    NotMultiple {
        extent: Extent,
        bytes: usize,
        dst_type: &'static str,
        dst_elem_size: usize,
    },
    #[error("address 0x{addr:x} is not aligned for {dst_type} (align {align})")]
    Misaligned {
        addr: usize,
        dst_type: &'static str,
        align: usize,
    },
    #[error("dst element type {dst_type} is zero-sized")]
    ZeroSizedElement { dst_type: &'static str },
}

/// Errors from view construction. All are programmer errors: they are
/// reported synchronously and never worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("{op}: {shape}")]
    ShapeMismatch { op: &'static str, shape: ShapeError },
    #[error("{op}: {what} ({count}) overflows isize")]
    CountOverflow {
        op: &'static str,
        what: &'static str,
        count: u128,
    },
    #[error("{op} with dst type {found}; need a view slot")]
    InvalidDestinationType {
        op: &'static str,
        found: &'static str,
    },
    #[error("{op}: bytes are not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { op: &'static str, valid_up_to: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_message_names_sizes() {
        let err = ViewError::ShapeMismatch {
            op: "convert_at",
            shape: ShapeError::NotMultiple {
                extent: Extent::Capacity,
                bytes: 6,
                dst_type: "u32",
                dst_elem_size: 4,
            },
        };
        assert_eq!(
            err.to_string(),
            "convert_at: src capacity (6 bytes) is not a multiple of dst element size (u32: 4 bytes)"
        );
    }

    #[test]
    fn overflow_message() {
        let err = ViewError::CountOverflow {
            op: "convert_at",
            what: "dst length",
            count: 1 << 64,
        };
        assert!(err.to_string().contains("18446744073709551616"));
    }
}
